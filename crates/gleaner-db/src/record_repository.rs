use gleaner_core::error::AppError;
use gleaner_core::fields::{Field, FieldSet};
use gleaner_core::models::{Record, RunDate};
use gleaner_core::traits::RecordStore;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

/// Rows per INSERT statement: 16 binds each, well under SQLite's
/// historical 999-parameter limit.
const ROWS_PER_STATEMENT: usize = 60;

/// Repository for fetched records in the `field_reports` table.
#[derive(Clone)]
pub struct RecordRepository {
    pool: SqlitePool,
}

impl RecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetch the stored record for `(run_date, key)`.
    pub async fn get(&self, run_date: RunDate, key: &str) -> Result<Option<Record>, AppError> {
        let sql = format!(
            "SELECT {} FROM field_reports WHERE run_date = ? AND code = ?",
            field_columns()
        );
        let row = sqlx::query(&sql)
            .bind(run_date.to_string())
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        row.map(|row| {
            let fields = fields_from_row(&row)?;
            Ok(Record::new(run_date, key, fields))
        })
        .transpose()
    }

    /// Number of stored records for the run date.
    pub async fn count(&self, run_date: RunDate) -> Result<u64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM field_reports WHERE run_date = ?")
            .bind(run_date.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(count.max(0) as u64)
    }
}

impl RecordStore for RecordRepository {
    /// Insert-or-replace every record inside one transaction.
    async fn upsert_batch(&self, records: &[Record]) -> Result<u64, AppError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        for chunk in records.chunks(ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "INSERT OR REPLACE INTO field_reports (run_date, code, {}) ",
                field_columns()
            ));
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(record.run_date.to_string())
                    .push_bind(record.key.clone());
                for value in record.fields.values() {
                    row.push_bind(value.clone());
                }
            });
            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        tracing::debug!(rows = records.len(), "Upserted field reports");
        Ok(records.len() as u64)
    }
}

fn field_columns() -> String {
    Field::ALL.map(|f| f.as_str()).join(", ")
}

fn fields_from_row(row: &SqliteRow) -> Result<FieldSet, AppError> {
    let mut lookups = Vec::with_capacity(Field::COUNT);
    for field in Field::ALL {
        let value: Option<String> = row
            .try_get(field.as_str())
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        lookups.push((field, value));
    }
    Ok(FieldSet::from_lookups(lookups))
}
