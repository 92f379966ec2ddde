use gleaner_core::error::AppError;
use gleaner_core::models::RunDate;
use gleaner_core::traits::TargetStore;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

const ROWS_PER_STATEMENT: usize = 300;

/// Repository over the reference tables: `target_urls` and `upstream_reports`.
#[derive(Clone)]
pub struct TargetRepository {
    pool: SqlitePool,
}

impl TargetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace `(code, url)` rows for the run date.
    pub async fn save_targets(&self, run_date: RunDate, targets: &[(String, String)]) -> Result<u64, AppError> {
        let date = run_date.to_string();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        for chunk in targets.chunks(ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT OR REPLACE INTO target_urls (run_date, code, url) ");
            builder.push_values(chunk, |mut row, (code, url)| {
                row.push_bind(date.clone())
                    .push_bind(code.clone())
                    .push_bind(url.clone());
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
        Ok(targets.len() as u64)
    }

    /// Insert population keys for the run date. Existing keys are kept.
    pub async fn save_population(&self, run_date: RunDate, codes: &[String]) -> Result<u64, AppError> {
        let date = run_date.to_string();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        for chunk in codes.chunks(ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT OR IGNORE INTO upstream_reports (run_date, code) ");
            builder.push_values(chunk, |mut row, code| {
                row.push_bind(date.clone()).push_bind(code.clone());
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
        Ok(codes.len() as u64)
    }

    async fn codes_for(&self, sql: &str, run_date: RunDate) -> Result<Vec<String>, AppError> {
        sqlx::query_scalar(sql)
            .bind(run_date.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))
    }
}

impl TargetStore for TargetRepository {
    async fn latest_run_date(&self) -> Result<Option<String>, AppError> {
        sqlx::query_scalar::<_, Option<String>>("SELECT MAX(run_date) FROM target_urls")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))
    }

    async fn target_locations(&self, run_date: RunDate) -> Result<Vec<(String, String)>, AppError> {
        sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT code, COALESCE(url, '')
            FROM target_urls
            WHERE run_date = ?
            ORDER BY code
            "#,
        )
        .bind(run_date.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))
    }

    async fn population_keys(&self, run_date: RunDate) -> Result<Vec<String>, AppError> {
        self.codes_for(
            "SELECT code FROM upstream_reports WHERE run_date = ? ORDER BY code",
            run_date,
        )
        .await
    }

    async fn recorded_keys(&self, run_date: RunDate) -> Result<Vec<String>, AppError> {
        self.codes_for(
            "SELECT code FROM field_reports WHERE run_date = ? ORDER BY code",
            run_date,
        )
        .await
    }
}
