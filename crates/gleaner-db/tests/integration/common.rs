use gleaner_core::fields::{Field, FieldSet};
use gleaner_core::models::RunDate;
use gleaner_db::{Database, DatabaseConfig};

/// Connects to a fresh in-memory database with all tables created.
pub async fn setup_test_db() -> Database {
    let db = Database::connect(&DatabaseConfig::in_memory())
        .await
        .expect("Failed to open in-memory database");
    db.migrate().await.expect("Failed to run migrations");
    db
}

pub fn run_date(raw: &str) -> RunDate {
    raw.parse().expect("valid run date")
}

/// Every field set to `"{prefix}-{field}"`.
pub fn fields(prefix: &str) -> FieldSet {
    Field::ALL.iter().fold(FieldSet::new(), |set, f| {
        set.with(*f, format!("{prefix}-{}", f.as_str()))
    })
}

pub fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
