pub mod config;
pub mod database;
pub mod record_repository;
pub mod target_repository;

pub use config::{DEFAULT_DATABASE_URL, DatabaseConfig};
pub use database::Database;
pub use record_repository::RecordRepository;
pub use target_repository::TargetRepository;
