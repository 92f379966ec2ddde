pub mod config;
pub mod error;
pub mod extract;
pub mod fields;
pub mod models;
pub mod pipeline;
pub mod profile;
pub mod sink;
pub mod source;
pub mod throttle;
pub mod traits;
pub mod worker;

#[cfg(test)]
pub mod testutil;

pub use config::{PipelineConfig, RetryConfig};
pub use error::AppError;
pub use extract::LocatorExtractor;
pub use fields::{Field, FieldSet, normalize_percent};
pub use models::{Job, Outcome, Record, RunDate, SelectionMode};
pub use pipeline::{Pipeline, RunFailure, RunSummary};
pub use profile::{FieldSpecs, Locator, PageProfile};
pub use sink::{SinkEvent, SinkReporter, TracingSinkReporter};
pub use source::{JobPlan, JobSource, resolve_run_date};
pub use throttle::RateLimiter;
pub use traits::{Extractor, PageSession, RecordStore, SessionFactory, TargetStore};
pub use worker::{TracingWorkerReporter, WorkerEvent, WorkerReporter};
