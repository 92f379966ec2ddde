use std::future::Future;
use std::time::Duration;

use crate::error::AppError;
use crate::fields::FieldSet;
use crate::models::{Record, RunDate};
use crate::profile::{FieldSpecs, Locator};

/// A long-lived page (browser tab or HTTP client) owned by one worker.
pub trait PageSession: Send {
    /// Load `url`, failing with [`AppError::Timeout`] once `timeout` elapses.
    fn navigate(
        &mut self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Wait until `marker` is present on the current page.
    ///
    /// Fails with [`AppError::ReadinessTimeout`] once `timeout` elapses.
    fn wait_for_ready(
        &mut self,
        marker: &Locator,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Read the trimmed text of each locator on the current page.
    ///
    /// Returns one entry per locator, `None` where the node is absent.
    /// Only page-level failures are errors.
    fn read_texts(
        &mut self,
        locators: &[&Locator],
    ) -> impl Future<Output = Result<Vec<Option<String>>, AppError>> + Send;

    /// Release the page.
    fn close(self) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Opens one [`PageSession`] per worker.
pub trait SessionFactory: Send + Sync + Clone + 'static {
    type Session: PageSession + 'static;

    fn open(&self) -> impl Future<Output = Result<Self::Session, AppError>> + Send;
}

/// Reads the full [`FieldSet`] from a session positioned at a target page.
pub trait Extractor: Send + Sync + Clone + 'static {
    fn extract<S: PageSession>(
        &self,
        session: &mut S,
        specs: &FieldSpecs,
    ) -> impl Future<Output = Result<FieldSet, AppError>> + Send;
}

/// Destination for fetched records.
pub trait RecordStore: Send + Sync + Clone + 'static {
    /// Atomically insert-or-replace every record. Returns rows written.
    fn upsert_batch(&self, records: &[Record])
    -> impl Future<Output = Result<u64, AppError>> + Send;
}

/// Read-only view of the reference tables that decide what to fetch.
pub trait TargetStore: Send + Sync + Clone {
    /// Raw maximum run date present in the location reference set.
    fn latest_run_date(&self) -> impl Future<Output = Result<Option<String>, AppError>> + Send;

    /// `(key, location)` pairs for the run date. Locations may be empty.
    fn target_locations(
        &self,
        run_date: RunDate,
    ) -> impl Future<Output = Result<Vec<(String, String)>, AppError>> + Send;

    /// Keys of the upstream population for the run date.
    fn population_keys(
        &self,
        run_date: RunDate,
    ) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;

    /// Keys that already have a stored record for the run date.
    fn recorded_keys(
        &self,
        run_date: RunDate,
    ) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;
}
