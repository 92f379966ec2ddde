//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` or atomics for interior mutability,
//! allowing test assertions on recorded calls.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::AppError;
use crate::fields::{Field, FieldSet};
use crate::models::{Record, RunDate};
use crate::profile::{FieldSpecs, Locator, PageProfile};
use crate::sink::{SinkEvent, SinkReporter};
use crate::traits::{Extractor, PageSession, RecordStore, SessionFactory, TargetStore};
use crate::worker::{WorkerEvent, WorkerReporter};

/// Computes the text of `locator` on the page at `url`.
pub type PageFn = Arc<dyn Fn(&str, &Locator) -> Option<String> + Send + Sync>;

// ---------------------------------------------------------------------------
// MockSessionFactory / MockSession
// ---------------------------------------------------------------------------

/// Mock session factory whose sessions all share one scripted "site".
#[derive(Clone)]
pub struct MockSessionFactory {
    site: PageFn,
    /// URLs whose navigation always fails.
    failing_urls: Arc<HashSet<String>>,
    /// Errors returned by the next navigations, in order.
    navigate_errors: Arc<Mutex<Vec<AppError>>>,
    /// Errors returned by the next reads, in order.
    read_errors: Arc<Mutex<Vec<AppError>>>,
    /// Errors returned by the next `open` calls, in order.
    open_errors: Arc<Mutex<Vec<AppError>>>,
    /// Readiness markers never appear.
    hang_on_ready: bool,
    /// `close` counts the call but reports an error.
    failing_close: bool,
    /// Return only this many values from `read_texts`.
    truncate_reads: Option<usize>,
    /// Simulated latency per navigation.
    latency: Duration,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
    pub visits: Arc<Mutex<Vec<(String, Instant)>>>,
}

impl MockSessionFactory {
    /// Every locator resolves to `"{url}|{locator expression}"`.
    pub fn echo() -> Self {
        Self::with_site(|url, locator| Some(format!("{url}|{}", locator.expression())))
    }

    pub fn with_site<F>(site: F) -> Self
    where
        F: Fn(&str, &Locator) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            site: Arc::new(site),
            failing_urls: Arc::new(HashSet::new()),
            navigate_errors: Arc::new(Mutex::new(Vec::new())),
            read_errors: Arc::new(Mutex::new(Vec::new())),
            open_errors: Arc::new(Mutex::new(Vec::new())),
            hang_on_ready: false,
            failing_close: false,
            truncate_reads: None,
            latency: Duration::ZERO,
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
            visits: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_urls<I, U>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<String>,
    {
        self.failing_urls = Arc::new(urls.into_iter().map(Into::into).collect());
        self
    }

    pub fn navigate_errors(self, errors: Vec<AppError>) -> Self {
        *self.navigate_errors.lock().unwrap() = errors;
        self
    }

    pub fn read_errors(self, errors: Vec<AppError>) -> Self {
        *self.read_errors.lock().unwrap() = errors;
        self
    }

    pub fn open_errors(self, errors: Vec<AppError>) -> Self {
        *self.open_errors.lock().unwrap() = errors;
        self
    }

    pub fn hang_on_ready(mut self) -> Self {
        self.hang_on_ready = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.failing_close = true;
        self
    }

    pub fn truncate_reads(mut self, count: usize) -> Self {
        self.truncate_reads = Some(count);
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn visited_urls(&self) -> Vec<String> {
        self.visits
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    fn session(&self) -> MockSession {
        MockSession {
            factory: self.clone(),
            url: None,
        }
    }
}

impl SessionFactory for MockSessionFactory {
    type Session = MockSession;

    async fn open(&self) -> Result<MockSession, AppError> {
        {
            let mut errors = self.open_errors.lock().unwrap();
            if !errors.is_empty() {
                return Err(errors.remove(0));
            }
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(self.session())
    }
}

/// Mock page backed by a [`MockSessionFactory`] script.
pub struct MockSession {
    factory: MockSessionFactory,
    url: Option<String>,
}

impl MockSession {
    /// Standalone session where each locator resolves through `texts`.
    pub fn with_texts<F>(texts: F) -> Self
    where
        F: Fn(&Locator) -> Option<String> + Send + Sync + 'static,
    {
        let mut session = MockSessionFactory::with_site(move |_, locator| texts(locator)).session();
        session.url = Some("https://example.com/".into());
        session
    }

    /// Standalone session whose first read fails.
    pub fn failing_reads(error: AppError) -> Self {
        let mut session = MockSessionFactory::echo().read_errors(vec![error]).session();
        session.url = Some("https://example.com/".into());
        session
    }

    /// Standalone session whose reads return only `count` values.
    pub fn truncated_reads(count: usize) -> Self {
        let mut session = MockSessionFactory::echo().truncate_reads(count).session();
        session.url = Some("https://example.com/".into());
        session
    }
}

impl PageSession for MockSession {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), AppError> {
        self.factory
            .visits
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));
        if !self.factory.latency.is_zero() {
            tokio::time::sleep(self.factory.latency).await;
        }

        let queued = {
            let mut errors = self.factory.navigate_errors.lock().unwrap();
            (!errors.is_empty()).then(|| errors.remove(0))
        };
        if let Some(error) = queued {
            return Err(error);
        }
        if self.factory.failing_urls.contains(url) {
            return Err(AppError::NavigationError(format!("net::ERR_FAILED at {url}")));
        }

        self.url = Some(url.to_string());
        Ok(())
    }

    async fn wait_for_ready(&mut self, _marker: &Locator, _timeout: Duration) -> Result<(), AppError> {
        if self.factory.hang_on_ready {
            // Never resolves; the caller's own time bound has to fire.
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn read_texts(&mut self, locators: &[&Locator]) -> Result<Vec<Option<String>>, AppError> {
        {
            let mut errors = self.factory.read_errors.lock().unwrap();
            if !errors.is_empty() {
                return Err(errors.remove(0));
            }
        }
        let url = self
            .url
            .clone()
            .ok_or_else(|| AppError::ExtractionError("no page loaded".into()))?;

        let mut values: Vec<Option<String>> = locators
            .iter()
            .map(|locator| (self.factory.site)(url.as_str(), *locator))
            .collect();
        if let Some(count) = self.factory.truncate_reads {
            values.truncate(count);
        }
        Ok(values)
    }

    async fn close(self) -> Result<(), AppError> {
        self.factory.closed.fetch_add(1, Ordering::SeqCst);
        if self.factory.failing_close {
            return Err(AppError::BrowserError("target already gone".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Mock extractor returning queued responses, recording when it was called.
#[derive(Clone)]
pub struct MockExtractor {
    responses: Arc<Mutex<Vec<Result<FieldSet, AppError>>>>,
    /// Produces the error once the queue is empty, if set.
    fallback_error: Option<Arc<dyn Fn() -> AppError + Send + Sync>>,
    pub calls: Arc<Mutex<Vec<Instant>>>,
}

impl MockExtractor {
    pub fn new(fields: FieldSet) -> Self {
        Self::with_responses(vec![Ok(fields)])
    }

    pub fn with_responses(responses: Vec<Result<FieldSet, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            fallback_error: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every call fails with a fresh error from `make_error`.
    pub fn always_failing<F>(make_error: F) -> Self
    where
        F: Fn() -> AppError + Send + Sync + 'static,
    {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            fallback_error: Some(Arc::new(make_error)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

impl Extractor for MockExtractor {
    async fn extract<S: PageSession>(
        &self,
        _session: &mut S,
        _specs: &FieldSpecs,
    ) -> Result<FieldSet, AppError> {
        self.calls.lock().unwrap().push(Instant::now());
        let mut responses = self.responses.lock().unwrap();
        if !responses.is_empty() {
            return responses.remove(0);
        }
        match &self.fallback_error {
            Some(make_error) => Err(make_error()),
            None => Ok(FieldSet::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockRecordStore
// ---------------------------------------------------------------------------

/// Mock store that records every batch and keeps upserted rows by key.
#[derive(Clone, Default)]
pub struct MockRecordStore {
    /// Each successful `upsert_batch` call, in order.
    pub writes: Arc<Mutex<Vec<Vec<Record>>>>,
    pub rows: Arc<Mutex<BTreeMap<(RunDate, String), Record>>>,
    /// Per-call results: `Some(err)` fails that call. Empty means succeed.
    write_plan: Arc<Mutex<Vec<Option<AppError>>>>,
    pub failed_writes: Arc<AtomicUsize>,
}

impl MockRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_write_plan(plan: Vec<Option<AppError>>) -> Self {
        let store = Self::default();
        *store.write_plan.lock().unwrap() = plan;
        store
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn row(&self, run_date: RunDate, key: &str) -> Option<Record> {
        self.rows
            .lock()
            .unwrap()
            .get(&(run_date, key.to_string()))
            .cloned()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

impl RecordStore for MockRecordStore {
    async fn upsert_batch(&self, records: &[Record]) -> Result<u64, AppError> {
        let planned = {
            let mut plan = self.write_plan.lock().unwrap();
            if plan.is_empty() { None } else { plan.remove(0) }
        };
        if let Some(error) = planned {
            self.failed_writes.fetch_add(1, Ordering::SeqCst);
            return Err(error);
        }

        let mut rows = self.rows.lock().unwrap();
        for record in records {
            rows.insert((record.run_date, record.key.clone()), record.clone());
        }
        self.writes.lock().unwrap().push(records.to_vec());
        Ok(records.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// MockTargetStore
// ---------------------------------------------------------------------------

/// Mock reference tables for a single run date.
#[derive(Clone, Default)]
pub struct MockTargetStore {
    pub latest: Option<String>,
    pub locations: Vec<(String, String)>,
    pub population: Vec<String>,
    pub recorded: Vec<String>,
    pub queried_dates: Arc<Mutex<Vec<RunDate>>>,
}

impl MockTargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latest(mut self, latest: &str) -> Self {
        self.latest = Some(latest.to_string());
        self
    }

    pub fn with_locations(mut self, locations: &[(&str, &str)]) -> Self {
        self.locations = locations
            .iter()
            .map(|(k, l)| (k.to_string(), l.to_string()))
            .collect();
        self
    }

    pub fn with_population(mut self, keys: &[&str]) -> Self {
        self.population = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_recorded(mut self, keys: &[&str]) -> Self {
        self.recorded = keys.iter().map(|k| k.to_string()).collect();
        self
    }
}

impl TargetStore for MockTargetStore {
    async fn latest_run_date(&self) -> Result<Option<String>, AppError> {
        Ok(self.latest.clone())
    }

    async fn target_locations(&self, run_date: RunDate) -> Result<Vec<(String, String)>, AppError> {
        self.queried_dates.lock().unwrap().push(run_date);
        Ok(self.locations.clone())
    }

    async fn population_keys(&self, run_date: RunDate) -> Result<Vec<String>, AppError> {
        self.queried_dates.lock().unwrap().push(run_date);
        Ok(self.population.clone())
    }

    async fn recorded_keys(&self, run_date: RunDate) -> Result<Vec<String>, AppError> {
        self.queried_dates.lock().unwrap().push(run_date);
        Ok(self.recorded.clone())
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock reporter that records worker and sink events as labels.
#[derive(Default, Clone)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

impl WorkerReporter for MockReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        let label = match &event {
            WorkerEvent::Started { .. } => "Started".to_string(),
            WorkerEvent::SessionOpened { .. } => "SessionOpened".to_string(),
            WorkerEvent::JobStarted { job, .. } => format!("JobStarted:{}", job.key),
            WorkerEvent::AttemptFailed { key, attempt, .. } => {
                format!("AttemptFailed:{key}:{attempt}")
            }
            WorkerEvent::JobCompleted { key, .. } => format!("JobCompleted:{key}"),
            WorkerEvent::JobFailed {
                key, unexpected, ..
            } => format!("JobFailed:{key}:{unexpected}"),
            WorkerEvent::Stopped { .. } => "Stopped".to_string(),
        };
        self.events.lock().unwrap().push(label);
    }
}

impl SinkReporter for MockReporter {
    fn report(&self, event: SinkEvent<'_>) {
        let label = match &event {
            SinkEvent::Progress { done, total, .. } => format!("Progress:{done}/{total}"),
            SinkEvent::JobFailed { key, .. } => format!("Failed:{key}"),
            SinkEvent::Flushed { rows } => format!("Flushed:{rows}"),
            SinkEvent::FlushFailed { rows, .. } => format!("FlushFailed:{rows}"),
        };
        self.events.lock().unwrap().push(label);
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Profile whose locators are `.{field}` CSS selectors.
pub fn test_profile() -> PageProfile {
    let fields = FieldSpecs::new(
        Field::ALL
            .iter()
            .map(|f| (*f, Locator::Css(format!(".{}", f.as_str())))),
    )
    .unwrap();
    PageProfile::new(
        "test",
        Locator::Css("#stock-page".into()),
        Locator::Css("#quick-info".into()),
        fields,
    )
}

pub fn test_run_date() -> RunDate {
    "20240105".parse().unwrap()
}

/// A field set with every field set to `"{prefix}-{field}"`.
pub fn make_fields(prefix: &str) -> FieldSet {
    Field::ALL.iter().fold(FieldSet::new(), |set, f| {
        set.with(*f, format!("{prefix}-{}", f.as_str()))
    })
}
