//! Run orchestration: job queue, worker pool, and the result sink.
//!
//! ```text
//! JobPlan ─▶ feeder ─▶ [job queue] ─▶ FetchWorker × W ─▶ [results] ─▶ ResultSink ─▶ RecordStore
//!                                          │
//!                                     RateLimiter (shared)
//! ```
//!
//! The sink drains exactly `total` outcomes. Once it is done, one stop
//! marker per worker goes onto the queue and the pool is joined. A fatal
//! store error cancels the run: workers finish their in-flight job, take
//! no new ones, and the sink still attempts a final flush.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::AppError;
use crate::models::{Job, RunDate, SelectionMode};
use crate::profile::PageProfile;
use crate::sink::{ResultSink, SinkReporter, SinkStats, TracingSinkReporter};
use crate::source::JobPlan;
use crate::throttle::RateLimiter;
use crate::traits::{Extractor, RecordStore, SessionFactory};
use crate::worker::{FetchWorker, QueueItem, TracingWorkerReporter, WorkerReporter};

/// Final counters for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub run_date: RunDate,
    pub mode: SelectionMode,
    pub total: usize,
    pub ok: usize,
    pub ng: usize,
    /// Keys that were wanted but had no usable location.
    pub unresolved: usize,
    pub written: u64,
    pub batches: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    fn new(
        run_id: Uuid,
        run_date: RunDate,
        mode: SelectionMode,
        unresolved: usize,
        stats: SinkStats,
        elapsed: Duration,
    ) -> Self {
        Self {
            run_id,
            run_date,
            mode,
            total: stats.total,
            ok: stats.ok,
            ng: stats.ng,
            unresolved,
            written: stats.written,
            batches: stats.batches,
            elapsed,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OK:{} NG:{} / total:{} / mode={} / date={}",
            self.ok, self.ng, self.total, self.mode, self.run_date
        )?;
        if self.unresolved > 0 {
            write!(f, " / unresolved:{}", self.unresolved)?;
        }
        Ok(())
    }
}

/// A run that stopped early, with the counters it reached.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RunFailure {
    pub summary: RunSummary,
    #[source]
    pub error: AppError,
}

/// Wires the worker pool, the shared limiter, and the sink into one run.
pub struct Pipeline<F, E, S, WR = TracingWorkerReporter, SR = TracingSinkReporter>
where
    F: SessionFactory,
    E: Extractor,
    S: RecordStore,
    WR: WorkerReporter + 'static,
    SR: SinkReporter + 'static,
{
    factory: F,
    extractor: E,
    store: S,
    profile: Arc<PageProfile>,
    config: PipelineConfig,
    worker_reporter: Arc<WR>,
    sink_reporter: Arc<SR>,
}

impl<F, E, S> Pipeline<F, E, S>
where
    F: SessionFactory,
    E: Extractor,
    S: RecordStore,
{
    pub fn new(factory: F, extractor: E, store: S, profile: PageProfile, config: PipelineConfig) -> Self {
        Self {
            factory,
            extractor,
            store,
            profile: Arc::new(profile),
            config,
            worker_reporter: Arc::new(TracingWorkerReporter),
            sink_reporter: Arc::new(TracingSinkReporter),
        }
    }
}

impl<F, E, S, WR, SR> Pipeline<F, E, S, WR, SR>
where
    F: SessionFactory,
    E: Extractor,
    S: RecordStore,
    WR: WorkerReporter + 'static,
    SR: SinkReporter + 'static,
{
    /// Swap the event reporters.
    pub fn with_reporters<WR2, SR2>(self, worker_reporter: WR2, sink_reporter: SR2) -> Pipeline<F, E, S, WR2, SR2>
    where
        WR2: WorkerReporter + 'static,
        SR2: SinkReporter + 'static,
    {
        Pipeline {
            factory: self.factory,
            extractor: self.extractor,
            store: self.store,
            profile: self.profile,
            config: self.config,
            worker_reporter: Arc::new(worker_reporter),
            sink_reporter: Arc::new(sink_reporter),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process every job in `plan` and return the run's counters.
    ///
    /// An empty plan returns immediately without opening any session. On a
    /// fatal error the returned [`RunFailure`] still carries the counters
    /// reached so far.
    pub async fn execute(
        &self,
        run_date: RunDate,
        mode: SelectionMode,
        plan: JobPlan,
    ) -> Result<RunSummary, RunFailure> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let unresolved = plan.unresolved.len();
        let total = plan.jobs.len();
        let fail = |stats: SinkStats, error: AppError| RunFailure {
            summary: RunSummary::new(run_id, run_date, mode, unresolved, stats, started.elapsed()),
            error,
        };
        let untouched = SinkStats {
            total,
            ..SinkStats::default()
        };

        let limiter = match self
            .config
            .validate()
            .and_then(|()| RateLimiter::from_qps(self.config.qps))
        {
            Ok(limiter) => limiter,
            Err(e) => return Err(fail(untouched, e)),
        };
        if total == 0 {
            return Ok(RunSummary::new(run_id, run_date, mode, unresolved, untouched, started.elapsed()));
        }

        let worker_count = self.config.effective_workers();
        let capacity = self
            .config
            .queue_capacity
            .unwrap_or(total + worker_count)
            .max(worker_count);

        tracing::info!(
            %run_id,
            %run_date,
            mode = %mode,
            total,
            workers = worker_count,
            qps = self.config.qps,
            batch_size = self.config.effective_batch_size(),
            "Starting run"
        );

        let cancel = CancellationToken::new();
        let (job_tx, job_rx) = mpsc::channel::<QueueItem>(capacity);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, result_rx) = mpsc::unbounded_channel();

        // Sink
        let sink = ResultSink::new(
            self.store.clone(),
            run_date,
            total,
            self.config.effective_batch_size(),
        )
        .with_progress_every(self.config.progress_every);
        let sink_reporter = Arc::clone(&self.sink_reporter);
        let sink_cancel = cancel.clone();
        let mut sink_handle = tokio::spawn(async move {
            let (stats, result) = sink.finish(result_rx, &*sink_reporter).await;
            if result.is_err() {
                sink_cancel.cancel();
            }
            (stats, result)
        });

        // Workers
        let mut workers = JoinSet::new();
        for i in 0..worker_count {
            let worker = FetchWorker::new(
                format!("worker-{}", i + 1),
                self.factory.clone(),
                self.extractor.clone(),
                limiter.clone(),
                Arc::clone(&self.profile),
                &self.config,
            );
            let jobs = Arc::clone(&job_rx);
            let results = result_tx.clone();
            let cancel = cancel.clone();
            let reporter = Arc::clone(&self.worker_reporter);
            workers.spawn(async move { worker.run(jobs, results, cancel, &*reporter).await });
        }
        // Only workers hold result senders; the sink sees a closed channel if they all die.
        drop(result_tx);

        // Feeder
        let feeder = tokio::spawn(feed_jobs(job_tx.clone(), plan.jobs, cancel.clone()));

        let sink_result = loop {
            tokio::select! {
                joined = &mut sink_handle => break joined,
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Worker task failed, cancelling run");
                        cancel.cancel();
                    }
                }
            }
        };

        if !cancel.is_cancelled() {
            for _ in 0..worker_count {
                if job_tx.send(QueueItem::Stop).await.is_err() {
                    break;
                }
            }
        }
        drop(job_tx);

        if let Err(e) = feeder.await {
            tracing::error!(error = %e, "Job feeder task failed");
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Worker task failed");
            }
        }

        let stats = match sink_result {
            Ok((stats, Ok(()))) => stats,
            Ok((stats, Err(e))) => {
                tracing::error!(%run_id, ok = stats.ok, ng = stats.ng, error = %e, "Run aborted");
                return Err(fail(stats, e));
            }
            Err(e) => {
                let error = AppError::Generic(format!("Result sink task failed: {e}"));
                return Err(fail(untouched, error));
            }
        };
        let summary = RunSummary::new(run_id, run_date, mode, unresolved, stats, started.elapsed());

        tracing::info!(
            %run_id,
            ok = summary.ok,
            ng = summary.ng,
            written = summary.written,
            elapsed_ms = %summary.elapsed.as_millis(),
            "Run finished"
        );
        Ok(summary)
    }
}

async fn feed_jobs(tx: mpsc::Sender<QueueItem>, jobs: Vec<Job>, cancel: CancellationToken) {
    for job in jobs {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            sent = tx.send(QueueItem::Job(job)) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}
