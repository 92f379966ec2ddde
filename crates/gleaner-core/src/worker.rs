use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::config::{PipelineConfig, RetryConfig};
use crate::error::AppError;
use crate::fields::FieldSet;
use crate::models::{Job, Outcome};
use crate::profile::PageProfile;
use crate::throttle::RateLimiter;
use crate::traits::{Extractor, PageSession, SessionFactory};

/// Item on the shared job queue.
#[derive(Debug, Clone)]
pub enum QueueItem {
    Job(Job),
    /// Tells exactly one worker to stop.
    Stop,
}

/// Receiving half of the job queue, shared by every worker.
pub type JobReceiver = Arc<Mutex<mpsc::Receiver<QueueItem>>>;

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: &'a str,
    },
    SessionOpened {
        worker_id: &'a str,
    },
    JobStarted {
        worker_id: &'a str,
        job: &'a Job,
    },
    AttemptFailed {
        worker_id: &'a str,
        key: &'a str,
        attempt: u32,
        error: &'a str,
        retry_in: Duration,
    },
    JobCompleted {
        worker_id: &'a str,
        key: &'a str,
        attempts: u32,
    },
    JobFailed {
        worker_id: &'a str,
        key: &'a str,
        error: &'a str,
        attempts: u32,
        unexpected: bool,
    },
    Stopped {
        worker_id: &'a str,
        processed: u64,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::debug!(%worker_id, "Worker started");
            }
            WorkerEvent::SessionOpened { worker_id } => {
                tracing::debug!(%worker_id, "Page session opened");
            }
            WorkerEvent::JobStarted { worker_id, job } => {
                tracing::debug!(%worker_id, key = %job.key, location = %job.location, "Processing job");
            }
            WorkerEvent::AttemptFailed {
                worker_id,
                key,
                attempt,
                error,
                retry_in,
            } => {
                tracing::debug!(
                    %worker_id,
                    %key,
                    attempt,
                    %error,
                    delay_ms = %retry_in.as_millis(),
                    "Attempt failed, backing off"
                );
            }
            WorkerEvent::JobCompleted {
                worker_id,
                key,
                attempts,
            } => {
                tracing::debug!(%worker_id, %key, attempts, "Job completed");
            }
            WorkerEvent::JobFailed {
                worker_id,
                key,
                error,
                attempts,
                unexpected,
            } => {
                if unexpected {
                    tracing::error!(%worker_id, %key, %error, attempts, unexpected, "Job failed");
                } else {
                    tracing::warn!(%worker_id, %key, %error, attempts, "Job failed");
                }
            }
            WorkerEvent::Stopped {
                worker_id,
                processed,
            } => {
                tracing::debug!(%worker_id, processed, "Worker stopped");
            }
        }
    }
}

/// Pulls jobs off the shared queue and turns each into exactly one [`Outcome`].
///
/// Each worker owns one page session for its whole lifetime. The session
/// is opened lazily on the first attempt, reused across jobs, replaced
/// only after a browser-level failure, and closed when the worker stops.
pub struct FetchWorker<F, E>
where
    F: SessionFactory,
    E: Extractor,
{
    id: String,
    factory: F,
    extractor: E,
    limiter: RateLimiter,
    profile: Arc<PageProfile>,
    retry: RetryConfig,
    page_timeout: Duration,
}

impl<F, E> FetchWorker<F, E>
where
    F: SessionFactory,
    E: Extractor,
{
    pub fn new(
        id: impl Into<String>,
        factory: F,
        extractor: E,
        limiter: RateLimiter,
        profile: Arc<PageProfile>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            id: id.into(),
            factory,
            extractor,
            limiter,
            profile,
            retry: config.retry.clone(),
            page_timeout: config.page_timeout,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run until a stop marker arrives, the queue closes, or `cancel` fires.
    ///
    /// A job already dequeued always runs to completion. Returns the number
    /// of jobs processed.
    pub async fn run<WR: WorkerReporter>(
        &self,
        jobs: JobReceiver,
        results: mpsc::UnboundedSender<Outcome>,
        cancel: CancellationToken,
        reporter: &WR,
    ) -> u64 {
        reporter.report(WorkerEvent::Started {
            worker_id: &self.id,
        });

        let mut session: Option<F::Session> = None;
        let mut processed = 0u64;

        loop {
            let item = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                item = next_item(&jobs) => item,
            };
            let job = match item {
                Some(QueueItem::Job(job)) => job,
                Some(QueueItem::Stop) | None => break,
            };

            reporter.report(WorkerEvent::JobStarted {
                worker_id: &self.id,
                job: &job,
            });
            let outcome = self.process_job(&mut session, &job, reporter).await;
            processed += 1;

            if results.send(outcome).is_err() {
                tracing::warn!(worker_id = %self.id, "Result channel closed, stopping");
                break;
            }
        }

        if let Some(page) = session.take() {
            if let Err(e) = page.close().await {
                tracing::warn!(worker_id = %self.id, error = %e, "Failed to close page session");
            }
        }

        reporter.report(WorkerEvent::Stopped {
            worker_id: &self.id,
            processed,
        });
        processed
    }

    /// Rate-limit once, then attempt the job with backoff until it succeeds,
    /// fails with a non-retryable error, or runs out of attempts.
    async fn process_job<WR: WorkerReporter>(
        &self,
        session: &mut Option<F::Session>,
        job: &Job,
        reporter: &WR,
    ) -> Outcome {
        self.limiter.acquire().await;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.attempt(session, job, reporter).await {
                Ok(fields) => {
                    reporter.report(WorkerEvent::JobCompleted {
                        worker_id: &self.id,
                        key: &job.key,
                        attempts: attempt,
                    });
                    return Outcome::Success {
                        key: job.key.clone(),
                        fields: fields.normalized(),
                    };
                }
                Err(error) => {
                    let error_msg = error.to_string();
                    if error.is_retryable() && attempt < self.retry.max_attempts {
                        let delay = self.retry.delay_for_attempt(attempt);
                        reporter.report(WorkerEvent::AttemptFailed {
                            worker_id: &self.id,
                            key: &job.key,
                            attempt,
                            error: &error_msg,
                            retry_in: delay,
                        });
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    reporter.report(WorkerEvent::JobFailed {
                        worker_id: &self.id,
                        key: &job.key,
                        error: &error_msg,
                        attempts: attempt,
                        unexpected: error.is_unexpected(),
                    });
                    return Outcome::Failure {
                        key: job.key.clone(),
                        error,
                        attempts: attempt,
                    };
                }
            }
        }
    }

    /// One navigate → wait → wait → extract pass.
    async fn attempt<WR: WorkerReporter>(
        &self,
        session: &mut Option<F::Session>,
        job: &Job,
        reporter: &WR,
    ) -> Result<FieldSet, AppError> {
        let mut page = match session.take() {
            Some(page) => page,
            None => {
                let page = self.factory.open().await?;
                reporter.report(WorkerEvent::SessionOpened {
                    worker_id: &self.id,
                });
                page
            }
        };

        let result = self.fetch_fields(&mut page, job).await;

        // A broken browser connection poisons the page; open a fresh one next time.
        if let Err(AppError::BrowserError(_)) = &result {
            if let Err(e) = page.close().await {
                tracing::debug!(worker_id = %self.id, error = %e, "Failed to close broken page session");
            }
        } else {
            *session = Some(page);
        }
        result
    }

    async fn fetch_fields(&self, page: &mut F::Session, job: &Job) -> Result<FieldSet, AppError> {
        let timeout = self.page_timeout;

        tokio::time::timeout(timeout, page.navigate(&job.location, timeout))
            .await
            .map_err(|_| AppError::Timeout(timeout.as_secs()))??;

        for marker in [&self.profile.container, &self.profile.ready] {
            tokio::time::timeout(timeout, page.wait_for_ready(marker, timeout))
                .await
                .map_err(|_| AppError::ReadinessTimeout {
                    marker: marker.to_string(),
                    seconds: timeout.as_secs(),
                })??;
        }

        self.extractor.extract(page, &self.profile.fields).await
    }
}

async fn next_item(jobs: &JobReceiver) -> Option<QueueItem> {
    let mut guard = jobs.lock().await;
    guard.recv().await
}
