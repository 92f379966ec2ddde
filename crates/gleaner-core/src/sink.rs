//! Single consumer of fetch outcomes.
//!
//! The sink is the only component that touches the store's write path. It
//! counts every outcome, buffers successful records, and writes them in
//! batches of `batch_size` rows, one atomic upsert per batch.

use tokio::sync::mpsc;

use crate::error::AppError;
use crate::models::{Outcome, Record, RunDate};
use crate::traits::RecordStore;

/// Failure diagnostics are cut to this many characters.
pub const ERROR_PREVIEW_CHARS: usize = 120;

/// Events emitted by the sink for user-facing progress output.
#[derive(Debug, Clone)]
pub enum SinkEvent<'a> {
    Progress {
        done: usize,
        total: usize,
        ok: usize,
        ng: usize,
    },
    JobFailed {
        done: usize,
        total: usize,
        key: &'a str,
        error: &'a str,
    },
    Flushed {
        rows: u64,
    },
    FlushFailed {
        rows: usize,
        error: &'a str,
    },
}

/// Trait for receiving sink events.
pub trait SinkReporter: Send + Sync {
    fn report(&self, event: SinkEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSinkReporter;

impl SinkReporter for TracingSinkReporter {
    fn report(&self, event: SinkEvent<'_>) {
        match event {
            SinkEvent::Progress {
                done,
                total,
                ok,
                ng,
            } => {
                tracing::info!(done, total, ok, ng, "Progress");
            }
            SinkEvent::JobFailed {
                done,
                total,
                key,
                error,
            } => {
                tracing::warn!(done, total, %key, %error, "Job failed");
            }
            SinkEvent::Flushed { rows } => {
                tracing::debug!(rows, "Batch written");
            }
            SinkEvent::FlushFailed { rows, error } => {
                tracing::error!(rows, %error, "Batch write failed");
            }
        }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub total: usize,
    pub done: usize,
    pub ok: usize,
    pub ng: usize,
    /// Rows written by successful batches.
    pub written: u64,
    /// Successful store writes.
    pub batches: usize,
}

pub struct ResultSink<S: RecordStore> {
    store: S,
    run_date: RunDate,
    batch_size: usize,
    progress_every: usize,
    buffer: Vec<Record>,
    stats: SinkStats,
}

impl<S: RecordStore> ResultSink<S> {
    pub fn new(store: S, run_date: RunDate, total: usize, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            run_date,
            batch_size,
            progress_every: 50,
            buffer: Vec::with_capacity(batch_size.min(total)),
            stats: SinkStats {
                total,
                ..SinkStats::default()
            },
        }
    }

    pub fn with_progress_every(mut self, every: usize) -> Self {
        self.progress_every = every.max(1);
        self
    }

    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_complete(&self) -> bool {
        self.stats.done >= self.stats.total
    }

    /// Count one outcome, flushing when the buffer reaches the batch size.
    pub async fn accept<R: SinkReporter + ?Sized>(
        &mut self,
        outcome: Outcome,
        reporter: &R,
    ) -> Result<(), AppError> {
        self.stats.done += 1;
        let (done, total) = (self.stats.done, self.stats.total);

        match outcome {
            Outcome::Success { key, fields } => {
                self.stats.ok += 1;
                self.buffer.push(Record::new(self.run_date, key, fields));
            }
            Outcome::Failure { key, error, .. } => {
                self.stats.ng += 1;
                let error = truncate_error(&error.to_string(), ERROR_PREVIEW_CHARS);
                reporter.report(SinkEvent::JobFailed {
                    done,
                    total,
                    key: &key,
                    error: &error,
                });
            }
        }

        if done % self.progress_every == 0 || done == total {
            reporter.report(SinkEvent::Progress {
                done,
                total,
                ok: self.stats.ok,
                ng: self.stats.ng,
            });
        }

        if self.buffer.len() >= self.batch_size {
            self.flush(reporter).await?;
        }
        Ok(())
    }

    /// Write the buffer as one atomic batch.
    ///
    /// On failure the buffer is kept so a later flush can retry it.
    pub async fn flush<R: SinkReporter + ?Sized>(&mut self, reporter: &R) -> Result<(), AppError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        match self.store.upsert_batch(&self.buffer).await {
            Ok(rows) => {
                self.stats.written += rows;
                self.stats.batches += 1;
                self.buffer.clear();
                reporter.report(SinkEvent::Flushed { rows });
                Ok(())
            }
            Err(e) => {
                let error = e.to_string();
                reporter.report(SinkEvent::FlushFailed {
                    rows: self.buffer.len(),
                    error: &error,
                });
                Err(e)
            }
        }
    }

    /// Receive outcomes until `total` have been observed.
    pub async fn drain<R: SinkReporter + ?Sized>(
        &mut self,
        rx: &mut mpsc::UnboundedReceiver<Outcome>,
        reporter: &R,
    ) -> Result<(), AppError> {
        while !self.is_complete() {
            let Some(outcome) = rx.recv().await else {
                return Err(AppError::Generic(format!(
                    "Result channel closed after {} of {} outcomes",
                    self.stats.done, self.stats.total
                )));
            };
            self.accept(outcome, reporter).await?;
        }
        Ok(())
    }

    /// Drain, then flush whatever is left, even when draining failed.
    ///
    /// The drain error wins over a final-flush error.
    pub async fn run<R: SinkReporter + ?Sized>(
        self,
        rx: mpsc::UnboundedReceiver<Outcome>,
        reporter: &R,
    ) -> Result<SinkStats, AppError> {
        let (stats, result) = self.finish(rx, reporter).await;
        result.map(|()| stats)
    }

    /// Like [`ResultSink::run`], but hands back the counters on failure too.
    pub async fn finish<R: SinkReporter + ?Sized>(
        mut self,
        mut rx: mpsc::UnboundedReceiver<Outcome>,
        reporter: &R,
    ) -> (SinkStats, Result<(), AppError>) {
        let drained = self.drain(&mut rx, reporter).await;
        let flushed = self.flush(reporter).await;

        let result = match (drained, flushed) {
            (Err(e), flushed) => {
                if let Err(flush_err) = flushed {
                    tracing::error!(error = %flush_err, "Final flush failed");
                }
                Err(e)
            }
            (Ok(()), flushed) => flushed,
        };
        (self.stats, result)
    }
}

/// Cut `message` to at most `max_chars` characters, on a char boundary.
pub fn truncate_error(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}
