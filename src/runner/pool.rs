//! Bounded pool for running several downloads in parallel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::runner::{CancelReason, ProcessRunner, RunError, RunEvent, RunRequest, RunResult};

/// Default number of downloads run at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Error type for pool operations.
#[derive(thiserror::Error, Debug)]
pub enum PoolError {
    /// No active job has this id.
    #[error("Job not found: {id}")]
    JobNotFound { id: Uuid },

    /// A job task panicked or was aborted.
    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

/// A run event tagged with the job it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: Uuid,
    pub event: RunEvent,
}

/// Metadata for a submitted job.
#[derive(Debug, Clone)]
pub struct JobMeta {
    /// Unique job identifier.
    pub id: Uuid,
    /// URL being downloaded.
    pub url: String,
    /// When the job was submitted.
    pub submitted_at: Instant,
    cancel: CancellationToken,
}

impl JobMeta {
    fn new(url: String, cancel: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            submitted_at: Instant::now(),
            cancel,
        }
    }

    /// Cancel this job.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Check if this job is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Result of a finished job.
#[derive(Debug)]
pub struct JobResult {
    pub id: Uuid,
    pub url: String,
    pub result: Result<RunResult, RunError>,
}

impl JobResult {
    /// Returns true if the download completed successfully.
    #[must_use]
    pub fn success(&self) -> bool {
        self.result.as_ref().is_ok_and(RunResult::success)
    }
}

/// Aggregated statistics across all finished jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub completed: usize,
    /// Nonzero exits and runs that could not be started.
    pub failed: usize,
    pub cancelled: usize,
}

impl PoolStats {
    /// Add the outcome of a finished job.
    pub fn add(&mut self, result: &Result<RunResult, RunError>) {
        match result {
            Ok(run) if run.success() => self.completed += 1,
            Ok(run) if run.is_cancelled() => self.cancelled += 1,
            _ => self.failed += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }
}

/// Runs downloads with a bound on how many processes exist at once.
///
/// Events from every job are forwarded, tagged with the job id, to the
/// receiver returned by [`DownloadPool::new`].
pub struct DownloadPool {
    runner: Arc<ProcessRunner>,
    jobs: HashMap<Uuid, JobMeta>,
    join_set: JoinSet<JobResult>,
    semaphore: Arc<Semaphore>,
    /// Parent of every job token.
    cancel: CancellationToken,
    events: UnboundedSender<JobEvent>,
    max_concurrent: usize,
    stats: PoolStats,
}

impl DownloadPool {
    /// Create a pool running at most `max_concurrent` downloads at once
    /// (at least one).
    #[must_use]
    pub fn new(runner: ProcessRunner, max_concurrent: usize) -> (Self, UnboundedReceiver<JobEvent>) {
        let max_concurrent = max_concurrent.max(1);
        let (events, rx) = mpsc::unbounded_channel();
        let pool = Self {
            runner: Arc::new(runner),
            jobs: HashMap::new(),
            join_set: JoinSet::new(),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            cancel: CancellationToken::new(),
            events,
            max_concurrent,
            stats: PoolStats::default(),
        };
        (pool, rx)
    }

    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Number of submitted jobs that have not been joined yet.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.jobs.len()
    }

    /// Metadata for all jobs not yet joined.
    #[must_use]
    pub fn active_jobs(&self) -> Vec<&JobMeta> {
        self.jobs.values().collect()
    }

    #[must_use]
    pub fn get_job(&self, id: Uuid) -> Option<&JobMeta> {
        self.jobs.get(&id)
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Check if there are any jobs still running or queued.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.join_set.is_empty()
    }

    /// Token that cancels every job when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Queue a download. It starts once a slot is free.
    pub fn submit(&mut self, url: impl Into<String>, request: RunRequest) -> Uuid {
        let meta = JobMeta::new(url.into(), self.cancel.child_token());
        let id = meta.id;
        let url = meta.url.clone();
        let cancel = meta.cancel.clone();
        let runner = Arc::clone(&self.runner);
        let semaphore = Arc::clone(&self.semaphore);
        let pool_events = self.events.clone();

        tracing::debug!(job_id = %id, url = %url, "Job submitted");
        self.jobs.insert(id, meta);

        self.join_set.spawn(async move {
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                permit = semaphore.acquire_owned() => permit.ok(),
            };
            let Some(_permit) = permit else {
                tracing::debug!(job_id = %id, "Job cancelled before start");
                let result = RunResult::cancelled_before_start(CancelReason::Requested);
                let finished = JobEvent {
                    job_id: id,
                    event: RunEvent::Finished(result.state.clone()),
                };
                if pool_events.send(finished).is_err() {
                    tracing::trace!("Pool event receiver dropped");
                }
                return JobResult {
                    id,
                    url,
                    result: Ok(result),
                };
            };

            tracing::debug!(job_id = %id, "Job started");
            let (tx, rx) = mpsc::unbounded_channel();
            let (result, ()) = tokio::join!(
                runner.run(request, cancel, tx),
                forward_events(id, rx, &pool_events),
            );
            JobResult { id, url, result }
        });

        id
    }

    /// Cancel one job, queued or running.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::JobNotFound` if no active job has this id.
    pub fn cancel(&self, id: Uuid) -> Result<(), PoolError> {
        let job = self.jobs.get(&id).ok_or(PoolError::JobNotFound { id })?;
        job.cancel();
        Ok(())
    }

    /// Cancel every job.
    pub fn cancel_all(&self) {
        tracing::debug!(jobs = self.jobs.len(), "Cancelling all jobs");
        self.cancel.cancel();
    }

    /// Wait for the next job to finish.
    ///
    /// Returns `None` when no jobs remain.
    pub async fn join_next(&mut self) -> Option<Result<JobResult, PoolError>> {
        let joined = self.join_set.join_next().await?;
        Some(match joined {
            Ok(job) => {
                self.jobs.remove(&job.id);
                self.stats.add(&job.result);
                Ok(job)
            }
            Err(e) => {
                self.stats.failed += 1;
                Err(PoolError::from(e))
            }
        })
    }

    /// Wait for every job to finish.
    pub async fn join_all(&mut self) -> Vec<Result<JobResult, PoolError>> {
        let mut results = Vec::new();
        while let Some(result) = self.join_next().await {
            results.push(result);
        }
        results
    }
}

async fn forward_events(
    job_id: Uuid,
    mut rx: UnboundedReceiver<RunEvent>,
    pool_events: &UnboundedSender<JobEvent>,
) {
    while let Some(event) = rx.recv().await {
        if pool_events.send(JobEvent { job_id, event }).is_err() {
            tracing::trace!("Pool event receiver dropped");
        }
    }
}
