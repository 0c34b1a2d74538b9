//! Bounded-concurrency download executor.
//!
//! Tasks are driven from a single future with `buffer_unordered`, so at most
//! `concurrency_limit` of them are ever polled at once. Each task runs its
//! attempts under a timeout and the retry policy, and every submitted task
//! yields exactly one [`DownloadResult`], including tasks that were skipped
//! because the run was cancelled.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::AppError;
use crate::models::{DownloadResult, DownloadSuccess, DownloadTask};
use crate::retry::{self, RetryAction, RetryConfig};

#[derive(Debug, Clone)]
pub struct DownloadScheduler {
    concurrency_limit: usize,
    retry: RetryConfig,
    attempt_timeout: Duration,
}

impl DownloadScheduler {
    /// Creates a scheduler.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `concurrency_limit` is zero or
    /// `attempt_timeout` is zero.
    pub fn new(
        concurrency_limit: usize,
        retry: RetryConfig,
        attempt_timeout: Duration,
    ) -> Result<Self, AppError> {
        if concurrency_limit == 0 {
            return Err(AppError::Config(
                "concurrency limit must be at least 1".to_string(),
            ));
        }
        if attempt_timeout.is_zero() {
            return Err(AppError::Config(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            concurrency_limit,
            retry,
            attempt_timeout,
        })
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Runs every task through `work`, returning one result per task in
    /// completion order.
    ///
    /// `work` is called once per attempt. Transient errors are retried with
    /// backoff; anything else fails the task immediately. Once `cancel` fires,
    /// in-flight attempts and backoff sleeps are dropped and tasks that have
    /// not started are reported as [`AppError::Cancelled`]. Results produced
    /// before cancellation are kept.
    pub async fn run<F, Fut>(
        &self,
        tasks: Vec<DownloadTask>,
        cancel: &CancellationToken,
        work: F,
    ) -> Vec<DownloadResult>
    where
        F: Fn(&DownloadTask) -> Fut,
        Fut: Future<Output = Result<DownloadSuccess, AppError>>,
    {
        let total = tasks.len();
        let completed = AtomicUsize::new(0);
        let work = &work;
        let completed = &completed;

        stream::iter(tasks)
            .map(|task| async move {
                let outcome = if cancel.is_cancelled() {
                    Err(AppError::Cancelled)
                } else {
                    tokio::select! {
                        biased;
                        r = self.run_task(&task, work) => r,
                        _ = cancel.cancelled() => Err(AppError::Cancelled),
                    }
                };

                let n = completed.fetch_add(1, Ordering::Relaxed) + 1;
                match &outcome {
                    Ok(success) => info!(
                        "[{}/{}] ✓ {} ({} rows, {} bytes)",
                        n, total, task.dataset_id, success.row_count, success.bytes_written
                    ),
                    Err(AppError::Cancelled) => {
                        debug!("[{}/{}] cancelled {}", n, total, task.dataset_id)
                    }
                    Err(e) => error!(
                        "[{}/{}] Failed {} ({}): {}",
                        n,
                        total,
                        task.dataset_id,
                        e.kind(),
                        e
                    ),
                }

                DownloadResult {
                    dataset_id: task.dataset_id,
                    expected_modified: task.expected_modified,
                    outcome,
                }
            })
            .buffer_unordered(self.concurrency_limit)
            .collect()
            .await
    }

    async fn run_task<F, Fut>(
        &self,
        task: &DownloadTask,
        work: &F,
    ) -> Result<DownloadSuccess, AppError>
    where
        F: Fn(&DownloadTask) -> Fut,
        Fut: Future<Output = Result<DownloadSuccess, AppError>>,
    {
        let timeout = self.attempt_timeout;
        retry::retry_with_backoff(
            &self.retry,
            |e: &AppError| {
                if e.is_retryable() {
                    RetryAction::Retry
                } else {
                    RetryAction::Abort
                }
            },
            |attempt| {
                if attempt > 0 {
                    debug!("Retrying {} (attempt {})", task.dataset_id, attempt + 1);
                }
                let fut = work(task);
                async move {
                    match tokio::time::timeout(timeout, fut).await {
                        Ok(result) => result,
                        Err(_) => Err(AppError::Timeout(timeout)),
                    }
                }
            },
        )
        .await
    }
}
