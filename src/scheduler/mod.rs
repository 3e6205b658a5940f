//! Priority-aware token-bucket scheduler for outbound provider calls.
//!
//! Every submitted operation waits in a two-tier queue until the driver admits
//! it. Admission needs a token, a free concurrency slot, and, for
//! [`Priority::Normal`] work, a slot below the low-priority ceiling. The slots
//! above that ceiling stay available to [`Priority::High`] lookups under load.
//!
//! Refill timing follows `tokio::time::Instant`; tests pause tokio time to
//! drive it.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::config::SchedulerConfig;
use crate::error::{AppError, Result};

pub mod bucket;
mod driver;
pub mod queue;

pub use bucket::TokenBucket;
pub use queue::{Priority, PriorityQueue};

use driver::{Driver, Job};

/// Point-in-time view of the limiter, published after every admission pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct SchedulerStats {
    pub queued: usize,
    pub active: usize,
    pub tokens: f64,
}

/// Cloneable handle to a running scheduler.
///
/// The driver task lives until every handle is dropped and the remaining queue
/// has drained.
#[derive(Clone)]
pub struct Scheduler {
    submissions: mpsc::UnboundedSender<Job>,
    stats: watch::Receiver<SchedulerStats>,
    queued: Arc<AtomicUsize>,
    task_timeout: Option<Duration>,
    max_queue_depth: Option<usize>,
}

impl Scheduler {
    /// Spawn the driver on the current tokio runtime.
    pub fn new(config: &SchedulerConfig) -> Self {
        let (submissions, rx) = mpsc::unbounded_channel();
        let (stats_tx, stats) = watch::channel(SchedulerStats::default());
        let queued = Arc::new(AtomicUsize::new(0));

        let driver = Driver::new(config, Arc::clone(&queued), rx, stats_tx);
        tokio::spawn(driver.run());

        Self {
            submissions,
            stats,
            queued,
            task_timeout: config.task_timeout,
            max_queue_depth: config.max_queue_depth,
        }
    }

    /// Queue `operation` at `priority` and wait for its result.
    ///
    /// The closure runs only once the task is admitted. Its error is returned
    /// unchanged; an operation that outlives the configured deadline resolves
    /// with [`AppError::Timeout`] and releases its slot.
    pub async fn enqueue<T, F, Fut>(&self, priority: Priority, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.reserve_queue_slot()?;

        let (tx, rx) = oneshot::channel();
        let deadline = self.task_timeout;
        let job = Job {
            priority,
            submitted_at: Instant::now(),
            operation: async move {
                let result = match deadline {
                    Some(limit) => tokio::time::timeout(limit, operation())
                        .await
                        .unwrap_or_else(|_| Err(AppError::Timeout(limit))),
                    None => operation().await,
                };
                let _ = tx.send(result);
            }
            .boxed(),
        };

        if self.submissions.send(job).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(AppError::SchedulerClosed);
        }

        rx.await
            .map_err(|_| AppError::message("scheduled operation aborted before completing"))?
    }

    pub fn stats(&self) -> SchedulerStats {
        *self.stats.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerStats> {
        self.stats.clone()
    }

    /// Number of tasks submitted but not yet admitted.
    pub fn queue_len(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    fn reserve_queue_slot(&self) -> Result<()> {
        match self.max_queue_depth {
            None => {
                self.queued.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Some(max) => self
                .queued
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |depth| {
                    (depth < max).then_some(depth + 1)
                })
                .map(|_| ())
                .map_err(|depth| AppError::RateLimited { depth }),
        }
    }
}
