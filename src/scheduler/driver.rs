use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use log::{debug, trace};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};

use crate::config::SchedulerConfig;

use super::bucket::TokenBucket;
use super::queue::{Priority, PriorityQueue};
use super::SchedulerStats;

/// A queued unit of work. `operation` resolves the caller's future itself.
pub(super) struct Job {
    pub priority: Priority,
    pub submitted_at: Instant,
    pub operation: BoxFuture<'static, ()>,
}

enum Event {
    Submitted(Option<Job>),
    Completed,
    RefillDue,
}

/// Signals the driver when a running job ends, including by panic or abort.
struct CompletionGuard(mpsc::UnboundedSender<()>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

/// Owns the limiter state. Only this task mutates tokens, the active count and
/// the queue, so admission decisions are serialized.
pub(super) struct Driver {
    capacity: usize,
    low_priority_limit: usize,
    bucket: TokenBucket,
    queue: PriorityQueue<Job>,
    active: usize,
    queued: Arc<AtomicUsize>,
    submissions: mpsc::UnboundedReceiver<Job>,
    done_tx: mpsc::UnboundedSender<()>,
    done_rx: mpsc::UnboundedReceiver<()>,
    stats: watch::Sender<SchedulerStats>,
}

impl Driver {
    pub(super) fn new(
        config: &SchedulerConfig,
        queued: Arc<AtomicUsize>,
        submissions: mpsc::UnboundedReceiver<Job>,
        stats: watch::Sender<SchedulerStats>,
    ) -> Self {
        let bucket = TokenBucket::new(config.capacity, config.refill_per_sec, Instant::now());
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            capacity: config.capacity,
            low_priority_limit: config.low_priority_limit,
            bucket,
            queue: PriorityQueue::new(),
            active: 0,
            queued,
            submissions,
            done_tx,
            done_rx,
            stats,
        }
    }

    pub(super) async fn run(mut self) {
        let mut accepting = true;

        loop {
            let wake_at = self.admit();
            self.publish();

            if !accepting && self.queue.is_empty() && self.active == 0 {
                break;
            }

            let deadline = wake_at.unwrap_or_else(Instant::now);
            let event = tokio::select! {
                job = self.submissions.recv(), if accepting => Event::Submitted(job),
                Some(()) = self.done_rx.recv() => Event::Completed,
                _ = sleep_until(deadline), if wake_at.is_some() => Event::RefillDue,
            };

            match event {
                Event::Submitted(Some(job)) => self.queue.push(job.priority, job),
                Event::Submitted(None) => {
                    debug!("Scheduler handles dropped; draining {} queued task(s)", self.queue.len());
                    accepting = false;
                }
                Event::Completed => self.active -= 1,
                Event::RefillDue => trace!("Refill timer fired"),
            }
        }

        debug!("Scheduler driver stopped");
    }

    /// Admit queued jobs until the head is blocked. Returns when to retry if the
    /// head is waiting on a token; `None` when only a completion can unblock it.
    fn admit(&mut self) -> Option<Instant> {
        loop {
            let (priority, _) = self.queue.front()?;

            let now = Instant::now();
            self.bucket.refill(now);

            if !self.bucket.has_token() {
                let wake_at = self.bucket.next_refill_at();
                return Some(if wake_at > now {
                    wake_at
                } else {
                    now + std::time::Duration::from_millis(1)
                });
            }
            if self.active >= self.capacity {
                return None;
            }
            if priority == Priority::Normal && self.active >= self.low_priority_limit {
                return None;
            }

            let Some((_, job)) = self.queue.pop_front() else {
                return None;
            };
            self.bucket.try_take();
            self.active += 1;
            self.queued.fetch_sub(1, Ordering::SeqCst);
            self.launch(job, now);
        }
    }

    fn launch(&self, job: Job, now: Instant) {
        debug!(
            "Admitted {} task after {:?} (active {}/{}, tokens {:.2})",
            job.priority,
            now.saturating_duration_since(job.submitted_at),
            self.active,
            self.capacity,
            self.bucket.tokens()
        );

        let guard = CompletionGuard(self.done_tx.clone());
        tokio::spawn(async move {
            let _guard = guard;
            job.operation.await;
        });
    }

    fn publish(&self) {
        self.stats.send_replace(SchedulerStats {
            queued: self.queue.len(),
            active: self.active,
            tokens: self.bucket.tokens(),
        });
    }
}
