//! Bounded fire-and-forget queue for background work (cache writes).
//!
//! A fixed pool of workers pulls from one bounded channel. Submitting never
//! blocks: when the channel is full, or the queue has been stopped, the task
//! is dropped with a warning. Failed and panicking tasks are logged and never
//! retried.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub type BoxTask = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskQueueConfig {
    pub workers: usize,
    pub capacity: usize,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            capacity: 1024,
        }
    }
}

struct Job {
    label: String,
    task: BoxTask,
}

/// Accepted-but-unfinished task counter.
#[derive(Default)]
struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

impl Pending {
    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

pub struct TaskQueue {
    tx: StdMutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<Pending>,
}

impl TaskQueue {
    /// Spawn the worker pool. Must be called from within a tokio runtime.
    pub fn start(config: TaskQueueConfig) -> Self {
        let workers = config.workers.max(1);
        let (tx, rx) = mpsc::channel::<Job>(config.capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let pending = Arc::new(Pending::default());

        let handles = (0..workers)
            .map(|id| tokio::spawn(worker(id, Arc::clone(&rx), Arc::clone(&pending))))
            .collect();

        info!(workers, capacity = config.capacity, "task queue started");
        Self {
            tx: StdMutex::new(Some(tx)),
            workers: Mutex::new(handles),
            pending,
        }
    }

    /// Enqueue `task` without waiting. Returns `false` if it was dropped.
    pub fn submit<F>(&self, label: impl Into<String>, task: F) -> bool
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let label = label.into();
        let guard = match self.tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(tx) = guard.as_ref() else {
            warn!(task = %label, "task queue stopped, dropping task");
            return false;
        };

        self.pending.count.fetch_add(1, Ordering::AcqRel);
        let job = Job {
            label,
            task: Box::pin(task),
        };
        match tx.try_send(job) {
            Ok(()) => true,
            Err(e) => {
                let reason = match &e {
                    mpsc::error::TrySendError::Full(_) => "full",
                    mpsc::error::TrySendError::Closed(_) => "closed",
                };
                let job = e.into_inner();
                warn!(task = %job.label, reason, "task queue rejected task, dropping");
                self.pending.finish();
                false
            }
        }
    }

    /// Number of accepted tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        self.pending.count.load(Ordering::Acquire)
    }

    /// Resolve once every accepted task has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.pending.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting work, let workers finish what is queued, and join them.
    pub async fn drain_and_stop(&self) {
        let tx = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(tx);

        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "task queue worker ended abnormally");
            }
        }
        info!("task queue drained");
    }
}

async fn worker(id: usize, rx: Arc<Mutex<mpsc::Receiver<Job>>>, pending: Arc<Pending>) {
    loop {
        let job = rx.lock().await.recv().await;
        let Some(Job { label, task }) = job else {
            break;
        };

        // Run the task on its own so a panic stays contained.
        match tokio::spawn(task).await {
            Ok(Ok(())) => debug!(worker = id, task = %label, "background task done"),
            Ok(Err(e)) => error!(worker = id, task = %label, error = %e, "background task failed"),
            Err(e) => error!(worker = id, task = %label, error = %e, "background task panicked"),
        }
        pending.finish();
    }
    debug!(worker = id, "task queue worker exiting");
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test]
    async fn runs_every_accepted_task() {
        let queue = TaskQueue::start(TaskQueueConfig::default());
        let done = counter();
        for _ in 0..20 {
            let done = Arc::clone(&done);
            assert!(queue.submit("count", async move {
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));
        }
        queue.wait_idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 20);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn wait_idle_returns_immediately_when_empty() {
        let queue = TaskQueue::start(TaskQueueConfig::default());
        tokio::time::timeout(Duration::from_secs(1), queue.wait_idle())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let queue = TaskQueue::start(TaskQueueConfig {
            workers: 1,
            capacity: 1,
        });
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let done = counter();

        let d = Arc::clone(&done);
        assert!(queue.submit("blocker", async move {
            let _ = started_tx.send(());
            let _ = release_rx.await;
            d.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        started_rx.await.unwrap();

        let d = Arc::clone(&done);
        assert!(queue.submit("buffered", async move {
            d.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        assert!(!queue.submit("overflow", async { Ok(()) }));

        release_tx.send(()).unwrap();
        queue.wait_idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_and_panics_do_not_stop_workers() {
        let queue = TaskQueue::start(TaskQueueConfig {
            workers: 1,
            capacity: 8,
        });
        let done = counter();

        assert!(queue.submit("fails", async { Err(anyhow::anyhow!("boom")) }));
        let explode = true;
        assert!(queue.submit("panics", async move {
            if explode {
                panic!("task blew up");
            }
            Ok(())
        }));
        let d = Arc::clone(&done);
        assert!(queue.submit("survivor", async move {
            d.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        queue.wait_idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drain_finishes_queued_work_then_rejects() {
        let queue = TaskQueue::start(TaskQueueConfig {
            workers: 2,
            capacity: 16,
        });
        let done = counter();
        for _ in 0..6 {
            let d = Arc::clone(&done);
            queue.submit("slow", async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                d.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        queue.drain_and_stop().await;
        assert_eq!(done.load(Ordering::SeqCst), 6);
        assert!(!queue.submit("late", async { Ok(()) }));

        // Stopping twice is harmless.
        queue.drain_and_stop().await;
    }
}
