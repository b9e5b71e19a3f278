//! Per-application worker pool
//!
//! Offloaded dispatch runs as tracked tokio tasks. A semaphore bounds how many
//! of an application's tasks run at once; submitted tasks beyond the bound
//! wait for a permit.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct WorkerPool {
    name: String,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    next_task_id: AtomicUsize,
    active: Arc<ActiveTasks>,
}

#[derive(Default)]
struct ActiveTasks {
    count: AtomicUsize,
    idle: Notify,
}

/// Decrements the active count when a task finishes, panics included
struct ActiveTask(Arc<ActiveTasks>);

impl Drop for ActiveTask {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            name: name.into(),
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            next_task_id: AtomicUsize::new(0),
            active: Arc::new(ActiveTasks::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Submit a task to the pool
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, task_name: impl Into<String>, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task_name = task_name.into();
        let task_id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        let permits = self.permits.clone();
        let pool_name = self.name.clone();

        self.active.count.fetch_add(1, Ordering::SeqCst);
        let active = ActiveTask(self.active.clone());

        tokio::spawn(async move {
            let _active = active;
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("Pool {} closed, dropping task {} [{}]", pool_name, task_name, task_id);
                    return;
                }
            };
            debug!("Task started: {} [{}] in pool {}", task_name, task_id, pool_name);
            future.await;
            debug!("Task completed: {} [{}] in pool {}", task_name, task_id, pool_name);
        })
    }

    /// Number of submitted tasks that have not finished yet
    pub fn active_task_count(&self) -> usize {
        self.active.count.load(Ordering::SeqCst)
    }

    /// Wait until every submitted task has finished
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.active.idle.notified();
            tokio::pin!(notified);
            // Register before reading the count so a concurrent last drop is not missed
            notified.as_mut().enable();
            if self.active_task_count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("max_concurrency", &self.max_concurrency)
            .field("active", &self.active_task_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_task_spawning_and_tracking() {
        let pool = WorkerPool::new("test", 4);
        let handle = pool.spawn("sleepy", async {
            tokio::time::sleep(Duration::from_millis(10)).await;
        });
        assert_eq!(pool.active_task_count(), 1);

        handle.await.unwrap();
        assert_eq!(pool.active_task_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new("bounded", 2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for i in 0..6 {
            let running = running.clone();
            let peak = peak.clone();
            pool.spawn(format!("task-{}", i), async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }

        pool.wait_idle().await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.active_task_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_wakes_after_panicking_task() {
        let pool = WorkerPool::new("panicky", 2);
        pool.wait_idle().await;

        let (release, gate) = tokio::sync::oneshot::channel::<()>();
        pool.spawn("panics", async move {
            let _ = gate.await;
            panic!("task blew up");
        });
        assert_eq!(pool.active_task_count(), 1);

        let waiting = pool.wait_idle();
        tokio::pin!(waiting);
        assert!(
            tokio::time::timeout(Duration::from_millis(20), waiting.as_mut()).await.is_err()
        );

        release.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiting).await.unwrap();
        assert_eq!(pool.active_task_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_clamped() {
        let pool = WorkerPool::new("clamped", 0);
        assert_eq!(pool.max_concurrency(), 1);
    }
}
