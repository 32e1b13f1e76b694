use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Request-scoped concurrency budget.
///
/// Every [`Batch`] drawn from the same pool shares its permits, so the fan-out points of
/// one request never run more than `width` tasks at once in total.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(width: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(width.max(1))),
        }
    }

    pub fn batch<T: Send + 'static>(&self) -> Batch<T> {
        Batch {
            set: JoinSet::new(),
            permits: self.permits.clone(),
        }
    }
}

/// A set of submitted tasks, drained in completion order.
pub struct Batch<T> {
    set: JoinSet<T>,
    permits: Arc<Semaphore>,
}

impl<T: Send + 'static> Batch<T> {
    pub fn spawn<F>(&mut self, fut: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let permits = self.permits.clone();
        self.set.spawn(async move {
            // The semaphore is never closed.
            let _permit = permits.acquire_owned().await.ok();
            fut.await
        });
    }

    /// Next finished task. Panicked tasks are logged and skipped.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            match self.set.join_next().await? {
                Ok(v) => return Some(v),
                Err(e) => tracing::error!(error = %e, "worker task failed"),
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}
