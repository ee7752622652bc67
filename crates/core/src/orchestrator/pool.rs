//! Per-role worker pools.

use std::fmt::Display;
use std::future::Future;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Ordered workers of one role plus at most one creation in flight.
///
/// Creation runs as a background task (connecting a monitor can take a
/// while); the orchestrator collects it with [`WorkerPool::reap_add`].
pub struct WorkerPool<W, E> {
    role: &'static str,
    workers: Vec<W>,
    adding: Option<JoinHandle<Result<W, E>>>,
    next_id: usize,
}

impl<W, E> WorkerPool<W, E>
where
    W: Send + 'static,
    E: Display + Send + 'static,
{
    pub fn new(role: &'static str) -> Self {
        Self {
            role,
            workers: Vec::new(),
            adding: None,
            next_id: 0,
        }
    }

    pub fn role(&self) -> &'static str {
        self.role
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn is_adding(&self) -> bool {
        self.adding.is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &W> {
        self.workers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut W> {
        self.workers.iter_mut()
    }

    pub fn first_mut(&mut self) -> Option<&mut W> {
        self.workers.first_mut()
    }

    /// Starts creating a worker. `create` receives the new worker's id.
    ///
    /// Returns false while another creation for this role is in flight.
    pub fn add<F, Fut>(&mut self, create: F) -> bool
    where
        F: FnOnce(usize) -> Fut,
        Fut: Future<Output = Result<W, E>> + Send + 'static,
    {
        if self.adding.is_some() {
            return false;
        }
        let id = self.next_id;
        self.next_id += 1;
        info!(role = self.role, id, "Creating worker");
        self.adding = Some(tokio::spawn(create(id)));
        true
    }

    /// Collects a finished creation. Returns true when a worker joined.
    pub async fn reap_add(&mut self) -> bool {
        if !self.adding.as_ref().is_some_and(|t| t.is_finished()) {
            return false;
        }
        let Some(task) = self.adding.take() else {
            return false;
        };

        match task.await {
            Ok(Ok(worker)) => {
                self.workers.push(worker);
                info!(role = self.role, workers = self.workers.len(), "Worker added");
                true
            }
            Ok(Err(e)) => {
                warn!(role = self.role, error = %e, "Worker creation failed");
                false
            }
            Err(e) => {
                error!(role = self.role, error = %e, "Worker creation panicked");
                false
            }
        }
    }

    /// Drops every worker for which `is_zombie` holds. Returns how many.
    pub fn prune(&mut self, is_zombie: impl Fn(&W) -> bool) -> usize {
        let before = self.workers.len();
        self.workers.retain(|w| !is_zombie(w));
        let pruned = before - self.workers.len();
        if pruned > 0 {
            info!(role = self.role, pruned, "Pruned zombie workers");
        }
        pruned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug)]
    struct Worker {
        id: usize,
        zombie: bool,
    }

    async fn reap(pool: &mut WorkerPool<Worker, String>) -> bool {
        for _ in 0..200 {
            if !pool.is_adding() {
                return false;
            }
            if pool.reap_add().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("add did not finish");
    }

    #[tokio::test]
    async fn test_one_add_in_flight() {
        let mut pool: WorkerPool<Worker, String> = WorkerPool::new("test");
        assert!(pool.add(|id| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(Worker { id, zombie: false })
        }));
        assert!(!pool.add(|id| async move { Ok(Worker { id, zombie: false }) }));
        assert!(pool.is_adding());

        assert!(reap(&mut pool).await);
        assert_eq!(pool.len(), 1);
        assert!(!pool.is_adding());
    }

    #[tokio::test]
    async fn test_failed_add_frees_slot() {
        let mut pool: WorkerPool<Worker, String> = WorkerPool::new("test");
        pool.add(|_| async { Err("no library".to_string()) });
        for _ in 0..200 {
            pool.reap_add().await;
            if !pool.is_adding() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(pool.is_empty());
        assert!(!pool.is_adding());
    }

    #[tokio::test]
    async fn test_prune_never_reuses_ids() {
        let mut pool: WorkerPool<Worker, String> = WorkerPool::new("test");
        pool.add(|id| async move { Ok(Worker { id, zombie: true }) });
        reap(&mut pool).await;

        assert_eq!(pool.prune(|w| w.zombie), 1);
        assert!(pool.is_empty());

        pool.add(|id| async move { Ok(Worker { id, zombie: false }) });
        reap(&mut pool).await;
        assert_eq!(pool.iter().next().unwrap().id, 1);
    }
}
