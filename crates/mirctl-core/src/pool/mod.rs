//! Bounded pool for async tasks.
//!
//! At most `size` tasks run at once; the rest wait for a permit in submission order. Each task
//! reports through its own [`TaskHandle`] and on the pool-wide completion channel.
//!
//! A task id is admitted once: while a task holds its [`Admission`], a second request with
//! the same id is dropped instead of queued.
use std::{
    collections::HashSet,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use mirctl_model::{Response, ResponseCode, TaskId};
use parking_lot::Mutex;
use tokio::sync::{Semaphore, broadcast, oneshot};
use tracing::{debug, warn};

const COMPLETION_BACKLOG: usize = 256;

/// A finished task as seen by completion subscribers.
#[derive(Debug, Clone)]
pub struct Completion {
    pub task_id: TaskId,
    pub response: Response,
}

#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
    running: Arc<AtomicUsize>,
    active: Arc<Mutex<HashSet<TaskId>>>,
    completions: broadcast::Sender<Completion>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (completions, _) = broadcast::channel(COMPLETION_BACKLOG);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
            running: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(Mutex::new(HashSet::new())),
            completions,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Tasks currently holding a permit.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Completion> {
        self.completions.subscribe()
    }

    /// Claim `task_id`. `None` while another admission for the same id is alive.
    pub fn admit(&self, task_id: &TaskId) -> Option<Admission> {
        if !self.active.lock().insert(task_id.clone()) {
            debug!(task = %task_id, "task id already admitted");
            return None;
        }
        Some(Admission {
            task_id: task_id.clone(),
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_active(&self, task_id: &TaskId) -> bool {
        self.active.lock().contains(task_id)
    }

    /// Queue `fut` for execution. Returns immediately; the admission is released once
    /// `fut` finishes.
    pub fn submit<F>(&self, admission: Admission, fut: F) -> TaskHandle
    where
        F: Future<Output = Response> + Send + 'static,
    {
        let task_id = admission.task_id.clone();
        let (tx, rx) = oneshot::channel();
        let permits = Arc::clone(&self.permits);
        let running = Arc::clone(&self.running);
        let completions = self.completions.clone();
        let id = task_id.clone();

        tokio::spawn(async move {
            let response = match permits.acquire_owned().await {
                Ok(_permit) => {
                    let _running = Running::enter(&running);
                    debug!(task = %id, "worker started");
                    fut.await
                }
                Err(_) => Response::error(ResponseCode::InternalError, "worker pool closed"),
            };
            drop(admission);
            if !response.is_ok() {
                warn!(task = %id, code = %response.code, message = %response.message, "task failed");
            }
            let _ = completions.send(Completion {
                task_id: id,
                response: response.clone(),
            });
            let _ = tx.send(response);
        });

        TaskHandle { task_id, rx }
    }
}

/// Claim on a task id, released on drop.
pub struct Admission {
    task_id: TaskId,
    active: Arc<Mutex<HashSet<TaskId>>>,
}

impl Admission {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.active.lock().remove(&self.task_id);
    }
}

struct Running<'a>(&'a AtomicUsize);

impl<'a> Running<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Completion handle of one submitted task.
pub struct TaskHandle {
    task_id: TaskId,
    rx: oneshot::Receiver<Response>,
}

impl TaskHandle {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Wait for the task's final response. A worker that died without answering is an
    /// internal error.
    pub async fn wait(self) -> Response {
        self.rx.await.unwrap_or_else(|_| {
            Response::error(ResponseCode::InternalError, "worker exited without a response")
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn tid(n: u8) -> TaskId {
        TaskId::parse(&format!("t0000001000042abcdef012345678{n}")).unwrap()
    }

    fn submit<F>(pool: &WorkerPool, n: u8, fut: F) -> TaskHandle
    where
        F: Future<Output = Response> + Send + 'static,
    {
        pool.submit(pool.admit(&tid(n)).unwrap(), fut)
    }

    #[tokio::test]
    async fn handle_returns_response() {
        let pool = WorkerPool::new(2);
        let h = submit(&pool, 1, async { Response::ok("done") });
        assert_eq!(h.wait().await.message, "done");
    }

    #[tokio::test]
    async fn pool_bounds_concurrency() {
        let pool = WorkerPool::new(1);
        let (gate_tx, gate_rx) = oneshot::channel::<()>();

        let first = submit(&pool, 1, async move {
            let _ = gate_rx.await;
            Response::ok("first")
        });
        let second = submit(&pool, 2, async { Response::ok("second") });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pool.running(), 1);

        gate_tx.send(()).unwrap();
        assert_eq!(first.wait().await.message, "first");
        assert_eq!(second.wait().await.message, "second");
    }

    #[tokio::test]
    async fn completions_are_broadcast() {
        let pool = WorkerPool::new(1);
        let mut rx = pool.subscribe();
        submit(&pool, 3, async {
            Response::error(ResponseCode::ContainerFailed, "exit 1")
        });
        let c = rx.recv().await.unwrap();
        assert_eq!(c.task_id, tid(3));
        assert_eq!(c.response.code, ResponseCode::ContainerFailed);
    }

    #[tokio::test]
    async fn panicking_task_is_internal_error() {
        let pool = WorkerPool::new(1);
        let h = submit(&pool, 4, async {
            if true {
                panic!("boom");
            }
            Response::ok("")
        });
        assert_eq!(h.wait().await.code, ResponseCode::InternalError);
    }

    #[test]
    fn duplicate_id_is_refused_until_released() {
        let pool = WorkerPool::new(1);
        let first = pool.admit(&tid(5)).unwrap();
        assert!(pool.admit(&tid(5)).is_none());
        assert!(pool.admit(&tid(6)).is_some());
        drop(first);
        assert!(pool.admit(&tid(5)).is_some());
    }

    #[tokio::test]
    async fn id_is_released_when_the_task_finishes() {
        let pool = WorkerPool::new(1);
        let (gate_tx, gate_rx) = oneshot::channel::<()>();
        let h = submit(&pool, 7, async move {
            let _ = gate_rx.await;
            Response::ok("")
        });
        assert!(pool.is_active(&tid(7)));
        assert!(pool.admit(&tid(7)).is_none());

        gate_tx.send(()).unwrap();
        h.wait().await;
        assert!(!pool.is_active(&tid(7)));
    }
}
