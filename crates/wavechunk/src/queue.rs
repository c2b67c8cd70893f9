//! Dependency-aware background task queue.
//!
//! [`TaskQueue`] runs submitted jobs one at a time on a dedicated worker thread.
//! A job may list other task ids it depends on; it is held back until every one
//! of them has finished or been cancelled. Among ready jobs the oldest runs first.
//!
//! The queue is shared by cloning the handle. It shuts down once the last handle
//! is dropped: pending jobs are discarded and a running job sees its cancel flag.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

/// Identifier assigned by [`TaskQueue::submit`].
pub type TaskId = u64;

/// Cooperative cancellation flag shared between a job and its owner.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Passed to a job when it starts running.
#[derive(Clone, Debug)]
pub struct TaskContext {
    pub id: TaskId,
    pub cancel: CancelToken,
}

type Job = Box<dyn FnOnce(&TaskContext) + Send + 'static>;

struct PendingTask {
    id: TaskId,
    dependencies: Vec<TaskId>,
    cancel: CancelToken,
    job: Job,
}

struct RunningTask {
    id: TaskId,
    cancel: CancelToken,
}

struct QueueInner {
    pending: VecDeque<PendingTask>,
    running: Option<RunningTask>,
    suspended: bool,
    closed: bool,
}

impl QueueInner {
    fn is_live(&self, id: TaskId) -> bool {
        self.running.as_ref().is_some_and(|r| r.id == id)
            || self.pending.iter().any(|t| t.id == id)
    }

    /// Position of the oldest pending task whose dependencies are all gone.
    fn next_ready(&self) -> Option<usize> {
        let live: HashSet<TaskId> = self
            .pending
            .iter()
            .map(|t| t.id)
            .chain(self.running.as_ref().map(|r| r.id))
            .collect();
        self.pending
            .iter()
            .position(|t| t.dependencies.iter().all(|d| !live.contains(d)))
    }
}

struct QueueShared {
    name: String,
    inner: Mutex<QueueInner>,
    cv: Condvar,
    next_id: AtomicU64,
}

impl QueueShared {
    fn close(&self) {
        let mut g = self.inner.lock().unwrap();
        g.closed = true;
        let dropped = g.pending.len();
        g.pending.clear();
        if let Some(running) = g.running.as_ref() {
            running.cancel.cancel();
        }
        drop(g);
        self.cv.notify_all();
        tracing::debug!(queue = %self.name, dropped, "task queue closed");
    }
}

/// Closes the queue when the last [`TaskQueue`] handle goes away.
struct QueueOwner {
    shared: Arc<QueueShared>,
}

impl Drop for QueueOwner {
    fn drop(&mut self) {
        self.shared.close();
    }
}

/// Cloneable handle to a single-worker task queue.
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<QueueShared>,
    _owner: Arc<QueueOwner>,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("name", &self.shared.name)
            .finish()
    }
}

impl TaskQueue {
    /// Spawn the worker thread.
    pub fn new(name: &str) -> Result<Self> {
        let shared = Arc::new(QueueShared {
            name: name.to_string(),
            inner: Mutex::new(QueueInner {
                pending: VecDeque::new(),
                running: None,
                suspended: false,
                closed: false,
            }),
            cv: Condvar::new(),
            next_id: AtomicU64::new(1),
        });
        let worker_shared = shared.clone();
        thread::Builder::new()
            .name(format!("wavechunk-{name}"))
            .spawn(move || worker_main(worker_shared))
            .with_context(|| format!("spawn {name} worker thread"))?;
        Ok(Self {
            shared: shared.clone(),
            _owner: Arc::new(QueueOwner { shared }),
        })
    }

    /// Enqueue `job`; it runs after every task in `dependencies` has left the queue.
    ///
    /// Unknown or already-finished dependency ids are treated as satisfied.
    pub fn submit<F>(&self, dependencies: Vec<TaskId>, job: F) -> TaskId
    where
        F: FnOnce(&TaskContext) + Send + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let mut g = self.shared.inner.lock().unwrap();
        if g.closed {
            return id;
        }
        g.pending.push_back(PendingTask {
            id,
            dependencies,
            cancel: CancelToken::new(),
            job: Box::new(job),
        });
        drop(g);
        self.shared.cv.notify_all();
        id
    }

    /// Cancel a task.
    ///
    /// A pending task is removed without running; a running task has its cancel
    /// flag raised. Returns `false` when the id is no longer in the queue.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut g = self.shared.inner.lock().unwrap();
        let found = if let Some(pos) = g.pending.iter().position(|t| t.id == id) {
            if let Some(task) = g.pending.remove(pos) {
                task.cancel.cancel();
            }
            true
        } else if let Some(running) = g.running.as_ref().filter(|r| r.id == id) {
            running.cancel.cancel();
            true
        } else {
            false
        };
        drop(g);
        if found {
            self.shared.cv.notify_all();
        }
        found
    }

    /// Cancel every pending and running task.
    pub fn cancel_all(&self) {
        let mut g = self.shared.inner.lock().unwrap();
        g.pending.clear();
        if let Some(running) = g.running.as_ref() {
            running.cancel.cancel();
        }
        drop(g);
        self.shared.cv.notify_all();
    }

    /// Hold back new work while `true`; a task already running is not affected.
    pub fn set_suspended(&self, suspended: bool) {
        let mut g = self.shared.inner.lock().unwrap();
        g.suspended = suspended;
        drop(g);
        self.shared.cv.notify_all();
    }

    /// Whether `id` is still pending or running.
    pub fn contains(&self, id: TaskId) -> bool {
        let g = self.shared.inner.lock().unwrap();
        g.is_live(id)
    }

    /// Pending plus running tasks.
    pub fn len(&self) -> usize {
        let g = self.shared.inner.lock().unwrap();
        g.pending.len() + usize::from(g.running.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until the queue is empty or `timeout` elapses. Returns `true` when empty.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut g = self.shared.inner.lock().unwrap();
        loop {
            if g.pending.is_empty() && g.running.is_none() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (ng, _) = self.shared.cv.wait_timeout(g, deadline - now).unwrap();
            g = ng;
        }
    }
}

fn worker_main(shared: Arc<QueueShared>) {
    loop {
        let (id, job, cancel) = {
            let mut g = shared.inner.lock().unwrap();
            loop {
                if g.closed {
                    return;
                }
                if !g.suspended {
                    if let Some(pos) = g.next_ready() {
                        if let Some(task) = g.pending.remove(pos) {
                            g.running = Some(RunningTask {
                                id: task.id,
                                cancel: task.cancel.clone(),
                            });
                            break (task.id, task.job, task.cancel);
                        }
                    }
                }
                g = shared.cv.wait(g).unwrap();
            }
        };

        tracing::trace!(queue = %shared.name, task = id, "task started");
        let ctx = TaskContext { id, cancel };
        job(&ctx);

        let mut g = shared.inner.lock().unwrap();
        g.running = None;
        drop(g);
        shared.cv.notify_all();
        tracing::trace!(queue = %shared.name, task = id, "task finished");
    }
}
