use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{self as xchan, Receiver, Sender};
use rle_result::{Error, Result};

use crate::default_parallelism;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed-size pool of worker threads.
///
/// Workers pull jobs from one shared unbounded queue, so [`submit`] never
/// blocks on backlog. A dequeued job always runs to completion; there is no
/// cancellation. [`close`] stops accepting work and lets the workers drain
/// what is already queued before they exit. Dropping the pool closes it and
/// joins every worker.
///
/// [`submit`]: TaskPool::submit
/// [`close`]: TaskPool::close
pub struct TaskPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    threads: usize,
}

static SHARED: OnceLock<TaskPool> = OnceLock::new();

impl TaskPool {
    /// Spawn `threads` workers.
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(Error::invalid_argument(
                "task pool needs at least one worker",
            ));
        }
        let (sender, receiver) = xchan::unbounded::<Job>();
        let mut workers = Vec::with_capacity(threads);
        for id in 0..threads {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("rle-worker-{id}"))
                .spawn(move || worker_loop(id, receiver))
                .map_err(|err| Error::Internal(format!("failed to spawn worker {id}: {err}")))?;
            workers.push(handle);
        }
        tracing::debug!(threads, "task pool started");
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            threads,
        })
    }

    /// Process-wide pool sized by [`default_parallelism`], started on first
    /// use and never closed.
    ///
    /// Fails when the workers cannot be spawned; a later call retries.
    pub fn shared() -> Result<&'static TaskPool> {
        if let Some(pool) = SHARED.get() {
            return Ok(pool);
        }
        let pool = TaskPool::new(default_parallelism())?;
        // A concurrent first call may win the race; the spare pool is joined
        // when dropped.
        Ok(SHARED.get_or_init(move || pool))
    }

    #[inline]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Queue `task` and return a handle to its outcome.
    ///
    /// A panic inside `task` is caught on the worker and surfaces from
    /// [`TaskHandle::wait`] as [`Error::TaskPanicked`].
    pub fn submit<T, F>(&self, task: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (result_tx, result_rx) = xchan::bounded(1);
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(task))
                .unwrap_or_else(|payload| Err(Error::from_panic(payload)));
            // The handle may already be gone; the outcome is then unobserved.
            let _ = result_tx.send(outcome);
        });
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(sender) => sender.send(job).map_err(|_| Error::PoolClosed)?,
            None => return Err(Error::PoolClosed),
        }
        Ok(TaskHandle { receiver: result_rx })
    }

    /// Stop accepting work. Already queued jobs still run.
    pub fn close(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_some() {
            tracing::debug!(threads = self.threads, "task pool closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.close();
        let workers = std::mem::take(
            self.workers
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for worker in workers {
            if worker.join().is_err() {
                tracing::warn!("task pool worker exited with a panic");
            }
        }
    }
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("threads", &self.threads)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn worker_loop(id: usize, receiver: Receiver<Job>) {
    tracing::trace!(worker = id, "worker started");
    // `recv` fails once the queue is closed and drained.
    while let Ok(job) = receiver.recv() {
        job();
    }
    tracing::trace!(worker = id, "worker exiting");
}

/// Outcome of a submitted task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    receiver: Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Block until the task finishes and return its outcome.
    pub fn wait(self) -> Result<T> {
        self.receiver.recv().unwrap_or_else(|_| {
            Err(Error::internal(
                "task was dropped before it produced a result",
            ))
        })
    }

    /// True once the outcome is ready to be taken without blocking.
    pub fn is_finished(&self) -> bool {
        !self.receiver.is_empty()
    }
}

/// Submit every task and wait for all of them.
///
/// Handles are awaited even after a failure, so when this returns no task of
/// the batch is still running. The first error in submission order wins.
pub fn run_all<T, F, I>(pool: &TaskPool, tasks: I) -> Result<Vec<T>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
    I: IntoIterator<Item = F>,
{
    let handles: Vec<Result<TaskHandle<T>>> =
        tasks.into_iter().map(|task| pool.submit(task)).collect();
    let mut results = Vec::with_capacity(handles.len());
    let mut first_error = None;
    for handle in handles {
        match handle.and_then(TaskHandle::wait) {
            Ok(value) => results.push(value),
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(results),
    }
}
