use std::thread;

use crossbeam::channel;
use crossbeam::channel::{Receiver, Sender};
use tracing::{debug, error, instrument};

use super::ThreadPool;
use crate::{Result, SkullError};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A thread pool implemented with a shared job queue (i.e. channel).
///
/// This implementation uses the MPMC [`channel`] provided by the crossbeam crate: every
/// caller of [`spawn`](ThreadPool::spawn) is a producer and the threads in the pool are the
/// consumers. The queue is unbounded when built with [`ThreadPool::new`] and bounded when
/// built with [`SharedQueueThreadPool::bounded`]; a full bounded queue makes `spawn` wait
/// until a thread picks up a job.
///
/// If a spawned job panics, the old thread will be destroyed and a new one will be
/// created. Failure to create the replacement thread is logged and the pool shrinks.
/// Dropping the pool lets the threads finish the queued jobs and exit.
///
/// [`channel`]: https://docs.rs/crossbeam/0.8.1/crossbeam/channel/index.html
pub struct SharedQueueThreadPool {
    /// the sending part of the channel
    tx: Sender<Job>,
}

impl SharedQueueThreadPool {
    /// creates a pool of `threads` threads named `name-N` in front of a queue holding at
    /// most `capacity` pending jobs
    pub fn bounded(name: &str, threads: u32, capacity: usize) -> Result<Self> {
        let (tx, rx) = channel::bounded::<Job>(capacity);
        Self::start(name, threads, tx, rx)
    }

    fn start(name: &str, threads: u32, tx: Sender<Job>, rx: Receiver<Job>) -> Result<Self> {
        if threads == 0 {
            return Err(SkullError::Pool("a pool needs at least one thread".to_string()));
        }
        for i in 0..threads {
            let task_rx = TaskReceiver {
                name: format!("{}-{}", name, i),
                rx: rx.clone(),
            };
            thread::Builder::new()
                .name(task_rx.name.clone())
                .spawn(move || run_tasks(task_rx))?;
        }
        debug!("created {} pool with {} threads", name, threads);
        Ok(SharedQueueThreadPool { tx })
    }
}

impl ThreadPool for SharedQueueThreadPool {
    /// create a new thread pool with the given number of `threads` and an unbounded queue.
    /// Every thread created will have a handle to the receiving end of the channel
    fn new(threads: u32) -> Result<Self> {
        let (tx, rx) = channel::unbounded::<Job>();
        Self::start("worker", threads, tx, rx)
    }

    /// Sends a job to the pool, waiting for room if the queue is bounded and full.
    fn spawn<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx
            .send(Box::new(job))
            .map_err(|_| SkullError::Pool("there are no threads in the pool".to_string()))
    }
}

/// A type that can receive tasks (i.e. closures) from a channel and run them.
/// Additionally, this type is responsible for restarting any threads that panicked
#[derive(Clone)]
struct TaskReceiver {
    name: String,
    rx: Receiver<Job>,
}

impl std::fmt::Debug for TaskReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

impl Drop for TaskReceiver {
    fn drop(&mut self) {
        if thread::panicking() {
            debug!("{} panicked, starting a new thread", self.name);
            let task_rx = self.clone();
            if let Err(e) = thread::Builder::new()
                .name(task_rx.name.clone())
                .spawn(move || run_tasks(task_rx))
            {
                error!("Failed to spawn a thread: {}", e);
            }
        }
    }
}

/// this function waits for a task to arrive on its (wrapped) receiver, and then runs the task.
/// It returns once the pool is dropped and the queue is drained.
#[instrument]
fn run_tasks(rx: TaskReceiver) {
    while let Ok(task) = rx.rx.recv() {
        task();
    }
    debug!("thread exited because the thread pool was destroyed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn runs_every_job() {
        let pool = SharedQueueThreadPool::bounded("test", 3, 2).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = channel::unbounded();
        for _ in 0..50 {
            let count = Arc::clone(&count);
            let tx = tx.clone();
            pool.spawn(move || {
                count.fetch_add(1, Ordering::SeqCst);
                tx.send(()).unwrap();
            })
            .unwrap();
        }
        assert_eq!(rx.iter().take(50).count(), 50);
        assert_eq!(count.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn replaces_threads_that_panic() {
        let pool = SharedQueueThreadPool::new(1).unwrap();
        for _ in 0..3 {
            pool.spawn(|| panic!("job failed")).unwrap();
        }
        let (tx, rx) = channel::bounded(1);
        pool.spawn(move || tx.send(42).unwrap()).unwrap();
        assert_eq!(rx.recv().unwrap(), 42);
    }

    #[test]
    fn zero_threads_is_an_error() {
        assert!(SharedQueueThreadPool::bounded("test", 0, 1).is_err());
    }
}
