//! Thread pools used by the store and the server.
//!
//! The store hands every disk write to a [`SharedQueueThreadPool`] with a bounded queue, so
//! a burst of mutations can never create an unbounded number of threads or pending writes.
//! The server runs client connections on either pool implementation.
use crate::Result;

mod rayon_pool;
mod shared_queue;

pub use self::rayon_pool::RayonThreadPool;
pub use self::shared_queue::SharedQueueThreadPool;

/// A pool of threads that runs jobs in the background.
pub trait ThreadPool: Send + Sync + 'static {
    /// creates a pool with `threads` threads
    ///
    /// # Errors
    /// returns [`SkullError::Pool`](crate::SkullError::Pool) or an IO error if a thread
    /// could not be created
    fn new(threads: u32) -> Result<Self>
    where
        Self: Sized;

    /// runs `job` on one of the pool's threads
    ///
    /// # Errors
    /// returns [`SkullError::Pool`](crate::SkullError::Pool) if the pool can no longer
    /// accept jobs. The job is dropped in that case.
    fn spawn<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static;
}
