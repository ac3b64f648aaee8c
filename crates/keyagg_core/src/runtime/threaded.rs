use std::fmt;
use std::sync::Arc;

use keyagg_error::{AggError, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Work-stealing executor backed by a rayon thread pool.
#[derive(Clone)]
pub struct ThreadedExecutor {
    pool: Arc<ThreadPool>,
}

impl fmt::Debug for ThreadedExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadedExecutor")
            .field("num_threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

impl ThreadedExecutor {
    pub fn try_new(num_threads: usize) -> Result<Self> {
        let thread_pool = ThreadPoolBuilder::new()
            .thread_name(|idx| format!("keyagg_worker_{idx}"))
            .num_threads(num_threads)
            .build()
            .map_err(|e| AggError::with_source("Failed to build thread pool", Box::new(e)))?;

        Ok(ThreadedExecutor {
            pool: Arc::new(thread_pool),
        })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `op` inside the pool.
    ///
    /// Parallel iterators used inside `op` execute on this pool's threads.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}
