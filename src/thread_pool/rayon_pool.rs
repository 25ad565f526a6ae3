use super::ThreadPool;
use crate::{KvError, Result};

/// A thread pool backed by `rayon`'s work-stealing scheduler.
pub struct RayonThreadPool {
    pool: rayon::ThreadPool,
}

impl ThreadPool for RayonThreadPool {
    fn new(threads: u32) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads as usize)
            .thread_name(|i| format!("kvrpc-rayon-{i}"))
            .panic_handler(|_| log::error!("Connection handler panicked"))
            .build()
            .map_err(|e| KvError::StringError(e.to_string()))?;
        Ok(RayonThreadPool { pool })
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(job);
    }
}
