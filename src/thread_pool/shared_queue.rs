use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, error};

use super::ThreadPool;
use crate::{KvError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A thread pool whose workers pull jobs from one shared MPMC queue.
///
/// A job that panics is logged and its worker moves on to the next job.
/// Workers exit once the pool is dropped and the queue drains.
pub struct SharedQueueThreadPool {
    tx: Sender<Job>,
}

impl ThreadPool for SharedQueueThreadPool {
    fn new(threads: u32) -> Result<Self> {
        if threads == 0 {
            return Err(KvError::StringError(
                "thread pool needs at least one thread".to_owned(),
            ));
        }

        let (tx, rx) = channel::unbounded::<Job>();
        for id in 0..threads {
            spawn_worker(id, rx.clone())?;
        }

        Ok(SharedQueueThreadPool { tx })
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Box::new(job)).is_err() {
            error!("Thread pool has no live workers; job dropped");
        }
    }
}

fn spawn_worker(id: u32, rx: Receiver<Job>) -> Result<()> {
    thread::Builder::new()
        .name(format!("kvrpc-worker-{id}"))
        .spawn(move || {
            for job in rx.iter() {
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!("Worker {id}: job panicked");
                }
            }
            debug!("Worker {id}: queue closed, exiting");
        })?;
    Ok(())
}
