use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::error;

use crate::constants::{MAX_POOL_WORKERS, MIN_POOL_WORKERS};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed size pool of worker threads that run submitted closures.
///
/// Decode tasks of all driver instances share [`ThreadPool::instance`].
pub struct ThreadPool {
    job_tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

static INSTANCE: OnceLock<ThreadPool> = OnceLock::new();

impl ThreadPool {
    /// Creates a pool with `n_workers` threads (at least one).
    pub fn new(n_workers: usize) -> ThreadPool {
        let (job_tx, job_rx) = unbounded::<Job>();
        let workers = (0..n_workers.max(1))
            .map(|i| {
                let job_rx = job_rx.clone();
                thread::Builder::new()
                    .name(format!("rslidar-worker-{}", i))
                    .spawn(move || run_jobs(job_rx))
                    .unwrap_or_else(|e| panic!("failed to spawn worker thread: {}", e))
            })
            .collect();
        ThreadPool {
            job_tx: Some(job_tx),
            workers,
        }
    }

    /// Process wide pool, created on first use.
    pub fn instance() -> &'static ThreadPool {
        INSTANCE.get_or_init(|| {
            let n = thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(MIN_POOL_WORKERS);
            ThreadPool::new(n.clamp(MIN_POOL_WORKERS, MAX_POOL_WORKERS))
        })
    }

    pub fn commit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(job_tx) = &self.job_tx {
            // Sending only fails once every worker is gone, which cannot
            // happen while `self` is alive.
            let _ = job_tx.send(Box::new(job));
        }
    }

    pub fn n_workers(&self) -> usize {
        self.workers.len()
    }
}

fn run_jobs(job_rx: Receiver<Job>) {
    for job in job_rx.iter() {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("A task panicked in the thread pool");
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Workers leave their loop once the channel is closed and drained.
        drop(self.job_tx.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("A worker thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::time::Duration;

    #[test]
    fn test_runs_every_job() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = ThreadPool::new(3);
            assert_eq!(pool.n_workers(), 3);
            for _ in 0..100 {
                let counter = counter.clone();
                pool.commit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        // Dropping the pool joins the workers after the queue is drained.
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_worker_survives_panicking_job() {
        let pool = ThreadPool::new(1);
        let (tx, rx) = mpsc::channel();
        pool.commit(|| panic!("job failure"));
        pool.commit(move || tx.send(42).unwrap());
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(42));
    }

    #[test]
    fn test_instance_is_shared() {
        let a = ThreadPool::instance() as *const ThreadPool;
        let b = ThreadPool::instance() as *const ThreadPool;
        assert_eq!(a, b);
        assert!(ThreadPool::instance().n_workers() >= MIN_POOL_WORKERS);
    }
}
