//! Worker pool sizing for the parallel stages.

use crate::error::Result;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Samples one worker is expected to handle before another is worth adding.
pub const SAMPLES_PER_WORKER: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadPolicy {
    /// Always this many workers (0 means one per available core).
    Fixed(usize),
    /// Scale with the sample count, up to `max` workers (0 means one per
    /// available core).
    Adaptive { max: usize },
}

impl Default for ThreadPolicy {
    fn default() -> Self {
        ThreadPolicy::Adaptive { max: 0 }
    }
}

fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn or_cores(n: usize) -> usize {
    if n == 0 {
        available_cores()
    } else {
        n
    }
}

impl ThreadPolicy {
    /// Worker count wanted for a frame of `samples` samples.
    pub fn desired_threads(&self, samples: usize) -> usize {
        match *self {
            ThreadPolicy::Fixed(n) => or_cores(n),
            ThreadPolicy::Adaptive { max } => {
                let max = or_cores(max);
                (samples / SAMPLES_PER_WORKER + 1).clamp(1, max)
            }
        }
    }
}

/// A rayon pool that is rebuilt only when the desired size changes.
pub struct WorkerPool {
    policy: ThreadPolicy,
    pool: ThreadPool,
    threads: usize,
}

fn build_pool(threads: usize) -> Result<ThreadPool> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("field-worker-{}", i))
        .build()?;
    Ok(pool)
}

impl WorkerPool {
    pub fn new(policy: ThreadPolicy, samples: usize) -> Result<Self> {
        let threads = policy.desired_threads(samples);
        let pool = build_pool(threads)?;
        log::debug!("worker pool: {} threads ({:?})", threads, policy);
        Ok(Self {
            policy,
            pool,
            threads,
        })
    }

    /// Resizes the pool for `samples` samples. Returns whether it was rebuilt.
    pub fn adapt(&mut self, samples: usize) -> Result<bool> {
        let wanted = self.policy.desired_threads(samples);
        if wanted == self.threads {
            return Ok(false);
        }

        self.pool = build_pool(wanted)?;
        log::debug!(
            "worker pool resized: {} -> {} threads for {} samples",
            self.threads,
            wanted,
            samples
        );
        self.threads = wanted;
        Ok(true)
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Runs `op` with this pool as the rayon context.
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.pool.install(op)
    }
}
