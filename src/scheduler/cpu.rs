//! Synchronous multi-worker scheduling on a dedicated rayon pool.

use super::{Discipline, Launch, Scheduler};
use crate::error::{ContextError, RuntimeError};
use crate::window::Window;
use rayon::prelude::*;
use std::sync::Arc;

/// Runs every partition of a launch on its own rayon pool and returns when
/// all of them have finished.
///
/// Partitions are assigned statically, one task each; uneven partitions leave
/// workers idle. A panicking kernel body propagates to the caller.
#[derive(Debug)]
pub struct CpuScheduler {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl CpuScheduler {
    /// Builds a pool of `workers` threads (at least one).
    ///
    /// # Errors
    /// [`ContextError::ThreadPool`] if the threads cannot be spawned.
    pub fn new(workers: usize) -> Result<Self, ContextError> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("briny-exec-cpu-{i}"))
            .build()?;
        Ok(Self { pool, workers })
    }
}

impl Scheduler for CpuScheduler {
    fn discipline(&self) -> Discipline {
        Discipline::Synchronous
    }

    fn num_workers(&self) -> usize {
        self.workers
    }

    fn dispatch(&self, launch: Arc<Launch>, partitions: Vec<Window>) -> Result<(), RuntimeError> {
        self.pool.install(|| {
            partitions.par_iter().enumerate().for_each(|(i, window)| {
                tracing::trace!(kernel = launch.kernel_name(), partition = i, %window, "partition");
                launch.run(window);
            });
        });
        Ok(())
    }

    fn barrier(&self) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn sync(&self) -> Result<(), RuntimeError> {
        Ok(())
    }
}
