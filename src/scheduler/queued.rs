//! Queued scheduling: a command queue drained by a worker thread.
//!
//! The [`HostQueue`] worker receives partitions, barriers and fences in
//! submission order. Partitions between two barriers form a batch that runs
//! concurrently on the queue's rayon pool; a batch finishes before anything
//! submitted after the closing barrier starts. A fence is acknowledged once
//! every command ahead of it has completed.
//!
//! A kernel panic closes the queue: pending fences report
//! [`RuntimeError::QueueLost`] and later submissions fail.

use super::{Discipline, Launch, Scheduler};
use crate::error::{ContextError, RuntimeError};
use crate::window::Window;
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

enum Command {
    Run { launch: Arc<Launch>, window: Window },
    Barrier,
    Fence(Sender<()>),
}

/// Single ordered command queue with a worker thread.
#[derive(Debug)]
pub struct HostQueue {
    sender: Option<Sender<Command>>,
    worker: Option<JoinHandle<()>>,
}

impl HostQueue {
    /// Spawns the worker with a pool of `workers` threads.
    ///
    /// # Errors
    /// [`ContextError::ThreadPool`] or [`ContextError::Spawn`] when threads
    /// cannot be created.
    pub fn new(workers: usize) -> Result<Self, ContextError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("briny-exec-queue-{i}"))
            .build()?;
        let (sender, receiver) = mpsc::channel();
        let worker = std::thread::Builder::new()
            .name("briny-exec-queue".into())
            .spawn(move || drain(receiver, pool))?;
        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    fn submit(&self, command: Command) -> Result<(), Command> {
        match &self.sender {
            Some(sender) => sender.send(command).map_err(|e| e.0),
            None => Err(command),
        }
    }

    /// Enqueues one partition.
    fn run(&self, launch: Arc<Launch>, window: Window) -> bool {
        self.submit(Command::Run { launch, window }).is_ok()
    }

    /// Closes the current batch.
    pub fn barrier(&self) -> Result<(), RuntimeError> {
        self.submit(Command::Barrier)
            .map_err(|_| RuntimeError::QueueLost)
    }

    /// Blocks until every command submitted so far has completed.
    pub fn finish(&self) -> Result<(), RuntimeError> {
        let (ack, done) = mpsc::channel();
        self.submit(Command::Fence(ack))
            .map_err(|_| RuntimeError::QueueLost)?;
        done.recv().map_err(|_| RuntimeError::QueueLost)
    }
}

impl Drop for HostQueue {
    fn drop(&mut self) {
        // closing the channel lets the worker drain what is left and exit
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("command queue worker exited with a panic");
            }
        }
    }
}

struct Worker {
    batch: Vec<(Arc<Launch>, Window)>,
    acks: Vec<Sender<()>>,
}

impl Worker {
    fn flush(&mut self, pool: &rayon::ThreadPool) {
        if !self.batch.is_empty() {
            tracing::trace!(partitions = self.batch.len(), "queue batch");
            pool.install(|| {
                self.batch
                    .par_iter()
                    .for_each(|(launch, window)| launch.run(window));
            });
            self.batch.clear();
        }
        for ack in self.acks.drain(..) {
            let _ = ack.send(());
        }
    }

    fn handle(&mut self, command: Command, pool: &rayon::ThreadPool) {
        match command {
            Command::Run { launch, window } => self.batch.push((launch, window)),
            Command::Barrier => self.flush(pool),
            Command::Fence(ack) => {
                self.acks.push(ack);
                self.flush(pool);
            }
        }
    }
}

fn drain(receiver: Receiver<Command>, pool: rayon::ThreadPool) {
    let mut worker = Worker {
        batch: Vec::new(),
        acks: Vec::new(),
    };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        while let Ok(command) = receiver.recv() {
            worker.handle(command, &pool);
            while let Ok(command) = receiver.try_recv() {
                worker.handle(command, &pool);
            }
            // idle: nothing else is queued, so nothing can be reordered
            worker.flush(&pool);
        }
    }));
    // disconnect before dropping acks so a woken `finish` sees a closed queue
    drop(receiver);
    if outcome.is_err() {
        tracing::warn!("kernel panicked on the command queue; queue closed");
    }
    drop(worker);
}

/// Accelerator-style scheduler over a [`HostQueue`].
///
/// `schedule` never blocks. Launches become visible to host reads of their
/// operands once they complete; use [`sync`](Scheduler::sync) to wait for all
/// of them.
#[derive(Debug)]
pub struct QueuedScheduler {
    queue: HostQueue,
    workers: usize,
}

impl QueuedScheduler {
    pub fn new(workers: usize) -> Result<Self, ContextError> {
        Ok(Self {
            queue: HostQueue::new(workers)?,
            workers: workers.max(1),
        })
    }
}

impl Scheduler for QueuedScheduler {
    fn discipline(&self) -> Discipline {
        Discipline::Queued
    }

    fn num_workers(&self) -> usize {
        self.workers
    }

    fn dispatch(&self, launch: Arc<Launch>, partitions: Vec<Window>) -> Result<(), RuntimeError> {
        for (partition, window) in partitions.into_iter().enumerate() {
            tracing::trace!(kernel = launch.kernel_name(), partition, %window, "enqueue");
            if !self.queue.run(Arc::clone(&launch), window) {
                tracing::warn!(
                    op = %launch.op(),
                    kernel = launch.kernel_name(),
                    partition,
                    "submission failed"
                );
                return Err(RuntimeError::Submission {
                    op: launch.op(),
                    kernel: launch.kernel_name(),
                    partition,
                });
            }
        }
        Ok(())
    }

    fn barrier(&self) -> Result<(), RuntimeError> {
        self.queue.barrier()
    }

    fn sync(&self) -> Result<(), RuntimeError> {
        self.queue.finish()
    }
}
