//! # Scheduling
//!
//! A [`Scheduler`] turns one bound kernel into concurrent partition launches.
//! Partitioning is shared: [`Scheduler::schedule`] splits the window with
//! [`Window::split`] into at most [`num_workers`](Scheduler::num_workers)
//! pieces respecting the kernel's granularity, then hands them to the
//! strategy-specific [`dispatch`](Scheduler::dispatch).
//!
//! ## Disciplines
//!
//! - [`CpuScheduler`] — synchronous: `schedule` returns once every partition
//!   has run; `barrier` and `sync` have nothing to wait for
//! - [`QueuedScheduler`] — queued: `schedule` only enqueues; `barrier` keeps
//!   later launches from starting before earlier ones finish; `sync` blocks
//!   until the queue is drained
//!
//! Callers that launch a kernel reading what an earlier kernel wrote must
//! issue a [`barrier`](Scheduler::barrier) between the two. On a synchronous
//! scheduler the barrier is free, so operators issue it unconditionally.

use crate::error::RuntimeError;
use crate::ops::{KernelArgs, KernelCandidate, KernelParams, OpKind};
use crate::tensors::{DeviceUse, Tensor, TensorAccess};
use crate::window::Window;
use core::fmt;
use std::sync::Arc;

pub mod cpu;
pub mod queued;

pub use cpu::CpuScheduler;
pub use queued::{HostQueue, QueuedScheduler};

/// How a scheduler executes launches relative to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Discipline {
    /// `schedule` blocks until the launch has completed.
    Synchronous,
    /// `schedule` enqueues; `sync` waits.
    Queued,
}

/// A selected kernel together with its operands.
#[derive(Debug, Clone)]
pub struct BoundKernel {
    pub op: OpKind,
    pub kernel: KernelCandidate,
    pub src: Tensor,
    pub dst: Tensor,
    pub params: KernelParams,
}

/// One kernel launch shared by its partitions.
///
/// Both operands stay marked busy until the last partition drops its handle,
/// so host reads of a queued result wait for the launch to finish.
pub struct Launch {
    op: OpKind,
    kernel: KernelCandidate,
    src: TensorAccess,
    dst: TensorAccess,
    params: KernelParams,
    _uses: [DeviceUse; 2],
}

impl Launch {
    pub(crate) fn new(bound: &BoundKernel) -> Self {
        Self {
            op: bound.op,
            kernel: bound.kernel,
            src: bound.src.access(),
            dst: bound.dst.access(),
            params: bound.params,
            _uses: [bound.src.begin_use(), bound.dst.begin_use()],
        }
    }

    pub fn op(&self) -> OpKind {
        self.op
    }

    pub fn kernel_name(&self) -> &'static str {
        self.kernel.name()
    }

    /// Runs the kernel body over one partition.
    pub fn run(&self, window: &Window) {
        let args = KernelArgs {
            src: &self.src,
            dst: &self.dst,
            params: &self.params,
        };
        self.kernel.invoke(&args, window);
    }
}

impl fmt::Debug for Launch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Launch")
            .field("op", &self.op)
            .field("kernel", &self.kernel.name())
            .finish_non_exhaustive()
    }
}

/// Execution strategy of a context.
pub trait Scheduler: Send + Sync + fmt::Debug {
    fn discipline(&self) -> Discipline;

    /// Upper bound on partitions per launch.
    fn num_workers(&self) -> usize;

    /// Executes or enqueues every partition of `launch`.
    ///
    /// # Errors
    /// [`RuntimeError::Submission`] when a partition cannot be submitted.
    /// Partitions submitted before the failure still run.
    fn dispatch(&self, launch: Arc<Launch>, partitions: Vec<Window>) -> Result<(), RuntimeError>;

    /// Orders every launch submitted before the call ahead of every launch
    /// submitted after it.
    fn barrier(&self) -> Result<(), RuntimeError>;

    /// Blocks until every submitted launch has completed.
    fn sync(&self) -> Result<(), RuntimeError>;

    /// Splits `window` along `hint` and dispatches the pieces.
    ///
    /// An out-of-range `hint` falls back to
    /// [`Window::preferred_split_dimension`]. An empty window launches nothing.
    fn schedule(&self, kernel: &BoundKernel, window: &Window, hint: usize) -> Result<(), RuntimeError> {
        let dim = if hint < window.rank() {
            hint
        } else {
            window.preferred_split_dimension()
        };
        let partitions = window.split(dim, kernel.kernel.min_granularity(), self.num_workers());
        if partitions.is_empty() {
            return Ok(());
        }
        tracing::trace!(
            op = %kernel.op,
            kernel = kernel.kernel.name(),
            %window,
            dim,
            partitions = partitions.len(),
            "scheduling launch"
        );
        self.dispatch(Arc::new(Launch::new(kernel)), partitions)
    }
}
