//! Error taxonomy of the engine.
//!
//! - [`ConfigError`] is returned from `validate`/`configure` and never from `run`.
//! - [`RuntimeError`] is returned from `run` and `sync`. Partitions dispatched
//!   before the failure are not rolled back, so the destination may hold
//!   partial output.
//! - [`ContextError`] is returned while building an [`ExecutionContext`].
//!
//! Misuse that correct callers cannot reach (running an unconfigured operator,
//! a kernel body panicking) is not represented here; it panics.
//!
//! [`ExecutionContext`]: crate::context::ExecutionContext

use crate::capabilities::CpuFeatures;
use crate::dtype::DataType;
use crate::ops::OpKind;

/// Why the selector could not produce a kernel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    #[error("no kernel is registered for {src} -> {dst}")]
    NoTypeMatch { src: DataType, dst: DataType },

    #[error("kernels for {src} -> {dst} need one of [{}], available: {available}", fmt_requirements(.required))]
    MissingCapabilities {
        src: DataType,
        dst: DataType,
        /// Requirements of every type-compatible candidate, in registration order.
        required: Vec<CpuFeatures>,
        available: CpuFeatures,
    },
}

fn fmt_requirements(required: &[CpuFeatures]) -> String {
    required
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Configuration-time failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{op}: source has rank {src}, destination has rank {dst}")]
    RankMismatch { op: OpKind, src: usize, dst: usize },

    #[error("{op}: expected destination shape {expected:?}, got {actual:?}")]
    ShapeMismatch {
        op: OpKind,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("{op}: source type {src} is not compatible with destination type {dst}")]
    TypeMismatch {
        op: OpKind,
        src: DataType,
        dst: DataType,
    },

    #[error("invalid tensor descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    #[error("{op}: {reason}")]
    InvalidOption { op: OpKind, reason: String },

    #[error("{op}: source and destination share a buffer, which this operation does not support")]
    AliasedOperands { op: OpKind },

    #[error("{op}: border mode `undefined` needs {required} element(s) of source padding, found {available}")]
    InsufficientPadding {
        op: OpKind,
        required: usize,
        available: usize,
    },

    #[error("{op}: unsupported configuration: {source}")]
    Unsupported {
        op: OpKind,
        #[source]
        source: SelectError,
    },
}

/// Execution-time failures.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("{op}: failed to allocate {bytes} byte workspace: {source}")]
    Allocation {
        op: OpKind,
        bytes: usize,
        #[source]
        source: AllocError,
    },

    #[error("{op}: kernel `{kernel}` could not submit partition {partition}: command queue is closed")]
    Submission {
        op: OpKind,
        kernel: &'static str,
        partition: usize,
    },

    #[error("command queue worker terminated before the queue was drained")]
    QueueLost,
}

/// Allocator refusal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("request of {requested} bytes exceeds limit ({in_use} of {limit} bytes in use)")]
    LimitExceeded {
        requested: usize,
        in_use: usize,
        limit: usize,
    },

    #[error("request of {requested} bytes cannot be described by a memory layout")]
    Layout { requested: usize },

    #[error("system allocator returned null for {requested} bytes")]
    OutOfMemory { requested: usize },
}

/// Failures while building an execution context.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to spawn command queue worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Failures of host-side tensor creation and access.
#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    #[error(transparent)]
    Descriptor(#[from] ConfigError),

    #[error("failed to allocate tensor storage: {0}")]
    Alloc(#[from] AllocError),

    #[error("tensor holds {expected} elements, slice has {actual}")]
    Length { expected: usize, actual: usize },

    #[error("tensor element type is {expected}, requested {actual}")]
    Type { expected: DataType, actual: DataType },
}
