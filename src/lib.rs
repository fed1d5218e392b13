//! # `briny_exec`
//!
//! Capability-driven execution of tensor operators on the host CPU.
//!
//! Each operator is validated and configured once: the engine checks the
//! operands, picks the most specific kernel the detected CPU capabilities
//! allow and freezes an execution window. Every `run` then splits that window
//! into disjoint partitions and hands them to the scheduler of the context's
//! backend.
//!
//! ## Features
//!
//! - **Capabilities**: probed once per context; overridable for tests
//! - **Kernel catalog**: ordered candidates gated by capability flags, with
//!   portable fallbacks for every non-half type
//! - **Schedulers**: synchronous rayon pool or an accelerator-style command
//!   queue with barriers and `sync`
//! - **Operators**: cast, transpose, 2D pooling, 3x3 filters and tile, with
//!   explicit border handling
//! - **GPU probing**: optional `wgpu` adapter capability probe
//!
//! ## Modules
//!
//! - [`capabilities`]: feature flags, probes and the registry
//! - [`tensors`]: descriptors and caller-owned buffers
//! - [`window`]: iteration spaces and partitioning
//! - [`ops`]: kernel candidates, bodies and the catalog
//! - [`scheduler`]: synchronous and queued execution
//! - [`context`]: the execution context and its configuration
//! - [`operators`]: the validate/configure/run operators
//!
//! ## Example
//!
//! ```rust
//! use briny_exec::prelude::*;
//!
//! let ctx = ExecutionContext::new().unwrap();
//! let src = Tensor::from_slice(
//!     TensorDescriptor::new([4], DataType::F32),
//!     &[1.5f32, 2.9, -1.0, 300.0],
//! )
//! .unwrap();
//! let dst = Tensor::zeros(TensorDescriptor::new([4], DataType::U8)).unwrap();
//!
//! let mut cast = Cast::new(&ctx);
//! cast.configure(&src, &dst, CastOptions::default()).unwrap();
//! cast.run().unwrap();
//! ctx.sync().unwrap();
//! assert_eq!(dst.to_vec::<u8>().unwrap(), [2, 3, 0, 255]);
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::similar_names
)]
#![forbid(unused_must_use)]

pub mod allocator;
pub mod backend;
pub mod capabilities;
pub mod context;
pub mod dtype;
pub mod error;
pub mod operators;
pub mod ops;
pub mod scheduler;
pub mod tensors;
pub mod window;

/// Commonly used types and traits.
pub mod prelude {
    pub use crate::backend::Backend;
    pub use crate::capabilities::{CapabilitySet, CpuFeatures};
    pub use crate::context::{ContextConfig, ExecutionContext};
    pub use crate::dtype::{DataLayout, DataType};
    pub use crate::error::{ConfigError, RuntimeError};
    pub use crate::operators::{
        BorderMode, Cast, CastOptions, Filter3x3, FilterOptions, Operator, Pooling2d, PoolingOptions,
        Tile, TileOptions, Transpose,
    };
    pub use crate::ops::{ConvertPolicy, FilterKind, PoolKind};
    pub use crate::tensors::{Padding, Tensor, TensorDescriptor};
}
