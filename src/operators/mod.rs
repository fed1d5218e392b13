//! # Operators
//!
//! An operator goes through three steps:
//!
//! 1. `validate` checks a source/destination pair and options without
//!    binding anything. It reaches the same verdict `configure` would.
//! 2. `configure` repeats the checks, selects kernels for the context's
//!    capabilities and freezes the execution window from the destination
//!    shape. On error the operator stays unconfigured.
//! 3. `run` schedules the bound kernels. It can be called any number of
//!    times; every call recomputes the destination from the source.
//!
//! Neighbourhood operators read outside the logical source extent. What they
//! read there is chosen explicitly with a [`BorderMode`]:
//!
//! - `Constant`/`Replicate` copy the source into an operator-owned workspace
//!   with a filled halo, allocated on the first `run`
//! - `Undefined` reads the source's own padding, which must be wide enough
//!
//! ## Example
//!
//! ```rust
//! use briny_exec::prelude::*;
//!
//! let ctx = ExecutionContext::new().unwrap();
//! let src = Tensor::from_slice(TensorDescriptor::new([2, 3], DataType::U8), &[1u8, 2, 3, 4, 5, 6]).unwrap();
//! let dst = Tensor::zeros(TensorDescriptor::new([3, 2], DataType::U8)).unwrap();
//!
//! let mut transpose = Transpose::new(&ctx);
//! transpose.configure(&src, &dst, ()).unwrap();
//! transpose.run().unwrap();
//! ctx.sync().unwrap();
//! assert_eq!(dst.to_vec::<u8>().unwrap(), [1, 4, 2, 5, 3, 6]);
//! ```

use crate::context::ExecutionContext;
use crate::error::{ConfigError, RuntimeError};
use crate::ops::{BorderFill, KernelCandidate, KernelParams, OpKind, OperandTypes};
use crate::scheduler::{BoundKernel, Discipline};
use crate::tensors::{Padding, Tensor, TensorDescriptor};
use crate::window::Window;

pub mod cast;
pub mod filter;
pub mod pooling;
pub mod tile;
pub mod transpose;

pub use cast::{Cast, CastOptions};
pub use filter::{Filter3x3, FilterOptions};
pub use pooling::{Pooling2d, PoolingOptions, RoundingMode};
pub use tile::{Tile, TileOptions};
pub use transpose::Transpose;

/// What neighbourhood operators read outside the source extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BorderMode {
    /// Every outside element reads as this value.
    Constant(f64),
    /// Outside elements repeat the nearest edge element.
    Replicate,
    /// The source's padding is read as is; it must be at least the border
    /// size on every side.
    Undefined,
}

/// Validate, configure and run a single operation.
pub trait Operator {
    type Options;

    /// Checks the operand pair against `options` without binding anything.
    ///
    /// # Errors
    /// The [`ConfigError`] [`configure`](Self::configure) would return.
    fn validate(&self, src: &Tensor, dst: &Tensor, options: &Self::Options) -> Result<(), ConfigError>;

    /// Binds kernels for `src` and `dst`. A failed call leaves the operator
    /// as it was before.
    fn configure(&mut self, src: &Tensor, dst: &Tensor, options: Self::Options) -> Result<(), ConfigError>;

    /// Schedules the bound kernels on the context's scheduler.
    ///
    /// # Errors
    /// [`RuntimeError`] on workspace allocation or submission failure.
    ///
    /// # Panics
    /// If the operator has not been configured.
    fn run(&mut self) -> Result<(), RuntimeError>;

    fn is_configured(&self) -> bool;
}

/// Everything `configure` decides, computed from descriptors alone.
#[derive(Debug, Clone)]
pub(crate) struct Plan {
    pub(crate) kernel: KernelCandidate,
    pub(crate) params: KernelParams,
    pub(crate) border: Option<BorderPlan>,
}

impl Plan {
    pub(crate) fn new(kernel: KernelCandidate, params: KernelParams) -> Self {
        Self {
            kernel,
            params,
            border: None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct BorderPlan {
    kernel: KernelCandidate,
    fill: BorderFill,
    workspace: TensorDescriptor,
    window: Window,
}

/// Border binding of a configured operator; owns the workspace once allocated.
#[derive(Debug)]
struct BorderBinding {
    plan: BorderPlan,
    workspace: Option<Tensor>,
}

#[derive(Debug)]
struct Binding {
    kernel: KernelCandidate,
    params: KernelParams,
    src: Tensor,
    dst: Tensor,
    window: Window,
    border: Option<BorderBinding>,
}

/// State shared by every operator: the context and the current binding.
#[derive(Debug)]
pub(crate) struct OperatorCore<'ctx> {
    ctx: &'ctx ExecutionContext,
    op: OpKind,
    binding: Option<Binding>,
    /// Survives reconfiguration: a new binding may still race the last launch.
    launched: bool,
}

impl<'ctx> OperatorCore<'ctx> {
    pub(crate) fn new(ctx: &'ctx ExecutionContext, op: OpKind) -> Self {
        Self {
            ctx,
            op,
            binding: None,
            launched: false,
        }
    }

    pub(crate) fn is_configured(&self) -> bool {
        self.binding.is_some()
    }

    /// Checks shared by every operator: well-formed descriptors and distinct
    /// buffers.
    pub(crate) fn check_operands(&self, src: &Tensor, dst: &Tensor) -> Result<(), ConfigError> {
        src.descriptor().check()?;
        dst.descriptor().check()?;
        if src.shares_buffer(dst) {
            return Err(ConfigError::AliasedOperands { op: self.op });
        }
        Ok(())
    }

    /// Kernel selection for this operator's op.
    pub(crate) fn select(&self, op: OpKind, types: OperandTypes) -> Result<KernelCandidate, ConfigError> {
        let caps = self.ctx.capabilities();
        self.ctx
            .catalog()
            .select(op, types, &caps)
            .copied()
            .map_err(|source| ConfigError::Unsupported { op: self.op, source })
    }

    /// Plans how the `size`-element border around `src` is provided.
    pub(crate) fn plan_border(
        &self,
        src: &TensorDescriptor,
        mode: BorderMode,
        size: usize,
    ) -> Result<Option<BorderPlan>, ConfigError> {
        let fill = match mode {
            BorderMode::Undefined => {
                let available = src.padding().min_side();
                return if available < size {
                    Err(ConfigError::InsufficientPadding {
                        op: self.op,
                        required: size,
                        available,
                    })
                } else {
                    Ok(None)
                };
            }
            BorderMode::Constant(value) => BorderFill::Constant(value),
            BorderMode::Replicate => BorderFill::Replicate,
        };
        let kernel = self.select(OpKind::FillBorder, OperandTypes::same(src.data_type()))?;

        let mut workspace = TensorDescriptor::new(src.shape(), src.data_type())
            .with_layout(src.layout())
            .with_padding(Padding::uniform(size));
        if let Some(q) = src.quantization() {
            workspace = workspace.with_quantization(q);
        }
        let halo: Vec<(usize, usize)> = (0..workspace.rank()).map(|d| workspace.halo(d)).collect();
        let before: Vec<usize> = halo.iter().map(|h| h.0).collect();
        let after: Vec<usize> = halo.iter().map(|h| h.1).collect();
        let window = src.window().expanded(&before, &after);

        Ok(Some(BorderPlan {
            kernel,
            fill,
            workspace,
            window,
        }))
    }

    /// Installs `plan`, replacing any previous binding.
    pub(crate) fn bind(&mut self, plan: Plan, src: &Tensor, dst: &Tensor) {
        let window = dst.descriptor().window();
        tracing::debug!(
            op = %self.op,
            kernel = plan.kernel.name(),
            border = plan.border.as_ref().map(|b| b.kernel.name()),
            %window,
            "operator configured"
        );
        self.binding = Some(Binding {
            kernel: plan.kernel,
            params: plan.params,
            src: src.clone(),
            dst: dst.clone(),
            window,
            border: plan.border.map(|plan| BorderBinding {
                plan,
                workspace: None,
            }),
        });
    }

    pub(crate) fn run(&mut self) -> Result<(), RuntimeError> {
        let op = self.op;
        let ctx = self.ctx;
        let Some(binding) = self.binding.as_mut() else {
            panic!("{op}: run() called on an operator that is not configured");
        };
        let scheduler = ctx.scheduler();
        // the previous launch may still be touching the workspace or operands
        let ordered = if self.launched && scheduler.discipline() == Discipline::Queued {
            scheduler.barrier()
        } else {
            Ok(())
        };
        self.launched = true;
        ordered.and_then(|()| binding.launch(op, ctx)).inspect_err(|e| {
            tracing::warn!(%op, error = %e, "operator run failed");
        })
    }
}

impl Binding {
    fn launch(&mut self, op: OpKind, ctx: &ExecutionContext) -> Result<(), RuntimeError> {
        let scheduler = ctx.scheduler();
        let src = match &mut self.border {
            Some(border) => {
                let workspace = border.workspace(op, ctx)?;
                let fill = BoundKernel {
                    op: OpKind::FillBorder,
                    kernel: border.plan.kernel,
                    src: self.src.clone(),
                    dst: workspace.clone(),
                    params: KernelParams::Border(border.plan.fill),
                };
                let hint = border.plan.window.preferred_split_dimension();
                scheduler.schedule(&fill, &border.plan.window, hint)?;
                scheduler.barrier()?;
                workspace
            }
            None => self.src.clone(),
        };

        let main = BoundKernel {
            op,
            kernel: self.kernel,
            src,
            dst: self.dst.clone(),
            params: self.params,
        };
        scheduler.schedule(&main, &self.window, self.window.preferred_split_dimension())
    }
}

impl BorderBinding {
    fn workspace(&mut self, op: OpKind, ctx: &ExecutionContext) -> Result<Tensor, RuntimeError> {
        if let Some(workspace) = &self.workspace {
            return Ok(workspace.clone());
        }
        let bytes = self.plan.workspace.byte_size();
        let block = ctx
            .allocator()
            .allocate(bytes)
            .map_err(|source| RuntimeError::Allocation { op, bytes, source })?;
        tracing::debug!(%op, bytes, "border workspace allocated");
        let workspace = Tensor::with_block(self.plan.workspace.clone(), block);
        self.workspace = Some(workspace.clone());
        Ok(workspace)
    }
}

pub(crate) fn check_rank(op: OpKind, src: &TensorDescriptor, dst: &TensorDescriptor) -> Result<(), ConfigError> {
    if src.rank() != dst.rank() {
        return Err(ConfigError::RankMismatch {
            op,
            src: src.rank(),
            dst: dst.rank(),
        });
    }
    Ok(())
}

pub(crate) fn check_shape(op: OpKind, expected: &[usize], dst: &TensorDescriptor) -> Result<(), ConfigError> {
    if expected != dst.shape() {
        return Err(ConfigError::ShapeMismatch {
            op,
            expected: expected.to_vec(),
            actual: dst.shape().to_vec(),
        });
    }
    Ok(())
}

pub(crate) fn check_same_type(op: OpKind, src: &TensorDescriptor, dst: &TensorDescriptor) -> Result<(), ConfigError> {
    if src.data_type() != dst.data_type() {
        return Err(ConfigError::TypeMismatch {
            op,
            src: src.data_type(),
            dst: dst.data_type(),
        });
    }
    Ok(())
}
