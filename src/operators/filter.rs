//! 3x3 neighbourhood filters.

use super::{BorderMode, Operator, OperatorCore, Plan, check_rank, check_same_type, check_shape};
use crate::context::ExecutionContext;
use crate::error::{ConfigError, RuntimeError};
use crate::ops::{FilterKind, KernelParams, OpKind, OperandTypes};
use crate::tensors::Tensor;

/// Elements the filter reads past each edge.
pub const BORDER_SIZE: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterOptions {
    pub kind: FilterKind,
    pub border: BorderMode,
}

/// Box or Gaussian 3x3 filter over the two innermost dimensions.
///
/// With [`BorderMode::Constant`] or [`BorderMode::Replicate`], each run first
/// copies the source into a halo workspace, then filters the workspace.
#[derive(Debug)]
pub struct Filter3x3<'ctx> {
    core: OperatorCore<'ctx>,
}

impl<'ctx> Filter3x3<'ctx> {
    pub fn new(ctx: &'ctx ExecutionContext) -> Self {
        Self {
            core: OperatorCore::new(ctx, OpKind::Filter3x3),
        }
    }

    fn plan(&self, src: &Tensor, dst: &Tensor, options: &FilterOptions) -> Result<Plan, ConfigError> {
        const OP: OpKind = OpKind::Filter3x3;
        self.core.check_operands(src, dst)?;
        let (s, d) = (src.descriptor(), dst.descriptor());
        check_rank(OP, s, d)?;
        if s.rank() < 2 {
            return Err(ConfigError::InvalidOption {
                op: OP,
                reason: format!("needs rank 2 or more, got {}", s.rank()),
            });
        }
        check_same_type(OP, s, d)?;
        check_shape(OP, s.shape(), d)?;

        let kernel = self.core.select(OP, OperandTypes::same(s.data_type()))?;
        let mut plan = Plan::new(kernel, KernelParams::Filter(options.kind));
        plan.border = self.core.plan_border(s, options.border, BORDER_SIZE)?;
        Ok(plan)
    }
}

impl Operator for Filter3x3<'_> {
    type Options = FilterOptions;

    fn validate(&self, src: &Tensor, dst: &Tensor, options: &FilterOptions) -> Result<(), ConfigError> {
        self.plan(src, dst, options).map(drop)
    }

    fn configure(&mut self, src: &Tensor, dst: &Tensor, options: FilterOptions) -> Result<(), ConfigError> {
        let plan = self.plan(src, dst, &options)?;
        self.core.bind(plan, src, dst);
        Ok(())
    }

    fn run(&mut self) -> Result<(), RuntimeError> {
        self.core.run()
    }

    fn is_configured(&self) -> bool {
        self.core.is_configured()
    }
}
