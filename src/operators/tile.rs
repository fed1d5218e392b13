//! Repetition of a tensor along each dimension.

use super::{Operator, OperatorCore, Plan, check_rank, check_same_type, check_shape};
use crate::context::ExecutionContext;
use crate::error::{ConfigError, RuntimeError};
use crate::ops::{KernelParams, OpKind, OperandTypes};
use crate::tensors::Tensor;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TileOptions {
    /// Repetitions per dimension, outermost first. One entry per dimension.
    pub multiples: Vec<usize>,
}

/// `dst[c] = src[c mod src.shape]`, with `dst.shape = src.shape * multiples`.
#[derive(Debug)]
pub struct Tile<'ctx> {
    core: OperatorCore<'ctx>,
}

impl<'ctx> Tile<'ctx> {
    pub fn new(ctx: &'ctx ExecutionContext) -> Self {
        Self {
            core: OperatorCore::new(ctx, OpKind::Tile),
        }
    }

    fn plan(&self, src: &Tensor, dst: &Tensor, options: &TileOptions) -> Result<Plan, ConfigError> {
        self.core.check_operands(src, dst)?;
        let (s, d) = (src.descriptor(), dst.descriptor());
        check_rank(OpKind::Tile, s, d)?;
        check_same_type(OpKind::Tile, s, d)?;
        if options.multiples.len() != s.rank() {
            return Err(ConfigError::InvalidOption {
                op: OpKind::Tile,
                reason: format!(
                    "{} multiples given for a rank {} source",
                    options.multiples.len(),
                    s.rank()
                ),
            });
        }
        if options.multiples.contains(&0) {
            return Err(ConfigError::InvalidOption {
                op: OpKind::Tile,
                reason: "multiples must be at least 1".into(),
            });
        }
        let expected = s
            .shape()
            .iter()
            .zip(&options.multiples)
            .map(|(n, m)| n.checked_mul(*m))
            .collect::<Option<Vec<usize>>>()
            .ok_or_else(|| ConfigError::InvalidOption {
                op: OpKind::Tile,
                reason: "tiled extent overflows".into(),
            })?;
        check_shape(OpKind::Tile, &expected, d)?;

        let kernel = self.core.select(OpKind::Tile, OperandTypes::same(s.data_type()))?;
        Ok(Plan::new(kernel, KernelParams::None))
    }
}

impl Operator for Tile<'_> {
    type Options = TileOptions;

    fn validate(&self, src: &Tensor, dst: &Tensor, options: &TileOptions) -> Result<(), ConfigError> {
        self.plan(src, dst, options).map(drop)
    }

    fn configure(&mut self, src: &Tensor, dst: &Tensor, options: TileOptions) -> Result<(), ConfigError> {
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
