//! 2D pooling over rank 4 feature maps.

use super::{Operator, OperatorCore, Plan, check_rank, check_same_type, check_shape};
use crate::context::ExecutionContext;
use crate::error::{ConfigError, RuntimeError};
use crate::ops::{KernelParams, OpKind, OperandTypes, PoolKind, PoolParams};
use crate::tensors::{Padding, Tensor, TensorDescriptor};

/// How a partial last pooling window is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RoundingMode {
    /// Windows that would run past the padded input are dropped.
    #[default]
    Floor,
    /// A trailing partial window is kept if it starts inside the input or
    /// the leading padding.
    Ceil,
}

/// Pooling geometry in (height, width) order. The spatial dimensions come
/// from the operands' [`DataLayout`](crate::dtype::DataLayout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolingOptions {
    pub kind: PoolKind,
    pub pool_size: (usize, usize),
    pub strides: (usize, usize),
    /// Implicit padding; `top`/`bottom` pad height, `left`/`right` pad width.
    pub padding: Padding,
    pub rounding: RoundingMode,
    /// Averages divide by the in-bounds element count only.
    pub exclude_padding: bool,
}

impl PoolingOptions {
    /// Non-overlapping windows of `pool_size` without padding.
    pub fn new(kind: PoolKind, pool_size: (usize, usize)) -> Self {
        Self {
            kind,
            pool_size,
            strides: pool_size,
            padding: Padding::NONE,
            rounding: RoundingMode::Floor,
            exclude_padding: true,
        }
    }

    #[must_use]
    pub fn with_strides(mut self, strides: (usize, usize)) -> Self {
        self.strides = strides;
        self
    }

    #[must_use]
    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    #[must_use]
    pub fn with_rounding(mut self, rounding: RoundingMode) -> Self {
        self.rounding = rounding;
        self
    }

    #[must_use]
    pub fn exclude_padding(mut self, exclude: bool) -> Self {
        self.exclude_padding = exclude;
        self
    }

    /// Destination shape for a source of `src` shape, or why there is none.
    pub fn output_shape(&self, src: &TensorDescriptor) -> Result<Vec<usize>, String> {
        if src.rank() != 4 {
            return Err(format!("needs rank 4 operands, got rank {}", src.rank()));
        }
        let (hd, wd) = src.layout().spatial_dims();
        let mut shape = src.shape().to_vec();
        shape[hd] = output_extent(
            src.shape()[hd],
            self.pool_size.0,
            self.strides.0,
            (self.padding.top, self.padding.bottom),
            self.rounding,
        )
        .ok_or("pool height exceeds the padded input height")?;
        shape[wd] = output_extent(
            src.shape()[wd],
            self.pool_size.1,
            self.strides.1,
            (self.padding.left, self.padding.right),
            self.rounding,
        )
        .ok_or("pool width exceeds the padded input width")?;
        Ok(shape)
    }

    fn check(&self) -> Result<(), String> {
        let (kh, kw) = self.pool_size;
        if kh == 0 || kw == 0 {
            return Err(format!("pool size must be positive, got {kh}x{kw}"));
        }
        if self.strides.0 == 0 || self.strides.1 == 0 {
            return Err(format!(
                "strides must be positive, got {}x{}",
                self.strides.0, self.strides.1
            ));
        }
        let p = self.padding;
        if p.top >= kh || p.bottom >= kh || p.left >= kw || p.right >= kw {
            return Err(format!("padding {p:?} must be smaller than the pool size {kh}x{kw}"));
        }
        Ok(())
    }
}

fn output_extent(input: usize, size: usize, stride: usize, pad: (usize, usize), rounding: RoundingMode) -> Option<usize> {
    let total = input + pad.0 + pad.1;
    let span = total.checked_sub(size)?;
    let mut out = match rounding {
        RoundingMode::Floor => span / stride + 1,
        RoundingMode::Ceil => span.div_ceil(stride) + 1,
    };
    // the last window must start inside the input or the leading padding
    if rounding == RoundingMode::Ceil && (out - 1) * stride >= input + pad.0 {
        out -= 1;
    }
    Some(out)
}

/// Max or average pooling over the spatial plane of NCHW or NHWC tensors.
#[derive(Debug)]
pub struct Pooling2d<'ctx> {
    core: OperatorCore<'ctx>,
}

impl<'ctx> Pooling2d<'ctx> {
    pub fn new(ctx: &'ctx ExecutionContext) -> Self {
        Self {
            core: OperatorCore::new(ctx, OpKind::Pool2d),
        }
    }

    fn plan(&self, src: &Tensor, dst: &Tensor, options: &PoolingOptions) -> Result<Plan, ConfigError> {
        const OP: OpKind = OpKind::Pool2d;
        let invalid = |reason: String| ConfigError::InvalidOption { op: OP, reason };

        self.core.check_operands(src, dst)?;
        let (s, d) = (src.descriptor(), dst.descriptor());
        check_rank(OP, s, d)?;
        if s.layout() != d.layout() {
            return Err(invalid(format!(
                "source layout {:?} differs from destination layout {:?}",
                s.layout(),
                d.layout()
            )));
        }
        check_same_type(OP, s, d)?;
        options.check().map_err(invalid)?;
        let expected = options.output_shape(s).map_err(invalid)?;
        check_shape(OP, &expected, d)?;

        let kernel = self.core.select(OP, OperandTypes::same(s.data_type()))?;
        let params = PoolParams {
            kind: options.kind,
            size: options.pool_size,
            stride: options.strides,
            pad: options.padding,
            exclude_padding: options.exclude_padding,
        };
        Ok(Plan::new(kernel, KernelParams::Pool(params)))
    }
}

impl Operator for Pooling2d<'_> {
    type Options = PoolingOptions;

    fn validate(&self, src: &Tensor, dst: &Tensor, options: &PoolingOptions) -> Result<(), ConfigError> {
        self.plan(src, dst, options).map(drop)
    }

    fn configure(&mut self, src: &Tensor, dst: &Tensor, options: PoolingOptions) -> Result<(), ConfigError> {
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
