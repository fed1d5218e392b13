//! Element type conversion.

use super::{Operator, OperatorCore, Plan, check_rank, check_shape};
use crate::context::ExecutionContext;
use crate::error::{ConfigError, RuntimeError};
use crate::ops::{ConvertPolicy, KernelParams, OpKind, OperandTypes};
use crate::tensors::Tensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CastOptions {
    /// Out-of-range handling for integer destinations.
    pub policy: ConvertPolicy,
}

/// Converts every element of the source to the destination type.
///
/// Float to integer rounds to nearest with ties to even, then saturates or
/// wraps according to [`ConvertPolicy`]. NaN becomes 0.
#[derive(Debug)]
pub struct Cast<'ctx> {
    core: OperatorCore<'ctx>,
}

impl<'ctx> Cast<'ctx> {
    pub fn new(ctx: &'ctx ExecutionContext) -> Self {
        Self {
            core: OperatorCore::new(ctx, OpKind::Cast),
        }
    }

    fn plan(&self, src: &Tensor, dst: &Tensor, options: &CastOptions) -> Result<Plan, ConfigError> {
        self.core.check_operands(src, dst)?;
        let (s, d) = (src.descriptor(), dst.descriptor());
        check_rank(OpKind::Cast, s, d)?;
        check_shape(OpKind::Cast, s.shape(), d)?;
        if s.data_type() == d.data_type() {
            return Err(ConfigError::TypeMismatch {
                op: OpKind::Cast,
                src: s.data_type(),
                dst: d.data_type(),
            });
        }
        let kernel = self
            .core
            .select(OpKind::Cast, OperandTypes::new(s.data_type(), d.data_type()))?;
        Ok(Plan::new(kernel, KernelParams::Cast(options.policy)))
    }
}

impl Operator for Cast<'_> {
    type Options = CastOptions;

    fn validate(&self, src: &Tensor, dst: &Tensor, options: &CastOptions) -> Result<(), ConfigError> {
        self.plan(src, dst, options).map(drop)
    }

    fn configure(&mut self, src: &Tensor, dst: &Tensor, options: CastOptions) -> Result<(), ConfigError> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{CapabilitySet, CpuFeatures, FixedProbe};
    use crate::dtype::DataType;
    use crate::error::SelectError;
    use crate::tensors::TensorDescriptor;

    fn context(features: CpuFeatures) -> ExecutionContext {
        let probe = FixedProbe(CapabilitySet::new(features, 2));
        ExecutionContext::builder().probe(&probe).build().unwrap()
    }

    #[test]
    fn wrap_policy() {
        let ctx = context(CpuFeatures::NONE);
        let src = Tensor::from_slice(TensorDescriptor::new([4], DataType::S32), &[256i32, 257, -1, 300]).unwrap();
        let dst = Tensor::zeros(TensorDescriptor::new([4], DataType::U8)).unwrap();
        let mut cast = Cast::new(&ctx);
        cast.configure(&src, &dst, CastOptions { policy: ConvertPolicy::Wrap })
            .unwrap();
        cast.run().unwrap();
        assert_eq!(dst.to_vec::<u8>().unwrap(), [0, 1, 255, 44]);
    }

    #[test]
    fn same_type_is_rejected() {
        let ctx = context(CpuFeatures::NONE);
        let src = Tensor::zeros(TensorDescriptor::new([4], DataType::F32)).unwrap();
        let dst = Tensor::zeros(TensorDescriptor::new([4], DataType::F32)).unwrap();
        let cast = Cast::new(&ctx);
        assert!(matches!(
            cast.validate(&src, &dst, &CastOptions::default()),
            Err(ConfigError::TypeMismatch { op: OpKind::Cast, .. })
        ));
    }

    #[test]
    fn half_needs_fp16() {
        let src = Tensor::zeros(TensorDescriptor::new([2], DataType::F16)).unwrap();
        let dst = Tensor::zeros(TensorDescriptor::new([2], DataType::F32)).unwrap();

        let plain = context(CpuFeatures::VECTOR);
        let err = Cast::new(&plain)
            .validate(&src, &dst, &CastOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Unsupported {
                source: SelectError::MissingCapabilities { .. },
                ..
            }
        ));

        let fp16 = context(CpuFeatures::FP16);
        let mut cast = Cast::new(&fp16);
        cast.configure(&src, &dst, CastOptions::default()).unwrap();
        assert!(cast.is_configured());
    }
}
