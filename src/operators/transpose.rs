//! Swap of the two innermost dimensions.

use super::{Operator, OperatorCore, Plan, check_rank, check_same_type, check_shape};
use crate::context::ExecutionContext;
use crate::error::{ConfigError, RuntimeError};
use crate::ops::{KernelParams, OpKind, OperandTypes};
use crate::tensors::Tensor;

/// `dst[.., i, j] = src[.., j, i]` for tensors of rank 2 or more.
#[derive(Debug)]
pub struct Transpose<'ctx> {
    core: OperatorCore<'ctx>,
}

impl<'ctx> Transpose<'ctx> {
    pub fn new(ctx: &'ctx ExecutionContext) -> Self {
        Self {
            core: OperatorCore::new(ctx, OpKind::Transpose),
        }
    }

    fn plan(&self, src: &Tensor, dst: &Tensor) -> Result<Plan, ConfigError> {
        self.core.check_operands(src, dst)?;
        let (s, d) = (src.descriptor(), dst.descriptor());
        check_rank(OpKind::Transpose, s, d)?;
        if s.rank() < 2 {
            return Err(ConfigError::InvalidOption {
                op: OpKind::Transpose,
                reason: format!("needs rank 2 or more, got {}", s.rank()),
            });
        }
        check_same_type(OpKind::Transpose, s, d)?;
        let mut expected = s.shape().to_vec();
        let rank = expected.len();
        expected.swap(rank - 1, rank - 2);
        check_shape(OpKind::Transpose, &expected, d)?;

        let kernel = self
            .core
            .select(OpKind::Transpose, OperandTypes::same(s.data_type()))?;
        Ok(Plan::new(kernel, KernelParams::None))
    }
}

impl Operator for Transpose<'_> {
    type Options = ();

    fn validate(&self, src: &Tensor, dst: &Tensor, _: &()) -> Result<(), ConfigError> {
        self.plan(src, dst).map(drop)
    }

    fn configure(&mut self, src: &Tensor, dst: &Tensor, _: ()) -> Result<(), ConfigError> {
        let plan = self.plan(src, dst)?;
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
    use crate::tensors::TensorDescriptor;

    #[test]
    fn batched_transpose_with_vector_kernel() {
        let probe = FixedProbe(CapabilitySet::new(CpuFeatures::VECTOR, 3));
        let ctx = ExecutionContext::builder().probe(&probe).build().unwrap();
        let data: Vec<u16> = (0..2 * 9 * 17).map(|v| v as u16).collect();
        let src = Tensor::from_slice(TensorDescriptor::new([2, 9, 17], DataType::U16), &data).unwrap();
        let dst = Tensor::zeros(TensorDescriptor::new([2, 17, 9], DataType::U16)).unwrap();

        let mut op = Transpose::new(&ctx);
        op.configure(&src, &dst, ()).unwrap();
        op.run().unwrap();

        let out = dst.to_vec::<u16>().unwrap();
        for b in 0..2 {
            for i in 0..17 {
                for j in 0..9 {
                    assert_eq!(out[b * 153 + i * 9 + j], data[b * 153 + j * 17 + i]);
                }
            }
        }
    }

    #[test]
    fn shape_must_be_swapped() {
        let ctx = ExecutionContext::new().unwrap();
        let src = Tensor::zeros(TensorDescriptor::new([2, 3], DataType::F32)).unwrap();
        let dst = Tensor::zeros(TensorDescriptor::new([2, 3], DataType::F32)).unwrap();
        assert_eq!(
            Transpose::new(&ctx).validate(&src, &dst, &()).unwrap_err(),
            ConfigError::ShapeMismatch {
                op: OpKind::Transpose,
                expected: vec![3, 2],
                actual: vec![2, 3]
            }
        );
        let flat = Tensor::zeros(TensorDescriptor::new([6], DataType::F32)).unwrap();
        let other = Tensor::zeros(TensorDescriptor::new([6], DataType::F32)).unwrap();
        assert!(matches!(
            Transpose::new(&ctx).validate(&flat, &other, &()),
            Err(ConfigError::InvalidOption { .. })
        ));
    }
}
