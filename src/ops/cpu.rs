//! CPU reference kernel bodies.
//!
//! # CPU Kernels
//!
//! Every body here has the [`KernelFn`](super::KernelFn) signature and writes
//! only the destination positions of the window it receives, so partitions of
//! one launch never race. Parallelism comes from the scheduler, not from the
//! bodies.
//!
//! ## Implemented Ops
//!
//! - [`cast`]: element type conversion under a [`ConvertPolicy`](super::ConvertPolicy)
//! - [`transpose`]: swap of the two innermost dimensions
//! - [`pool`]: 2D max/average pooling over NCHW or NHWC
//! - [`filter`]: 3x3 box and gaussian filters
//! - [`border`]: halo fill (constant or replicated edge)
//! - [`tile`]: repetition along every dimension
//!
//! ## Notes
//!
//! - Capability-gated variants compute bit-identical results to their
//!   portable counterparts; they only differ in traversal order.

pub mod border;
pub mod cast;
pub mod filter;
pub mod pool;
pub mod tile;
pub mod transpose;

use crate::dtype::DataType;
use crate::tensors::TensorAccess;
use crate::window::Dimension;

/// Positions visited along one window dimension.
pub(crate) fn positions(dim: Dimension) -> Vec<isize> {
    (dim.start()..dim.end()).step_by(dim.step()).collect()
}

/// The first position of `dim` only; used to iterate the remaining dimensions.
pub(crate) fn first_only(dim: Dimension) -> Dimension {
    Dimension::new(dim.start(), dim.start() + dim.step() as isize, dim.step())
}

/// Loads one element widened to `f64`. Exact for every supported type.
#[inline]
pub(crate) fn load_f64(access: &TensorAccess, coords: &[isize]) -> f64 {
    match access.data_type() {
        DataType::U8 => f64::from(access.read::<u8>(coords)),
        DataType::S8 => f64::from(access.read::<i8>(coords)),
        DataType::U16 => f64::from(access.read::<u16>(coords)),
        DataType::S16 => f64::from(access.read::<i16>(coords)),
        DataType::U32 => f64::from(access.read::<u32>(coords)),
        DataType::S32 => f64::from(access.read::<i32>(coords)),
        DataType::F16 => f64::from(access.read::<half::f16>(coords)),
        DataType::F32 => f64::from(access.read::<f32>(coords)),
    }
}

/// Stores `value` rounded (ties to even) and saturated to the element type.
#[inline]
pub(crate) fn store_f64(access: &TensorAccess, coords: &[isize], value: f64) {
    match access.data_type() {
        DataType::F16 => access.write(coords, half::f16::from_f64(value)),
        DataType::F32 => access.write(coords, value as f32),
        int => store_int(access, coords, saturate(value, int)),
    }
}

/// Rounds to nearest (ties to even) and clamps into the range of `ty`.
/// NaN maps to zero.
#[inline]
pub(crate) fn saturate(value: f64, ty: DataType) -> i64 {
    let (lo, hi) = ty.int_range().unwrap_or((i64::MIN, i64::MAX));
    if value.is_nan() {
        return 0;
    }
    // Every supported bound is exactly representable as f64.
    value.round_ties_even().clamp(lo as f64, hi as f64) as i64
}

/// Writes an integer already inside the range of the element type.
#[inline]
pub(crate) fn store_int(access: &TensorAccess, coords: &[isize], value: i64) {
    match access.data_type() {
        DataType::U8 => access.write(coords, value as u8),
        DataType::S8 => access.write(coords, value as i8),
        DataType::U16 => access.write(coords, value as u16),
        DataType::S16 => access.write(coords, value as i16),
        DataType::U32 => access.write(coords, value as u32),
        DataType::S32 => access.write(coords, value as i32),
        DataType::F16 => access.write(coords, half::f16::from_f64(value as f64)),
        DataType::F32 => access.write(coords, value as f32),
    }
}

/// Runs `entry` once over the whole destination window.
#[cfg(test)]
pub(crate) fn run_whole(
    entry: super::KernelFn,
    src: &crate::tensors::Tensor,
    dst: &crate::tensors::Tensor,
    params: super::KernelParams,
) {
    let (s, d) = (src.access(), dst.access());
    let args = super::KernelArgs {
        src: &s,
        dst: &d,
        params: &params,
    };
    entry(&args, &dst.descriptor().window());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturation_rounds_half_to_even() {
        assert_eq!(saturate(1.5, DataType::U8), 2);
        assert_eq!(saturate(2.5, DataType::U8), 2);
        assert_eq!(saturate(-0.5, DataType::S8), 0);
        assert_eq!(saturate(-1.5, DataType::S8), -2);
        assert_eq!(saturate(300.0, DataType::U8), 255);
        assert_eq!(saturate(-1e9, DataType::S16), -32768);
        assert_eq!(saturate(f64::NAN, DataType::U32), 0);
        assert_eq!(saturate(f64::INFINITY, DataType::S32), i32::MAX as i64);
    }
}
