//! Element type conversion.
//!
//! Float to integer conversion rounds to nearest with ties to even, then
//! applies the [`ConvertPolicy`]: `Saturate` clamps to the destination range
//! (NaN becomes 0), `Wrap` keeps the low bits of the rounded value (NaN and
//! infinities become 0). Integer narrowing follows the same policy. Every
//! conversion to a float type rounds to nearest.

use super::{first_only, load_f64, positions, saturate, store_f64, store_int};
use crate::dtype::DataType;
use crate::ops::{ConvertPolicy, KernelArgs, KernelParams};
use crate::tensors::TensorAccess;
use crate::window::Window;

fn policy(params: &KernelParams) -> ConvertPolicy {
    match params {
        KernelParams::Cast(policy) => *policy,
        _ => ConvertPolicy::default(),
    }
}

/// Reduces a rounded value modulo `2^bits` of `ty` and reinterprets the low
/// bits in the signedness of `ty`.
pub(crate) fn wrap(value: f64, ty: DataType) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    let modulus = 2f64.powi(8 * ty.size() as i32);
    let bits = value.round_ties_even().rem_euclid(modulus) as u64;
    match ty {
        DataType::S8 => i64::from(bits as u8 as i8),
        DataType::S16 => i64::from(bits as u16 as i16),
        DataType::S32 => i64::from(bits as u32 as i32),
        _ => bits as i64,
    }
}

#[inline]
fn convert(src: &TensorAccess, dst: &TensorAccess, coords: &[isize], policy: ConvertPolicy) {
    let value = load_f64(src, coords);
    let ty = dst.data_type();
    if ty.is_float() {
        store_f64(dst, coords, value);
        return;
    }
    let int = match policy {
        ConvertPolicy::Saturate => saturate(value, ty),
        ConvertPolicy::Wrap => wrap(value, ty),
    };
    store_int(dst, coords, int);
}

/// Portable conversion between any two of the integer types and `f32`.
pub fn cast_generic(args: &KernelArgs<'_>, window: &Window) {
    let policy = policy(args.params);
    window.for_each(|c| convert(args.src, args.dst, c, policy));
}

/// Conversion between `f16` and `f32`.
pub fn cast_half(args: &KernelArgs<'_>, window: &Window) {
    window.for_each(|c| store_f64(args.dst, c, load_f64(args.src, c)));
}

const LANES: usize = 8;

/// `f32 -> u8` in fixed lanes along the innermost dimension.
pub fn cast_f32_u8_chunked(args: &KernelArgs<'_>, window: &Window) {
    let policy = policy(args.params);
    let inner = window.rank() - 1;
    let row = window.dim(inner);
    let columns = positions(row);
    let rows = window.with_dim(inner, first_only(row));

    rows.for_each(|base| {
        let mut coords = base.to_vec();
        for chunk in columns.chunks(LANES) {
            let mut lanes = [0f32; LANES];
            for (lane, &x) in lanes.iter_mut().zip(chunk) {
                coords[inner] = x;
                *lane = args.src.read::<f32>(&coords);
            }
            let out = lanes.map(|v| match policy {
                ConvertPolicy::Saturate => saturate(f64::from(v), DataType::U8) as u8,
                ConvertPolicy::Wrap => wrap(f64::from(v), DataType::U8) as u8,
            });
            for (&v, &x) in out.iter().zip(chunk) {
                coords[inner] = x;
                args.dst.write(&coords, v);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::cpu::run_whole;
    use crate::tensors::{Tensor, TensorDescriptor};

    fn cast_f32(
        entry: crate::ops::KernelFn,
        input: &[f32],
        dst_ty: DataType,
        policy: ConvertPolicy,
    ) -> Tensor {
        let src = Tensor::from_slice(TensorDescriptor::new([input.len()], DataType::F32), input).unwrap();
        let dst = Tensor::zeros(TensorDescriptor::new([input.len()], dst_ty)).unwrap();
        run_whole(entry, &src, &dst, KernelParams::Cast(policy));
        dst
    }

    #[test]
    fn saturating_f32_to_u8() {
        let input = [1.5, 2.9, -1.0, 300.0, 0.5, 2.5, f32::NAN, 254.5, 255.5, 7.0];
        let expected = vec![2u8, 3, 0, 255, 0, 2, 0, 254, 255, 7];
        for entry in [cast_generic as crate::ops::KernelFn, cast_f32_u8_chunked] {
            let out = cast_f32(entry, &input, DataType::U8, ConvertPolicy::Saturate);
            assert_eq!(out.to_vec::<u8>().unwrap(), expected);
        }
    }

    #[test]
    fn wrapping_f32_to_u8_and_s8() {
        let input = [256.0, 257.4, -1.0, 300.0, f32::INFINITY];
        for entry in [cast_generic as crate::ops::KernelFn, cast_f32_u8_chunked] {
            let out = cast_f32(entry, &input, DataType::U8, ConvertPolicy::Wrap);
            assert_eq!(out.to_vec::<u8>().unwrap(), vec![0, 1, 255, 44, 0]);
        }
        let out = cast_f32(cast_generic, &[128.0, -129.0, 127.5], DataType::S8, ConvertPolicy::Wrap);
        assert_eq!(out.to_vec::<i8>().unwrap(), vec![-128, 127, -128]);
    }

    #[test]
    fn integer_narrowing() {
        let src = Tensor::from_slice(TensorDescriptor::new([4], DataType::S32), &[-1i32, 70000, 65535, -40000]).unwrap();
        let sat = Tensor::zeros(TensorDescriptor::new([4], DataType::U16)).unwrap();
        let wrapped = Tensor::zeros(TensorDescriptor::new([4], DataType::S16)).unwrap();
        run_whole(cast_generic, &src, &sat, KernelParams::Cast(ConvertPolicy::Saturate));
        run_whole(cast_generic, &src, &wrapped, KernelParams::Cast(ConvertPolicy::Wrap));
        assert_eq!(sat.to_vec::<u16>().unwrap(), vec![0, 65535, 65535, 0]);
        assert_eq!(wrapped.to_vec::<i16>().unwrap(), vec![-1, 4464, -1, 25536]);
    }

    #[test]
    fn half_round_trip_of_representable_values() {
        let values = [0.5f32, -2.0, 1024.0, 0.375];
        let src = Tensor::from_slice(TensorDescriptor::new([4], DataType::F32), &values).unwrap();
        let half = Tensor::zeros(TensorDescriptor::new([4], DataType::F16)).unwrap();
        let back = Tensor::zeros(TensorDescriptor::new([4], DataType::F32)).unwrap();
        run_whole(cast_half, &src, &half, KernelParams::None);
        run_whole(cast_half, &half, &back, KernelParams::None);
        assert_eq!(back.to_vec::<f32>().unwrap(), values.to_vec());
    }

    #[test]
    fn chunked_cast_covers_strided_rows() {
        let input: Vec<f32> = (0..30).map(|v| v as f32 * 1.5).collect();
        let src = Tensor::from_slice(TensorDescriptor::new([3, 10], DataType::F32), &input).unwrap();
        let dst = Tensor::zeros(TensorDescriptor::new([3, 10], DataType::U8)).unwrap();
        run_whole(cast_f32_u8_chunked, &src, &dst, KernelParams::Cast(ConvertPolicy::Saturate));
        let expected: Vec<u8> = input.iter().map(|&v| saturate(f64::from(v), DataType::U8) as u8).collect();
        assert_eq!(dst.to_vec::<u8>().unwrap(), expected);
    }
}
