//! Swap of the two innermost dimensions.
//!
//! The window ranges over destination positions; destination `[.., i, j]`
//! receives source `[.., j, i]`. Elements are moved bytewise, so every data
//! type shares one body.

use super::{first_only, positions};
use crate::ops::KernelArgs;
use crate::window::Window;

/// Tile edge of [`transpose_blocked`], also its split granularity.
pub const BLOCK: usize = 8;

pub fn transpose_generic(args: &KernelArgs<'_>, window: &Window) {
    let r = window.rank();
    let mut from = vec![0; r];
    window.for_each(|to| {
        from.copy_from_slice(to);
        from.swap(r - 2, r - 1);
        args.dst.copy_element(to, args.src, &from);
    });
}

/// Cache-friendlier traversal in `BLOCK x BLOCK` tiles.
pub fn transpose_blocked(args: &KernelArgs<'_>, window: &Window) {
    let r = window.rank();
    let rows = positions(window.dim(r - 2));
    let cols = positions(window.dim(r - 1));
    let outer = window
        .with_dim(r - 2, first_only(window.dim(r - 2)))
        .with_dim(r - 1, first_only(window.dim(r - 1)));

    outer.for_each(|base| {
        let mut to = base.to_vec();
        let mut from = base.to_vec();
        for row_block in rows.chunks(BLOCK) {
            for col_block in cols.chunks(BLOCK) {
                for &i in row_block {
                    for &j in col_block {
                        to[r - 2] = i;
                        to[r - 1] = j;
                        from[r - 2] = j;
                        from[r - 1] = i;
                        args.dst.copy_element(&to, args.src, &from);
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DataType;
    use crate::ops::cpu::run_whole;
    use crate::ops::KernelParams;
    use crate::tensors::{Tensor, TensorDescriptor};

    #[test]
    fn both_variants_agree() {
        let data: Vec<u16> = (0..2 * 11 * 13).map(|v| v as u16).collect();
        let src = Tensor::from_slice(TensorDescriptor::new([2, 11, 13], DataType::U16), &data).unwrap();
        let a = Tensor::zeros(TensorDescriptor::new([2, 13, 11], DataType::U16)).unwrap();
        let b = Tensor::zeros(TensorDescriptor::new([2, 13, 11], DataType::U16)).unwrap();
        run_whole(transpose_generic, &src, &a, KernelParams::None);
        run_whole(transpose_blocked, &src, &b, KernelParams::None);

        let out = a.to_vec::<u16>().unwrap();
        assert_eq!(out, b.to_vec::<u16>().unwrap());
        for n in 0..2 {
            for i in 0..13 {
                for j in 0..11 {
                    assert_eq!(out[n * 143 + i * 11 + j], data[n * 143 + j * 13 + i]);
                }
            }
        }
    }
}
