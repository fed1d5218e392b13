//! 3x3 neighbourhood filters over the two innermost dimensions.
//!
//! The source must be readable one element past every edge: either a halo
//! workspace filled by [`fill_border`](super::border::fill_border) or a caller
//! buffer with at least one element of padding.
//!
//! | kind | u8 | f32 |
//! |------|----|-----|
//! | box | `sum / 9`, truncated | `sum / 9` |
//! | gaussian | `(sum w*x) >> 4`, weights `1 2 1` | `(sum w*x) / 16` |

use super::{load_f64, store_f64, store_int};
use crate::ops::{FilterKind, KernelArgs, KernelParams};
use crate::window::Window;

const GAUSS: [u32; 3] = [1, 2, 1];

pub fn filter3x3(args: &KernelArgs<'_>, window: &Window) {
    let kind = match args.params {
        KernelParams::Filter(kind) => *kind,
        other => panic!("filter kernel launched with {other:?}"),
    };
    let r = window.rank();
    let integer = !args.dst.data_type().is_float();
    let mut from = vec![0isize; r];

    window.for_each(|to| {
        from.copy_from_slice(to);
        let mut sum = 0f64;
        for (dy, wy) in GAUSS.iter().enumerate() {
            for (dx, wx) in GAUSS.iter().enumerate() {
                from[r - 2] = to[r - 2] + dy as isize - 1;
                from[r - 1] = to[r - 1] + dx as isize - 1;
                let weight = match kind {
                    FilterKind::Box => 1.0,
                    FilterKind::Gaussian => f64::from(wy * wx),
                };
                sum += weight * load_f64(args.src, &from);
            }
        }
        match (kind, integer) {
            (FilterKind::Box, true) => store_int(args.dst, to, sum as i64 / 9),
            (FilterKind::Gaussian, true) => store_int(args.dst, to, (sum as i64) >> 4),
            (FilterKind::Box, false) => store_f64(args.dst, to, sum / 9.0),
            (FilterKind::Gaussian, false) => store_f64(args.dst, to, sum / 16.0),
        }
    });
}
