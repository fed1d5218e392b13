//! 2D max and average pooling.
//!
//! Operands are rank 4 in the destination's [`DataLayout`]. For output
//! position `(oh, ow)` the pooling window starts at
//! `(oh * stride_h - pad_top, ow * stride_w - pad_left)`. Positions outside
//! the input never contribute to a maximum. Averages divide by the number of
//! in-bounds positions when padding is excluded, otherwise by the positions
//! that fall inside the padded input. An output whose window holds no input
//! element is written as zero.
//!
//! Integer averages round half up: `(sum + count / 2) / count`.
//!
//! [`DataLayout`]: crate::dtype::DataLayout

use super::{load_f64, store_f64, store_int};
use crate::ops::{KernelArgs, KernelParams, PoolKind, PoolParams};
use crate::window::Window;

#[derive(Clone, Copy)]
enum Accumulator {
    Wide,
    Single,
}

fn params(args: &KernelArgs<'_>) -> PoolParams {
    match args.params {
        KernelParams::Pool(p) => *p,
        other => panic!("pooling kernel launched with {other:?}"),
    }
}

/// `f32` and `u8` pooling, accumulating in `f64`.
pub fn pool_generic(args: &KernelArgs<'_>, window: &Window) {
    pool(args, window, Accumulator::Wide);
}

/// `f16` pooling, accumulating in `f32`.
pub fn pool_f16(args: &KernelArgs<'_>, window: &Window) {
    pool(args, window, Accumulator::Single);
}

fn pool(args: &KernelArgs<'_>, window: &Window, acc: Accumulator) {
    let p = params(args);
    let (hd, wd) = args.dst.descriptor().layout().spatial_dims();
    let in_h = args.src.shape()[hd] as isize;
    let in_w = args.src.shape()[wd] as isize;
    let padded_h = in_h + p.pad.bottom as isize;
    let padded_w = in_w + p.pad.right as isize;
    let integer = !args.dst.data_type().is_float();
    let mut from = vec![0isize; 4];

    window.for_each(|to| {
        from.copy_from_slice(to);
        let h0 = to[hd] * p.stride.0 as isize - p.pad.top as isize;
        let w0 = to[wd] * p.stride.1 as isize - p.pad.left as isize;

        let mut best = f64::NEG_INFINITY;
        let mut sum = 0f64;
        let mut sum_single = 0f32;
        let mut inside = 0usize;
        let mut covered = 0usize;
        for ih in h0..h0 + p.size.0 as isize {
            for iw in w0..w0 + p.size.1 as isize {
                if ih < padded_h && iw < padded_w {
                    covered += 1;
                }
                if ih < 0 || iw < 0 || ih >= in_h || iw >= in_w {
                    continue;
                }
                from[hd] = ih;
                from[wd] = iw;
                let v = load_f64(args.src, &from);
                inside += 1;
                best = best.max(v);
                sum += v;
                sum_single += v as f32;
            }
        }

        if inside == 0 {
            store_f64(args.dst, to, 0.0);
            return;
        }
        match p.kind {
            PoolKind::Max => store_f64(args.dst, to, best),
            PoolKind::Avg => {
                let count = if p.exclude_padding { inside } else { covered.max(inside) };
                if integer {
                    let total = sum as u64 + count as u64 / 2;
                    store_int(args.dst, to, (total / count as u64) as i64);
                } else {
                    let mean = match acc {
                        Accumulator::Wide => sum / count as f64,
                        Accumulator::Single => f64::from(sum_single / count as f32),
                    };
                    store_f64(args.dst, to, mean);
                }
            }
        }
    });
}
