//! Halo fill ahead of neighbourhood kernels.
//!
//! The window covers the destination workspace including its halo. Positions
//! inside the source extent copy the source; halo positions take a constant
//! or the nearest edge element of the source.

use super::store_f64;
use crate::ops::{BorderFill, KernelArgs, KernelParams};
use crate::window::Window;

pub fn fill_border(args: &KernelArgs<'_>, window: &Window) {
    let fill = match args.params {
        KernelParams::Border(fill) => *fill,
        other => panic!("border kernel launched with {other:?}"),
    };
    let shape = args.src.shape();
    if shape.contains(&0) {
        return;
    }
    let mut from = vec![0isize; shape.len()];

    window.for_each(|to| {
        let inside = to
            .iter()
            .zip(shape)
            .all(|(&c, &n)| c >= 0 && c < n as isize);
        if inside {
            args.dst.copy_element(to, args.src, to);
            return;
        }
        match fill {
            BorderFill::Constant(value) => store_f64(args.dst, to, value),
            BorderFill::Replicate => {
                for ((f, &c), &n) in from.iter_mut().zip(to).zip(shape) {
                    *f = c.clamp(0, n as isize - 1);
                }
                args.dst.copy_element(to, args.src, &from);
            }
        }
    });
}
