//! Repetition of the source along every dimension.
//!
//! Destination position `c` receives source position `c[i] % shape[i]`.

use crate::ops::KernelArgs;
use crate::window::Window;

pub fn tile(args: &KernelArgs<'_>, window: &Window) {
    let shape = args.src.shape();
    let mut from = vec![0isize; shape.len()];
    window.for_each(|to| {
        for ((f, &c), &n) in from.iter_mut().zip(to).zip(shape) {
            *f = c.rem_euclid(n as isize);
        }
        args.dst.copy_element(to, args.src, &from);
    });
}
