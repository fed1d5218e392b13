//! # Kernel Layer
//!
//! A kernel is a plain function with the fixed signature [`KernelFn`]. It
//! receives its operands as [`TensorAccess`] handles plus typed
//! [`KernelParams`], and computes every destination position inside the
//! [`Window`] it is handed. The scheduler calls it once per partition.
//!
//! ## Submodules
//!
//! - [`dispatch`] — the [`KernelCatalog`](dispatch::KernelCatalog) and the
//!   capability-driven selector
//! - [`cpu`] — portable and capability-gated reference kernel bodies
//! - [`wgpu`] *(opt-in)* — GPU adapter capability probe
//!
//! ## Registering a kernel
//!
//! ```rust
//! use briny_exec::capabilities::CpuFeatures;
//! use briny_exec::dtype::DataType;
//! use briny_exec::ops::{KernelArgs, KernelCandidate, OpKind, TypeSet};
//! use briny_exec::ops::dispatch::KernelCatalog;
//! use briny_exec::window::Window;
//!
//! fn my_copy(args: &KernelArgs<'_>, window: &Window) {
//!     window.for_each(|c| args.dst.copy_element(c, args.src, c));
//! }
//!
//! let mut catalog = KernelCatalog::new();
//! catalog.register(
//!     KernelCandidate::new("my_copy", OpKind::Tile, my_copy)
//!         .types(TypeSet::Same(&[DataType::F32]))
//!         .requires(CpuFeatures::VECTOR),
//! );
//! assert_eq!(catalog.len(), 1);
//! ```
//!
//! ## Feature Flags
//!
//! - `wgpu` — enables the [`wgpu`] adapter probe

use crate::capabilities::CpuFeatures;
use crate::dtype::DataType;
use crate::tensors::{Padding, TensorAccess};
use crate::window::Window;
use core::fmt;

pub mod cpu;
pub mod dispatch;
#[cfg(feature = "wgpu")]
pub mod wgpu;

/// Logical operation a kernel implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Cast,
    Transpose,
    Pool2d,
    Filter3x3,
    Tile,
    /// Auxiliary halo fill run ahead of neighbourhood kernels.
    FillBorder,
}

impl OpKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cast => "cast",
            Self::Transpose => "transpose",
            Self::Pool2d => "pool2d",
            Self::Filter3x3 => "filter3x3",
            Self::Tile => "tile",
            Self::FillBorder => "fill_border",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Element types of a kernel's source and destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperandTypes {
    pub src: DataType,
    pub dst: DataType,
}

impl OperandTypes {
    pub const fn new(src: DataType, dst: DataType) -> Self {
        Self { src, dst }
    }

    /// Source and destination share one type.
    pub const fn same(ty: DataType) -> Self {
        Self { src: ty, dst: ty }
    }
}

impl fmt::Display for OperandTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src, self.dst)
    }
}

/// Operand type combinations a kernel accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeSet {
    /// Exactly these pairs.
    Pairs(&'static [OperandTypes]),
    /// Source and destination of one listed type.
    Same(&'static [DataType]),
    /// Any two distinct listed types.
    Cross(&'static [DataType]),
}

impl TypeSet {
    pub fn matches(&self, types: OperandTypes) -> bool {
        match *self {
            Self::Pairs(pairs) => pairs.contains(&types),
            Self::Same(set) => types.src == types.dst && set.contains(&types.src),
            Self::Cross(set) => {
                types.src != types.dst && set.contains(&types.src) && set.contains(&types.dst)
            }
        }
    }
}

/// Float to integer and integer narrowing policy of casts.
///
/// Floats are first rounded to nearest, ties to even. `Saturate` then clamps
/// to the destination range and maps NaN to zero; `Wrap` keeps the low bits
/// (non-finite values become zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConvertPolicy {
    #[default]
    Saturate,
    Wrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PoolKind {
    #[default]
    Max,
    Avg,
}

/// Per-launch pooling geometry, in (height, width) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolParams {
    pub kind: PoolKind,
    pub size: (usize, usize),
    pub stride: (usize, usize),
    /// Implicit zero padding around the spatial plane.
    pub pad: Padding,
    /// Average over in-bounds elements only.
    pub exclude_padding: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterKind {
    /// Unweighted mean of the 3x3 neighbourhood.
    #[default]
    Box,
    /// Separable 1-2-1 weights, normalised by 16.
    Gaussian,
}

/// How the halo around a source is filled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BorderFill {
    /// Every halo element takes this value (converted to the element type).
    Constant(f64),
    /// Every halo element copies the nearest edge element.
    Replicate,
}

/// Operation-specific parameters passed to a kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelParams {
    None,
    Cast(ConvertPolicy),
    Pool(PoolParams),
    Filter(FilterKind),
    Border(BorderFill),
}

/// Operands of one kernel invocation.
#[derive(Debug, Clone, Copy)]
pub struct KernelArgs<'a> {
    pub src: &'a TensorAccess,
    pub dst: &'a TensorAccess,
    pub params: &'a KernelParams,
}

/// Entry point of a kernel body: computes every destination position of the
/// window. Must write only inside the window.
pub type KernelFn = fn(&KernelArgs<'_>, &Window);

/// One implementation of an operation, with the conditions it runs under.
#[derive(Clone, Copy)]
pub struct KernelCandidate {
    name: &'static str,
    op: OpKind,
    requires: CpuFeatures,
    types: TypeSet,
    entry: KernelFn,
    granularity: usize,
}

impl KernelCandidate {
    /// An unconditional candidate accepting no types until [`types`](Self::types) is set.
    pub const fn new(name: &'static str, op: OpKind, entry: KernelFn) -> Self {
        Self {
            name,
            op,
            requires: CpuFeatures::NONE,
            types: TypeSet::Pairs(&[]),
            entry,
            granularity: 1,
        }
    }

    /// Capability flags that must all be present.
    #[must_use]
    pub const fn requires(mut self, features: CpuFeatures) -> Self {
        self.requires = features;
        self
    }

    #[must_use]
    pub const fn types(mut self, types: TypeSet) -> Self {
        self.types = types;
        self
    }

    /// Minimum block size along the split dimension. Zero counts as one.
    #[must_use]
    pub const fn granularity(mut self, granularity: usize) -> Self {
        self.granularity = if granularity == 0 { 1 } else { granularity };
        self
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn op(&self) -> OpKind {
        self.op
    }

    pub const fn required_features(&self) -> CpuFeatures {
        self.requires
    }

    pub const fn type_set(&self) -> TypeSet {
        self.types
    }

    pub const fn entry(&self) -> KernelFn {
        self.entry
    }

    pub const fn min_granularity(&self) -> usize {
        self.granularity
    }

    /// Selection rank: the number of required capability flags.
    pub const fn specificity(&self) -> u32 {
        self.requires.count()
    }

    /// Runs the kernel over one window.
    #[inline]
    pub fn invoke(&self, args: &KernelArgs<'_>, window: &Window) {
        (self.entry)(args, window);
    }
}

impl fmt::Debug for KernelCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelCandidate")
            .field("name", &self.name)
            .field("op", &self.op)
            .field("requires", &self.requires)
            .field("types", &self.types)
            .field("granularity", &self.granularity)
            .finish_non_exhaustive()
    }
}
