//! Kernel catalog and capability-driven selection.
//!
//! The catalog is an ordered list of [`KernelCandidate`]s. Selection runs in
//! two filtering passes and one ranking pass:
//!
//! 1. keep candidates of the requested operation whose type set matches;
//!    none left is [`SelectError::NoTypeMatch`]
//! 2. keep candidates whose required flags the capability snapshot satisfies;
//!    none left is [`SelectError::MissingCapabilities`]
//! 3. pick the highest [`specificity`](KernelCandidate::specificity); on a tie
//!    the candidate registered first wins
//!
//! Selection is a pure function of the catalog contents and its inputs.
//!
//! # Built-in registration order
//!
//! [`KernelCatalog::builtin`] registers, in this order:
//!
//! | # | name | op | requires | types |
//! |---|------|----|----------|-------|
//! | 1 | `cast_generic` | cast | — | any two distinct of u8 s8 u16 s16 u32 s32 f32 |
//! | 2 | `cast_f32_u8_chunked` | cast | vector | f32 → u8 |
//! | 3 | `cast_half` | cast | fp16 | f16 → f32, f32 → f16 |
//! | 4 | `transpose_generic` | transpose | — | same type, all |
//! | 5 | `transpose_blocked` | transpose | vector | same type, all |
//! | 6 | `pool_generic` | pool2d | — | f32, u8 |
//! | 7 | `pool_f16` | pool2d | fp16 | f16 |
//! | 8 | `filter3x3_generic` | filter3x3 | — | u8, f32 |
//! | 9 | `fill_border_generic` | fill_border | — | same type, all |
//! | 10 | `tile_generic` | tile | — | same type, all |

use crate::capabilities::{CapabilitySet, CpuFeatures};
use crate::dtype::DataType;
use crate::error::SelectError;
use crate::ops::cpu;
use crate::ops::{KernelCandidate, OpKind, OperandTypes, TypeSet};

/// Ordered collection of kernel candidates.
#[derive(Debug, Clone, Default)]
pub struct KernelCatalog {
    candidates: Vec<KernelCandidate>,
}

const CAST_TYPES: &[DataType] = &[
    DataType::U8,
    DataType::S8,
    DataType::U16,
    DataType::S16,
    DataType::U32,
    DataType::S32,
    DataType::F32,
];

const F32_TO_U8: &[OperandTypes] = &[OperandTypes::new(DataType::F32, DataType::U8)];

const HALF_PAIRS: &[OperandTypes] = &[
    OperandTypes::new(DataType::F16, DataType::F32),
    OperandTypes::new(DataType::F32, DataType::F16),
];

impl KernelCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// The shipped kernels, in the order documented at module level.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog
            .register(
                KernelCandidate::new("cast_generic", OpKind::Cast, cpu::cast::cast_generic)
                    .types(TypeSet::Cross(CAST_TYPES)),
            )
            .register(
                KernelCandidate::new(
                    "cast_f32_u8_chunked",
                    OpKind::Cast,
                    cpu::cast::cast_f32_u8_chunked,
                )
                .types(TypeSet::Pairs(F32_TO_U8))
                .requires(CpuFeatures::VECTOR),
            )
            .register(
                KernelCandidate::new("cast_half", OpKind::Cast, cpu::cast::cast_half)
                    .types(TypeSet::Pairs(HALF_PAIRS))
                    .requires(CpuFeatures::FP16),
            )
            .register(
                KernelCandidate::new(
                    "transpose_generic",
                    OpKind::Transpose,
                    cpu::transpose::transpose_generic,
                )
                .types(TypeSet::Same(&DataType::ALL)),
            )
            .register(
                KernelCandidate::new(
                    "transpose_blocked",
                    OpKind::Transpose,
                    cpu::transpose::transpose_blocked,
                )
                .types(TypeSet::Same(&DataType::ALL))
                .requires(CpuFeatures::VECTOR)
                .granularity(cpu::transpose::BLOCK),
            )
            .register(
                KernelCandidate::new("pool_generic", OpKind::Pool2d, cpu::pool::pool_generic)
                    .types(TypeSet::Same(&[DataType::F32, DataType::U8])),
            )
            .register(
                KernelCandidate::new("pool_f16", OpKind::Pool2d, cpu::pool::pool_f16)
                    .types(TypeSet::Same(&[DataType::F16]))
                    .requires(CpuFeatures::FP16),
            )
            .register(
                KernelCandidate::new(
                    "filter3x3_generic",
                    OpKind::Filter3x3,
                    cpu::filter::filter3x3,
                )
                .types(TypeSet::Same(&[DataType::U8, DataType::F32])),
            )
            .register(
                KernelCandidate::new(
                    "fill_border_generic",
                    OpKind::FillBorder,
                    cpu::border::fill_border,
                )
                .types(TypeSet::Same(&DataType::ALL)),
            )
            .register(
                KernelCandidate::new("tile_generic", OpKind::Tile, cpu::tile::tile)
                    .types(TypeSet::Same(&DataType::ALL)),
            );
        catalog
    }

    /// Appends a candidate. Registration order breaks specificity ties.
    pub fn register(&mut self, candidate: KernelCandidate) -> &mut Self {
        self.candidates.push(candidate);
        self
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Candidates in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &KernelCandidate> {
        self.candidates.iter()
    }

    /// Picks the most specific candidate of `op` that accepts `types` and
    /// whose requirements `caps` satisfies.
    ///
    /// # Errors
    /// [`SelectError::NoTypeMatch`] when no candidate of `op` accepts the
    /// types, [`SelectError::MissingCapabilities`] when every type-compatible
    /// candidate needs flags `caps` lacks.
    pub fn select(
        &self,
        op: OpKind,
        types: OperandTypes,
        caps: &CapabilitySet,
    ) -> Result<&KernelCandidate, SelectError> {
        let mut best: Option<&KernelCandidate> = None;
        let mut required = Vec::new();
        for candidate in self
            .candidates
            .iter()
            .filter(|c| c.op() == op && c.type_set().matches(types))
        {
            required.push(candidate.required_features());
            if caps.satisfies(candidate.required_features())
                && best.is_none_or(|b| candidate.specificity() > b.specificity())
            {
                best = Some(candidate);
            }
        }

        match best {
            Some(candidate) => {
                tracing::debug!(%op, %types, kernel = candidate.name(), "kernel selected");
                Ok(candidate)
            }
            None if required.is_empty() => Err(SelectError::NoTypeMatch {
                src: types.src,
                dst: types.dst,
            }),
            None => Err(SelectError::MissingCapabilities {
                src: types.src,
                dst: types.dst,
                required,
                available: caps.features(),
            }),
        }
    }
}
