//! Hardware capability detection.
//!
//! A [`CapabilitySet`] is detected exactly once, while an execution context is
//! being built, through an injected [`CapabilityProbe`]. Overrides are only
//! accepted on the [`RegistryBuilder`]; once [`RegistryBuilder::build`] returns,
//! the snapshot is plain `Copy` data and never changes.
//!
//! # Example
//!
//! ```rust
//! use briny_exec::capabilities::{CapabilityRegistry, CpuFeatures, HostProbe};
//!
//! let registry = CapabilityRegistry::builder(&HostProbe)
//!     .override_features(CpuFeatures::VECTOR)
//!     .max_workers(2)
//!     .build();
//! assert!(registry.snapshot().has_vector());
//! assert_eq!(registry.snapshot().max_workers(), 2);
//! ```

use core::fmt;

/// Bitset of optional CPU/accelerator features a kernel may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CpuFeatures {
    bits: u32,
}

impl CpuFeatures {
    pub const NONE: Self = Self { bits: 0 };
    /// Wide vector unit (AVX2 on x86_64, NEON on aarch64).
    pub const VECTOR: Self = Self { bits: 1 << 0 };
    /// Half-precision arithmetic.
    pub const FP16: Self = Self { bits: 1 << 1 };
    /// Int8 dot-product instructions.
    pub const DOT_PROD: Self = Self { bits: 1 << 2 };
    /// Int8 matrix-multiply instructions.
    pub const MATMUL_INT8: Self = Self { bits: 1 << 3 };
    /// Bfloat16 arithmetic.
    pub const BF16: Self = Self { bits: 1 << 4 };

    const NAMES: [(Self, &'static str); 5] = [
        (Self::VECTOR, "vector"),
        (Self::FP16, "fp16"),
        (Self::DOT_PROD, "dot_prod"),
        (Self::MATMUL_INT8, "matmul_int8"),
        (Self::BF16, "bf16"),
    ];

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self { bits }
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.bits
    }

    /// True when all bits of `other` are set in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.bits & other.bits) == other.bits
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    /// Number of set flags.
    #[inline]
    pub const fn count(self) -> u32 {
        self.bits.count_ones()
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    #[inline]
    pub const fn difference(self, other: Self) -> Self {
        Self {
            bits: self.bits & !other.bits,
        }
    }

    /// Parses a comma separated flag list such as `"vector,fp16"`.
    ///
    /// `none` and the empty string map to [`CpuFeatures::NONE`].
    pub fn parse_list(list: &str) -> Option<Self> {
        let mut flags = Self::NONE;
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if name.eq_ignore_ascii_case("none") {
                continue;
            }
            let (flag, _) = Self::NAMES
                .iter()
                .find(|(_, n)| n.eq_ignore_ascii_case(name))?;
            flags = flags.union(*flag);
        }
        Some(flags)
    }
}

impl core::ops::BitOr for CpuFeatures {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl core::ops::BitOrAssign for CpuFeatures {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.bits |= rhs.bits;
    }
}

impl fmt::Display for CpuFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("(none)")?;
        }
        Ok(())
    }
}

/// Immutable snapshot of what the running hardware offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilitySet {
    features: CpuFeatures,
    max_workers: usize,
}

impl CapabilitySet {
    /// Creates a snapshot. A worker count of zero is raised to one.
    pub const fn new(features: CpuFeatures, max_workers: usize) -> Self {
        Self {
            features,
            max_workers: if max_workers == 0 { 1 } else { max_workers },
        }
    }

    pub const fn features(&self) -> CpuFeatures {
        self.features
    }

    pub const fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub const fn has_vector(&self) -> bool {
        self.features.contains(CpuFeatures::VECTOR)
    }

    pub const fn has_fp16(&self) -> bool {
        self.features.contains(CpuFeatures::FP16)
    }

    pub const fn has_dot_product(&self) -> bool {
        self.features.contains(CpuFeatures::DOT_PROD)
    }

    pub const fn has_matmul_int8(&self) -> bool {
        self.features.contains(CpuFeatures::MATMUL_INT8)
    }

    /// Whether every flag of `required` is present.
    pub const fn satisfies(&self, required: CpuFeatures) -> bool {
        self.features.contains(required)
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} workers)", self.features, self.max_workers)
    }
}

/// Platform capability query.
pub trait CapabilityProbe {
    fn probe(&self) -> CapabilitySet;
}

/// Queries the CPU the process is running on.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProbe;

impl CapabilityProbe for HostProbe {
    fn probe(&self) -> CapabilitySet {
        let workers = std::thread::available_parallelism().map_or(1, usize::from);
        CapabilitySet::new(host_features(), workers)
    }
}

#[cfg(target_arch = "x86_64")]
fn host_features() -> CpuFeatures {
    let mut flags = CpuFeatures::NONE;
    if std::arch::is_x86_feature_detected!("avx2") && std::arch::is_x86_feature_detected!("fma") {
        flags |= CpuFeatures::VECTOR;
    }
    // x86 only converts halves in hardware; the fp16 kernels widen to f32 internally.
    if std::arch::is_x86_feature_detected!("f16c") {
        flags |= CpuFeatures::FP16;
    }
    flags
}

#[cfg(target_arch = "aarch64")]
fn host_features() -> CpuFeatures {
    let mut flags = CpuFeatures::VECTOR; // NEON is mandatory on AArch64
    if std::arch::is_aarch64_feature_detected!("fp16") {
        flags |= CpuFeatures::FP16;
    }
    if std::arch::is_aarch64_feature_detected!("dotprod") {
        flags |= CpuFeatures::DOT_PROD;
    }
    if std::arch::is_aarch64_feature_detected!("i8mm") {
        flags |= CpuFeatures::MATMUL_INT8;
    }
    if std::arch::is_aarch64_feature_detected!("bf16") {
        flags |= CpuFeatures::BF16;
    }
    flags
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn host_features() -> CpuFeatures {
    CpuFeatures::NONE
}

/// Returns a fixed snapshot; used for deterministic tests and replay.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub CapabilitySet);

impl CapabilityProbe for FixedProbe {
    fn probe(&self) -> CapabilitySet {
        self.0
    }
}

/// Owner of the detected capability snapshot of one context.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityRegistry {
    snapshot: CapabilitySet,
}

impl CapabilityRegistry {
    /// Starts building a registry that will query `probe` once.
    pub fn builder(probe: &dyn CapabilityProbe) -> RegistryBuilder<'_> {
        RegistryBuilder {
            probe,
            features: None,
            max_workers: None,
        }
    }

    /// The detected (and possibly overridden) capabilities.
    pub const fn snapshot(&self) -> CapabilitySet {
        self.snapshot
    }
}

/// Construction-time handle; the only place overrides are accepted.
pub struct RegistryBuilder<'p> {
    probe: &'p dyn CapabilityProbe,
    features: Option<CpuFeatures>,
    max_workers: Option<usize>,
}

impl RegistryBuilder<'_> {
    /// Replaces the detected feature flags.
    #[must_use]
    pub fn override_features(mut self, features: CpuFeatures) -> Self {
        self.features = Some(features);
        self
    }

    /// Caps (or raises) the detected worker count.
    #[must_use]
    pub fn max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers);
        self
    }

    /// Runs detection and freezes the result.
    pub fn build(self) -> CapabilityRegistry {
        let detected = self.probe.probe();
        let snapshot = CapabilitySet::new(
            self.features.unwrap_or(detected.features()),
            self.max_workers.unwrap_or(detected.max_workers()),
        );
        tracing::debug!(%detected, %snapshot, "capabilities detected");
        CapabilityRegistry { snapshot }
    }
}
