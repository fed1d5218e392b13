//! GPU adapter capability probe using WGPU.
//!
//! [`AdapterProbe`] asks WGPU for the default adapter once and translates its
//! feature set into [`CpuFeatures`] flags, so a context can be built with the
//! capabilities of the accelerator it will feed:
//!
//! - every adapter is a wide vector unit: [`CpuFeatures::VECTOR`]
//! - `SHADER_F16`: [`CpuFeatures::FP16`]
//!
//! Launches of a queued context still execute on host worker threads, so the
//! worker count is taken from the host.
//!
//! # Example
//! ```rust,no_run
//! use briny_exec::capabilities::CapabilityRegistry;
//! use briny_exec::ops::wgpu::AdapterProbe;
//!
//! let probe = AdapterProbe::new()?;
//! let caps = CapabilityRegistry::builder(&probe).build().snapshot();
//! println!("{} on {}", caps, probe.adapter_name());
//! # Ok::<(), briny_exec::ops::wgpu::GpuError>(())
//! ```

use crate::capabilities::{CapabilityProbe, CapabilitySet, CpuFeatures};

/// Failure to reach a GPU adapter.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("no suitable adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
}

/// Capability probe backed by the default WGPU adapter.
#[derive(Debug, Clone)]
pub struct AdapterProbe {
    name: String,
    backend: wgpu::Backend,
    features: wgpu::Features,
}

impl AdapterProbe {
    /// Requests the default adapter, blocking on `pollster`.
    ///
    /// # Errors
    /// Returns [`GpuError::Adapter`] when no adapter is available.
    pub fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))?;
        let info = adapter.get_info();
        tracing::debug!(adapter = %info.name, backend = ?info.backend, "gpu adapter found");
        Ok(Self {
            name: info.name,
            backend: info.backend,
            features: adapter.features(),
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> wgpu::Backend {
        self.backend
    }

    /// Capability flags implied by the adapter's features.
    pub fn cpu_features(&self) -> CpuFeatures {
        let mut flags = CpuFeatures::VECTOR;
        if self.features.contains(wgpu::Features::SHADER_F16) {
            flags |= CpuFeatures::FP16;
        }
        flags
    }
}

impl CapabilityProbe for AdapterProbe {
    fn probe(&self) -> CapabilitySet {
        let workers = std::thread::available_parallelism().map_or(1, usize::from);
        CapabilitySet::new(self.cpu_features(), workers)
    }
}
