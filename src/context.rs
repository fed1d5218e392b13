//! Execution contexts.
//!
//! An [`ExecutionContext`] owns everything operators share: the capability
//! snapshot, the workspace allocator, the scheduler of its [`Backend`] and the
//! kernel catalog. Operators borrow the context, so it cannot be dropped
//! while any operator built from it is alive.
//!
//! Dropping a context waits for queued launches to finish.
//!
//! # Configuration
//!
//! [`ContextConfig::from_env`] reads:
//!
//! | variable | meaning | example |
//! |----------|---------|---------|
//! | `BRINY_EXEC_BACKEND` | `cpu` or `queued` | `queued` |
//! | `BRINY_EXEC_THREADS` | worker count | `8` |
//! | `BRINY_EXEC_FEATURES` | capability override | `vector,fp16` |
//! | `BRINY_EXEC_WORKSPACE_LIMIT` | workspace byte limit | `1048576` |
//!
//! # Example
//!
//! ```rust
//! use briny_exec::backend::Backend;
//! use briny_exec::context::ExecutionContext;
//!
//! let ctx = ExecutionContext::builder()
//!     .backend(Backend::Queued)
//!     .max_workers(2)
//!     .build()
//!     .unwrap();
//! assert_eq!(ctx.capabilities().max_workers(), 2);
//! ctx.sync().unwrap();
//! ```

use crate::allocator::{AllocatorHandle, HostAllocator};
use crate::backend::Backend;
use crate::capabilities::{CapabilityProbe, CapabilityRegistry, CapabilitySet, CpuFeatures, HostProbe};
use crate::error::{ContextError, RuntimeError};
use crate::ops::dispatch::KernelCatalog;
use crate::scheduler::Scheduler;
use std::sync::Arc;

pub const ENV_BACKEND: &str = "BRINY_EXEC_BACKEND";
pub const ENV_THREADS: &str = "BRINY_EXEC_THREADS";
pub const ENV_FEATURES: &str = "BRINY_EXEC_FEATURES";
pub const ENV_WORKSPACE_LIMIT: &str = "BRINY_EXEC_WORKSPACE_LIMIT";

/// Plain-data settings of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContextConfig {
    pub backend: Backend,
    /// Replaces the detected worker count.
    pub max_workers: Option<usize>,
    /// Replaces the detected capability flags.
    pub feature_override: Option<CpuFeatures>,
    /// Caps the workspace bytes the context allocator hands out.
    pub workspace_limit: Option<usize>,
}

impl ContextConfig {
    /// Reads the `BRINY_EXEC_*` environment variables. Unset or empty
    /// variables keep their defaults.
    ///
    /// # Errors
    /// [`ContextError::InvalidConfig`] for values that do not parse.
    pub fn from_env() -> Result<Self, ContextError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ContextError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();
        if let Some(v) = get(ENV_BACKEND) {
            config.backend = v.parse()?;
        }
        if let Some(v) = get(ENV_THREADS) {
            config.max_workers = Some(parse_count(ENV_THREADS, &v)?);
        }
        if let Some(v) = get(ENV_FEATURES) {
            let flags = CpuFeatures::parse_list(&v).ok_or_else(|| {
                ContextError::InvalidConfig(format!("{ENV_FEATURES}: unknown feature in `{v}`"))
            })?;
            config.feature_override = Some(flags);
        }
        if let Some(v) = get(ENV_WORKSPACE_LIMIT) {
            config.workspace_limit = Some(parse_count(ENV_WORKSPACE_LIMIT, &v)?);
        }
        Ok(config)
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize, ContextError> {
    value
        .trim()
        .parse()
        .map_err(|e| ContextError::InvalidConfig(format!("{key}: `{value}` is not a count ({e})")))
}

/// Session state shared by reference by every operator.
#[derive(Debug)]
pub struct ExecutionContext {
    backend: Backend,
    capabilities: CapabilitySet,
    allocator: AllocatorHandle,
    scheduler: Box<dyn Scheduler>,
    catalog: KernelCatalog,
}

impl ExecutionContext {
    /// A context for the host CPU with default settings.
    pub fn new() -> Result<Self, ContextError> {
        Self::builder().build()
    }

    pub fn builder() -> ContextBuilder<'static> {
        ContextBuilder {
            probe: &HostProbe,
            config: ContextConfig::default(),
            catalog: None,
            allocator: None,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// The immutable capability snapshot.
    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    /// Shared handle to the workspace allocator.
    pub fn allocator(&self) -> AllocatorHandle {
        Arc::clone(&self.allocator)
    }

    pub fn scheduler(&self) -> &dyn Scheduler {
        self.scheduler.as_ref()
    }

    pub fn catalog(&self) -> &KernelCatalog {
        &self.catalog
    }

    /// Orders launches submitted before the call ahead of later ones.
    pub fn barrier(&self) -> Result<(), RuntimeError> {
        self.scheduler.barrier()
    }

    /// Blocks until every submitted launch has completed.
    pub fn sync(&self) -> Result<(), RuntimeError> {
        self.scheduler.sync()
    }
}

/// Construction of an [`ExecutionContext`].
pub struct ContextBuilder<'p> {
    probe: &'p dyn CapabilityProbe,
    config: ContextConfig,
    catalog: Option<KernelCatalog>,
    allocator: Option<AllocatorHandle>,
}

impl<'p> ContextBuilder<'p> {
    /// Detects capabilities through `probe` instead of the host CPU.
    pub fn probe<'q>(self, probe: &'q dyn CapabilityProbe) -> ContextBuilder<'q> {
        ContextBuilder {
            probe,
            config: self.config,
            catalog: self.catalog,
            allocator: self.allocator,
        }
    }

    /// Replaces every setting with `config`.
    #[must_use]
    pub fn config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.backend = backend;
        self
    }

    #[must_use]
    pub fn max_workers(mut self, workers: usize) -> Self {
        self.config.max_workers = Some(workers);
        self
    }

    #[must_use]
    pub fn override_features(mut self, features: CpuFeatures) -> Self {
        self.config.feature_override = Some(features);
        self
    }

    /// Limits the default allocator. Ignored when an allocator is supplied.
    #[must_use]
    pub fn workspace_limit(mut self, bytes: usize) -> Self {
        self.config.workspace_limit = Some(bytes);
        self
    }

    /// Uses `catalog` instead of [`KernelCatalog::builtin`].
    #[must_use]
    pub fn catalog(mut self, catalog: KernelCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    #[must_use]
    pub fn allocator(mut self, allocator: AllocatorHandle) -> Self {
        self.allocator = Some(allocator);
        self
    }

    /// Probes capabilities once and starts the scheduler.
    ///
    /// # Errors
    /// [`ContextError`] when worker threads cannot be created.
    pub fn build(self) -> Result<ExecutionContext, ContextError> {
        let mut registry = CapabilityRegistry::builder(self.probe);
        if let Some(features) = self.config.feature_override {
            registry = registry.override_features(features);
        }
        if let Some(workers) = self.config.max_workers {
            registry = registry.max_workers(workers);
        }
        let capabilities = registry.build().snapshot();

        let backend = self.config.backend;
        let scheduler = backend.scheduler(capabilities.max_workers())?;
        let limit = self.config.workspace_limit;
        let allocator = self
            .allocator
            .unwrap_or_else(|| Arc::new(HostAllocator::with_limit(limit)));
        let catalog = self.catalog.unwrap_or_else(KernelCatalog::builtin);

        tracing::info!(
            %backend,
            %capabilities,
            kernels = catalog.len(),
            workspace_limit = ?limit,
            "execution context created"
        );
        Ok(ExecutionContext {
            backend,
            capabilities,
            allocator,
            scheduler,
            catalog,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::FixedProbe;
    use crate::scheduler::Discipline;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn config_from_lookup() {
        let config = ContextConfig::from_lookup(lookup(&[
            (ENV_BACKEND, "queued"),
            (ENV_THREADS, "3"),
            (ENV_FEATURES, "vector,fp16"),
            (ENV_WORKSPACE_LIMIT, " "),
        ]))
        .unwrap();
        assert_eq!(config.backend, Backend::Queued);
        assert_eq!(config.max_workers, Some(3));
        assert_eq!(config.feature_override, Some(CpuFeatures::VECTOR | CpuFeatures::FP16));
        assert_eq!(config.workspace_limit, None);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(ContextConfig::from_lookup(lookup(&[(ENV_THREADS, "many")])).is_err());
        assert!(ContextConfig::from_lookup(lookup(&[(ENV_FEATURES, "warp")])).is_err());
        assert!(ContextConfig::from_lookup(lookup(&[(ENV_BACKEND, "tpu")])).is_err());
        assert_eq!(ContextConfig::from_lookup(lookup(&[])).unwrap(), ContextConfig::default());
    }

    #[test]
    fn builder_applies_overrides() {
        let probe = FixedProbe(CapabilitySet::new(CpuFeatures::VECTOR, 16));
        let ctx = ExecutionContext::builder()
            .probe(&probe)
            .config(ContextConfig {
                backend: Backend::Queued,
                max_workers: Some(2),
                feature_override: Some(CpuFeatures::NONE),
                workspace_limit: Some(64),
            })
            .build()
            .unwrap();
        assert_eq!(ctx.capabilities(), CapabilitySet::new(CpuFeatures::NONE, 2));
        assert_eq!(ctx.scheduler().discipline(), Discipline::Queued);
        assert_eq!(ctx.scheduler().num_workers(), 2);
        assert!(ctx.allocator().allocate(65).is_err());
        assert_eq!(ctx.catalog().len(), KernelCatalog::builtin().len());
    }
}
