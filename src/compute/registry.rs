//! Backend registry.
//!
//! Backends register a descriptor of plain function pointers under a
//! `(kernel, variant)` name pair. The descriptor is resolved once at startup.

use std::collections::BTreeMap;

use super::{Engine, EngineError};

/// Entry point run once around the compute calls (init, finalize, first touch).
pub type HookFn = fn(&mut Engine) -> Result<(), EngineError>;

/// Compute entry point. Runs up to `nb_iter` iterations and returns 0, or the
/// number of iterations actually run if the backend stabilized.
pub type ComputeFn = fn(&mut Engine, u32) -> Result<u32, EngineError>;

/// Entry points of one backend.
#[derive(Debug, Clone)]
pub struct BackendDescriptor {
    pub kernel: String,
    pub variant: String,
    pub first_touch: Option<HookFn>,
    pub init: Option<HookFn>,
    pub finalize: Option<HookFn>,
    pub compute: ComputeFn,
    /// `compute` enqueues waves on the offload device rather than the host
    /// raster. Only such backends get a device at startup.
    pub device: bool,
}

impl BackendDescriptor {
    /// Descriptor with only a compute entry point.
    pub fn new(kernel: impl Into<String>, variant: impl Into<String>, compute: ComputeFn) -> Self {
        Self {
            kernel: kernel.into(),
            variant: variant.into(),
            first_touch: None,
            init: None,
            finalize: None,
            compute,
            device: false,
        }
    }

    /// Mark `compute` as a device launcher.
    pub fn on_device(mut self) -> Self {
        self.device = true;
        self
    }

    pub fn with_init(mut self, init: HookFn) -> Self {
        self.init = Some(init);
        self
    }

    pub fn with_finalize(mut self, finalize: HookFn) -> Self {
        self.finalize = Some(finalize);
        self
    }

    pub fn with_first_touch(mut self, first_touch: HookFn) -> Self {
        self.first_touch = Some(first_touch);
        self
    }
}

/// Mapping from `(kernel, variant)` to backend descriptors.
#[derive(Debug, Default)]
pub struct Registry {
    entries: BTreeMap<(String, String), BackendDescriptor>,
    fallback: Option<ComputeFn>,
}

impl Registry {
    /// Empty registry without a fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in backend and the generic device
    /// launcher as fallback.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        super::kernels::register_builtin(&mut registry);
        registry
    }

    /// Add a descriptor, replacing any previous one with the same names.
    pub fn register(&mut self, descriptor: BackendDescriptor) {
        let key = (descriptor.kernel.clone(), descriptor.variant.clone());
        self.entries.insert(key, descriptor);
    }

    /// Install the compute entry used when offloading a backend that has no
    /// compute entry of its own.
    pub fn set_fallback(&mut self, compute: ComputeFn) {
        self.fallback = Some(compute);
    }

    /// Registered kernel names.
    pub fn kernels(&self) -> Vec<&str> {
        let mut kernels: Vec<&str> = self.entries.keys().map(|(k, _)| k.as_str()).collect();
        kernels.dedup();
        kernels
    }

    /// Registered variant names of `kernel`.
    pub fn variants(&self, kernel: &str) -> Vec<&str> {
        self.entries
            .keys()
            .filter(|(k, _)| k == kernel)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Resolve the descriptor for `(kernel, variant)`.
    ///
    /// When `offload` is set, first touch is dropped (the device owns the
    /// memory) and an unresolvable backend falls back to the generic device
    /// launcher if one is installed.
    pub fn resolve(
        &self,
        kernel: &str,
        variant: &str,
        offload: bool,
    ) -> Result<BackendDescriptor, EngineError> {
        let key = (kernel.to_string(), variant.to_string());

        if let Some(descriptor) = self.entries.get(&key) {
            let mut descriptor = descriptor.clone();
            if offload {
                descriptor.first_touch = None;
            }
            log::debug!("Resolved backend {}/{}", kernel, variant);
            return Ok(descriptor);
        }

        match (offload, self.fallback) {
            (true, Some(compute)) => {
                log::warn!(
                    "Cannot resolve backend {}/{}, falling back to generic device launcher",
                    kernel,
                    variant
                );
                Ok(BackendDescriptor::new(kernel, variant, compute).on_device())
            }
            _ => Err(EngineError::Configuration {
                kernel: kernel.to_string(),
                variant: variant.to_string(),
            }),
        }
    }
}
