//! # Backend Registry
//!
//! Static capability records for every backend compiled into this build.

use crate::config::DecodeConfig;
use crate::traits::Backend;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;

/// Capability record of one backend: name, priority rank and the backend
/// itself (which carries the availability predicate and `open`).
///
/// Lower `priority` values are tried first.
#[derive(Clone)]
pub struct AdapterDescriptor {
    priority: u32,
    backend: Arc<dyn Backend>,
}

impl AdapterDescriptor {
    pub fn new(priority: u32, backend: Arc<dyn Backend>) -> Self {
        Self { priority, backend }
    }

    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Evaluate the backend's availability predicate.
    pub fn is_available(&self, config: &DecodeConfig) -> bool {
        self.backend.is_available(config)
    }
}

impl fmt::Debug for AdapterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterDescriptor")
            .field("name", &self.name())
            .field("priority", &self.priority)
            .finish()
    }
}

/// Ordered set of backend descriptors.
///
/// Descriptors are kept sorted by ascending priority; registration order
/// breaks ties.
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    descriptors: Vec<AdapterDescriptor>,
}

static DEFAULT_REGISTRY: Lazy<BackendRegistry> = Lazy::new(BackendRegistry::with_defaults);

impl BackendRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry containing every backend compiled into this build, in the
    /// default priority order: raw, coreaudio (macOS), symphonia (feature),
    /// ffmpeg.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register(0, Arc::new(crate::decoder::raw::RawBackend));

        #[cfg(target_os = "macos")]
        registry.register(10, Arc::new(crate::decoder::coreaudio::CoreAudioBackend));

        #[cfg(feature = "backend-symphonia")]
        registry.register(20, Arc::new(crate::decoder::symphonia::SymphoniaBackend));

        registry.register(30, Arc::new(crate::decoder::ffmpeg::FfmpegBackend));

        registry
    }

    /// Process-wide default registry, built on first use and read-only
    /// afterwards.
    pub fn global() -> &'static BackendRegistry {
        &DEFAULT_REGISTRY
    }

    /// Add a backend. A backend registered under an existing name replaces
    /// the previous one.
    pub fn register(&mut self, priority: u32, backend: Arc<dyn Backend>) -> &mut Self {
        let name = backend.name();
        self.descriptors.retain(|d| d.name() != name);

        let index = self
            .descriptors
            .iter()
            .position(|d| d.priority > priority)
            .unwrap_or(self.descriptors.len());
        self.descriptors
            .insert(index, AdapterDescriptor::new(priority, backend));
        self
    }

    /// Descriptors in priority order.
    pub fn descriptors(&self) -> &[AdapterDescriptor] {
        &self.descriptors
    }

    pub fn get(&self, name: &str) -> Option<&AdapterDescriptor> {
        self.descriptors.iter().find(|d| d.name() == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.descriptors.iter().map(AdapterDescriptor::name).collect()
    }

    /// Names of backends whose availability predicate holds right now.
    pub fn available(&self, config: &DecodeConfig) -> Vec<&'static str> {
        self.descriptors
            .iter()
            .filter(|d| d.is_available(config))
            .map(AdapterDescriptor::name)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
