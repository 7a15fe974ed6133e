//! # Dispatcher
//!
//! Prioritized fallback across registered backends. The first backend that
//! opens the file wins; later candidates are never consulted, even if they
//! might decode it "better".

use crate::config::DecodeConfig;
use crate::error::{BackendFailure, DecodeError, Result};
use crate::probe::BackendProbe;
use crate::registry::BackendRegistry;
use crate::session::AudioStreamHandle;
use core_runtime::logging::strip_path;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Opens audio files by walking backend candidates in order.
#[derive(Debug, Clone)]
pub struct Dispatcher<'r> {
    registry: &'r BackendRegistry,
    config: DecodeConfig,
}

impl Dispatcher<'static> {
    /// Dispatcher over the process-wide default registry.
    pub fn with_default_registry(config: DecodeConfig) -> Result<Self> {
        Self::new(BackendRegistry::global(), config)
    }
}

impl<'r> Dispatcher<'r> {
    /// Create a dispatcher. Fails if `config` does not validate.
    pub fn new(registry: &'r BackendRegistry, config: DecodeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { registry, config })
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    pub fn registry(&self) -> &'r BackendRegistry {
        self.registry
    }

    /// Names of registered backends that are usable on this system.
    pub fn available_backends(&self) -> Vec<&'static str> {
        self.registry.available(&self.config)
    }

    /// Open `path` with the first backend that accepts it.
    ///
    /// Per-backend failures are recorded, not returned; if no candidate
    /// succeeds the result is [`DecodeError::NoDecoderAvailable`] listing
    /// each of them.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<AudioStreamHandle> {
        self.open_path(path.as_ref())
    }

    #[instrument(skip(self, path), fields(file = %strip_path(&path.to_string_lossy())))]
    fn open_path(&self, path: &Path) -> Result<AudioStreamHandle> {
        let candidates = BackendProbe::probe(path, self.registry, &self.config);
        debug!(
            "Candidates: {:?}",
            candidates.iter().map(|d| d.name()).collect::<Vec<_>>()
        );

        let mut failures = Vec::with_capacity(candidates.len());

        for descriptor in candidates {
            let name = descriptor.name();

            if !descriptor.is_available(&self.config) {
                debug!(backend = name, "Skipping unavailable backend");
                failures.push(BackendFailure::new(name, "backend not available"));
                continue;
            }

            match descriptor.backend().open(path, &self.config) {
                Ok(adapter) => {
                    let stream = AudioStreamHandle::new(name, adapter, self.config.block_size);
                    info!(
                        backend = name,
                        duration_secs = stream.duration(),
                        channels = stream.channels(),
                        sample_rate = stream.sample_rate(),
                        "Opened audio stream"
                    );
                    return Ok(stream);
                }
                Err(e) => {
                    if !e.is_open_failure() {
                        warn!(backend = name, "Backend open returned non-open error: {}", e);
                    } else {
                        debug!(backend = name, "Backend could not open file: {}", e);
                    }
                    failures.push(BackendFailure::new(name, e.reason()));
                }
            }
        }

        Err(DecodeError::NoDecoderAvailable {
            path: path.to_path_buf(),
            failures,
        })
    }
}
