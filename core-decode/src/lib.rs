//! # Audio Decode Dispatch
//!
//! Opens an audio file with the first capable backend and streams raw PCM.
//!
//! ## Overview
//!
//! This module handles:
//! - A registry of decoding backends with availability predicates
//! - Candidate ordering (configured priority, optional header sniffing)
//! - Fallback across candidates, aggregating every failure
//! - A uniform stream handle exposing metadata and 16-bit PCM blocks
//!
//! ## Backends
//!
//! | Name | Mechanism | Compiled in |
//! |------|-----------|-------------|
//! | `raw` | Built-in WAV/AIFF reader | always |
//! | `coreaudio` | ExtAudioFile | macOS |
//! | `symphonia` | Pure-Rust codecs | `backend-symphonia` feature |
//! | `ffmpeg` | External `ffmpeg`/`avconv` process | always, available when found on `PATH` |

pub mod config;
pub mod decoder;
pub mod dispatcher;
pub mod error;
mod io_util;
pub mod probe;
pub mod registry;
pub mod session;
pub mod traits;

pub use config::{DecodeConfig, FfmpegConfig, ProbeStrategy};
pub use dispatcher::Dispatcher;
pub use error::{BackendFailure, DecodeError, Result};
pub use probe::{BackendProbe, ContainerFormat};
pub use registry::{AdapterDescriptor, BackendRegistry};
pub use session::{AudioStreamHandle, Blocks};
pub use traits::{AudioBlock, Backend, DecoderAdapter, StreamInfo};

use std::path::Path;

/// Open `path` with the default registry and default configuration.
pub fn audio_open(path: impl AsRef<Path>) -> Result<AudioStreamHandle> {
    audio_open_with(path, &DecodeConfig::default())
}

/// Open `path` with the default registry and an explicit configuration.
pub fn audio_open_with(path: impl AsRef<Path>, config: &DecodeConfig) -> Result<AudioStreamHandle> {
    Dispatcher::with_default_registry(config.clone())?.open(path)
}

/// Names of compiled-in backends usable on this system, in default priority
/// order.
pub fn available_backends() -> Vec<&'static str> {
    BackendRegistry::global().available(&DecodeConfig::default())
}
