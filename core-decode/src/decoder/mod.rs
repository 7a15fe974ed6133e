//! # Decoding Backends
//!
//! One module per backend. Every backend emits signed 16-bit little-endian
//! interleaved PCM.
//!
//! - [`raw`]: uncompressed WAV/AIFF read directly from the file
//! - [`ffmpeg`]: decode through an external `ffmpeg` process
//! - `coreaudio`: ExtAudioFile, macOS only
//! - `symphonia`: pure-Rust decoding, behind the `backend-symphonia` feature

pub mod ffmpeg;
pub mod raw;

#[cfg(target_os = "macos")]
pub mod coreaudio;

#[cfg(feature = "backend-symphonia")]
mod sample_converter;

#[cfg(feature = "backend-symphonia")]
pub mod symphonia;

#[cfg(target_os = "macos")]
pub use self::coreaudio::CoreAudioBackend;
pub use self::ffmpeg::FfmpegBackend;
pub use self::raw::RawBackend;
#[cfg(feature = "backend-symphonia")]
pub use self::symphonia::SymphoniaBackend;
