//! # Decoder Abstractions
//!
//! Core types and traits shared by every decoding backend.
//!
//! ## Overview
//!
//! A [`Backend`] is a process-wide, stateless capability: it can say whether
//! its runtime dependency is present and it can open a file. Opening yields a
//! [`DecoderAdapter`], which owns the per-stream resource (file handle,
//! subprocess, native audio object) and hands out [`AudioBlock`]s until the
//! stream ends.
//!
//! All shipped backends emit signed 16-bit little-endian interleaved PCM.

use crate::config::DecodeConfig;
use crate::error::Result;
use crate::probe::ContainerFormat;
use bytes::Bytes;
use std::path::Path;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

// ============================================================================
// Stream Metadata
// ============================================================================

/// Fixed metadata of an opened stream.
///
/// Populated once by the backend's `open` and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    /// Total duration in seconds (`0.0` when the backend cannot tell).
    pub duration_secs: f64,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Width of one sample in bytes.
    pub bytes_per_sample: u16,
}

impl StreamInfo {
    /// Metadata for 16-bit PCM output, the format every shipped backend produces.
    pub fn s16(duration_secs: f64, channels: u16, sample_rate: u32) -> Self {
        Self {
            duration_secs,
            channels,
            sample_rate,
            bytes_per_sample: 2,
        }
    }

    /// Bytes occupied by one frame (one sample for every channel).
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.bytes_per_sample as usize
    }

    /// Expected size of the full decoded stream in bytes, derived from the
    /// reported duration.
    pub fn expected_len_bytes(&self) -> u64 {
        (self.duration_secs * self.sample_rate as f64).round() as u64 * self.bytes_per_frame() as u64
    }

    /// Duration as a `Duration`.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs.max(0.0))
    }

    /// Largest multiple of the frame size not exceeding `block_size`, never
    /// smaller than one frame.
    pub fn frame_aligned(&self, block_size: usize) -> usize {
        let frame = self.bytes_per_frame().max(1);
        (block_size / frame).max(1) * frame
    }
}

// ============================================================================
// Decoded Audio Data
// ============================================================================

/// One chunk of raw interleaved PCM bytes.
///
/// Blocks are immutable and cheap to clone. A block is never empty: end of
/// stream is signalled by the absence of a block, not by an empty one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBlock(Bytes);

impl AudioBlock {
    /// Wrap PCM bytes. Returns `None` for empty input.
    pub fn new(data: impl Into<Bytes>) -> Option<Self> {
        let data = data.into();
        if data.is_empty() {
            None
        } else {
            Some(Self(data))
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; present for API symmetry with byte containers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl AsRef<[u8]> for AudioBlock {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<AudioBlock> for Bytes {
    fn from(block: AudioBlock) -> Self {
        block.0
    }
}

// ============================================================================
// Core Traits
// ============================================================================

/// An opened decode stream owned by exactly one session.
///
/// State machine: `Opened -> (Reading)* -> Closed`. `Closed` is reachable
/// from any state, and implementations must also release their resource on
/// `Drop` so that abandoning an adapter never leaks it.
pub trait DecoderAdapter: Send {
    /// Stream metadata, fixed at open time.
    fn info(&self) -> &StreamInfo;

    /// Produce the next block of PCM bytes.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(block))` - decoded data
    /// - `Ok(None)` - end of stream; every later call returns `Ok(None)` too
    /// - `Err(DecodeError::DecodeFailed)` - the stream broke mid-read
    fn next_block(&mut self) -> Result<Option<AudioBlock>>;

    /// Release all backend resources. Idempotent.
    fn close(&mut self);
}

/// A decoding mechanism registered with the dispatcher.
///
/// Implementations are stateless and shared process-wide; per-stream state
/// lives in the [`DecoderAdapter`] returned by [`Backend::open`].
#[cfg_attr(test, automock)]
pub trait Backend: Send + Sync {
    /// Stable identifier used in configuration and diagnostics.
    fn name(&self) -> &'static str;

    /// Whether the backend's runtime dependency is present on this system.
    fn is_available(&self, config: &DecodeConfig) -> bool;

    /// Whether this backend can plausibly decode the sniffed container.
    fn handles(&self, container: ContainerFormat) -> bool;

    /// Open `path`, acquiring the backend resource.
    ///
    /// Must release anything partially acquired before returning an error.
    fn open(&self, path: &Path, config: &DecodeConfig) -> Result<Box<dyn DecoderAdapter>>;
}
