//! # Audio Stream Session
//!
//! The caller-facing handle returned by a successful open.

use crate::error::Result;
use crate::traits::{AudioBlock, DecoderAdapter, StreamInfo};
use std::fmt;
use tracing::{debug, trace};

/// An open decode stream.
///
/// Owns exactly one backend adapter. Metadata is fixed at open time; blocks
/// are produced strictly forward and only once. Resources are released by
/// [`close`](Self::close) or, if the caller never closes, when the handle is
/// dropped, whichever comes first.
///
/// ```rust,no_run
/// # fn main() -> core_decode::Result<()> {
/// let mut stream = core_decode::audio_open("/music/tone.wav")?;
/// println!("{}s, {} ch, {} Hz", stream.duration(), stream.channels(), stream.sample_rate());
///
/// // Reading is optional; leaving the scope early still cleans up.
/// if let Some(first) = stream.next_block()? {
///     println!("first block: {} bytes", first.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct AudioStreamHandle {
    adapter: Option<Box<dyn DecoderAdapter>>,
    info: StreamInfo,
    backend: &'static str,
    block_size: usize,
    finished: bool,
}

impl AudioStreamHandle {
    pub(crate) fn new(
        backend: &'static str,
        adapter: Box<dyn DecoderAdapter>,
        block_size: usize,
    ) -> Self {
        let info = *adapter.info();
        Self {
            adapter: Some(adapter),
            info,
            backend,
            block_size: info.frame_aligned(block_size),
            finished: false,
        }
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.info.duration_secs
    }

    pub fn channels(&self) -> u16 {
        self.info.channels
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.info.sample_rate
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    /// Upper bound for the size of one block, in bytes. Blocks may be
    /// shorter, the last one usually is.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Name of the backend that decodes this stream.
    pub fn backend_name(&self) -> &'static str {
        self.backend
    }

    /// `false` once the handle has been closed.
    pub fn is_open(&self) -> bool {
        self.adapter.is_some()
    }

    /// Read the next block.
    ///
    /// Returns `Ok(None)` at end of stream, after `close`, and after a
    /// previous read failed. A decode failure is returned once, at the read
    /// where it happened; the stream is finished afterwards.
    pub fn next_block(&mut self) -> Result<Option<AudioBlock>> {
        if self.finished {
            return Ok(None);
        }
        let Some(adapter) = self.adapter.as_mut() else {
            return Ok(None);
        };

        match adapter.next_block() {
            Ok(Some(block)) => {
                trace!(bytes = block.len(), "block");
                Ok(Some(block))
            }
            Ok(None) => {
                debug!(backend = self.backend, "End of stream");
                self.finished = true;
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                Err(e)
            }
        }
    }

    /// Borrowing iterator over the remaining blocks.
    pub fn blocks(&mut self) -> Blocks<'_> {
        Blocks { handle: self }
    }

    /// Release the backend resource. Safe to call any number of times.
    pub fn close(&mut self) {
        if let Some(mut adapter) = self.adapter.take() {
            debug!(backend = self.backend, "Closing stream");
            adapter.close();
        }
        self.finished = true;
    }
}

impl Iterator for AudioStreamHandle {
    type Item = Result<AudioBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_block().transpose()
    }
}

impl std::iter::FusedIterator for AudioStreamHandle {}

impl Drop for AudioStreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for AudioStreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioStreamHandle")
            .field("backend", &self.backend)
            .field("info", &self.info)
            .field("block_size", &self.block_size)
            .field("open", &self.is_open())
            .field("finished", &self.finished)
            .finish()
    }
}

/// Iterator returned by [`AudioStreamHandle::blocks`].
pub struct Blocks<'a> {
    handle: &'a mut AudioStreamHandle,
}

impl Iterator for Blocks<'_> {
    type Item = Result<AudioBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        self.handle.next_block().transpose()
    }
}

impl std::iter::FusedIterator for Blocks<'_> {}
