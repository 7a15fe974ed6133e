//! # Symphonia Decoder Backend
//!
//! Pure-Rust decoding of the common compressed and lossless formats through
//! the Symphonia library.

use crate::config::DecodeConfig;
use crate::decoder::sample_converter::SampleConverter;
use crate::error::{DecodeError, Result};
use crate::probe::ContainerFormat;
use crate::traits::{AudioBlock, Backend, DecoderAdapter, StreamInfo};
use bytes::BytesMut;
use core_runtime::logging::strip_path;
use std::fs::File;
use std::path::Path;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, error, info, instrument, trace, warn};

const NAME: &str = "symphonia";

/// Consecutive bad packets tolerated before the stream is declared broken.
const MAX_CONSECUTIVE_ERRORS: usize = 10;

/// Always `true` when the `backend-symphonia` feature is compiled in.
pub fn available() -> bool {
    true
}

/// Backend decoding through Symphonia's format readers and codecs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaBackend;

impl Backend for SymphoniaBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_available(&self, _config: &DecodeConfig) -> bool {
        available()
    }

    fn handles(&self, container: ContainerFormat) -> bool {
        container != ContainerFormat::Unknown
    }

    #[instrument(skip(self, path, config), fields(file = %strip_path(&path.to_string_lossy())))]
    fn open(&self, path: &Path, config: &DecodeConfig) -> Result<Box<dyn DecoderAdapter>> {
        Ok(Box::new(SymphoniaAdapter::open(path, config.block_size)?))
    }
}

/// Open Symphonia decode pipeline.
///
/// ```text
/// File -> MediaSourceStream -> FormatReader -> Decoder -> s16le blocks
/// ```
///
/// Decoded packets rarely line up with the block size, so output is staged
/// in `pending` and cut into blocks of at most `block_size` bytes.
pub struct SymphoniaAdapter {
    /// Format reader (demuxer), owns the file. `None` once closed.
    format_reader: Option<Box<dyn FormatReader>>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    converter: SampleConverter,
    pending: BytesMut,
    info: StreamInfo,
    block_size: usize,
    eof: bool,
}

impl SymphoniaAdapter {
    pub fn open(path: &Path, block_size: usize) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| DecodeError::open_failed(NAME, format!("cannot open file: {}", e)))?;

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }
        let media_source = Box::new(file) as Box<dyn MediaSource>;
        let mss = MediaSourceStream::new(media_source, Default::default());

        let probe_result = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                debug!("Format probe failed: {}", e);
                DecodeError::open_failed(NAME, format!("unrecognised format: {}", e))
            })?;
        let format_reader = probe_result.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::open_failed(NAME, "no decodable audio track"))?;

        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params
            .sample_rate
            .filter(|&rate| rate > 0)
            .ok_or_else(|| DecodeError::open_failed(NAME, "missing sample rate"))?;

        let duration_secs = params
            .n_frames
            .map(|frames| frames as f64 / sample_rate as f64)
            .unwrap_or(0.0);

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| DecodeError::open_failed(NAME, format!("unsupported codec: {}", e)))?;

        let channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);

        let mut adapter = Self {
            format_reader: Some(format_reader),
            decoder,
            track_id,
            converter: SampleConverter::new(),
            pending: BytesMut::new(),
            info: StreamInfo::s16(duration_secs, channels, sample_rate),
            block_size,
            eof: false,
        };

        // Some codecs (AAC in MP4) only reveal the channel count once a
        // packet has been decoded
        if channels == 0 {
            debug!("Channel count not in codec parameters, decoding first packet");
            let detected = adapter
                .decode_next_packet()
                .map_err(|e| DecodeError::open_failed(NAME, e.reason()))?
                .ok_or_else(|| DecodeError::open_failed(NAME, "stream has no audio packets"))?;
            adapter.info.channels = detected;
        }

        adapter.block_size = adapter.info.frame_aligned(block_size);
        info!(
            "Decoder initialized: track {}, {} ch, {} Hz",
            track_id, adapter.info.channels, sample_rate
        );
        Ok(adapter)
    }

    /// Read and decode the next packet of the selected track into `pending`.
    ///
    /// Bad packets are skipped until [`MAX_CONSECUTIVE_ERRORS`] fail in a row.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(channels))` - a packet was decoded with this channel count
    /// - `Ok(None)` - end of stream reached
    /// - `Err(DecodeError::DecodeFailed)` - unrecoverable error
    #[instrument(skip(self), level = "trace")]
    fn decode_next_packet(&mut self) -> Result<Option<u16>> {
        if self.eof {
            return Ok(None);
        }
        let Some(format_reader) = self.format_reader.as_mut() else {
            return Ok(None);
        };

        let mut budget = ErrorBudget::default();

        loop {
            let packet = match format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    debug!("Reached end of stream");
                    self.eof = true;
                    return Ok(None);
                }
                Err(SymphoniaError::IoError(e)) => {
                    budget.spend("reading packet", &e)?;
                    continue;
                }
                Err(SymphoniaError::ResetRequired) => {
                    return Err(DecodeError::decode_failed(
                        NAME,
                        "track list changed mid-stream",
                    ));
                }
                Err(e) => {
                    error!("Container read failed: {}", e);
                    return Err(DecodeError::decode_failed(NAME, format!("read: {}", e)));
                }
            };

            // Tags found mid-stream are of no use here
            while !format_reader.metadata().is_latest() {
                format_reader.metadata().pop();
            }
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::IoError(e)) => {
                    budget.spend("decoding packet", &e)?;
                    continue;
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    budget.spend("decoding packet", &e)?;
                    continue;
                }
                Err(e) => {
                    error!("Codec failed: {}", e);
                    return Err(DecodeError::decode_failed(NAME, format!("decode: {}", e)));
                }
            };

            let channels = decoded.spec().channels.count() as u16;
            if self.info.channels != 0 && channels != self.info.channels {
                return Err(DecodeError::decode_failed(
                    NAME,
                    format!(
                        "channel count changed mid-stream from {} to {}",
                        self.info.channels, channels
                    ),
                ));
            }

            let frames = self.converter.append_s16le(decoded, &mut self.pending);
            trace!(frames, "packet decoded");
            return Ok(Some(channels));
        }
    }
}

/// Failures counted within one `decode_next_packet` call.
#[derive(Debug, Default)]
struct ErrorBudget {
    spent: usize,
}

impl ErrorBudget {
    /// Record a recoverable failure; errors once the budget runs out.
    fn spend(&mut self, stage: &str, err: &dyn std::fmt::Display) -> Result<()> {
        self.spent += 1;
        if self.spent >= MAX_CONSECUTIVE_ERRORS {
            error!("Giving up after {} failures {}: {}", self.spent, stage, err);
            return Err(DecodeError::decode_failed(
                NAME,
                format!("{} consecutive failures {}, last: {}", self.spent, stage, err),
            ));
        }
        warn!(
            "Skipping bad packet ({} {}/{}): {}",
            stage, self.spent, MAX_CONSECUTIVE_ERRORS, err
        );
        Ok(())
    }
}

impl DecoderAdapter for SymphoniaAdapter {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn next_block(&mut self) -> Result<Option<AudioBlock>> {
        while self.pending.len() < self.block_size && !self.eof {
            match self.decode_next_packet() {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    self.eof = true;
                    self.pending.clear();
                    return Err(e);
                }
            }
        }

        let take = self.pending.len().min(self.block_size);
        Ok(AudioBlock::new(self.pending.split_to(take).freeze()))
    }

    fn close(&mut self) {
        if self.format_reader.take().is_some() {
            debug!("Released format reader");
        }
        self.eof = true;
        self.pending.clear();
    }
}
