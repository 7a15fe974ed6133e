//! # Built-in PCM Reader
//!
//! Reads uncompressed 16-bit WAV and AIFF files without any external
//! dependency. Anything else is rejected at open time so the dispatcher can
//! move on to a more capable backend.

use crate::config::DecodeConfig;
use crate::error::{DecodeError, Result};
use crate::probe::ContainerFormat;
use crate::io_util::read_full;
use crate::traits::{AudioBlock, Backend, DecoderAdapter, StreamInfo};
use core_runtime::logging::strip_path;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, instrument};

const NAME: &str = "raw";

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Largest `fmt ` / `COMM` body we are willing to buffer.
const MAX_FORMAT_CHUNK: u64 = 64 * 1024;

/// Backend for uncompressed WAV/AIFF.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBackend;

impl Backend for RawBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_available(&self, _config: &DecodeConfig) -> bool {
        true
    }

    fn handles(&self, container: ContainerFormat) -> bool {
        matches!(container, ContainerFormat::Wav | ContainerFormat::Aiff)
    }

    #[instrument(skip(self, path, config), fields(file = %strip_path(&path.to_string_lossy())))]
    fn open(&self, path: &Path, config: &DecodeConfig) -> Result<Box<dyn DecoderAdapter>> {
        Ok(Box::new(RawAdapter::open(path, config.block_size)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

/// Location and shape of the PCM payload inside a container.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PcmLayout {
    channels: u16,
    sample_rate: u32,
    order: ByteOrder,
    data_offset: u64,
    data_len: u64,
}

impl PcmLayout {
    fn info(&self) -> StreamInfo {
        let frames = self.data_len / (self.channels as u64 * 2);
        StreamInfo::s16(frames as f64 / self.sample_rate as f64, self.channels, self.sample_rate)
    }
}

/// Open stream over a WAV or AIFF file.
#[derive(Debug)]
pub struct RawAdapter {
    reader: Option<BufReader<File>>,
    info: StreamInfo,
    remaining: u64,
    block_size: usize,
    swap: bool,
}

impl RawAdapter {
    pub fn open(path: &Path, block_size: usize) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| DecodeError::open_failed(NAME, format!("cannot open file: {}", e)))?;
        let file_len = file
            .metadata()
            .map_err(|e| DecodeError::open_failed(NAME, format!("cannot stat file: {}", e)))?
            .len();

        let mut reader = BufReader::new(file);
        let layout = parse_header(&mut reader, file_len)?;
        reader
            .seek(SeekFrom::Start(layout.data_offset))
            .map_err(|e| DecodeError::open_failed(NAME, format!("cannot seek to data: {}", e)))?;

        let info = layout.info();
        debug!(
            "PCM layout: {} ch, {} Hz, {} data bytes, {:?} endian",
            layout.channels, layout.sample_rate, layout.data_len, layout.order
        );

        Ok(Self {
            reader: Some(reader),
            info,
            remaining: layout.data_len,
            block_size: info.frame_aligned(block_size),
            swap: layout.order == ByteOrder::Big,
        })
    }
}

impl DecoderAdapter for RawAdapter {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn next_block(&mut self) -> Result<Option<AudioBlock>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        if self.remaining == 0 {
            return Ok(None);
        }

        let want = self.block_size.min(self.remaining as usize);
        let mut buf = vec![0u8; want];
        let filled = read_full(reader, &mut buf)
            .map_err(|e| DecodeError::decode_failed(NAME, format!("read error: {}", e)))?;

        // The file shrank after open; emit whole frames only and stop
        let frame = self.info.bytes_per_frame();
        let usable = filled - filled % frame;
        if usable < want {
            self.remaining = 0;
        } else {
            self.remaining -= usable as u64;
        }
        buf.truncate(usable);

        if self.swap {
            for sample in buf.chunks_exact_mut(2) {
                sample.swap(0, 1);
            }
        }

        Ok(AudioBlock::new(buf))
    }

    fn close(&mut self) {
        self.reader = None;
        self.remaining = 0;
    }
}

// ============================================================================
// Header parsing
// ============================================================================

fn open_err(reason: impl Into<String>) -> DecodeError {
    DecodeError::open_failed(NAME, reason)
}

fn header_err(e: io::Error) -> DecodeError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        open_err("truncated header")
    } else {
        open_err(format!("header read error: {}", e))
    }
}

fn read_array<const N: usize>(reader: &mut impl Read) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(header_err)?;
    Ok(buf)
}

/// Buffer a format chunk body, refusing sizes no real header uses.
fn read_chunk_body(reader: &mut impl Read, id: &str, size: u64) -> Result<Vec<u8>> {
    if size > MAX_FORMAT_CHUNK {
        return Err(open_err(format!("{} chunk too large ({} bytes)", id.trim_end(), size)));
    }
    let mut body = vec![0u8; size as usize];
    reader.read_exact(&mut body).map_err(header_err)?;
    Ok(body)
}

fn skip(reader: &mut impl Seek, len: u64) -> Result<()> {
    let offset = i64::try_from(len).map_err(|_| open_err("chunk size out of range"))?;
    reader.seek(SeekFrom::Current(offset)).map_err(header_err)?;
    Ok(())
}

fn parse_header<R: Read + Seek>(reader: &mut R, file_len: u64) -> Result<PcmLayout> {
    let magic: [u8; 12] = read_array(reader)?;
    match (&magic[0..4], &magic[8..12]) {
        (b"RIFF", b"WAVE") => parse_wav(reader, file_len),
        (b"FORM", b"AIFF") => parse_aiff(reader, file_len, false),
        (b"FORM", b"AIFC") => parse_aiff(reader, file_len, true),
        (b"RIFX", b"WAVE") => Err(open_err("big-endian RIFX is not supported")),
        _ => Err(open_err("not a RIFF/WAVE or AIFF file")),
    }
}

struct WavFormat {
    channels: u16,
    sample_rate: u32,
}

fn parse_wav<R: Read + Seek>(reader: &mut R, file_len: u64) -> Result<PcmLayout> {
    let mut format: Option<WavFormat> = None;

    loop {
        let header: [u8; 8] = read_array(reader)?;
        let id = &header[0..4];
        let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as u64;

        match id {
            b"fmt " => {
                if size < 16 {
                    return Err(open_err("fmt chunk too small"));
                }
                let body = read_chunk_body(reader, "fmt ", size)?;
                format = Some(parse_wav_fmt(&body)?);
                if size % 2 == 1 {
                    skip(reader, 1)?;
                }
            }
            b"data" => {
                let format = format.ok_or_else(|| open_err("data chunk before fmt chunk"))?;
                let data_offset = reader.stream_position().map_err(header_err)?;
                return Ok(layout(
                    format.channels,
                    format.sample_rate,
                    ByteOrder::Little,
                    data_offset,
                    size,
                    file_len,
                ));
            }
            _ => skip(reader, size + size % 2)?,
        }
    }
}

fn parse_wav_fmt(body: &[u8]) -> Result<WavFormat> {
    let le16 = |at: usize| u16::from_le_bytes([body[at], body[at + 1]]);
    let le32 = |at: usize| u32::from_le_bytes([body[at], body[at + 1], body[at + 2], body[at + 3]]);

    let mut tag = le16(0);
    let channels = le16(2);
    let sample_rate = le32(4);
    let bits = le16(14);

    if tag == WAVE_FORMAT_EXTENSIBLE {
        if body.len() < 26 {
            return Err(open_err("extensible fmt chunk too small"));
        }
        // First two bytes of the sub-format GUID carry the real format tag
        tag = le16(24);
    }

    if tag != WAVE_FORMAT_PCM {
        return Err(open_err(format!("unsupported WAVE format tag 0x{:04x}", tag)));
    }
    if bits != 16 {
        return Err(open_err(format!("unsupported sample width: {} bits", bits)));
    }
    if channels == 0 || sample_rate == 0 {
        return Err(open_err("invalid channel count or sample rate"));
    }

    Ok(WavFormat {
        channels,
        sample_rate,
    })
}

struct AiffFormat {
    channels: u16,
    sample_rate: u32,
    order: ByteOrder,
}

fn parse_aiff<R: Read + Seek>(reader: &mut R, file_len: u64, compressed: bool) -> Result<PcmLayout> {
    let mut format: Option<AiffFormat> = None;

    loop {
        let header: [u8; 8] = read_array(reader)?;
        let id = &header[0..4];
        let size = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as u64;

        match id {
            b"COMM" => {
                if size < 18 || (compressed && size < 22) {
                    return Err(open_err("COMM chunk too small"));
                }
                let body = read_chunk_body(reader, "COMM", size)?;
                format = Some(parse_aiff_comm(&body, compressed)?);
                if size % 2 == 1 {
                    skip(reader, 1)?;
                }
            }
            b"SSND" => {
                let format = format.ok_or_else(|| open_err("SSND chunk before COMM chunk"))?;
                if size < 8 {
                    return Err(open_err("SSND chunk too small"));
                }
                let params: [u8; 8] = read_array(reader)?;
                let offset = u32::from_be_bytes([params[0], params[1], params[2], params[3]]) as u64;
                skip(reader, offset)?;
                let data_offset = reader.stream_position().map_err(header_err)?;
                let data_len = size.saturating_sub(8 + offset);
                return Ok(layout(
                    format.channels,
                    format.sample_rate,
                    format.order,
                    data_offset,
                    data_len,
                    file_len,
                ));
            }
            _ => skip(reader, size + size % 2)?,
        }
    }
}

fn parse_aiff_comm(body: &[u8], compressed: bool) -> Result<AiffFormat> {
    let channels = u16::from_be_bytes([body[0], body[1]]);
    let bits = u16::from_be_bytes([body[6], body[7]]);
    let mut rate = [0u8; 10];
    rate.copy_from_slice(&body[8..18]);
    let sample_rate = extended_to_f64(&rate);

    let order = if compressed {
        match &body[18..22] {
            b"NONE" | b"twos" => ByteOrder::Big,
            b"sowt" => ByteOrder::Little,
            other => {
                return Err(open_err(format!(
                    "unsupported AIFC compression '{}'",
                    String::from_utf8_lossy(other)
                )))
            }
        }
    } else {
        ByteOrder::Big
    };

    if bits != 16 {
        return Err(open_err(format!("unsupported sample width: {} bits", bits)));
    }
    if channels == 0 || !(1.0..=u32::MAX as f64).contains(&sample_rate) {
        return Err(open_err("invalid channel count or sample rate"));
    }

    Ok(AiffFormat {
        channels,
        sample_rate: sample_rate.round() as u32,
        order,
    })
}

/// Decode an IEEE 754 80-bit extended float (big-endian), as used for the
/// AIFF sample rate.
fn extended_to_f64(bytes: &[u8; 10]) -> f64 {
    let sign = if bytes[0] & 0x80 != 0 { -1.0 } else { 1.0 };
    let exponent = (((bytes[0] & 0x7F) as i32) << 8) | bytes[1] as i32;
    let mut mantissa = [0u8; 8];
    mantissa.copy_from_slice(&bytes[2..10]);
    let mantissa = u64::from_be_bytes(mantissa);

    if exponent == 0 && mantissa == 0 {
        return 0.0;
    }
    sign * mantissa as f64 * 2f64.powi(exponent - 16383 - 63)
}

fn layout(
    channels: u16,
    sample_rate: u32,
    order: ByteOrder,
    data_offset: u64,
    declared_len: u64,
    file_len: u64,
) -> PcmLayout {
    let present = file_len.saturating_sub(data_offset);
    if declared_len > present {
        debug!(
            "Data chunk declares {} bytes but only {} are present, clamping",
            declared_len, present
        );
    }
    let frame = channels as u64 * 2;
    let data_len = declared_len.min(present);
    PcmLayout {
        channels,
        sample_rate,
        order,
        data_offset,
        data_len: data_len - data_len % frame,
    }
}
