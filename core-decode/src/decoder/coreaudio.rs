//! # CoreAudio Decoder Backend (macOS)
//!
//! Decodes through ExtAudioFile, which handles every format the system codecs
//! support (AAC, ALAC, MP3, WAV, AIFF, CAF, ...) and converts to the client
//! format we ask for.

use crate::config::DecodeConfig;
use crate::error::{DecodeError, Result};
use crate::probe::ContainerFormat;
use crate::traits::{AudioBlock, Backend, DecoderAdapter, StreamInfo};
use core_foundation::base::TCFType;
use core_foundation::url::CFURL;
use core_runtime::logging::strip_path;
use coreaudio_sys::*;
use std::ffi::c_void;
use std::path::Path;
use tracing::{debug, instrument, warn};

const NAME: &str = "coreaudio";

/// Always `true` where this module is compiled: AudioToolbox ships with macOS.
pub fn available() -> bool {
    true
}

/// Backend for the platform-native decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreAudioBackend;

impl Backend for CoreAudioBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_available(&self, _config: &DecodeConfig) -> bool {
        available()
    }

    fn handles(&self, container: ContainerFormat) -> bool {
        matches!(
            container,
            ContainerFormat::Wav | ContainerFormat::Aiff | ContainerFormat::Mp3 | ContainerFormat::Mp4
        )
    }

    #[instrument(skip(self, path, config), fields(file = %strip_path(&path.to_string_lossy())))]
    fn open(&self, path: &Path, config: &DecodeConfig) -> Result<Box<dyn DecoderAdapter>> {
        Ok(Box::new(CoreAudioAdapter::open(path, config.block_size)?))
    }
}

fn check(status: OSStatus, what: &str) -> std::result::Result<(), String> {
    if status == 0 {
        Ok(())
    } else {
        Err(format!("{} failed (OSStatus {})", what, status))
    }
}

/// Open ExtAudioFile stream converting to s16le interleaved.
pub struct CoreAudioAdapter {
    file: ExtAudioFileRef,
    info: StreamInfo,
    buffer: Vec<u8>,
    frames_per_block: u32,
    eof: bool,
}

// The ExtAudioFileRef is only touched through &mut self, one thread at a time.
unsafe impl Send for CoreAudioAdapter {}

impl CoreAudioAdapter {
    pub fn open(path: &Path, block_size: usize) -> Result<Self> {
        let url = CFURL::from_path(path, false)
            .ok_or_else(|| DecodeError::open_failed(NAME, "path cannot be converted to a URL"))?;

        let mut file: ExtAudioFileRef = std::ptr::null_mut();
        unsafe {
            let status = ExtAudioFileOpenURL(url.as_concrete_TypeRef() as CFURLRef, &mut file);
            check(status, "ExtAudioFileOpenURL").map_err(|e| DecodeError::open_failed(NAME, e))?;
        }

        // From here on `file` must be disposed on every error path
        match unsafe { Self::configure(file) } {
            Ok((info, frames_total)) => {
                let buffer = vec![0u8; info.frame_aligned(block_size)];
                debug!(
                    "ExtAudioFile opened: {} ch, {} Hz, {} frames",
                    info.channels, info.sample_rate, frames_total
                );
                Ok(Self {
                    file,
                    frames_per_block: (buffer.len() / info.bytes_per_frame()) as u32,
                    info,
                    buffer,
                    eof: false,
                })
            }
            Err(reason) => {
                unsafe {
                    ExtAudioFileDispose(file);
                }
                Err(DecodeError::open_failed(NAME, reason))
            }
        }
    }

    /// Read the file format and install a packed s16 interleaved client
    /// format.
    unsafe fn configure(file: ExtAudioFileRef) -> std::result::Result<(StreamInfo, i64), String> {
        let mut file_format: AudioStreamBasicDescription = std::mem::zeroed();
        let mut size = std::mem::size_of::<AudioStreamBasicDescription>() as u32;
        check(
            ExtAudioFileGetProperty(
                file,
                kExtAudioFileProperty_FileDataFormat as ExtAudioFilePropertyID,
                &mut size,
                &mut file_format as *mut _ as *mut c_void,
            ),
            "reading file data format",
        )?;

        let mut frames_total: i64 = 0;
        let mut size = std::mem::size_of::<i64>() as u32;
        check(
            ExtAudioFileGetProperty(
                file,
                kExtAudioFileProperty_FileLengthFrames as ExtAudioFilePropertyID,
                &mut size,
                &mut frames_total as *mut _ as *mut c_void,
            ),
            "reading file length",
        )?;

        let channels = file_format.mChannelsPerFrame;
        let sample_rate = file_format.mSampleRate;
        if channels == 0 || channels > u16::MAX as u32 || sample_rate < 1.0 {
            return Err("invalid channel count or sample rate".to_string());
        }

        let bytes_per_frame = channels * 2;
        let client_format = AudioStreamBasicDescription {
            mSampleRate: sample_rate,
            mFormatID: kAudioFormatLinearPCM as u32,
            mFormatFlags: (kAudioFormatFlagIsSignedInteger | kAudioFormatFlagIsPacked) as u32,
            mBytesPerPacket: bytes_per_frame,
            mFramesPerPacket: 1,
            mBytesPerFrame: bytes_per_frame,
            mChannelsPerFrame: channels,
            mBitsPerChannel: 16,
            mReserved: 0,
        };
        check(
            ExtAudioFileSetProperty(
                file,
                kExtAudioFileProperty_ClientDataFormat as ExtAudioFilePropertyID,
                std::mem::size_of::<AudioStreamBasicDescription>() as u32,
                &client_format as *const _ as *const c_void,
            ),
            "setting client data format",
        )?;

        let sample_rate = sample_rate.round() as u32;
        let duration_secs = frames_total.max(0) as f64 / file_format.mSampleRate;
        Ok((
            StreamInfo::s16(duration_secs, channels as u16, sample_rate),
            frames_total,
        ))
    }
}

impl DecoderAdapter for CoreAudioAdapter {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn next_block(&mut self) -> Result<Option<AudioBlock>> {
        if self.eof || self.file.is_null() {
            return Ok(None);
        }

        let mut frames = self.frames_per_block;
        let mut buffers = AudioBufferList {
            mNumberBuffers: 1,
            mBuffers: [AudioBuffer {
                mNumberChannels: self.info.channels as u32,
                mDataByteSize: self.buffer.len() as u32,
                mData: self.buffer.as_mut_ptr() as *mut c_void,
            }],
        };

        let status = unsafe { ExtAudioFileRead(self.file, &mut frames, &mut buffers) };
        if let Err(reason) = check(status, "ExtAudioFileRead") {
            self.eof = true;
            return Err(DecodeError::decode_failed(NAME, reason));
        }

        if frames == 0 {
            self.eof = true;
            return Ok(None);
        }

        let len = frames as usize * self.info.bytes_per_frame();
        Ok(AudioBlock::new(self.buffer[..len.min(self.buffer.len())].to_vec()))
    }

    fn close(&mut self) {
        if self.file.is_null() {
            return;
        }
        let status = unsafe { ExtAudioFileDispose(self.file) };
        if status != 0 {
            warn!("ExtAudioFileDispose returned OSStatus {}", status);
        }
        self.file = std::ptr::null_mut();
        self.eof = true;
    }
}

impl Drop for CoreAudioAdapter {
    fn drop(&mut self) {
        self.close();
    }
}
