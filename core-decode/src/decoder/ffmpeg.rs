//! # External Process Decoder
//!
//! Decodes anything the `ffmpeg` (or `avconv`) command line tool understands
//! by running it with raw s16le output on stdout.
//!
//! ```text
//! ffmpeg -i <path> -f s16le -
//!          |            |
//!          |            +-- stdout: PCM blocks
//!          +--------------- stderr: stream info, then drained by a thread
//! ```

use crate::config::DecodeConfig;
use crate::error::{DecodeError, Result};
use crate::probe::ContainerFormat;
use crate::io_util::read_full;
use crate::traits::{AudioBlock, Backend, DecoderAdapter, StreamInfo};
use core_runtime::logging::strip_path;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, instrument, warn};

const NAME: &str = "ffmpeg";

/// Stderr lines kept for error reports once decoding has started.
const STDERR_TAIL_LINES: usize = 10;

/// Whether one of the default commands (`ffmpeg`, `avconv`) can be found.
pub fn available() -> bool {
    locate(&DecodeConfig::default().ffmpeg.commands).is_some()
}

/// Resolve the first usable executable among `commands`.
///
/// Commands containing a path separator are checked as-is; bare names are
/// looked up in every `PATH` directory.
pub fn locate(commands: &[String]) -> Option<PathBuf> {
    commands
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .find_map(resolve)
}

fn resolve(command: &str) -> Option<PathBuf> {
    let candidate = Path::new(command);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let paths = std::env::var_os("PATH")?;
    let file_name = executable_name(command);
    std::env::split_paths(&paths)
        .map(|dir| dir.join(&file_name))
        .find(|path| path.is_file())
}

fn executable_name(command: &str) -> String {
    if cfg!(windows) && Path::new(command).extension().is_none() {
        format!("{}.exe", command)
    } else {
        command.to_string()
    }
}

/// Backend running an external decoder process.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegBackend;

impl Backend for FfmpegBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_available(&self, config: &DecodeConfig) -> bool {
        locate(&config.ffmpeg.commands).is_some()
    }

    fn handles(&self, container: ContainerFormat) -> bool {
        container != ContainerFormat::Unknown
    }

    #[instrument(skip(self, path, config), fields(file = %strip_path(&path.to_string_lossy())))]
    fn open(&self, path: &Path, config: &DecodeConfig) -> Result<Box<dyn DecoderAdapter>> {
        let exe = locate(&config.ffmpeg.commands).ok_or_else(|| {
            DecodeError::unavailable(NAME, "no ffmpeg or avconv executable found")
        })?;
        Ok(Box::new(FfmpegAdapter::spawn(&exe, path, config.block_size)?))
    }
}

/// Open stream backed by a running decoder process.
pub struct FfmpegAdapter {
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    drain: Option<JoinHandle<()>>,
    tail: Arc<Mutex<VecDeque<String>>>,
    info: StreamInfo,
    block_size: usize,
    finished: bool,
}

impl FfmpegAdapter {
    /// Start `exe` on `path` and read the stream info from its stderr.
    pub fn spawn(exe: &Path, path: &Path, block_size: usize) -> Result<Self> {
        debug!("Spawning {}", exe.display());
        let mut child = Command::new(exe)
            .arg("-i")
            .arg(path)
            .arg("-f")
            .arg("s16le")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    DecodeError::unavailable(NAME, format!("{} not found: {}", exe.display(), e))
                }
                _ => DecodeError::open_failed(NAME, format!("failed to spawn decoder: {}", e)),
            })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            abort(child);
            return Err(DecodeError::open_failed(NAME, "decoder pipes unavailable"));
        };

        let mut stderr = BufReader::new(stderr);
        let info = match read_info(&mut stderr) {
            Ok(info) => info,
            Err(e) => {
                abort(child);
                return Err(e);
            }
        };

        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let drain = {
            let tail = tail.clone();
            std::thread::Builder::new()
                .name("ffmpeg-stderr".to_string())
                .spawn(move || drain_stderr(stderr, tail))
        };
        let drain = match drain {
            Ok(handle) => handle,
            Err(e) => {
                abort(child);
                return Err(DecodeError::open_failed(
                    NAME,
                    format!("failed to start stderr reader: {}", e),
                ));
            }
        };

        info!(
            "Decoder process {} started: {} ch, {} Hz",
            child.id(),
            info.channels,
            info.sample_rate
        );

        Ok(Self {
            child: Some(child),
            stdout: Some(stdout),
            drain: Some(drain),
            tail,
            info,
            block_size: info.frame_aligned(block_size),
            finished: false,
        })
    }

    /// OS process id, until the process has been reaped.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    fn stderr_tail(&self) -> String {
        let tail = self.tail.lock();
        if tail.is_empty() {
            "no diagnostic output".to_string()
        } else {
            tail.iter().cloned().collect::<Vec<_>>().join(" | ")
        }
    }

    /// Reap the process after stdout hit end of file.
    fn finish(&mut self) -> Result<()> {
        self.stdout = None;
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let status = child
            .wait()
            .map_err(|e| DecodeError::decode_failed(NAME, format!("failed to reap decoder: {}", e)))?;
        if let Some(handle) = self.drain.take() {
            if handle.join().is_err() {
                warn!("stderr reader thread panicked");
            }
        }

        check_exit(status, || self.stderr_tail())
    }
}

impl DecoderAdapter for FfmpegAdapter {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn next_block(&mut self) -> Result<Option<AudioBlock>> {
        if self.finished {
            return Ok(None);
        }
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut buf = vec![0u8; self.block_size];
        let filled = match read_full(stdout, &mut buf) {
            Ok(filled) => filled,
            Err(e) => {
                self.finished = true;
                return Err(DecodeError::decode_failed(NAME, format!("pipe read error: {}", e)));
            }
        };

        if filled == 0 {
            self.finished = true;
            self.finish()?;
            return Ok(None);
        }

        buf.truncate(filled);
        Ok(AudioBlock::new(buf))
    }

    fn close(&mut self) {
        self.finished = true;
        // Closing stdout first unblocks a child stuck writing to a full pipe
        self.stdout = None;

        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                if let Err(e) = child.kill() {
                    debug!("Failed to kill decoder process: {}", e);
                }
            }
            if let Err(e) = child.wait() {
                warn!("Failed to reap decoder process: {}", e);
            }
        }

        if let Some(handle) = self.drain.take() {
            if handle.join().is_err() {
                warn!("stderr reader thread panicked");
            }
        }
    }
}

impl Drop for FfmpegAdapter {
    fn drop(&mut self) {
        self.close();
    }
}

fn abort(mut child: Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn check_exit(status: ExitStatus, tail: impl FnOnce() -> String) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(DecodeError::decode_failed(
            NAME,
            format!("decoder exited with {}: {}", status, tail()),
        ))
    }
}

fn drain_stderr(mut stderr: BufReader<ChildStderr>, tail: Arc<Mutex<VecDeque<String>>>) {
    let mut line = Vec::new();
    loop {
        line.clear();
        match stderr.read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line).trim().to_string();
                if text.is_empty() {
                    continue;
                }
                let mut tail = tail.lock();
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(text);
            }
        }
    }
}

// ============================================================================
// Stream info parsing
// ============================================================================

/// Read diagnostic lines until the first audio stream description.
fn read_info(stderr: &mut impl BufRead) -> Result<StreamInfo> {
    let mut duration_secs = 0.0;
    let mut raw = Vec::new();

    loop {
        raw.clear();
        let read = stderr
            .read_until(b'\n', &mut raw)
            .map_err(|e| DecodeError::open_failed(NAME, format!("stderr read error: {}", e)))?;
        if read == 0 {
            return Err(DecodeError::open_failed(NAME, "stream info not found"));
        }

        let line = String::from_utf8_lossy(&raw).trim().to_ascii_lowercase();
        if line.contains("no such file") {
            return Err(DecodeError::open_failed(NAME, "file not found"));
        }
        if line.contains("invalid data found") {
            return Err(DecodeError::open_failed(NAME, "unsupported file format"));
        }
        if let Some(duration) = parse_duration(&line) {
            duration_secs = duration;
        }
        if line.contains("audio:") {
            let (sample_rate, channels) = parse_audio(&line)?;
            return Ok(StreamInfo::s16(duration_secs, channels, sample_rate));
        }
    }
}

/// `duration: 00:03:25.71, start: ...` to seconds. `N/A` counts as zero.
fn parse_duration(line: &str) -> Option<f64> {
    let (_, rest) = line.split_once("duration:")?;
    let value = rest.split(',').next()?.trim();
    if value == "n/a" {
        return Some(0.0);
    }

    let mut parts = value.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((hours * 3600 + minutes * 60) as f64 + seconds)
}

/// `stream #0:0: audio: mp3, 44100 hz, stereo, fltp, 320 kb/s` to
/// `(sample_rate, channels)`.
fn parse_audio(line: &str) -> Result<(u32, u16)> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();

    let rate_index = fields
        .iter()
        .position(|f| f.ends_with(" hz"))
        .ok_or_else(|| DecodeError::open_failed(NAME, "sample rate not found in stream info"))?;
    let sample_rate = fields[rate_index]
        .split_whitespace()
        .next()
        .and_then(|n| n.parse::<u32>().ok())
        .filter(|&rate| rate > 0)
        .ok_or_else(|| DecodeError::open_failed(NAME, "invalid sample rate in stream info"))?;

    let layout = fields.get(rate_index + 1).copied().unwrap_or_default();
    let channels = channels_from_layout(layout).ok_or_else(|| {
        DecodeError::open_failed(NAME, format!("unrecognised channel layout '{}'", layout))
    })?;

    Ok((sample_rate, channels))
}

fn channels_from_layout(layout: &str) -> Option<u16> {
    // "5.1(side)" and "6 channels (fl+fr+...)" carry a parenthesised detail
    let layout = layout.split('(').next().unwrap_or(layout).trim();
    let channels = match layout {
        "mono" => 1,
        "stereo" | "downmix" => 2,
        "2.1" | "3.0" => 3,
        "quad" | "4.0" | "3.1" => 4,
        "4.1" | "5.0" => 5,
        "5.1" | "6.0" | "hexagonal" => 6,
        "6.1" | "7.0" => 7,
        "7.1" | "octagonal" => 8,
        other => other
            .strip_suffix("channels")
            .and_then(|n| n.trim().parse().ok())?,
    };
    (channels > 0).then_some(channels)
}
