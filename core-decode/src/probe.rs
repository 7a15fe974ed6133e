//! # Backend Probe
//!
//! Orders registered backends into the candidate list the dispatcher walks.

use crate::config::{DecodeConfig, ProbeStrategy};
use crate::io_util::read_full;
use crate::registry::{AdapterDescriptor, BackendRegistry};
use std::fs::File;
use std::path::Path;
use tracing::{debug, warn};

/// Number of leading bytes read when sniffing.
const SNIFF_LEN: usize = 16;

/// Container family detected from magic bytes or the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    Wav,
    Aiff,
    Flac,
    Ogg,
    Mp3,
    Mp4,
    Unknown,
}

impl ContainerFormat {
    /// Detect a container from the first bytes of a file.
    pub fn from_magic(header: &[u8]) -> Self {
        if header.len() >= 12 {
            let riff = &header[0..4];
            let form = &header[8..12];
            if (riff == b"RIFF" || riff == b"RIFX") && form == b"WAVE" {
                return ContainerFormat::Wav;
            }
            if riff == b"FORM" && (form == b"AIFF" || form == b"AIFC") {
                return ContainerFormat::Aiff;
            }
            if &header[4..8] == b"ftyp" {
                return ContainerFormat::Mp4;
            }
        }

        if header.starts_with(b"fLaC") {
            ContainerFormat::Flac
        } else if header.starts_with(b"OggS") {
            ContainerFormat::Ogg
        } else if header.starts_with(b"ID3")
            || (header.len() >= 2 && header[0] == 0xFF && (header[1] & 0xE0) == 0xE0)
        {
            ContainerFormat::Mp3
        } else {
            ContainerFormat::Unknown
        }
    }

    /// Detect a container from a file extension (case-insensitive, without
    /// the dot).
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "wav" | "wave" => ContainerFormat::Wav,
            "aif" | "aiff" | "aifc" => ContainerFormat::Aiff,
            "flac" => ContainerFormat::Flac,
            "ogg" | "oga" | "opus" => ContainerFormat::Ogg,
            "mp3" => ContainerFormat::Mp3,
            "m4a" | "mp4" | "aac" | "alac" => ContainerFormat::Mp4,
            _ => ContainerFormat::Unknown,
        }
    }

    /// Sniff a file: magic bytes first, extension as the fallback.
    ///
    /// The file handle is scoped to this call. Unreadable files detect as
    /// whatever the extension says, or `Unknown`.
    pub fn sniff(path: &Path) -> Self {
        let mut header = [0u8; SNIFF_LEN];
        let read = File::open(path).and_then(|mut file| read_full(&mut file, &mut header));

        let from_magic = match read {
            Ok(len) => Self::from_magic(&header[..len]),
            Err(e) => {
                debug!("Header sniff failed: {}", e);
                ContainerFormat::Unknown
            }
        };

        if from_magic != ContainerFormat::Unknown {
            return from_magic;
        }

        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(ContainerFormat::Unknown)
    }
}

/// Candidate ordering for the dispatcher.
///
/// The probe never fails: in the worst case it returns every registered
/// backend in priority order and leaves the real failure to `open`.
pub struct BackendProbe;

impl BackendProbe {
    /// Rank the registry's backends for `path`.
    pub fn probe<'r>(
        path: &Path,
        registry: &'r BackendRegistry,
        config: &DecodeConfig,
    ) -> Vec<&'r AdapterDescriptor> {
        let mut candidates = Self::base_order(registry, config);

        if config.probe_strategy == ProbeStrategy::Sniff {
            let container = ContainerFormat::sniff(path);
            debug!("Sniffed container: {:?}", container);
            if container != ContainerFormat::Unknown {
                // Stable: claimants keep their relative order, as do the rest
                let (mut claimants, rest): (Vec<_>, Vec<_>) = candidates
                    .into_iter()
                    .partition(|d| d.backend().handles(container));
                claimants.extend(rest);
                candidates = claimants;
            }
        }

        candidates
    }

    /// Explicit configured order when present, registry priority otherwise.
    fn base_order<'r>(
        registry: &'r BackendRegistry,
        config: &DecodeConfig,
    ) -> Vec<&'r AdapterDescriptor> {
        let Some(names) = &config.backends else {
            return registry.descriptors().iter().collect();
        };

        let mut ordered: Vec<&AdapterDescriptor> = Vec::with_capacity(names.len());
        for name in names {
            match registry.get(name) {
                Some(descriptor) if ordered.iter().any(|d| d.name() == descriptor.name()) => {
                    debug!("Backend '{}' listed twice, keeping first position", name);
                }
                Some(descriptor) => ordered.push(descriptor),
                None => warn!("Ignoring unknown backend '{}' in configuration", name),
            }
        }
        ordered
    }
}
