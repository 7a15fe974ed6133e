//! Fixture synthesis shared by the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// Interleaved 16-bit sine samples.
pub fn sine(seconds: f64, channels: u16, sample_rate: u32, frequency: f64) -> Vec<i16> {
    let frames = (seconds * sample_rate as f64).round() as usize;
    let mut samples = Vec::with_capacity(frames * channels as usize);
    for i in 0..frames {
        let t = i as f64 / sample_rate as f64;
        let value = ((2.0 * std::f64::consts::PI * frequency * t).sin() * 0.3 * i16::MAX as f64) as i16;
        for _ in 0..channels {
            samples.push(value);
        }
    }
    samples
}

/// Canonical 44-byte-header PCM WAV.
pub fn wav_bytes(channels: u16, sample_rate: u32, samples: &[i16]) -> Vec<u8> {
    let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    let mut out = Vec::with_capacity(44 + data.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
    out.extend_from_slice(&(channels * 2).to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&data);
    out
}

/// Big-endian AIFF with an integer sample rate.
pub fn aiff_bytes(channels: u16, sample_rate: u32, samples: &[i16]) -> Vec<u8> {
    let data: Vec<u8> = samples.iter().flat_map(|s| s.to_be_bytes()).collect();

    let log2 = 31 - sample_rate.leading_zeros();
    let exponent = (16383 + log2) as u16;
    let mantissa = (sample_rate as u64) << (63 - log2);

    let mut comm = Vec::with_capacity(18);
    comm.extend_from_slice(&channels.to_be_bytes());
    comm.extend_from_slice(&((samples.len() / channels as usize) as u32).to_be_bytes());
    comm.extend_from_slice(&16u16.to_be_bytes());
    comm.extend_from_slice(&exponent.to_be_bytes());
    comm.extend_from_slice(&mantissa.to_be_bytes());

    let mut body = Vec::new();
    body.extend_from_slice(b"AIFF");
    body.extend_from_slice(b"COMM");
    body.extend_from_slice(&(comm.len() as u32).to_be_bytes());
    body.extend_from_slice(&comm);
    body.extend_from_slice(b"SSND");
    body.extend_from_slice(&(8 + data.len() as u32).to_be_bytes());
    body.extend_from_slice(&[0u8; 8]);
    body.extend_from_slice(&data);

    let mut out = Vec::with_capacity(8 + body.len());
    out.extend_from_slice(b"FORM");
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    out
}

/// Write `bytes` to `dir/name` and return the path.
pub fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("write fixture");
    path
}

/// The reference fixture: 2.0 s of stereo 44.1 kHz sine.
pub fn reference_wav(dir: &Path) -> PathBuf {
    let samples = sine(2.0, 2, 44100, 440.0);
    write_fixture(dir, "tone.wav", &wav_bytes(2, 44100, &samples))
}
