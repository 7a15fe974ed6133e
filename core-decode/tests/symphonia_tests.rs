//! Symphonia backend through the dispatcher.

#![cfg(feature = "backend-symphonia")]

mod common;

use common::{reference_wav, sine, wav_bytes, write_fixture};
use core_decode::{audio_open_with, DecodeConfig};

fn symphonia_only() -> DecodeConfig {
    DecodeConfig::default().with_backends(["symphonia"])
}

#[test]
fn test_reference_wav_through_symphonia() {
    let dir = tempfile::tempdir().unwrap();
    let path = reference_wav(dir.path());

    let stream = audio_open_with(&path, &symphonia_only()).unwrap();
    assert_eq!(stream.backend_name(), "symphonia");
    assert_eq!(stream.channels(), 2);
    assert_eq!(stream.sample_rate(), 44100);
    assert!((stream.duration() - 2.0).abs() < 1e-9);

    let total: usize = stream.map(|b| b.unwrap().len()).sum();
    assert_eq!(total, 352_800);
}

#[test]
fn test_matches_builtin_reader_output() {
    let dir = tempfile::tempdir().unwrap();
    let samples = sine(0.25, 1, 16000, 1000.0);
    let path = write_fixture(dir.path(), "mono.wav", &wav_bytes(1, 16000, &samples));

    let read = |backend: &str| -> Vec<u8> {
        let config = DecodeConfig::default().with_backends([backend]);
        audio_open_with(&path, &config)
            .unwrap()
            .flat_map(|b| b.unwrap().into_bytes().to_vec())
            .collect()
    };
    assert_eq!(read("symphonia"), read("raw"));
}

#[test]
fn test_fallback_to_symphonia_when_raw_rejects() {
    // 24-bit PCM is rejected by the built-in reader
    let dir = tempfile::tempdir().unwrap();
    let mut bytes = wav_bytes(1, 8000, &[0; 300]);
    bytes[28..32].copy_from_slice(&(8000u32 * 3).to_le_bytes());
    bytes[32..34].copy_from_slice(&3u16.to_le_bytes());
    bytes[34..36].copy_from_slice(&24u16.to_le_bytes());
    let path = write_fixture(dir.path(), "wide.wav", &bytes);

    let config = DecodeConfig::default().with_backends(["raw", "symphonia"]);
    let stream = audio_open_with(&path, &config).unwrap();
    assert_eq!(stream.backend_name(), "symphonia");
    assert_eq!(stream.channels(), 1);

    // 600 data bytes of 24-bit mono are 200 frames of s16 output
    let total: usize = stream.map(|b| b.unwrap().len()).sum();
    assert_eq!(total, 400);
}
