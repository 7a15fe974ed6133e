//! Early exit must not leak file descriptors.
//!
//! Kept as the only test in this binary so no concurrent test opens files
//! while descriptors are being counted.

#![cfg(target_os = "linux")]

mod common;

use common::reference_wav;
use core_decode::audio_open;

fn open_fds() -> usize {
    std::fs::read_dir("/proc/self/fd")
        .map(|entries| entries.count())
        .unwrap_or(0)
}

#[test]
fn test_truncated_read_releases_file_descriptors() {
    let dir = tempfile::tempdir().unwrap();
    let path = reference_wav(dir.path());

    let before = open_fds();
    for _ in 0..5 {
        let mut stream = audio_open(&path).unwrap();
        assert!(stream.next_block().unwrap().is_some());
        assert!(open_fds() > before);
        // Dropped without close after a single block
    }
    assert_eq!(open_fds(), before);

    let mut stream = audio_open(&path).unwrap();
    stream.next_block().unwrap();
    stream.close();
    assert_eq!(open_fds(), before);
}
