//! # Sample Format Converter
//!
//! Converts decoded audio buffers to interleaved signed 16-bit little-endian
//! bytes.

use bytes::{BufMut, BytesMut};
use symphonia::core::audio::{AudioBufferRef, SampleBuffer, SignalSpec};

/// Reusable converter from Symphonia buffers to s16le bytes.
///
/// Symphonia outputs audio in various formats (i16, i24, i32, f32, f64) and
/// planar layout. Everything is converted to i16 and interleaved (LRLRLR...
/// for stereo). The intermediate sample buffer is kept across packets and
/// only reallocated when the signal spec changes or a packet is larger than
/// any seen before.
pub struct SampleConverter {
    buffer: Option<SampleBuffer<i16>>,
    spec: Option<SignalSpec>,
}

impl SampleConverter {
    pub fn new() -> Self {
        Self {
            buffer: None,
            spec: None,
        }
    }

    /// Append `decoded` to `out` as interleaved s16le.
    ///
    /// Returns the number of frames appended.
    pub fn append_s16le(&mut self, decoded: AudioBufferRef<'_>, out: &mut BytesMut) -> usize {
        let spec = *decoded.spec();
        let frames = decoded.frames();
        if frames == 0 {
            return 0;
        }

        let needed = decoded.capacity() * spec.channels.count();
        let reuse = self.spec == Some(spec)
            && self
                .buffer
                .as_ref()
                .is_some_and(|buffer| buffer.capacity() >= needed);
        if !reuse {
            self.buffer = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
            self.spec = Some(spec);
        }

        let Some(buffer) = self.buffer.as_mut() else {
            return 0;
        };
        buffer.copy_interleaved_ref(decoded);

        let samples = buffer.samples();
        out.reserve(samples.len() * 2);
        for &sample in samples {
            out.put_i16_le(sample);
        }
        frames
    }
}

impl Default for SampleConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::audio::{AsAudioBufferRef, AudioBuffer, Channels, Signal};

    fn stereo() -> SignalSpec {
        SignalSpec::new(44100, Channels::FRONT_LEFT | Channels::FRONT_RIGHT)
    }

    #[test]
    fn test_planar_i16_is_interleaved_little_endian() {
        let mut buf = AudioBuffer::<i16>::new(4, stereo());
        buf.render_reserved(Some(3));
        buf.chan_mut(0).copy_from_slice(&[1, 2, 3]);
        buf.chan_mut(1).copy_from_slice(&[-1, -2, -3]);

        let mut out = BytesMut::new();
        let mut converter = SampleConverter::new();
        assert_eq!(converter.append_s16le(buf.as_audio_buffer_ref(), &mut out), 3);

        let expected: Vec<u8> = [1i16, -1, 2, -2, 3, -3]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        assert_eq!(&out[..], expected.as_slice());
    }

    #[test]
    fn test_float_silence_and_full_scale() {
        let mut buf = AudioBuffer::<f32>::new(2, stereo());
        buf.render_reserved(Some(2));
        buf.chan_mut(0).copy_from_slice(&[0.0, 1.0]);
        buf.chan_mut(1).copy_from_slice(&[0.0, -1.0]);

        let mut out = BytesMut::new();
        SampleConverter::new().append_s16le(buf.as_audio_buffer_ref(), &mut out);

        let samples: Vec<i16> = out
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples.len(), 4);
        assert_eq!(&samples[0..2], &[0, 0]);
        assert!(samples[2] >= i16::MAX - 1);
        assert!(samples[3] <= i16::MIN + 1);
    }

    #[test]
    fn test_buffer_is_reused_across_packets() {
        let mut converter = SampleConverter::new();
        let mut out = BytesMut::new();

        for _ in 0..3 {
            let mut buf = AudioBuffer::<i16>::new(8, stereo());
            buf.render_reserved(Some(8));
            converter.append_s16le(buf.as_audio_buffer_ref(), &mut out);
        }
        assert_eq!(out.len(), 3 * 8 * 2 * 2);
    }

    #[test]
    fn test_empty_buffer_appends_nothing() {
        let buf = AudioBuffer::<i16>::new(8, stereo());
        let mut out = BytesMut::new();
        assert_eq!(SampleConverter::new().append_s16le(buf.as_audio_buffer_ref(), &mut out), 0);
        assert!(out.is_empty());
    }
}
