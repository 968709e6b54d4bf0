//! Wideband PCM to fixed-size narrowband telephony frames.
//!
//! A [`FrameTranscoder`] accepts s16le PCM chunks of any size, including empty
//! and odd-length chunks, and returns only complete frames of
//! [`FrameTranscoder::frame_size_bytes`] bytes. Sample alignment, resampler
//! phase and partially filled frames are carried between calls.

use crate::config::AudioConfig;
use crate::error::TranscodeError;
use crate::g711::Encoding;
use crate::ratecv::{RateConverter, RateState};
use crate::SAMPLE_WIDTH;

/// Stateful converter owned by exactly one speech act.
#[derive(Debug)]
pub struct FrameTranscoder {
    converter: RateConverter,
    encoding: Encoding,
    rate_state: Option<RateState>,
    /// Trailing bytes that do not yet form a whole sample.
    carry: Vec<u8>,
    /// Encoded bytes waiting for a full frame.
    encoded: Vec<u8>,
    frame_size: usize,
    silence: u8,
}

impl FrameTranscoder {
    pub fn new(config: &AudioConfig) -> Result<Self, TranscodeError> {
        let converter = RateConverter::new(config.input_sample_rate, config.output_sample_rate)?;
        let frame_size = config.frame_size_bytes();
        if frame_size == 0 {
            return Err(TranscodeError::EmptyFrame {
                rate: config.output_sample_rate,
                duration_ms: config.frame_duration_ms,
            });
        }
        let silence = config.encoding.encode(&[0, 0])?[0];

        Ok(Self {
            converter,
            encoding: config.encoding,
            rate_state: None,
            carry: Vec::with_capacity(SAMPLE_WIDTH),
            encoded: Vec::with_capacity(frame_size * 2),
            frame_size,
            silence,
        })
    }

    pub fn frame_size_bytes(&self) -> usize {
        self.frame_size
    }

    /// Encoded value of a zero-amplitude sample.
    pub fn silence(&self) -> u8 {
        self.silence
    }

    /// Encoded bytes buffered toward the next frame.
    pub fn buffered_len(&self) -> usize {
        self.encoded.len()
    }

    /// Unaligned input bytes held back for the next call.
    pub fn carry_len(&self) -> usize {
        self.carry.len()
    }

    /// Converts one PCM chunk and returns every frame it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>, TranscodeError> {
        let mut data = std::mem::take(&mut self.carry);
        data.extend_from_slice(chunk);

        let aligned = data.len() - data.len() % SAMPLE_WIDTH;
        self.carry = data.split_off(aligned);
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let (resampled, state) = self.converter.convert(&data, self.rate_state)?;
        self.rate_state = Some(state);
        self.encoding.encode_into(&resampled, &mut self.encoded)?;

        Ok(self.take_frames())
    }

    /// Drains the buffer. With `pad_to_full_frame`, a partial frame is
    /// completed with silence; otherwise it is dropped. Terminal: later calls
    /// return nothing.
    pub fn flush(&mut self, pad_to_full_frame: bool) -> Vec<Vec<u8>> {
        let remainder = self.encoded.len() % self.frame_size;
        if pad_to_full_frame && remainder != 0 {
            let padded = self.encoded.len() + (self.frame_size - remainder);
            self.encoded.resize(padded, self.silence);
        }

        let frames = self.take_frames();
        if !self.encoded.is_empty() {
            tracing::debug!(
                dropped = self.encoded.len(),
                "discarding partial frame at end of speech"
            );
        }
        self.encoded.clear();
        self.carry.clear();
        frames
    }

    fn take_frames(&mut self) -> Vec<Vec<u8>> {
        let complete = self.encoded.len() / self.frame_size * self.frame_size;
        if complete == 0 {
            return Vec::new();
        }
        let frames = self.encoded[..complete]
            .chunks_exact(self.frame_size)
            .map(<[u8]>::to_vec)
            .collect();
        self.encoded.drain(..complete);
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcoder(frame_ms: u32) -> FrameTranscoder {
        FrameTranscoder::new(&AudioConfig {
            frame_duration_ms: frame_ms,
            ..AudioConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn silence_is_derived_from_encoding() {
        assert_eq!(transcoder(20).silence(), 0xFF);

        let alaw = FrameTranscoder::new(&AudioConfig {
            encoding: Encoding::Alaw,
            ..AudioConfig::default()
        })
        .unwrap();
        assert_eq!(alaw.silence(), 0xD5);
    }

    #[test]
    fn odd_byte_is_carried() {
        let mut t = transcoder(20);
        assert!(t.feed(&[1, 2, 3]).unwrap().is_empty());
        assert_eq!(t.carry_len(), 1);
        assert_eq!(t.buffered_len(), 1);

        t.feed(&[4]).unwrap();
        assert_eq!(t.carry_len(), 0);
    }

    #[test]
    fn empty_feed_leaves_state_untouched() {
        let mut t = transcoder(20);
        assert!(t.feed(&[]).unwrap().is_empty());
        assert!(t.rate_state.is_none());

        assert!(t.feed(&[7]).unwrap().is_empty());
        assert!(t.rate_state.is_none());
        assert_eq!(t.carry_len(), 1);
    }

    #[test]
    fn zero_length_frame_is_rejected() {
        let err = FrameTranscoder::new(&AudioConfig {
            output_sample_rate: 8_000,
            frame_duration_ms: 0,
            ..AudioConfig::default()
        })
        .unwrap_err();
        assert_eq!(
            err,
            TranscodeError::EmptyFrame {
                rate: 8_000,
                duration_ms: 0
            }
        );
    }

    #[test]
    fn unpadded_flush_drops_partial_frame() {
        let mut t = transcoder(20);
        // 100 input samples -> 50 encoded bytes, well short of 160.
        t.feed(&vec![0u8; 200]).unwrap();
        assert!(t.flush(false).is_empty());
        assert_eq!(t.buffered_len(), 0);
    }
}
