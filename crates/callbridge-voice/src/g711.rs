//! G.711 companding for 16-bit little-endian linear PCM.
//!
//! Both laws follow the segment-table formulation of ITU-T G.711: mu-law works
//! on the top 14 bits of each sample, A-law on the top 13.

use serde::{Deserialize, Serialize};

use crate::error::TranscodeError;
use crate::SAMPLE_WIDTH;

/// Companding law used for outbound telephony frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// North American / Japanese telephony (Twilio media streams).
    #[default]
    Mulaw,
    /// European telephony.
    Alaw,
}

const ULAW_SEG_END: [i32; 8] = [0x3F, 0x7F, 0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF, 0x1FFF];
const ALAW_SEG_END: [i32; 8] = [0x1F, 0x3F, 0x7F, 0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF];
const ULAW_BIAS: i32 = 0x84 >> 2;
const ULAW_CLIP: i32 = 8159;

fn segment(value: i32, table: &[i32; 8]) -> usize {
    table.iter().position(|&end| value <= end).unwrap_or(table.len())
}

/// Encodes one linear sample to mu-law.
pub fn linear_to_ulaw(sample: i16) -> u8 {
    let mut value = i32::from(sample) >> 2;
    let mask: u8 = if value < 0 {
        value = -value;
        0x7F
    } else {
        0xFF
    };
    value = value.min(ULAW_CLIP) + ULAW_BIAS;

    let seg = segment(value, &ULAW_SEG_END);
    if seg >= 8 {
        return 0x7F ^ mask;
    }
    let code = ((seg as u8) << 4) | ((value >> (seg + 1)) & 0x0F) as u8;
    code ^ mask
}

/// Encodes one linear sample to A-law.
pub fn linear_to_alaw(sample: i16) -> u8 {
    let mut value = i32::from(sample) >> 3;
    let mask: u8 = if value >= 0 {
        0xD5
    } else {
        value = -value - 1;
        0x55
    };

    let seg = segment(value, &ALAW_SEG_END);
    if seg >= 8 {
        return 0x7F ^ mask;
    }
    let mut code = (seg as u8) << 4;
    code |= if seg < 2 {
        ((value >> 1) & 0x0F) as u8
    } else {
        ((value >> seg) & 0x0F) as u8
    };
    code ^ mask
}

impl Encoding {
    /// Appends the encoding of `pcm` (s16le) to `out`, one byte per sample.
    pub fn encode_into(self, pcm: &[u8], out: &mut Vec<u8>) -> Result<(), TranscodeError> {
        if pcm.len() % SAMPLE_WIDTH != 0 {
            return Err(TranscodeError::Misaligned {
                len: pcm.len(),
                width: SAMPLE_WIDTH,
            });
        }
        out.reserve(pcm.len() / SAMPLE_WIDTH);
        let samples = pcm
            .chunks_exact(SAMPLE_WIDTH)
            .map(|b| i16::from_le_bytes([b[0], b[1]]));
        match self {
            Self::Mulaw => out.extend(samples.map(linear_to_ulaw)),
            Self::Alaw => out.extend(samples.map(linear_to_alaw)),
        }
        Ok(())
    }

    pub fn encode(self, pcm: &[u8]) -> Result<Vec<u8>, TranscodeError> {
        let mut out = Vec::new();
        self.encode_into(pcm, &mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ulaw_reference_points() {
        assert_eq!(linear_to_ulaw(0), 0xFF);
        assert_eq!(linear_to_ulaw(-1), 0x7E);
        assert_eq!(linear_to_ulaw(100), 0xF2);
        assert_eq!(linear_to_ulaw(-100), 0x72);
        assert_eq!(linear_to_ulaw(i16::MAX), 0x80);
        assert_eq!(linear_to_ulaw(i16::MIN), 0x00);
    }

    #[test]
    fn alaw_reference_points() {
        assert_eq!(linear_to_alaw(0), 0xD5);
        assert_eq!(linear_to_alaw(-1), 0x55);
        assert_eq!(linear_to_alaw(100), 0xD3);
        assert_eq!(linear_to_alaw(-100), 0x53);
        assert_eq!(linear_to_alaw(i16::MAX), 0xAA);
        assert_eq!(linear_to_alaw(i16::MIN), 0x2A);
    }

    #[test]
    fn ulaw_is_monotonic_in_magnitude() {
        // Larger positive inputs never map to a smaller (uncomplemented) code.
        let mut last = 0u8;
        for sample in (0..=i16::MAX).step_by(64) {
            let code = !linear_to_ulaw(sample) & 0x7F;
            assert!(code >= last, "code regressed at {}", sample);
            last = code;
        }
    }

    #[test]
    fn encode_rejects_odd_length() {
        let err = Encoding::Mulaw.encode(&[0, 0, 0]).unwrap_err();
        assert_eq!(err, TranscodeError::Misaligned { len: 3, width: 2 });
    }

    #[test]
    fn encode_one_byte_per_sample() {
        let pcm: Vec<u8> = [100i16, -100, 2000, -2000]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        assert_eq!(Encoding::Mulaw.encode(&pcm).unwrap().len(), 4);
        assert_eq!(Encoding::Alaw.encode(&pcm).unwrap().len(), 4);
    }
}
