//! Streaming sample-rate conversion by linear interpolation.
//!
//! The converter keeps a phase accumulator and the last two input samples in
//! a [`RateState`], so converting a signal in arbitrary pieces produces
//! exactly the same output as converting it in one call.

use crate::error::TranscodeError;
use crate::SAMPLE_WIDTH;

/// Continuation state carried between [`RateConverter::convert`] calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateState {
    /// Phase accumulator; negative means another input sample is needed.
    phase: i64,
    /// Previous input sample, scaled to 32 bits.
    prev: i64,
    /// Current input sample, scaled to 32 bits.
    cur: i64,
}

/// Mono s16le rate converter with rates reduced by their common divisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateConverter {
    in_rate: i64,
    out_rate: i64,
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

impl RateConverter {
    pub fn new(in_rate: u32, out_rate: u32) -> Result<Self, TranscodeError> {
        if in_rate == 0 {
            return Err(TranscodeError::InvalidRate(in_rate));
        }
        if out_rate == 0 {
            return Err(TranscodeError::InvalidRate(out_rate));
        }
        let divisor = gcd(in_rate, out_rate);
        Ok(Self {
            in_rate: i64::from(in_rate / divisor),
            out_rate: i64::from(out_rate / divisor),
        })
    }

    /// State used when no previous call exists.
    pub fn initial_state(&self) -> RateState {
        RateState {
            phase: -self.out_rate,
            prev: 0,
            cur: 0,
        }
    }

    /// Converts `pcm` and returns the resampled PCM plus the state to pass to
    /// the next call.
    pub fn convert(
        &self,
        pcm: &[u8],
        state: Option<RateState>,
    ) -> Result<(Vec<u8>, RateState), TranscodeError> {
        if pcm.len() % SAMPLE_WIDTH != 0 {
            return Err(TranscodeError::Misaligned {
                len: pcm.len(),
                width: SAMPLE_WIDTH,
            });
        }

        let mut st = state.unwrap_or_else(|| self.initial_state());
        let mut samples = pcm
            .chunks_exact(SAMPLE_WIDTH)
            .map(|b| i64::from(i16::from_le_bytes([b[0], b[1]])) << 16);
        let estimate = pcm.len() as i64 * self.out_rate / self.in_rate + SAMPLE_WIDTH as i64 * 2;
        let mut out = Vec::with_capacity(estimate as usize);

        loop {
            while st.phase < 0 {
                let Some(sample) = samples.next() else {
                    return Ok((out, st));
                };
                st.prev = st.cur;
                st.cur = sample;
                st.phase += self.out_rate;
            }
            while st.phase >= 0 {
                let scaled = (st.prev * st.phase + st.cur * (self.out_rate - st.phase)) / self.out_rate;
                out.extend_from_slice(&((scaled >> 16) as i16).to_le_bytes());
                st.phase -= self.in_rate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn samples(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    #[test]
    fn halving_keeps_every_other_sample() {
        let conv = RateConverter::new(16_000, 8_000).unwrap();
        let (out, _) = conv
            .convert(&pcm(&[100, 200, 300, 400, 500, 600]), None)
            .unwrap();
        assert_eq!(samples(&out), vec![100, 300, 500]);
    }

    #[test]
    fn doubling_interpolates_midpoints() {
        let conv = RateConverter::new(8_000, 16_000).unwrap();
        let (out, _) = conv.convert(&pcm(&[100, 200, 300]), None).unwrap();
        assert_eq!(samples(&out), vec![100, 150, 200, 250, 300]);
    }

    #[test]
    fn fractional_ratio_floors_negative_values() {
        let conv = RateConverter::new(16_000, 12_000).unwrap();
        let (out, _) = conv
            .convert(&pcm(&[100, 200, 300, 400, 500, 600]), None)
            .unwrap();
        assert_eq!(samples(&out), vec![100, 233, 366, 500]);

        let (out, _) = conv
            .convert(&pcm(&[-100, -200, -300, -400, -500, -600]), None)
            .unwrap();
        assert_eq!(samples(&out), vec![-100, -234, -367, -500]);
    }

    #[test]
    fn state_carries_phase_across_calls() {
        let conv = RateConverter::new(16_000, 8_000).unwrap();
        let input = pcm(&[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let (whole, _) = conv.convert(&input, None).unwrap();

        let mut state = None;
        let mut pieces = Vec::new();
        for piece in input.chunks(6) {
            let (out, next) = conv.convert(piece, state).unwrap();
            pieces.extend(out);
            state = Some(next);
        }
        assert_eq!(pieces, whole);
    }

    #[test]
    fn empty_input_returns_state_unchanged() {
        let conv = RateConverter::new(16_000, 8_000).unwrap();
        let (out, state) = conv.convert(&[], None).unwrap();
        assert!(out.is_empty());
        assert_eq!(state, conv.initial_state());
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert_eq!(
            RateConverter::new(0, 8_000).unwrap_err(),
            TranscodeError::InvalidRate(0)
        );
        assert!(RateConverter::new(16_000, 0).is_err());
    }

    #[test]
    fn misaligned_input_is_rejected() {
        let conv = RateConverter::new(16_000, 8_000).unwrap();
        assert!(matches!(
            conv.convert(&[1, 2, 3], None),
            Err(TranscodeError::Misaligned { len: 3, width: 2 })
        ));
    }
}
