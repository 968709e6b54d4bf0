//! Speech output path for callbridge.
//!
//! Turns assistant text into telephony-ready audio: a [`SpeechSynthesizer`]
//! renders wideband PCM, the [`StreamingRelay`] moves it through a bounded
//! queue, and the [`FrameTranscoder`] resamples, G.711-encodes and slices it
//! into fixed-size frames for a [`FrameSink`].
//!
//! All PCM handled here is mono, 16-bit signed little-endian.

pub mod config;
pub mod error;
pub mod g711;
pub mod ratecv;
pub mod relay;
pub mod transcode;
pub mod tts;

/// Bytes per linear PCM sample.
pub const SAMPLE_WIDTH: usize = 2;

pub use config::{AudioConfig, SpeechmaticsConfig};
pub use error::{TranscodeError, VoiceError};
pub use g711::Encoding;
pub use relay::{AudioItem, FrameSink, SpeechStream, StreamingRelay};
pub use transcode::FrameTranscoder;
pub use tts::{PcmStream, PiperSynthesizer, SpeechSynthesizer, SpeechmaticsSynthesizer};
