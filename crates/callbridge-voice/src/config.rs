use serde::{Deserialize, Serialize};
use std::fmt;

use crate::g711::Encoding;

fn default_input_sample_rate() -> u32 {
    16_000
}

fn default_output_sample_rate() -> u32 {
    8_000
}

fn default_frame_duration_ms() -> u32 {
    50
}

fn default_chunk_samples() -> usize {
    1024
}

fn default_queue_capacity() -> usize {
    64
}

/// Audio geometry shared by the synthesizer, the relay and the transcoder.
///
/// The telephony carrier dictates the output side; the synthesis backend
/// dictates the input side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate of the synthesized PCM (mono, s16le).
    #[serde(default = "default_input_sample_rate")]
    pub input_sample_rate: u32,
    /// Sample rate expected by the carrier.
    #[serde(default = "default_output_sample_rate")]
    pub output_sample_rate: u32,
    /// Duration of one outbound frame in milliseconds.
    #[serde(default = "default_frame_duration_ms")]
    pub frame_duration_ms: u32,
    /// Companding law for outbound frames.
    #[serde(default)]
    pub encoding: Encoding,
    /// Number of PCM samples per chunk pushed onto the audio queue.
    #[serde(default = "default_chunk_samples")]
    pub chunk_samples: usize,
    /// Maximum number of chunks buffered between producer and consumer.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: default_input_sample_rate(),
            output_sample_rate: default_output_sample_rate(),
            frame_duration_ms: default_frame_duration_ms(),
            encoding: Encoding::default(),
            chunk_samples: default_chunk_samples(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl AudioConfig {
    /// Size of one encoded frame: one byte per output sample.
    pub fn frame_size_bytes(&self) -> usize {
        (self.output_sample_rate as u64 * self.frame_duration_ms as u64 / 1000) as usize
    }
}

fn default_speechmatics_url() -> String {
    "https://preview.tts.speechmatics.com".to_string()
}

fn default_output_format() -> String {
    "pcm_16000".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    30
}

/// Connection settings for the Speechmatics TTS endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct SpeechmaticsConfig {
    #[serde(default = "default_speechmatics_url")]
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// Must match `AudioConfig::input_sample_rate`.
    #[serde(default = "default_output_format")]
    pub output_format: String,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl Default for SpeechmaticsConfig {
    fn default() -> Self {
        Self {
            base_url: default_speechmatics_url(),
            api_key: String::new(),
            output_format: default_output_format(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

impl fmt::Debug for SpeechmaticsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeechmaticsConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("output_format", &self.output_format)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}
