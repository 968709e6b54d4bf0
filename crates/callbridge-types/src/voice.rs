//! Voice profile and synthesis backend definitions.
//!
//! A `VoiceProfile` maps a logical ID to a synthesis backend and its
//! parameters. The relay asks for speech by profile ID; the synthesizer
//! resolves the rest.

use serde::{Deserialize, Serialize};

/// Supported synthesis backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceModel {
    /// Speechmatics hosted TTS, streamed over HTTP.
    #[default]
    Speechmatics,
    /// Piper TTS (ONNX-based, local process).
    Piper,
}

/// A voice profile configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Unique identifier for the voice profile.
    pub id: String,
    /// Backend that renders this voice.
    pub model: VoiceModel,
    /// Backend-specific voice name (e.g. `sarah`) or model path for Piper.
    pub voice: String,
    /// Path to the Piper model configuration file, if not inferred.
    #[serde(default)]
    pub config_path: Option<String>,
    /// Speech speed multiplier (1.0 is normal).
    #[serde(default = "default_speed")]
    pub speed: f32,
    /// Speaker ID within a multi-speaker model (0-indexed).
    #[serde(default)]
    pub speaker_id: Option<u32>,
}

fn default_speed() -> f32 {
    1.0
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            model: VoiceModel::Speechmatics,
            voice: "sarah".to_string(),
            config_path: None,
            speed: default_speed(),
            speaker_id: None,
        }
    }
}
