//! Server configuration loading from file and environment variables.

use callbridge_agent::{KnowledgeConfig, ReasoningConfig, TurnConfig};
use callbridge_types::voice::{VoiceModel, VoiceProfile};
use callbridge_voice::{AudioConfig, SpeechmaticsConfig};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

use crate::transcription::TranscriptionConfig;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Outbound audio geometry.
    #[serde(default)]
    pub audio: AudioConfig,

    /// Speech synthesis backend.
    #[serde(default)]
    pub tts: TtsConfig,

    /// Reasoning engine endpoint.
    #[serde(default)]
    pub reasoning: ReasoningConfig,

    /// Knowledge store and embeddings endpoint.
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Streaming transcription endpoint.
    #[serde(default)]
    pub transcription: TranscriptionConfig,

    /// Turn controller limits.
    #[serde(default)]
    pub turn: TurnConfig,

    /// Per-call behavior.
    #[serde(default)]
    pub call: CallConfig,

    /// Event log settings.
    #[serde(default)]
    pub observe: ObserveConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "callbridge_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Speech synthesis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TtsConfig {
    /// Which synthesizer renders speech.
    #[serde(default)]
    pub backend: VoiceModel,

    /// Speechmatics voice name, or a Piper profile ID.
    #[serde(default = "default_voice")]
    pub voice: String,

    #[serde(default)]
    pub speechmatics: SpeechmaticsConfig,

    /// Path to the Piper executable.
    #[serde(default = "default_piper_binary")]
    pub piper_binary: String,

    /// Directory that relative Piper model paths resolve against.
    #[serde(default = "default_voices_dir")]
    pub voices_dir: String,

    /// Piper voice profiles.
    #[serde(default)]
    pub profiles: Vec<VoiceProfile>,
}

/// Per-call behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct CallConfig {
    /// Cancel the running turn when the caller finishes a new utterance.
    #[serde(default = "default_barge_in")]
    pub barge_in: bool,

    /// Size of the caller-audio frames forwarded to transcription.
    #[serde(default = "default_inbound_frame_bytes")]
    pub inbound_frame_bytes: usize,

    /// Capacity of the per-call outbound message queue.
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
}

/// Event log configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ObserveConfig {
    /// Number of events kept in memory.
    #[serde(default = "default_retention")]
    pub retention: usize,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_voice() -> String {
    "sarah".to_string()
}

fn default_piper_binary() -> String {
    "piper".to_string()
}

fn default_voices_dir() -> String {
    "assets/voices".to_string()
}

fn default_barge_in() -> bool {
    true
}

fn default_inbound_frame_bytes() -> usize {
    400
}

fn default_outbound_queue_capacity() -> usize {
    256
}

fn default_retention() -> usize {
    callbridge_observe::DEFAULT_RETENTION
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            backend: VoiceModel::default(),
            voice: default_voice(),
            speechmatics: SpeechmaticsConfig::default(),
            piper_binary: default_piper_binary(),
            voices_dir: default_voices_dir(),
            profiles: Vec::new(),
        }
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            barge_in: default_barge_in(),
            inbound_frame_bytes: default_inbound_frame_bytes(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
        }
    }
}

impl Default for ObserveConfig {
    fn default() -> Self {
        Self {
            retention: default_retention(),
        }
    }
}

/// Errors that can occur when loading configuration or building collaborators from it.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `CALLBRIDGE_HOST` overrides `server.host`
/// - `CALLBRIDGE_PORT` overrides `server.port`
/// - `CALLBRIDGE_LOG_LEVEL` overrides `logging.level`
/// - `CALLBRIDGE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `CALLBRIDGE_VOICE` overrides `tts.voice`
/// - `CALLBRIDGE_REASONING_MODEL` overrides `reasoning.model`
/// - `CALLBRIDGE_QDRANT_URL` overrides `knowledge.qdrant_url`
/// - `CALLBRIDGE_QDRANT_COLLECTION` overrides `knowledge.collection`
/// - `CALLBRIDGE_BARGE_IN` overrides `call.barge_in`
///
/// Secrets are only read from the environment:
/// - `OPENAI_API_KEY` for reasoning and embeddings
/// - `SPEECHMATICS_API_KEY` for hosted synthesis
/// - `ASSEMBLYAI_API_KEY` for transcription
/// - `QDRANT_API_KEY` for the vector store (optional)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Some(host) = env_nonempty("CALLBRIDGE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = env_nonempty("CALLBRIDGE_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(level) = env_nonempty("CALLBRIDGE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = env_nonempty("CALLBRIDGE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(voice) = env_nonempty("CALLBRIDGE_VOICE") {
        config.tts.voice = voice;
    }
    if let Some(model) = env_nonempty("CALLBRIDGE_REASONING_MODEL") {
        config.reasoning.model = model;
    }
    if let Some(url) = env_nonempty("CALLBRIDGE_QDRANT_URL") {
        config.knowledge.qdrant_url = url;
    }
    if let Some(collection) = env_nonempty("CALLBRIDGE_QDRANT_COLLECTION") {
        config.knowledge.collection = collection;
    }
    if let Some(barge_in) = env_nonempty("CALLBRIDGE_BARGE_IN") {
        config.call.barge_in = barge_in == "true" || barge_in == "1";
    }

    // Secrets
    if let Some(key) = env_nonempty("OPENAI_API_KEY") {
        config.reasoning.api_key = key.clone();
        config.knowledge.api_key = key;
    }
    if let Some(key) = env_nonempty("SPEECHMATICS_API_KEY") {
        config.tts.speechmatics.api_key = key;
    }
    if let Some(key) = env_nonempty("ASSEMBLYAI_API_KEY") {
        config.transcription.api_key = key;
    }
    if let Some(key) = env_nonempty("QDRANT_API_KEY") {
        config.knowledge.qdrant_api_key = Some(key);
    }

    Ok(config)
}
