//! Callbridge server library logic.

pub mod api_observe;
pub mod config;
pub mod ingest;
pub mod media;
pub mod session;
pub mod transcription;

use axum::{routing::get, Extension, Json, Router};
use callbridge_agent::{
    KnowledgeLookup, OpenAiReasoner, QdrantKnowledge, ReasoningEngine, TurnConfig,
};
use callbridge_observe::EventLog;
use callbridge_types::voice::VoiceModel;
use callbridge_voice::{
    AudioConfig, FrameTranscoder, PiperSynthesizer, SpeechSynthesizer, SpeechmaticsSynthesizer,
};
use config::{CallConfig, Config, ConfigError};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use transcription::{AssemblyAiTranscriber, Transcriber};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Outbound audio geometry.
    pub audio: AudioConfig,
    /// Voice name or profile ID passed to the synthesizer.
    pub voice: String,
    /// Turn controller limits.
    pub turn: TurnConfig,
    /// Per-call behavior.
    pub call: CallConfig,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub reasoner: Arc<dyn ReasoningEngine>,
    pub knowledge: Arc<dyn KnowledgeLookup>,
    pub transcriber: Arc<dyn Transcriber>,
    /// Process-wide call event log.
    pub events: Arc<EventLog>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("audio", &self.audio)
            .field("voice", &self.voice)
            .field("turn", &self.turn)
            .field("call", &self.call)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Builds the production collaborators described by `config`.
    ///
    /// Fails when a required credential is missing, the audio geometry is
    /// unusable, or the configured Piper voice has no profile.
    pub async fn from_config(config: &Config) -> Result<Self, ConfigError> {
        FrameTranscoder::new(&config.audio)
            .map_err(|e| ConfigError::Invalid(format!("audio: {}", e)))?;
        if config.call.inbound_frame_bytes == 0 {
            return Err(ConfigError::Invalid(
                "call.inbound_frame_bytes must be at least 1".to_string(),
            ));
        }
        if config.turn.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "turn.max_iterations must be at least 1".to_string(),
            ));
        }

        let synthesizer: Arc<dyn SpeechSynthesizer> = match config.tts.backend {
            VoiceModel::Speechmatics => Arc::new(
                SpeechmaticsSynthesizer::new(config.tts.speechmatics.clone())
                    .map_err(|e| ConfigError::Invalid(format!("tts: {}", e)))?,
            ),
            VoiceModel::Piper => {
                let piper = PiperSynthesizer::new(&config.tts.voices_dir, &config.tts.piper_binary);
                for profile in &config.tts.profiles {
                    piper.add_profile(profile.clone()).await;
                }
                if piper.get_profile(&config.tts.voice).await.is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "tts.voice '{}' has no matching entry in tts.profiles",
                        config.tts.voice
                    )));
                }
                Arc::new(piper)
            }
        };

        let reasoner = OpenAiReasoner::new(config.reasoning.clone())
            .map_err(|e| ConfigError::Invalid(format!("reasoning: {}", e)))?;
        let knowledge = QdrantKnowledge::new(config.knowledge.clone())
            .map_err(|e| ConfigError::Invalid(format!("knowledge: {}", e)))?;
        let transcriber = AssemblyAiTranscriber::new(config.transcription.clone())
            .map_err(|e| ConfigError::Invalid(format!("transcription: {}", e)))?;

        Ok(Self {
            audio: config.audio.clone(),
            voice: config.tts.voice.clone(),
            turn: config.turn.clone(),
            call: config.call.clone(),
            synthesizer,
            reasoner: Arc::new(reasoner),
            knowledge: Arc::new(knowledge),
            transcriber: Arc::new(transcriber),
            events: Arc::new(EventLog::new(config.observe.retention)),
        })
    }
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/media", get(media::media_handler))
        .route("/api/events", get(api_observe::get_events_handler))
        .route(
            "/api/events/stream",
            get(api_observe::get_event_stream_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
