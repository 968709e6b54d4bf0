use callbridge_voice::VoiceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("reasoning failed: {0}")]
    Reasoning(String),

    #[error("knowledge lookup failed: {0}")]
    Lookup(String),

    #[error("ingestion failed: {0}")]
    Ingest(String),

    #[error("speech failed: {0}")]
    Speech(#[from] VoiceError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<callbridge_types::AgentOutputError> for AgentError {
    fn from(e: callbridge_types::AgentOutputError) -> Self {
        Self::Reasoning(e.to_string())
    }
}
