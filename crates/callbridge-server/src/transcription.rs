//! Streaming transcription over the AssemblyAI v3 realtime websocket.
//!
//! Caller audio goes in as raw mu-law frames; only finalized utterances
//! (`end_of_turn`) come back out. Partial transcripts are logged and dropped.
//! Closing the audio sender sends `Terminate` and lets the service close the
//! socket.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;

/// Frames buffered between the media socket and the transcription socket.
const AUDIO_CHANNEL_CAPACITY: usize = 256;

/// Finalized transcripts buffered for the call session.
const TRANSCRIPT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("transcription is not configured: {0}")]
    Config(String),

    #[error("failed to connect to transcription service: {0}")]
    Connect(String),
}

fn default_url() -> String {
    "wss://streaming.assemblyai.com/v3/ws".to_string()
}

fn default_sample_rate() -> u32 {
    8000
}

fn default_encoding() -> String {
    "pcm_mulaw".to_string()
}

fn default_confidence_threshold() -> f32 {
    0.4
}

fn default_min_silence_ms() -> u32 {
    160
}

fn default_max_silence_ms() -> u32 {
    1280
}

/// Realtime transcription endpoint and end-of-turn tuning.
#[derive(Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// Must match the carrier's inbound audio.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default = "default_confidence_threshold")]
    pub end_of_turn_confidence_threshold: f32,
    #[serde(default = "default_min_silence_ms")]
    pub min_end_of_turn_silence_when_confident: u32,
    #[serde(default = "default_max_silence_ms")]
    pub max_turn_silence: u32,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            api_key: String::new(),
            sample_rate: default_sample_rate(),
            encoding: default_encoding(),
            end_of_turn_confidence_threshold: default_confidence_threshold(),
            min_end_of_turn_silence_when_confident: default_min_silence_ms(),
            max_turn_silence: default_max_silence_ms(),
        }
    }
}

impl fmt::Debug for TranscriptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscriptionConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("sample_rate", &self.sample_rate)
            .field("encoding", &self.encoding)
            .field(
                "end_of_turn_confidence_threshold",
                &self.end_of_turn_confidence_threshold,
            )
            .field(
                "min_end_of_turn_silence_when_confident",
                &self.min_end_of_turn_silence_when_confident,
            )
            .field("max_turn_silence", &self.max_turn_silence)
            .finish()
    }
}

impl TranscriptionConfig {
    /// Full websocket URL including the audio and end-of-turn parameters.
    pub fn stream_url(&self) -> Result<reqwest::Url, TranscriptionError> {
        reqwest::Url::parse_with_params(
            &self.url,
            &[
                ("sample_rate", self.sample_rate.to_string()),
                ("encoding", self.encoding.clone()),
                (
                    "end_of_turn_confidence_threshold",
                    self.end_of_turn_confidence_threshold.to_string(),
                ),
                (
                    "min_end_of_turn_silence_when_confident",
                    self.min_end_of_turn_silence_when_confident.to_string(),
                ),
                ("max_turn_silence", self.max_turn_silence.to_string()),
            ],
        )
        .map_err(|e| TranscriptionError::Config(format!("invalid url {}: {}", self.url, e)))
    }
}

/// Both ends of one live transcription stream.
#[derive(Debug)]
pub struct TranscriptionSession {
    /// Caller audio in. Dropping it ends the stream.
    pub audio: mpsc::Sender<Vec<u8>>,
    /// Finalized utterances out.
    pub transcripts: mpsc::Receiver<String>,
    /// Background task pumping the socket, if any.
    pub worker: Option<JoinHandle<()>>,
}

/// Opens a transcription stream for one call.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn connect(&self) -> Result<TranscriptionSession, TranscriptionError>;
}

/// Messages sent by the realtime service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum StreamingMessage {
    Begin {
        #[serde(default)]
        id: String,
    },
    Turn {
        #[serde(default)]
        transcript: String,
        #[serde(default)]
        end_of_turn: bool,
        #[serde(default)]
        end_of_turn_confidence: Option<f64>,
    },
    Termination {
        #[serde(default)]
        audio_duration_seconds: Option<f64>,
    },
    #[serde(other)]
    Other,
}

impl StreamingMessage {
    /// The transcript of a finalized, non-empty turn.
    pub fn final_transcript(&self) -> Option<&str> {
        match self {
            Self::Turn {
                transcript,
                end_of_turn: true,
                ..
            } if !transcript.trim().is_empty() => Some(transcript.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssemblyAiTranscriber {
    config: TranscriptionConfig,
}

impl AssemblyAiTranscriber {
    pub fn new(config: TranscriptionConfig) -> Result<Self, TranscriptionError> {
        if config.api_key.is_empty() {
            return Err(TranscriptionError::Config(
                "AssemblyAI API key is not configured. Set ASSEMBLYAI_API_KEY.".to_string(),
            ));
        }
        config.stream_url()?;
        Ok(Self { config })
    }
}

#[async_trait]
impl Transcriber for AssemblyAiTranscriber {
    async fn connect(&self) -> Result<TranscriptionSession, TranscriptionError> {
        let url = self.config.stream_url()?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TranscriptionError::Connect(e.to_string()))?;
        let auth = HeaderValue::from_str(&self.config.api_key)
            .map_err(|e| TranscriptionError::Config(format!("invalid API key header: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        let (ws, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TranscriptionError::Connect(e.to_string()))?;
        tracing::info!(host = url.host_str().unwrap_or_default(), "transcription stream connected");

        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_CHANNEL_CAPACITY);
        let (transcript_tx, transcript_rx) = mpsc::channel(TRANSCRIPT_CHANNEL_CAPACITY);
        let worker = tokio::spawn(pump(ws, audio_rx, transcript_tx));

        Ok(TranscriptionSession {
            audio: audio_tx,
            transcripts: transcript_rx,
            worker: Some(worker),
        })
    }
}

async fn pump<S>(ws: S, mut audio: mpsc::Receiver<Vec<u8>>, transcripts: mpsc::Sender<String>)
where
    S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Send
        + 'static,
{
    let (mut sink, mut stream) = ws.split();
    let mut audio_open = true;

    loop {
        tokio::select! {
            frame = audio.recv(), if audio_open => match frame {
                Some(frame) => {
                    if let Err(e) = sink.send(Message::Binary(frame.into())).await {
                        tracing::warn!("transcription send failed: {}", e);
                        break;
                    }
                }
                None => {
                    audio_open = false;
                    let terminate = serde_json::json!({ "type": "Terminate" }).to_string();
                    if sink.send(Message::Text(terminate.into())).await.is_err() {
                        break;
                    }
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => handle_message(text.as_str(), &transcripts).await,
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "transcription stream closed by peer");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::error!("transcription read error: {}", e);
                    break;
                }
                None => break,
            },
        }
    }
}

async fn handle_message(text: &str, transcripts: &mpsc::Sender<String>) {
    let message: StreamingMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("unparseable transcription message: {}", e);
            return;
        }
    };

    match &message {
        StreamingMessage::Begin { id } => tracing::info!(session = %id, "transcription session began"),
        StreamingMessage::Turn {
            transcript,
            end_of_turn,
            end_of_turn_confidence,
        } if !transcript.is_empty() => {
            tracing::info!(
                end = end_of_turn,
                confidence = end_of_turn_confidence.unwrap_or(0.0),
                "heard: {}",
                transcript
            );
        }
        StreamingMessage::Termination {
            audio_duration_seconds,
        } => tracing::info!(?audio_duration_seconds, "transcription session terminated"),
        _ => {}
    }

    if let Some(done) = message.final_transcript() {
        if transcripts.send(done.to_string()).await.is_err() {
            tracing::debug!("transcript dropped; call session has ended");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_url_carries_tuning_parameters() {
        let url = TranscriptionConfig::default().stream_url().unwrap();
        let query = url.query().unwrap();
        assert!(url.as_str().starts_with("wss://streaming.assemblyai.com/v3/ws?"));
        assert!(query.contains("sample_rate=8000"));
        assert!(query.contains("encoding=pcm_mulaw"));
        assert!(query.contains("end_of_turn_confidence_threshold=0.4"));
        assert!(query.contains("min_end_of_turn_silence_when_confident=160"));
        assert!(query.contains("max_turn_silence=1280"));
    }

    #[test]
    fn missing_key_is_rejected() {
        assert!(matches!(
            AssemblyAiTranscriber::new(TranscriptionConfig::default()),
            Err(TranscriptionError::Config(_))
        ));
    }

    #[test]
    fn only_final_turns_are_transcripts() {
        let partial: StreamingMessage = serde_json::from_str(
            r#"{"type":"Turn","transcript":"when do","end_of_turn":false,"end_of_turn_confidence":0.1}"#,
        )
        .unwrap();
        assert_eq!(partial.final_transcript(), None);

        let done: StreamingMessage = serde_json::from_str(
            r#"{"type":"Turn","turn_order":0,"transcript":"when do you open","end_of_turn":true,"end_of_turn_confidence":0.93,"words":[]}"#,
        )
        .unwrap();
        assert_eq!(done.final_transcript(), Some("when do you open"));

        let blank: StreamingMessage =
            serde_json::from_str(r#"{"type":"Turn","transcript":"  ","end_of_turn":true}"#).unwrap();
        assert_eq!(blank.final_transcript(), None);
    }

    #[test]
    fn unknown_message_types_are_tolerated() {
        let begin: StreamingMessage =
            serde_json::from_str(r#"{"type":"Begin","id":"abc","expires_at":1}"#).unwrap();
        assert_eq!(begin, StreamingMessage::Begin { id: "abc".to_string() });

        let other: StreamingMessage = serde_json::from_str(r#"{"type":"Warning"}"#).unwrap();
        assert_eq!(other, StreamingMessage::Other);
    }

    #[tokio::test]
    async fn final_turn_is_forwarded() {
        let (tx, mut rx) = mpsc::channel(4);
        handle_message(r#"{"type":"Turn","transcript":"hi","end_of_turn":false}"#, &tx).await;
        handle_message(r#"{"type":"Turn","transcript":"hi there","end_of_turn":true}"#, &tx).await;
        handle_message("not json", &tx).await;
        drop(tx);

        assert_eq!(rx.recv().await.as_deref(), Some("hi there"));
        assert_eq!(rx.recv().await, None);
    }
}
