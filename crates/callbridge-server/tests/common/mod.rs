//! In-process stand-ins for the external services a call talks to.

#![allow(dead_code)]

use async_trait::async_trait;
use callbridge_agent::{AgentError, KnowledgeLookup, ReasoningEngine, TurnConfig};
use callbridge_observe::{CallEvent, EventFilter, EventLog};
use callbridge_server::config::CallConfig;
use callbridge_server::transcription::{Transcriber, TranscriptionError, TranscriptionSession};
use callbridge_server::{app, AppState};
use callbridge_types::{AgentOutput, ChatMessage, Role};
use callbridge_voice::{AudioConfig, PcmStream, SpeechSynthesizer, VoiceError};
use futures_util::stream::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// The test's end of one fake transcription stream.
pub struct TranscriberHandle {
    /// Audio frames the server forwarded.
    pub audio: mpsc::Receiver<Vec<u8>>,
    /// Feed finalized utterances to the server.
    pub transcripts: mpsc::Sender<String>,
}

/// Hands each opened stream to the test through a channel.
pub struct FakeTranscriber {
    handles: mpsc::UnboundedSender<TranscriberHandle>,
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn connect(&self) -> Result<TranscriptionSession, TranscriptionError> {
        let (audio_tx, audio_rx) = mpsc::channel(64);
        let (transcript_tx, transcript_rx) = mpsc::channel(16);
        self.handles
            .send(TranscriberHandle {
                audio: audio_rx,
                transcripts: transcript_tx,
            })
            .map_err(|_| TranscriptionError::Connect("test harness dropped".to_string()))?;
        Ok(TranscriptionSession {
            audio: audio_tx,
            transcripts: transcript_rx,
            worker: None,
        })
    }
}

/// Repeats the caller's last utterance and yields the floor.
///
/// Utterances that mention "hours" first ask for a knowledge lookup.
pub struct EchoReasoner;

#[async_trait]
impl ReasoningEngine for EchoReasoner {
    async fn infer(&self, history: &[ChatMessage]) -> Result<AgentOutput, AgentError> {
        let last = history
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        if last.contains("hours") && !last.starts_with("CONTEXT") {
            return Ok(AgentOutput::new("Let me check", true, false));
        }
        Ok(AgentOutput::new(last, false, true))
    }
}

pub struct StaticKnowledge;

#[async_trait]
impl KnowledgeLookup for StaticKnowledge {
    async fn lookup(&self, question: &str, _top_k: usize) -> Result<String, AgentError> {
        Ok(format!("CONTEXT open nine to five for {}", question))
    }
}

/// Constant-tone synthesizer.
///
/// Text starting with "long" renders slowly enough to be interrupted.
pub struct ToneSynthesizer;

#[async_trait]
impl SpeechSynthesizer for ToneSynthesizer {
    async fn synthesize(&self, text: &str, _voice: &str) -> Result<PcmStream, VoiceError> {
        let (chunks, delay) = if text.starts_with("long") {
            (100, Duration::from_millis(20))
        } else {
            (2, Duration::from_millis(1))
        };
        let chunk: Vec<u8> = std::iter::repeat(1500i16.to_le_bytes())
            .take(1600)
            .flatten()
            .collect();
        let stream = futures_util::stream::iter(0..chunks).then(move |_| {
            let chunk = chunk.clone();
            async move {
                tokio::time::sleep(delay).await;
                Ok(chunk)
            }
        });
        Ok(stream.boxed())
    }
}

pub fn test_state(barge_in: bool) -> (AppState, mpsc::UnboundedReceiver<TranscriberHandle>) {
    let (handles_tx, handles_rx) = mpsc::unbounded_channel();
    let state = AppState {
        audio: AudioConfig::default(),
        voice: "test".to_string(),
        turn: TurnConfig::default(),
        call: CallConfig {
            barge_in,
            ..CallConfig::default()
        },
        synthesizer: Arc::new(ToneSynthesizer),
        reasoner: Arc::new(EchoReasoner),
        knowledge: Arc::new(StaticKnowledge),
        transcriber: Arc::new(FakeTranscriber {
            handles: handles_tx,
        }),
        events: Arc::new(EventLog::default()),
    };
    (state, handles_rx)
}

/// Serves the app on an ephemeral port.
pub async fn spawn_server(state: AppState) -> SocketAddr {
    let app = app(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Polls the log until an event of `event_type` shows up.
pub async fn wait_for_event(events: &EventLog, event_type: &str) -> CallEvent {
    let filter = EventFilter {
        event_type: Some(event_type.to_string()),
        ..EventFilter::default()
    };
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(event) = events.query(&filter).into_iter().next() {
                return event;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {}", event_type))
}

/// Event types recorded so far, in sequence order.
pub fn event_types(events: &EventLog) -> Vec<String> {
    events
        .query(&EventFilter {
            limit: Some(1000),
            ..EventFilter::default()
        })
        .into_iter()
        .map(|e| e.event_type)
        .collect()
}

/// Polls the log until `count` events of `event_type` exist, then returns them.
pub async fn wait_for_events(events: &EventLog, event_type: &str, count: usize) -> Vec<CallEvent> {
    let filter = EventFilter {
        event_type: Some(event_type.to_string()),
        ..EventFilter::default()
    };
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let found = events.query(&filter);
            if found.len() >= count {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {} x {}", count, event_type))
}
