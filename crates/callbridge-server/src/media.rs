//! Twilio Media Streams websocket.
//!
//! `GET /media` answers plain HTTP with a readiness document and upgrades
//! websocket requests. One upgraded socket is one phone call: caller audio is
//! re-framed and forwarded to transcription, finalized transcripts drive the
//! call's [`CallSession`], and synthesized frames flow back as `media` events.

use crate::session::CallSession;
use crate::AppState;
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message as AxumMessage, WebSocket},
        Extension, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
    Json,
};
use base64::Engine;
use callbridge_voice::{FrameSink, VoiceError};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long the transcription stream gets to acknowledge `Terminate`.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

// ── Wire types ───────────────────────────────────────────────────────

/// Events Twilio sends over a media stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TwilioInbound {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },
    Start {
        start: StartMetadata,
    },
    Media {
        media: MediaPayload,
    },
    Mark {
        #[serde(default)]
        mark: Option<MarkPayload>,
    },
    Stop {
        #[serde(default)]
        stop: Option<StopMetadata>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMetadata {
    pub stream_sid: String,
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub tracks: Vec<String>,
    #[serde(default)]
    pub media_format: Option<MediaFormat>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaPayload {
    #[serde(default)]
    pub track: Option<String>,
    /// Base64 mu-law audio.
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkPayload {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopMetadata {
    #[serde(default)]
    pub call_sid: Option<String>,
}

/// Events sent back to Twilio.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TwilioOutbound {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    /// Drops any audio Twilio has buffered but not yet played.
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

impl TwilioOutbound {
    pub fn media(stream_sid: &str, frame: &[u8]) -> Self {
        Self::Media {
            stream_sid: stream_sid.to_string(),
            media: OutboundMedia {
                payload: base64::engine::general_purpose::STANDARD.encode(frame),
            },
        }
    }

    pub fn clear(stream_sid: &str) -> Self {
        Self::Clear {
            stream_sid: stream_sid.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ── Inbound re-framing ───────────────────────────────────────────────

/// Regroups carrier audio into fixed-size frames for transcription.
#[derive(Debug)]
pub struct InboundBuffer {
    frame_bytes: usize,
    buf: Vec<u8>,
}

impl InboundBuffer {
    pub fn new(frame_bytes: usize) -> Self {
        Self {
            frame_bytes: frame_bytes.max(1),
            buf: Vec::with_capacity(frame_bytes * 2),
        }
    }

    /// Appends audio and returns every complete frame.
    pub fn push(&mut self, audio: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(audio);
        let mut frames = Vec::with_capacity(self.buf.len() / self.frame_bytes);
        while self.buf.len() >= self.frame_bytes {
            let rest = self.buf.split_off(self.frame_bytes);
            frames.push(std::mem::replace(&mut self.buf, rest));
        }
        frames
    }

    /// Takes whatever is left, if anything.
    pub fn take_remainder(&mut self) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}

// ── Outbound frames ──────────────────────────────────────────────────

/// Frame sink that wraps each frame in a Twilio `media` event.
///
/// A sink can be closed from outside; once closed, every send fails so an
/// interrupted speech act stops at its next frame.
#[derive(Debug, Clone)]
pub struct TwilioFrameSink {
    stream_sid: String,
    outbound: mpsc::Sender<String>,
    open: Arc<AtomicBool>,
}

impl TwilioFrameSink {
    pub fn new(stream_sid: impl Into<String>, outbound: mpsc::Sender<String>) -> Self {
        Self {
            stream_sid: stream_sid.into(),
            outbound,
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameSink for TwilioFrameSink {
    async fn send_frame(&self, frame: Vec<u8>) -> Result<(), VoiceError> {
        if !self.is_open() {
            return Err(VoiceError::Sink("speech interrupted".to_string()));
        }
        let message = TwilioOutbound::media(&self.stream_sid, &frame)
            .to_json()
            .map_err(|e| VoiceError::Sink(format!("failed to encode media event: {}", e)))?;
        self.outbound
            .send(message)
            .await
            .map_err(|_| VoiceError::Sink("media socket closed".to_string()))
    }
}

// ── Handler ──────────────────────────────────────────────────────────

/// Handler for `GET /media`.
pub async fn media_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match ws {
        Ok(ws) => ws
            .on_upgrade(move |socket| handle_socket(socket, state))
            .into_response(),
        Err(_) => Json(serde_json::json!({ "status": "WebSocket endpoint ready" })).into_response(),
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<String>(state.call.outbound_queue_capacity.max(1));

    // Spawn a task to forward outbound events to the websocket sender
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(AxumMessage::Text(msg.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let transcription = match state.transcriber.connect().await {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("cannot take call without transcription: {}", e);
            send_task.abort();
            return;
        }
    };
    let audio = transcription.audio;
    let mut transcripts = transcription.transcripts;

    let mut inbound = InboundBuffer::new(state.call.inbound_frame_bytes);
    let mut call: Option<CallSession> = None;
    let mut end_reason = "disconnect".to_string();

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(AxumMessage::Text(text))) => {
                    let event = match serde_json::from_str::<TwilioInbound>(text.as_str()) {
                        Ok(event) => event,
                        Err(e) => {
                            tracing::warn!("ignoring malformed media event: {}", e);
                            continue;
                        }
                    };
                    match event {
                        TwilioInbound::Connected { protocol } => {
                            tracing::debug!(?protocol, "media stream connected");
                        }
                        TwilioInbound::Start { start } => {
                            if call.is_some() {
                                tracing::warn!(stream_sid = %start.stream_sid, "duplicate start event ignored");
                                continue;
                            }
                            tracing::info!(
                                stream_sid = %start.stream_sid,
                                call_sid = ?start.call_sid,
                                "media stream started"
                            );
                            call = Some(CallSession::start(
                                &state,
                                start.stream_sid,
                                start.call_sid,
                                tx.clone(),
                            ));
                        }
                        TwilioInbound::Media { media } => {
                            let bytes = match base64::engine::general_purpose::STANDARD.decode(&media.payload) {
                                Ok(b) => b,
                                Err(e) => {
                                    tracing::warn!("ignoring undecodable media payload: {}", e);
                                    continue;
                                }
                            };
                            for frame in inbound.push(&bytes) {
                                if audio.send(frame).await.is_err() {
                                    tracing::warn!("transcription stream is gone; dropping caller audio");
                                    break;
                                }
                            }
                        }
                        TwilioInbound::Mark { mark } => {
                            tracing::debug!(mark = ?mark.map(|m| m.name), "playback mark reached");
                        }
                        TwilioInbound::Stop { .. } => {
                            end_reason = "stop".to_string();
                            break;
                        }
                        TwilioInbound::Other => {}
                    }
                }
                Some(Ok(AxumMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    end_reason = format!("socket error: {}", e);
                    break;
                }
            },
            Some(transcript) = transcripts.recv() => match call.as_mut() {
                Some(session) => session.on_transcript(transcript).await,
                None => tracing::warn!("transcript arrived before the stream started; ignored"),
            },
        }
    }

    if let Some(rest) = inbound.take_remainder() {
        let _ = audio.send(rest).await;
    }
    // Closing the audio channel tells transcription to terminate.
    drop(audio);
    if let Some(mut worker) = transcription.worker {
        if tokio::time::timeout(TERMINATE_GRACE, &mut worker).await.is_err() {
            worker.abort();
        }
    }

    if let Some(session) = call {
        session.end(&end_reason).await;
    }
    drop(tx);

    // Let queued events drain, then make sure the writer is gone.
    if tokio::time::timeout(TERMINATE_GRACE, async {
        let _ = (&mut send_task).await;
    })
    .await
    .is_err()
    {
        send_task.abort();
    }
    tracing::info!(reason = %end_reason, "media stream closed");
}
