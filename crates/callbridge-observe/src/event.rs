//! Event domain, payload, and record types for the call event log.

use serde::{Deserialize, Serialize};

/// Observability event domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventDomain {
    /// Call lifecycle: started, ended.
    #[serde(rename = "CALL")]
    Call,
    /// Turn lifecycle: started, completed, failed, knowledge lookups.
    #[serde(rename = "TURN")]
    Turn,
    /// Speech output interruptions.
    #[serde(rename = "SPEECH")]
    Speech,
}

impl EventDomain {
    /// Returns the canonical string label for this domain.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Call => "CALL",
            Self::Turn => "TURN",
            Self::Speech => "SPEECH",
        }
    }
}

impl std::fmt::Display for EventDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventDomain {
    type Err = ParseEventDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CALL" => Ok(Self::Call),
            "TURN" => Ok(Self::Turn),
            "SPEECH" => Ok(Self::Speech),
            _ => Err(ParseEventDomainError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown event domain string.
#[derive(Debug, Clone)]
pub struct ParseEventDomainError(pub String);

impl std::fmt::Display for ParseEventDomainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown event domain: {}", self.0)
    }
}

impl std::error::Error for ParseEventDomainError {}

/// Structured event payloads, one variant per event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    // ── Call domain ──────────────────────────────────────────────────
    /// The carrier started streaming media for a call.
    CallStarted {
        call_sid: Option<String>,
        stream_sid: String,
    },

    /// The media stream closed.
    CallEnded {
        /// `stop`, `disconnect` or a transport error description.
        reason: String,
        /// Turns started during the call.
        turns: u64,
    },

    // ── Turn domain ──────────────────────────────────────────────────
    TurnStarted {
        turn: u64,
        transcript: String,
    },

    TurnCompleted {
        turn: u64,
        iterations: usize,
        lookups: usize,
        frames: usize,
        /// False when the turn stopped at the iteration bound.
        completed: bool,
    },

    TurnFailed {
        turn: u64,
        error: String,
    },

    /// The knowledge base was queried during a turn.
    KnowledgeLookup {
        turn: u64,
        question: String,
    },

    // ── Speech domain ────────────────────────────────────────────────
    /// Speech output was cut short before the utterance finished.
    SpeechAborted {
        turn: u64,
        reason: String,
    },

    /// The caller spoke over the assistant and the running turn was cancelled.
    BargeIn {
        interrupted_turn: u64,
        transcript: String,
    },
}

impl EventPayload {
    /// Returns the canonical event type string for this payload.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::CallStarted { .. } => "CALL_STARTED",
            Self::CallEnded { .. } => "CALL_ENDED",
            Self::TurnStarted { .. } => "TURN_STARTED",
            Self::TurnCompleted { .. } => "TURN_COMPLETED",
            Self::TurnFailed { .. } => "TURN_FAILED",
            Self::KnowledgeLookup { .. } => "KNOWLEDGE_LOOKUP",
            Self::SpeechAborted { .. } => "SPEECH_ABORTED",
            Self::BargeIn { .. } => "BARGE_IN",
        }
    }

    /// Returns the domain for this payload.
    pub fn domain(&self) -> EventDomain {
        match self {
            Self::CallStarted { .. } | Self::CallEnded { .. } => EventDomain::Call,
            Self::TurnStarted { .. }
            | Self::TurnCompleted { .. }
            | Self::TurnFailed { .. }
            | Self::KnowledgeLookup { .. } => EventDomain::Turn,
            Self::SpeechAborted { .. } | Self::BargeIn { .. } => EventDomain::Speech,
        }
    }
}

/// A recorded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEvent {
    /// Monotonically increasing sequence number within the process.
    pub seq: u64,
    /// The event domain (e.g., `CALL`, `TURN`).
    pub domain: String,
    /// The specific event type (e.g., `TURN_COMPLETED`).
    pub event_type: String,
    /// Identifier of the call the event belongs to.
    pub call_id: String,
    pub payload: EventPayload,
    /// RFC 3339 timestamp of when the event was recorded.
    pub occurred_at: String,
}
