//! Observability layer for callbridge.
//!
//! Every call, turn and speech interruption is recorded in an in-memory,
//! append-only event log that operators can query over HTTP or follow live.
//!
//! # Event domains
//!
//! | Domain | Example events |
//! |--------|---------------|
//! | `CALL` | `CALL_STARTED`, `CALL_ENDED` |
//! | `TURN` | `TURN_STARTED`, `TURN_COMPLETED`, `TURN_FAILED`, `KNOWLEDGE_LOOKUP` |
//! | `SPEECH` | `SPEECH_ABORTED`, `BARGE_IN` |
//!
//! # Usage
//!
//! ```rust
//! use callbridge_observe::{EventLog, EventPayload};
//!
//! let log = EventLog::default();
//! let event = log.emit(
//!     "MZ123",
//!     EventPayload::TurnStarted {
//!         turn: 1,
//!         transcript: "hello".to_string(),
//!     },
//! );
//! assert_eq!(event.event_type, "TURN_STARTED");
//! ```

mod event;
mod store;

pub use event::{CallEvent, EventDomain, EventPayload, ParseEventDomainError};
pub use store::{EventFilter, EventLog, DEFAULT_RETENTION};

#[cfg(test)]
mod tests;
