//! In-memory call event log.
//!
//! All writes go through [`EventLog::emit`], which assigns the next sequence
//! number, timestamps the event, appends it to a bounded ring and broadcasts
//! it to live subscribers. Reads go through [`EventLog::query`], which filters
//! by domain, event type and call with cursor-based pagination on `seq`.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::event::{CallEvent, EventDomain, EventPayload};

/// Default number of events retained in memory.
pub const DEFAULT_RETENTION: usize = 10_000;

/// Default capacity of the live broadcast channel.
const BROADCAST_CAPACITY: usize = 256;

/// Default and maximum page sizes for [`EventLog::query`].
const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

/// Filter criteria for querying the event log.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by event domain.
    pub domain: Option<EventDomain>,
    /// Filter by event type string.
    pub event_type: Option<String>,
    /// Filter by call ID.
    pub call_id: Option<String>,
    /// Return events with a sequence number strictly greater than this.
    pub after_seq: Option<u64>,
    /// Maximum number of events to return (default: 100, max: 1000).
    pub limit: Option<usize>,
}

impl EventFilter {
    fn matches(&self, event: &CallEvent) -> bool {
        self.domain.map_or(true, |d| event.domain == d.as_str())
            && self
                .event_type
                .as_deref()
                .map_or(true, |t| event.event_type == t)
            && self.call_id.as_deref().map_or(true, |c| event.call_id == c)
            && self.after_seq.map_or(true, |s| event.seq > s)
    }
}

struct Ring {
    events: VecDeque<CallEvent>,
    next_seq: u64,
}

/// Append-only, bounded event log shared by every call in the process.
pub struct EventLog {
    ring: Mutex<Ring>,
    retention: usize,
    tx: broadcast::Sender<CallEvent>,
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("retention", &self.retention)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl EventLog {
    /// Creates a log that keeps at most `retention` events (minimum 1).
    pub fn new(retention: usize) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            ring: Mutex::new(Ring {
                events: VecDeque::new(),
                next_seq: 1,
            }),
            retention: retention.max(1),
            tx,
        }
    }

    /// Records an event for `call_id` and broadcasts it.
    ///
    /// Sequence numbers start at 1 and never repeat, even after old events
    /// have been evicted.
    pub fn emit(&self, call_id: &str, payload: EventPayload) -> CallEvent {
        let event = {
            let mut ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
            let event = CallEvent {
                seq: ring.next_seq,
                domain: payload.domain().as_str().to_string(),
                event_type: payload.event_type().to_string(),
                call_id: call_id.to_string(),
                payload,
                occurred_at: chrono::Utc::now().to_rfc3339(),
            };
            ring.next_seq += 1;
            if ring.events.len() == self.retention {
                ring.events.pop_front();
            }
            ring.events.push_back(event.clone());
            event
        };

        tracing::debug!(
            seq = event.seq,
            call_id = %event.call_id,
            event_type = %event.event_type,
            "event recorded"
        );

        // No receivers is the normal case when nobody is streaming.
        let _ = self.tx.send(event.clone());
        event
    }

    /// Returns matching events in sequence order, bounded by `filter.limit`.
    pub fn query(&self, filter: &EventFilter) -> Vec<CallEvent> {
        let limit = filter.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        ring.events
            .iter()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Subscribes to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.tx.subscribe()
    }

    /// Number of events currently retained.
    pub fn len(&self) -> usize {
        self.ring
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .events
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sequence number the next event will receive.
    pub fn next_seq(&self) -> u64 {
        self.ring.lock().unwrap_or_else(|e| e.into_inner()).next_seq
    }
}
