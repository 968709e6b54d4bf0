//! Unit tests for the call event log.

use crate::event::{EventDomain, EventPayload};
use crate::store::{EventFilter, EventLog};

fn turn_started(turn: u64) -> EventPayload {
    EventPayload::TurnStarted {
        turn,
        transcript: format!("utterance {}", turn),
    }
}

// ── emit tests ───────────────────────────────────────────────────────

#[test]
fn emit_assigns_domain_type_and_seq() {
    let log = EventLog::default();

    let event = log.emit(
        "MZ1",
        EventPayload::CallStarted {
            call_sid: Some("CA1".to_string()),
            stream_sid: "MZ1".to_string(),
        },
    );

    assert_eq!(event.seq, 1);
    assert_eq!(event.domain, "CALL");
    assert_eq!(event.event_type, "CALL_STARTED");
    assert_eq!(event.call_id, "MZ1");
    assert!(chrono::DateTime::parse_from_rfc3339(&event.occurred_at).is_ok());
    assert_eq!(log.len(), 1);
}

#[test]
fn seq_is_monotonic_across_calls() {
    let log = EventLog::default();
    let a = log.emit("MZ1", turn_started(1));
    let b = log.emit("MZ2", turn_started(1));
    let c = log.emit("MZ1", turn_started(2));
    assert!(a.seq < b.seq && b.seq < c.seq);
    assert_eq!(log.next_seq(), 4);
}

#[test]
fn retention_evicts_oldest_but_keeps_seq() {
    let log = EventLog::new(3);
    for turn in 1..=5 {
        log.emit("MZ1", turn_started(turn));
    }

    let events = log.query(&EventFilter::default());
    assert_eq!(events.len(), 3);
    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![3, 4, 5]);
    assert_eq!(log.next_seq(), 6);
}

// ── payload tests ────────────────────────────────────────────────────

#[test]
fn payload_serializes_with_event_tag() {
    let payload = EventPayload::BargeIn {
        interrupted_turn: 2,
        transcript: "wait".to_string(),
    };
    let json = serde_json::to_value(&payload).unwrap();
    assert_eq!(json["event"], "BARGE_IN");
    assert_eq!(json["interrupted_turn"], 2);

    let back: EventPayload = serde_json::from_value(json).unwrap();
    assert_eq!(back, payload);
}

#[test]
fn every_payload_maps_to_its_domain() {
    let cases = [
        (
            EventPayload::CallEnded {
                reason: "stop".to_string(),
                turns: 0,
            },
            EventDomain::Call,
            "CALL_ENDED",
        ),
        (
            EventPayload::TurnCompleted {
                turn: 1,
                iterations: 2,
                lookups: 1,
                frames: 10,
                completed: true,
            },
            EventDomain::Turn,
            "TURN_COMPLETED",
        ),
        (
            EventPayload::TurnFailed {
                turn: 1,
                error: "x".to_string(),
            },
            EventDomain::Turn,
            "TURN_FAILED",
        ),
        (
            EventPayload::KnowledgeLookup {
                turn: 1,
                question: "q".to_string(),
            },
            EventDomain::Turn,
            "KNOWLEDGE_LOOKUP",
        ),
        (
            EventPayload::SpeechAborted {
                turn: 1,
                reason: "barge-in".to_string(),
            },
            EventDomain::Speech,
            "SPEECH_ABORTED",
        ),
    ];
    for (payload, domain, event_type) in cases {
        assert_eq!(payload.domain(), domain);
        assert_eq!(payload.event_type(), event_type);
    }
}

#[test]
fn domain_parses_and_displays() {
    for domain in [EventDomain::Call, EventDomain::Turn, EventDomain::Speech] {
        let parsed: EventDomain = domain.to_string().parse().unwrap();
        assert_eq!(parsed, domain);
    }
    let err = "IDENTITY".parse::<EventDomain>().unwrap_err();
    assert_eq!(err.to_string(), "unknown event domain: IDENTITY");
}

// ── query tests ──────────────────────────────────────────────────────

fn seeded() -> EventLog {
    let log = EventLog::default();
    log.emit(
        "MZ1",
        EventPayload::CallStarted {
            call_sid: None,
            stream_sid: "MZ1".to_string(),
        },
    );
    log.emit("MZ1", turn_started(1));
    log.emit("MZ2", turn_started(1));
    log.emit(
        "MZ1",
        EventPayload::SpeechAborted {
            turn: 1,
            reason: "barge-in".to_string(),
        },
    );
    log
}

#[test]
fn query_filters_by_domain() {
    let log = seeded();
    let events = log.query(&EventFilter {
        domain: Some(EventDomain::Turn),
        ..Default::default()
    });
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.domain == "TURN"));
}

#[test]
fn query_filters_by_call_and_type() {
    let log = seeded();
    let events = log.query(&EventFilter {
        call_id: Some("MZ1".to_string()),
        event_type: Some("TURN_STARTED".to_string()),
        ..Default::default()
    });
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].seq, 2);
}

#[test]
fn query_paginates_after_seq() {
    let log = seeded();
    let first = log.query(&EventFilter {
        limit: Some(2),
        ..Default::default()
    });
    assert_eq!(first.len(), 2);

    let rest = log.query(&EventFilter {
        after_seq: first.last().map(|e| e.seq),
        ..Default::default()
    });
    let seqs: Vec<u64> = rest.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![3, 4]);
}

#[test]
fn query_limit_is_clamped() {
    let log = seeded();
    let events = log.query(&EventFilter {
        limit: Some(0),
        ..Default::default()
    });
    assert_eq!(events.len(), 1);
}

// ── broadcast tests ──────────────────────────────────────────────────

#[tokio::test]
async fn subscribers_receive_new_events() {
    let log = EventLog::default();
    let mut rx = log.subscribe();

    log.emit("MZ1", turn_started(1));

    let event = rx.recv().await.unwrap();
    assert_eq!(event.event_type, "TURN_STARTED");
    assert_eq!(event.seq, 1);
}

#[test]
fn emit_without_subscribers_is_fine() {
    let log = EventLog::default();
    log.emit("MZ1", turn_started(1));
    assert!(!log.is_empty());
}
