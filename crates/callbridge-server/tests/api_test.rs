mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use callbridge_observe::EventPayload;
use callbridge_server::app;
use serde_json::Value;
use tower::ServiceExt;

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn health_check_returns_ok() {
    let (state, _handles) = common::test_state(true);
    let (status, json) = get_json(app(state), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn media_endpoint_answers_plain_http() {
    let (state, _handles) = common::test_state(true);
    let (status, json) = get_json(app(state), "/media").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "WebSocket endpoint ready");
}

#[tokio::test]
async fn events_are_filtered_and_paginated() {
    let (state, _handles) = common::test_state(true);
    let events = state.events.clone();
    events.emit(
        "call-a",
        EventPayload::CallStarted {
            call_sid: Some("CA1".to_string()),
            stream_sid: "MZ1".to_string(),
        },
    );
    events.emit(
        "call-a",
        EventPayload::TurnStarted {
            turn: 1,
            transcript: "hello".to_string(),
        },
    );
    events.emit(
        "call-b",
        EventPayload::TurnStarted {
            turn: 1,
            transcript: "hi".to_string(),
        },
    );
    let router = app(state);

    let (status, json) = get_json(router.clone(), "/api/events?domain=TURN").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 2);
    assert_eq!(json["events"][0]["event_type"], "TURN_STARTED");

    let (_, json) = get_json(router.clone(), "/api/events?call_id=call-a&limit=1").await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["events"][0]["seq"], 1);

    let (_, json) = get_json(router.clone(), "/api/events?call_id=call-a&after_seq=1").await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["events"][0]["payload"]["transcript"], "hello");

    let (_, json) = get_json(router, "/api/events?event_type=CALL_STARTED").await;
    assert_eq!(json["events"][0]["payload"]["stream_sid"], "MZ1");
}

#[tokio::test]
async fn unknown_domain_is_rejected() {
    let (state, _handles) = common::test_state(true);
    let (status, json) = get_json(app(state), "/api/events?domain=BILLING").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("BILLING"));
}
