//! Event API handlers for the call observability log.
//!
//! Provides:
//! - `GET /api/events` for filtered, cursor-paginated retrieval
//! - `GET /api/events/stream` for a live SSE feed

use crate::AppState;
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    Json,
};
use callbridge_observe::{CallEvent, EventDomain, EventFilter};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, sync::Arc};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Query parameters for `GET /api/events`.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Filter by event domain (`CALL`, `TURN` or `SPEECH`).
    pub domain: Option<String>,
    /// Filter by event type (e.g., `TURN_COMPLETED`).
    pub event_type: Option<String>,
    /// Filter by call ID.
    pub call_id: Option<String>,
    /// Return events with a sequence number greater than this.
    pub after_seq: Option<u64>,
    /// Maximum number of events to return (default: 100, max: 1000).
    pub limit: Option<usize>,
}

/// Response wrapper for paginated event retrieval.
#[derive(Debug, Serialize)]
pub struct EventsResponse {
    /// The matching events in sequence order.
    pub events: Vec<CallEvent>,
    /// The number of events returned.
    pub count: usize,
}

fn parse_domain(domain: Option<&str>) -> Result<Option<EventDomain>, Response> {
    domain
        .map(|d| {
            d.parse::<EventDomain>().map_err(|_| {
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "error": format!("invalid domain: {}. Expected one of: CALL, TURN, SPEECH", d)
                    })),
                )
                    .into_response()
            })
        })
        .transpose()
}

/// Handler for `GET /api/events`.
pub async fn get_events_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, Response> {
    let filter = EventFilter {
        domain: parse_domain(params.domain.as_deref())?,
        event_type: params.event_type,
        call_id: params.call_id,
        after_seq: params.after_seq,
        limit: Some(params.limit.unwrap_or(100).clamp(1, 1000)),
    };

    let events = state.events.query(&filter);
    let count = events.len();
    Ok(Json(EventsResponse { events, count }))
}

/// Query parameters for `GET /api/events/stream`.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub domain: Option<String>,
    pub call_id: Option<String>,
}

/// Handler for `GET /api/events/stream`.
///
/// Streams events as they are recorded. Subscribers that fall behind skip
/// the events they missed; `GET /api/events` with `after_seq` fills gaps.
pub async fn get_event_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Response> {
    let domain_filter = parse_domain(params.domain.as_deref())?;
    let call_filter = params.call_id;

    let stream = BroadcastStream::new(state.events.subscribe());

    let mapped_stream = stream.filter_map(move |result| match result {
        Ok(event) => {
            if domain_filter.is_some_and(|d| event.domain != d.as_str()) {
                return None;
            }
            if call_filter.as_deref().is_some_and(|c| event.call_id != c) {
                return None;
            }

            match serde_json::to_string(&event) {
                Ok(data) => Some(Ok(Event::default()
                    .id(event.seq.to_string())
                    .event(event.event_type.clone())
                    .data(data))),
                Err(e) => {
                    tracing::error!("failed to serialize call event: {}", e);
                    None
                }
            }
        }
        Err(lagged) => {
            tracing::warn!("event stream subscriber lagged: {}", lagged);
            None
        }
    });

    Ok(Sse::new(mapped_stream).keep_alive(KeepAlive::default()))
}
