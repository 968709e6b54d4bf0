//! Per-call turn orchestration.
//!
//! A [`CallSession`] owns the call's [`TurnController`] and decides what a
//! new caller transcript does to the turn already in progress. With barge-in
//! enabled the running turn is cancelled and Twilio is told to drop buffered
//! audio; otherwise turns queue behind the controller lock in arrival order.

use crate::media::{TwilioFrameSink, TwilioOutbound};
use crate::AppState;
use async_trait::async_trait;
use callbridge_agent::{
    AgentError, ConversationState, KnowledgeLookup, TurnController, SYSTEM_PROMPT,
};
use callbridge_observe::{EventLog, EventPayload};
use callbridge_voice::StreamingRelay;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

/// Knowledge lookup that records a `KNOWLEDGE_LOOKUP` event before delegating.
struct ObservedKnowledge {
    inner: Arc<dyn KnowledgeLookup>,
    events: Arc<EventLog>,
    call_id: String,
    current_turn: Arc<AtomicU64>,
}

#[async_trait]
impl KnowledgeLookup for ObservedKnowledge {
    async fn lookup(&self, question: &str, top_k: usize) -> Result<String, AgentError> {
        self.events.emit(
            &self.call_id,
            EventPayload::KnowledgeLookup {
                turn: self.current_turn.load(Ordering::SeqCst),
                question: question.to_string(),
            },
        );
        self.inner.lookup(question, top_k).await
    }
}

struct RunningTurn {
    turn: u64,
    sink: TwilioFrameSink,
    handle: JoinHandle<()>,
}

/// One phone call from `start` to `stop`.
pub struct CallSession {
    call_id: String,
    stream_sid: String,
    controller: Arc<Mutex<TurnController>>,
    current_turn: Arc<AtomicU64>,
    events: Arc<EventLog>,
    outbound: mpsc::Sender<String>,
    barge_in: bool,
    turns: u64,
    running: Vec<RunningTurn>,
    /// Resolves once the most recent turn task has exited.
    last_turn_done: Option<oneshot::Receiver<()>>,
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("call_id", &self.call_id)
            .field("stream_sid", &self.stream_sid)
            .field("barge_in", &self.barge_in)
            .field("turns", &self.turns)
            .finish_non_exhaustive()
    }
}

impl CallSession {
    /// Builds the call's controller and records `CALL_STARTED`.
    pub fn start(
        state: &AppState,
        stream_sid: String,
        call_sid: Option<String>,
        outbound: mpsc::Sender<String>,
    ) -> Self {
        let call_id = uuid::Uuid::new_v4().to_string();
        let current_turn = Arc::new(AtomicU64::new(0));

        let knowledge: Arc<dyn KnowledgeLookup> = Arc::new(ObservedKnowledge {
            inner: state.knowledge.clone(),
            events: state.events.clone(),
            call_id: call_id.clone(),
            current_turn: current_turn.clone(),
        });
        let relay = StreamingRelay::new(
            state.synthesizer.clone(),
            state.voice.clone(),
            state.audio.clone(),
        );
        let controller = TurnController::new(
            ConversationState::new(SYSTEM_PROMPT),
            state.reasoner.clone(),
            knowledge,
            relay,
            Arc::new(TwilioFrameSink::new(stream_sid.clone(), outbound.clone())),
            state.turn.clone(),
        );

        state.events.emit(
            &call_id,
            EventPayload::CallStarted {
                call_sid,
                stream_sid: stream_sid.clone(),
            },
        );

        Self {
            call_id,
            stream_sid,
            controller: Arc::new(Mutex::new(controller)),
            current_turn,
            events: state.events.clone(),
            outbound,
            barge_in: state.call.barge_in,
            turns: 0,
            running: Vec::new(),
            last_turn_done: None,
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Number of turns started so far.
    pub fn turns(&self) -> u64 {
        self.turns
    }

    /// Starts a turn for a finalized caller utterance.
    pub async fn on_transcript(&mut self, transcript: String) {
        self.running.retain(|t| !t.handle.is_finished());

        if self.barge_in && !self.running.is_empty() {
            self.interrupt(&transcript).await;
        }

        self.turns += 1;
        let turn = self.turns;
        tracing::info!(call_id = %self.call_id, turn, transcript = %transcript, "turn started");
        self.events.emit(
            &self.call_id,
            EventPayload::TurnStarted {
                turn,
                transcript: transcript.clone(),
            },
        );

        let sink = TwilioFrameSink::new(self.stream_sid.clone(), self.outbound.clone());
        let turn_sink = Arc::new(sink.clone());
        let controller = self.controller.clone();
        let current_turn = self.current_turn.clone();
        let events = self.events.clone();
        let call_id = self.call_id.clone();
        let previous = self.last_turn_done.take();
        let (done_tx, done_rx) = oneshot::channel::<()>();
        self.last_turn_done = Some(done_rx);

        let handle = tokio::spawn(async move {
            // Dropped when this task exits, finished or aborted.
            let _done = done_tx;
            // Turns run in arrival order.
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            let mut controller = controller.lock().await;
            current_turn.store(turn, Ordering::SeqCst);
            controller.set_sink(turn_sink);
            let result = controller.run_turn(&transcript).await;
            drop(controller);

            match result {
                Ok(outcome) => {
                    events.emit(
                        &call_id,
                        EventPayload::TurnCompleted {
                            turn,
                            iterations: outcome.iterations,
                            lookups: outcome.lookups,
                            frames: outcome.frames,
                            completed: outcome.completed,
                        },
                    );
                }
                Err(e) => {
                    events.emit(
                        &call_id,
                        EventPayload::TurnFailed {
                            turn,
                            error: e.to_string(),
                        },
                    );
                }
            }
        });

        self.running.push(RunningTurn { turn, sink, handle });
    }

    /// Cancels every unfinished turn and clears audio Twilio has buffered.
    async fn interrupt(&mut self, transcript: &str) {
        for running in self.running.drain(..) {
            if !cancel(running.sink, running.handle).await {
                continue;
            }

            tracing::info!(
                call_id = %self.call_id,
                turn = running.turn,
                "caller barged in; turn cancelled"
            );
            self.events.emit(
                &self.call_id,
                EventPayload::BargeIn {
                    interrupted_turn: running.turn,
                    transcript: transcript.to_string(),
                },
            );
            self.events.emit(
                &self.call_id,
                EventPayload::SpeechAborted {
                    turn: running.turn,
                    reason: "barge-in".to_string(),
                },
            );
        }

        match TwilioOutbound::clear(&self.stream_sid).to_json() {
            Ok(clear) => {
                if self.outbound.send(clear).await.is_err() {
                    tracing::warn!(call_id = %self.call_id, "media socket closed before clear");
                }
            }
            Err(e) => tracing::error!("failed to encode clear event: {}", e),
        }
    }

    /// Cancels whatever is still running and records `CALL_ENDED`.
    pub async fn end(mut self, reason: &str) {
        for running in self.running.drain(..) {
            if cancel(running.sink, running.handle).await {
                self.events.emit(
                    &self.call_id,
                    EventPayload::SpeechAborted {
                        turn: running.turn,
                        reason: "call ended".to_string(),
                    },
                );
            }
        }

        tracing::info!(call_id = %self.call_id, turns = self.turns, reason, "call ended");
        self.events.emit(
            &self.call_id,
            EventPayload::CallEnded {
                reason: reason.to_string(),
                turns: self.turns,
            },
        );
    }
}

/// Stops a turn task. Returns false if it had already run to completion.
async fn cancel(sink: TwilioFrameSink, handle: JoinHandle<()>) -> bool {
    handle.abort();
    sink.close();
    matches!(handle.await, Err(e) if e.is_cancelled())
}
