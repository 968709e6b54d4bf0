//! Per-utterance turn control.
//!
//! One call owns one [`TurnController`]. Each finalized caller transcript
//! runs through [`TurnController::run_turn`], which alternates reasoning,
//! speech and knowledge lookups until the reasoning engine yields the floor
//! or the iteration bound is reached.

use crate::config::TurnConfig;
use crate::conversation::ConversationState;
use crate::error::AgentError;
use crate::knowledge::KnowledgeLookup;
use crate::reasoning::ReasoningEngine;
use callbridge_voice::{FrameSink, StreamingRelay, VoiceError};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Position of the controller within the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnState {
    AwaitReasoning,
    Speaking,
    AwaitKnowledge,
    TurnDone,
}

/// Summary of a finished turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    /// Reasoning invocations made.
    pub iterations: usize,
    /// Knowledge lookups made.
    pub lookups: usize,
    /// Frames delivered to the sink across all speech acts.
    pub frames: usize,
    /// False when the turn stopped at the iteration bound.
    pub completed: bool,
}

/// A speech act running in the background.
///
/// Each act first waits for the one before it, so frames from one turn never
/// interleave. Dropping the guard aborts the act and, transitively, every
/// act chained behind it.
struct SpeechTask {
    handle: JoinHandle<Result<usize, AgentError>>,
}

impl SpeechTask {
    fn spawn(
        relay: StreamingRelay,
        sink: Arc<dyn FrameSink>,
        text: String,
        previous: Option<SpeechTask>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut frames = 0;
            if let Some(previous) = previous {
                frames += previous.join().await?;
            }
            frames += relay.speak(&text, sink.as_ref()).await?;
            Ok(frames)
        });
        Self { handle }
    }

    fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    async fn join(mut self) -> Result<usize, AgentError> {
        match (&mut self.handle).await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(VoiceError::Synthesis(
                "speech task cancelled".to_string(),
            )
            .into()),
            Err(e) => Err(VoiceError::Synthesis(format!("speech task failed: {}", e)).into()),
        }
    }
}

impl Drop for SpeechTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Drives reasoning, knowledge lookup and speech for one call.
pub struct TurnController {
    conversation: ConversationState,
    reasoner: Arc<dyn ReasoningEngine>,
    knowledge: Arc<dyn KnowledgeLookup>,
    relay: StreamingRelay,
    sink: Arc<dyn FrameSink>,
    config: TurnConfig,
    state: TurnState,
}

impl std::fmt::Debug for TurnController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnController")
            .field("conversation", &self.conversation)
            .field("relay", &self.relay)
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl TurnController {
    pub fn new(
        conversation: ConversationState,
        reasoner: Arc<dyn ReasoningEngine>,
        knowledge: Arc<dyn KnowledgeLookup>,
        relay: StreamingRelay,
        sink: Arc<dyn FrameSink>,
        config: TurnConfig,
    ) -> Self {
        Self {
            conversation,
            reasoner,
            knowledge,
            relay,
            sink,
            config,
            state: TurnState::TurnDone,
        }
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Replaces the frame sink used by subsequent speech acts.
    pub fn set_sink(&mut self, sink: Arc<dyn FrameSink>) {
        self.sink = sink;
    }

    fn transition(&mut self, next: TurnState) {
        debug!(from = ?self.state, to = ?next, "turn state");
        self.state = next;
    }

    /// Runs one conversational turn for a finalized caller transcript.
    ///
    /// Any reasoning, lookup or speech failure aborts the turn and cancels
    /// speech still in flight. The conversation keeps what was appended
    /// before the failure, so the next turn can proceed.
    pub async fn run_turn(&mut self, transcript: &str) -> Result<TurnOutcome, AgentError> {
        let result = self.drive(transcript).await;
        self.transition(TurnState::TurnDone);
        match &result {
            Ok(outcome) => info!(
                iterations = outcome.iterations,
                lookups = outcome.lookups,
                frames = outcome.frames,
                completed = outcome.completed,
                "turn finished"
            ),
            Err(e) => warn!(error = %e, "turn aborted"),
        }
        result
    }

    async fn drive(&mut self, transcript: &str) -> Result<TurnOutcome, AgentError> {
        if self.config.max_iterations == 0 {
            return Err(AgentError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        self.transition(TurnState::AwaitReasoning);
        self.conversation.push_user(transcript);

        let mut speech: Option<SpeechTask> = None;
        let mut outcome = TurnOutcome {
            iterations: 0,
            lookups: 0,
            frames: 0,
            completed: false,
        };

        while outcome.iterations < self.config.max_iterations {
            // Surface a failed speech act before spending another reasoning call.
            if speech.as_ref().is_some_and(SpeechTask::is_finished) {
                if let Some(done) = speech.take() {
                    outcome.frames += done.join().await?;
                }
            }

            self.transition(TurnState::AwaitReasoning);
            outcome.iterations += 1;
            let output = self.reasoner.infer(self.conversation.history()).await?;
            let flags = self.conversation.record_output(&output);

            if !output.response.trim().is_empty() {
                self.transition(TurnState::Speaking);
                speech = Some(SpeechTask::spawn(
                    self.relay.clone(),
                    self.sink.clone(),
                    output.response,
                    speech.take(),
                ));
            }

            if flags.needs_knowledge_lookup {
                // No iteration is left to answer from the context.
                if outcome.iterations == self.config.max_iterations {
                    debug!("lookup requested on the last iteration; skipped");
                    break;
                }
                if flags.turn_complete {
                    debug!("both flags set; looking up knowledge first");
                }
                self.transition(TurnState::AwaitKnowledge);
                let context = self
                    .knowledge
                    .lookup(transcript, self.config.knowledge_top_k)
                    .await?;
                self.conversation.push_user(context);
                outcome.lookups += 1;
                continue;
            }

            if flags.turn_complete {
                outcome.completed = true;
                break;
            }
        }

        if !outcome.completed {
            warn!(
                max_iterations = self.config.max_iterations,
                "turn stopped at iteration bound"
            );
        }

        if let Some(last) = speech.take() {
            outcome.frames += last.join().await?;
        }
        Ok(outcome)
    }
}
