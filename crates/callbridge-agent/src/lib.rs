//! Conversational side of callbridge: history, reasoning, knowledge lookup
//! and the per-turn state machine that drives speech output.

pub mod config;
pub mod conversation;
pub mod error;
pub mod knowledge;
pub mod prompts;
pub mod reasoning;
pub mod turn;

pub use config::{KnowledgeConfig, ReasoningConfig, TurnConfig};
pub use conversation::ConversationState;
pub use error::AgentError;
pub use knowledge::{chunk_text, context_block, point_id, KnowledgeLookup, QdrantKnowledge};
pub use prompts::SYSTEM_PROMPT;
pub use reasoning::{OpenAiReasoner, ReasoningEngine};
pub use turn::{TurnController, TurnOutcome, TurnState};
