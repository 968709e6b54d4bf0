use callbridge_types::{AgentOutput, ChatMessage, TurnFlags};

/// Per-call conversation history plus the flags from the latest reasoning step.
///
/// The system prompt sits at index 0 and never moves; everything after it is
/// append-only.
#[derive(Debug, Clone)]
pub struct ConversationState {
    history: Vec<ChatMessage>,
    turn_flags: TurnFlags,
}

impl ConversationState {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            history: vec![ChatMessage::system(system_prompt)],
            turn_flags: TurnFlags::default(),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn turn_flags(&self) -> TurnFlags {
        self.turn_flags
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Always false: the system prompt is never removed.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Appends a caller utterance or injected context.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::user(content));
    }

    /// Appends the assistant's response and adopts its flags.
    pub fn record_output(&mut self, output: &AgentOutput) -> TurnFlags {
        self.history.push(ChatMessage::assistant(output.response.clone()));
        self.turn_flags = output.flags();
        self.turn_flags
    }
}
