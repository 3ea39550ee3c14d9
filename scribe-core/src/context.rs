//! Conversation history owned by one agent loop

use llm::{ChatMessage, ChatPayload, Role, ToolCall};

/// Read-only view of conversation messages
pub trait ConversationContext {
    fn iter(&self) -> impl Iterator<Item = &ChatMessage>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered turns of one conversation thread.
///
/// The first `seed_len` messages are context (e.g. the vault dump), replaced
/// as a whole by [`Conversation::reseed`].
#[derive(Clone, Debug, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    seed_len: usize,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(seed: Vec<ChatMessage>) -> Self {
        let seed_len = seed.len();
        Self {
            messages: seed,
            seed_len,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn seed_len(&self) -> usize {
        self.seed_len
    }

    pub fn push_user(&mut self, payload: ChatPayload) {
        self.messages.push(ChatMessage::user(payload));
    }

    pub fn push_model(&mut self, mut message: ChatMessage) {
        message.role = Role::Assistant;
        self.messages.push(message);
    }

    /// Tool calls of the latest turn if that turn came from the model.
    pub fn pending_tool_calls(&self) -> Vec<ToolCall> {
        match self.messages.last() {
            Some(last) if last.role == Role::Assistant => {
                last.get_tool_calls().into_iter().cloned().collect()
            }
            _ => Vec::new(),
        }
    }

    /// Append the results for the latest model turn.
    ///
    /// Every result must answer a call that turn made.
    pub fn push_tool_results(&mut self, payload: ChatPayload) -> anyhow::Result<()> {
        let requested = self.pending_tool_calls();
        anyhow::ensure!(
            !requested.is_empty(),
            "tool results must follow a model turn that requested tools"
        );
        for result in payload.get_tool_results() {
            anyhow::ensure!(
                requested
                    .iter()
                    .any(|c| c.id == result.tool_call_id && c.name == result.name),
                "no pending call {} ({}) for this tool result",
                result.tool_call_id,
                result.name
            );
        }
        self.messages.push(ChatMessage::tool(payload));
        Ok(())
    }

    /// Text of the most recent model turn that had any.
    pub fn last_model_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.get_text())
            .find(|t| !t.trim().is_empty())
    }

    /// Replace the seed, dropping the rest of the history.
    pub fn reseed(&mut self, seed: Vec<ChatMessage>) {
        *self = Self::with_seed(seed);
    }
}

impl ConversationContext for Conversation {
    fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    fn len(&self) -> usize {
        self.messages.len()
    }
}
