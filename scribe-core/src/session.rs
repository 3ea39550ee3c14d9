//! One conversation with the model over a vault
//!
//! `VaultSession` is the explicit context handed to the agent loop: the vault,
//! the dialog host, the model and the history. Nothing else is reachable from
//! inside the loop.

use llm::{ChatMessage, ChatModel, ChatPayload, ContentBlock};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use crate::agents::{AgentEvent, AgentMode, AgentOutcome, ToolAgent};
use crate::context::Conversation;
use crate::error::VaultError;
use crate::host::DialogHost;
use crate::tools::{ToolKind, VaultTools};
use crate::vault::Vault;

pub const CONTEXT_HEADER: &str = "User data:";
pub const CONTEXT_FOOTER: &str = "END OF DATA";
pub const CONTEXT_ACK: &str = "Information received. How can I help you?";

/// Sampling temperature for agent turns
pub const AGENT_TEMPERATURE: f32 = 0.2;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub max_iterations: usize,
    pub mode: AgentMode,
    /// Seed the conversation with the content of every note
    pub load_context: bool,
    pub tools: Vec<ToolKind>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_iterations: config::DEFAULT_MAX_ITERATIONS,
            mode: AgentMode::Chat,
            load_context: true,
            tools: ToolKind::ALL.to_vec(),
        }
    }
}

/// Seed turns describing every Markdown file in the vault.
///
/// One user turn holding a header, one fenced part per file and a footer,
/// followed by a model acknowledgement.
pub async fn vault_context(vault: &dyn Vault) -> Result<Vec<ChatMessage>, VaultError> {
    let mut blocks = vec![ContentBlock::Text {
        text: CONTEXT_HEADER.to_string(),
    }];
    for path in vault.markdown_files().await? {
        let content = match vault.read(&path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Skipping unreadable note in vault context");
                continue;
            }
        };
        blocks.push(ContentBlock::Text {
            text: format!("[{}]\n```\n{}\n```", path, content),
        });
    }
    blocks.push(ContentBlock::Text {
        text: CONTEXT_FOOTER.to_string(),
    });

    Ok(vec![
        ChatMessage::user(ChatPayload::new(blocks)),
        ChatMessage::assistant(ChatPayload::text(CONTEXT_ACK)),
    ])
}

pub struct VaultSession {
    vault: Arc<dyn Vault>,
    host: Arc<dyn DialogHost>,
    model: Arc<dyn ChatModel + Send + Sync>,
    conversation: Conversation,
    config: SessionConfig,
    events: Option<UnboundedSender<AgentEvent>>,
}

impl VaultSession {
    pub fn new(
        vault: Arc<dyn Vault>,
        host: Arc<dyn DialogHost>,
        model: Arc<dyn ChatModel + Send + Sync>,
        config: SessionConfig,
    ) -> Self {
        Self {
            vault,
            host,
            model,
            conversation: Conversation::new(),
            config,
            events: None,
        }
    }

    pub fn with_events(mut self, tx: UnboundedSender<AgentEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Build a session and load the vault context if enabled
    pub async fn start(
        vault: Arc<dyn Vault>,
        host: Arc<dyn DialogHost>,
        model: Arc<dyn ChatModel + Send + Sync>,
        config: SessionConfig,
    ) -> anyhow::Result<Self> {
        let mut session = Self::new(vault, host, model, config);
        session.reset().await?;
        Ok(session)
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Replace the seed with a fresh dump of the vault.
    pub async fn seed_vault_context(&mut self) -> anyhow::Result<usize> {
        let seed = vault_context(self.vault.as_ref()).await?;
        let files = seed
            .first()
            .map(|m| m.payload.content.len().saturating_sub(2))
            .unwrap_or(0);
        self.conversation.reseed(seed);
        tracing::info!(files, "Loaded vault context");
        Ok(files)
    }

    /// Start over: drop the history and, if enabled, reload the vault.
    pub async fn reset(&mut self) -> anyhow::Result<()> {
        if self.config.load_context {
            self.seed_vault_context().await?;
        } else {
            self.conversation.reseed(Vec::new());
        }
        Ok(())
    }

    /// Report an event on the session's channel, if any.
    pub fn notify(&self, event: AgentEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    pub async fn send_text(&mut self, text: &str) -> anyhow::Result<AgentOutcome> {
        self.send(ChatPayload::text(text)).await
    }

    /// Run the agent on a new user turn.
    ///
    /// If the run fails the history is rolled back to before the turn.
    pub async fn send(&mut self, payload: ChatPayload) -> anyhow::Result<AgentOutcome> {
        let checkpoint = self.conversation.clone();
        self.conversation.push_user(payload);

        let tools = VaultTools::new(self.vault.clone(), self.host.clone()).only(&self.config.tools);
        let mut agent = ToolAgent::new(Arc::new(tools), self.config.max_iterations)
            .mode(self.config.mode)
            .temperature(AGENT_TEMPERATURE);
        if let Some(tx) = &self.events {
            agent = agent.events(tx.clone());
        }

        match agent.run(&mut self.conversation, self.model.as_ref()).await {
            Ok(outcome) => {
                tracing::info!(
                    iterations = outcome.iterations,
                    stop = ?outcome.stop,
                    "Agent run finished"
                );
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(error = %e, "Agent run failed");
                self.conversation = checkpoint;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::{FsVault, MemoryVault};

    #[tokio::test]
    async fn test_vault_context_layout() {
        let vault = MemoryVault::new()
            .with_file("b.md", "second")
            .with_file("a/first.md", "first")
            .with_file("image.png", "binary");

        let seed = vault_context(&vault).await.unwrap();

        assert_eq!(seed.len(), 2);
        let texts: Vec<String> = seed[0]
            .payload
            .content
            .iter()
            .map(|b| match b {
                ContentBlock::Text { text } => text.clone(),
                _ => String::new(),
            })
            .collect();
        assert_eq!(
            texts,
            vec![
                CONTEXT_HEADER.to_string(),
                "[a/first.md]\n```\nfirst\n```".to_string(),
                "[b.md]\n```\nsecond\n```".to_string(),
                CONTEXT_FOOTER.to_string(),
            ]
        );
        assert_eq!(seed[1].get_text(), CONTEXT_ACK);
    }

    #[tokio::test]
    async fn test_unreadable_note_is_left_out_of_the_seed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.md"), "fine").unwrap();
        std::fs::write(dir.path().join("old.md"), b"caf\xe9").unwrap();

        let seed = vault_context(&FsVault::new(dir.path())).await.unwrap();

        let text = seed[0].get_text();
        assert!(text.contains("[good.md]"));
        assert!(!text.contains("[old.md]"));
        assert_eq!(seed[0].payload.content.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_vault_still_seeds() {
        let seed = vault_context(&MemoryVault::new()).await.unwrap();
        assert_eq!(seed[0].payload.content.len(), 2);
    }
}
