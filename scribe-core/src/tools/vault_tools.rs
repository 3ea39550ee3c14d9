use async_trait::async_trait;
use llm::{ToolCall, ToolDefinition};
use std::sync::Arc;

use super::{ClarifyArgs, ToolExecutor, ToolKind, VaultTool, WriteFileArgs};
use crate::error::ToolError;
use crate::gate::ConfirmationGate;
use crate::host::DialogHost;
use crate::vault::{Vault, VaultPath};

const NO_ANSWER: &str = "The user submitted the questions without any answer.";
const QUESTIONS_CANCELLED: &str = "The user cancelled the questions without answering.";

/// Executes `writeFile` and `clarifyingQuestions` against a vault and a host.
pub struct VaultTools {
    vault: Arc<dyn Vault>,
    host: Arc<dyn DialogHost>,
    enabled: Vec<ToolKind>,
}

impl VaultTools {
    pub fn new(vault: Arc<dyn Vault>, host: Arc<dyn DialogHost>) -> Self {
        Self {
            vault,
            host,
            enabled: ToolKind::ALL.to_vec(),
        }
    }

    /// Restrict the session to `kinds`; others are reported as unknown.
    pub fn only(mut self, kinds: &[ToolKind]) -> Self {
        self.enabled = kinds.to_vec();
        self
    }

    async fn write_file(&self, args: WriteFileArgs) -> Result<String, ToolError> {
        let path = VaultPath::parse(&args.path)?;
        let content = unescape_newlines(&args.content);
        let gate = ConfirmationGate::new(self.vault.as_ref(), self.host.as_ref());
        Ok(gate.request(path, content).await.message())
    }

    async fn clarify(&self, args: ClarifyArgs) -> Result<String, ToolError> {
        Ok(match self.host.ask(&args.questions_answers).await {
            Some(answer) if answer.trim().is_empty() => NO_ANSWER.to_string(),
            Some(answer) => answer,
            None => QUESTIONS_CANCELLED.to_string(),
        })
    }
}

/// Models sometimes send `\n` as two literal characters inside JSON strings.
fn unescape_newlines(content: &str) -> String {
    content.replace("\\n", "\n")
}

#[async_trait]
impl ToolExecutor for VaultTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.enabled.iter().map(ToolKind::definition).collect()
    }

    async fn execute(&self, call: &ToolCall) -> Result<String, ToolError> {
        let tool = VaultTool::parse(call, &self.enabled)?;
        tracing::debug!(tool = tool.kind().name(), call_id = %call.id, "Executing tool");
        match tool {
            VaultTool::WriteFile(args) => self.write_file(args).await,
            VaultTool::ClarifyingQuestions(args) => self.clarify(args).await,
        }
    }
}
