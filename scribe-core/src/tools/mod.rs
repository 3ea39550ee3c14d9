//! The functions the model may call, as a closed set of typed variants

mod vault_tools;

pub use vault_tools::VaultTools;

use async_trait::async_trait;
use llm::{ToolCall, ToolDefinition};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::error::ToolError;

#[derive(Clone, Debug, Deserialize, JsonSchema)]
pub struct WriteFileArgs {
    /// Vault-relative path of the Markdown file to create or overwrite, e.g. `recipes/chicken.md`
    pub path: String,
    /// Complete new content of the file, in Markdown
    pub content: String,
}

#[derive(Clone, Debug, Deserialize, JsonSchema)]
pub struct ClarifyArgs {
    /// Questions to be answered in a single string; each one must include a default answer
    pub questions_answers: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolKind {
    WriteFile,
    ClarifyingQuestions,
}

impl ToolKind {
    pub const ALL: [ToolKind; 2] = [ToolKind::WriteFile, ToolKind::ClarifyingQuestions];

    /// Function name as declared to the model
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::WriteFile => "writeFile",
            ToolKind::ClarifyingQuestions => "clarifyingQuestions",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn definition(&self) -> ToolDefinition {
        match self {
            ToolKind::WriteFile => ToolDefinition::from_args::<WriteFileArgs>(
                self.name(),
                "Create a Markdown (.md) file at a path with the given content, using proper \
                 Markdown formatting. If the file exists it is overwritten. The user reviews \
                 a diff and must confirm before anything is written.",
            ),
            ToolKind::ClarifyingQuestions => ToolDefinition::from_args::<ClarifyArgs>(
                self.name(),
                "Ask the user clarifying questions. Put every question on its own numbered \
                 line followed by a suggested answer, for example:\n\
                 1. Who is the poem for?\nr/ An unrequited love.\n\
                 2. What overall tone do you want?\nr/ Nostalgic.\n\
                 The user edits the answers and the result is returned as text.",
            ),
        }
    }
}

/// A decoded tool call, carrying its typed arguments.
#[derive(Clone, Debug)]
pub enum VaultTool {
    WriteFile(WriteFileArgs),
    ClarifyingQuestions(ClarifyArgs),
}

impl VaultTool {
    /// Decode a model tool call, accepting only the kinds in `enabled`.
    pub fn parse(call: &ToolCall, enabled: &[ToolKind]) -> Result<Self, ToolError> {
        let kind = ToolKind::from_name(&call.name)
            .filter(|kind| enabled.contains(kind))
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;

        let invalid = |source| ToolError::InvalidArguments {
            tool: call.name.clone(),
            source,
        };
        let args = call.arguments.clone();
        Ok(match kind {
            ToolKind::WriteFile => VaultTool::WriteFile(serde_json::from_value(args).map_err(invalid)?),
            ToolKind::ClarifyingQuestions => {
                VaultTool::ClarifyingQuestions(serde_json::from_value(args).map_err(invalid)?)
            }
        })
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            VaultTool::WriteFile(_) => ToolKind::WriteFile,
            VaultTool::ClarifyingQuestions(_) => ToolKind::ClarifyingQuestions,
        }
    }
}

/// Something that can run the model's tool calls.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Declarations sent with every model request
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Run one call to completion, including any wait on the user.
    /// `Ok` text is never empty.
    async fn execute(&self, call: &ToolCall) -> Result<String, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "c1".to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    #[test]
    fn test_parse_write_file() {
        let tool = VaultTool::parse(
            &call("writeFile", serde_json::json!({"path": "a.md", "content": "x"})),
            &ToolKind::ALL,
        )
        .unwrap();
        match tool {
            VaultTool::WriteFile(args) => {
                assert_eq!(args.path, "a.md");
                assert_eq!(args.content, "x");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unregistered_name_is_unknown() {
        let err = VaultTool::parse(&call("deleteEverything", serde_json::json!({})), &ToolKind::ALL)
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(ref n) if n == "deleteEverything"));
    }

    #[test]
    fn test_disabled_tool_is_unknown() {
        let err = VaultTool::parse(
            &call("clarifyingQuestions", serde_json::json!({"questions_answers": "?"})),
            &[ToolKind::WriteFile],
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));
    }

    #[test]
    fn test_missing_field_is_invalid_arguments() {
        let err = VaultTool::parse(&call("writeFile", serde_json::json!({"path": "a.md"})), &ToolKind::ALL)
            .unwrap_err();
        assert!(err.to_string().starts_with("Invalid arguments for writeFile"));
    }

    #[test]
    fn test_definitions_require_string_fields() {
        let def = ToolKind::WriteFile.definition();
        let schema = serde_json::to_value(&def.input_schema).unwrap();
        assert_eq!(def.name, "writeFile");
        assert_eq!(schema["properties"]["content"]["type"], "string");
        let required: Vec<_> = schema["required"].as_array().unwrap().iter().collect();
        assert_eq!(required.len(), 2);

        let def = ToolKind::ClarifyingQuestions.definition();
        let schema = serde_json::to_value(&def.input_schema).unwrap();
        assert_eq!(schema["required"][0], "questions_answers");
    }
}
