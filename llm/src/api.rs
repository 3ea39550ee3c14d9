use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Deserialize, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[default]
    Assistant,
    System,
    /// Carries tool results back to the model
    Tool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: schemars::schema::RootSchema,
}

impl ToolDefinition {
    /// Build a definition whose input schema is derived from the argument type.
    pub fn from_args<T: JsonSchema>(name: impl Into<String>, description: impl Into<String>) -> Self {
        ToolDefinition {
            name: name.into(),
            description: Some(description.into()),
            input_schema: schemars::schema_for!(T),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Content within a tool result - can be text, images, audio, etc.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResultContent {
    Text { text: String },
    Image { data: String, mime_type: String },
    Audio { data: String, mime_type: String },
}

impl ToolResultContent {
    pub fn text(text: impl Into<String>) -> Self {
        ToolResultContent::Text { text: text.into() }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    /// Name of the tool that produced this result; providers that do not
    /// use call ids (Gemini) attribute the response by name.
    pub name: String,
    pub content: Vec<ToolResultContent>,
}

impl ToolResult {
    /// Get text content from this tool result, concatenated
    pub fn get_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                ToolResultContent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { data: String, mime_type: String },
    Audio { data: String, mime_type: String },
    ToolCall(ToolCall),
    ToolResult(ToolResult),
}

impl ContentBlock {
    /// Get the mime_type for media content blocks
    pub fn mime_type(&self) -> Option<&str> {
        match self {
            ContentBlock::Image { mime_type, .. } => Some(mime_type),
            ContentBlock::Audio { mime_type, .. } => Some(mime_type),
            _ => None,
        }
    }

    /// Inline media block from raw bytes; the mime type picks image vs audio.
    pub fn media(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        let mime_type = mime_type.into();
        let data = BASE64.encode(bytes);
        if mime_type.starts_with("image/") {
            ContentBlock::Image { data, mime_type }
        } else {
            ContentBlock::Audio { data, mime_type }
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct ChatPayload {
    pub content: Vec<ContentBlock>,
}

impl From<&String> for ChatPayload {
    fn from(text: &String) -> Self {
        ChatPayload::text(text)
    }
}

impl From<String> for ChatPayload {
    fn from(text: String) -> Self {
        ChatPayload::text(text)
    }
}

impl From<&str> for ChatPayload {
    fn from(text: &str) -> Self {
        ChatPayload::text(text)
    }
}

impl ChatPayload {
    pub fn new(content: Vec<ContentBlock>) -> Self {
        ChatPayload { content }
    }

    pub fn text(text: impl Into<String>) -> Self {
        ChatPayload {
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn with_tool_calls(text: String, tool_calls: Vec<ToolCall>) -> Self {
        let mut content = Vec::with_capacity(tool_calls.len() + 1);
        if !text.is_empty() {
            content.push(ContentBlock::Text { text });
        }
        content.extend(tool_calls.into_iter().map(ContentBlock::ToolCall));
        ChatPayload { content }
    }

    /// Create a simple text-only tool result
    pub fn tool_result_text(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        ChatPayload {
            content: vec![ContentBlock::ToolResult(ToolResult {
                tool_call_id: tool_call_id.into(),
                name: name.into(),
                content: vec![ToolResultContent::text(text)],
            })],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn get_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn get_tool_calls(&self) -> Vec<&ToolCall> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    pub fn get_tool_results(&self) -> Vec<&ToolResult> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolResult(result) => Some(result),
                _ => None,
            })
            .collect()
    }

    /// Rename repeated tool call ids by appending `_<n>`.
    ///
    /// Streamed turns are assembled from chunks that each number their own
    /// calls, so two chunks can hand out the same id.
    pub fn dedupe_tool_call_ids(&mut self) {
        let mut seen = std::collections::HashSet::new();
        for block in &mut self.content {
            if let ContentBlock::ToolCall(call) = block {
                let mut candidate = call.id.clone();
                let mut n = 1;
                while !seen.insert(candidate.clone()) {
                    candidate = format!("{}_{}", call.id, n);
                    n += 1;
                }
                call.id = candidate;
            }
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: Role,
    #[serde(flatten)]
    pub payload: ChatPayload,
}

impl ChatMessage {
    pub fn new(role: Role, payload: ChatPayload) -> Self {
        Self { role, payload }
    }

    pub fn user(payload: ChatPayload) -> Self {
        Self::new(Role::User, payload)
    }

    pub fn assistant(payload: ChatPayload) -> Self {
        Self::new(Role::Assistant, payload)
    }

    pub fn system(payload: ChatPayload) -> Self {
        Self::new(Role::System, payload)
    }

    pub fn tool(payload: ChatPayload) -> Self {
        Self::new(Role::Tool, payload)
    }

    pub fn get_text(&self) -> String {
        self.payload.get_text()
    }

    pub fn get_tool_calls(&self) -> Vec<&ToolCall> {
        self.payload.get_tool_calls()
    }

    pub fn get_tool_results(&self) -> Vec<&ToolResult> {
        self.payload.get_tool_results()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChatChunk {
    pub role: Role,
    #[serde(flatten)]
    pub payload: ChatPayload,
}

impl ChatChunk {
    pub fn new(role: Role, payload: ChatPayload) -> Self {
        Self { role, payload }
    }

    pub fn get_text(&self) -> String {
        self.payload.get_text()
    }
}

impl From<ChatChunk> for ChatMessage {
    fn from(chunk: ChatChunk) -> Self {
        ChatMessage {
            role: chunk.role,
            payload: chunk.payload,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChatRequest {
    pub(crate) messages: Vec<ChatMessage>,
    pub(crate) tools: Option<Vec<ToolDefinition>>,
    pub(crate) temperature: Option<f32>,
}

impl ChatRequest {
    /// Create a new chat request from an iterator of message references
    ///
    /// Messages are cloned only once when constructing the request.
    pub fn new<'a>(messages: impl IntoIterator<Item = &'a ChatMessage>) -> Self {
        ChatRequest {
            messages: messages.into_iter().cloned().collect(),
            tools: None,
            temperature: None,
        }
    }

    /// Create a chat request with tool definitions
    pub fn with_tools<'a>(
        messages: impl IntoIterator<Item = &'a ChatMessage>,
        tools: Vec<ToolDefinition>,
    ) -> Self {
        ChatRequest {
            messages: messages.into_iter().cloned().collect(),
            tools: Some(tools),
            temperature: None,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn tools(&self) -> Option<&[ToolDefinition]> {
        self.tools.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, Serialize, JsonSchema)]
    struct TestInput {
        /// Where to look
        path: String,
    }

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: serde_json::json!({}),
        }
    }

    #[test]
    fn test_chat_payload_with_tool_calls() {
        let payload = ChatPayload::with_tool_calls(
            "Writing the note.".to_string(),
            vec![call("call_1", "writeFile")],
        );

        assert_eq!(payload.get_text(), "Writing the note.");
        assert_eq!(payload.content.len(), 2);
        assert_eq!(payload.get_tool_calls()[0].name, "writeFile");
    }

    #[test]
    fn test_tool_calls_without_text_have_no_empty_text_block() {
        let payload = ChatPayload::with_tool_calls(String::new(), vec![call("c", "writeFile")]);
        assert_eq!(payload.content.len(), 1);
        assert!(matches!(payload.content[0], ContentBlock::ToolCall(_)));
    }

    #[test]
    fn test_tool_result_carries_name_and_text() {
        let msg = ChatMessage::tool(ChatPayload::tool_result_text(
            "call_123",
            "writeFile",
            "File created",
        ));

        assert_eq!(msg.role, Role::Tool);
        let results = msg.get_tool_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tool_call_id, "call_123");
        assert_eq!(results[0].name, "writeFile");
        assert_eq!(results[0].get_text(), "File created");
    }

    #[test]
    fn test_media_block_picks_kind_from_mime() {
        let image = ContentBlock::media(b"png", "image/png");
        let audio = ContentBlock::media(b"wav", "audio/wav");
        assert!(matches!(image, ContentBlock::Image { .. }));
        assert!(matches!(audio, ContentBlock::Audio { ref data, .. } if data == "d2F2"));
        assert_eq!(audio.mime_type(), Some("audio/wav"));
    }

    #[test]
    fn test_dedupe_tool_call_ids() {
        let mut payload = ChatPayload::with_tool_calls(
            String::new(),
            vec![call("gemini_0_writeFile", "writeFile"), call("gemini_0_writeFile", "writeFile")],
        );
        payload.dedupe_tool_call_ids();
        let ids: Vec<_> = payload.get_tool_calls().iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, vec!["gemini_0_writeFile", "gemini_0_writeFile_1"]);
    }

    #[test]
    fn test_tool_definition_from_args() {
        let def = ToolDefinition::from_args::<TestInput>("lookup", "Looks things up");
        let schema = serde_json::to_value(&def.input_schema).unwrap();
        assert_eq!(def.name, "lookup");
        assert_eq!(schema["properties"]["path"]["type"], "string");
        assert_eq!(schema["required"][0], "path");
    }

    #[test]
    fn test_chat_request_with_tools() {
        let messages = vec![ChatMessage::user(ChatPayload::text("Write a poem"))];
        let tool = ToolDefinition::from_args::<TestInput>("lookup", "Looks things up");

        let request = ChatRequest::with_tools(&messages, vec![tool]).temperature(0.2);

        assert_eq!(request.messages().len(), 1);
        assert_eq!(request.tools().map(|t| t.len()), Some(1));
        assert_eq!(request.temperature, Some(0.2));
    }

    #[test]
    fn test_tool_call_serialization() {
        let block = ContentBlock::ToolCall(call("call_abc", "writeFile"));
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains("\"type\":\"tool_call\""));
        assert!(json.contains("\"name\":\"writeFile\""));
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
        let msg: ChatMessage = serde_json::from_str(r#"{"content":[]}"#).unwrap();
        assert_eq!(msg.role, Role::Assistant);
    }
}
