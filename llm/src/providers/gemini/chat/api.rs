use serde::{Deserialize, Serialize};

use crate::{ChatPayload, ChatRequest};

/// Prefix of tool call ids we invent; Gemini only sometimes returns its own.
const SYNTHETIC_ID_PREFIX: &str = "gemini_";

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ModelDefinition {
    pub(crate) name: String,

    pub(crate) version: Option<String>,

    pub(crate) display_name: Option<String>,

    pub(crate) description: Option<String>,

    pub(crate) input_token_limit: Option<u32>,

    pub(crate) output_token_limit: Option<u32>,

    pub(crate) supported_generation_methods: Option<Vec<String>>,
}

impl From<ModelDefinition> for crate::ModelDefinition {
    fn from(model: ModelDefinition) -> Self {
        let mut capabilities = Vec::new();

        for method in model.supported_generation_methods.iter().flatten() {
            match method.as_str() {
                // generateContent models accept images inline as well as text
                "generateContent" => {
                    if !capabilities.contains(&crate::ModelCapability::Text) {
                        capabilities.push(crate::ModelCapability::Text);
                    }
                    if !capabilities.contains(&crate::ModelCapability::Image) {
                        capabilities.push(crate::ModelCapability::Image);
                    }
                }
                _ => {}
            }
        }

        let id = model
            .name
            .strip_prefix("models/")
            .unwrap_or(&model.name)
            .to_string();
        match model.display_name {
            Some(display_name) => {
                crate::ModelDefinition::with_display_name(id, display_name, capabilities)
            }
            None => crate::ModelDefinition::new(id, capabilities),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListModelsResponse {
    #[serde(default)]
    pub(crate) models: Vec<ModelDefinition>,

    pub(crate) next_page_token: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[default]
    Model,
}

impl TryFrom<crate::api::Role> for Role {
    type Error = anyhow::Error;

    fn try_from(value: crate::api::Role) -> Result<Self, Self::Error> {
        match value {
            crate::api::Role::User => Ok(Role::User),
            // Function responses are sent back on the user side of the exchange.
            crate::api::Role::Tool => Ok(Role::User),
            crate::api::Role::Assistant => Ok(Role::Model),
            crate::api::Role::System => Err(anyhow::anyhow!(
                "Gemini does not support system messages directly."
            )),
        }
    }
}

impl From<Role> for crate::api::Role {
    fn from(value: Role) -> Self {
        match value {
            Role::User => crate::api::Role::User,
            Role::Model => crate::api::Role::Assistant,
        }
    }
}

/// Gemini inline data for images/audio
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InlineData {
    pub(crate) mime_type: String,
    pub(crate) data: String, // base64-encoded
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct GeminiFunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) args: serde_json::Value,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct GeminiFunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,
    pub(crate) name: String,
    pub(crate) response: serde_json::Value,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum PartType {
    Text(String),
    InlineData(InlineData),
    FunctionCall(GeminiFunctionCall),
    FunctionResponse(GeminiFunctionResponse),
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) thought: Option<bool>,

    #[serde(flatten)]
    pub(crate) data: PartType,

    #[serde(flatten)]
    pub(crate) extra: Option<serde_json::Value>,
}

impl Part {
    fn new(data: PartType) -> Self {
        Part {
            thought: None,
            data,
            extra: None,
        }
    }

    pub fn new_text(text: String) -> Self {
        Self::new(PartType::Text(text))
    }
}

fn provider_id(id: &str) -> Option<String> {
    (!id.starts_with(SYNTHETIC_ID_PREFIX)).then(|| id.to_string())
}

/// Convert one Gemini part into a content block. `call_index` numbers the
/// function calls of the enclosing content so each gets a distinct id.
fn part_to_block(part: &Part, call_index: usize) -> Option<crate::api::ContentBlock> {
    match &part.data {
        // Thought summaries are not part of the answer
        PartType::Text(_) if part.thought == Some(true) => None,
        PartType::Text(t) => Some(crate::api::ContentBlock::Text { text: t.clone() }),
        PartType::InlineData(data) => {
            if data.mime_type.starts_with("image/") {
                Some(crate::api::ContentBlock::Image {
                    data: data.data.clone(),
                    mime_type: data.mime_type.clone(),
                })
            } else if data.mime_type.starts_with("audio/") {
                Some(crate::api::ContentBlock::Audio {
                    data: data.data.clone(),
                    mime_type: data.mime_type.clone(),
                })
            } else {
                None
            }
        }
        PartType::FunctionCall(fc) => Some(crate::api::ContentBlock::ToolCall(crate::api::ToolCall {
            id: fc
                .id
                .clone()
                .unwrap_or_else(|| format!("{}{}_{}", SYNTHETIC_ID_PREFIX, call_index, fc.name)),
            name: fc.name.clone(),
            arguments: fc.args.clone(),
        })),
        PartType::FunctionResponse(fr) => Some(crate::api::ContentBlock::ToolResult(
            crate::api::ToolResult {
                tool_call_id: fr
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("{}{}", SYNTHETIC_ID_PREFIX, fr.name)),
                name: fr.name.clone(),
                content: vec![crate::api::ToolResultContent::Text {
                    text: serde_json::to_string(&fr.response).unwrap_or_default(),
                }],
            },
        )),
    }
}

/// Convert a ContentBlock to one or more Gemini Parts.
/// Tool results with multimodal content become multiple parts:
/// - functionResponse with text
/// - inlineData for each image/audio
fn content_block_to_parts(block: &crate::api::ContentBlock) -> Vec<Part> {
    match block {
        crate::api::ContentBlock::Text { text } => vec![Part::new_text(text.clone())],
        crate::api::ContentBlock::ToolCall(call) => {
            vec![Part::new(PartType::FunctionCall(GeminiFunctionCall {
                id: provider_id(&call.id),
                name: call.name.clone(),
                args: call.arguments.clone(),
            }))]
        }
        crate::api::ContentBlock::ToolResult(result) => {
            let mut parts = Vec::new();

            // Gemini requires function_response.response to be an object (Struct),
            // not a plain string. Wrap non-object values in a result object.
            let text = result.get_text();
            let response = match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(v) if v.is_object() => v,
                Ok(v) => serde_json::json!({ "result": v }),
                Err(_) => serde_json::json!({ "result": text }),
            };
            parts.push(Part::new(PartType::FunctionResponse(GeminiFunctionResponse {
                id: provider_id(&result.tool_call_id),
                name: result.name.clone(),
                response,
            })));

            for content in &result.content {
                match content {
                    crate::api::ToolResultContent::Image { data, mime_type }
                    | crate::api::ToolResultContent::Audio { data, mime_type } => {
                        parts.push(Part::new(PartType::InlineData(InlineData {
                            mime_type: mime_type.clone(),
                            data: data.clone(),
                        })));
                    }
                    crate::api::ToolResultContent::Text { .. } => {}
                }
            }

            parts
        }
        crate::api::ContentBlock::Image { data, mime_type }
        | crate::api::ContentBlock::Audio { data, mime_type } => {
            vec![Part::new(PartType::InlineData(InlineData {
                mime_type: mime_type.clone(),
                data: data.clone(),
            }))]
        }
    }
}

// Gemini representation of messages.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct Content {
    #[serde(default)]
    pub(crate) role: Role,
    #[serde(default)]
    pub(crate) parts: Vec<Part>,
}

impl Content {
    fn to_payload(&self) -> ChatPayload {
        let mut call_index = 0;
        let blocks = self
            .parts
            .iter()
            .filter_map(|p| {
                let block = part_to_block(p, call_index);
                if matches!(p.data, PartType::FunctionCall(_)) {
                    call_index += 1;
                }
                block
            })
            .collect();
        ChatPayload::new(blocks)
    }

    fn from_message(msg: &crate::ChatMessage) -> anyhow::Result<Self> {
        Ok(Content {
            role: msg.role.try_into()?,
            parts: msg.payload.content.iter().flat_map(content_block_to_parts).collect(),
        })
    }
}

impl From<&Content> for crate::ChatMessage {
    fn from(content: &Content) -> Self {
        crate::ChatMessage::new(content.role.into(), content.to_payload())
    }
}

impl From<&Content> for crate::ChatChunk {
    fn from(content: &Content) -> Self {
        crate::ChatChunk::new(content.role.into(), content.to_payload())
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct GeminiFunctionDeclaration {
    pub(crate) name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) description: Option<String>,
    pub(crate) parameters: serde_json::Value,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiTool {
    pub(crate) function_declarations: Vec<GeminiFunctionDeclaration>,
}

/// Keys that Gemini API does not support in JSON Schema
const UNSUPPORTED_SCHEMA_KEYS: &[&str] = &[
    "$schema",
    "$id",
    "$anchor",
    "$dynamicRef",
    "$dynamicAnchor",
    "$vocabulary",
    "$comment",
    "title",
    // $ref and $defs are handled separately: $ref is resolved, then both are removed
];

/// Sanitize a JSON Schema for Gemini API compatibility.
///
/// Gemini rejects schemas with advanced JSON Schema features like $schema, $ref, $defs, etc.
/// This function recursively removes unsupported keys and resolves $ref references by inlining
/// the referenced definitions.
fn sanitize_schema_for_gemini(schema: serde_json::Value) -> serde_json::Value {
    // $defs is JSON Schema draft 2019-09+, "definitions" is draft 4-7
    let defs = schema
        .as_object()
        .and_then(|obj| obj.get("$defs").or_else(|| obj.get("definitions")))
        .and_then(|d| d.as_object())
        .cloned();

    sanitize_schema_recursive(schema, defs.as_ref())
}

fn sanitize_schema_recursive(
    schema: serde_json::Value,
    defs: Option<&serde_json::Map<String, serde_json::Value>>,
) -> serde_json::Value {
    let obj = match schema {
        serde_json::Value::Object(obj) => obj,
        other => return other,
    };

    if let Some(ref_str) = obj.get("$ref").and_then(|r| r.as_str()) {
        let definition = ref_str
            .strip_prefix("#/$defs/")
            .or_else(|| ref_str.strip_prefix("#/definitions/"))
            .and_then(|name| defs.and_then(|d| d.get(name)));
        return match definition {
            Some(definition) => sanitize_schema_recursive(definition.clone(), defs),
            None => serde_json::json!({}),
        };
    }

    let mut result = serde_json::Map::new();
    for (key, value) in obj {
        if UNSUPPORTED_SCHEMA_KEYS.contains(&key.as_str())
            || key == "$defs"
            || key == "definitions"
        {
            continue;
        }

        let sanitized_value = match value {
            serde_json::Value::Object(_) => sanitize_schema_recursive(value, defs),
            serde_json::Value::Array(arr) => serde_json::Value::Array(
                arr.into_iter()
                    .map(|item| {
                        if item.is_object() {
                            sanitize_schema_recursive(item, defs)
                        } else {
                            item
                        }
                    })
                    .collect(),
            ),
            other => other,
        };
        result.insert(key, sanitized_value);
    }

    serde_json::Value::Object(result)
}

impl GeminiTool {
    fn from_definitions(tools: &[crate::api::ToolDefinition]) -> anyhow::Result<Self> {
        let function_declarations = tools
            .iter()
            .map(|t| {
                let raw_schema = serde_json::to_value(&t.input_schema)?;
                let parameters = sanitize_schema_for_gemini(raw_schema);
                tracing::trace!(tool_name = %t.name, schema = %parameters, "Gemini function declaration");

                Ok(GeminiFunctionDeclaration {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(GeminiTool {
            function_declarations,
        })
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentRequest {
    pub(crate) contents: Vec<Content>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) tools: Option<Vec<GeminiTool>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) system_instruction: Option<Content>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) generation_config: Option<serde_json::Value>,
}

impl TryFrom<&ChatRequest> for GenerateContentRequest {
    type Error = anyhow::Error;

    fn try_from(request: &ChatRequest) -> Result<Self, Self::Error> {
        // System messages go into the system_instruction field.
        let system_parts = request
            .messages
            .iter()
            .filter(|m| m.role == crate::api::Role::System)
            .flat_map(|m| m.payload.content.iter().flat_map(content_block_to_parts))
            .collect::<Vec<Part>>();
        let system_instruction = (!system_parts.is_empty()).then(|| Content {
            parts: system_parts,
            role: Role::User, // ignored for system instructions
        });

        let contents = request
            .messages
            .iter()
            .filter(|m| m.role != crate::api::Role::System)
            .map(Content::from_message)
            .collect::<anyhow::Result<Vec<Content>>>()?
            .into_iter()
            // Gemini rejects contents without parts
            .filter(|c| !c.parts.is_empty())
            .collect();

        let tools = match request.tools.as_deref() {
            Some(tools) if !tools.is_empty() => Some(vec![GeminiTool::from_definitions(tools)?]),
            _ => None,
        };

        Ok(GenerateContentRequest {
            contents,
            tools,
            system_instruction,
            generation_config: request
                .temperature
                .map(|t| serde_json::json!({ "temperature": t })),
        })
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Candidate {
    #[serde(default)]
    pub(crate) content: Option<Content>,

    pub(crate) finish_reason: Option<String>,

    #[serde(flatten)]
    pub(crate) extra: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub(crate) candidates: Vec<Candidate>,

    pub(crate) prompt_feedback: Option<serde_json::Value>,

    /// Set when the API reports a failure inside a 200 response (e.g. mid-stream)
    pub(crate) error: Option<ApiError>,

    #[serde(flatten)]
    pub(crate) extra: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct ApiError {
    #[serde(default)]
    pub(crate) code: Option<i64>,
    #[serde(default)]
    pub(crate) message: String,
    #[serde(default)]
    pub(crate) status: Option<String>,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Gemini error {} {}: {}",
            self.code.map(|c| c.to_string()).unwrap_or_default(),
            self.status.as_deref().unwrap_or("UNKNOWN"),
            self.message
        )
    }
}

impl GenerateContentResponse {
    fn first_content(&self) -> Option<&Content> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .filter(|c| !c.parts.is_empty())
    }

    /// Streamed chunk, if this event carried any content.
    ///
    /// Error events become `Err` so the turn fails instead of ending short.
    pub(crate) fn into_chunk(self) -> Option<anyhow::Result<crate::ChatChunk>> {
        if let Some(error) = self.error {
            return Some(Err(anyhow::anyhow!("{}", error)));
        }
        self.first_content().map(|c| Ok(crate::ChatChunk::from(c)))
    }
}

impl TryFrom<GenerateContentResponse> for crate::ChatMessage {
    type Error = anyhow::Error;

    fn try_from(response: GenerateContentResponse) -> Result<Self, Self::Error> {
        if let Some(error) = &response.error {
            anyhow::bail!("{}", error);
        }
        if let Some(content) = response.first_content() {
            return Ok(content.into());
        }
        match response.candidates.first() {
            Some(candidate) => Err(anyhow::anyhow!(
                "Gemini returned no content (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("none")
            )),
            None => Err(anyhow::anyhow!(
                "Gemini returned no candidates (prompt feedback: {})",
                response
                    .prompt_feedback
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| "none".to_string())
            )),
        }
    }
}
