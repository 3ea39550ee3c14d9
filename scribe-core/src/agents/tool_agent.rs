//! Multi-turn agent with tool calling support

use futures::StreamExt;
use llm::{ChatMessage, ChatModel, ChatPayload, ChatRequest, ContentBlock, Role, ToolCall, ToolResult, ToolResultContent};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use crate::context::{Conversation, ConversationContext};
use crate::error::ToolError;
use crate::tools::ToolExecutor;

const NOT_EXECUTED: &str = "Not executed: iteration limit reached";

/// How each model request is made.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AgentMode {
    #[default]
    Chat,
    Stream,
}

/// Progress reported while the loop runs.
#[derive(Clone, Debug)]
pub enum AgentEvent {
    /// Streamed piece of model text (stream mode only)
    TextDelta(String),
    /// Complete text of a model turn
    ModelText(String),
    ToolRequested(ToolCall),
    ToolFinished {
        call_id: String,
        name: String,
        result: String,
    },
    /// The ceiling was hit; the value is the number of tool rounds run.
    IterationLimit(usize),
    /// Instruction understood from a voice memo, sent before the loop starts
    Transcribed(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    IterationLimit,
}

#[derive(Clone, Debug)]
pub struct AgentOutcome {
    pub text: String,
    /// Tool rounds executed
    pub iterations: usize,
    pub stop: StopReason,
}

enum LoopState {
    AwaitingModel,
    HasToolCalls,
    ExecutingTools(Vec<ToolCall>),
    Done(StopReason),
}

/// Multi-turn agent with tool calling support
///
/// Asks the model, runs the tool calls it returns in emission order, feeds
/// the results back and repeats until:
/// - The model returns a response without tool calls, OR
/// - `max_iterations` tool rounds have run
///
/// Each tool call fully resolves (including any wait on the user) before the
/// next one starts.
pub struct ToolAgent {
    tools: Arc<dyn ToolExecutor>,
    max_iterations: usize,
    mode: AgentMode,
    temperature: Option<f32>,
    events: Option<UnboundedSender<AgentEvent>>,
}

impl ToolAgent {
    pub fn new(tools: Arc<dyn ToolExecutor>, max_iterations: usize) -> Self {
        Self {
            tools,
            max_iterations,
            mode: AgentMode::Chat,
            temperature: None,
            events: None,
        }
    }

    pub fn mode(mut self, mode: AgentMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn events(mut self, tx: UnboundedSender<AgentEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Drive the conversation to a final answer.
    ///
    /// Model and network failures end the run with an error; tool failures are
    /// reported to the model as the tool's result instead.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        model: &(dyn ChatModel + Send + Sync),
    ) -> anyhow::Result<AgentOutcome> {
        let mut iterations = 0;
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    let response = self.ask_model(conversation, model).await?;
                    let text = response.get_text();
                    if !text.trim().is_empty() {
                        self.emit(AgentEvent::ModelText(text));
                    }
                    conversation.push_model(response);
                    LoopState::HasToolCalls
                }
                LoopState::HasToolCalls => {
                    let calls = conversation.pending_tool_calls();
                    if calls.is_empty() {
                        LoopState::Done(StopReason::Completed)
                    } else if iterations >= self.max_iterations {
                        tracing::warn!(
                            "ToolAgent reached max iterations ({}), stopping",
                            self.max_iterations
                        );
                        self.emit(AgentEvent::IterationLimit(iterations));
                        let skipped = calls
                            .iter()
                            .map(|call| tool_result(call, NOT_EXECUTED))
                            .collect();
                        conversation.push_tool_results(ChatPayload::new(skipped))?;
                        LoopState::Done(StopReason::IterationLimit)
                    } else {
                        LoopState::ExecutingTools(calls)
                    }
                }
                LoopState::ExecutingTools(calls) => {
                    iterations += 1;
                    let mut results = Vec::with_capacity(calls.len());
                    for call in calls {
                        let text = self.execute_tool(&call).await;
                        self.emit(AgentEvent::ToolFinished {
                            call_id: call.id.clone(),
                            name: call.name.clone(),
                            result: text.clone(),
                        });
                        results.push(tool_result(&call, &text));
                    }
                    conversation.push_tool_results(ChatPayload::new(results))?;
                    LoopState::AwaitingModel
                }
                LoopState::Done(stop) => {
                    return Ok(AgentOutcome {
                        text: final_text(conversation, stop, iterations),
                        iterations,
                        stop,
                    });
                }
            };
        }
    }

    async fn execute_tool(&self, call: &ToolCall) -> String {
        self.emit(AgentEvent::ToolRequested(call.clone()));
        match self.tools.execute(call).await {
            Ok(text) if text.trim().is_empty() => format!("{} finished with no output.", call.name),
            Ok(text) => text,
            Err(e) => {
                if matches!(e, ToolError::UnknownTool(_)) {
                    tracing::warn!(tool = %call.name, "Model called an unknown tool");
                } else {
                    tracing::warn!(tool = %call.name, error = %e, "Tool call failed");
                }
                format!("Error: {}", e)
            }
        }
    }

    async fn ask_model(
        &self,
        conversation: &Conversation,
        model: &(dyn ChatModel + Send + Sync),
    ) -> anyhow::Result<ChatMessage> {
        let mut request = ChatRequest::with_tools(conversation.iter(), self.tools.definitions());
        if let Some(temperature) = self.temperature {
            request = request.temperature(temperature);
        }
        tracing::debug!(
            model = model.name(),
            turns = conversation.len(),
            mode = ?self.mode,
            "Requesting model turn"
        );

        let response = match self.mode {
            AgentMode::Chat => model.chat(&request).await?,
            AgentMode::Stream => {
                let mut stream = model.stream_chat(&request).await?;
                let mut accumulated = ChatMessage::new(Role::Assistant, ChatPayload::default());
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk?;
                    let delta = chunk.get_text();
                    if !delta.is_empty() {
                        self.emit(AgentEvent::TextDelta(delta));
                    }
                    accumulated.payload.content.extend(chunk.payload.content);
                }
                accumulated.payload.dedupe_tool_call_ids();
                accumulated
            }
        };
        // An empty model turn cannot be sent back to the provider
        anyhow::ensure!(!response.payload.is_empty(), "Model returned an empty turn");
        Ok(response)
    }
}

fn tool_result(call: &ToolCall, text: &str) -> ContentBlock {
    ContentBlock::ToolResult(ToolResult {
        tool_call_id: call.id.clone(),
        name: call.name.clone(),
        content: vec![ToolResultContent::text(text)],
    })
}

fn final_text(conversation: &Conversation, stop: StopReason, iterations: usize) -> String {
    let last = conversation
        .messages()
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .map(|m| m.get_text())
        .unwrap_or_default();
    match stop {
        StopReason::Completed => last,
        StopReason::IterationLimit => conversation.last_model_text().unwrap_or_else(|| {
            format!(
                "Stopped after {} tool rounds without a final answer.",
                iterations
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream;
    use llm::{ChatChunk, ChatStream, ToolDefinition};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted responses, then keeps answering with the last one.
    struct ScriptedModel {
        responses: Vec<ChatMessage>,
        calls: AtomicUsize,
        seen_turns: Mutex<Vec<usize>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<ChatMessage>) -> Self {
            Self {
                responses,
                calls: AtomicUsize::new(0),
                seen_turns: Mutex::new(Vec::new()),
            }
        }

        fn next(&self, request: &ChatRequest) -> ChatMessage {
            self.seen_turns.lock().unwrap().push(request.messages().len());
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses[i.min(self.responses.len() - 1)].clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, request: &ChatRequest) -> anyhow::Result<ChatMessage> {
            Ok(self.next(request))
        }

        async fn stream_chat(&self, request: &ChatRequest) -> anyhow::Result<ChatStream> {
            // Split text and tool calls over separate chunks, each numbering
            // its own calls from zero
            let msg = self.next(request);
            let chunks: Vec<anyhow::Result<ChatChunk>> = msg
                .payload
                .content
                .into_iter()
                .map(|block| Ok(ChatChunk::new(Role::Assistant, ChatPayload::new(vec![block]))))
                .collect();
            Ok(Box::pin(stream::iter(chunks)))
        }
    }

    struct FailingModel;

    #[async_trait]
    impl ChatModel for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }

        async fn chat(&self, _request: &ChatRequest) -> anyhow::Result<ChatMessage> {
            anyhow::bail!("Request failed with status 503 Service Unavailable")
        }

        async fn stream_chat(&self, _request: &ChatRequest) -> anyhow::Result<ChatStream> {
            anyhow::bail!("Request failed with status 503 Service Unavailable")
        }
    }

    /// Streams some text, then fails.
    struct BrokenStreamModel {
        chunks: usize,
    }

    #[async_trait]
    impl ChatModel for BrokenStreamModel {
        fn name(&self) -> &str {
            "broken"
        }

        async fn chat(&self, _request: &ChatRequest) -> anyhow::Result<ChatMessage> {
            anyhow::bail!("chat is not used here")
        }

        async fn stream_chat(&self, _request: &ChatRequest) -> anyhow::Result<ChatStream> {
            let mut items: Vec<anyhow::Result<ChatChunk>> = (0..self.chunks)
                .map(|i| Ok(ChatChunk::new(Role::Assistant, format!("part {} ", i).into())))
                .collect();
            items.push(Err(anyhow::anyhow!("Gemini error 503 UNAVAILABLE: overloaded")));
            Ok(Box::pin(stream::iter(items)))
        }
    }

    /// Echoes the call; rejects names other than `echo`.
    struct EchoTools {
        order: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ToolExecutor for EchoTools {
        fn definitions(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition::from_args::<()>("echo", "Echo")]
        }

        async fn execute(&self, call: &ToolCall) -> Result<String, ToolError> {
            if call.name != "echo" {
                return Err(ToolError::UnknownTool(call.name.clone()));
            }
            self.order.lock().unwrap().push(call.id.clone());
            Ok(format!("echo {}", call.id))
        }
    }

    fn echo_tools() -> Arc<EchoTools> {
        Arc::new(EchoTools {
            order: Mutex::new(Vec::new()),
        })
    }

    fn tool_turn(text: &str, ids: &[&str], name: &str) -> ChatMessage {
        ChatMessage::assistant(ChatPayload::with_tool_calls(
            text.to_string(),
            ids.iter()
                .map(|id| ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: serde_json::json!({}),
                })
                .collect(),
        ))
    }

    fn conversation() -> Conversation {
        let mut conversation = Conversation::new();
        conversation.push_user("Hi".into());
        conversation
    }

    #[tokio::test]
    async fn test_tool_agent_multi_turn() {
        let tools = echo_tools();
        let model = ScriptedModel::new(vec![
            tool_turn("Let me check that", &["a", "b"], "echo"),
            ChatMessage::assistant("Done!".into()),
        ]);
        let mut conversation = conversation();

        let outcome = ToolAgent::new(tools.clone(), 5)
            .run(&mut conversation, &model)
            .await
            .unwrap();

        assert_eq!(outcome.text, "Done!");
        assert_eq!(outcome.stop, StopReason::Completed);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(*tools.order.lock().unwrap(), vec!["a", "b"]);

        // user, model(tool calls), tool results, model
        let messages = conversation.messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].role, Role::Tool);
        let results = messages[2].get_tool_results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].get_text(), "echo b");
        assert_eq!(*model.seen_turns.lock().unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fed_back() {
        let model = ScriptedModel::new(vec![
            tool_turn("", &["x"], "deleteEverything"),
            ChatMessage::assistant("I cannot do that.".into()),
        ]);
        let mut conversation = conversation();

        let outcome = ToolAgent::new(echo_tools(), 5)
            .run(&mut conversation, &model)
            .await
            .unwrap();

        assert_eq!(outcome.text, "I cannot do that.");
        let results = conversation.messages()[2].get_tool_results();
        assert_eq!(results[0].get_text(), "Error: Unknown function \"deleteEverything\"");
    }

    #[tokio::test]
    async fn test_ceiling_stops_runaway_model() {
        let model = ScriptedModel::new(vec![tool_turn("Still working", &["a"], "echo")]);
        let mut conversation = conversation();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let outcome = ToolAgent::new(echo_tools(), 3)
            .events(tx)
            .run(&mut conversation, &model)
            .await
            .unwrap();

        assert_eq!(outcome.stop, StopReason::IterationLimit);
        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.text, "Still working");
        assert_eq!(model.calls.load(Ordering::SeqCst), 4);

        // The last requested calls are answered, not left dangling
        let last = conversation.messages().last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.get_tool_results()[0].get_text(), NOT_EXECUTED);

        let mut saw_limit = false;
        while let Ok(event) = rx.try_recv() {
            saw_limit |= matches!(event, AgentEvent::IterationLimit(3));
        }
        assert!(saw_limit);
    }

    #[tokio::test]
    async fn test_ceiling_without_text_still_answers() {
        let model = ScriptedModel::new(vec![tool_turn("", &["a"], "echo")]);
        let mut conversation = conversation();

        let outcome = ToolAgent::new(echo_tools(), 2)
            .run(&mut conversation, &model)
            .await
            .unwrap();

        assert!(!outcome.text.is_empty());
        assert_eq!(outcome.stop, StopReason::IterationLimit);
    }

    #[tokio::test]
    async fn test_sequence_at_ceiling_completes() {
        let model = ScriptedModel::new(vec![
            tool_turn("", &["a"], "echo"),
            tool_turn("", &["b"], "echo"),
            ChatMessage::assistant("All done".into()),
        ]);
        let mut conversation = conversation();

        let outcome = ToolAgent::new(echo_tools(), 2)
            .run(&mut conversation, &model)
            .await
            .unwrap();

        assert_eq!(outcome.stop, StopReason::Completed);
        assert_eq!(outcome.text, "All done");
    }

    #[tokio::test]
    async fn test_model_error_propagates() {
        let mut conversation = conversation();
        let err = ToolAgent::new(echo_tools(), 3)
            .run(&mut conversation, &FailingModel)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_stream_mode_accumulates_chunks() {
        let tools = echo_tools();
        let model = ScriptedModel::new(vec![
            tool_turn("Writing", &["gemini_0_echo", "gemini_0_echo"], "echo"),
            ChatMessage::assistant("Finished".into()),
        ]);
        let mut conversation = conversation();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let outcome = ToolAgent::new(tools.clone(), 5)
            .mode(AgentMode::Stream)
            .events(tx)
            .run(&mut conversation, &model)
            .await
            .unwrap();

        assert_eq!(outcome.text, "Finished");
        assert_eq!(
            *tools.order.lock().unwrap(),
            vec!["gemini_0_echo", "gemini_0_echo_1"]
        );

        let mut deltas = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let AgentEvent::TextDelta(text) = event {
                deltas.push(text);
            }
        }
        assert_eq!(deltas, vec!["Writing", "Finished"]);
    }

    #[tokio::test]
    async fn test_stream_failure_midway_is_an_error() {
        let mut conversation = conversation();
        let err = ToolAgent::new(echo_tools(), 3)
            .mode(AgentMode::Stream)
            .run(&mut conversation, &BrokenStreamModel { chunks: 2 })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("503"));
        // The truncated turn never reaches the history
        assert_eq!(conversation.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_model_turn_is_an_error() {
        for mode in [AgentMode::Chat, AgentMode::Stream] {
            let model = ScriptedModel::new(vec![ChatMessage::assistant(ChatPayload::default())]);
            let mut conversation = conversation();
            let err = ToolAgent::new(echo_tools(), 3)
                .mode(mode)
                .run(&mut conversation, &model)
                .await
                .unwrap_err();
            assert!(err.to_string().contains("empty turn"));
            assert_eq!(conversation.messages().len(), 1);
        }
    }
}
