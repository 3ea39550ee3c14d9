mod tool_agent;

pub use tool_agent::{AgentEvent, AgentMode, AgentOutcome, StopReason, ToolAgent};
