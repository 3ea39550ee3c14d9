//! Agent loop that edits a Markdown vault through confirmed tool calls
//!
//! This crate provides:
//! - **Agent**: `ToolAgent`, the model/tool turn loop with an iteration ceiling
//! - **Tools**: `VaultTool` variants and the `VaultTools` executor
//! - **Gate**: `ConfirmationGate`, which shows a diff and writes only on confirm
//! - **Vault**: `Vault` trait with `FsVault` and `MemoryVault` backends
//! - **Session**: `VaultSession`, `Pipeline` and the voice `Transcriber`
pub mod agents;
pub mod context;
pub mod diff;
pub mod error;
pub mod gate;
pub mod host;
pub mod pipeline;
pub mod session;
pub mod tools;
pub mod transcriber;
pub mod vault;

pub use agents::{AgentEvent, AgentMode, AgentOutcome, StopReason, ToolAgent};
pub use context::{Conversation, ConversationContext};
pub use diff::{DiffLine, DiffOp, DiffSummary, line_diff};
pub use error::{ConfigError, ToolError, VaultError};
pub use gate::{ConfirmationGate, Decision, GateOutcome, PendingWrite, WriteAction};
pub use host::DialogHost;
pub use pipeline::{Attachment, Pipeline, VoiceOutcome};
pub use session::{SessionConfig, VaultSession};
pub use tools::{ToolExecutor, ToolKind, VaultTool, VaultTools};
pub use transcriber::{AudioClip, Transcriber};
pub use vault::{FsVault, MemoryVault, Vault, VaultPath};
