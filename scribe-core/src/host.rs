//! The human on the other side of the agent loop

use async_trait::async_trait;

use crate::gate::{Decision, PendingWrite};

/// Presents proposed writes and clarifying questions to the user.
///
/// Both calls suspend the agent loop until the user acts; there is no timeout.
/// Closing a dialog without choosing counts as cancelling it.
#[async_trait]
pub trait DialogHost: Send + Sync {
    /// Show the diff of `pending` and return the user's decision.
    async fn confirm_write(&self, pending: &PendingWrite) -> Decision;

    /// Show `questions` (with suggested answers inline) for editing.
    /// Returns the edited text, or `None` if the user cancelled.
    async fn ask(&self, questions: &str) -> Option<String>;
}
