//! Human confirmation in front of every vault write

use crate::diff::{self, DiffLine, DiffSummary};
use crate::host::DialogHost;
use crate::vault::{Vault, VaultPath};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteAction {
    Create,
    Change,
}

impl WriteAction {
    pub fn label(&self) -> &'static str {
        match self {
            WriteAction::Create => "CREATE",
            WriteAction::Change => "CHANGE",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Decision {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
}

/// A proposed file mutation waiting for the user.
///
/// Resolved exactly once; the vault is not touched before that.
#[derive(Clone, Debug)]
pub struct PendingWrite {
    pub path: VaultPath,
    pub proposed_content: String,
    /// Empty for a new file
    pub previous_content: String,
    pub action: WriteAction,
    pub diff: Vec<DiffLine>,
    decision: Decision,
}

impl PendingWrite {
    pub fn new(path: VaultPath, previous_content: String, proposed_content: String, action: WriteAction) -> Self {
        let diff = diff::line_diff(&previous_content, &proposed_content);
        PendingWrite {
            path,
            proposed_content,
            previous_content,
            action,
            diff,
            decision: Decision::Pending,
        }
    }

    pub fn decision(&self) -> Decision {
        self.decision
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary::of(&self.diff)
    }

    /// Record the user's answer. A host that returns without choosing counts
    /// as a cancel; later calls are ignored.
    fn resolve(&mut self, decision: Decision) -> Decision {
        if self.decision == Decision::Pending {
            self.decision = match decision {
                Decision::Pending => Decision::Cancelled,
                other => other,
            };
        }
        self.decision
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateOutcome {
    Written { path: VaultPath, action: WriteAction },
    Cancelled { path: VaultPath },
    Failed { path: VaultPath, error: String },
}

impl GateOutcome {
    /// Tool result text reported back to the model. Always names the path.
    pub fn message(&self) -> String {
        match self {
            GateOutcome::Written {
                path,
                action: WriteAction::Create,
            } => format!("The file {} was created successfully.", path),
            GateOutcome::Written {
                path,
                action: WriteAction::Change,
            } => format!("The file {} was updated successfully.", path),
            GateOutcome::Cancelled { path } => format!(
                "The user cancelled the write to {}. The file was not changed.",
                path
            ),
            GateOutcome::Failed { path, error } => {
                format!("Failed to write {}: {}", path, error)
            }
        }
    }
}

pub struct ConfirmationGate<'a> {
    vault: &'a dyn Vault,
    host: &'a dyn DialogHost,
}

impl<'a> ConfirmationGate<'a> {
    pub fn new(vault: &'a dyn Vault, host: &'a dyn DialogHost) -> Self {
        Self { vault, host }
    }

    /// Ask the user to approve replacing `path` with `content`, and apply it
    /// only if they confirm.
    pub async fn request(&self, path: VaultPath, content: String) -> GateOutcome {
        let (previous, action) = if self.vault.exists(&path).await {
            match self.vault.read(&path).await {
                Ok(previous) => (previous, WriteAction::Change),
                Err(e) => {
                    return GateOutcome::Failed {
                        path,
                        error: e.to_string(),
                    };
                }
            }
        } else {
            (String::new(), WriteAction::Create)
        };

        let mut pending = PendingWrite::new(path, previous, content, action);
        tracing::debug!(
            path = %pending.path,
            action = pending.action.label(),
            diff = %pending.summary(),
            "Awaiting write confirmation"
        );

        let decision = self.host.confirm_write(&pending).await;
        match pending.resolve(decision) {
            Decision::Confirmed => self.apply(pending).await,
            _ => {
                tracing::info!(path = %pending.path, "Write cancelled by user");
                GateOutcome::Cancelled { path: pending.path }
            }
        }
    }

    async fn apply(&self, pending: PendingWrite) -> GateOutcome {
        let PendingWrite {
            path,
            proposed_content,
            action,
            ..
        } = pending;

        if let Some(folder) = path.parent() {
            if !self.vault.exists(&folder).await {
                if let Err(e) = self.vault.create_folder(&folder).await {
                    tracing::warn!(path = %path, error = %e, "Could not create folder");
                    return GateOutcome::Failed {
                        path,
                        error: e.to_string(),
                    };
                }
            }
        }

        match self.vault.write(&path, &proposed_content).await {
            Ok(()) => {
                tracing::info!(path = %path, action = action.label(), "Write applied");
                GateOutcome::Written { path, action }
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Write failed");
                GateOutcome::Failed {
                    path,
                    error: e.to_string(),
                }
            }
        }
    }
}
