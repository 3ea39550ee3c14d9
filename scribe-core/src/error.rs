//! Error types for vault access and tool dispatch

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Invalid vault path \"{0}\": paths must be relative and stay inside the vault")]
    InvalidPath(String),

    #[error("{0} does not exist")]
    NotFound(String),

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl VaultError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            VaultError::NotFound(path.into())
        } else {
            VaultError::Io {
                path: path.into(),
                source,
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    /// The model asked for a function this session does not offer.
    #[error("Unknown function \"{0}\"")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {source}")]
    InvalidArguments {
        tool: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Vault(#[from] VaultError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No Gemini API key configured. Run `scribe set-key <KEY>` or set GEMINI_API_KEY.")]
    MissingApiKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tool_message_names_the_function() {
        let err = ToolError::UnknownTool("deleteEverything".to_string());
        assert_eq!(err.to_string(), "Unknown function \"deleteEverything\"");
    }

    #[test]
    fn test_missing_file_maps_to_not_found() {
        let err = VaultError::io(
            "notes/a.md",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, VaultError::NotFound(ref p) if p == "notes/a.md"));
    }
}
