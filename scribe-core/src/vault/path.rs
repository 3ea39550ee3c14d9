use std::fmt;

use crate::error::VaultError;

/// A normalized, vault-relative path using `/` separators.
///
/// Never absolute and never escapes the vault root via `..`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VaultPath(String);

impl VaultPath {
    pub fn parse(raw: &str) -> Result<Self, VaultError> {
        let unified = raw.trim().replace('\\', "/");
        let invalid = || VaultError::InvalidPath(raw.to_string());

        if unified.starts_with('/') || has_drive_prefix(&unified) {
            return Err(invalid());
        }

        let mut parts = Vec::new();
        for component in unified.split('/') {
            match component {
                "" | "." => continue,
                ".." => return Err(invalid()),
                part => parts.push(part),
            }
        }
        if parts.is_empty() {
            return Err(invalid());
        }

        Ok(VaultPath(parts.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Containing folder, or `None` for a file at the vault root.
    pub fn parent(&self) -> Option<VaultPath> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| VaultPath(parent.to_string()))
    }

    /// Every containing folder, outermost first.
    pub fn ancestors(&self) -> Vec<VaultPath> {
        let mut folders = Vec::new();
        let mut current = self.parent();
        while let Some(folder) = current {
            current = folder.parent();
            folders.push(folder);
        }
        folders.reverse();
        folders
    }

    pub fn is_markdown(&self) -> bool {
        self.file_name().to_ascii_lowercase().ends_with(".md")
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

impl fmt::Display for VaultPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VaultPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
