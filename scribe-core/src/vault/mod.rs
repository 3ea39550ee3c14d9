//! Path-addressed storage for the Markdown notes the agent may edit

mod fs;
mod memory;
mod path;

pub use fs::FsVault;
pub use memory::MemoryVault;
pub use path::VaultPath;

use async_trait::async_trait;

use crate::error::VaultError;

/// Vault storage trait
///
/// All paths are vault-relative. Implementations must make `write` atomic:
/// readers see either the old content or the new one, never a mix.
#[async_trait]
pub trait Vault: Send + Sync {
    /// Check whether a file or folder exists at `path`
    async fn exists(&self, path: &VaultPath) -> bool;

    /// Read a file as UTF-8 text
    async fn read(&self, path: &VaultPath) -> Result<String, VaultError>;

    /// Replace the content of a file, creating it if needed.
    /// The containing folder must already exist.
    async fn write(&self, path: &VaultPath, content: &str) -> Result<(), VaultError>;

    /// Create a folder and any missing parents
    async fn create_folder(&self, path: &VaultPath) -> Result<(), VaultError>;

    /// All Markdown files in the vault, sorted by path
    async fn markdown_files(&self) -> Result<Vec<VaultPath>, VaultError>;
}
