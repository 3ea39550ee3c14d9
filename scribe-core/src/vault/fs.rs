use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{Vault, VaultPath};
use crate::error::VaultError;

/// Vault backed by a directory on disk.
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &VaultPath) -> PathBuf {
        path.as_str()
            .split('/')
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }
}

#[async_trait]
impl Vault for FsVault {
    async fn exists(&self, path: &VaultPath) -> bool {
        fs::try_exists(self.resolve(path)).await.unwrap_or(false)
    }

    async fn read(&self, path: &VaultPath) -> Result<String, VaultError> {
        fs::read_to_string(self.resolve(path))
            .await
            .map_err(|e| VaultError::io(path.as_str(), e))
    }

    async fn write(&self, path: &VaultPath, content: &str) -> Result<(), VaultError> {
        let target = self.resolve(path);
        let io_err = |e| VaultError::io(path.as_str(), e);

        // Write atomically using a temp file in the same folder
        let temp_path = target.with_file_name(format!(".{}.scribe-tmp", path.file_name()));
        let mut file = fs::File::create(&temp_path).await.map_err(io_err)?;
        let written = async {
            file.write_all(content.as_bytes()).await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(io_err(e));
        }
        if let Err(e) = fs::rename(&temp_path, &target).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(io_err(e));
        }

        tracing::debug!(path = %path, bytes = content.len(), "Wrote vault file");
        Ok(())
    }

    async fn create_folder(&self, path: &VaultPath) -> Result<(), VaultError> {
        fs::create_dir_all(self.resolve(path))
            .await
            .map_err(|e| VaultError::io(path.as_str(), e))
    }

    async fn markdown_files(&self) -> Result<Vec<VaultPath>, VaultError> {
        let mut files = Vec::new();
        let mut pending = vec![String::new()];

        while let Some(prefix) = pending.pop() {
            let dir = if prefix.is_empty() {
                self.root.clone()
            } else {
                self.root.join(&prefix)
            };
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| VaultError::io(dir.display().to_string(), e))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| VaultError::io(dir.display().to_string(), e))?
            {
                let name = entry.file_name().to_string_lossy().to_string();
                // Skip .obsidian, .git and our own temp files
                if name.starts_with('.') {
                    continue;
                }
                let relative = if prefix.is_empty() {
                    name
                } else {
                    format!("{}/{}", prefix, name)
                };
                let file_type = match entry.file_type().await {
                    Ok(file_type) => file_type,
                    Err(e) => {
                        tracing::warn!(path = %relative, error = %e, "Skipping unreadable entry");
                        continue;
                    }
                };

                if file_type.is_dir() {
                    pending.push(relative);
                } else if let Ok(path) = VaultPath::parse(&relative) {
                    if path.is_markdown() {
                        files.push(path);
                    }
                }
            }
        }

        files.sort();
        Ok(files)
    }
}
