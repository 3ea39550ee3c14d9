use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{Vault, VaultPath};
use crate::error::VaultError;

/// In-memory vault for tests and dry runs.
///
/// Counts every mutation so callers can assert that nothing was touched.
#[derive(Debug, Default)]
pub struct MemoryVault {
    files: Mutex<BTreeMap<VaultPath, String>>,
    folders: Mutex<BTreeSet<VaultPath>>,
    mutations: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file (and its folders) without counting it as a mutation.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        if let Ok(path) = VaultPath::parse(path) {
            self.insert_folders(&path);
            self.lock_files().insert(path, content.to_string());
        }
        self
    }

    /// Make every subsequent write and folder creation fail with an I/O error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of writes and folder creations performed so far
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn contents(&self, path: &str) -> Option<String> {
        let path = VaultPath::parse(path).ok()?;
        self.lock_files().get(&path).cloned()
    }

    fn lock_files(&self) -> std::sync::MutexGuard<'_, BTreeMap<VaultPath, String>> {
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_folders(&self) -> std::sync::MutexGuard<'_, BTreeSet<VaultPath>> {
        self.folders.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn insert_folders(&self, path: &VaultPath) {
        self.lock_folders().extend(path.ancestors());
    }

    fn check_writable(&self, path: &VaultPath) -> Result<(), VaultError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(VaultError::Io {
                path: path.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only vault"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Vault for MemoryVault {
    async fn exists(&self, path: &VaultPath) -> bool {
        self.lock_files().contains_key(path) || self.lock_folders().contains(path)
    }

    async fn read(&self, path: &VaultPath) -> Result<String, VaultError> {
        self.lock_files()
            .get(path)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(path.to_string()))
    }

    async fn write(&self, path: &VaultPath, content: &str) -> Result<(), VaultError> {
        self.check_writable(path)?;
        if let Some(parent) = path.parent() {
            if !self.lock_folders().contains(&parent) {
                return Err(VaultError::NotFound(parent.to_string()));
            }
        }
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.lock_files().insert(path.clone(), content.to_string());
        Ok(())
    }

    async fn create_folder(&self, path: &VaultPath) -> Result<(), VaultError> {
        self.check_writable(path)?;
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let mut folders = self.lock_folders();
        folders.extend(path.ancestors());
        folders.insert(path.clone());
        Ok(())
    }

    async fn markdown_files(&self) -> Result<Vec<VaultPath>, VaultError> {
        Ok(self
            .lock_files()
            .keys()
            .filter(|p| p.is_markdown())
            .cloned()
            .collect())
    }
}
