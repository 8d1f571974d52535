use async_trait::async_trait;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use thiserror::Error;
use tokio::fs;

use crate::upload::UploadDescriptor;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to prepare upload directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("simulated storage failure")]
    Simulated,
}

// 1. StorageService Contract
/// StorageService
///
/// Abstract contract for persisting accepted uploads. Handlers only see this
/// trait, so the disk-backed store can be swapped for the in-memory mock in tests.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Directory new files are written into.
    fn directory(&self) -> &Path;

    /// Creates the upload directory if it is missing. Idempotent.
    async fn ensure_directory(&self) -> Result<(), StorageError>;

    /// Writes the bytes for an accepted upload and returns the final path.
    ///
    /// The descriptor is taken as-is; validation already happened in the upload gate.
    async fn put(&self, descriptor: &UploadDescriptor, bytes: &[u8])
    -> Result<PathBuf, StorageError>;
}

// 2. The Real Implementation (local disk)
/// LocalDiskStorage
///
/// Writes uploads under a fixed directory on the local filesystem. The directory
/// is created on first use. There is no cleanup or retention; files persist
/// until removed by an operator.
#[derive(Clone, Debug)]
pub struct LocalDiskStorage {
    root: PathBuf,
}

impl LocalDiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl StorageService for LocalDiskStorage {
    fn directory(&self) -> &Path {
        &self.root
    }

    async fn ensure_directory(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StorageError::Directory {
                path: self.root.clone(),
                source,
            })
    }

    async fn put(
        &self,
        descriptor: &UploadDescriptor,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError> {
        self.ensure_directory().await?;

        let path = self.root.join(&descriptor.stored_filename);
        fs::write(&path, bytes)
            .await
            .map_err(|source| StorageError::Write {
                path: path.clone(),
                source,
            })?;

        tracing::info!(
            path = %path.display(),
            size = descriptor.size,
            content_type = %descriptor.content_type,
            "upload stored"
        );
        Ok(path)
    }
}

// 3. The Mock Implementation (For Tests)
/// MockStorageService
///
/// Keeps written files in memory, keyed by stored filename.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
    root: PathBuf,
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self {
            should_fail: false,
            root: PathBuf::from("uploads/profile"),
            files: Arc::default(),
        }
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new()
        }
    }

    /// Bytes stored under `stored_filename`, if any.
    pub fn file(&self, stored_filename: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .ok()
            .and_then(|files| files.get(stored_filename).cloned())
    }

    pub fn stored_filenames(&self) -> Vec<String> {
        self.files
            .lock()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    fn directory(&self) -> &Path {
        &self.root
    }

    async fn ensure_directory(&self) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Simulated);
        }
        Ok(())
    }

    async fn put(
        &self,
        descriptor: &UploadDescriptor,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError> {
        if self.should_fail {
            return Err(StorageError::Simulated);
        }

        if let Ok(mut files) = self.files.lock() {
            files.insert(descriptor.stored_filename.clone(), bytes.to_vec());
        }
        Ok(self.root.join(&descriptor.stored_filename))
    }
}

/// StorageState
///
/// The concrete type used to share the storage service across the application state.
pub type StorageState = Arc<dyn StorageService>;
