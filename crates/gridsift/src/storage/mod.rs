//! Object storage for original photos.
//!
//! The pipeline only ever reads originals; the service deletes them when a
//! job is cancelled.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::StorageError;

pub mod filesystem;

pub use filesystem::FileObjectStore;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns the full bytes stored under `reference`.
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, StorageError>;

    /// Stores `content` under `reference`. Fails if the reference is taken.
    async fn store(&self, reference: &str, content: &[u8]) -> Result<(), StorageError>;

    /// Deletes the object. Returns `false` when nothing was stored there.
    async fn delete(&self, reference: &str) -> Result<bool, StorageError>;
}

/// In-process store, useful for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous insert, overwriting any previous value.
    pub fn insert(&self, reference: impl Into<String>, content: Vec<u8>) {
        if let Ok(mut objects) = self.objects.write() {
            objects.insert(reference.into(), content);
        }
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.objects
            .read()
            .map(|o| o.contains_key(reference))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned(reference: &str) -> StorageError {
    StorageError::InvalidReference {
        reference: reference.to_string(),
        reason: "store lock poisoned".to_string(),
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, StorageError> {
        let objects = self.objects.read().map_err(|_| poisoned(reference))?;
        objects
            .get(reference)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(reference.to_string()))
    }

    async fn store(&self, reference: &str, content: &[u8]) -> Result<(), StorageError> {
        let mut objects = self.objects.write().map_err(|_| poisoned(reference))?;
        if objects.contains_key(reference) {
            return Err(StorageError::FileExists(reference.into()));
        }
        objects.insert(reference.to_string(), content.to_vec());
        Ok(())
    }

    async fn delete(&self, reference: &str) -> Result<bool, StorageError> {
        let mut objects = self.objects.write().map_err(|_| poisoned(reference))?;
        Ok(objects.remove(reference).is_some())
    }
}
