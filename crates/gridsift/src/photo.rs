use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque photo identity. Stable for the lifetime of a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoId(String);

impl PhotoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identity.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhotoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PhotoId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PhotoId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A photo submitted for triage. Immutable once attached to a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: PhotoId,
    /// Reference understood by the object store (a relative path for the
    /// filesystem store).
    pub storage_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl Photo {
    pub fn new(id: impl Into<PhotoId>, storage_ref: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            storage_ref: storage_ref.into(),
            content_hash: None,
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }
}

/// Drops photos whose content hash was already seen, keeping the first
/// occurrence. Photos without a hash are always kept.
pub fn dedup_by_hash(photos: Vec<Photo>) -> Vec<Photo> {
    let mut seen = HashSet::new();
    photos
        .into_iter()
        .filter(|p| match &p.content_hash {
            Some(hash) => seen.insert(hash.clone()),
            None => true,
        })
        .collect()
}
