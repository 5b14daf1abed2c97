use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::ObjectStore;
use crate::error::StorageError;

/// Stores objects as files below a root directory. References are relative
/// paths; anything that could escape the root is rejected.
pub struct FileObjectStore {
    root: PathBuf,
}

impl FileObjectStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, reference: &str) -> Result<PathBuf, StorageError> {
        let invalid = |reason: &str| StorageError::InvalidReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        if reference.trim().is_empty() {
            return Err(invalid("empty reference"));
        }
        let relative = Path::new(reference);
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                Component::CurDir => {}
                _ => return Err(invalid("must be a relative path inside the store")),
            }
        }
        Ok(self.root.join(relative))
    }

    async fn ensure_parent(&self, path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FileObjectStore {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(reference)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(reference.to_string()))
            }
            Err(e) => Err(StorageError::ReadFile { path, source: e }),
        }
    }

    async fn store(&self, reference: &str, content: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(reference)?;
        self.ensure_parent(&path).await?;

        // create_new gives an atomic check-and-create
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::FileExists(path));
            }
            Err(e) => return Err(StorageError::WriteFile { path, source: e }),
        };

        file.write_all(content)
            .await
            .map_err(|e| StorageError::WriteFile {
                path: path.clone(),
                source: e,
            })?;
        file.flush()
            .await
            .map_err(|e| StorageError::WriteFile { path, source: e })?;
        Ok(())
    }

    async fn delete(&self, reference: &str) -> Result<bool, StorageError> {
        let path = self.resolve(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::DeleteFile { path, source: e }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_store_and_fetch() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileObjectStore::new(temp_dir.path());

        store.store("2026/job-1/a.jpg", b"Hello").await.unwrap();

        assert!(temp_dir.path().join("2026/job-1/a.jpg").exists());
        assert_eq!(store.fetch("2026/job-1/a.jpg").await.unwrap(), b"Hello");
    }

    #[tokio::test]
    async fn test_store_refuses_existing_object() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileObjectStore::new(temp_dir.path());

        store.store("a.jpg", b"First").await.unwrap();
        let result = store.store("a.jpg", b"Second").await;

        assert!(matches!(result, Err(StorageError::FileExists(_))));
        assert_eq!(store.fetch("a.jpg").await.unwrap(), b"First");
    }

    #[tokio::test]
    async fn test_fetch_missing_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileObjectStore::new(temp_dir.path());

        assert!(matches!(
            store.fetch("missing.jpg").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_escaping_references() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileObjectStore::new(temp_dir.path());

        for reference in ["../outside.jpg", "/etc/passwd", "a/../../b", ""] {
            assert!(
                matches!(
                    store.fetch(reference).await,
                    Err(StorageError::InvalidReference { .. })
                ),
                "accepted {:?}",
                reference
            );
        }
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileObjectStore::new(temp_dir.path());

        store.store("a.jpg", b"x").await.unwrap();
        assert!(store.delete("a.jpg").await.unwrap());
        assert!(!store.delete("a.jpg").await.unwrap());
        assert!(!temp_dir.path().join("a.jpg").exists());
    }

    #[tokio::test]
    async fn test_store_empty_content() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileObjectStore::new(temp_dir.path());

        store.store("empty.bin", &[]).await.unwrap();
        assert!(store.fetch("empty.bin").await.unwrap().is_empty());
    }
}
