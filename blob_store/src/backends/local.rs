//! Local filesystem blob store, one directory per container.

use std::path::Path;

use object_store::local::LocalFileSystem;

use crate::{BlobError, BlobResult};

pub(crate) fn build(root: &Path, container: &str) -> BlobResult<LocalFileSystem> {
    if container.is_empty() || container.contains(['/', '\\']) || container == ".." {
        return Err(BlobError::invalid_config(format!(
            "invalid local container name: {:?}",
            container
        )));
    }

    let dir = root.join(container);
    // Create parent directories if they don't exist
    std::fs::create_dir_all(&dir)?;
    LocalFileSystem::new_with_prefix(&dir).map_err(|e| BlobError::Network {
        source: anyhow::Error::from(e),
    })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tempfile::TempDir;

    use crate::{BackendConfig, BlobBackend, ObjectStoreBackend, PutMode, PutOutcome};

    fn backend(temp_dir: &TempDir) -> ObjectStoreBackend {
        ObjectStoreBackend::new(BackendConfig::Local {
            root: temp_dir.path().to_path_buf(),
        })
    }

    #[tokio::test]
    async fn test_local_upload_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let store = backend(&temp_dir);

        store
            .put(
                "photos",
                "2024/cat.png",
                Bytes::from_static(b"hello world"),
                "image/png",
                PutMode::Overwrite,
            )
            .await
            .unwrap();
        assert!(temp_dir.path().join("photos/2024/cat.png").exists());

        let data = store.fetch("photos", "2024/cat.png").await.unwrap();
        // No attributes on disk, the type comes from the extension.
        assert_eq!(data.content_type.as_deref(), Some("image/png"));
        assert_eq!(data.read_bytes().await.unwrap(), Bytes::from_static(b"hello world"));
    }

    #[tokio::test]
    async fn test_local_conditional_put() {
        let temp_dir = TempDir::new().unwrap();
        let store = backend(&temp_dir);

        let first = store
            .put("cache", "ab/cd", Bytes::from_static(b"1"), "image/png", PutMode::IfNotExists)
            .await
            .unwrap();
        let second = store
            .put("cache", "ab/cd", Bytes::from_static(b"2"), "image/png", PutMode::IfNotExists)
            .await
            .unwrap();
        assert_eq!(first, PutOutcome::Written);
        assert_eq!(second, PutOutcome::Conflict);
    }

    #[tokio::test]
    async fn test_local_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = backend(&temp_dir);

        let result = store.fetch("photos", "nonexistent/file.txt").await;
        assert!(matches!(result, Err(crate::BlobError::NotFound { .. })));
    }

    #[test]
    fn test_container_cannot_escape_root() {
        let temp_dir = TempDir::new().unwrap();
        assert!(super::build(temp_dir.path(), "..").is_err());
        assert!(super::build(temp_dir.path(), "a/b").is_err());
    }
}
