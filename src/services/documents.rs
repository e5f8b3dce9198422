use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Transient storage for uploaded documents.
///
/// Files live under the configured working directory with a generated unique
/// name per submission and are removed by the worker once the job reaches a
/// terminal outcome (or by the API if submission fails after the write).
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Persist uploaded bytes under a fresh unique filename.
    pub async fn save(&self, content: &[u8]) -> Result<PathBuf, DocumentError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| DocumentError::Io(self.root.display().to_string(), e))?;

        let path = self
            .root
            .join(format!("financial_document_{}.pdf", Uuid::new_v4()));
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| DocumentError::Io(path.display().to_string(), e))?;
        Ok(path)
    }

    /// Best-effort removal of a transient document.
    pub async fn remove(&self, path: &Path) {
        remove_transient(path).await;
    }
}

/// Delete a transient file if present. Failures are swallowed: cleanup is
/// best-effort and must never turn a finished job into a failed one.
pub async fn remove_transient(path: impl AsRef<Path>) {
    let path = path.as_ref();
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove transient document");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("I/O error at {0}: {1}")]
    Io(String, #[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_writes_unique_files() {
        let root = std::env::temp_dir().join(format!("fa-doc-test-{}", Uuid::new_v4()));
        let store = DocumentStore::new(&root);

        let a = store.save(b"first").await.unwrap();
        let b = store.save(b"second").await.unwrap();

        assert_ne!(a, b);
        assert_eq!(tokio::fs::read(&a).await.unwrap(), b"first");

        store.remove(&a).await;
        store.remove(&b).await;
        assert!(!a.exists());
        assert!(!b.exists());
        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn test_remove_missing_file_is_silent() {
        // Must not panic or error on an already-gone file.
        remove_transient("/nonexistent/financial_document_gone.pdf").await;
    }
}
