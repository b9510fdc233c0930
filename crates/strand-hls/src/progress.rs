//! Persistent download progress.

use std::{
    collections::BTreeSet,
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{HlsError, HlsResult};

/// File name of the progress state inside the work directory.
pub const STATE_FILE_NAME: &str = "download_state.txt";

/// Capability contract: persist and reload the set of completed segment
/// indices. `save` calls are serialized by the processor.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Load the persisted set; an absent store reads as empty.
    async fn load(&self) -> HlsResult<BTreeSet<usize>>;

    /// Persist the set, atomically replacing the previous contents.
    async fn save(&self, done: &BTreeSet<usize>) -> HlsResult<()>;

    /// Remove the persisted state; absent state is not an error.
    async fn cleanup(&self) -> HlsResult<()>;
}

/// File-backed progress store: sorted indices joined by `,` at a well-known
/// path. Writes go through a temporary sibling plus rename so an abrupt
/// exit can never leave a torn file.
#[derive(Debug, Clone)]
pub struct FileProgressStore {
    path: PathBuf,
}

impl FileProgressStore {
    /// Store at the conventional location inside `work_dir`.
    pub fn in_work_dir(work_dir: impl AsRef<Path>) -> Self {
        Self {
            path: work_dir.as_ref().join(STATE_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn serialize(done: &BTreeSet<usize>) -> String {
        let indices: Vec<String> = done.iter().map(ToString::to_string).collect();
        indices.join(",")
    }

    fn deserialize(&self, content: &str) -> HlsResult<BTreeSet<usize>> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(BTreeSet::new());
        }
        trimmed
            .split(',')
            .map(|token| {
                token.trim().parse::<usize>().map_err(|_| {
                    HlsError::io(
                        &self.path,
                        io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("corrupt progress entry: {token:?}"),
                        ),
                    )
                })
            })
            .collect()
    }
}

#[async_trait]
impl ProgressStore for FileProgressStore {
    async fn load(&self) -> HlsResult<BTreeSet<usize>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => self.deserialize(&content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeSet::new()),
            Err(e) => Err(HlsError::io(&self.path, e)),
        }
    }

    async fn save(&self, done: &BTreeSet<usize>) -> HlsResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| HlsError::io(parent, e))?;
        }

        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, Self::serialize(done))
            .await
            .map_err(|e| HlsError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| HlsError::io(&self.path, e))?;
        Ok(())
    }

    async fn cleanup(&self) -> HlsResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "progress state cleaned up");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HlsError::io(&self.path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FileProgressStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProgressStore::in_work_dir(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn absent_file_loads_empty() {
        let (_dir, store) = store();
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_and_reload_roundtrip() {
        let (_dir, store) = store();
        let done: BTreeSet<usize> = [4, 0, 2].into_iter().collect();

        store.save(&done).await.unwrap();
        assert_eq!(store.load().await.unwrap(), done);

        // Human-inspectable: sorted, comma separated.
        let raw = tokio::fs::read_to_string(store.path()).await.unwrap();
        assert_eq!(raw, "0,2,4");
    }

    #[tokio::test]
    async fn save_overwrites_previous_state() {
        let (_dir, store) = store();

        store.save(&[0].into_iter().collect()).await.unwrap();
        store.save(&[0, 1, 2].into_iter().collect()).await.unwrap();

        assert_eq!(store.load().await.unwrap().len(), 3);
        // No stray temporary file left behind.
        assert!(!store.tmp_path().exists());
    }

    #[tokio::test]
    async fn empty_file_reads_as_empty_set() {
        let (_dir, store) = store();
        tokio::fs::write(store.path(), "").await.unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_entry_is_io_error() {
        let (_dir, store) = store();
        tokio::fs::write(store.path(), "0,banana,2").await.unwrap();
        assert!(matches!(
            store.load().await,
            Err(HlsError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let (_dir, store) = store();
        store.save(&[1].into_iter().collect()).await.unwrap();

        store.cleanup().await.unwrap();
        assert!(!store.path().exists());
        store.cleanup().await.unwrap();
    }
}
