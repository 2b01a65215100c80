//! Durable high score.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::SystemTime,
};

use futures::future::BoxFuture;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{debug, warn};

use crate::dao::{
    models::HighScoreEntity,
    storage::{StorageError, StorageResult},
};

/// Identifier the high score is stored under.
pub const HIGH_SCORE_KEY: &str = "buzz_arcade_high_score";

/// Storage for the single best-score value.
pub trait HighScoreStore: Send + Sync {
    /// Read the stored value; an absent record reads as zero.
    fn load(&self) -> BoxFuture<'static, StorageResult<u32>>;
    /// Store `score` unless the stored value is already at least as high.
    fn save(&self, score: u32) -> BoxFuture<'static, StorageResult<()>>;
}

/// High score kept in a small JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFileHighScoreStore {
    path: Arc<PathBuf>,
}

impl JsonFileHighScoreStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
        }
    }
}

impl HighScoreStore for JsonFileHighScoreStore {
    fn load(&self) -> BoxFuture<'static, StorageResult<u32>> {
        let path = self.path.clone();
        Box::pin(async move { read_score(&path).await })
    }

    fn save(&self, score: u32) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.path.clone();
        Box::pin(async move {
            match read_score(&path).await {
                Ok(stored) if stored >= score => {
                    debug!(path = %path.display(), stored, score, "stored high score kept");
                    return Ok(());
                }
                Ok(_) => {}
                Err(err @ StorageError::Corrupt { .. }) => {
                    warn!(error = %err, "replacing unreadable high score");
                }
                Err(err) => return Err(err),
            }

            let entity = HighScoreEntity {
                key: HIGH_SCORE_KEY.to_string(),
                score,
                updated_at: format_system_time(SystemTime::now()),
            };
            let body = serde_json::to_vec_pretty(&entity).map_err(|err| {
                StorageError::corrupt("failed to encode high score".to_string(), err)
            })?;

            if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.map_err(|err| {
                    StorageError::unavailable(format!("failed to create {}", parent.display()), err)
                })?;
            }

            let staging = path.with_extension("json.tmp");
            tokio::fs::write(&staging, body).await.map_err(|err| {
                StorageError::unavailable(format!("failed to write {}", staging.display()), err)
            })?;
            tokio::fs::rename(&staging, path.as_path())
                .await
                .map_err(|err| {
                    StorageError::unavailable(format!("failed to replace {}", path.display()), err)
                })?;
            debug!(path = %path.display(), score, "high score written");
            Ok(())
        })
    }
}

async fn read_score(path: &Path) -> StorageResult<u32> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no stored high score");
            return Ok(0);
        }
        Err(err) => {
            return Err(StorageError::unavailable(
                format!("failed to read {}", path.display()),
                err,
            ));
        }
    };
    let entity: HighScoreEntity = serde_json::from_str(&contents)
        .map_err(|err| StorageError::corrupt(format!("failed to decode {}", path.display()), err))?;
    Ok(entity.score)
}

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

/// Process-local high score, used when nothing should touch the disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryHighScoreStore {
    score: Arc<AtomicU32>,
}

impl MemoryHighScoreStore {
    pub fn new(initial: u32) -> Self {
        Self {
            score: Arc::new(AtomicU32::new(initial)),
        }
    }

    pub fn get(&self) -> u32 {
        self.score.load(Ordering::SeqCst)
    }
}

impl HighScoreStore for MemoryHighScoreStore {
    fn load(&self) -> BoxFuture<'static, StorageResult<u32>> {
        let score = self.get();
        Box::pin(async move { Ok(score) })
    }

    fn save(&self, score: u32) -> BoxFuture<'static, StorageResult<()>> {
        self.score.fetch_max(score, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn absent_file_reads_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileHighScoreStore::new(dir.path().join("high_score.json"));
        assert_eq!(store.load().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn saved_score_survives_a_new_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("high_score.json");
        JsonFileHighScoreStore::new(&path).save(750).await.unwrap();

        let reopened = JsonFileHighScoreStore::new(&path);
        assert_eq!(reopened.load().await.unwrap(), 750);

        let raw = std::fs::read_to_string(&path).unwrap();
        let entity: HighScoreEntity = serde_json::from_str(&raw).unwrap();
        assert_eq!(entity.key, HIGH_SCORE_KEY);
        assert!(OffsetDateTime::parse(&entity.updated_at, &Rfc3339).is_ok());
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("high_score.json");
        std::fs::write(&path, "not json").unwrap();
        let err = JsonFileHighScoreStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryHighScoreStore::new(10);
        assert_eq!(store.load().await.unwrap(), 10);
        store.save(40).await.unwrap();
        assert_eq!(store.get(), 40);
        store.save(25).await.unwrap();
        assert_eq!(store.get(), 40);
    }

    #[tokio::test]
    async fn lower_score_never_replaces_the_stored_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("high_score.json");
        let first = JsonFileHighScoreStore::new(&path);
        first.save(900).await.unwrap();

        // A process that failed to read the file at startup believes the record is 0.
        let restarted = JsonFileHighScoreStore::new(&path);
        restarted.save(300).await.unwrap();
        assert_eq!(restarted.load().await.unwrap(), 900);

        restarted.save(1200).await.unwrap();
        assert_eq!(first.load().await.unwrap(), 1200);
    }

    #[tokio::test]
    async fn corrupt_file_is_replaced_on_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("high_score.json");
        std::fs::write(&path, "not json").unwrap();
        let store = JsonFileHighScoreStore::new(&path);
        store.save(120).await.unwrap();
        assert_eq!(store.load().await.unwrap(), 120);
    }
}
