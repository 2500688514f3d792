use crate::models::{MediaFile, StorageEngineRow};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

/// Engine type string for the built-in local filesystem engine.
pub const LOCAL_FILE_ENGINE: &str = "local_file";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("store failed: {0}")]
    StoreFailed(String),

    /// The engine variant cannot transcode the given file. Recoverable:
    /// callers log and move on, the transfer still succeeds.
    #[error("transcoding not supported by this engine")]
    Unsupported,
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::StoreFailed(e.to_string())
    }
}

/// Pluggable byte sink for prepared files.
///
/// `store` must consume the whole stream and either persist it fully or
/// fail without leaving the file's registry record touched; partial
/// writes must never become visible through the returned unique id.
#[async_trait::async_trait]
pub trait StorageEngine: Send + Sync {
    /// Persist the stream for `file` and return an engine-unique content id.
    async fn store(
        &self,
        file: &MediaFile,
        reader: Pin<Box<dyn AsyncRead + Send>>,
    ) -> Result<String, StorageError>;

    /// Best-effort transcode of already-stored content.
    async fn transcode(&self, file: &MediaFile) -> Result<(), StorageError>;

    fn engine_type(&self) -> &str;
}

/// Local filesystem engine: streams uploads under
/// `<base_path>/<file_id>/<display_name>`, hashing on the fly. The hex
/// SHA-256 digest doubles as the content-addressable unique id.
pub struct LocalFileStorage {
    base_path: PathBuf,
}

impl LocalFileStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Only the final path component of the declared name is used, so a
    /// display name can never escape the engine's directory.
    fn target_path(&self, file: &MediaFile) -> Result<PathBuf, StorageError> {
        let name = Path::new(&file.display_name)
            .file_name()
            .ok_or_else(|| {
                StorageError::StoreFailed(format!("unusable display name: {}", file.display_name))
            })?;

        Ok(self.base_path.join(file.id.to_string()).join(name))
    }
}

#[async_trait::async_trait]
impl StorageEngine for LocalFileStorage {
    async fn store(
        &self,
        file: &MediaFile,
        mut reader: Pin<Box<dyn AsyncRead + Send>>,
    ) -> Result<String, StorageError> {
        let target = self.target_path(file)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Stage under a throwaway name, rename once the stream is fully
        // written, so a dropped connection never leaves a visible file.
        let staging = self.base_path.join(format!(".staging-{}", Uuid::new_v4()));
        let mut out = fs::File::create(&staging).await?;

        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];
        let mut total: u64 = 0;

        loop {
            let n = match reader.read(&mut buffer).await {
                Ok(n) => n,
                Err(e) => {
                    let _ = fs::remove_file(&staging).await;
                    return Err(e.into());
                }
            };
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
            if let Err(e) = out.write_all(&buffer[..n]).await {
                let _ = fs::remove_file(&staging).await;
                return Err(e.into());
            }
            total += n as u64;
        }

        out.flush().await?;
        drop(out);
        fs::rename(&staging, &target).await?;

        let unique_id = hex::encode(hasher.finalize());
        tracing::debug!(
            "Stored {} byte(s) for file {} at {:?} ({})",
            total,
            file.id,
            target,
            unique_id
        );

        Ok(unique_id)
    }

    async fn transcode(&self, _file: &MediaFile) -> Result<(), StorageError> {
        Err(StorageError::Unsupported)
    }

    fn engine_type(&self) -> &str {
        LOCAL_FILE_ENGINE
    }
}

/// Look up the single enabled engine of `engine_type` and build it.
/// Returns the registry row id together with the engine so pending files
/// can record which engine holds their bytes.
pub async fn find_enabled_engine(
    pool: &SqlitePool,
    engine_type: &str,
) -> Result<Option<(i64, Arc<dyn StorageEngine>)>, sqlx::Error> {
    let row = sqlx::query_as::<_, StorageEngineRow>(
        "SELECT id, engine_type, enabled, base_path FROM storage_engines \
         WHERE enabled = 1 AND engine_type = ? LIMIT 1",
    )
    .bind(engine_type)
    .fetch_optional(pool)
    .await?;

    Ok(row.and_then(|row| match row.engine_type.as_str() {
        LOCAL_FILE_ENGINE => {
            let engine: Arc<dyn StorageEngine> = Arc::new(LocalFileStorage::new(&row.base_path));
            Some((row.id, engine))
        }
        other => {
            tracing::warn!("Unknown storage engine type '{}' (id {})", other, row.id);
            None
        }
    }))
}
