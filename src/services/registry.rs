use crate::models::{MediaFile, MediaItem};
use sqlx::SqlitePool;

/// Fields the handshake writes when registering a media item.
pub struct NewMediaItem {
    pub title: String,
    pub slug: String,
    pub author_name: String,
    pub author_email: String,
    pub podcast_id: Option<i64>,
    pub tags: Option<String>,
    pub category_ids: Option<String>,
    pub meta: Option<String>,
}

/// Fields the handshake writes when registering a pending file.
pub struct NewMediaFile {
    pub media_id: i64,
    pub content_type: String,
    pub display_name: String,
    pub size: i64,
    pub meta: Option<String>,
    pub storage_engine_id: i64,
}

/// Narrow persistence interface over media items and their file
/// attachments. The handshake controller is the sole writer of these
/// fields; everything else about the entities belongs to other services.
#[derive(Clone)]
pub struct MediaRegistry {
    pool: SqlitePool,
}

impl MediaRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Resolve `candidate` to a slug no existing item uses, appending a
    /// numeric suffix on collision ("demo", "demo-2", "demo-3", ...).
    pub async fn available_slug(&self, candidate: &str) -> Result<String, sqlx::Error> {
        let base = if candidate.is_empty() {
            "media"
        } else {
            candidate
        };

        let mut slug = base.to_string();
        let mut suffix = 2u32;

        loop {
            let taken: Option<i64> =
                sqlx::query_scalar("SELECT id FROM media WHERE slug = ? LIMIT 1")
                    .bind(&slug)
                    .fetch_optional(&self.pool)
                    .await?;

            if taken.is_none() {
                return Ok(slug);
            }

            slug = format!("{}-{}", base, suffix);
            suffix += 1;
        }
    }

    pub async fn create_media(&self, item: &NewMediaItem) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO media (title, slug, author_name, author_email, podcast_id, tags, category_ids, meta) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.title)
        .bind(&item.slug)
        .bind(&item.author_name)
        .bind(&item.author_email)
        .bind(item.podcast_id)
        .bind(&item.tags)
        .bind(&item.category_ids)
        .bind(&item.meta)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn fetch_media(&self, id: i64) -> Result<Option<MediaItem>, sqlx::Error> {
        sqlx::query_as::<_, MediaItem>(
            "SELECT id, title, slug, media_type, author_name, author_email, podcast_id, \
             tags, category_ids, meta, created_at FROM media WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn fetch_file(&self, id: i64) -> Result<Option<MediaFile>, sqlx::Error> {
        sqlx::query_as::<_, MediaFile>(
            "SELECT id, media_id, content_type, display_name, size, meta, \
             storage_engine_id, container, unique_id, created_at FROM media_files WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn create_file(&self, file: &NewMediaFile) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO media_files (media_id, content_type, display_name, size, meta, storage_engine_id) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(file.media_id)
        .bind(&file.content_type)
        .bind(&file.display_name)
        .bind(file.size)
        .bind(&file.meta)
        .bind(file.storage_engine_id)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// First-file-wins in spirit: every prepare overwrites the parent's
    /// declared type with the new file's content type.
    pub async fn set_media_type(&self, media_id: i64, content_type: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE media SET media_type = ? WHERE id = ?")
            .bind(content_type)
            .bind(media_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Record the outcome of a successful transfer. `unique_id` is only
    /// written when the engine returned a non-empty id.
    pub async fn record_transfer(
        &self,
        file_id: i64,
        container: Option<&str>,
        unique_id: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE media_files SET container = ?, unique_id = COALESCE(?, unique_id) WHERE id = ?",
        )
        .bind(container)
        .bind(unique_id)
        .bind(file_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_registry() -> MediaRegistry {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        MediaRegistry::new(pool)
    }

    fn demo_item(slug: &str) -> NewMediaItem {
        NewMediaItem {
            title: "Demo".to_string(),
            slug: slug.to_string(),
            author_name: "No Author".to_string(),
            author_email: "No Email".to_string(),
            podcast_id: None,
            tags: None,
            category_ids: None,
            meta: None,
        }
    }

    #[tokio::test]
    async fn test_available_slug_without_collision() {
        let registry = test_registry().await;
        assert_eq!(registry.available_slug("demo").await.unwrap(), "demo");
    }

    #[tokio::test]
    async fn test_available_slug_appends_suffix_on_collision() {
        let registry = test_registry().await;
        registry.create_media(&demo_item("demo")).await.unwrap();
        assert_eq!(registry.available_slug("demo").await.unwrap(), "demo-2");

        registry.create_media(&demo_item("demo-2")).await.unwrap();
        assert_eq!(registry.available_slug("demo").await.unwrap(), "demo-3");
    }

    #[tokio::test]
    async fn test_create_and_fetch_media() {
        let registry = test_registry().await;
        let id = registry.create_media(&demo_item("demo")).await.unwrap();

        let item = registry.fetch_media(id).await.unwrap().unwrap();
        assert_eq!(item.title, "Demo");
        assert_eq!(item.slug, "demo");
        assert_eq!(item.media_type, None);

        assert!(registry.fetch_media(id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_transfer_keeps_unique_id_when_absent() {
        let registry = test_registry().await;
        let media_id = registry.create_media(&demo_item("demo")).await.unwrap();

        sqlx::query("INSERT INTO storage_engines (engine_type, enabled, base_path) VALUES ('local_file', 1, '/tmp')")
            .execute(&registry.pool)
            .await
            .unwrap();

        let file_id = registry
            .create_file(&NewMediaFile {
                media_id,
                content_type: "video/mp4".to_string(),
                display_name: "clip.mp4".to_string(),
                size: 1024,
                meta: None,
                storage_engine_id: 1,
            })
            .await
            .unwrap();

        registry
            .record_transfer(file_id, Some("mp4"), Some("abc123"))
            .await
            .unwrap();
        let file = registry.fetch_file(file_id).await.unwrap().unwrap();
        assert_eq!(file.container.as_deref(), Some("mp4"));
        assert_eq!(file.unique_id.as_deref(), Some("abc123"));

        // A later update without an id keeps the recorded one.
        registry
            .record_transfer(file_id, Some("mp4"), None)
            .await
            .unwrap();
        let file = registry.fetch_file(file_id).await.unwrap().unwrap();
        assert_eq!(file.unique_id.as_deref(), Some("abc123"));
    }
}
