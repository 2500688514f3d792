use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: Option<DateTime<Utc>>,
}

/// Media item registered in phase 1 of the handshake.
#[derive(Debug, Serialize, Deserialize, FromRow, ToSchema)]
pub struct MediaItem {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub media_type: Option<String>,
    pub author_name: String,
    pub author_email: String,
    pub podcast_id: Option<i64>,
    pub tags: Option<String>,
    pub category_ids: Option<String>,
    pub meta: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// File attachment awaiting bytes. `container` and `unique_id` stay NULL
/// until a transfer succeeds.
#[derive(Debug, Serialize, Deserialize, FromRow, ToSchema)]
pub struct MediaFile {
    pub id: i64,
    pub media_id: i64,
    pub content_type: String,
    pub display_name: String,
    pub size: i64,
    pub meta: Option<String>,
    pub storage_engine_id: i64,
    pub container: Option<String>,
    pub unique_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, FromRow, ToSchema)]
pub struct StorageEngineRow {
    pub id: i64,
    pub engine_type: String,
    pub enabled: bool,
    pub base_path: String,
}
