use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::env;
use std::time::Duration;
use tracing::info;

pub async fn setup_database() -> anyhow::Result<SqlitePool> {
    let db_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:media-upload.db?mode=rwc".to_string());

    info!("📂 Database: {}", db_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&db_url)
        .await?;

    info!("🔄 Running migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✅ Database ready");
    Ok(pool)
}
