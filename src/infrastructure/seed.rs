use crate::config::UploadConfig;
use crate::services::storage::LOCAL_FILE_ENGINE;
use argon2::{
    Argon2,
    password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
};
use sqlx::SqlitePool;
use tracing::info;

/// Create the bootstrap admin account from ADMIN_USERNAME/ADMIN_PASSWORD
/// if it does not exist yet. Without these variables the gate simply has
/// no users and every admin call fails with 401.
pub async fn seed_admin_user(pool: &SqlitePool) -> anyhow::Result<()> {
    let (Ok(username), Ok(password)) = (
        std::env::var("ADMIN_USERNAME"),
        std::env::var("ADMIN_PASSWORD"),
    ) else {
        info!("🌱 ADMIN_USERNAME/ADMIN_PASSWORD not set, skipping admin seed");
        return Ok(());
    };

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
        .bind(&username)
        .fetch_optional(pool)
        .await?;

    if exists.is_some() {
        return Ok(());
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash admin password: {}", e))?
        .to_string();

    sqlx::query("INSERT INTO users (username, password_hash, is_admin) VALUES (?, ?, 1)")
        .bind(&username)
        .bind(password_hash)
        .execute(pool)
        .await?;

    info!("🌱 Seeded admin user '{}'", username);
    Ok(())
}

/// Make sure exactly one enabled local_file engine exists, rooted at the
/// configured storage directory.
pub async fn seed_local_engine(pool: &SqlitePool, config: &UploadConfig) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.storage_root).await?;

    let exists: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM storage_engines WHERE enabled = 1 AND engine_type = ? LIMIT 1",
    )
    .bind(LOCAL_FILE_ENGINE)
    .fetch_optional(pool)
    .await?;

    if exists.is_some() {
        return Ok(());
    }

    sqlx::query("INSERT INTO storage_engines (engine_type, enabled, base_path) VALUES (?, 1, ?)")
        .bind(LOCAL_FILE_ENGINE)
        .bind(&config.storage_root)
        .execute(pool)
        .await?;

    info!("🌱 Seeded local storage engine at {}", config.storage_root);
    Ok(())
}
