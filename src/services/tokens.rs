use rand::Rng;
use sqlx::SqlitePool;

/// Alphabet for upload tokens (uppercase letters and digits).
const TOKEN_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Durable single-use upload token store.
///
/// Tokens are keyed by file id in the `upload_tokens` table, so a
/// prepare/transfer pair that spans a process restart still succeeds.
/// `consume` is the linearization point for concurrent transfers: the
/// conditional DELETE removes at most one row, so of two racing requests
/// presenting the same token exactly one observes a hit.
#[derive(Clone)]
pub struct TokenStore {
    pool: SqlitePool,
    token_length: usize,
}

impl TokenStore {
    pub fn new(pool: SqlitePool, token_length: usize) -> Self {
        Self { pool, token_length }
    }

    fn generate_token(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.token_length)
            .map(|_| TOKEN_CHARSET[rng.gen_range(0..TOKEN_CHARSET.len())] as char)
            .collect()
    }

    /// Issue a fresh token for `file_id`, replacing any prior token for
    /// that file.
    pub async fn issue(&self, file_id: i64) -> Result<String, sqlx::Error> {
        let token = self.generate_token();

        sqlx::query(
            "INSERT INTO upload_tokens (file_id, token) VALUES (?, ?) \
             ON CONFLICT(file_id) DO UPDATE SET token = excluded.token, \
             issued_at = CURRENT_TIMESTAMP",
        )
        .bind(file_id)
        .bind(&token)
        .execute(&self.pool)
        .await?;

        Ok(token)
    }

    /// Read the live token for `file_id`, if any. Used to reject a
    /// transfer before its body is consumed.
    pub async fn peek(&self, file_id: i64) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT token FROM upload_tokens WHERE file_id = ?")
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Atomically validate and revoke: returns true iff `presented`
    /// matched the live token and this call was the one that removed it.
    pub async fn consume(&self, file_id: i64, presented: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM upload_tokens WHERE file_id = ? AND token = ?")
            .bind(file_id)
            .bind(presented)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Remove any token for `file_id`. Removing a missing token is a
    /// no-op.
    pub async fn revoke(&self, file_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM upload_tokens WHERE file_id = ?")
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

    async fn test_store() -> TokenStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        TokenStore::new(pool, 13)
    }

    #[tokio::test]
    async fn test_issue_shape() {
        let store = test_store().await;
        let token = store.issue(1).await.unwrap();
        assert_eq!(token.len(), 13);
        assert!(token.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_reissue_overwrites() {
        let store = test_store().await;
        let first = store.issue(1).await.unwrap();
        let second = store.issue(1).await.unwrap();

        assert_eq!(store.peek(1).await.unwrap(), Some(second.clone()));
        assert!(!store.consume(1, &first).await.unwrap());
        assert!(store.consume(1, &second).await.unwrap());
    }

    #[tokio::test]
    async fn test_consume_is_single_use() {
        let store = test_store().await;
        let token = store.issue(7).await.unwrap();

        assert!(store.consume(7, &token).await.unwrap());
        assert!(!store.consume(7, &token).await.unwrap());
        assert_eq!(store.peek(7).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_consume_rejects_mismatch() {
        let store = test_store().await;
        let token = store.issue(7).await.unwrap();

        assert!(!store.consume(7, "WRONGTOKEN123").await.unwrap());
        // Case-sensitive comparison.
        assert!(!store.consume(7, &token.to_lowercase()).await.unwrap());
        assert_eq!(store.peek(7).await.unwrap(), Some(token));
    }

    #[tokio::test]
    async fn test_revoke_missing_is_noop() {
        let store = test_store().await;
        store.revoke(42).await.unwrap();

        let token = store.issue(42).await.unwrap();
        store.revoke(42).await.unwrap();
        assert!(!store.consume(42, &token).await.unwrap());
    }

    #[tokio::test]
    async fn test_tokens_are_scoped_per_file() {
        let store = test_store().await;
        let a = store.issue(1).await.unwrap();
        let b = store.issue(2).await.unwrap();

        if a != b {
            assert!(!store.consume(2, &a).await.unwrap());
        }
        assert!(store.consume(1, &a).await.unwrap());
        assert!(store.consume(2, &b).await.unwrap());
    }
}
