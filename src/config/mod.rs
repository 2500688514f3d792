use std::env;

/// Upload handshake configuration
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Base URL clients are told to send bytes to (default: "http://127.0.0.1:3000")
    pub public_base_url: String,

    /// Directory the local storage engine writes under (default: "./media-storage")
    pub storage_root: String,

    /// Length of issued upload tokens (default: 13)
    pub token_length: usize,

    /// Maximum accepted upload body in bytes (default: 2 GB)
    pub max_upload_size: usize,

    /// Port the server listens on (default: 3000)
    pub listen_port: u16,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://127.0.0.1:3000".to_string(),
            storage_root: "./media-storage".to_string(),
            token_length: 13,
            max_upload_size: 2 * 1024 * 1024 * 1024, // 2 GB
            listen_port: 3000,
        }
    }
}

impl UploadConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            public_base_url: env::var("PUBLIC_BASE_URL").unwrap_or(default.public_base_url),

            storage_root: env::var("STORAGE_ROOT").unwrap_or(default.storage_root),

            token_length: env::var("UPLOAD_TOKEN_LENGTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.token_length),

            max_upload_size: env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_upload_size),

            listen_port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.listen_port),
        }
    }

    /// Config for tests (small uploads, throwaway storage root)
    pub fn development() -> Self {
        Self {
            public_base_url: "http://127.0.0.1:3000".to_string(),
            storage_root: "./media-storage-dev".to_string(),
            token_length: 13,
            max_upload_size: 64 * 1024 * 1024,
            listen_port: 3000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = UploadConfig::default();
        assert_eq!(config.token_length, 13);
        assert_eq!(config.listen_port, 3000);
        assert_eq!(config.public_base_url, "http://127.0.0.1:3000");
    }

    #[test]
    fn test_development_config() {
        let config = UploadConfig::development();
        assert_eq!(config.max_upload_size, 64 * 1024 * 1024);
        assert_eq!(config.token_length, 13);
    }
}
