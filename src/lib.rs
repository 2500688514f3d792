pub mod api;
pub mod config;
pub mod handlers;
pub mod infrastructure;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::UploadConfig;
use crate::services::registry::MediaRegistry;
use crate::services::tokens::TokenStore;
use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{post, put},
};
use sqlx::SqlitePool;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::media::create_media_item,
        handlers::media::prepare_for_upload,
        handlers::media::upload_file,
        handlers::media::postprocess_file,
    ),
    components(
        schemas(
            handlers::media::CreateMediaRequest,
            handlers::media::CreateMediaResponse,
            handlers::media::PrepareUploadRequest,
            handlers::media::PrepareUploadResponse,
            handlers::media::UploadHeaders,
            handlers::media::AckResponse,
            models::MediaItem,
            models::MediaFile,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "media", description = "Bulk media upload handshake")
    )
)]
pub struct ApiDoc;

/// Registers the HTTP basic scheme the admin-gated paths reference.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "basic",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Basic).build()),
        );
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub registry: MediaRegistry,
    pub tokens: TokenStore,
    pub config: UploadConfig,
}

impl AppState {
    pub fn new(db: SqlitePool, config: UploadConfig) -> Self {
        Self {
            registry: MediaRegistry::new(db.clone()),
            tokens: TokenStore::new(db.clone(), config.token_length),
            db,
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let admin_gate = from_fn_with_state(state.clone(), middleware::auth::admin_auth);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route(
            "/api/media",
            post(handlers::media::create_media_item).layer(admin_gate.clone()),
        )
        .route(
            "/api/media/:media_id/files",
            post(handlers::media::prepare_for_upload).layer(admin_gate.clone()),
        )
        // Gated by the upload token, not by admin credentials.
        .route(
            "/api/media/:media_id/files/:file_id/content",
            post(handlers::media::upload_file),
        )
        .route(
            "/api/media/:media_id/files/:file_id/postprocess",
            put(handlers::media::postprocess_file).layer(admin_gate),
        )
        .with_state(state)
}
