use crate::AppState;
use crate::api::error::ApiError;
use crate::models::User;
use argon2::{Argon2, password_hash::PasswordVerifier};
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};

/// Authenticated administrator, inserted into request extensions by
/// `admin_auth`.
#[derive(Clone, Debug)]
pub struct AdminUser {
    pub id: i64,
    pub username: String,
}

/// Split an Authorization header into basic-auth credentials. Only the
/// "basic" scheme is accepted.
fn parse_basic_credentials(header: &str) -> Option<(String, String)> {
    let (scheme, payload) = header.split_once(' ')?;
    if !scheme.trim().eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(payload.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Admin gate for item creation, upload preparation and postprocessing.
/// The byte-transfer phase is deliberately not wrapped; it is gated by
/// the upload token instead.
pub async fn admin_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let (username, password) = parse_basic_credentials(header).ok_or(ApiError::Unauthorized)?;

    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, password_hash, is_admin, created_at FROM users WHERE username = ?",
    )
    .bind(&username)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::Unauthorized)?;

    if !user.is_admin {
        return Err(ApiError::Unauthorized);
    }

    let parsed_hash = argon2::PasswordHash::new(&user.password_hash)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    req.extensions_mut().insert(AdminUser {
        id: user.id,
        username: user.username,
    });

    Ok(next.run(req).await)
}
