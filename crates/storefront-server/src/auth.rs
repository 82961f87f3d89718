use axum::http::StatusCode;
use jsonwebtoken::{DecodingKey, Validation, decode};

use storefront_types::api::Claims;
use storefront_types::models::Viewer;

/// Validate a session token issued by the auth service and return the
/// identity it names.
pub fn verify_token(token: &str, secret: &str) -> Result<Viewer, StatusCode> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    if token_data.claims.sub.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token_data.claims.viewer())
}
