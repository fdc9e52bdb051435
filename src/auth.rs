//! Basic-auth extractor for the task queue principal plus password helpers.
use axum::{
    Extension,
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use std::future::Future;

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand_core::OsRng;
use tracing::warn;

use crate::SharedState;
use crate::config::QueueAuthConfig;
use crate::error::AppError;

/// Axum extractor that verifies the queue's Basic credentials against the configured hash.
pub struct QueuePrincipal(pub String);

impl<S> FromRequestParts<S> for QueuePrincipal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> {
        Box::pin(async move {
            let Extension(app_state): Extension<SharedState> =
                Extension::from_request_parts(parts, state)
                    .await
                    .map_err(|_| AppError::Internal(anyhow::anyhow!("missing state")))?;

            let (username, password) =
                basic_credentials(&parts.headers).ok_or(AppError::Unauthorized)?;
            if !check_queue_credentials(&app_state.config.queue_auth, &username, &password)? {
                warn!(%username, "rejected task queue credentials");
                return Err(AppError::Unauthorized);
            }
            Ok(QueuePrincipal(username))
        })
    }
}

/// `(username, password)` from an `Authorization: Basic` header.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let b64 = header.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(BASE64.decode(b64.trim()).ok()?).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

fn check_queue_credentials(
    auth: &QueueAuthConfig,
    username: &str,
    password: &str,
) -> Result<bool, AppError> {
    if username != auth.username {
        return Ok(false);
    }
    verify_password(&auth.password_hash, password).map_err(AppError::Internal)
}

/// Hash a plaintext password using Argon2 + random salt.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|_| anyhow::anyhow!("Failed to hash password"))?
        .to_string();
    Ok(hash)
}

/// Verify a plaintext password against a stored Argon2 hash.
pub fn verify_password(hash: &str, plain: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|_| anyhow::anyhow!("Failed to instantiate PasswordHash"))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(value).unwrap(),
        );
        headers
    }

    #[test]
    fn parses_basic_header() {
        let encoded = BASE64.encode("queue:s3cret:with:colons");
        assert_eq!(
            basic_credentials(&headers(&format!("Basic {encoded}"))),
            Some(("queue".into(), "s3cret:with:colons".into()))
        );
        assert_eq!(basic_credentials(&headers("Bearer abc")), None);
        assert_eq!(basic_credentials(&headers("Basic !!!")), None);
        assert_eq!(basic_credentials(&HeaderMap::new()), None);
    }

    #[test]
    fn checks_username_and_password() {
        let auth = QueueAuthConfig {
            username: "queue".into(),
            password_hash: hash_password("s3cret").unwrap(),
        };
        assert!(check_queue_credentials(&auth, "queue", "s3cret").unwrap());
        assert!(!check_queue_credentials(&auth, "queue", "wrong").unwrap());
        assert!(!check_queue_credentials(&auth, "other", "s3cret").unwrap());
    }
}
