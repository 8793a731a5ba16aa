//! Moderator secret handling.
//!
//! The WebSocket handler checks `?secret=` with [`AuthConfig::verify`]; the
//! snapshot endpoints use HTTP Basic Authentication with the secret as password.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Safe character set for generated secrets (excludes 0/O, 1/I/L to avoid confusion)
const SECRET_CHARS: &[u8] = b"abcdefghjkmnpqrstuvwxyz23456789";
const GENERATED_SECRET_LENGTH: usize = 8;

/// Authentication configuration.
///
/// Only the SHA-256 digest of the moderator secret is kept around.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    secret_digest: String,
}

fn digest(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

fn generate_secret() -> String {
    let mut rng = rand::rng();
    (0..GENERATED_SECRET_LENGTH)
        .map(|_| SECRET_CHARS[rng.random_range(0..SECRET_CHARS.len())] as char)
        .collect()
}

impl AuthConfig {
    pub fn new(secret: &str) -> Self {
        Self {
            secret_digest: digest(secret),
        }
    }

    /// Load the secret from MODERATOR_SECRET, or generate one and log it once
    pub fn from_env() -> Self {
        match std::env::var("MODERATOR_SECRET")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
        {
            Some(secret) => {
                tracing::info!("Moderator secret loaded from environment");
                Self::new(&secret)
            }
            None => {
                let secret = generate_secret();
                tracing::warn!(
                    "MODERATOR_SECRET not set, generated moderator secret: {}",
                    secret
                );
                Self::new(&secret)
            }
        }
    }

    /// Check a candidate secret
    pub fn verify(&self, candidate: &str) -> bool {
        constant_time_eq(digest(candidate).as_bytes(), self.secret_digest.as_bytes())
    }

    /// Check an `Authorization: Basic ...` header value. The username is ignored.
    pub fn verify_basic(&self, header_value: &str) -> bool {
        let Some(credentials) = header_value.strip_prefix("Basic ") else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(credentials.trim()) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        match decoded.split_once(':') {
            Some((_, password)) => self.verify(password),
            None => false,
        }
    }
}

/// Constant-time byte comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

fn unauthorized(realm: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, format!("Basic realm=\"{}\"", realm))],
        "Unauthorized",
    )
        .into_response()
}

/// Middleware for HTTP Basic Authentication on moderator routes
pub async fn moderator_auth_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| auth_config.verify_basic(value));

    if authorized {
        next.run(request).await
    } else {
        tracing::warn!("Rejected moderator request to {}", request.uri().path());
        unauthorized("Wedding Quiz Moderator")
    }
}
