//! Error taxonomy shared by every game action.
//!
//! Core operations return [`GameResult`]. The WebSocket layer turns errors into
//! `ServerMessage::Error`, the HTTP layer into status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

pub type GameResult<T> = Result<T, GameError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    /// Malformed or out-of-range input, or wrong game/round state for the action
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Supporter token redeemed while incorrect or already used
    #[error("{0}")]
    InvalidTokenState(String),

    #[error("{0}")]
    Unauthorized(String),
}

impl GameError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Stable machine-readable code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            GameError::Validation(_) => "VALIDATION_ERROR",
            GameError::NotFound(_) => "NOT_FOUND",
            GameError::Conflict(_) => "CONFLICT",
            GameError::InvalidTokenState(_) => "INVALID_TOKEN_STATE",
            GameError::Unauthorized(_) => "UNAUTHORIZED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GameError::Validation(_) => StatusCode::BAD_REQUEST,
            GameError::NotFound(_) => StatusCode::NOT_FOUND,
            GameError::Conflict(_) | GameError::InvalidTokenState(_) => StatusCode::CONFLICT,
            GameError::Unauthorized(_) => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for GameError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "code": self.code(),
            "msg": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(GameError::validation("x").code(), "VALIDATION_ERROR");
        assert_eq!(GameError::not_found("Team").code(), "NOT_FOUND");
        assert_eq!(GameError::conflict("x").code(), "CONFLICT");
        assert_eq!(
            GameError::InvalidTokenState("x".into()).code(),
            "INVALID_TOKEN_STATE"
        );
        assert_eq!(GameError::Unauthorized("x".into()).code(), "UNAUTHORIZED");
    }

    #[test]
    fn test_not_found_message() {
        assert_eq!(GameError::not_found("Player").to_string(), "Player not found");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(GameError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            GameError::InvalidTokenState("x".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            GameError::Unauthorized("x".into()).status(),
            StatusCode::FORBIDDEN
        );
    }
}
