/// Unified error types for the account service
use crate::codes;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum AtlasError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Counter store errors
    #[error("Counter store error: {0}")]
    Cache(#[from] redis::RedisError),

    /// Fatal configuration errors (missing shard, invalid partition config)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operational errors carrying a stable wire code; the log detail is
    /// written server-side and never returned to the caller.
    #[error("code {code}: {log}")]
    Op { code: i32, log: String },

    /// Rate limit triggered; code 114 carries a CAPTCHA challenge descriptor
    #[error("rate limited, code {code}")]
    Limited {
        code: i32,
        challenge: Option<crate::captcha::Challenge>,
    },

    /// Mail delivery errors
    #[error("Mail error: {0}")]
    Mail(String),

    /// JWT errors
    #[error("Token error: {0}")]
    Token(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AtlasError {
    /// Operational error with a wire code and a server-side log line.
    pub fn op(code: i32, log: impl Into<String>) -> Self {
        AtlasError::Op {
            code,
            log: log.into(),
        }
    }

    /// The numeric code reported to the caller for this error.
    pub fn wire_code(&self) -> i32 {
        match self {
            AtlasError::Op { code, .. } => *code,
            AtlasError::Limited { code, .. } => *code,
            AtlasError::Token(_) => codes::LOGIN_TOKEN_PARSE_ERROR,
            _ => codes::FAILURE,
        }
    }
}

/// Envelope for error responses: same shape as success responses,
/// `data` only present for challenge payloads.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Convert AtlasError to an HTTP response.
///
/// The wire contract reports failures through the numeric code in the body;
/// HTTP status stays 200 for operational errors so older client SDKs keep
/// parsing the envelope. Internal detail is logged, never sent.
impl IntoResponse for AtlasError {
    fn into_response(self) -> Response {
        let (status, code, data) = match &self {
            AtlasError::Op { code, log } => {
                error!(code, "request failed: {}", log);
                (StatusCode::OK, *code, None)
            }
            AtlasError::Limited { code, challenge } => {
                let data = challenge
                    .as_ref()
                    .and_then(|c| serde_json::to_value(c).ok());
                (StatusCode::OK, *code, data)
            }
            AtlasError::Token(e) => {
                error!("token error: {}", e);
                (StatusCode::OK, codes::LOGIN_TOKEN_PARSE_ERROR, None)
            }
            AtlasError::Database(e) => {
                error!("database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, codes::FAILURE, None)
            }
            AtlasError::Cache(e) => {
                error!("counter store error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, codes::FAILURE, None)
            }
            AtlasError::Config(e) | AtlasError::Internal(e) => {
                error!("internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, codes::FAILURE, None)
            }
            AtlasError::Mail(e) => {
                error!("mail error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, codes::FAILURE, None)
            }
            AtlasError::Io(e) => {
                error!("io error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, codes::FAILURE, None)
            }
        };

        let body = Json(ErrorBody {
            code,
            message: codes::message(code).to_string(),
            data,
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type AtlasResult<T> = Result<T, AtlasError>;
