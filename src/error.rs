//! HTTP error type rendered as `{error, details?}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, warn};

use crate::{
    board::BoardError,
    contents::ContentsError,
    oauth::{OAuthError, Provider},
};

/// Failure of an HTTP request, rendered as `{error, details?}`.
///
/// `error` carries the user-facing message; `details` is best-effort
/// diagnostic context from the layer that failed.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{message}")]
    InvalidToken { message: String, details: Value },

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{message}: {details}")]
    Internal { message: String, details: String },

    /// Upstream answered with an error status that is relayed unchanged.
    #[error("{message} ({status}): {details}")]
    Upstream {
        status: StatusCode,
        message: String,
        details: String,
    },
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(message.into())
    }

    pub fn internal(message: impl Into<String>, details: impl ToString) -> Self {
        AppError::Internal {
            message: message.into(),
            details: details.to_string(),
        }
    }

    /// Map a board failure; `message` names the operation for 5xx answers.
    pub fn from_board(err: BoardError, message: &str) -> Self {
        match err {
            BoardError::DuplicateVote { .. } => AppError::Conflict("Usuário já votou".into()),
            BoardError::NotOwner { .. } => {
                AppError::Forbidden("Comentário não pertence ao usuário".into())
            }
            BoardError::MissingFile(path) if path.contains("/votos/") => {
                AppError::NotFound("Votos não encontrados para esta referência".into())
            }
            BoardError::MissingFile(_) => {
                AppError::NotFound("Arquivo de comentários não encontrado".into())
            }
            other => AppError::internal(message, other),
        }
    }

    /// Map a contents API failure; `message` names the operation.
    pub fn from_contents(err: ContentsError, message: &str) -> Self {
        AppError::internal(message, err)
    }

    pub fn from_oauth(err: OAuthError, provider: Provider) -> Self {
        match err {
            OAuthError::MissingToken { details, .. } => AppError::InvalidToken {
                message: "Token inválido".into(),
                details,
            },
            OAuthError::Http(e) => {
                AppError::internal(format!("Erro ao autenticar com {provider}"), e)
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::InvalidToken { .. } => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upstream { status, .. } => *status,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, error = %self, "request failed");
        } else {
            warn!(%status, error = %self, "request rejected");
        }
        let body = match self {
            AppError::BadRequest(message)
            | AppError::Forbidden(message)
            | AppError::NotFound(message)
            | AppError::Conflict(message) => ErrorBody {
                error: message,
                details: None,
            },
            AppError::InvalidToken { message, details } => ErrorBody {
                error: message,
                details: Some(details),
            },
            AppError::Internal { message, details } | AppError::Upstream { message, details, .. } => {
                ErrorBody {
                    error: message,
                    details: Some(Value::String(details)),
                }
            }
        };
        (status, Json(body)).into_response()
    }
}
