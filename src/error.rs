use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use log::error;

use crate::ai_endpoints::ReportError;
use crate::store::StoreError;

/// Login failures. The messages are shown to the end user as-is.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Credentials not recognized in our database. Try signing up!")]
    UnknownEmail,

    #[error("Incorrect access key for this command address.")]
    WrongPassword,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    ConfirmationRequired(String),

    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Report(#[from] ReportError),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(what.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ConfirmationRequired(_) => StatusCode::PRECONDITION_REQUIRED,
            AppError::Report(_) => StatusCode::BAD_GATEWAY,
            AppError::Hash(_) | AppError::Token(_) | AppError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = match self {
            AppError::Report(e) => {
                error!("Report generation failed: {}", e);
                "AI report failed. Ensure your Gemini key is correct.".to_string()
            }
            AppError::Store(e) => {
                error!("Storage error: {}", e);
                "Storage error".to_string()
            }
            AppError::Hash(_) | AppError::Token(_) => {
                error!("{}", self);
                "Internal error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(status).json(serde_json::json!({ "error": message }))
    }
}
