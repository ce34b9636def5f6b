use std::path::PathBuf;

use thiserror::Error;

/// Error text markers that indicate the client sent something wrong, as
/// opposed to the database being broken. SQLite only exposes this
/// distinction through the message text.
const CLIENT_ERROR_MARKERS: &[&str] = &[
    "no such table",
    "no such column",
    "syntax error",
    "constraint failed",
    "UNIQUE constraint",
];

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("failed to open database: {path}: {message}")]
    DbOpenFailed { path: PathBuf, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        let msg = e.to_string();
        if CLIENT_ERROR_MARKERS.iter().any(|m| msg.contains(m)) {
            AppError::BadRequest(msg)
        } else {
            AppError::Internal(msg)
        }
    }
}

impl AppError {
    /// HTTP status carried in the error envelope.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) => 400,
            AppError::NotFound(_) => 404,
            AppError::Forbidden(_) => 403,
            AppError::Unauthorized => 401,
            AppError::DbOpenFailed { .. }
            | AppError::Io(_)
            | AppError::Json(_)
            | AppError::Internal(_) => 500,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
