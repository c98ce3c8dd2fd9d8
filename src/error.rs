use thiserror::Error;

/// Errors raised by a document database behind the stream server.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DbError {
    /// Document is missing or deleted. The payload is the reason reported
    /// to clients (`missing` or `deleted`).
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document update conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Document validation failed: {0}")]
    DocValidation(String),

    #[error("Invalid rev format: {0}")]
    InvalidRev(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Errors that stop a server from starting or serving
#[derive(Error, Debug)]
pub enum ServerError {
    /// A wrapper factory refused to build its handler
    #[error("Wrapper factory for '{method}' failed: {reason}")]
    Wrapper { method: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Short error name used on the wire (`not_found`, `conflict`, ...)
    pub fn name(&self) -> &'static str {
        match self {
            DbError::NotFound(_) => "not_found",
            DbError::Conflict(_) => "conflict",
            DbError::BadRequest(_) | DbError::InvalidRev(_) => "bad_request",
            DbError::DocValidation(_) => "doc_validation",
            DbError::Internal(_) => "internal_error",
        }
    }

    /// HTTP-like status code matching the error name
    pub fn status(&self) -> u16 {
        match self {
            DbError::NotFound(_) => 404,
            DbError::Conflict(_) => 409,
            DbError::BadRequest(_) | DbError::InvalidRev(_) | DbError::DocValidation(_) => 400,
            DbError::Internal(_) => 500,
        }
    }

    /// Human readable reason without the variant prefix
    pub fn reason(&self) -> &str {
        match self {
            DbError::NotFound(msg)
            | DbError::Conflict(msg)
            | DbError::BadRequest(msg)
            | DbError::DocValidation(msg)
            | DbError::InvalidRev(msg)
            | DbError::Internal(msg) => msg,
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Internal(err.to_string())
    }
}
