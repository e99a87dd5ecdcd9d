//! Error taxonomy surfaced by every service operation
use std::convert::Infallible;
use std::fmt;

use sled::transaction::TransactionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    Unauthorized,
    Internal,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{message}")]
    Internal { message: String, cause: String },
}

/// What a caller outside the crate gets to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub status: u16,
    pub error: &'static str,
    pub message: String,
    pub causes: Vec<String>,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }
    pub fn internal(message: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self::Internal {
            message: message.into(),
            cause: cause.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::BadRequest(_) => ErrorKind::BadRequest,
            ApiError::Unauthorized(_) => ErrorKind::Unauthorized,
            ApiError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::BadRequest => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Internal => 500,
        }
    }

    /// Stable tag clients can match on.
    pub fn tag(&self) -> &'static str {
        match self.kind() {
            ErrorKind::NotFound => "not_found",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Internal => "internal_server_error",
        }
    }

    // Store specific error text never leaves the process, only the generic message.
    pub fn response(&self) -> ErrorResponse {
        let causes = match self {
            ApiError::Internal { .. } => vec!["internal failure".to_string()],
            _ => vec![],
        };
        ErrorResponse {
            status: self.status(),
            error: self.tag(),
            message: self.to_string(),
            causes,
        }
    }
}

impl From<sled::Error> for ApiError {
    fn from(err: sled::Error) -> Self {
        ApiError::internal("database error", err)
    }
}

impl From<TransactionError<ApiError>> for ApiError {
    fn from(err: TransactionError<ApiError>) -> Self {
        match err {
            TransactionError::Abort(api) => api,
            TransactionError::Storage(err) => err.into(),
        }
    }
}

impl From<minicbor::decode::Error> for ApiError {
    fn from(err: minicbor::decode::Error) -> Self {
        ApiError::internal("failed to decode stored document", err)
    }
}

impl From<minicbor::encode::Error<Infallible>> for ApiError {
    fn from(err: minicbor::encode::Error<Infallible>) -> Self {
        ApiError::internal("failed to encode document", err)
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "message: {} - status: {} - error: {} - causes: {:?}",
            self.message, self.status, self.error, self.causes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_response_hides_cause() {
        let err = ApiError::internal("database error", "io: disk on fire at /var/lib/x");
        let res = err.response();

        assert_eq!(res.status, 500);
        assert_eq!(res.error, "internal_server_error");
        assert!(!res.to_string().contains("disk on fire"));
    }

    #[test]
    fn kinds_map_to_status() {
        assert_eq!(ApiError::not_found("x").status(), 404);
        assert_eq!(ApiError::bad_request("x").status(), 400);
        assert_eq!(ApiError::unauthorized("x").status(), 401);
        assert_eq!(ApiError::bad_request("x").tag(), "bad_request");
    }
}
