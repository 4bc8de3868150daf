//! Registry Error Types
//!
//! Error taxonomy for registry operations. Every error carries a status
//! classification so callers can map it onto their own response model.

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Numeric status classification attached to operation results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    Created,
    NoContent,
    BadRequest,
    NotFound,
    InternalError,
}

impl StatusCode {
    /// Numeric value of the classification
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::NoContent => 204,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::InternalError => 500,
        }
    }

    /// True for the 2xx classifications
    pub fn is_success(&self) -> bool {
        self.as_u16() < 300
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::NoContent => "NoContent",
            StatusCode::BadRequest => "BadRequest",
            StatusCode::NotFound => "NotFound",
            StatusCode::InternalError => "InternalServerError",
        };
        write!(f, "{} {}", self.as_u16(), name)
    }
}

impl Serialize for StatusCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.as_u16())
    }
}

/// Error types for registry operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Lookup or export target is absent
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Malformed specification or upload package
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// I/O, decryption, provider or publish failure
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RegistryError {
    /// Create a not found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound { message: message.into() }
    }

    /// Create a bad request error
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::BadRequest { message: message.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Status classification of this error
    pub fn status(&self) -> StatusCode {
        match self {
            RegistryError::NotFound { .. } => StatusCode::NotFound,
            RegistryError::BadRequest { .. } => StatusCode::BadRequest,
            RegistryError::Internal { .. } => StatusCode::InternalError,
        }
    }

    /// The bare message without the classification prefix
    pub fn message(&self) -> &str {
        match self {
            RegistryError::NotFound { message }
            | RegistryError::BadRequest { message }
            | RegistryError::Internal { message } => message,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound { .. })
    }

    pub fn is_bad_request(&self) -> bool {
        matches!(self, RegistryError::BadRequest { .. })
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, RegistryError::Internal { .. })
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        RegistryError::internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::bad_request(format!("JSON error: {}", err))
    }
}

impl From<tokio::task::JoinError> for RegistryError {
    fn from(err: tokio::task::JoinError) -> Self {
        RegistryError::internal(format!("Task join error: {}", err))
    }
}

impl From<base64::DecodeError> for RegistryError {
    fn from(err: base64::DecodeError) -> Self {
        RegistryError::bad_request(format!("Base64 error: {}", err))
    }
}
