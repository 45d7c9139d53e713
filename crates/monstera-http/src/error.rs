//! HTTP client error types

use std::{fmt, time::Duration};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, HttpError>;

/// HTTP client errors
#[derive(Debug, Error)]
pub enum HttpError {
    /// Network request failed before a response arrived
    #[error("Network request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Transport failure reported by a non-reqwest transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The request's cancellation token fired
    #[error("Request was cancelled")]
    Cancelled,

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid header name or value
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// HTTP error status
    #[error("HTTP {status}: {message}")]
    HttpStatus {
        status: StatusCode,
        message: String,
        body: String,
    },

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Client build error
    #[error("Failed to build HTTP client: {0}")]
    BuildError(String),

    /// Error already normalised by the error-handling middleware
    #[error("{source}")]
    Handled {
        descriptor: ErrorDescriptor,
        source: Box<HttpError>,
    },
}

impl HttpError {
    /// Response status, looking through handled wrappers
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::HttpStatus { status, .. } => Some(*status),
            HttpError::Handled { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Whether the error-handling middleware has already processed this error
    pub fn is_handled(&self) -> bool {
        matches!(self, HttpError::Handled { .. })
    }

    /// Normalised descriptor attached by the error-handling middleware
    pub fn descriptor(&self) -> Option<&ErrorDescriptor> {
        match self {
            HttpError::Handled { descriptor, .. } => Some(descriptor),
            _ => None,
        }
    }

    /// The underlying error beneath any handled wrapper
    pub fn root(&self) -> &HttpError {
        match self {
            HttpError::Handled { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the retry middleware resubmits on this error
    ///
    /// Only an HTTP status in [`RETRYABLE_STATUSES`] qualifies; network
    /// failures and timeouts are surfaced as they are.
    pub fn is_retryable(&self) -> bool {
        self.status().is_some_and(is_retryable_status)
    }
}

/// Statuses the retry middleware resubmits on
pub const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Check a status against [`RETRYABLE_STATUSES`]
pub fn is_retryable_status(status: StatusCode) -> bool {
    RETRYABLE_STATUSES.contains(&status.as_u16())
}

/// Category of a normalised API error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    #[serde(rename = "NETWORK_ERROR")]
    Network,
    Timeout,
    Cancelled,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    RateLimited,
    #[serde(rename = "SERVER_ERROR")]
    Server,
    #[serde(rename = "UNKNOWN_ERROR")]
    Unknown,
}

impl ErrorKind {
    /// Map an HTTP status to an error category
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            400 => ErrorKind::BadRequest,
            401 => ErrorKind::Unauthorized,
            403 => ErrorKind::Forbidden,
            404 => ErrorKind::NotFound,
            408 | 504 => ErrorKind::Timeout,
            409 => ErrorKind::Conflict,
            422 => ErrorKind::Validation,
            429 => ErrorKind::RateLimited,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Unknown,
        }
    }

    /// Fallback message when the response carries none
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::Network => "A network error occurred. Please check your connection.",
            ErrorKind::Timeout => "The request timed out.",
            ErrorKind::Cancelled => "The request was cancelled.",
            ErrorKind::BadRequest => "The request was invalid.",
            ErrorKind::Unauthorized => "Authentication is required.",
            ErrorKind::Forbidden => "You do not have permission to perform this action.",
            ErrorKind::NotFound => "The requested resource was not found.",
            ErrorKind::Conflict => "The resource was modified by another request.",
            ErrorKind::Validation => "The submitted data failed validation.",
            ErrorKind::RateLimited => "Too many requests. Please try again later.",
            ErrorKind::Server => "The server encountered an error.",
            ErrorKind::Unknown => "An unexpected error occurred.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::Server => "SERVER_ERROR",
            ErrorKind::Unknown => "UNKNOWN_ERROR",
        };
        f.write_str(name)
    }
}

/// Structured `{type, message, status}` shape attached to handled errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    pub status: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_error(code: u16) -> HttpError {
        HttpError::HttpStatus {
            status: StatusCode::from_u16(code).unwrap(),
            message: "boom".to_string(),
            body: String::new(),
        }
    }

    #[test]
    fn test_retryable_statuses() {
        for code in RETRYABLE_STATUSES {
            assert!(is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::NOT_IMPLEMENTED));
    }

    #[test]
    fn test_only_statuses_are_retryable() {
        assert!(status_error(429).is_retryable());
        assert!(!status_error(422).is_retryable());
        assert!(!HttpError::Timeout(std::time::Duration::from_secs(1)).is_retryable());
        assert!(!HttpError::Transport("connection reset".to_string()).is_retryable());
        assert!(!HttpError::Cancelled.is_retryable());
    }

    #[test]
    fn test_status_looks_through_handled() {
        let handled = HttpError::Handled {
            descriptor: ErrorDescriptor {
                kind: ErrorKind::Server,
                message: "boom".to_string(),
                status: 503,
            },
            source: Box::new(status_error(503)),
        };

        assert!(handled.is_handled());
        assert_eq!(handled.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert!(handled.is_retryable());
        assert!(matches!(handled.root(), HttpError::HttpStatus { .. }));
        assert_eq!(handled.to_string(), "HTTP 503 Service Unavailable: boom");
    }

    #[test]
    fn test_error_kind_from_status() {
        assert_eq!(ErrorKind::from_status(StatusCode::UNAUTHORIZED), ErrorKind::Unauthorized);
        assert_eq!(ErrorKind::from_status(StatusCode::TOO_MANY_REQUESTS), ErrorKind::RateLimited);
        assert_eq!(ErrorKind::from_status(StatusCode::BAD_GATEWAY), ErrorKind::Server);
        assert_eq!(ErrorKind::from_status(StatusCode::IM_A_TEAPOT), ErrorKind::Unknown);
    }

    #[test]
    fn test_descriptor_serializes_type_field() {
        let descriptor = ErrorDescriptor {
            kind: ErrorKind::NotFound,
            message: "missing".to_string(),
            status: 404,
        };
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["type"], "NOT_FOUND");
        assert_eq!(json["status"], 404);
    }
}
