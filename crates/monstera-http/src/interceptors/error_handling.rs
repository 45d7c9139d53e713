//! Error normalisation into `{type, message, status}`

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{Exchange, ResponseInterceptor};
use crate::{
    error::{ErrorDescriptor, ErrorKind, HttpError, Result},
    request::ApiResponse,
};

/// Wraps unhandled errors as [`HttpError::Handled`]
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorHandlingInterceptor;

#[async_trait]
impl ResponseInterceptor for ErrorHandlingInterceptor {
    async fn on_response(
        &self,
        outcome: Result<ApiResponse>,
        exchange: &Exchange<'_>,
    ) -> Result<ApiResponse> {
        match outcome {
            Err(e) if !e.is_handled() => {
                let descriptor = normalize_error(&e);
                debug!(
                    client = %exchange.client.id(),
                    kind = %descriptor.kind,
                    status = descriptor.status,
                    "Normalised API error"
                );
                Err(HttpError::Handled {
                    descriptor,
                    source: Box::new(e),
                })
            }
            other => other,
        }
    }
}

/// Build the descriptor for an error
pub fn normalize_error(error: &HttpError) -> ErrorDescriptor {
    let (kind, status) = match error {
        HttpError::Handled { descriptor, .. } => return descriptor.clone(),
        HttpError::HttpStatus { status, body, .. } => {
            let kind = ErrorKind::from_status(*status);
            return ErrorDescriptor {
                kind,
                message: extract_message(body)
                    .unwrap_or_else(|| kind.default_message().to_string()),
                status: status.as_u16(),
            };
        }
        HttpError::Timeout(_) => (ErrorKind::Timeout, 504),
        HttpError::RequestFailed(e) if e.is_timeout() => (ErrorKind::Timeout, 504),
        HttpError::RequestFailed(_) | HttpError::Transport(_) => (ErrorKind::Network, 0),
        HttpError::Cancelled => (ErrorKind::Cancelled, 0),
        HttpError::InvalidUrl(_)
        | HttpError::InvalidHeader(_)
        | HttpError::Json(_)
        | HttpError::BuildError(_) => {
            return ErrorDescriptor {
                kind: ErrorKind::Unknown,
                message: error.to_string(),
                status: 500,
            };
        }
    };

    ErrorDescriptor {
        kind,
        message: kind.default_message().to_string(),
        status,
    }
}

/// Pull a human-readable message out of an error body
///
/// JSON bodies are searched for `message`, `error.message`, `error` and
/// `errors[0].message` in that order. Non-JSON bodies are used verbatim.
pub fn extract_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return Some(body.to_string());
    };

    let candidates = [
        json.get("message"),
        json.get("error").and_then(|e| e.get("message")),
        json.get("error"),
        json.get("errors")
            .and_then(|e| e.get(0))
            .and_then(|e| e.get("message")),
    ];
    let message = candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::time::Duration;

    fn status_error(code: u16, body: &str) -> HttpError {
        HttpError::HttpStatus {
            status: StatusCode::from_u16(code).unwrap(),
            message: String::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_message_precedence() {
        assert_eq!(
            extract_message(r#"{"message": "top", "error": {"message": "nested"}}"#).as_deref(),
            Some("top")
        );
        assert_eq!(
            extract_message(r#"{"error": {"message": "nested"}}"#).as_deref(),
            Some("nested")
        );
        assert_eq!(extract_message(r#"{"error": "flat"}"#).as_deref(), Some("flat"));
        assert_eq!(
            extract_message(r#"{"errors": [{"message": "first"}, {"message": "second"}]}"#)
                .as_deref(),
            Some("first")
        );
        assert_eq!(extract_message("Bad Gateway").as_deref(), Some("Bad Gateway"));
        assert_eq!(extract_message(r#"{"code": 7}"#), None);
        assert_eq!(extract_message("  "), None);
    }

    #[test]
    fn test_normalize_status_error() {
        let descriptor = normalize_error(&status_error(422, r#"{"message": "amount must be positive"}"#));
        assert_eq!(descriptor.kind, ErrorKind::Validation);
        assert_eq!(descriptor.message, "amount must be positive");
        assert_eq!(descriptor.status, 422);

        let descriptor = normalize_error(&status_error(404, ""));
        assert_eq!(descriptor.kind, ErrorKind::NotFound);
        assert_eq!(descriptor.message, ErrorKind::NotFound.default_message());
    }

    #[test]
    fn test_normalize_transport_errors() {
        let timeout = normalize_error(&HttpError::Timeout(Duration::from_secs(5)));
        assert_eq!((timeout.kind, timeout.status), (ErrorKind::Timeout, 504));

        let network = normalize_error(&HttpError::Transport("connection reset".to_string()));
        assert_eq!((network.kind, network.status), (ErrorKind::Network, 0));

        let cancelled = normalize_error(&HttpError::Cancelled);
        assert_eq!(cancelled.kind, ErrorKind::Cancelled);

        let invalid = normalize_error(&HttpError::InvalidUrl("::".to_string()));
        assert_eq!((invalid.kind, invalid.status), (ErrorKind::Unknown, 500));
    }

    #[test]
    fn test_normalize_handled_keeps_descriptor() {
        let descriptor = ErrorDescriptor {
            kind: ErrorKind::Forbidden,
            message: "nope".to_string(),
            status: 403,
        };
        let handled = HttpError::Handled {
            descriptor: descriptor.clone(),
            source: Box::new(status_error(403, "")),
        };
        assert_eq!(normalize_error(&handled), descriptor);
    }
}
