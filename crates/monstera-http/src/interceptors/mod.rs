//! Request/response middleware and the per-client registration registry

mod auth;
mod error_handling;
mod logging;
mod registry;
mod retry;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    client::{join_url, ApiClient},
    error::Result,
    request::{ApiRequest, ApiResponse},
};

pub use auth::AuthInterceptor;
pub use error_handling::{extract_message, normalize_error, ErrorHandlingInterceptor};
pub use logging::LoggingInterceptor;
pub use registry::{InterceptorRegistration, InterceptorRegistry};
pub use retry::{RetryInterceptor, RetryPolicy};

/// Transforms a request before it reaches the transport
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn on_request(&self, request: ApiRequest) -> Result<ApiRequest>;
}

/// Observes or replaces the outcome of a request
///
/// Handlers receive the success or the failure and return what the next
/// handler (or the caller) sees.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn on_response(
        &self,
        outcome: Result<ApiResponse>,
        exchange: &Exchange<'_>,
    ) -> Result<ApiResponse>;
}

/// The client and request a response belongs to
pub struct Exchange<'a> {
    pub client: &'a ApiClient,
    pub request: &'a ApiRequest,
}

impl Exchange<'_> {
    /// Absolute URL of the request, falling back to the raw path if it does not parse
    pub fn url(&self) -> String {
        join_url(self.client.base_url(), &self.request.path)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| self.request.path.clone())
    }
}

/// Kind of middleware; a client holds at most one registration per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MiddlewareType {
    Auth,
    Retry,
    Logging,
    Error,
    Custom,
}

impl fmt::Display for MiddlewareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MiddlewareType::Auth => "auth",
            MiddlewareType::Retry => "retry",
            MiddlewareType::Logging => "logging",
            MiddlewareType::Error => "error",
            MiddlewareType::Custom => "custom",
        };
        f.write_str(name)
    }
}
