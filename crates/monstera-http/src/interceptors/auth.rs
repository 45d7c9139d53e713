//! Credential forwarding and 401 observation

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::warn;

use super::{Exchange, RequestInterceptor, ResponseInterceptor};
use crate::{
    error::Result,
    request::{ApiRequest, ApiResponse},
};

/// Forces cookies on every request and reports unauthorized responses
///
/// There is no token refresh: a 401 is logged and handed on unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct AuthInterceptor;

#[async_trait]
impl RequestInterceptor for AuthInterceptor {
    async fn on_request(&self, request: ApiRequest) -> Result<ApiRequest> {
        Ok(request.with_credentials(true))
    }
}

#[async_trait]
impl ResponseInterceptor for AuthInterceptor {
    async fn on_response(
        &self,
        outcome: Result<ApiResponse>,
        exchange: &Exchange<'_>,
    ) -> Result<ApiResponse> {
        if let Err(e) = &outcome {
            if e.status() == Some(StatusCode::UNAUTHORIZED) {
                warn!(
                    client = %exchange.client.id(),
                    base_url = exchange.client.base_url(),
                    path = %exchange.request.path,
                    "Unauthorized response"
                );
            }
        }
        outcome
    }
}
