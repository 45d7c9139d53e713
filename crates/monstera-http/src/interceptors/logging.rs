//! Request/response logging

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{Exchange, RequestInterceptor, ResponseInterceptor};
use crate::{
    error::Result,
    request::{ApiRequest, ApiResponse},
};

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingInterceptor;

#[async_trait]
impl RequestInterceptor for LoggingInterceptor {
    async fn on_request(&self, mut request: ApiRequest) -> Result<ApiRequest> {
        request.context.started_at = Some(Instant::now());
        debug!(method = %request.method, path = %request.path, attempt = request.context.attempt, "API request");
        Ok(request)
    }
}

#[async_trait]
impl ResponseInterceptor for LoggingInterceptor {
    async fn on_response(
        &self,
        outcome: Result<ApiResponse>,
        exchange: &Exchange<'_>,
    ) -> Result<ApiResponse> {
        let request = exchange.request;
        let duration_ms = request
            .context
            .started_at
            .map(|started| started.elapsed().as_millis() as u64);

        match &outcome {
            Ok(response) => info!(
                method = %request.method,
                url = %response.url,
                status = response.status.as_u16(),
                duration_ms,
                "API response"
            ),
            Err(e) => warn!(
                method = %request.method,
                url = %exchange.url(),
                status = e.status().map(|s| s.as_u16()),
                duration_ms,
                error = %e,
                "API request failed"
            ),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{client::ApiClient, mock::MockTransport, ClientSettings};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_stamps_start_instant() {
        let before = Instant::now();
        let request = LoggingInterceptor
            .on_request(ApiRequest::get("/ping"))
            .await
            .unwrap();
        assert_eq!(request.context.started_at, Some(before));
    }

    #[test]
    fn test_failure_url_includes_base() {
        let client = ApiClient::new(
            ClientSettings::new("http://api.test/api/v1"),
            Arc::new(MockTransport::new()),
        );
        let request = ApiRequest::get("/expenses");
        let exchange = Exchange {
            client: &client,
            request: &request,
        };

        assert_eq!(exchange.url(), "http://api.test/api/v1/expenses");
    }
}
