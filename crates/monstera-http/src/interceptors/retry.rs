//! Retry with exponential backoff

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Exchange, ResponseInterceptor};
use crate::{
    error::{HttpError, Result},
    request::ApiResponse,
};

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base delay, doubled for every further retry
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    /// Delay before the given retry (1-based): `retry_delay * 2^(attempt - 1)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.retry_delay.saturating_mul(1u32 << exponent)
    }
}

/// Resubmits requests that failed with a retryable status
///
/// The retry goes back through the owning client, so every middleware sees
/// the new attempt. The attempt counter travels on the request context.
#[derive(Debug, Clone, Copy)]
pub struct RetryInterceptor {
    policy: RetryPolicy,
}

impl RetryInterceptor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl ResponseInterceptor for RetryInterceptor {
    async fn on_response(
        &self,
        outcome: Result<ApiResponse>,
        exchange: &Exchange<'_>,
    ) -> Result<ApiResponse> {
        let error = match outcome {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        let Some(status) = error.status().filter(|_| error.is_retryable()) else {
            return Err(error);
        };
        let attempt = exchange.request.context.attempt;
        if attempt >= self.policy.max_retries {
            debug!(status = status.as_u16(), attempts = attempt + 1, "Retry limit reached");
            return Err(error);
        }

        let mut retry = exchange.request.clone();
        retry.context.attempt = attempt + 1;
        let delay = self.policy.delay_for_attempt(retry.context.attempt);
        warn!(
            status = status.as_u16(),
            path = %retry.path,
            attempt = retry.context.attempt,
            max_retries = self.policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            "Retrying request"
        );

        match retry.context.cancellation.clone() {
            Some(token) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = token.cancelled() => return Err(HttpError::Cancelled),
                }
            }
            None => tokio::time::sleep(delay).await,
        }
        if retry.is_cancelled() {
            return Err(HttpError::Cancelled);
        }

        exchange.client.send(retry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::{ApiClient, ClientSettings},
        mock::MockTransport,
        request::ApiRequest,
    };
    use reqwest::StatusCode;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn client_with_retry(transport: Arc<MockTransport>, max_retries: u32, delay_ms: u64) -> ApiClient {
        let client = ApiClient::new(ClientSettings::new("http://api.test"), transport);
        client
            .response_interceptors()
            .add(Arc::new(RetryInterceptor::new(RetryPolicy::new(
                max_retries,
                Duration::from_millis(delay_ms),
            ))));
        client
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let transport = Arc::new(MockTransport::new().with_statuses([503, 503, 200]));
        let client = client_with_retry(transport.clone(), 3, 100);

        let response = client.get("/reports").await.unwrap();
        assert_eq!(response.status, StatusCode::OK);

        let gaps = transport.call_gaps();
        assert_eq!(gaps.len(), 2);
        assert!(gaps[0] >= Duration::from_millis(100) && gaps[0] < Duration::from_millis(110));
        assert!(gaps[1] >= Duration::from_millis(200) && gaps[1] < Duration::from_millis(210));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let transport = Arc::new(MockTransport::new().with_statuses([429]));
        let client = client_with_retry(transport.clone(), 2, 10);

        let err = client.get("/limited").await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::TOO_MANY_REQUESTS));
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_status_is_not_retried() {
        let transport = Arc::new(MockTransport::new().with_statuses([404]));
        let client = client_with_retry(transport.clone(), 3, 10);

        let err = client.get("/missing").await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_retry() {
        let transport = Arc::new(MockTransport::new().with_statuses([503]));
        let client = client_with_retry(transport.clone(), 3, 1000);
        let token = CancellationToken::new();

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                token.cancel();
            })
        };

        let result = client
            .send(ApiRequest::get("/slow").cancellation(token))
            .await;
        canceller.await.unwrap();

        assert!(matches!(result, Err(HttpError::Cancelled)));
        assert_eq!(transport.call_count(), 1);
    }
}
