//! Transport seam between the client pipeline and the network

use async_trait::async_trait;
use tracing::debug;

use crate::{
    error::{HttpError, Result},
    request::{ApiResponse, PreparedRequest, RequestBody},
};

/// Sends a prepared request and buffers the response
///
/// Implementations return `Ok` for every response that arrived, whatever its
/// status; status classification happens in the client pipeline.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: PreparedRequest) -> Result<ApiResponse>;
}

/// Production transport backed by `reqwest`
///
/// Keeps two connection pools: credentialed requests share a cookie store,
/// anonymous ones never send or store cookies.
pub struct ReqwestTransport {
    credentialed: reqwest::Client,
    anonymous: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let credentialed = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| HttpError::BuildError(e.to_string()))?;
        let anonymous = reqwest::Client::builder()
            .build()
            .map_err(|e| HttpError::BuildError(e.to_string()))?;

        Ok(Self {
            credentialed,
            anonymous,
        })
    }

    /// Get the underlying reqwest client for the given credentials mode
    pub fn inner(&self, with_credentials: bool) -> &reqwest::Client {
        if with_credentials {
            &self.credentialed
        } else {
            &self.anonymous
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: PreparedRequest) -> Result<ApiResponse> {
        debug!(method = %request.method, url = %request.url, "HTTP send");

        let timeout = request.timeout;
        let mut builder = self
            .inner(request.with_credentials)
            .request(request.method, request.url)
            .headers(request.headers)
            .timeout(timeout);

        builder = match request.body {
            Some(RequestBody::Json(value)) => builder.json(&value),
            Some(RequestBody::Text(text)) => builder.body(text),
            Some(RequestBody::Bytes(bytes)) => builder.body(bytes),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout(timeout)
            } else {
                HttpError::RequestFailed(e)
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().to_string();
        let body = response.bytes().await?.to_vec();

        Ok(ApiResponse {
            status,
            headers,
            body,
            url,
        })
    }
}
