//! API client with request/response interceptor chains

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use futures::future::BoxFuture;
use parking_lot::RwLock;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION},
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::{
    error::{HttpError, Result},
    interceptors::{Exchange, RequestInterceptor, ResponseInterceptor},
    request::{ApiRequest, ApiResponse, PreparedRequest},
    transport::Transport,
};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a client, never reused within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Handle returned when a handler is added to a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Ordered list of interceptors that can be ejected by id
pub struct InterceptorChain<H: ?Sized> {
    next_id: AtomicU64,
    handlers: RwLock<Vec<(HandlerId, Arc<H>)>>,
}

impl<H: ?Sized> InterceptorChain<H> {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Append a handler, returning its id
    pub fn add(&self, handler: Arc<H>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, handler));
        id
    }

    /// Remove a handler; unknown ids are ignored
    pub fn eject(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() != before
    }

    pub fn ids(&self) -> Vec<HandlerId> {
        self.handlers.read().iter().map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current handlers, so dispatch never holds the lock
    fn snapshot(&self) -> Vec<Arc<H>> {
        self.handlers
            .read()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }
}

/// Connection settings fixed at construction
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub timeout: Duration,
    pub with_credentials: bool,
    pub headers: HeaderMap,
}

impl ClientSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            with_credentials: true,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_credentials(mut self, enabled: bool) -> Self {
        self.with_credentials = enabled;
        self
    }

    /// Add a default header, validating name and value
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HttpError::InvalidHeader(format!("{name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| HttpError::InvalidHeader(format!("{name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Set `Authorization: Bearer <token>`
    pub fn with_bearer_token(mut self, token: &str) -> Result<Self> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| HttpError::InvalidHeader(format!("authorization: {e}")))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }
}

struct ClientInner {
    id: ClientId,
    settings: ClientSettings,
    transport: Arc<dyn Transport>,
    request_interceptors: InterceptorChain<dyn RequestInterceptor>,
    response_interceptors: InterceptorChain<dyn ResponseInterceptor>,
}

/// Shared handle to an API client
///
/// Cloning is cheap and every clone refers to the same client, interceptor
/// chains included. Equality is identity.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

/// Non-owning reference to an [`ApiClient`]
#[derive(Clone)]
pub struct WeakApiClient {
    id: ClientId,
    inner: Weak<ClientInner>,
}

impl WeakApiClient {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn upgrade(&self) -> Option<ApiClient> {
        self.inner.upgrade().map(|inner| ApiClient { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl ApiClient {
    pub fn new(settings: ClientSettings, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                id: ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed)),
                settings,
                transport,
                request_interceptors: InterceptorChain::new(),
                response_interceptors: InterceptorChain::new(),
            }),
        }
    }

    pub fn id(&self) -> ClientId {
        self.inner.id
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.inner.settings
    }

    pub fn base_url(&self) -> &str {
        &self.inner.settings.base_url
    }

    pub fn request_interceptors(&self) -> &InterceptorChain<dyn RequestInterceptor> {
        &self.inner.request_interceptors
    }

    pub fn response_interceptors(&self) -> &InterceptorChain<dyn ResponseInterceptor> {
        &self.inner.response_interceptors
    }

    pub fn downgrade(&self) -> WeakApiClient {
        WeakApiClient {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Send a request through the interceptor pipeline
    ///
    /// Request handlers run in registration order, then the transport, then
    /// response handlers in registration order. A failing request handler
    /// skips the transport; response handlers still see the error.
    pub fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse>> {
        Box::pin(self.dispatch(request))
    }

    async fn dispatch(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        let mut rejected = None;
        for handler in self.inner.request_interceptors.snapshot() {
            match handler.on_request(request.clone()).await {
                Ok(next) => request = next,
                Err(e) => {
                    rejected = Some(e);
                    break;
                }
            }
        }

        let mut outcome = match rejected {
            Some(e) => Err(e),
            None => self.execute(&request).await,
        };

        let exchange = Exchange {
            client: self,
            request: &request,
        };
        for handler in self.inner.response_interceptors.snapshot() {
            outcome = handler.on_response(outcome, &exchange).await;
        }
        outcome
    }

    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        if request.is_cancelled() {
            return Err(HttpError::Cancelled);
        }
        let prepared = self.prepare(request)?;
        let send = self.inner.transport.send(prepared);

        let response = match &request.context.cancellation {
            Some(token) => tokio::select! {
                response = send => response?,
                _ = token.cancelled() => return Err(HttpError::Cancelled),
            },
            None => send.await?,
        };

        if response.is_success() {
            return Ok(response);
        }

        debug!(client = %self.id(), status = %response.status, url = %response.url, "Non-success status");
        Err(HttpError::HttpStatus {
            status: response.status,
            message: response
                .status
                .canonical_reason()
                .unwrap_or("Unknown status")
                .to_string(),
            body: response.text(),
        })
    }

    /// Resolve the request against the client's settings
    pub fn prepare(&self, request: &ApiRequest) -> Result<PreparedRequest> {
        let settings = &self.inner.settings;
        let mut url = join_url(&settings.base_url, &request.path)?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }

        let mut headers = settings.headers.clone();
        for (name, value) in &request.headers {
            headers.insert(name.clone(), value.clone());
        }

        Ok(PreparedRequest {
            method: request.method.clone(),
            url,
            headers,
            body: request.body.clone(),
            timeout: request.timeout.unwrap_or(settings.timeout),
            with_credentials: request.with_credentials.unwrap_or(settings.with_credentials),
        })
    }

    /// Check whether two handles refer to the same client
    pub fn ptr_eq(&self, other: &ApiClient) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.send(ApiRequest::delete(path)).await
    }

    pub async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.send(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.send(ApiRequest::put(path).json(body)?).await
    }

    pub async fn patch_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.send(ApiRequest::patch(path).json(body)?).await
    }

    /// GET and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get(path).await?.json()
    }

    /// Custom method without a body
    pub async fn request(&self, method: Method, path: &str) -> Result<ApiResponse> {
        self.send(ApiRequest::new(method, path)).await
    }
}

impl PartialEq for ApiClient {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ApiClient {}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("id", &self.inner.id)
            .field("base_url", &self.inner.settings.base_url)
            .field("request_interceptors", &self.inner.request_interceptors.len())
            .field("response_interceptors", &self.inner.response_interceptors.len())
            .finish()
    }
}

impl fmt::Debug for WeakApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakApiClient")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Join a request path onto a base URL; absolute paths are used as-is
pub(crate) fn join_url(base_url: &str, path: &str) -> Result<url::Url> {
    let raw = if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else if path.is_empty() {
        base_url.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    };

    raw.parse::<url::Url>()
        .map_err(|e| HttpError::InvalidUrl(format!("{raw}: {e}")))
}
