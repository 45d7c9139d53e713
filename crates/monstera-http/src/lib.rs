//! Unified API client factory for Monstera
//!
//! Builds HTTP clients from layered configuration and shares them through a
//! bounded cache.
//!
//! ## Features
//!
//! - **Presets**: named configuration layers (`auth`, `admin`, `upload`, ...)
//! - **Layered config**: global defaults, preset and explicit values merged per field
//! - **Middleware**: auth, logging, retry and error normalisation, registered at most once per client
//! - **Client cache**: LRU-bounded reuse keyed by cache key, with an optional age sweep
//! - **Testing support**: swappable [`Transport`], scripted transport behind `test-util`

pub mod client;
pub mod config;
pub mod error;
pub mod factory;
pub mod interceptors;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod request;
pub mod transport;

pub use client::{ApiClient, ClientId, ClientSettings, HandlerId, InterceptorChain, WeakApiClient};
pub use config::{
    resolve, CleanupSettings, EnvSource, Environment, FactorySettings, Preset, ProcessEnv,
    ResolvedConfig, SettingsError, UnifiedApiConfig,
};
pub use error::{ErrorDescriptor, ErrorKind, HttpError, Result};
pub use factory::{ApiClientFactory, FactoryDebugInfo};
pub use interceptors::{
    Exchange, InterceptorRegistration, InterceptorRegistry, MiddlewareType, RequestInterceptor,
    ResponseInterceptor, RetryPolicy,
};
pub use request::{ApiRequest, ApiResponse, PreparedRequest, RequestBody, RequestContext};
pub use transport::{ReqwestTransport, Transport};

pub use monstera_cache::{CacheError, CacheStats};

/// Re-export commonly used types
pub use reqwest::{header, Method, StatusCode};
