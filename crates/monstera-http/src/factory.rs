//! Client factory: presets, layered configuration and client caching

use std::sync::{Arc, OnceLock};

use monstera_cache::{CacheError, CacheStats, ClientCache};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    client::{ApiClient, ClientSettings},
    config::{resolve, Environment, FactorySettings, Preset, ResolvedConfig, UnifiedApiConfig},
    error::{HttpError, Result},
    interceptors::{InterceptorRegistry, MiddlewareType},
    transport::{ReqwestTransport, Transport},
};

const DEFAULT_CLIENT_KEY: &str = "_default";

static GLOBAL_FACTORY: OnceLock<Arc<ApiClientFactory>> = OnceLock::new();

/// Snapshot of the factory's internal state
#[derive(Debug, Clone, Serialize)]
pub struct FactoryDebugInfo {
    pub environment: Environment,
    pub cache_stats: CacheStats,
    pub cache_size: usize,
    pub cache_max_size: usize,
    pub cached_keys: Vec<String>,
    pub has_default_client: bool,
    pub cleanup_running: bool,
    pub tracked_clients: usize,
}

/// Builds configured API clients and shares them through a bounded cache
///
/// Cached clients are returned as-is: a cache hit never rebuilds the client
/// nor re-registers its middleware.
pub struct ApiClientFactory {
    settings: FactorySettings,
    transport: Arc<dyn Transport>,
    cache: ClientCache<ApiClient>,
    registry: InterceptorRegistry,
    default_client: Mutex<Option<ApiClient>>,
}

impl ApiClientFactory {
    /// Create a factory sending requests with `reqwest`
    pub fn new(settings: FactorySettings) -> Result<Self> {
        let transport = ReqwestTransport::new()?;
        Ok(Self::with_transport(settings, Arc::new(transport)))
    }

    /// Create a factory over a custom transport
    ///
    /// The cleanup sweep configured in `settings` starts right away when a
    /// tokio runtime is available; otherwise call [`Self::start_cleanup`]
    /// later.
    pub fn with_transport(settings: FactorySettings, transport: Arc<dyn Transport>) -> Self {
        let factory = Self {
            cache: ClientCache::new(settings.cache_max_size),
            registry: InterceptorRegistry::new(),
            default_client: Mutex::new(None),
            settings,
            transport,
        };

        if factory.settings.cleanup.is_some() {
            if let Err(e) = factory.start_cleanup() {
                debug!(error = %e, "Cache cleanup not started");
            }
        }
        factory
    }

    /// Process-wide factory, built on first use from `MONSTERA_API_*` variables
    pub fn global() -> Result<Arc<ApiClientFactory>> {
        if let Some(factory) = GLOBAL_FACTORY.get() {
            return Ok(Arc::clone(factory));
        }

        let settings = FactorySettings::from_env().unwrap_or_else(|e| {
            warn!(error = %e, "Invalid factory settings, using defaults");
            FactorySettings::default()
        });
        let factory = Arc::new(Self::new(settings)?);
        Ok(Arc::clone(GLOBAL_FACTORY.get_or_init(|| factory)))
    }

    pub fn settings(&self) -> &FactorySettings {
        &self.settings
    }

    pub fn registry(&self) -> &InterceptorRegistry {
        &self.registry
    }

    /// Resolve `config` over the factory defaults
    pub fn resolve(&self, config: &UnifiedApiConfig) -> ResolvedConfig {
        resolve(&self.settings.defaults, config)
    }

    /// Create a client, or return the cached one for the resolved cache key
    pub fn create_client(&self, config: UnifiedApiConfig) -> Result<ApiClient> {
        let resolved = self.resolve(&config);

        if let Some(key) = resolved.cache_key_if_enabled() {
            if let Some(client) = self.cache.get(key) {
                debug!(cache_key = key, client = %client.id(), "Client served from cache");
                return Ok(client);
            }
        }

        let client = self.build_client(&resolved)?;
        self.install_middleware(&client, &resolved);

        if let Some(key) = resolved.cache_key_if_enabled() {
            self.cache.set(key, client.clone());
            debug!(cache_key = key, client = %client.id(), "Client cached");
        }
        Ok(client)
    }

    fn build_client(&self, resolved: &ResolvedConfig) -> Result<ApiClient> {
        let base_url = resolved.base_url(self.settings.env.as_ref());
        url::Url::parse(&base_url).map_err(|e| HttpError::InvalidUrl(format!("{base_url}: {e}")))?;

        let mut settings = ClientSettings::new(base_url)
            .with_timeout(resolved.timeout)
            .with_credentials(resolved.with_credentials);
        for (name, value) in &resolved.headers {
            settings = settings.with_header(name, value)?;
        }
        if let Some(token) = resolved.auth_token.as_deref().filter(|t| !t.is_empty()) {
            settings = settings.with_bearer_token(token)?;
        }

        let client = ApiClient::new(settings, Arc::clone(&self.transport));
        debug!(
            client = %client.id(),
            base_url = client.base_url(),
            preset = resolved.preset.map(|p| p.as_str()),
            timeout_ms = resolved.timeout.as_millis() as u64,
            "Client created"
        );
        Ok(client)
    }

    fn install_middleware(&self, client: &ApiClient, resolved: &ResolvedConfig) {
        if resolved.enable_auth {
            self.registry.setup_auth(client);
        }
        if resolved.enable_logging {
            self.registry.setup_logging(client);
        }
        if resolved.enable_retry {
            self.registry
                .setup_retry(client, resolved.max_retries, resolved.retry_delay);
        }
        if resolved.enable_error_handling {
            self.registry.setup_error_handling(client);
        }
    }

    /// Shared default client, remembered until [`Self::clear_cache`]
    pub fn create_default_client(&self) -> Result<ApiClient> {
        let mut default_client = self.default_client.lock();
        if let Some(client) = default_client.as_ref() {
            return Ok(client.clone());
        }

        let client = self.create_client(
            UnifiedApiConfig::new()
                .with_cache_key(DEFAULT_CLIENT_KEY)
                .with_use_cache(true),
        )?;
        *default_client = Some(client.clone());
        Ok(client)
    }

    /// Auth preset client, keyed per token
    pub fn create_authenticated_client(&self, token: Option<&str>) -> Result<ApiClient> {
        let mut config = UnifiedApiConfig::new();
        config = match token {
            Some(token) => config
                .with_auth_token(token)
                .with_cache_key(format!("_auth_{token}")),
            None => config.with_cache_key(Preset::Auth.cache_key()),
        };
        self.create_preset_client(Preset::Auth, config)
    }

    pub fn create_admin_client(&self) -> Result<ApiClient> {
        self.create_preset_client(Preset::Admin, UnifiedApiConfig::new())
    }

    /// Client for an explicit API version
    pub fn create_versioned_client(&self, version: &str) -> Result<ApiClient> {
        self.create_client(
            UnifiedApiConfig::new()
                .with_version(version)
                .with_cache_key(format!("_version_{version}"))
                .with_use_cache(true),
        )
    }

    /// Client for a deployment environment's host
    pub fn create_environment_client(&self, environment: Environment) -> Result<ApiClient> {
        self.create_client(
            UnifiedApiConfig::new()
                .with_environment(environment)
                .with_cache_key(format!("_env_{environment}"))
                .with_use_cache(true),
        )
    }

    /// Fresh client that bypasses the cache
    pub fn create_custom_client(&self, config: UnifiedApiConfig) -> Result<ApiClient> {
        self.create_client(config.with_use_cache(false))
    }

    /// Client from a preset, with `extra` taking precedence
    pub fn create_preset_client(&self, preset: Preset, extra: UnifiedApiConfig) -> Result<ApiClient> {
        self.create_client(UnifiedApiConfig::new().with_preset(preset).overlay(extra))
    }

    pub fn create_public_client(&self) -> Result<ApiClient> {
        self.create_preset_client(Preset::Public, UnifiedApiConfig::new())
    }

    pub fn create_upload_client(&self) -> Result<ApiClient> {
        self.create_preset_client(Preset::Upload, UnifiedApiConfig::new())
    }

    pub fn create_batch_client(&self) -> Result<ApiClient> {
        self.create_preset_client(Preset::Batch, UnifiedApiConfig::new())
    }

    pub fn create_realtime_client(&self) -> Result<ApiClient> {
        self.create_preset_client(Preset::Realtime, UnifiedApiConfig::new())
    }

    /// Drop every cached client and forget the default client
    pub fn clear_cache(&self) {
        self.cache.clear();
        *self.default_client.lock() = None;
        info!("Client cache cleared");
    }

    pub fn remove_from_cache(&self, cache_key: &str) -> bool {
        let removed = self.cache.delete(cache_key);
        if removed {
            debug!(cache_key, "Client removed from cache");
        }
        removed
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Cached client for `cache_key`, counted as a cache lookup
    pub fn cached_client(&self, cache_key: &str) -> Option<ApiClient> {
        self.cache.get(cache_key)
    }

    /// Middleware types registered on `client`, in registration order
    pub fn interceptor_status(&self, client: &ApiClient) -> Vec<MiddlewareType> {
        self.registry.registered_types(client)
    }

    pub fn remove_all_interceptors(&self, client: &ApiClient) {
        self.registry.remove_all(client);
    }

    pub fn debug_info(&self) -> FactoryDebugInfo {
        FactoryDebugInfo {
            environment: self.settings.environment,
            cache_stats: self.cache.stats(),
            cache_size: self.cache.len(),
            cache_max_size: self.cache.max_size(),
            cached_keys: self.cache.keys(),
            has_default_client: self.default_client.lock().is_some(),
            cleanup_running: self.cache.is_cleanup_running(),
            tracked_clients: self.registry.tracked_clients(),
        }
    }

    /// Start the cache sweep with the configured (or default) parameters
    ///
    /// Returns `Ok(false)` when it is already running.
    pub fn start_cleanup(&self) -> std::result::Result<bool, CacheError> {
        let cleanup = self.settings.cleanup.unwrap_or_default();
        let started = self.cache.start_cleanup(cleanup.interval, cleanup.max_age)?;
        if started {
            debug!(
                interval_secs = cleanup.interval.as_secs(),
                max_age_secs = cleanup.max_age.as_secs(),
                "Cache cleanup started"
            );
        }
        Ok(started)
    }

    pub fn stop_cleanup(&self) -> bool {
        self.cache.stop_cleanup()
    }

    /// Stop background work; cached clients stay usable
    pub fn shutdown(&self) {
        if self.stop_cleanup() {
            info!("Client factory shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::CleanupSettings, mock::MockTransport};
    use std::{collections::HashMap, time::Duration};

    fn factory() -> ApiClientFactory {
        factory_with(Arc::new(MockTransport::new()))
    }

    fn factory_with(transport: Arc<MockTransport>) -> ApiClientFactory {
        let settings = FactorySettings::with_env_source(
            Environment::Production,
            Arc::new(HashMap::<String, String>::new()),
        );
        ApiClientFactory::with_transport(settings, transport)
    }

    #[test]
    fn test_cache_identity() {
        let factory = factory();
        let config = UnifiedApiConfig::new().with_cache_key("k").with_use_cache(true);

        let first = factory.create_client(config.clone()).unwrap();
        let second = factory.create_client(config).unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(factory.cache_stats().total_hits, 1);
        assert_eq!(factory.interceptor_status(&first).len(), 3);
    }

    #[test]
    fn test_uncached_clients_are_distinct() {
        let factory = factory();
        let first = factory.create_upload_client().unwrap();
        let second = factory.create_upload_client().unwrap();

        assert_ne!(first, second);
        assert!(factory.debug_info().cached_keys.is_empty());
    }

    #[test]
    fn test_custom_client_bypasses_cache() {
        let factory = factory();
        let config = UnifiedApiConfig::new().with_cache_key("reports");

        let custom = factory.create_custom_client(config.clone()).unwrap();
        let cached = factory.create_client(config).unwrap();
        assert_ne!(custom, cached);
        assert_eq!(factory.debug_info().cached_keys, vec!["reports".to_string()]);
    }

    #[test]
    fn test_preset_precedence() {
        let factory = factory();
        let client = factory
            .create_preset_client(
                Preset::Upload,
                UnifiedApiConfig::new().with_timeout(Duration::from_millis(5000)),
            )
            .unwrap();

        assert_eq!(client.settings().timeout, Duration::from_millis(5000));
        assert_eq!(
            client.settings().headers["content-type"],
            "multipart/form-data"
        );
    }

    #[test]
    fn test_middleware_follows_flags() {
        let factory = factory();

        let admin = factory.create_admin_client().unwrap();
        assert_eq!(
            factory.interceptor_status(&admin),
            vec![
                MiddlewareType::Auth,
                MiddlewareType::Logging,
                MiddlewareType::Retry,
                MiddlewareType::Error,
            ]
        );
        assert_eq!(admin.settings().headers["x-admin-request"], "true");
        assert!(admin.settings().headers.get("content-type").is_none());

        let realtime = factory.create_realtime_client().unwrap();
        assert!(!factory.interceptor_status(&realtime).contains(&MiddlewareType::Retry));

        let public = factory.create_public_client().unwrap();
        assert_eq!(
            factory.interceptor_status(&public),
            vec![MiddlewareType::Retry, MiddlewareType::Error]
        );
        assert!(!public.settings().with_credentials);
    }

    #[test]
    fn test_authenticated_client_keys() {
        let factory = factory();
        let with_token = factory.create_authenticated_client(Some("abc")).unwrap();
        let anonymous = factory.create_authenticated_client(None).unwrap();

        assert_eq!(
            with_token.settings().headers[reqwest::header::AUTHORIZATION],
            "Bearer abc"
        );
        assert!(!anonymous
            .settings()
            .headers
            .contains_key(reqwest::header::AUTHORIZATION));

        let keys = factory.debug_info().cached_keys;
        assert!(keys.contains(&"_auth_abc".to_string()));
        assert!(keys.contains(&"_preset_auth".to_string()));
    }

    #[test]
    fn test_versioned_and_environment_clients() {
        let factory = factory();

        let v2 = factory.create_versioned_client("v2").unwrap();
        assert_eq!(v2.base_url(), "http://localhost:8080/api/v2");

        let staging = factory.create_environment_client(Environment::Staging).unwrap();
        assert_eq!(staging.base_url(), "https://staging-api.monstera.com/api/v1");

        assert!(factory.cached_client("_version_v2").is_some());
        assert!(factory.cached_client("_env_staging").is_some());
    }

    #[test]
    fn test_default_client_is_memoised_until_cleared() {
        let factory = factory();
        let first = factory.create_default_client().unwrap();
        let second = factory.create_default_client().unwrap();
        assert!(first.ptr_eq(&second));
        assert!(factory.debug_info().has_default_client);

        factory.clear_cache();
        assert!(!factory.debug_info().has_default_client);
        assert_eq!(factory.debug_info().cache_size, 0);

        let third = factory.create_default_client().unwrap();
        assert!(!first.ptr_eq(&third));
    }

    #[test]
    fn test_remove_from_cache() {
        let factory = factory();
        let first = factory.create_admin_client().unwrap();

        assert!(factory.remove_from_cache("_preset_admin"));
        assert!(!factory.remove_from_cache("_preset_admin"));

        let second = factory.create_admin_client().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_remove_all_interceptors() {
        let factory = factory();
        let client = factory.create_default_client().unwrap();

        factory.remove_all_interceptors(&client);
        assert!(factory.interceptor_status(&client).is_empty());
        assert!(client.response_interceptors().is_empty());
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let factory = factory();
        let result = factory.create_custom_client(UnifiedApiConfig::new().with_base_url("not a url"));
        assert!(matches!(result, Err(HttpError::InvalidUrl(_))));
    }

    #[test]
    fn test_cleanup_without_runtime() {
        let factory = factory();
        assert_eq!(factory.start_cleanup(), Err(CacheError::NoRuntime));
        assert!(!factory.debug_info().cleanup_running);
    }

    #[tokio::test]
    async fn test_cleanup_lifecycle() {
        let settings = FactorySettings::with_env_source(
            Environment::Development,
            Arc::new(HashMap::<String, String>::new()),
        )
        .with_cleanup(Some(CleanupSettings::default()));
        let factory = ApiClientFactory::with_transport(settings, Arc::new(MockTransport::new()));

        assert!(factory.debug_info().cleanup_running);
        assert_eq!(factory.start_cleanup(), Ok(false));

        factory.shutdown();
        assert!(!factory.debug_info().cleanup_running);
        assert!(!factory.stop_cleanup());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_through_factory_client() {
        let transport = Arc::new(MockTransport::new().with_statuses([503, 200]));
        let factory = factory_with(transport.clone());
        let client = factory
            .create_custom_client(
                UnifiedApiConfig::new()
                    .with_max_retries(2)
                    .with_retry_delay(Duration::from_millis(50)),
            )
            .unwrap();

        let response = client.get("/weekly-reports").await.unwrap();
        assert!(response.is_success());
        assert_eq!(transport.call_count(), 2);
        assert!(transport.calls().iter().all(|c| c.with_credentials));
    }
}
