//! Client configuration layers and their merge

mod environment;
mod preset;
mod settings;

use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

pub use environment::{
    environment_host, global_defaults, resolve_base_url, EnvSource, Environment, ProcessEnv,
    API_HOST_VAR, API_TIMEOUT_VAR, API_URL_VAR, API_VERSION_VAR, DEFAULT_API_URL,
    DEFAULT_API_VERSION, DEFAULT_TIMEOUT, DEV_API_HOST_VAR, PRODUCTION_API_HOST_VAR,
    STAGING_API_HOST_VAR,
};
pub use preset::Preset;
pub use settings::{CleanupSettings, FactorySettings, SettingsError};

/// One layer of client configuration; unset fields defer to lower layers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UnifiedApiConfig {
    #[serde(rename = "baseURL")]
    pub base_url: Option<String>,
    pub host: Option<String>,
    pub version: Option<String>,
    #[serde(with = "optional_millis")]
    pub timeout: Option<Duration>,
    pub with_credentials: Option<bool>,
    /// Replaced as a whole by a higher layer that sets any header
    pub headers: BTreeMap<String, String>,
    pub preset: Option<Preset>,
    pub enable_auth: Option<bool>,
    pub enable_retry: Option<bool>,
    pub enable_logging: Option<bool>,
    pub enable_error_handling: Option<bool>,
    pub max_retries: Option<u32>,
    #[serde(with = "optional_millis")]
    pub retry_delay: Option<Duration>,
    pub cache_key: Option<String>,
    pub use_cache: Option<bool>,
    pub environment: Option<Environment>,
    pub auth_token: Option<String>,
}

impl UnifiedApiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_credentials(mut self, enabled: bool) -> Self {
        self.with_credentials = Some(enabled);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        insert_header(&mut self.headers, name.into(), value.into());
        self
    }

    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.preset = Some(preset);
        self
    }

    pub fn with_auth(mut self, enabled: bool) -> Self {
        self.enable_auth = Some(enabled);
        self
    }

    pub fn with_retry(mut self, enabled: bool) -> Self {
        self.enable_retry = Some(enabled);
        self
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.enable_logging = Some(enabled);
        self
    }

    pub fn with_error_handling(mut self, enabled: bool) -> Self {
        self.enable_error_handling = Some(enabled);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn with_use_cache(mut self, enabled: bool) -> Self {
        self.use_cache = Some(enabled);
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Lay `upper` over this layer; fields set in `upper` win
    pub fn overlay(mut self, upper: UnifiedApiConfig) -> Self {
        take(&mut self.base_url, upper.base_url);
        take(&mut self.host, upper.host);
        take(&mut self.version, upper.version);
        take(&mut self.timeout, upper.timeout);
        take(&mut self.with_credentials, upper.with_credentials);
        take(&mut self.preset, upper.preset);
        take(&mut self.enable_auth, upper.enable_auth);
        take(&mut self.enable_retry, upper.enable_retry);
        take(&mut self.enable_logging, upper.enable_logging);
        take(&mut self.enable_error_handling, upper.enable_error_handling);
        take(&mut self.max_retries, upper.max_retries);
        take(&mut self.retry_delay, upper.retry_delay);
        take(&mut self.cache_key, upper.cache_key);
        take(&mut self.use_cache, upper.use_cache);
        take(&mut self.environment, upper.environment);
        take(&mut self.auth_token, upper.auth_token);
        if !upper.headers.is_empty() {
            self.headers = upper.headers;
        }
        self
    }
}

fn take<T>(lower: &mut Option<T>, upper: Option<T>) {
    if upper.is_some() {
        *lower = upper;
    }
}

/// Replace any header of this layer with the same name regardless of case
fn insert_header(headers: &mut BTreeMap<String, String>, name: String, value: String) {
    headers.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
    headers.insert(name, value);
}

/// Fully merged configuration of one client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    pub base_url: Option<String>,
    pub host: Option<String>,
    pub version: Option<String>,
    pub timeout: Duration,
    pub with_credentials: bool,
    pub headers: BTreeMap<String, String>,
    pub preset: Option<Preset>,
    pub enable_auth: bool,
    pub enable_retry: bool,
    pub enable_logging: bool,
    pub enable_error_handling: bool,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub cache_key: Option<String>,
    pub use_cache: bool,
    pub environment: Option<Environment>,
    pub auth_token: Option<String>,
}

impl ResolvedConfig {
    /// Cache key when the client should be cached
    pub fn cache_key_if_enabled(&self) -> Option<&str> {
        self.cache_key.as_deref().filter(|_| self.use_cache)
    }

    pub fn base_url(&self, env: &dyn EnvSource) -> String {
        resolve_base_url(
            self.base_url.as_deref(),
            self.host.as_deref(),
            self.version.as_deref(),
            self.environment,
            env,
        )
    }
}

/// Merge `defaults ← preset ← explicit`
///
/// The preset layer comes from `explicit.preset` (or a preset named in the
/// defaults). Fields missing from every layer take built-in fallbacks.
pub fn resolve(defaults: &UnifiedApiConfig, explicit: &UnifiedApiConfig) -> ResolvedConfig {
    let preset = explicit.preset.or(defaults.preset);
    let merged = match preset {
        Some(preset) => defaults.clone().overlay(preset.config()),
        None => defaults.clone(),
    }
    .overlay(explicit.clone());

    ResolvedConfig {
        base_url: merged.base_url,
        host: merged.host,
        version: merged.version,
        timeout: merged.timeout.unwrap_or(DEFAULT_TIMEOUT),
        with_credentials: merged.with_credentials.unwrap_or(true),
        headers: merged.headers,
        preset,
        enable_auth: merged.enable_auth.unwrap_or(true),
        enable_retry: merged.enable_retry.unwrap_or(true),
        enable_logging: merged.enable_logging.unwrap_or(false),
        enable_error_handling: merged.enable_error_handling.unwrap_or(true),
        max_retries: merged.max_retries.unwrap_or(3),
        retry_delay: merged.retry_delay.unwrap_or(Duration::from_millis(1000)),
        cache_key: merged.cache_key,
        use_cache: merged.use_cache.unwrap_or(true),
        environment: merged.environment,
        auth_token: merged.auth_token,
    }
}

/// `Option<Duration>` as whole milliseconds
mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
