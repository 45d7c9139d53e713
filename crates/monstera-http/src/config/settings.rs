//! Factory settings loaded from `MONSTERA_API_*` variables

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use config::Config;
use serde::Deserialize;
use thiserror::Error;

use super::{global_defaults, EnvSource, Environment, ProcessEnv, UnifiedApiConfig};

const ENV_PREFIX: &str = "MONSTERA_API";

/// Settings errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Background cache sweep parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupSettings {
    pub interval: Duration,
    pub max_age: Duration,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            max_age: Duration::from_secs(600),
        }
    }
}

/// Everything a factory needs besides its clients
#[derive(Clone)]
pub struct FactorySettings {
    pub environment: Environment,
    pub cache_max_size: usize,
    /// Sweep started with the factory; `None` leaves it off
    pub cleanup: Option<CleanupSettings>,
    /// Lowest configuration layer
    pub defaults: UnifiedApiConfig,
    /// Source of the `NEXT_PUBLIC_*` host variables
    pub env: Arc<dyn EnvSource>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    environment: Option<String>,
    cache_max_size: Option<usize>,
    cleanup_enabled: Option<bool>,
    cleanup_interval_secs: Option<u64>,
    cleanup_max_age_secs: Option<u64>,
}

impl FactorySettings {
    /// Defaults for `environment`, reading host variables from the process
    pub fn for_environment(environment: Environment) -> Self {
        Self::with_env_source(environment, Arc::new(ProcessEnv))
    }

    pub fn with_env_source(environment: Environment, env: Arc<dyn EnvSource>) -> Self {
        Self {
            environment,
            cache_max_size: monstera_cache::DEFAULT_MAX_SIZE,
            cleanup: (environment == Environment::Development).then(CleanupSettings::default),
            defaults: global_defaults(environment, env.as_ref()),
            env,
        }
    }

    /// Load from the process environment
    pub fn from_env() -> Result<Self, SettingsError> {
        let source = config::Environment::with_prefix(ENV_PREFIX).try_parsing(true);
        Self::load(source, Arc::new(ProcessEnv))
    }

    /// Load from an explicit variable map instead of the process
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, SettingsError> {
        let source = config::Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .source(Some(vars.clone()));
        Self::load(source, Arc::new(vars))
    }

    fn load(source: config::Environment, env: Arc<dyn EnvSource>) -> Result<Self, SettingsError> {
        let raw: RawSettings = Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()?;

        let environment = match raw.environment {
            Some(value) => value.parse().map_err(SettingsError::Invalid)?,
            None => Environment::Production,
        };

        let mut settings = Self::with_env_source(environment, env);
        if let Some(size) = raw.cache_max_size {
            if size == 0 {
                return Err(SettingsError::Invalid("cache_max_size must be positive".to_string()));
            }
            settings.cache_max_size = size;
        }

        let enabled = raw.cleanup_enabled.unwrap_or(settings.cleanup.is_some());
        settings.cleanup = if enabled {
            let defaults = CleanupSettings::default();
            let interval = raw
                .cleanup_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.interval);
            if interval.is_zero() {
                return Err(SettingsError::Invalid(
                    "cleanup_interval_secs must be positive".to_string(),
                ));
            }
            Some(CleanupSettings {
                interval,
                max_age: raw
                    .cleanup_max_age_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.max_age),
            })
        } else {
            None
        };

        Ok(settings)
    }

    pub fn with_cache_max_size(mut self, size: usize) -> Self {
        self.cache_max_size = size;
        self
    }

    pub fn with_cleanup(mut self, cleanup: Option<CleanupSettings>) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn with_defaults(mut self, defaults: UnifiedApiConfig) -> Self {
        self.defaults = defaults;
        self
    }
}

impl Default for FactorySettings {
    fn default() -> Self {
        Self::for_environment(Environment::Production)
    }
}

impl fmt::Debug for FactorySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactorySettings")
            .field("environment", &self.environment)
            .field("cache_max_size", &self.cache_max_size)
            .field("cleanup", &self.cleanup)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}
