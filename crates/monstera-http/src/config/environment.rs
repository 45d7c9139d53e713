//! Deployment environments and the environment variables that describe them

use std::{collections::HashMap, fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use super::UnifiedApiConfig;

pub const DEV_API_HOST_VAR: &str = "NEXT_PUBLIC_DEV_API_HOST";
pub const STAGING_API_HOST_VAR: &str = "NEXT_PUBLIC_STAGING_API_HOST";
pub const PRODUCTION_API_HOST_VAR: &str = "NEXT_PUBLIC_PRODUCTION_API_HOST";
pub const API_HOST_VAR: &str = "NEXT_PUBLIC_API_HOST";
pub const API_VERSION_VAR: &str = "NEXT_PUBLIC_API_VERSION";
pub const API_URL_VAR: &str = "NEXT_PUBLIC_API_URL";
pub const API_TIMEOUT_VAR: &str = "NEXT_PUBLIC_API_TIMEOUT";

pub const DEFAULT_API_VERSION: &str = "v1";
pub const DEFAULT_API_URL: &str = "http://localhost:8080/api/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    fn host_var(&self) -> (&'static str, &'static str) {
        match self {
            Environment::Development => (DEV_API_HOST_VAR, "http://localhost:8080"),
            Environment::Staging => (STAGING_API_HOST_VAR, "https://staging-api.monstera.com"),
            Environment::Production => (PRODUCTION_API_HOST_VAR, "https://api.monstera.com"),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// Read access to environment variables
pub trait EnvSource: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

/// The process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Non-empty variable value
fn non_empty(env: &dyn EnvSource, key: &str) -> Option<String> {
    env.var(key).filter(|v| !v.trim().is_empty())
}

/// API host for a deployment environment
pub fn environment_host(environment: Environment, env: &dyn EnvSource) -> String {
    let (key, default) = environment.host_var();
    non_empty(env, key).unwrap_or_else(|| default.to_string())
}

/// Resolve the base URL
///
/// Explicit base URL, then `host` (or the environment's host) with
/// `version`, then the generic host variable with the version, then the
/// generic URL variable. Hosts are joined as `<host>/api/<version>`.
pub fn resolve_base_url(
    base_url: Option<&str>,
    host: Option<&str>,
    version: Option<&str>,
    environment: Option<Environment>,
    env: &dyn EnvSource,
) -> String {
    if let Some(base_url) = base_url.filter(|u| !u.is_empty()) {
        return base_url.to_string();
    }

    let host = host
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .or_else(|| environment.map(|e| environment_host(e, env)));

    let requested_version = version.filter(|v| !v.is_empty());
    let host = host.or_else(|| non_empty(env, API_HOST_VAR));
    if let Some(host) = host {
        let version = requested_version
            .map(str::to_string)
            .or_else(|| non_empty(env, API_VERSION_VAR))
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());
        return join_host(&host, &version);
    }

    let url = non_empty(env, API_URL_VAR).unwrap_or_else(|| DEFAULT_API_URL.to_string());
    // A requested version replaces the one baked into the URL
    match (requested_version, url.split_once("/api/")) {
        (Some(version), Some((root, _))) => join_host(root, version),
        _ => url,
    }
}

fn join_host(host: &str, version: &str) -> String {
    format!("{}/api/{}", host.trim_end_matches('/'), version)
}

/// Global defaults, the lowest configuration layer
pub fn global_defaults(environment: Environment, env: &dyn EnvSource) -> UnifiedApiConfig {
    let timeout = non_empty(env, API_TIMEOUT_VAR)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_TIMEOUT);

    UnifiedApiConfig::new()
        .with_timeout(timeout)
        .with_credentials(true)
        .with_header("Content-Type", "application/json")
        .with_auth(true)
        .with_retry(true)
        .with_logging(environment == Environment::Development)
        .with_error_handling(true)
        .with_max_retries(3)
        .with_retry_delay(Duration::from_millis(1000))
        .with_use_cache(true)
}
