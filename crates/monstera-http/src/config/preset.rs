//! Named configuration presets

use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use super::UnifiedApiConfig;

/// Preset selecting a fixed configuration layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Default,
    Auth,
    Admin,
    Public,
    Upload,
    Batch,
    Realtime,
}

impl Preset {
    pub const ALL: [Preset; 7] = [
        Preset::Default,
        Preset::Auth,
        Preset::Admin,
        Preset::Public,
        Preset::Upload,
        Preset::Batch,
        Preset::Realtime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Default => "default",
            Preset::Auth => "auth",
            Preset::Admin => "admin",
            Preset::Public => "public",
            Preset::Upload => "upload",
            Preset::Batch => "batch",
            Preset::Realtime => "realtime",
        }
    }

    /// Cache key of clients built from this preset alone
    pub fn cache_key(&self) -> String {
        format!("_preset_{}", self.as_str())
    }

    /// The preset's configuration layer
    pub fn config(&self) -> UnifiedApiConfig {
        let base = UnifiedApiConfig::new().with_cache_key(self.cache_key());

        match self {
            Preset::Default => base
                .with_use_cache(true)
                .with_timeout(Duration::from_millis(30_000))
                .with_credentials(true)
                .with_auth(true)
                .with_retry(true)
                .with_error_handling(true)
                .with_header("Content-Type", "application/json"),
            Preset::Auth => base
                .with_use_cache(true)
                .with_timeout(Duration::from_millis(30_000))
                .with_credentials(true)
                .with_auth(true)
                .with_error_handling(true),
            Preset::Admin => base
                .with_use_cache(true)
                .with_timeout(Duration::from_millis(30_000))
                .with_credentials(true)
                .with_auth(true)
                .with_logging(true)
                .with_error_handling(true)
                .with_header("X-Admin-Request", "true"),
            Preset::Public => base
                .with_use_cache(true)
                .with_timeout(Duration::from_millis(10_000))
                .with_credentials(false)
                // the auth middleware would turn credentials back on
                .with_auth(false)
                .with_retry(true)
                .with_error_handling(true),
            Preset::Upload => base
                .with_use_cache(false)
                .with_timeout(Duration::from_millis(120_000))
                .with_credentials(true)
                .with_auth(true)
                .with_error_handling(true)
                .with_header("Content-Type", "multipart/form-data"),
            Preset::Batch => base
                .with_use_cache(false)
                .with_timeout(Duration::from_millis(300_000))
                .with_credentials(true)
                .with_auth(true)
                .with_retry(true)
                .with_error_handling(true)
                .with_max_retries(5)
                .with_retry_delay(Duration::from_millis(2000)),
            Preset::Realtime => base
                .with_use_cache(true)
                .with_timeout(Duration::from_millis(5000))
                .with_credentials(true)
                .with_auth(true)
                .with_retry(false)
                .with_error_handling(true),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown preset: {s}"))
    }
}
