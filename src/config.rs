use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::store::StoreConfig;

const DEFAULT_TABLE: &str = "taps";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Deployment variables honoured when the `TAPROOM__*` equivalents are unset
const LEGACY_ADMIN_SECRET: &str = "ADMIN_SECRET";
const LEGACY_STORE_URL: &str = "SUPABASE_URL";
const LEGACY_STORE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";

/// Top-level application configuration loaded from file + environment.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthSection,
    pub store: StoreSection,
    pub adjust: AdjustSection,
    pub logging: LoggingSection,
}

impl AppConfig {
    /// Load configuration from disk and environment.
    pub fn load() -> Result<Self> {
        let config_path = env::var("TAPROOM_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Load configuration from `path` (skipped when absent) and environment.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut builder = config::Config::builder();

        if path.exists() {
            builder = builder.add_source(config::File::from(PathBuf::from(path)));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("TAPROOM")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder.build()?;
        let mut config: Self = settings.try_deserialize()?;

        config.apply_fallbacks(|name| env::var(name).ok());

        if config.logging.level.trim().is_empty() {
            config.logging.level = "info".to_string();
        }

        config.validate()?;
        Ok(config)
    }

    /// Fill unset secrets and store coordinates from the conventional
    /// deployment variables.
    pub fn apply_fallbacks(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_blank = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if self.auth.admin_secret.is_none() {
            self.auth.admin_secret = non_blank(LEGACY_ADMIN_SECRET).map(SecretString::new);
        }
        if self.store.url.is_none() {
            self.store.url = non_blank(LEGACY_STORE_URL);
        }
        if self.store.service_key.is_none() {
            self.store.service_key = non_blank(LEGACY_STORE_KEY).map(SecretString::new);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("server.port must be non-zero");
        }
        if self.store.table.trim().is_empty() {
            bail!("store.table must be specified");
        }
        if let Some(url) = &self.store.url {
            let parsed = Url::parse(url).with_context(|| format!("invalid store.url '{}'", url))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                bail!("store.url must use http or https");
            }
        }
        Ok(())
    }

    /// Admin secret, if one is configured and non-blank
    pub fn admin_secret(&self) -> Option<SecretString> {
        self.auth
            .admin_secret
            .as_ref()
            .filter(|s| !s.expose_secret().trim().is_empty())
            .cloned()
    }

    /// Resolve store configuration.
    ///
    /// Returns `None` when the PostgREST backend is selected but its URL or
    /// key is missing; requests then fail with a configuration error.
    pub fn store_runtime(&self) -> Result<Option<StoreConfig>> {
        self.store.to_runtime()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8888,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthSection {
    pub admin_secret: Option<SecretString>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub backend: StoreBackendKind,
    pub url: Option<String>,
    pub service_key: Option<SecretString>,
    pub table: String,
    /// Per-request timeout towards the store; `0` disables it
    pub request_timeout_secs: u64,
}

impl StoreSection {
    pub fn to_runtime(&self) -> Result<Option<StoreConfig>> {
        match self.backend {
            StoreBackendKind::Memory => Ok(Some(StoreConfig::Memory)),
            StoreBackendKind::Postgrest => {
                let url = self.url.as_deref().map(str::trim).filter(|u| !u.is_empty());
                let key = self
                    .service_key
                    .as_ref()
                    .filter(|k| !k.expose_secret().trim().is_empty());

                let (Some(url), Some(key)) = (url, key) else {
                    return Ok(None);
                };

                if self.table.trim().is_empty() {
                    bail!("store.table must be specified");
                }

                let timeout = match self.request_timeout_secs {
                    0 => None,
                    secs => Some(Duration::from_secs(secs)),
                };

                Ok(Some(StoreConfig::Postgrest {
                    url: url.to_string(),
                    service_key: key.clone(),
                    table: self.table.trim().to_string(),
                    timeout,
                }))
            }
        }
    }
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: StoreBackendKind::Postgrest,
            url: None,
            service_key: None,
            table: DEFAULT_TABLE.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    #[default]
    Postgrest,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AdjustSection {
    pub strategy: AdjustStrategy,
}

/// How the adjust endpoint applies a counter change
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdjustStrategy {
    /// Read the counter, then write the clamped value back. Concurrent
    /// adjustments of the same tap can lose updates.
    #[default]
    ReadModifyWrite,
    /// Single remote procedure call that clamps and writes in one statement
    Atomic,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}
