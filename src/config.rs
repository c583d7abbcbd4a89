//! Configuration loaded from defaults, an optional config file and the environment

use crate::client::{ProviderConfig, DEFAULT_BASE_URL};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Prefix for environment overrides, e.g. `FARES__SERVER__PORT=8080`
pub const ENV_PREFIX: &str = "FARES";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    pub logging: LoggingSettings,
    /// Problems found while loading, held until logging is up
    #[serde(skip)]
    pub notices: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Browser origin allowed by CORS; unset or `*` allows any origin
    pub allowed_origin: Option<String>,
}

#[derive(Clone, Deserialize)]
pub struct ProviderSettings {
    pub base_url: String,
    pub token: String,
    pub marker: String,
    pub host: Option<String>,
    pub currency: String,
    pub timeout_secs: u64,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("marker", &self.marker)
            .field("host", &self.host)
            .field("currency", &self.currency)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ProviderSettings {
    pub fn to_provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            base_url: self.base_url.clone(),
            token: self.token.clone(),
            marker: self.marker.clone(),
            host: self.host.clone(),
            currency: self.currency.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
    /// Write daily-rolling JSON logs here in addition to stdout
    pub directory: Option<String>,
    pub json: bool,
}

impl Settings {
    /// Load settings for the running process.
    ///
    /// Reads `.env` first, then layers built-in defaults, `config/default.*`
    /// and `FARES__*` variables.
    /// Nothing is logged here; call [`Settings::log_notices`] once the
    /// subscriber is installed.
    pub fn load() -> Result<Self, ConfigError> {
        let dotenv = dotenvy::dotenv();

        let mut settings = Self::from_sources(Some("config/default"), std::env::vars().collect())?;
        if let Err(e) = dotenv {
            if !e.not_found() {
                settings.notices.insert(0, format!("Failed to read .env file: {}", e));
            }
        }
        Ok(settings)
    }

    pub fn log_notices(&self) {
        for notice in &self.notices {
            warn!("{}", notice);
        }
    }

    /// Build settings from an optional config file and a set of variables.
    ///
    /// The legacy deployment variable names (`AVIASALES_API_TOKEN`,
    /// `PARTNER_ID`, `SITE_URL`, `PORT`) seed the defaults; the config file
    /// and prefixed variables take precedence over them.
    pub fn from_sources(
        file: Option<&str>,
        vars: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let legacy = |key: &str| vars.get(key).filter(|v| !v.trim().is_empty()).cloned();
        let site_url = legacy("SITE_URL");

        let mut builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", legacy("PORT").unwrap_or_else(|| "3001".to_string()))?
            .set_default("server.allowed_origin", site_url.clone())?
            .set_default("provider.base_url", DEFAULT_BASE_URL)?
            .set_default("provider.token", legacy("AVIASALES_API_TOKEN").unwrap_or_default())?
            .set_default("provider.marker", legacy("PARTNER_ID").unwrap_or_default())?
            .set_default("provider.host", site_url)?
            .set_default("provider.currency", "USD")?
            .set_default("provider.timeout_secs", 10_i64)?
            .set_default("logging.level", "info")?
            .set_default("logging.directory", None::<String>)?
            .set_default("logging.json", false)?;

        if let Some(file) = file {
            builder = builder.add_source(File::with_name(file).required(false));
        }

        let mut settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .source(Some(vars.into_iter().collect())),
            )
            .build()?
            .try_deserialize()?;

        if settings.provider.token.trim().is_empty() {
            settings.notices.push(
                "Provider token is not configured, fare searches will be rejected upstream"
                    .to_string(),
            );
        }
        if settings.provider.timeout_secs == 0 {
            return Err(ConfigError::Message(
                "provider.timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(settings)
    }
}
