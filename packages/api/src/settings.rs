//! Client configuration.
//!
//! Loaded from built-in defaults, then an optional `duniversity.toml`, then
//! `DUNIVERSITY_*` environment variables (a `.env` file is read first).

use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Which kind of deployment the gateway belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Development gateway; trust material is fetched from the gateway itself.
    Local,
    /// Production gateway; trust material is provisioned out of band, never fetched.
    Production,
}

impl Network {
    pub fn requires_trust_bootstrap(&self) -> bool {
        matches!(self, Network::Local)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub network: Network,
    /// Base URL of the service gateway.
    pub host: String,
    /// Identifier of the governance service behind the gateway.
    pub service_id: String,
    /// Where the login flow is sent.
    pub identity_provider_url: String,
    /// Lifetime requested for delegations issued at login.
    pub max_time_to_live_secs: u64,
}

impl Settings {
    pub fn new() -> Result<Self, SettingsError> {
        Self::from_file("duniversity.toml")
    }

    pub fn from_file(path: &str) -> Result<Self, SettingsError> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .set_default("network", "local")?
            .set_default("host", "http://127.0.0.1:4943")?
            .set_default("service_id", "")?
            .set_default("identity_provider_url", "")?
            .set_default("max_time_to_live_secs", 8_i64 * 60 * 60)?
            .add_source(
                File::with_name(path)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::with_prefix("DUNIVERSITY"))
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.service_id.trim().is_empty() {
            return Err(SettingsError::Missing("service_id"));
        }
        if self.identity_provider_url.trim().is_empty() {
            return Err(SettingsError::Missing("identity_provider_url"));
        }
        Ok(())
    }

    pub fn max_time_to_live(&self) -> Duration {
        Duration::from_secs(self.max_time_to_live_secs)
    }
}
