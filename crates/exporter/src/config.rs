//! Exporter configuration

use anyhow::{bail, Result};
use exporter_lib::client::EngineSettings;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Exporter configuration, read from `ZVIRT_*` environment variables and an
/// optional `zvirt-exporter` config file
#[derive(Clone, Deserialize)]
pub struct ExporterConfig {
    /// URL scheme of the engine API
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Engine host name, optionally with a port
    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// SSO authentication profile
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Port for /metrics, /healthz, /readyz and /internal/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Target time between refresh cycle starts
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Verify the engine certificate; engines usually run self-signed
    #[serde(default)]
    pub verify_tls: bool,
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_domain() -> String {
    "internal".to_string()
}

fn default_api_port() -> u16 {
    8000
}

fn default_refresh_interval() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

impl fmt::Debug for ExporterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExporterConfig")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .field("api_port", &self.api_port)
            .field("refresh_interval_secs", &self.refresh_interval_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}

impl ExporterConfig {
    /// Load configuration from the environment and config file
    pub fn load() -> Result<Self> {
        Self::from_sources(config::Environment::with_prefix("ZVIRT"))
    }

    fn from_sources(environment: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("zvirt-exporter").required(false))
            .add_source(environment)
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            bail!("ZVIRT_HOST is required");
        }
        if self.username.trim().is_empty() {
            bail!("ZVIRT_USERNAME is required");
        }
        if !matches!(self.scheme.as_str(), "http" | "https") {
            bail!("unsupported scheme `{}`", self.scheme);
        }
        if self.refresh_interval_secs == 0 {
            bail!("refresh interval must be at least one second");
        }
        if self.request_timeout_secs == 0 || self.connect_timeout_secs == 0 {
            bail!("timeouts must be at least one second");
        }
        Ok(())
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host.trim_end_matches('/'))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            base_url: self.base_url(),
            username: self.username.clone(),
            password: self.password.clone(),
            domain: self.domain.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            verify_tls: self.verify_tls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ExporterConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ExporterConfig::from_sources(config::Environment::with_prefix("ZVIRT").source(Some(map)))
    }

    #[test]
    fn test_defaults() {
        let config = load(&[
            ("ZVIRT_HOST", "engine.example.com"),
            ("ZVIRT_USERNAME", "admin"),
        ])
        .unwrap();

        assert_eq!(config.api_port, 8000);
        assert_eq!(config.refresh_interval(), Duration::from_secs(5));
        assert_eq!(config.domain, "internal");
        assert!(!config.verify_tls);
        assert_eq!(config.base_url(), "https://engine.example.com");
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("ZVIRT_SCHEME", "http"),
            ("ZVIRT_HOST", "engine.lab:8080/"),
            ("ZVIRT_USERNAME", "exporter"),
            ("ZVIRT_PASSWORD", "s3cret"),
            ("ZVIRT_DOMAIN", "corp.local"),
            ("ZVIRT_API_PORT", "9100"),
            ("ZVIRT_REFRESH_INTERVAL_SECS", "30"),
            ("ZVIRT_VERIFY_TLS", "true"),
        ])
        .unwrap();

        assert_eq!(config.api_port, 9100);
        assert!(config.verify_tls);

        let settings = config.engine_settings();
        assert_eq!(settings.base_url, "http://engine.lab:8080");
        assert_eq!(settings.login(), "exporter@corp.local");
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert!(!format!("{config:?}").contains("s3cret"));
    }

    #[test]
    fn test_host_is_required() {
        let err = load(&[("ZVIRT_USERNAME", "admin")]).unwrap_err();
        assert!(err.to_string().contains("ZVIRT_HOST"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = load(&[
            ("ZVIRT_HOST", "engine"),
            ("ZVIRT_USERNAME", "admin"),
            ("ZVIRT_REFRESH_INTERVAL_SECS", "0"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("refresh interval"));
    }
}
