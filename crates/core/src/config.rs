use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CatalogError;

/// Prefix of environment variables that override file settings
pub const ENV_PREFIX: &str = "NAS_CATALOG_";

/// Application settings, read from an optional TOML file and then
/// overridden by `NAS_CATALOG_*` environment variables
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub upnp: UpnpSettings,
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub scan: ScanSettings,
    pub smb: SmbSettings,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpnpSettings {
    /// SSDP listen window in seconds (also sent as MX)
    pub discovery_timeout_secs: u64,
    /// Substring of the server name to select; empty means auto-select
    pub server_name: String,
    /// Concurrent device-description fetches
    pub resolve_concurrency: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite file; defaults to the platform data directory
    pub path: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub max_depth: usize,
    pub auto_scan_on_startup: bool,
    /// Concurrent Browse requests per depth level
    pub browse_concurrency: usize,
    /// Upper bound on containers browsed in one walk
    pub max_containers: usize,
    /// Share name cached UPnP items are stored under
    pub share_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmbSettings {
    pub enabled: bool,
    pub hostname: String,
    pub username: String,
    pub password: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upnp: UpnpSettings::default(),
            server: ServerSettings::default(),
            database: DatabaseSettings::default(),
            scan: ScanSettings::default(),
            smb: SmbSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for UpnpSettings {
    fn default() -> Self {
        Self {
            discovery_timeout_secs: 5,
            server_name: String::new(),
            resolve_concurrency: 8,
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            max_depth: 5,
            auto_scan_on_startup: true,
            browse_concurrency: 4,
            max_containers: 10_000,
            share_name: "UPnP".to_string(),
        }
    }
}

impl SmbSettings {
    /// SMB URLs are generated only when enabled with a host and user
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.hostname.is_empty() && !self.username.is_empty()
    }
}

impl Settings {
    /// Load settings from `path` (if given and present), then apply
    /// environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) if path.exists() => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                let settings: Settings = toml::from_str(&text)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?;
                tracing::info!("Loaded configuration from {}", path.display());
                settings
            }
            Some(path) => {
                tracing::warn!("Config file {} not found, using defaults", path.display());
                Settings::default()
            }
            None => Settings::default(),
        };

        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `NAS_CATALOG_*` overrides using `lookup` to read variables
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), CatalogError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = get("UPNP_DISCOVERY_TIMEOUT") {
            self.upnp.discovery_timeout_secs = parse_var("UPNP_DISCOVERY_TIMEOUT", &v)?;
        }
        if let Some(v) = get("UPNP_SERVER_NAME") {
            self.upnp.server_name = v;
        }
        if let Some(v) = get("UPNP_RESOLVE_CONCURRENCY") {
            self.upnp.resolve_concurrency = parse_var("UPNP_RESOLVE_CONCURRENCY", &v)?;
        }
        if let Some(v) = get("SERVER_HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("SERVER_PORT") {
            self.server.port = parse_var("SERVER_PORT", &v)?;
        }
        if let Some(v) = get("DATABASE_PATH") {
            self.database.path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("MAX_SCAN_DEPTH") {
            self.scan.max_depth = parse_var("MAX_SCAN_DEPTH", &v)?;
        }
        if let Some(v) = get("AUTO_SCAN_ON_STARTUP") {
            self.scan.auto_scan_on_startup = parse_bool("AUTO_SCAN_ON_STARTUP", &v)?;
        }
        if let Some(v) = get("BROWSE_CONCURRENCY") {
            self.scan.browse_concurrency = parse_var("BROWSE_CONCURRENCY", &v)?;
        }
        if let Some(v) = get("MAX_CONTAINERS") {
            self.scan.max_containers = parse_var("MAX_CONTAINERS", &v)?;
        }
        if let Some(v) = get("SMB_ENABLED") {
            self.smb.enabled = parse_bool("SMB_ENABLED", &v)?;
        }
        if let Some(v) = get("SMB_HOSTNAME") {
            self.smb.hostname = v;
        }
        if let Some(v) = get("SMB_USERNAME") {
            self.smb.username = v;
        }
        if let Some(v) = get("SMB_PASSWORD") {
            self.smb.password = v;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log_level = v;
        }

        Ok(())
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.upnp.discovery_timeout_secs == 0 {
            return Err(CatalogError::Config(
                "upnp.discovery_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.upnp.resolve_concurrency == 0 || self.scan.browse_concurrency == 0 {
            return Err(CatalogError::Config(
                "concurrency limits must be at least 1".to_string(),
            ));
        }
        if self.upnp.discovery_timeout_secs > 5 {
            tracing::warn!(
                "Discovery timeout of {}s exceeds the usual SSDP MX bound of 5s",
                self.upnp.discovery_timeout_secs
            );
        }
        Ok(())
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.upnp.discovery_timeout_secs)
    }

    /// Database path, falling back to the platform data directory
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database.path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Failed to get data directory"))?
            .join("nas-media-catalog");
        Ok(data_dir.join("media_catalog.db"))
    }

    /// Default config file location (`<config dir>/nas-media-catalog/config.toml`)
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("nas-media-catalog").join("config.toml"))
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, CatalogError> {
    value
        .trim()
        .parse()
        .map_err(|_| CatalogError::Config(format!("{}{} has invalid value '{}'", ENV_PREFIX, name, value)))
}

fn parse_bool(name: &str, value: &str) -> Result<bool, CatalogError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CatalogError::Config(format!(
            "{}{} has invalid value '{}'",
            ENV_PREFIX, name, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.upnp.discovery_timeout_secs, 5);
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.scan.max_depth, 5);
        assert!(settings.scan.auto_scan_on_startup);
        assert!(!settings.smb.is_configured());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let settings: Settings = toml::from_str(
            r#"
            log_level = "debug"

            [upnp]
            server_name = "FRITZ"

            [scan]
            max_depth = 3
            "#,
        )
        .unwrap();

        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.upnp.server_name, "FRITZ");
        assert_eq!(settings.upnp.discovery_timeout_secs, 5);
        assert_eq!(settings.scan.max_depth, 3);
        assert_eq!(settings.scan.browse_concurrency, 4);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<String, String> = [
            ("NAS_CATALOG_SERVER_PORT", "9000"),
            ("NAS_CATALOG_AUTO_SCAN_ON_STARTUP", "false"),
            ("NAS_CATALOG_SMB_ENABLED", "yes"),
            ("NAS_CATALOG_SMB_HOSTNAME", "nas.local"),
            ("NAS_CATALOG_SMB_USERNAME", "guest"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let mut settings = Settings::default();
        settings.apply_overrides(|key| vars.get(key).cloned()).unwrap();

        assert_eq!(settings.server.port, 9000);
        assert!(!settings.scan.auto_scan_on_startup);
        assert!(settings.smb.is_configured());
    }

    #[test]
    fn test_invalid_env_override() {
        let mut settings = Settings::default();
        let result = settings.apply_overrides(|key| {
            (key == "NAS_CATALOG_MAX_SCAN_DEPTH").then(|| "deep".to_string())
        });
        assert!(matches!(result, Err(CatalogError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut settings = Settings::default();
        settings.upnp.discovery_timeout_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_explicit_database_path() {
        let mut settings = Settings::default();
        settings.database.path = Some(PathBuf::from("/tmp/catalog.db"));
        assert_eq!(settings.database_path().unwrap(), PathBuf::from("/tmp/catalog.db"));
    }
}
