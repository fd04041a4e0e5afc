//! Configuration Management
//!
//! Handles persistent configuration storage for cflimits.

use crate::limit::{DEFAULT_CRITICAL_THRESHOLD, DEFAULT_WARNING_THRESHOLD};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Warning/critical percentages for a single limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ThresholdOverride {
    pub warning: u32,
    pub critical: u32,
}

/// User configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// API endpoint answering CloudFront list operations
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Bearer token sent to the endpoint
    #[serde(default)]
    pub token: Option<String>,
    /// Default warning threshold percentage
    #[serde(default)]
    pub warning_threshold: Option<u32>,
    /// Default critical threshold percentage
    #[serde(default)]
    pub critical_threshold: Option<u32>,
    /// Limit name -> overridden limit value
    #[serde(default)]
    pub limit_overrides: BTreeMap<String, u64>,
    /// Limit name -> overridden thresholds
    #[serde(default)]
    pub threshold_overrides: BTreeMap<String, ThresholdOverride>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cflimits").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        Self::load_from(&path)
    }

    /// Load configuration from a specific file, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Get effective endpoint (CLI > config > public endpoint)
    pub fn effective_endpoint(&self, cli: Option<&str>) -> String {
        cli.map(|s| s.to_string())
            .or_else(|| self.endpoint.clone())
            .unwrap_or_else(|| crate::aws::DEFAULT_ENDPOINT.to_string())
    }

    /// Get effective warning threshold (CLI > config > default)
    pub fn effective_warning_threshold(&self, cli: Option<u32>) -> u32 {
        cli.or(self.warning_threshold)
            .unwrap_or(DEFAULT_WARNING_THRESHOLD)
    }

    /// Get effective critical threshold (CLI > config > default)
    pub fn effective_critical_threshold(&self, cli: Option<u32>) -> u32 {
        cli.or(self.critical_threshold)
            .unwrap_or(DEFAULT_CRITICAL_THRESHOLD)
    }
}

/// Parse a `NAME=VALUE` limit override from the command line
pub fn parse_limit_override(s: &str) -> Result<(String, u64), String> {
    let (name, value) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing limit name in '{}'", s));
    }

    let value = value
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid limit value in '{}': {}", s, e))?;

    Ok((name.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("cflimits-test-{}-{}", std::process::id(), name))
            .join("config.json")
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.effective_endpoint(None), "https://cloudfront.amazonaws.com");
        assert_eq!(config.effective_warning_threshold(None), 80);
        assert_eq!(config.effective_critical_threshold(None), 99);
    }

    #[test]
    fn test_cli_takes_precedence() {
        let config = Config {
            endpoint: Some("http://config.test".to_string()),
            warning_threshold: Some(60),
            critical_threshold: Some(90),
            ..Default::default()
        };

        assert_eq!(config.effective_endpoint(None), "http://config.test");
        assert_eq!(config.effective_endpoint(Some("http://cli.test")), "http://cli.test");
        assert_eq!(config.effective_warning_threshold(None), 60);
        assert_eq!(config.effective_warning_threshold(Some(70)), 70);
        assert_eq!(config.effective_critical_threshold(Some(95)), 95);
    }

    #[test]
    fn test_load_from_file() {
        let path = temp_path("load");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"{
                "token": "secret",
                "limit_overrides": { "Distributions per AWS account": 500 },
                "threshold_overrides": {
                    "Key groups per AWS account": { "warning": 50, "critical": 75 }
                }
            }"#,
        )
        .unwrap();

        let loaded = Config::load_from(&path);

        assert_eq!(loaded.token.as_deref(), Some("secret"));
        assert_eq!(loaded.limit_overrides["Distributions per AWS account"], 500);
        assert_eq!(
            loaded.threshold_overrides["Key groups per AWS account"],
            ThresholdOverride {
                warning: 50,
                critical: 75
            }
        );

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_or_invalid_file_gives_defaults() {
        let path = temp_path("missing");
        assert!(Config::load_from(&path).endpoint.is_none());

        let path = temp_path("invalid");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_from(&path).limit_overrides.is_empty());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_parse_limit_override() {
        assert_eq!(
            parse_limit_override("Key groups per AWS account=20"),
            Ok(("Key groups per AWS account".to_string(), 20))
        );
        assert!(parse_limit_override("no value").is_err());
        assert!(parse_limit_override("=5").is_err());
        assert!(parse_limit_override("Name=abc").is_err());
    }
}
