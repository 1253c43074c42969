//! brokerop.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorConfig {
    #[serde(default)]
    pub operator: OperatorSection,
    #[serde(default)]
    pub api: ApiSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorSection {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Pause between reconciliation passes (e.g., "10s").
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval: String,
}

/// How to reach each instance's administrative API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
    /// Deadline for a single API call (e.g., "5s").
    #[serde(default = "default_api_timeout")]
    pub timeout: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/brokerop")
}

fn default_reconcile_interval() -> String {
    "10s".to_string()
}

fn default_api_port() -> u16 {
    18083
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_password() -> String {
    "public".to_string()
}

fn default_api_timeout() -> String {
    "5s".to_string()
}

impl Default for OperatorSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            reconcile_interval: default_reconcile_interval(),
        }
    }
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            username: default_username(),
            password: default_password(),
            timeout: default_api_timeout(),
        }
    }
}

impl OperatorConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: OperatorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if parse_duration(&self.operator.reconcile_interval).is_none() {
            anyhow::bail!(
                "invalid operator.reconcile_interval: {:?}",
                self.operator.reconcile_interval
            );
        }
        if parse_duration(&self.api.timeout).is_none() {
            anyhow::bail!("invalid api.timeout: {:?}", self.api.timeout);
        }
        Ok(())
    }

    pub fn reconcile_interval(&self) -> Duration {
        parse_duration(&self.operator.reconcile_interval).unwrap_or(Duration::from_secs(10))
    }

    pub fn api_timeout(&self) -> Duration {
        parse_duration(&self.api.timeout).unwrap_or(Duration::from_secs(5))
    }
}

/// Parse a duration string like "5s", "500ms", "1m". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = OperatorConfig::from_toml_str("").unwrap();
        assert_eq!(config.api.port, 18083);
        assert_eq!(config.reconcile_interval(), Duration::from_secs(10));
        assert_eq!(config.api_timeout(), Duration::from_secs(5));
        assert_eq!(config.operator.data_dir, PathBuf::from("/var/lib/brokerop"));
    }

    #[test]
    fn parse_full() {
        let toml_str = r#"
[operator]
data_dir = "/tmp/brokerop"
reconcile_interval = "2m"

[api]
port = 8081
username = "ops"
password = "secret"
timeout = "500ms"
"#;
        let config = OperatorConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.api.port, 8081);
        assert_eq!(config.api.username, "ops");
        assert_eq!(config.reconcile_interval(), Duration::from_secs(120));
        assert_eq!(config.api_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn rejects_bad_duration() {
        let err = OperatorConfig::from_toml_str("[api]\ntimeout = \"soon\"\n").unwrap_err();
        assert!(err.to_string().contains("api.timeout"));
    }

    #[test]
    fn roundtrips_through_toml() {
        let config = OperatorConfig::default();
        let text = config.to_toml_string().unwrap();
        let parsed = OperatorConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.api.port, config.api.port);
    }

    #[test]
    fn parse_duration_forms() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("ten"), None);
    }

    #[test]
    fn overflowing_minutes_are_rejected() {
        assert_eq!(parse_duration(&format!("{}m", u64::MAX)), None);
        assert_eq!(parse_duration(&format!("{}m", u64::MAX / 60)), Some(Duration::from_secs(u64::MAX / 60 * 60)));
        let err = OperatorConfig::from_toml_str(&format!(
            "[operator]\nreconcile_interval = \"{}m\"\n",
            u64::MAX
        ))
        .unwrap_err();
        assert!(err.to_string().contains("reconcile_interval"));
    }
}
