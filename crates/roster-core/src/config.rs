//! roster.toml configuration parser.
//!
//! Every field has a default, so an empty file (or no file at all) yields
//! a working configuration. Durations are written as strings: `"10s"`,
//! `"500ms"`, `"5m"`.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    pub discovery: DiscoveryConfig,
    pub monitor: MonitorConfig,
    pub probe: ProbeConfig,
    pub refresh: RefreshConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Markdown document listing the instances.
    pub url: String,
    /// Heading that starts the section of instances to ignore.
    pub blocked_marker: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            url: "https://raw.githubusercontent.com/iv-org/documentation/master/docs/instances.md"
                .to_string(),
            blocked_marker: "### Blocked instances".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Paginated monitor listing; `?page=N` is appended per request.
    pub url: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            url: "https://stats.uptimerobot.com/api/getMonitorList/89VnzSKAn".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    #[serde(with = "duration_str")]
    pub connect_timeout: Duration,
    #[serde(with = "duration_str")]
    pub read_timeout: Duration,
    /// Upper bound for probing a single instance (both calls).
    #[serde(with = "duration_str")]
    pub target_timeout: Duration,
    /// Maximum number of instances probed at the same time.
    pub max_concurrent: usize,
    /// Field that must be a string on the first trending entry.
    pub trending_field: String,
    pub user_agent: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            target_timeout: Duration::from_secs(30),
            max_concurrent: 64,
            trending_field: "videoId".to_string(),
            user_agent: concat!("roster/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Sleep between the end of one cycle and the start of the next.
    #[serde(with = "duration_str")]
    pub interval: Duration,
    #[serde(with = "duration_str")]
    pub monitor_timeout: Duration,
    #[serde(with = "duration_str")]
    pub probe_timeout: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            monitor_timeout: Duration::from_secs(5 * 60),
            probe_timeout: Duration::from_secs(20 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Sort applied to the JSON export when the request names none.
    pub default_sort: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 3000)),
            default_sort: "type,users".to_string(),
        }
    }
}

impl RosterConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RosterConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values that would stall the refresh loop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe.max_concurrent == 0 {
            return Err(ConfigError::Invalid {
                field: "probe.max_concurrent",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.refresh.interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "refresh.interval",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.probe.trending_field.is_empty() {
            return Err(ConfigError::Invalid {
                field: "probe.trending_field",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim().parse::<u64>().ok()?.checked_mul(60).map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.trim().parse::<u64>().ok()?.checked_mul(3600).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

fn format_duration(d: &Duration) -> String {
    if d.subsec_millis() != 0 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{}s", d.as_secs())
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid duration {raw:?}")))
    }
}
