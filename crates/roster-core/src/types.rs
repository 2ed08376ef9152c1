//! Shared types used across roster crates.
//!
//! `stats` and monitor payloads are kept as opaque `serde_json::Value`
//! documents. The handful of fields that roster actually inspects are
//! exposed through accessors on [`Record`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::region::decode_region;

/// Host label suffixes that are never probed over the network.
pub const HIDDEN_SERVICE_KINDS: [&str; 2] = ["onion", "i2p"];

/// An instance entry parsed from the discovery document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTarget {
    pub host: String,
    pub uri: String,
    /// Raw flag emoji, if the entry carried one.
    pub flag: Option<String>,
}

impl RawTarget {
    /// Two-letter region code decoded from the flag.
    pub fn region(&self) -> Option<String> {
        self.flag.as_deref().and_then(decode_region)
    }

    /// Last dot-delimited label of the host.
    pub fn tld(&self) -> &str {
        self.host.rsplit('.').next().unwrap_or(&self.host)
    }

    /// Whether the host is an onion or i2p address.
    pub fn is_hidden_service(&self) -> bool {
        HIDDEN_SERVICE_KINDS.contains(&self.tld())
    }
}

/// Result of probing one instance directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeRecord {
    /// "onion", "i2p", or the URI scheme.
    #[serde(rename = "type")]
    pub kind: String,
    pub region: Option<String>,
    pub flag: Option<String>,
    pub stats: Option<Value>,
    /// `None` when the capability probe was never attempted.
    pub cors: Option<bool>,
    /// `None` when the capability probe was never attempted.
    pub api: Option<bool>,
    pub uri: String,
}

impl ProbeRecord {
    pub fn cors_enabled(&self) -> bool {
        self.cors.unwrap_or(false)
    }

    pub fn api_enabled(&self) -> bool {
        self.api.unwrap_or(false)
    }
}

/// An entry from the third-party monitor listing.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorRecord {
    /// Monitor name, expected to equal an instance host.
    pub name: String,
    pub payload: Value,
}

impl MonitorRecord {
    /// Build from a raw listing entry. Entries without a string `name`
    /// cannot be joined and are rejected.
    pub fn from_payload(payload: Value) -> Option<Self> {
        let name = payload.get("name")?.as_str()?.to_string();
        Some(Self { name, payload })
    }
}

/// A published instance: probe fields plus the matching monitor payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub flag: Option<String>,
    pub region: Option<String>,
    pub stats: Option<Value>,
    pub cors: Option<bool>,
    pub api: Option<bool>,
    #[serde(rename = "type")]
    pub kind: String,
    pub uri: String,
    pub monitor: Value,
}

impl Record {
    pub fn new(probe: ProbeRecord, monitor: Value) -> Self {
        Self {
            flag: probe.flag,
            region: probe.region,
            stats: probe.stats,
            cors: probe.cors,
            api: probe.api,
            kind: probe.kind,
            uri: probe.uri,
            monitor,
        }
    }

    /// `stats.openRegistrations`.
    pub fn open_registrations(&self) -> Option<bool> {
        self.stats.as_ref()?.get("openRegistrations")?.as_bool()
    }

    /// `stats.usage.users.total`.
    pub fn total_users(&self) -> Option<i64> {
        self.stats
            .as_ref()?
            .pointer("/usage/users/total")?
            .as_i64()
    }

    /// `stats.software.version`.
    pub fn software_version(&self) -> Option<&str> {
        self.stats.as_ref()?.pointer("/software/version")?.as_str()
    }

    /// Uptime ratio of the most recent monitor window (`dailyRatios[0].ratio`).
    ///
    /// The monitor service reports ratios as strings (`"99.987"`); plain
    /// numbers are accepted too.
    pub fn latest_uptime_ratio(&self) -> Option<f64> {
        match self.monitor.pointer("/dailyRatios/0/ratio")? {
            Value::String(s) => s.trim().parse().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }
}
