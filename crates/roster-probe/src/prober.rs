//! Instance probe logic.
//!
//! Each clearnet instance gets two independent calls against its origin:
//! `/api/v1/stats` for the status payload and `/api/v1/trending` to see
//! whether the public API is usable (and usable cross-origin). Onion and
//! i2p instances are never contacted.

use std::fmt;

use reqwest::header::ACCESS_CONTROL_ALLOW_ORIGIN;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use roster_core::{ProbeRecord, RawTarget};

use crate::client::{get_json, parse_url};
use crate::error::FetchError;

pub const STATS_PATH: &str = "/api/v1/stats";
pub const TRENDING_PATH: &str = "/api/v1/trending";

/// Which probe call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Stats,
    Trending,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Stats => STATS_PATH,
            Endpoint::Trending => TRENDING_PATH,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug)]
pub struct ProbeFailure {
    pub endpoint: Endpoint,
    pub error: FetchError,
}

/// Outcome of probing one instance: the record plus every call that
/// failed along the way. Failures only degrade fields of the record.
#[derive(Debug)]
pub struct ProbeReport {
    pub host: String,
    pub record: ProbeRecord,
    pub failures: Vec<ProbeFailure>,
}

/// Probes instances with a shared HTTP client.
#[derive(Debug, Clone)]
pub struct Prober {
    client: Client,
    /// Field that must be a string on the first trending entry.
    trending_field: String,
}

impl Prober {
    pub fn new(client: Client, trending_field: impl Into<String>) -> Self {
        Self {
            client,
            trending_field: trending_field.into(),
        }
    }

    /// Probe one instance. Never fails; see [`ProbeReport::failures`].
    pub async fn probe(&self, target: &RawTarget) -> ProbeReport {
        let mut record = ProbeRecord {
            kind: String::new(),
            region: target.region(),
            flag: target.flag.clone(),
            stats: None,
            cors: None,
            api: None,
            uri: target.uri.clone(),
        };
        let mut failures = Vec::new();

        if target.is_hidden_service() {
            record.kind = target.tld().to_string();
            return ProbeReport {
                host: target.host.clone(),
                record,
                failures,
            };
        }

        record.kind = scheme(&target.uri).to_string();

        match self.fetch_stats(&target.uri).await {
            Ok(stats) => record.stats = Some(stats),
            Err(error) => failures.push(ProbeFailure {
                endpoint: Endpoint::Stats,
                error,
            }),
        }

        match self.check_trending(&target.uri).await {
            Ok(cors) => {
                record.api = Some(true);
                record.cors = Some(cors);
            }
            Err(error) => {
                record.api = Some(false);
                record.cors = Some(false);
                failures.push(ProbeFailure {
                    endpoint: Endpoint::Trending,
                    error,
                });
            }
        }

        ProbeReport {
            host: target.host.clone(),
            record,
            failures,
        }
    }

    async fn fetch_stats(&self, origin: &str) -> Result<Value, FetchError> {
        let url = parse_url(&format!("{origin}{STATS_PATH}"))?;
        get_json(&self.client, url).await
    }

    /// Returns whether the trending response allows any origin. Succeeds
    /// only on a 200 whose first entry carries the identifying field.
    async fn check_trending(&self, origin: &str) -> Result<bool, FetchError> {
        let url = parse_url(&format!("{origin}{TRENDING_PATH}"))?;
        let resp = self.client.get(url).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(FetchError::Status(resp.status()));
        }

        let cors = resp
            .headers()
            .get(ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_some_and(|v| v.as_bytes() == b"*");

        let body: Value = serde_json::from_slice(&resp.bytes().await?)?;
        let identified = body
            .as_array()
            .and_then(|entries| entries.first())
            .and_then(|entry| entry.get(&self.trending_field))
            .is_some_and(Value::is_string);

        if !identified {
            return Err(FetchError::Payload(format!(
                "first trending entry has no string {:?}",
                self.trending_field
            )));
        }
        Ok(cors)
    }
}

fn scheme(uri: &str) -> &str {
    uri.split_once("://").map_or(uri, |(scheme, _)| scheme)
}
