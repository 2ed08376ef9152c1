//! Presentation ordering for published records.
//!
//! A sort spec is a comma-separated list of keys, optionally followed by
//! `-reverse`: `"type,users"`, `"health,location-reverse"`. Keys are
//! applied in order; a later key only decides when every earlier key
//! compares equal. The reversal applies to the final sequence.

use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;
use std::str::FromStr;

use roster_core::Record;

use crate::error::SortError;

const REVERSE_SUFFIX: &str = "-reverse";

/// Region used for records without one, so they sort last.
const UNKNOWN_REGION: &str = "ZZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Most recent uptime ratio, highest first.
    Health,
    /// Region code, unknown last.
    Location,
    /// Host name.
    Name,
    /// Open registrations first, then closed, then unknown.
    Signup,
    /// Instance type ("https", "onion", ...).
    Type,
    Cors,
    Api,
    /// Total users, highest first.
    Users,
    /// Software version, newest first.
    Version,
}

impl FromStr for SortKey {
    type Err = SortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "health" => Ok(Self::Health),
            "location" => Ok(Self::Location),
            "name" => Ok(Self::Name),
            "signup" => Ok(Self::Signup),
            "type" => Ok(Self::Type),
            "cors" => Ok(Self::Cors),
            "api" => Ok(Self::Api),
            "users" => Ok(Self::Users),
            "version" => Ok(Self::Version),
            other => Err(SortError::UnknownKey(other.to_string())),
        }
    }
}

impl SortKey {
    fn compare(self, (a_host, a): (&str, &Record), (b_host, b): (&str, &Record)) -> Ordering {
        match self {
            Self::Health => {
                let a = -a.latest_uptime_ratio().unwrap_or(0.0);
                let b = -b.latest_uptime_ratio().unwrap_or(0.0);
                a.total_cmp(&b)
            }
            Self::Location => region(a).cmp(region(b)),
            Self::Name => a_host.cmp(b_host),
            Self::Signup => tri_state(a.open_registrations()).cmp(&tri_state(b.open_registrations())),
            Self::Type => a.kind.cmp(&b.kind),
            Self::Cors => tri_state(a.cors).cmp(&tri_state(b.cors)),
            Self::Api => tri_state(a.api).cmp(&tri_state(b.api)),
            Self::Users => Reverse(a.total_users().unwrap_or(0))
                .cmp(&Reverse(b.total_users().unwrap_or(0))),
            Self::Version => compare_versions(
                &version_rank(a.software_version()),
                &version_rank(b.software_version()),
            ),
        }
    }
}

fn region(record: &Record) -> &str {
    record.region.as_deref().unwrap_or(UNKNOWN_REGION)
}

/// `true` → 0, `false` → 1, unknown → 2.
fn tri_state(value: Option<bool>) -> u8 {
    match value {
        Some(true) => 0,
        Some(false) => 1,
        None => 2,
    }
}

/// Negated numeric components of the version before its first hyphen,
/// so that newer versions sort first. Non-numeric components count as 0.
fn version_rank(version: Option<&str>) -> Vec<i64> {
    let Some(version) = version else {
        return Vec::new();
    };
    let release = version.split('-').next().unwrap_or_default();
    release
        .split('.')
        .map(|part| -part.trim().parse::<i64>().unwrap_or(0))
        .collect()
}

/// Element-wise comparison where missing components count as 0.
fn compare_versions(a: &[i64], b: &[i64]) -> Ordering {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let x = a.get(i).copied().unwrap_or(0);
            let y = b.get(i).copied().unwrap_or(0);
            x.cmp(&y)
        })
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// A parsed sort specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<SortKey>,
    reverse: bool,
}

impl SortSpec {
    /// Parse `"key1,key2[-reverse]"`. Any unrecognized key is an error.
    pub fn parse(raw: &str) -> Result<Self, SortError> {
        let raw = raw.trim();
        let (keys, reverse) = match raw.strip_suffix(REVERSE_SUFFIX) {
            Some(keys) => (keys, true),
            None => (raw, false),
        };
        let keys = keys
            .split(',')
            .map(|k| k.trim().parse())
            .collect::<Result<Vec<SortKey>, _>>()?;
        Ok(Self { keys, reverse })
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn is_reversed(&self) -> bool {
        self.reverse
    }

    /// Order `records` by this spec. The sort is stable, so hosts that
    /// compare equal on every key keep their map (host) order.
    pub fn sort<'a>(&self, records: &'a BTreeMap<String, Record>) -> Vec<(&'a str, &'a Record)> {
        let mut entries: Vec<(&str, &Record)> =
            records.iter().map(|(host, r)| (host.as_str(), r)).collect();

        entries.sort_by(|a, b| {
            self.keys
                .iter()
                .map(|key| key.compare(*a, *b))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        });

        if self.reverse {
            entries.reverse();
        }
        entries
    }
}

impl FromStr for SortSpec {
    type Err = SortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
