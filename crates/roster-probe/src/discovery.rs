//! Target discovery — turns the published instance list into targets.
//!
//! The list is a markdown document with one instance per line:
//!
//! ```text
//! * [yt.example.org](https://yt.example.org) 🇩🇪
//! * [abc.onion](http://abc.onion)
//! ### Blocked instances
//! * [bad.example](https://bad.example) 🇺🇸
//! ```
//!
//! Everything after the blocked-instances heading is ignored.

use regex::Regex;
use reqwest::{Client, Url};
use tracing::{debug, warn};

use roster_core::RawTarget;

use crate::client::{get_text, parse_url};

const LINE_PATTERN: &str =
    r"\[(?P<host>[^\]\s]+)\]\((?P<uri>[^)\s]+)\)(?:\s+(?P<flag>[\x{1F1E6}-\x{1F1FF}]{2}))?";

/// Fetch the instance list. Any failure yields an empty document so the
/// cycle carries on (and later aborts on the empty probe set).
pub async fn fetch_document(client: &Client, url: &str) -> String {
    let result = match parse_url(url) {
        Ok(url) => get_text(client, url).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(body) => body,
        Err(e) => {
            warn!(%url, error = %e, "failed to fetch instance list");
            String::new()
        }
    }
}

/// Parses instance lines out of the discovery document.
#[derive(Debug, Clone)]
pub struct TargetParser {
    line: Regex,
    blocked_marker: String,
}

impl TargetParser {
    pub fn new(blocked_marker: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            line: Regex::new(LINE_PATTERN)?,
            blocked_marker: blocked_marker.into(),
        })
    }

    /// Lazily yield every target listed before the blocked-instances marker.
    pub fn parse<'a>(&'a self, document: &'a str) -> impl Iterator<Item = RawTarget> + 'a {
        let listed = match document.find(self.blocked_marker.as_str()) {
            Some(end) if !self.blocked_marker.is_empty() => &document[..end],
            _ => document,
        };

        listed.lines().filter_map(|line| {
            let caps = self.line.captures(line)?;
            let host = caps["host"].to_string();
            let Some(uri) = normalize_uri(&caps["uri"]) else {
                debug!(%host, uri = &caps["uri"], "skipping instance with unparseable uri");
                return None;
            };
            Some(RawTarget {
                host,
                uri,
                flag: caps.name("flag").map(|m| m.as_str().to_string()),
            })
        })
    }
}

/// Reduce a URI to `scheme://host[:port]`.
pub fn normalize_uri(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}://{host}:{port}", url.scheme()),
        None => format!("{}://{host}", url.scheme()),
    })
}
