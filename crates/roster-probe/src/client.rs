//! Shared HTTP client for every outbound call.

use reqwest::{Client, Url};
use serde::de::DeserializeOwned;

use roster_core::config::ProbeConfig;

use crate::error::FetchError;

/// Build the client used for discovery, probes, and monitor pages.
///
/// Connect and read timeouts apply to each request independently; they
/// bound single calls, not a whole probe.
pub fn build_client(config: &ProbeConfig) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.read_timeout)
        .build()
}

/// GET `url`, require a 2xx status, and decode the body as JSON.
pub async fn get_json<T: DeserializeOwned>(client: &Client, url: Url) -> Result<T, FetchError> {
    let resp = client.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }
    let body = resp.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

/// GET `url`, require a 2xx status, and return the body as text.
pub async fn get_text(client: &Client, url: Url) -> Result<String, FetchError> {
    let resp = client.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }
    Ok(resp.text().await?)
}

pub fn parse_url(raw: &str) -> Result<Url, FetchError> {
    Url::parse(raw).map_err(|e| FetchError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}
