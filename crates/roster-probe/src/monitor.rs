//! Monitor fetcher — pulls the paginated uptime monitor listing.
//!
//! Page 1 is fetched first because it carries the pagination totals.
//! Every remaining page is then requested concurrently, one task per
//! page. A failed page is logged and reported; pages that did arrive are
//! kept.

use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use roster_core::MonitorRecord;

use crate::client::{get_json, parse_url};
use crate::error::FetchError;

#[derive(Debug, Deserialize)]
struct ListingPage {
    psp: PageBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageBody {
    #[serde(default)]
    monitors: Vec<Value>,
    #[serde(default)]
    total_monitors: u64,
    #[serde(default)]
    per_page: u64,
}

/// Everything gathered from one pass over the listing.
#[derive(Debug, Default)]
pub struct MonitorListing {
    pub monitors: Vec<MonitorRecord>,
    /// Total number of pages the listing advertised.
    pub pages: u64,
    /// Pages (beyond the first) that could not be fetched.
    pub failed_pages: Vec<u64>,
}

/// Number of pages after the first, given the listing totals.
pub fn remaining_pages(total: u64, per_page: u64) -> u64 {
    if per_page == 0 {
        return 0;
    }
    total.div_ceil(per_page).saturating_sub(1)
}

/// Fetch every page of the listing at `url`. Fails only if page 1 fails.
pub async fn fetch_monitors(client: &Client, url: &str) -> Result<MonitorListing, FetchError> {
    let base = parse_url(url)?;
    let first: ListingPage = get_json(client, page_url(&base, 1)).await?;

    let extra = remaining_pages(first.psp.total_monitors, first.psp.per_page);
    debug!(
        total = first.psp.total_monitors,
        per_page = first.psp.per_page,
        extra_pages = extra,
        "monitor listing page 1 fetched"
    );

    let mut listing = MonitorListing {
        pages: extra + 1,
        ..Default::default()
    };
    collect(&mut listing, first.psp.monitors);

    let mut tasks = JoinSet::new();
    for page in 2..=extra + 1 {
        let client = client.clone();
        let url = page_url(&base, page);
        tasks.spawn(async move {
            let result = get_json::<ListingPage>(&client, url).await;
            (page, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(body))) => collect(&mut listing, body.psp.monitors),
            Ok((page, Err(e))) => {
                warn!(page, error = %e, "failed to fetch monitor page");
                listing.failed_pages.push(page);
            }
            Err(e) => warn!(error = %e, "monitor page task failed"),
        }
    }
    listing.failed_pages.sort_unstable();

    Ok(listing)
}

fn collect(listing: &mut MonitorListing, monitors: Vec<Value>) {
    for payload in monitors {
        match MonitorRecord::from_payload(payload) {
            Some(record) => listing.monitors.push(record),
            None => debug!("skipping monitor without a name"),
        }
    }
}

fn page_url(base: &Url, page: u64) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut().append_pair("page", &page.to_string());
    url
}
