//! Refresher — the periodic refresh loop behind the published store.
//!
//! One cycle runs the monitor fetch and the discovery → probe fan-out
//! side by side, reconciles the two, and publishes the merged set in a
//! single swap. A cycle that comes back with no monitors or no probe
//! results leaves the store untouched, so readers keep the last good set.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use roster_core::{ProbeRecord, RosterConfig};
use roster_state::InstanceStore;

use crate::client::build_client;
use crate::discovery::{TargetParser, fetch_document};
use crate::error::InitError;
use crate::monitor::fetch_monitors;
use crate::prober::{ProbeReport, Prober};
use crate::reconcile::reconcile;

/// Why a cycle did not publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    NoMonitors,
    NoProbes,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AbortReason::NoMonitors => "no monitors",
            AbortReason::NoProbes => "no probe results",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Published { version: u64, instances: usize },
    Aborted(AbortReason),
}

/// Summary of one refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Targets parsed from the discovery document.
    pub discovered: usize,
    /// Targets whose probe finished inside the per-target timeout.
    pub probed: usize,
    /// Targets dropped for exceeding the per-target timeout.
    pub timed_out: usize,
    /// Named monitors retrieved.
    pub monitors: usize,
    pub failed_pages: Vec<u64>,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    pub fn published(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Published { .. })
    }
}

#[derive(Debug, Default)]
struct MonitorOutcome {
    monitors: HashMap<String, Value>,
    failed_pages: Vec<u64>,
}

#[derive(Debug, Default)]
struct ProbeOutcome {
    discovered: usize,
    timed_out: usize,
    records: HashMap<String, ProbeRecord>,
}

/// Drives refresh cycles and publishes their results into an [`InstanceStore`].
pub struct Refresher {
    client: Client,
    prober: Arc<Prober>,
    parser: TargetParser,
    discovery_url: String,
    monitor_url: String,
    target_timeout: Duration,
    max_concurrent: usize,
    monitor_timeout: Duration,
    probe_timeout: Duration,
    interval: Duration,
    store: InstanceStore,
}

impl Refresher {
    pub fn new(config: &RosterConfig, store: InstanceStore) -> Result<Self, InitError> {
        let client = build_client(&config.probe)?;
        let parser = TargetParser::new(config.discovery.blocked_marker.as_str())?;

        Ok(Self {
            prober: Arc::new(Prober::new(client.clone(), config.probe.trending_field.as_str())),
            client,
            parser,
            discovery_url: config.discovery.url.clone(),
            monitor_url: config.monitor.url.clone(),
            target_timeout: config.probe.target_timeout,
            max_concurrent: config.probe.max_concurrent.max(1),
            monitor_timeout: config.refresh.monitor_timeout,
            probe_timeout: config.refresh.probe_timeout,
            interval: config.refresh.interval,
            store,
        })
    }

    /// The store this refresher publishes into.
    pub fn store(&self) -> &InstanceStore {
        &self.store
    }

    /// Run one full cycle and publish its result if it produced one.
    pub async fn run_cycle(&self) -> CycleReport {
        let (monitors, probes) = tokio::join!(self.collect_monitors(), self.collect_probes());

        let report = CycleReport {
            discovered: probes.discovered,
            probed: probes.records.len(),
            timed_out: probes.timed_out,
            monitors: monitors.monitors.len(),
            failed_pages: monitors.failed_pages,
            outcome: self.publish(monitors.monitors, probes.records),
        };
        if let CycleOutcome::Aborted(reason) = report.outcome {
            error!(%reason, "refresh cycle aborted, keeping previous instance set");
        }
        report
    }

    fn publish(
        &self,
        monitors: HashMap<String, Value>,
        probes: HashMap<String, ProbeRecord>,
    ) -> CycleOutcome {
        if monitors.is_empty() {
            return CycleOutcome::Aborted(AbortReason::NoMonitors);
        }
        if probes.is_empty() {
            return CycleOutcome::Aborted(AbortReason::NoProbes);
        }

        let merged = reconcile(monitors, probes);
        if merged.is_empty() {
            warn!("no discovered instance matched a monitor, publishing an empty set");
        }

        let instances = merged.len();
        let version = self.store.publish(merged);
        CycleOutcome::Published { version, instances }
    }

    /// Run cycles until shutdown: one immediately, then one per interval.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "refresher started");

        loop {
            tokio::select! {
                report = self.run_cycle() => {
                    info!(
                        discovered = report.discovered,
                        probed = report.probed,
                        timed_out = report.timed_out,
                        monitors = report.monitors,
                        failed_pages = report.failed_pages.len(),
                        published = report.published(),
                        "refresh cycle finished"
                    );
                }
                _ = shutdown.changed() => {
                    info!("refresher shutting down mid-cycle");
                    break;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {
                    info!("refresher shutting down");
                    break;
                }
            }
        }
    }

    async fn collect_monitors(&self) -> MonitorOutcome {
        let listing = match tokio::time::timeout(
            self.monitor_timeout,
            fetch_monitors(&self.client, &self.monitor_url),
        )
        .await
        {
            Ok(Ok(listing)) => listing,
            Ok(Err(e)) => {
                error!(url = %self.monitor_url, error = %e, "failed to fetch monitor listing");
                return MonitorOutcome::default();
            }
            Err(_) => {
                error!(
                    timeout_secs = self.monitor_timeout.as_secs(),
                    "monitor listing timed out"
                );
                return MonitorOutcome::default();
            }
        };

        MonitorOutcome {
            monitors: listing
                .monitors
                .into_iter()
                .map(|m| (m.name, m.payload))
                .collect(),
            failed_pages: listing.failed_pages,
        }
    }

    /// Discovery, fan-out and join all run under `probe_timeout`.
    async fn collect_probes(&self) -> ProbeOutcome {
        let mut tasks = JoinSet::new();
        let mut outcome = ProbeOutcome::default();

        let gathered = tokio::time::timeout(
            self.probe_timeout,
            self.discover_and_probe(&mut tasks, &mut outcome),
        )
        .await;

        if gathered.is_err() {
            error!(
                timeout_secs = self.probe_timeout.as_secs(),
                discovered = outcome.discovered,
                outstanding = tasks.len(),
                "discovery and probe fan-out timed out, discarding probe results"
            );
            tasks.abort_all();
            outcome.records.clear();
        }
        outcome
    }

    async fn discover_and_probe(
        &self,
        tasks: &mut JoinSet<Result<ProbeReport, String>>,
        outcome: &mut ProbeOutcome,
    ) {
        let document = fetch_document(&self.client, &self.discovery_url).await;
        let permits = Arc::new(Semaphore::new(self.max_concurrent));

        for target in self.parser.parse(&document) {
            outcome.discovered += 1;
            let prober = self.prober.clone();
            let permits = permits.clone();
            let limit = self.target_timeout;

            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return Err(target.host);
                };
                // Dropping the probe future on timeout cancels its in-flight request.
                let result = tokio::time::timeout(limit, prober.probe(&target)).await;
                result.map_err(|_| target.host)
            });
        }
        debug!(discovered = outcome.discovered, "probing discovered instances");

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(report)) => record_probe(outcome, report),
                Ok(Err(host)) => {
                    debug!(%host, "probe timed out, dropping for this cycle");
                    outcome.timed_out += 1;
                }
                Err(e) => warn!(error = %e, "probe task failed"),
            }
        }
    }
}

/// The single place where per-call probe failures are logged.
fn record_probe(outcome: &mut ProbeOutcome, report: ProbeReport) {
    for failure in &report.failures {
        debug!(
            host = %report.host,
            endpoint = %failure.endpoint,
            timeout = failure.error.is_timeout(),
            error = %failure.error,
            "probe call failed"
        );
    }
    outcome.records.insert(report.host, report.record);
}
