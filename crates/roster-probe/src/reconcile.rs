//! Reconciliation of probe records with monitor records.
//!
//! The monitor listing decides membership: a host is published only when
//! both a probe record and a monitor carry its name. Monitors with no
//! listed instance track hosts that are pending approval or already
//! removed from the list.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::debug;

use roster_core::{ProbeRecord, Record};

/// Join monitors (by name) with probe records (by host).
pub fn reconcile(
    monitors: HashMap<String, Value>,
    probes: HashMap<String, ProbeRecord>,
) -> BTreeMap<String, Record> {
    let mut sanctioned = monitors;
    let before = sanctioned.len();
    sanctioned.retain(|name, _| probes.contains_key(name));
    let unsanctioned = before - sanctioned.len();

    let probed = probes.len();
    let merged: BTreeMap<String, Record> = probes
        .into_iter()
        .filter_map(|(host, probe)| {
            let monitor = sanctioned.remove(&host)?;
            Some((host, Record::new(probe, monitor)))
        })
        .collect();

    debug!(
        merged = merged.len(),
        unsanctioned_monitors = unsanctioned,
        unmonitored_instances = probed - merged.len(),
        "reconciled probes with monitors"
    );
    merged
}
