//! roster-probe — the refresh pipeline.
//!
//! Discovers instances from a published list, probes each one, pulls the
//! third-party uptime monitor listing, joins the two by host, and
//! publishes the merged set into a [`roster_state::InstanceStore`].
//!
//! # Architecture
//!
//! ```text
//! Refresher::run()  (every refresh.interval)
//!   └── run_cycle()
//!       ├── fetch_monitors()          page 1, then one task per page   ┐ joined,
//!       ├── fetch_document()                                           │ each under
//!       │   └── TargetParser::parse() → RawTarget*                     │ its own
//!       │       └── Prober::probe()   one task per target, 30s cap     ┘ deadline
//!       ├── reconcile()               monitors ∩ probes
//!       └── InstanceStore::publish()  only when both sides produced data
//! ```
//!
//! # Failure handling
//!
//! A failed call degrades a single field; a slow target is dropped for
//! the cycle; a missing source aborts the cycle and leaves the previous
//! snapshot published. Nothing here stops the loop.

pub mod client;
pub mod discovery;
pub mod error;
pub mod monitor;
pub mod prober;
pub mod reconcile;
pub mod refresher;

pub use error::{FetchError, InitError};
pub use monitor::{MonitorListing, fetch_monitors};
pub use prober::{Endpoint, ProbeFailure, ProbeReport, Prober};
pub use reconcile::reconcile;
pub use refresher::{AbortReason, CycleOutcome, CycleReport, Refresher};
