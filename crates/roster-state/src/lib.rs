//! roster-state — the published instance store.
//!
//! Holds the result of the most recent successful refresh cycle as an
//! immutable [`Snapshot`]. The refresher replaces the whole snapshot at
//! once; readers clone an `Arc` to the current one and never observe a
//! partially written map.
//!
//! # Architecture
//!
//! ```text
//! InstanceStore (Clone, Send + Sync)
//!   └── RwLock<Arc<Snapshot>>
//!         ├── publish()  ← single writer, pointer swap
//!         └── snapshot() → Arc<Snapshot> for any number of readers
//!
//! SortSpec::parse("type,users-reverse")
//!   └── Snapshot::sorted() → Vec<(&host, &Record)>
//! ```

pub mod error;
pub mod sort;
pub mod store;

pub use error::SortError;
pub use sort::{SortKey, SortSpec};
pub use store::{InstanceStore, Snapshot};
