//! Error types for the roster state crate.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SortError {
    #[error("unknown sort key: {0:?}")]
    UnknownKey(String),
}
