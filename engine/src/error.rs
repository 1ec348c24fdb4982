//! Error types for the record engine.

use crate::{RecordName, Version};
use std::time::Duration;
use thiserror::Error;

/// All possible errors surfaced by a record.
///
/// Write-path errors are never returned from [`RecordCore::set`](crate::RecordCore::set);
/// they reach the caller through the write callback it supplied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Connectivity errors
    #[error("client is offline, write to record {name} was stored locally only")]
    ClientOffline { name: RecordName },

    #[error("no read response for record {name} within {timeout:?}")]
    ReadTimeout { name: RecordName, timeout: Duration },

    // Server errors
    #[error("write to record {name} rejected: {reason}")]
    Remote { name: RecordName, reason: String },

    // Mutation errors
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("version {version} cannot be incremented")]
    VersionExhausted { version: Version },

    // Cache errors
    #[error("local storage error: {0}")]
    Storage(String),

    // Lifecycle errors
    #[error("record {name} was deleted")]
    Deleted { name: RecordName },

    #[error("record {name} was destroyed before the request completed")]
    Destroyed { name: RecordName },
}

impl Error {
    /// Build an [`Error::InvalidPath`].
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for record operations.
pub type Result<T> = std::result::Result<T, Error>;
