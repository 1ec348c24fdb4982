//! Collaborators a record talks to: the realtime connection and the local cache.
//!
//! Both are injected by the owner of the record and shared by every record
//! the client has open.

use crate::error::Result;
use crate::message::Message;
use crate::record::UNKNOWN_VERSION;
use crate::{RecordName, Version};
use std::fmt;
use std::sync::Arc;

/// The realtime connection as seen by a record.
pub trait Connection: Send + Sync {
    /// Whether messages can currently be sent. Polled at decision points.
    fn is_connected(&self) -> bool;

    /// Hand a message to the transport.
    fn send_message(&self, message: Message);
}

/// A cache lookup result. A miss has version `-1` and no data.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRecord {
    pub name: RecordName,
    pub version: Version,
    pub data: Option<serde_json::Value>,
}

impl CachedRecord {
    pub fn hit(name: impl Into<RecordName>, version: Version, data: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            version,
            data: Some(data),
        }
    }

    pub fn miss(name: impl Into<RecordName>) -> Self {
        Self {
            name: name.into(),
            version: UNKNOWN_VERSION,
            data: None,
        }
    }

    pub fn is_miss(&self) -> bool {
        self.version == UNKNOWN_VERSION || self.data.is_none()
    }
}

/// Callback for [`RecordStorage::get`].
pub type StorageGetCallback = Box<dyn FnOnce(CachedRecord) + Send + 'static>;

/// Callback for [`RecordStorage::set`] and [`RecordStorage::delete`].
pub type StorageCallback = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// The local persistent cache, keyed by record name.
///
/// Callbacks may run synchronously or later on any thread.
pub trait RecordStorage: Send + Sync {
    fn get(&self, name: &str, callback: StorageGetCallback);

    /// Persist `data` at `version`. A following `get` must observe it.
    fn set(&self, name: &str, version: Version, data: &serde_json::Value, callback: StorageCallback);

    fn delete(&self, name: &str, callback: StorageCallback);
}

/// The services a record is constructed with.
#[derive(Clone)]
pub struct RecordServices {
    pub connection: Arc<dyn Connection>,
    pub storage: Arc<dyn RecordStorage>,
}

impl RecordServices {
    pub fn new(connection: Arc<dyn Connection>, storage: Arc<dyn RecordStorage>) -> Self {
        Self {
            connection,
            storage,
        }
    }
}

impl fmt::Debug for RecordServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordServices")
            .field("connected", &self.connection.is_connected())
            .finish_non_exhaustive()
    }
}
