//! Version counter and data store for a single record.

use crate::error::{Error, Result};
use crate::operation::Mutation;
use crate::{path, Version};
use serde::{Deserialize, Serialize};

/// Version of a record whose content has not been loaded yet.
pub const UNKNOWN_VERSION: Version = -1;

/// The current version and data tree of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordData {
    /// Version number, incremented on each local mutation
    pub version: Version,
    /// The record content (JSON value)
    pub data: serde_json::Value,
}

impl RecordData {
    /// State before any source has loaded the record.
    pub fn unloaded() -> Self {
        Self {
            version: UNKNOWN_VERSION,
            data: serde_json::Value::Null,
        }
    }

    /// Check whether a version and tree have been loaded.
    pub fn is_loaded(&self) -> bool {
        self.version != UNKNOWN_VERSION
    }

    /// Replace version and data with an authoritative copy.
    pub fn load(&mut self, version: Version, data: serde_json::Value) {
        self.version = version;
        self.data = data;
    }

    /// Apply a local mutation and return the new version.
    ///
    /// The version advances by exactly one whatever the mutation shape,
    /// including an erase of a path that does not exist. Nothing changes if
    /// the version cannot advance any further.
    pub fn apply(&mut self, mutation: &Mutation) -> Result<Version> {
        let next = self
            .version
            .checked_add(1)
            .ok_or(Error::VersionExhausted {
                version: self.version,
            })?;
        self.mutate(mutation)?;
        self.version = next;
        Ok(next)
    }

    /// Apply a mutation that already carries its version (a remote change).
    pub fn apply_at(&mut self, mutation: &Mutation, version: Version) -> Result<()> {
        self.mutate(mutation)?;
        self.version = version;
        Ok(())
    }

    /// An owned copy of the whole tree.
    pub fn snapshot(&self) -> serde_json::Value {
        self.data.clone()
    }

    /// An owned copy of the value at `path`.
    pub fn snapshot_at(&self, at: &str) -> Result<Option<serde_json::Value>> {
        Ok(path::get(&self.data, at)?.cloned())
    }

    fn mutate(&mut self, mutation: &Mutation) -> Result<()> {
        match mutation {
            Mutation::Update { data } => {
                self.data = data.clone();
                Ok(())
            }
            Mutation::Patch { path: at, data } => path::set(&mut self.data, at, data.clone()),
            Mutation::Erase { path: at } => path::erase(&mut self.data, at),
        }
    }
}

impl Default for RecordData {
    fn default() -> Self {
        Self::unloaded()
    }
}
