//! Write requests.
//!
//! Every local change to a record is one of three mutations: a full update,
//! a patch of a single path, or the erase of a single path. A request may ask
//! for a write acknowledgment by carrying a callback.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Callback invoked exactly once with the outcome of an acknowledged write.
pub type WriteCallback = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// A single change to a record's data tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Mutation {
    /// Replace the whole tree.
    Update { data: serde_json::Value },
    /// Set the value at `path`.
    Patch {
        path: String,
        data: serde_json::Value,
    },
    /// Remove the value at `path`.
    Erase { path: String },
}

impl Mutation {
    /// The path this mutation targets, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Mutation::Update { .. } => None,
            Mutation::Patch { path, .. } | Mutation::Erase { path } => Some(path),
        }
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::Update { .. } => "update",
            Mutation::Patch { .. } => "patch",
            Mutation::Erase { .. } => "erase",
        }
    }
}

/// A request passed to [`RecordCore::set`](crate::RecordCore::set).
pub struct SetRequest {
    pub mutation: Mutation,
    pub callback: Option<WriteCallback>,
}

impl SetRequest {
    /// Replace the record's content.
    pub fn update(data: serde_json::Value) -> Self {
        Self::from_mutation(Mutation::Update { data })
    }

    /// Set the value at `path`.
    pub fn patch(path: impl Into<String>, data: serde_json::Value) -> Self {
        Self::from_mutation(Mutation::Patch {
            path: path.into(),
            data,
        })
    }

    /// Remove the value at `path`.
    pub fn erase(path: impl Into<String>) -> Self {
        Self::from_mutation(Mutation::Erase { path: path.into() })
    }

    /// Request a write acknowledgment delivered to `callback`.
    pub fn with_ack<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    fn from_mutation(mutation: Mutation) -> Self {
        Self {
            mutation,
            callback: None,
        }
    }
}

impl fmt::Debug for SetRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetRequest")
            .field("mutation", &self.mutation)
            .field("ack", &self.callback.is_some())
            .finish()
    }
}
