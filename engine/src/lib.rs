//! # Record Engine
//!
//! Client-side synchronization for a single named, versioned JSON record.
//!
//! A [`RecordCore`] keeps a local copy of a record in step with the server:
//! it subscribes and reads, applies local writes optimistically, forwards
//! them with an increasing version, correlates write acknowledgments, falls
//! back to a local cache while offline and tears itself down after its last
//! consumer lets go.
//!
//! ## Design Principles
//!
//! - **Injected IO**: the engine talks to the world only through the
//!   [`Connection`] and [`RecordStorage`] traits
//! - **Single owner**: every operation takes `&mut self`; asynchronous results
//!   are applied through [`RecordCore::poll_completions`]
//! - **Never blocks**: callbacks and futures report results, nothing waits
//!
//! ## Core Concepts
//!
//! ### Record data
//!
//! [`RecordData`] holds the version and the JSON tree. Every local change
//! advances the version by exactly one. Paths address nested values:
//!
//! ```rust
//! use record_engine::{Mutation, RecordData};
//! use serde_json::json;
//!
//! let mut record = RecordData::default();
//! record.load(1, json!({"firstname": "wolfram"}));
//!
//! let version = record
//!     .apply(&Mutation::Patch {
//!         path: "pets[0].name".into(),
//!         data: json!("rex"),
//!     })
//!     .unwrap();
//!
//! assert_eq!(version, 2);
//! assert_eq!(record.snapshot_at("pets[0].name").unwrap(), Some(json!("rex")));
//! ```
//!
//! ### Writes
//!
//! [`SetRequest`] describes an update, patch or erase, optionally with an
//! acknowledgment callback. Acknowledged writes carry a correlation id and
//! resolve when the server answers, when the connection drops, or when the
//! record is torn down.
//!
//! ### Lifecycle
//!
//! [`RecordState`] tracks where a record is between creation and its
//! terminal `UNSUBSCRIBED` or `DELETED` state. [`RecordCore::acquire`] and
//! [`RecordCore::discard`] count consumers; the record unsubscribes once the
//! count stays at zero for [`RecordOptions::discard_timeout`].

pub mod config;
pub mod correlator;
pub mod error;
pub mod lifecycle;
pub mod message;
pub mod operation;
pub mod path;
pub mod ready;
pub mod record;
mod scheduler;
pub mod services;
mod timer;

// Re-export main types at crate root
pub use config::{ConfigError, RecordOptions};
pub use correlator::WriteCorrelator;
pub use error::{Error, Result};
pub use lifecycle::{CompletionCallback, RecordCore, RecordState};
pub use message::{Inbound, Message, RecordAction, Topic};
pub use operation::{Mutation, SetRequest, WriteCallback};
pub use path::PathStep;
pub use ready::{ReadyGate, ReadyWaiter};
pub use record::{RecordData, UNKNOWN_VERSION};
pub use services::{
    CachedRecord, Connection, RecordServices, RecordStorage, StorageCallback, StorageGetCallback,
};

/// Type aliases for clarity
pub type RecordName = String;
pub type Version = i64;
pub type CorrelationId = String;
