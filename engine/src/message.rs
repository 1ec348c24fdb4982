//! Record message protocol definitions.
//!
//! Messages are flat envelopes: a topic, an action and the action-dependent
//! fields. Field names are camelCase on the wire and absent fields are omitted.

use crate::{CorrelationId, RecordName, Version};
use serde::{Deserialize, Serialize};

/// Message topic. Only records are handled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Topic {
    Record,
}

/// Record actions, spelled as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordAction {
    #[serde(rename = "SUBSCRIBECREATEANDREAD")]
    SubscribeCreateAndRead,
    #[serde(rename = "READ_RESPONSE")]
    ReadResponse,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "UPDATE_WITH_WRITE_ACK")]
    UpdateWithWriteAck,
    #[serde(rename = "PATCH")]
    Patch,
    #[serde(rename = "PATCH_WITH_WRITE_ACK")]
    PatchWithWriteAck,
    #[serde(rename = "ERASE")]
    Erase,
    #[serde(rename = "ERASE_WITH_WRITE_ACK")]
    EraseWithWriteAck,
    #[serde(rename = "WRITE_ACKNOWLEDGEMENT")]
    WriteAcknowledgement,
    #[serde(rename = "UNSUBSCRIBE")]
    Unsubscribe,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "DELETE_SUCCESS")]
    DeleteSuccess,
    #[serde(rename = "DELETED")]
    Deleted,
    /// Any action this client does not know about.
    #[serde(other)]
    Unknown,
}

impl RecordAction {
    /// The acknowledged variant of a write action.
    pub fn with_write_ack(self) -> Self {
        match self {
            RecordAction::Update => RecordAction::UpdateWithWriteAck,
            RecordAction::Patch => RecordAction::PatchWithWriteAck,
            RecordAction::Erase => RecordAction::EraseWithWriteAck,
            other => other,
        }
    }
}

/// A record message envelope, inbound or outbound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub topic: Topic,
    pub action: RecordAction,
    pub name: RecordName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    /// Error reason carried by a failed write acknowledgment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Message {
    /// A bare envelope for `action` on record `name`.
    pub fn new(action: RecordAction, name: impl Into<RecordName>) -> Self {
        Self {
            topic: Topic::Record,
            action,
            name: name.into(),
            path: None,
            parsed_data: None,
            version: None,
            correlation_id: None,
            reason: None,
        }
    }

    pub fn subscribe_create_and_read(name: impl Into<RecordName>) -> Self {
        Self::new(RecordAction::SubscribeCreateAndRead, name)
    }

    pub fn unsubscribe(name: impl Into<RecordName>) -> Self {
        Self::new(RecordAction::Unsubscribe, name)
    }

    pub fn delete(name: impl Into<RecordName>) -> Self {
        Self::new(RecordAction::Delete, name)
    }

    pub fn read_response(
        name: impl Into<RecordName>,
        version: Version,
        data: serde_json::Value,
    ) -> Self {
        Self::new(RecordAction::ReadResponse, name)
            .with_version(version)
            .with_data(data)
    }

    /// A write acknowledgment; `reason` is set for rejected writes.
    pub fn write_ack(
        name: impl Into<RecordName>,
        correlation_id: impl Into<CorrelationId>,
        reason: Option<String>,
    ) -> Self {
        let mut message = Self::new(RecordAction::WriteAcknowledgement, name)
            .with_correlation_id(correlation_id);
        message.reason = reason;
        message
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.parsed_data = Some(data);
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<CorrelationId>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// An inbound message decoded into the shape its action requires.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    ReadResponse {
        version: Version,
        data: serde_json::Value,
    },
    WriteAck {
        correlation_id: CorrelationId,
        /// `Err(reason)` when the server rejected the write
        outcome: std::result::Result<(), String>,
    },
    RemoteUpdate {
        version: Version,
        data: serde_json::Value,
    },
    RemotePatch {
        version: Version,
        path: String,
        data: serde_json::Value,
    },
    RemoteErase {
        version: Version,
        path: String,
    },
    DeleteSuccess,
    Deleted,
    /// An action this record does not process, or one missing required fields.
    Ignored {
        action: RecordAction,
        reason: &'static str,
    },
}

impl From<Message> for Inbound {
    fn from(message: Message) -> Self {
        let action = message.action;
        let missing = |reason| Inbound::Ignored { action, reason };

        match action {
            RecordAction::ReadResponse => match (message.version, message.parsed_data) {
                (Some(version), Some(data)) => Inbound::ReadResponse { version, data },
                _ => missing("read response without version or data"),
            },
            RecordAction::WriteAcknowledgement => match message.correlation_id {
                Some(correlation_id) => Inbound::WriteAck {
                    correlation_id,
                    outcome: message.reason.map_or(Ok(()), Err),
                },
                None => missing("write acknowledgement without correlation id"),
            },
            RecordAction::Update | RecordAction::UpdateWithWriteAck => {
                match (message.version, message.parsed_data) {
                    (Some(version), Some(data)) => Inbound::RemoteUpdate { version, data },
                    _ => missing("update without version or data"),
                }
            }
            RecordAction::Patch | RecordAction::PatchWithWriteAck => {
                match (message.version, message.path, message.parsed_data) {
                    (Some(version), Some(path), Some(data)) => {
                        Inbound::RemotePatch {
                            version,
                            path,
                            data,
                        }
                    }
                    _ => missing("patch without version, path or data"),
                }
            }
            RecordAction::Erase | RecordAction::EraseWithWriteAck => {
                match (message.version, message.path) {
                    (Some(version), Some(path)) => Inbound::RemoteErase { version, path },
                    _ => missing("erase without version or path"),
                }
            }
            RecordAction::DeleteSuccess => Inbound::DeleteSuccess,
            RecordAction::Deleted => Inbound::Deleted,
            RecordAction::SubscribeCreateAndRead
            | RecordAction::Unsubscribe
            | RecordAction::Delete
            | RecordAction::Unknown => missing("not an inbound record action"),
        }
    }
}
