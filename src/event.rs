//! Trigger payloads.
//!
//! The upload trigger accepts two JSON shapes:
//!
//! - an object-created event carrying the object's fields directly:
//!   `{"eventKind": "object-created", "container": "...", "path": "...", ...}`
//! - an audit-log entry that only names the object through a resource name,
//!   either at `protoPayload.resourceName` or at the top level:
//!   `projects/_/buckets/<bucket>/objects/<url-encoded path>`
//!
//! Either shape may arrive wrapped in a `{"data": ...}` envelope. Resolution
//! yields the [`ObjectRef`] to process; the payload's own metadata is never
//! trusted, the processor re-reads it from the store.

use crate::storage::{Generation, ObjectRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// The only event kind the upload trigger acts on.
pub const OBJECT_CREATED: &str = "object-created";

#[derive(Error, Debug)]
pub enum EventError {
    #[error("invalid trigger payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("trigger payload has no resolvable {0}")]
    MissingField(&'static str),
    #[error("unsupported event kind `{0}`")]
    UnsupportedKind(String),
}

/// Object-created event as delivered by the storage platform.
///
/// Every field is optional on the wire; [`ObjectCreatedEvent::target`]
/// decides whether enough is present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObjectCreatedEvent {
    pub event_kind: Option<String>,
    pub container: Option<String>,
    pub path: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<i64>,
    pub generation: Option<Generation>,
    pub custom_tags: BTreeMap<String, String>,
}

impl ObjectCreatedEvent {
    pub fn target(&self) -> Result<ObjectRef, EventError> {
        match self.event_kind.as_deref() {
            None | Some(OBJECT_CREATED) => {}
            Some(other) => return Err(EventError::UnsupportedKind(other.to_string())),
        }
        let container =
            non_empty(self.container.as_deref()).ok_or(EventError::MissingField("container"))?;
        let path = non_empty(self.path.as_deref()).ok_or(EventError::MissingField("path"))?;
        Ok(ObjectRef::new(container, path))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Bucket and object parsed from an audit-log resource name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceName {
    pub bucket: Option<String>,
    pub object: Option<String>,
}

/// Parse `projects/_/buckets/<bucket>/objects/<url-encoded path>`.
///
/// Every segment after `objects` belongs to the object path, so unencoded
/// slashes survive. The path is percent-decoded; text that does not decode
/// to UTF-8 is kept as-is.
pub fn parse_resource_name(resource_name: &str) -> ResourceName {
    let parts: Vec<&str> = resource_name.trim_matches('/').split('/').collect();
    let Some(b) = parts.iter().position(|p| *p == "buckets") else {
        return ResourceName::default();
    };
    let Some(bucket) = parts.get(b + 1) else {
        return ResourceName::default();
    };

    let object = parts[b + 2..]
        .iter()
        .position(|p| *p == "objects")
        .map(|o| b + 2 + o)
        .filter(|o| o + 1 < parts.len())
        .map(|o| {
            let encoded = parts[o + 1..].join("/");
            match urlencoding::decode(&encoded) {
                Ok(decoded) => decoded.into_owned(),
                Err(_) => encoded,
            }
        });

    ResourceName {
        bucket: Some(bucket.to_string()),
        object,
    }
}

/// A parsed trigger payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    ObjectCreated(ObjectCreatedEvent),
    AuditLog { resource_name: String },
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct ProtoPayload {
    resource_name: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct Envelope {
    data: Option<Box<Envelope>>,
    proto_payload: Option<ProtoPayload>,
    resource_name: Option<String>,
    #[serde(flatten)]
    event: ObjectCreatedEvent,
}

impl Trigger {
    /// Parse a JSON trigger payload.
    ///
    /// An audit-log resource name takes precedence; otherwise the payload is
    /// read as an object-created event.
    pub fn from_json(json: &str) -> Result<Self, EventError> {
        let mut envelope: Envelope = serde_json::from_str(json)?;
        while let Some(inner) = envelope.data.take() {
            envelope = *inner;
        }
        let resource_name = envelope
            .proto_payload
            .and_then(|p| p.resource_name)
            .or(envelope.resource_name)
            .filter(|r| !r.is_empty());
        Ok(match resource_name {
            Some(resource_name) => Trigger::AuditLog { resource_name },
            None => Trigger::ObjectCreated(envelope.event),
        })
    }

    /// The object this trigger refers to.
    pub fn target(&self) -> Result<ObjectRef, EventError> {
        match self {
            Trigger::ObjectCreated(event) => event.target(),
            Trigger::AuditLog { resource_name } => {
                let parsed = parse_resource_name(resource_name);
                let bucket = non_empty(parsed.bucket.as_deref())
                    .ok_or(EventError::MissingField("container"))?;
                let object =
                    non_empty(parsed.object.as_deref()).ok_or(EventError::MissingField("path"))?;
                Ok(ObjectRef::new(bucket, object))
            }
        }
    }
}
