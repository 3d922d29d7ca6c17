//! Mutation announcements exchanged over the shared log.
//!
//! ```text
//! { "type": "set"|"update"|"delete", "app_id": "...", "key": "...",
//!   "value": { "app_id", "key", "value", "created_at" } }   // omitted on delete
//! ```
//!
//! Unknown fields are ignored so older nodes keep consuming what newer nodes
//! publish.

use crate::errors::{MalformedAnnouncement, ProtocolError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A stored key-value entry as the write path persisted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub app_id: String,
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

impl KeyValue {
    pub fn new(app_id: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        KeyValue {
            app_id: app_id.into(),
            key: key.into(),
            value: value.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Set,
    Update,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MutationKind::Set => "set",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        })
    }
}

/// One accepted mutation. `value` is `Some` exactly when `kind` is not
/// [`MutationKind::Delete`]; [`decode`] enforces this on the way in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub app_id: String,
    pub key: String,
    pub value: Option<KeyValue>,
    pub kind: MutationKind,
}

impl MutationRecord {
    pub fn set(value: KeyValue) -> Self {
        Self::with_value(MutationKind::Set, value)
    }

    pub fn update(value: KeyValue) -> Self {
        Self::with_value(MutationKind::Update, value)
    }

    pub fn delete(app_id: impl Into<String>, key: impl Into<String>) -> Self {
        MutationRecord {
            app_id: app_id.into(),
            key: key.into(),
            value: None,
            kind: MutationKind::Delete,
        }
    }

    fn with_value(kind: MutationKind, value: KeyValue) -> Self {
        MutationRecord {
            app_id: value.app_id.clone(),
            key: value.key.clone(),
            value: Some(value),
            kind,
        }
    }

    /// Partitioning key on the log: every mutation of one key shares it.
    pub fn log_key(&self) -> String {
        format!("{}/{}", self.app_id, self.key)
    }
}

/// Wire envelope of a [`MutationRecord`].
#[derive(Debug, Serialize, Deserialize)]
pub struct Announcement {
    #[serde(rename = "type")]
    pub kind: MutationKind,
    pub app_id: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<KeyValue>,
}

/// The JSON envelope for `record`. A delete never carries a value.
pub fn encode(record: &MutationRecord) -> Result<Bytes, ProtocolError> {
    let envelope = Announcement {
        kind: record.kind,
        app_id: record.app_id.clone(),
        key: record.key.clone(),
        value: match record.kind {
            MutationKind::Delete => None,
            _ => record.value.clone(),
        },
    };
    Ok(Bytes::from(serde_json::to_vec(&envelope)?))
}

pub fn decode(payload: &[u8]) -> Result<MutationRecord, MalformedAnnouncement> {
    let envelope: Announcement = serde_json::from_slice(payload)?;

    if envelope.app_id.is_empty() || envelope.key.is_empty() {
        return Err(MalformedAnnouncement::EmptyIdentity);
    }

    let value = match envelope.kind {
        MutationKind::Delete => None,
        kind => {
            let value = envelope.value.ok_or_else(|| MalformedAnnouncement::MissingValue {
                kind,
                app_id: envelope.app_id.clone(),
                key: envelope.key.clone(),
            })?;
            if value.app_id != envelope.app_id || value.key != envelope.key {
                return Err(MalformedAnnouncement::IdentityMismatch {
                    app_id: envelope.app_id,
                    key: envelope.key,
                    found_app_id: value.app_id,
                    found_key: value.key,
                });
            }
            Some(value)
        }
    };

    Ok(MutationRecord {
        app_id: envelope.app_id,
        key: envelope.key,
        value,
        kind: envelope.kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_omits_value_on_the_wire() {
        let bytes = encode(&MutationRecord::delete("x", "k1")).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["type"], "delete");
        assert_eq!(json["app_id"], "x");
        assert!(json.get("value").is_none());
    }

    #[test]
    fn set_carries_full_record() {
        let kv = KeyValue::new("x", "k1", "v1");
        let decoded = decode(&encode(&MutationRecord::set(kv.clone())).unwrap()).unwrap();
        assert_eq!(decoded.kind, MutationKind::Set);
        assert_eq!(decoded.value, Some(kv));
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let raw = br#"{"type":"update","app_id":"x","key":"k","origin":"node-a",
            "value":{"app_id":"x","key":"k","value":"v2","created_at":"2024-05-01T10:00:00Z","ttl":3}}"#;
        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.kind, MutationKind::Update);
        assert_eq!(decoded.value.unwrap().value, "v2");
    }

    #[test]
    fn set_without_value_is_malformed() {
        let err = decode(br#"{"type":"set","app_id":"x","key":"k"}"#).unwrap_err();
        assert!(matches!(err, MalformedAnnouncement::MissingValue { kind: MutationKind::Set, .. }));
    }

    #[test]
    fn missing_key_field_is_malformed() {
        let err = decode(br#"{"type":"delete","app_id":"x"}"#).unwrap_err();
        assert!(matches!(err, MalformedAnnouncement::Envelope(_)));
    }

    #[test]
    fn unknown_type_is_malformed() {
        assert!(decode(br#"{"type":"rename","app_id":"x","key":"k"}"#).is_err());
        assert!(decode(b"not json at all").is_err());
    }

    #[test]
    fn value_for_another_key_is_malformed() {
        let raw = br#"{"type":"set","app_id":"x","key":"k1",
            "value":{"app_id":"x","key":"k2","value":"v","created_at":"2024-05-01T10:00:00Z"}}"#;
        assert!(matches!(
            decode(raw).unwrap_err(),
            MalformedAnnouncement::IdentityMismatch { .. }
        ));
    }

    #[test]
    fn stray_value_on_delete_is_dropped() {
        let raw = br#"{"type":"delete","app_id":"x","key":"k1",
            "value":{"app_id":"x","key":"k1","value":"old","created_at":"2024-05-01T10:00:00Z"}}"#;
        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.kind, MutationKind::Delete);
        assert!(decoded.value.is_none());
    }
}
