//! Events exchanged with subscribed clients.
//!
//! Each event travels as the JSON payload of one frame:
//! `{"event": "<name>", "data": {...}}`. Control events flow client -> node
//! in `FrameType::Control` frames, notifications flow node -> client in
//! `FrameType::Push` frames. Neither direction is acknowledged.

use crate::announcement::{KeyValue, MutationKind, MutationRecord};
use crate::frame::{Frame, FrameType};
use crate::ProtocolError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    SubscribeKey { app_id: String, key: String },
    UnsubscribeKey { app_id: String, key: String },
    SubscribeApp { app_id: String },
    UnsubscribeApp { app_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    KeySet(KeyValue),
    KeyUpdated(KeyValue),
    KeyDeleted { app_id: String, key: String },
}

impl ServerEvent {
    /// The push a subscriber sees for `record`. `None` when a set/update
    /// carries no value, which [`crate::announcement::decode`] never yields.
    pub fn from_mutation(record: &MutationRecord) -> Option<ServerEvent> {
        match record.kind {
            MutationKind::Set => record.value.clone().map(ServerEvent::KeySet),
            MutationKind::Update => record.value.clone().map(ServerEvent::KeyUpdated),
            MutationKind::Delete => Some(ServerEvent::KeyDeleted {
                app_id: record.app_id.clone(),
                key: record.key.clone(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::KeySet(_) => "key_set",
            ServerEvent::KeyUpdated(_) => "key_updated",
            ServerEvent::KeyDeleted { .. } => "key_deleted",
        }
    }

    pub fn app_id(&self) -> &str {
        match self {
            ServerEvent::KeySet(kv) | ServerEvent::KeyUpdated(kv) => &kv.app_id,
            ServerEvent::KeyDeleted { app_id, .. } => app_id,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            ServerEvent::KeySet(kv) | ServerEvent::KeyUpdated(kv) => &kv.key,
            ServerEvent::KeyDeleted { key, .. } => key,
        }
    }

    pub fn to_frame(&self) -> Result<Frame, ProtocolError> {
        Ok(Frame::new(FrameType::Push, 0, serde_json::to_vec(self)?))
    }

    pub fn from_frame(frame: &Frame) -> Result<ServerEvent, ProtocolError> {
        expect_type(frame, FrameType::Push)?;
        Ok(serde_json::from_slice(&frame.payload)?)
    }
}

impl ClientEvent {
    pub fn to_frame(&self) -> Result<Frame, ProtocolError> {
        Ok(Frame::new(FrameType::Control, 0, serde_json::to_vec(self)?))
    }

    pub fn from_frame(frame: &Frame) -> Result<ClientEvent, ProtocolError> {
        expect_type(frame, FrameType::Control)?;
        Ok(serde_json::from_slice(&frame.payload)?)
    }
}

fn expect_type(frame: &Frame, expected: FrameType) -> Result<(), ProtocolError> {
    if frame.frame_type != expected {
        return Err(ProtocolError::UnexpectedFrameType(frame.frame_type));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_deleted_carries_only_identity() {
        let event = ServerEvent::from_mutation(&MutationRecord::delete("x", "k1")).unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, json!({"event": "key_deleted", "data": {"app_id": "x", "key": "k1"}}));
    }

    #[test]
    fn key_updated_carries_full_record() {
        let kv = KeyValue::new("x", "k1", "v2");
        let event = ServerEvent::from_mutation(&MutationRecord::update(kv.clone())).unwrap();
        assert_eq!(event.name(), "key_updated");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "key_updated");
        assert_eq!(json["data"]["value"], "v2");
        assert!(json["data"]["created_at"].is_string());
    }

    #[test]
    fn control_events_parse_from_client_json() {
        let raw = br#"{"event":"subscribe_key","data":{"app_id":"x","key":"k1"}}"#;
        let event: ClientEvent = serde_json::from_slice(raw).unwrap();
        assert_eq!(
            event,
            ClientEvent::SubscribeKey {
                app_id: "x".into(),
                key: "k1".into()
            }
        );

        let raw = br#"{"event":"unsubscribe_app","data":{"app_id":"x"}}"#;
        let event: ClientEvent = serde_json::from_slice(raw).unwrap();
        assert_eq!(event, ClientEvent::UnsubscribeApp { app_id: "x".into() });
    }

    #[test]
    fn push_frame_is_not_a_control_frame() {
        let frame = ServerEvent::KeyDeleted {
            app_id: "x".into(),
            key: "k".into(),
        }
        .to_frame()
        .unwrap();
        assert!(matches!(
            ClientEvent::from_frame(&frame),
            Err(ProtocolError::UnexpectedFrameType(FrameType::Push))
        ));
    }
}
