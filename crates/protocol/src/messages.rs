//! Collaboration wire messages
//!
//! Every frame is a `SyncMessage`: a small envelope (sender identity and
//! send timestamp) around a payload tagged by `type` with its content in
//! `data`. Field names on the wire are camelCase; type tags are
//! snake_case.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::presence::Presence;

/// Pointer position within the page canvas.
///
/// Ephemeral: overwritten by every update, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
    /// Element the pointer is over, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
}

/// Mutation of a single page element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditOp {
    pub element_id: String,
    pub operation: EditAction,
    /// Element payload for add/update; absent for delete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// What an edit does to its element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditAction {
    Add,
    Update,
    Delete,
}

/// The set of elements a participant has selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSet {
    pub element_ids: Vec<String>,
}

/// Reference to a single element, used by lock and unlock messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRef {
    pub element_id: String,
}

/// Presence heartbeat payload: the sender's own ephemeral state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceBeat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_elements: Option<Vec<String>>,
}

/// Full presence roster broadcast by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceList {
    #[serde(default)]
    pub presence: Vec<Presence>,
}

/// Diagnostic detail carried by the local `error` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub message: String,
}

/// Typed message payload, tagged by `type` with content in `data`.
///
/// `Connected` and `Error` are synthesized locally by the client and
/// never put on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Cursor(CursorPosition),
    Edit(EditOp),
    Selection(SelectionSet),
    Lock(ElementRef),
    Unlock(ElementRef),
    Presence(PresenceBeat),
    PresenceUpdate(PresenceList),
    UserLeft,
    Connected,
    Error(ErrorDetail),
}

impl Payload {
    /// Discriminant of this payload, for subscription routing.
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Cursor(_) => MessageKind::Cursor,
            Self::Edit(_) => MessageKind::Edit,
            Self::Selection(_) => MessageKind::Selection,
            Self::Lock(_) => MessageKind::Lock,
            Self::Unlock(_) => MessageKind::Unlock,
            Self::Presence(_) => MessageKind::Presence,
            Self::PresenceUpdate(_) => MessageKind::PresenceUpdate,
            Self::UserLeft => MessageKind::UserLeft,
            Self::Connected => MessageKind::Connected,
            Self::Error(_) => MessageKind::Error,
        }
    }
}

/// Message kinds a subscriber can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Cursor,
    Edit,
    Selection,
    Lock,
    Unlock,
    Presence,
    PresenceUpdate,
    UserLeft,
    Connected,
    Error,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cursor => "cursor",
            Self::Edit => "edit",
            Self::Selection => "selection",
            Self::Lock => "lock",
            Self::Unlock => "unlock",
            Self::Presence => "presence",
            Self::PresenceUpdate => "presence_update",
            Self::UserLeft => "user_left",
            Self::Connected => "connected",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Envelope for one wire frame.
///
/// The `type` tag (inside `payload`) is always present; every other
/// field is optional. Sender identity and timestamp are stamped by the
/// sending client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    #[serde(flatten)]
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Send time in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl SyncMessage {
    /// Build a local synthetic event (no identity, no timestamp).
    pub const fn local(payload: Payload) -> Self {
        Self {
            payload,
            project_id: None,
            user_id: None,
            user_name: None,
            timestamp: None,
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_frame_shape() {
        let message = SyncMessage {
            payload: Payload::Lock(ElementRef {
                element_id: "hero-1".to_string(),
            }),
            project_id: Some("p1".to_string()),
            user_id: Some("u1".to_string()),
            user_name: Some("Ada".to_string()),
            timestamp: Some(1_700_000_000_000),
        };

        let json: serde_json::Value = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "lock");
        assert_eq!(json["data"]["elementId"], "hero-1");
        assert_eq!(json["projectId"], "p1");
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["userName"], "Ada");
        assert_eq!(json["timestamp"], 1_700_000_000_000u64);
    }

    #[test]
    fn presence_update_decodes_roster() {
        let raw = r#"{
            "type": "presence_update",
            "data": {
                "presence": [
                    {"userId": "u2", "userName": "Grace", "cursor": {"x": 10.0, "y": 20.0}},
                    {"userId": "u3", "userName": "Alan", "activeElements": ["gallery-4"]}
                ]
            },
            "timestamp": 1700000000000
        }"#;

        let message: SyncMessage = serde_json::from_str(raw).unwrap();
        let Payload::PresenceUpdate(list) = &message.payload else {
            panic!("expected presence_update");
        };
        assert_eq!(list.presence.len(), 2);
        assert_eq!(list.presence[0].user_id, "u2");
        assert_eq!(list.presence[0].cursor.as_ref().unwrap().x, 10.0);
        assert_eq!(
            list.presence[1].active_elements.as_deref(),
            Some(&["gallery-4".to_string()][..])
        );
    }

    #[test]
    fn user_left_has_no_data_key() {
        let message = SyncMessage {
            payload: Payload::UserLeft,
            project_id: None,
            user_id: Some("u2".to_string()),
            user_name: None,
            timestamp: Some(1),
        };
        let json: serde_json::Value = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "user_left");
        assert!(json.get("data").is_none());

        // And the other direction, as the server sends it.
        let decoded: SyncMessage =
            serde_json::from_str(r#"{"type": "user_left", "userId": "u2"}"#).unwrap();
        assert_eq!(decoded.payload, Payload::UserLeft);
        assert_eq!(decoded.user_id.as_deref(), Some("u2"));
    }

    #[test]
    fn edit_action_tags_are_snake_case() {
        let op = EditOp {
            element_id: "pricing-2".to_string(),
            operation: EditAction::Update,
            data: Some(serde_json::json!({"title": "Pro"})),
        };
        let json = serde_json::to_string(&Payload::Edit(op)).unwrap();
        assert!(json.contains(r#""type":"edit""#));
        assert!(json.contains(r#""operation":"update""#));
        assert!(json.contains(r#""elementId":"pricing-2""#));
    }

    #[test]
    fn unknown_type_tag_is_an_error() {
        let result = serde_json::from_str::<SyncMessage>(r#"{"type": "comment_added"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn kind_matches_tag_spelling() {
        assert_eq!(MessageKind::PresenceUpdate.to_string(), "presence_update");
        assert_eq!(MessageKind::UserLeft.to_string(), "user_left");
        assert_eq!(
            Payload::Connected.kind().to_string(),
            "connected"
        );
    }
}
