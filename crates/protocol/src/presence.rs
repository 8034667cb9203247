//! Presence records for connected collaborators

use serde::{Deserialize, Serialize};

use crate::messages::CursorPosition;

/// A live collaborator as reported by the server.
///
/// Transient: created and replaced wholesale by `presence_update`
/// messages, never merged incrementally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    /// Stable identity, unique per connected session.
    pub user_id: String,
    /// Display label; not guaranteed unique.
    #[serde(default)]
    pub user_name: String,
    /// Last known pointer position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
    /// Elements this user currently has focused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_elements: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_optional_fields_default() {
        let presence: Presence = serde_json::from_str(r#"{"userId": "u9"}"#).unwrap();
        assert_eq!(presence.user_id, "u9");
        assert_eq!(presence.user_name, "");
        assert!(presence.cursor.is_none());
        assert!(presence.active_elements.is_none());
    }
}
