//! Inbound event model and menu types.
//!
//! The transport turns raw platform updates into these types; the engine
//! never sees platform JSON.

use serde::{Deserialize, Serialize};

/// Who sent an event. `chat_id` is where replies go; `id` keys the session.
#[derive(Debug, Clone)]
pub struct UserRef {
    pub id: i64,
    /// Platform handle, if the user has one.
    pub handle: Option<String>,
    pub chat_id: i64,
}

/// Opaque handle to a previously-sent message, for in-place edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

/// The six named actions on the confirmation menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuAction {
    EditName,
    EditPhone,
    EditAddress,
    EditAll,
    Save,
    Cancel,
}

impl MenuAction {
    /// Wire form used as callback data.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EditName => "edit_name",
            Self::EditPhone => "edit_phone",
            Self::EditAddress => "edit_address",
            Self::EditAll => "edit_all",
            Self::Save => "save",
            Self::Cancel => "cancel",
        }
    }

    /// Parse callback data back into an action. Unknown data is ignored
    /// upstream, so this returns `None` rather than erroring.
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "edit_name" => Some(Self::EditName),
            "edit_phone" => Some(Self::EditPhone),
            "edit_address" => Some(Self::EditAddress),
            "edit_all" => Some(Self::EditAll),
            "save" => Some(Self::Save),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }
}

/// One labeled button.
#[derive(Debug, Clone)]
pub struct MenuButton {
    pub label: String,
    pub action: MenuAction,
}

impl MenuButton {
    pub fn new(label: &str, action: MenuAction) -> Self {
        Self {
            label: label.to_string(),
            action,
        }
    }
}

/// Rows of buttons attached to an outbound message.
pub type Menu = Vec<Vec<MenuButton>>;

/// What the user did.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// The start command — begins (or restarts) an intake.
    Start,
    /// The cancel command — discards any in-flight session.
    Cancel,
    /// Free text while an input is expected.
    Text(String),
    /// A button press on the confirmation menu. Carries the message the
    /// button lives on, so the reply can edit it in place.
    Button {
        action: MenuAction,
        message: MessageRef,
    },
}

/// A fully-addressed inbound event.
#[derive(Debug, Clone)]
pub struct IncomingEvent {
    pub user: UserRef,
    pub kind: Inbound,
}
