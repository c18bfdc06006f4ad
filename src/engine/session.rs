//! Per-user session state for the intake conversation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

/// Which draft field an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditField {
    Name,
    Phone,
    Address,
}

impl std::fmt::Display for EditField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Name => "name",
            Self::Phone => "phone",
            Self::Address => "address",
        };
        write!(f, "{s}")
    }
}

/// The conversation states. The terminal END state has no representation
/// here: a finished or cancelled session is simply dropped.
///
/// `EditInput` carries the field being re-entered, so "an edit marker exists
/// iff we are in the edit state" holds by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeState {
    AskName,
    AskPhone,
    AskAddress,
    Confirm,
    EditInput(EditField),
}

/// Record under construction. Fields fill in as the conversation advances.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl Draft {
    pub fn set(&mut self, field: EditField, value: String) {
        match field {
            EditField::Name => self.name = Some(value),
            EditField::Phone => self.phone = Some(value),
            EditField::Address => self.address = Some(value),
        }
    }
}

/// One user's in-flight intake. Ephemeral: lives only between start and
/// save/cancel, never persisted. A process restart loses in-flight sessions,
/// which is acceptable — the user restarts the flow.
#[derive(Debug, Clone)]
pub struct Session {
    pub state: IntakeState,
    pub draft: Draft,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: IntakeState::AskName,
            draft: Draft::default(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// A slot holding one user's session. `None` means no intake in flight.
pub type SessionSlot = Arc<Mutex<Option<Session>>>;

/// Keyed session store with per-user mutual exclusion.
///
/// The outer lock is held only long enough to clone out the per-user slot;
/// handlers then hold the slot's own lock for their full duration, so at most
/// one in-flight handler mutates a given user's session at a time. Handlers
/// for different users do not contend.
#[derive(Default)]
pub struct SessionTable {
    inner: Mutex<HashMap<i64, SessionSlot>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch (creating if needed) the slot for a user.
    pub async fn slot(&self, user_id: i64) -> SessionSlot {
        let mut table = self.inner.lock().await;
        table.entry(user_id).or_default().clone()
    }
}
