//! The intake state machine: dispatch, per-state handlers, save protocol.
//!
//! One handler invocation owns one user's session for its full duration (see
//! [`SessionTable`]); within a handler the flow is validate → mutate → emit.
//! Validation order is significant: the script gate always runs before
//! format/length checks, so out-of-script input reports the script error even
//! when it would also fail the format check.

use std::sync::Arc;

use chrono::Local;
use tracing::{debug, warn};

use crate::channels::{Notifier, Transport};
use crate::engine::event::{Inbound, IncomingEvent, Menu, MenuAction, MessageRef, UserRef};
use crate::engine::prompts;
use crate::engine::session::{EditField, IntakeState, Session, SessionTable};
use crate::store::{Record, RecordStore};
use crate::validators::{is_allowed_script, is_canonical_phone, normalize_phone};

/// Minimum address length, in characters.
const MIN_ADDRESS_LEN: usize = 5;

/// Drives intake conversations for all users.
pub struct IntakeEngine {
    sessions: SessionTable,
    transport: Arc<dyn Transport>,
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn Notifier>,
}

impl IntakeEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            sessions: SessionTable::new(),
            transport,
            store,
            notifier,
        }
    }

    /// Handle one inbound event end to end.
    pub async fn handle_event(&self, event: IncomingEvent) {
        let slot = self.sessions.slot(event.user.id).await;
        let mut session = slot.lock().await;

        match event.kind {
            Inbound::Start => {
                *session = Some(Session::new());
                self.send(&event.user, &prompts::welcome(), None).await;
            }
            Inbound::Cancel => {
                *session = None;
                self.send(&event.user, prompts::CANCELLED, None).await;
            }
            Inbound::Text(text) => {
                self.on_text(&event.user, &mut session, text.trim()).await;
            }
            Inbound::Button { action, message } => {
                self.on_button(&event.user, &mut session, action, &message)
                    .await;
            }
        }
    }

    // ── Free-text dispatch ──────────────────────────────────────────

    async fn on_text(&self, user: &UserRef, session: &mut Option<Session>, text: &str) {
        let Some(active) = session.as_mut() else {
            self.send(user, prompts::NO_SESSION_HINT, None).await;
            return;
        };

        match active.state {
            IntakeState::AskName => self.on_name(user, active, text).await,
            IntakeState::AskPhone => self.on_phone(user, active, text).await,
            IntakeState::AskAddress => self.on_address(user, active, text).await,
            IntakeState::EditInput(field) => self.on_edit_input(user, active, field, text).await,
            IntakeState::Confirm => {
                // Only the menu acts in the confirm state.
                debug!(user_id = user.id, "ignoring free text in confirm state");
            }
        }
    }

    async fn on_name(&self, user: &UserRef, session: &mut Session, name: &str) {
        if !is_allowed_script(name) {
            self.send(user, &prompts::script_error(), None).await;
            return;
        }
        if name.is_empty() {
            self.send(user, prompts::NAME_EMPTY, None).await;
            return;
        }

        session.draft.name = Some(name.to_string());
        session.state = IntakeState::AskPhone;
        self.send(user, prompts::ASK_PHONE, None).await;
    }

    async fn on_phone(&self, user: &UserRef, session: &mut Session, raw: &str) {
        let phone = normalize_phone(raw);
        if !is_allowed_script(&phone) {
            self.send(user, &prompts::script_error(), None).await;
            return;
        }
        if !is_canonical_phone(&phone) {
            self.send(user, prompts::PHONE_FORMAT_ERROR, None).await;
            return;
        }

        session.draft.phone = Some(phone);
        session.state = IntakeState::AskAddress;
        self.send(user, prompts::ASK_ADDRESS, None).await;
    }

    async fn on_address(&self, user: &UserRef, session: &mut Session, address: &str) {
        if !is_allowed_script(address) {
            self.send(user, &prompts::script_error(), None).await;
            return;
        }
        if address.chars().count() < MIN_ADDRESS_LEN {
            self.send(user, prompts::ADDRESS_TOO_SHORT, None).await;
            return;
        }

        session.draft.address = Some(address.to_string());
        session.state = IntakeState::Confirm;
        self.send(
            user,
            &prompts::summary(&session.draft),
            Some(prompts::summary_menu()),
        )
        .await;
    }

    async fn on_edit_input(
        &self,
        user: &UserRef,
        session: &mut Session,
        field: EditField,
        text: &str,
    ) {
        if !is_allowed_script(text) {
            self.send(user, &prompts::script_error(), None).await;
            return;
        }

        let value = if field == EditField::Phone {
            let phone = normalize_phone(text);
            if !is_canonical_phone(&phone) {
                self.send(user, prompts::PHONE_FORMAT_ERROR, None).await;
                return;
            }
            phone
        } else {
            text.to_string()
        };

        session.draft.set(field, value);
        session.state = IntakeState::Confirm;
        self.send(
            user,
            &prompts::summary(&session.draft),
            Some(prompts::summary_menu()),
        )
        .await;
    }

    // ── Confirmation menu ───────────────────────────────────────────

    async fn on_button(
        &self,
        user: &UserRef,
        session: &mut Option<Session>,
        action: MenuAction,
        message: &MessageRef,
    ) {
        // Stale buttons (session already finished, or not yet at confirm)
        // do nothing. This also makes a double-tapped save press a no-op:
        // the first press clears the session before the second one runs.
        let at_confirm = matches!(
            session.as_ref().map(|s| s.state),
            Some(IntakeState::Confirm)
        );
        if !at_confirm {
            debug!(user_id = user.id, ?action, "ignoring button outside confirm state");
            return;
        }

        match action {
            MenuAction::EditName => {
                self.begin_edit(session, EditField::Name);
                self.edit(message, prompts::EDIT_NAME, None).await;
            }
            MenuAction::EditPhone => {
                self.begin_edit(session, EditField::Phone);
                self.edit(message, prompts::EDIT_PHONE, None).await;
            }
            MenuAction::EditAddress => {
                self.begin_edit(session, EditField::Address);
                self.edit(message, prompts::EDIT_ADDRESS, None).await;
            }
            MenuAction::EditAll => {
                *session = Some(Session::new());
                self.edit(message, prompts::ASK_NAME, None).await;
            }
            MenuAction::Save => {
                self.on_save(user, session, message).await;
            }
            MenuAction::Cancel => {
                *session = None;
                self.edit(message, prompts::CANCELLED, None).await;
            }
        }
    }

    fn begin_edit(&self, session: &mut Option<Session>, field: EditField) {
        if let Some(active) = session.as_mut() {
            active.state = IntakeState::EditInput(field);
        }
    }

    /// The commit protocol: build the record, append exactly once, then
    /// notify. A store failure is surfaced verbatim and ends the session; a
    /// notifier failure only downgrades the success message.
    async fn on_save(
        &self,
        user: &UserRef,
        session: &mut Option<Session>,
        message: &MessageRef,
    ) {
        let draft = match session.as_ref() {
            Some(active) => active.draft.clone(),
            None => return,
        };

        let record = Record {
            name: draft.name.unwrap_or_default(),
            phone: draft.phone.unwrap_or_default(),
            address: draft.address.unwrap_or_default(),
            submitter_handle: user.handle.clone().unwrap_or_default(),
            submitter_id: user.id,
            submitted_at: Local::now(),
        };

        match self.store.append(&record).await {
            Ok(()) => match self.notifier.notify(&record).await {
                Ok(()) => {
                    self.edit(message, prompts::SAVED_AND_NOTIFIED, None).await;
                }
                Err(err) => {
                    warn!(user_id = user.id, %err, "channel notification failed");
                    self.edit(message, prompts::SAVED_NOTIFY_FAILED, None).await;
                }
            },
            Err(err) => {
                warn!(user_id = user.id, %err, "store append failed");
                self.edit(message, &prompts::save_failed(&err.to_string()), None)
                    .await;
            }
        }

        // Committed or not, the session is over; a retry means a fresh start.
        *session = None;
    }

    // ── Delivery (never retried) ────────────────────────────────────

    async fn send(&self, user: &UserRef, text: &str, menu: Option<Menu>) {
        if let Err(err) = self.transport.send_text(user.chat_id, text, menu).await {
            warn!(user_id = user.id, %err, "failed to deliver message");
        }
    }

    async fn edit(&self, message: &MessageRef, text: &str, menu: Option<Menu>) {
        if let Err(err) = self.transport.edit_text(message, text, menu).await {
            warn!(chat_id = message.chat_id, %err, "failed to edit message");
        }
    }

    /// Snapshot of a user's session, if one is in flight.
    pub async fn session_snapshot(&self, user_id: i64) -> Option<Session> {
        self.sessions.slot(user_id).await.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::engine::session::Draft;
    use crate::error::{ChannelError, StoreError};

    // ── Mock collaborators ──────────────────────────────────────────

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Sent {
        New { chat_id: i64, text: String, has_menu: bool },
        Edited { message_id: i64, text: String },
    }

    #[derive(Default)]
    struct RecordingTransport {
        log: Mutex<Vec<Sent>>,
    }

    impl RecordingTransport {
        fn last(&self) -> Sent {
            self.log.lock().unwrap().last().cloned().expect("no messages sent")
        }

        fn last_text(&self) -> String {
            match self.last() {
                Sent::New { text, .. } | Sent::Edited { text, .. } => text,
            }
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_text(
            &self,
            chat_id: i64,
            text: &str,
            menu: Option<Menu>,
        ) -> Result<(), ChannelError> {
            self.log.lock().unwrap().push(Sent::New {
                chat_id,
                text: text.to_string(),
                has_menu: menu.is_some(),
            });
            Ok(())
        }

        async fn edit_text(
            &self,
            message: &MessageRef,
            text: &str,
            _menu: Option<Menu>,
        ) -> Result<(), ChannelError> {
            self.log.lock().unwrap().push(Sent::Edited {
                message_id: message.message_id,
                text: text.to_string(),
            });
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockStore {
        appended: Mutex<Vec<Record>>,
        fail: bool,
    }

    #[async_trait]
    impl RecordStore for MockStore {
        async fn append(&self, record: &Record) -> Result<(), StoreError> {
            self.appended.lock().unwrap().push(record.clone());
            if self.fail {
                Err(StoreError::Api("quota exceeded (mock)".into()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct MockNotifier {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn notify(&self, _record: &Record) -> Result<(), ChannelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ChannelError::SendFailed {
                    name: "mock".into(),
                    reason: "down".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    // ── Harness ─────────────────────────────────────────────────────

    struct Harness {
        engine: IntakeEngine,
        transport: Arc<RecordingTransport>,
        store: Arc<MockStore>,
        notifier: Arc<MockNotifier>,
    }

    const USER_ID: i64 = 42;

    fn harness() -> Harness {
        harness_with(false, false)
    }

    fn harness_with(store_fails: bool, notifier_fails: bool) -> Harness {
        let transport = Arc::new(RecordingTransport::default());
        let store = Arc::new(MockStore {
            fail: store_fails,
            ..Default::default()
        });
        let notifier = Arc::new(MockNotifier {
            fail: notifier_fails,
            ..Default::default()
        });
        let engine = IntakeEngine::new(transport.clone(), store.clone(), notifier.clone());
        Harness {
            engine,
            transport,
            store,
            notifier,
        }
    }

    fn user() -> UserRef {
        UserRef {
            id: USER_ID,
            handle: Some("otabek".into()),
            chat_id: USER_ID,
        }
    }

    fn message_ref() -> MessageRef {
        MessageRef {
            chat_id: USER_ID,
            message_id: 1001,
        }
    }

    impl Harness {
        async fn event(&self, kind: Inbound) {
            self.engine
                .handle_event(IncomingEvent { user: user(), kind })
                .await;
        }

        async fn text(&self, text: &str) {
            self.event(Inbound::Text(text.to_string())).await;
        }

        async fn button(&self, action: MenuAction) {
            self.event(Inbound::Button {
                action,
                message: message_ref(),
            })
            .await;
        }

        async fn state(&self) -> Option<IntakeState> {
            self.engine
                .session_snapshot(USER_ID)
                .await
                .map(|s| s.state)
        }

        async fn draft(&self) -> Draft {
            self.engine
                .session_snapshot(USER_ID)
                .await
                .expect("no session")
                .draft
        }

        /// Drive start → name → phone → address, landing in confirm.
        async fn fill_to_confirm(&self) {
            self.event(Inbound::Start).await;
            self.text("Otabek Qodirov").await;
            self.text("+998 94 999 99 99").await;
            self.text("Namangan viloyati, Uychi tumani").await;
        }
    }

    // ── Happy path ──────────────────────────────────────────────────

    #[tokio::test]
    async fn start_creates_session_and_prompts_for_name() {
        let h = harness();
        h.event(Inbound::Start).await;

        assert_eq!(h.state().await, Some(IntakeState::AskName));
        assert!(h.transport.last_text().contains("FIO yozing"));
    }

    #[tokio::test]
    async fn full_flow_reaches_confirm_with_exact_draft() {
        let h = harness();
        h.fill_to_confirm().await;

        assert_eq!(h.state().await, Some(IntakeState::Confirm));
        assert_eq!(
            h.draft().await,
            Draft {
                name: Some("Otabek Qodirov".into()),
                phone: Some("+998 94 999 99 99".into()),
                address: Some("Namangan viloyati, Uychi tumani".into()),
            }
        );

        // Summary carries a menu and shows the draft.
        match h.transport.last() {
            Sent::New { text, has_menu, .. } => {
                assert!(has_menu);
                assert!(text.contains("Otabek Qodirov"));
                assert!(text.contains("+998 94 999 99 99"));
            }
            other => panic!("expected summary message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn phone_is_stored_normalized() {
        let h = harness();
        h.event(Inbound::Start).await;
        h.text("Otabek Qodirov").await;
        h.text("998939999999").await;

        assert_eq!(h.state().await, Some(IntakeState::AskAddress));
        assert_eq!(h.draft().await.phone.as_deref(), Some("+998 93 999 99 99"));
    }

    // ── Validation failures re-prompt in place ──────────────────────

    #[tokio::test]
    async fn cyrillic_name_reprompts_with_script_error() {
        let h = harness();
        h.event(Inbound::Start).await;
        h.text("Отабек").await;

        assert_eq!(h.state().await, Some(IntakeState::AskName));
        assert!(h.transport.last_text().contains("lotin yozuvida"));
    }

    #[tokio::test]
    async fn empty_name_reprompts() {
        let h = harness();
        h.event(Inbound::Start).await;
        h.text("   ").await;

        assert_eq!(h.state().await, Some(IntakeState::AskName));
        assert_eq!(h.transport.last_text(), prompts::NAME_EMPTY);
    }

    #[tokio::test]
    async fn malformed_phone_reprompts_naming_the_pattern() {
        let h = harness();
        h.event(Inbound::Start).await;
        h.text("Otabek Qodirov").await;
        h.text("12345").await;

        assert_eq!(h.state().await, Some(IntakeState::AskPhone));
        assert!(h.transport.last_text().contains("+998 94 999 99 99"));
        assert!(h.draft().await.phone.is_none());
    }

    #[tokio::test]
    async fn cyrillic_phone_reports_script_error_not_format_error() {
        let h = harness();
        h.event(Inbound::Start).await;
        h.text("Otabek Qodirov").await;
        // Fails both checks; the script gate must win.
        h.text("телефон").await;

        assert!(h.transport.last_text().contains("lotin yozuvida"));
        assert_eq!(h.state().await, Some(IntakeState::AskPhone));
    }

    #[tokio::test]
    async fn short_address_reprompts() {
        let h = harness();
        h.event(Inbound::Start).await;
        h.text("Otabek Qodirov").await;
        h.text("+998 94 999 99 99").await;
        h.text("abc").await;

        assert_eq!(h.state().await, Some(IntakeState::AskAddress));
        assert_eq!(h.transport.last_text(), prompts::ADDRESS_TOO_SHORT);
    }

    // ── Edit protocol ───────────────────────────────────────────────

    #[tokio::test]
    async fn edit_phone_roundtrip_keeps_other_fields() {
        let h = harness();
        h.fill_to_confirm().await;

        h.button(MenuAction::EditPhone).await;
        assert_eq!(
            h.state().await,
            Some(IntakeState::EditInput(EditField::Phone))
        );

        h.text("998939999999").await;
        assert_eq!(h.state().await, Some(IntakeState::Confirm));
        assert_eq!(
            h.draft().await,
            Draft {
                name: Some("Otabek Qodirov".into()),
                phone: Some("+998 93 999 99 99".into()),
                address: Some("Namangan viloyati, Uychi tumani".into()),
            }
        );
    }

    #[tokio::test]
    async fn edit_phone_rejects_malformed_and_stays_in_edit() {
        let h = harness();
        h.fill_to_confirm().await;
        h.button(MenuAction::EditPhone).await;
        h.text("12").await;

        assert_eq!(
            h.state().await,
            Some(IntakeState::EditInput(EditField::Phone))
        );
        assert_eq!(h.draft().await.phone.as_deref(), Some("+998 94 999 99 99"));
    }

    #[tokio::test]
    async fn edit_name_updates_and_returns_to_confirm() {
        let h = harness();
        h.fill_to_confirm().await;
        h.button(MenuAction::EditName).await;
        h.text("Akmal Karimov").await;

        assert_eq!(h.state().await, Some(IntakeState::Confirm));
        assert_eq!(h.draft().await.name.as_deref(), Some("Akmal Karimov"));
    }

    #[tokio::test]
    async fn edit_all_restarts_with_empty_draft() {
        let h = harness();
        h.fill_to_confirm().await;
        h.button(MenuAction::EditAll).await;

        assert_eq!(h.state().await, Some(IntakeState::AskName));
        assert_eq!(h.draft().await, Draft::default());
    }

    // ── Save protocol ───────────────────────────────────────────────

    #[tokio::test]
    async fn save_appends_once_notifies_and_ends_session() {
        let h = harness();
        h.fill_to_confirm().await;
        h.button(MenuAction::Save).await;

        let appended = h.store.appended.lock().unwrap().clone();
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].name, "Otabek Qodirov");
        assert_eq!(appended[0].phone, "+998 94 999 99 99");
        assert_eq!(appended[0].submitter_handle, "otabek");
        assert_eq!(appended[0].submitter_id, USER_ID);

        assert_eq!(h.notifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.transport.last_text(), prompts::SAVED_AND_NOTIFIED);
        assert!(h.state().await.is_none());
    }

    #[tokio::test]
    async fn save_failure_surfaces_detail_and_discards_session() {
        let h = harness_with(true, false);
        h.fill_to_confirm().await;
        h.button(MenuAction::Save).await;

        assert!(h.transport.last_text().contains("quota exceeded (mock)"));
        assert_eq!(h.notifier.calls.load(Ordering::SeqCst), 0);
        assert!(h.state().await.is_none());

        // A second save press hits a dead session: no second append.
        h.button(MenuAction::Save).await;
        assert_eq!(h.store.appended.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn notifier_failure_still_reports_saved_with_caveat() {
        let h = harness_with(false, true);
        h.fill_to_confirm().await;
        h.button(MenuAction::Save).await;

        assert_eq!(h.store.appended.lock().unwrap().len(), 1);
        assert_eq!(h.transport.last_text(), prompts::SAVED_NOTIFY_FAILED);
        assert!(h.state().await.is_none());
    }

    // ── Cancel paths ────────────────────────────────────────────────

    #[tokio::test]
    async fn cancel_command_clears_session_from_any_state() {
        let h = harness();
        h.event(Inbound::Start).await;
        h.text("Otabek Qodirov").await;
        h.event(Inbound::Cancel).await;

        assert!(h.state().await.is_none());
        assert_eq!(h.transport.last_text(), prompts::CANCELLED);
    }

    #[tokio::test]
    async fn restart_after_cancel_has_no_leaked_draft() {
        let h = harness();
        h.fill_to_confirm().await;
        h.event(Inbound::Cancel).await;
        h.event(Inbound::Start).await;

        assert_eq!(h.state().await, Some(IntakeState::AskName));
        assert_eq!(h.draft().await, Draft::default());
    }

    #[tokio::test]
    async fn cancel_button_clears_session() {
        let h = harness();
        h.fill_to_confirm().await;
        h.button(MenuAction::Cancel).await;

        assert!(h.state().await.is_none());
        assert_eq!(h.transport.last_text(), prompts::CANCELLED);
    }

    // ── Out-of-band input ───────────────────────────────────────────

    #[tokio::test]
    async fn text_without_session_hints_at_start() {
        let h = harness();
        h.text("salom").await;

        assert!(h.state().await.is_none());
        assert_eq!(h.transport.last_text(), prompts::NO_SESSION_HINT);
    }

    #[tokio::test]
    async fn stale_button_is_ignored() {
        let h = harness();
        h.button(MenuAction::Save).await;

        assert!(h.store.appended.lock().unwrap().is_empty());
        assert!(h.transport.log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn button_before_confirm_is_ignored() {
        let h = harness();
        h.event(Inbound::Start).await;
        h.button(MenuAction::Save).await;

        assert!(h.store.appended.lock().unwrap().is_empty());
        assert_eq!(h.state().await, Some(IntakeState::AskName));
    }

    #[tokio::test]
    async fn free_text_in_confirm_is_ignored() {
        let h = harness();
        h.fill_to_confirm().await;
        let sends_before = h.transport.log.lock().unwrap().len();

        h.text("hello there").await;

        assert_eq!(h.state().await, Some(IntakeState::Confirm));
        assert_eq!(h.transport.log.lock().unwrap().len(), sends_before);
    }

    #[tokio::test]
    async fn restart_mid_flow_resets_the_draft() {
        let h = harness();
        h.event(Inbound::Start).await;
        h.text("Otabek Qodirov").await;
        h.event(Inbound::Start).await;

        assert_eq!(h.state().await, Some(IntakeState::AskName));
        assert_eq!(h.draft().await, Draft::default());
    }
}
