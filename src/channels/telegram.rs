//! Telegram transport — long-polls the Bot API for updates.
//!
//! Turns raw updates (text messages and callback-query button presses) into
//! engine events, and exposes sendMessage/editMessageText with optional
//! inline keyboards. Also hosts the channel notifier.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;

use crate::channels::{Notifier, Transport};
use crate::engine::event::{Inbound, IncomingEvent, Menu, MenuAction, MessageRef, UserRef};
use crate::engine::prompts;
use crate::error::ChannelError;
use crate::store::Record;

/// Long-poll timeout passed to getUpdates, seconds.
const POLL_TIMEOUT_SECS: u32 = 30;

/// Back-off after a failed poll.
const POLL_RETRY_SECS: u64 = 5;

/// Stream of inbound events produced by the long-poll loop.
pub type EventStream = Pin<Box<dyn Stream<Item = IncomingEvent> + Send>>;

/// Telegram Bot API client implementing the engine's [`Transport`] seam.
#[derive(Clone)]
pub struct TelegramTransport {
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramTransport {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    /// Verify the bot token against getMe. Startup aborts on failure.
    pub async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    /// Start the long-poll loop and return the resulting event stream.
    pub fn start(&self) -> EventStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = self.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram transport polling for updates...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match transport
                    .client
                    .post(transport.api_url("getUpdates"))
                    .json(&body)
                    .send()
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(POLL_RETRY_SECS)).await;
                        continue;
                    }
                };

                let data: serde_json::Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(POLL_RETRY_SECS)).await;
                        continue;
                    }
                };

                if let Some(updates) = data.get("result").and_then(serde_json::Value::as_array) {
                    for update in updates {
                        if let Some(uid) =
                            update.get("update_id").and_then(serde_json::Value::as_i64)
                        {
                            offset = uid + 1;
                        }

                        // Callback queries must be answered or the client
                        // shows a spinner forever.
                        if let Some(cb_id) = update
                            .pointer("/callback_query/id")
                            .and_then(serde_json::Value::as_str)
                        {
                            transport.answer_callback(cb_id).await;
                        }

                        let Some(event) = parse_update(update) else {
                            continue;
                        };

                        if tx.send(event).is_err() {
                            tracing::info!("Telegram event stream closed");
                            return;
                        }
                    }
                }
            }
        });

        let stream =
            futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|e| (e, rx)) });
        Box::pin(stream)
    }

    async fn answer_callback(&self, callback_id: &str) {
        let result = self
            .client
            .post(self.api_url("answerCallbackQuery"))
            .json(&serde_json::json!({ "callback_query_id": callback_id }))
            .send()
            .await;
        if let Err(e) = result {
            tracing::debug!("answerCallbackQuery failed: {e}");
        }
    }

    async fn post(&self, method: &str, body: serde_json::Value) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("{method} failed ({status}): {detail}"),
            })
        }
    }

    /// Send to an arbitrary chat — numeric id or `@channelname`.
    async fn send_to_chat(
        &self,
        chat_id: &serde_json::Value,
        text: &str,
        menu: Option<Menu>,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(menu) = menu {
            body["reply_markup"] = keyboard_json(&menu);
        }
        self.post("sendMessage", body).await
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        menu: Option<Menu>,
    ) -> Result<(), ChannelError> {
        self.send_to_chat(&serde_json::json!(chat_id), text, menu)
            .await
    }

    async fn edit_text(
        &self,
        message: &MessageRef,
        text: &str,
        menu: Option<Menu>,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({
            "chat_id": message.chat_id,
            "message_id": message.message_id,
            "text": text,
        });
        if let Some(menu) = menu {
            body["reply_markup"] = keyboard_json(&menu);
        }
        self.post("editMessageText", body).await
    }
}

/// Posts the "new record" notification to a fixed channel.
pub struct TelegramNotifier {
    transport: Arc<TelegramTransport>,
    channel_id: String,
}

impl TelegramNotifier {
    pub fn new(transport: Arc<TelegramTransport>, channel_id: String) -> Self {
        Self {
            transport,
            channel_id,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, record: &Record) -> Result<(), ChannelError> {
        self.transport
            .send_to_chat(
                &serde_json::json!(self.channel_id),
                &prompts::channel_notification(record),
                None,
            )
            .await
    }
}

// ── Update parsing ──────────────────────────────────────────────────

/// Convert one getUpdates entry into an engine event. Updates we don't
/// understand (no text, unknown callback data, missing sender) yield `None`.
fn parse_update(update: &serde_json::Value) -> Option<IncomingEvent> {
    if let Some(message) = update.get("message") {
        let text = message.get("text")?.as_str()?;
        let user = user_ref(message.get("from")?, message.pointer("/chat/id")?.as_i64()?)?;

        let kind = match command(text) {
            Some("start") => Inbound::Start,
            Some("cancel") => Inbound::Cancel,
            Some(_) => return None,
            None => Inbound::Text(text.to_string()),
        };
        return Some(IncomingEvent { user, kind });
    }

    if let Some(query) = update.get("callback_query") {
        let action = MenuAction::parse(query.get("data")?.as_str()?)?;
        let chat_id = query.pointer("/message/chat/id")?.as_i64()?;
        let message_id = query.pointer("/message/message_id")?.as_i64()?;
        let user = user_ref(query.get("from")?, chat_id)?;

        return Some(IncomingEvent {
            user,
            kind: Inbound::Button {
                action,
                message: MessageRef {
                    chat_id,
                    message_id,
                },
            },
        });
    }

    None
}

fn user_ref(from: &serde_json::Value, chat_id: i64) -> Option<UserRef> {
    Some(UserRef {
        id: from.get("id")?.as_i64()?,
        handle: from
            .get("username")
            .and_then(|u| u.as_str())
            .map(String::from),
        chat_id,
    })
}

/// Extract a bot command name from message text: `/start`, `/start args`,
/// and the `/start@BotName` addressing form all yield `start`.
fn command(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    let name = first.strip_prefix('/')?;
    Some(name.split('@').next().unwrap_or(name))
}

/// Render a menu as a Telegram inline keyboard.
fn keyboard_json(menu: &Menu) -> serde_json::Value {
    let rows: Vec<Vec<serde_json::Value>> = menu
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| {
                    serde_json::json!({
                        "text": button.label,
                        "callback_data": button.action.as_str(),
                    })
                })
                .collect()
        })
        .collect();
    serde_json::json!({ "inline_keyboard": rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_update(text: &str) -> serde_json::Value {
        serde_json::json!({
            "update_id": 1,
            "message": {
                "message_id": 10,
                "from": { "id": 42, "username": "otabek" },
                "chat": { "id": 42 },
                "text": text,
            }
        })
    }

    fn callback_update(data: &str) -> serde_json::Value {
        serde_json::json!({
            "update_id": 2,
            "callback_query": {
                "id": "cb-1",
                "from": { "id": 42, "username": "otabek" },
                "data": data,
                "message": {
                    "message_id": 77,
                    "chat": { "id": 42 },
                }
            }
        })
    }

    #[test]
    fn api_url_embeds_token_and_method() {
        let transport = TelegramTransport::new("123:ABC".into());
        assert_eq!(
            transport.api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
    }

    // ── parse_update: messages ──────────────────────────────────────

    #[test]
    fn plain_text_becomes_text_event() {
        let event = parse_update(&text_update("Otabek Qodirov")).unwrap();
        assert_eq!(event.user.id, 42);
        assert_eq!(event.user.handle.as_deref(), Some("otabek"));
        assert!(matches!(event.kind, Inbound::Text(ref t) if t == "Otabek Qodirov"));
    }

    #[test]
    fn start_command_variants() {
        for text in ["/start", "/start ref123", "/start@IntakeBot"] {
            let event = parse_update(&text_update(text)).unwrap();
            assert!(matches!(event.kind, Inbound::Start), "{text}");
        }
    }

    #[test]
    fn cancel_command() {
        let event = parse_update(&text_update("/cancel")).unwrap();
        assert!(matches!(event.kind, Inbound::Cancel));
    }

    #[test]
    fn unknown_command_is_dropped() {
        assert!(parse_update(&text_update("/help")).is_none());
    }

    #[test]
    fn message_without_text_is_dropped() {
        let update = serde_json::json!({
            "update_id": 3,
            "message": {
                "message_id": 11,
                "from": { "id": 42 },
                "chat": { "id": 42 },
                "photo": [],
            }
        });
        assert!(parse_update(&update).is_none());
    }

    #[test]
    fn message_without_username_has_no_handle() {
        let update = serde_json::json!({
            "update_id": 4,
            "message": {
                "message_id": 12,
                "from": { "id": 42 },
                "chat": { "id": 42 },
                "text": "salom",
            }
        });
        let event = parse_update(&update).unwrap();
        assert_eq!(event.user.handle, None);
    }

    // ── parse_update: callbacks ─────────────────────────────────────

    #[test]
    fn callback_becomes_button_event_with_message_ref() {
        let event = parse_update(&callback_update("edit_phone")).unwrap();
        match event.kind {
            Inbound::Button { action, message } => {
                assert_eq!(action, MenuAction::EditPhone);
                assert_eq!(
                    message,
                    MessageRef {
                        chat_id: 42,
                        message_id: 77
                    }
                );
            }
            other => panic!("expected button event, got {other:?}"),
        }
    }

    #[test]
    fn unknown_callback_data_is_dropped() {
        assert!(parse_update(&callback_update("definitely_not_an_action")).is_none());
    }

    #[test]
    fn empty_update_is_dropped() {
        assert!(parse_update(&serde_json::json!({ "update_id": 5 })).is_none());
    }

    // ── Keyboard rendering ──────────────────────────────────────────

    #[test]
    fn keyboard_json_matches_menu_layout() {
        let menu = prompts::summary_menu();
        let keyboard = keyboard_json(&menu);
        let rows = keyboard["inline_keyboard"].as_array().unwrap();

        assert_eq!(rows.len(), 5);
        assert_eq!(rows[4].as_array().unwrap().len(), 2);
        assert_eq!(rows[0][0]["callback_data"], "edit_name");
        assert_eq!(rows[4][0]["callback_data"], "save");
        assert_eq!(rows[4][1]["callback_data"], "cancel");
    }

    // ── Command parsing ─────────────────────────────────────────────

    #[test]
    fn command_extraction() {
        assert_eq!(command("/start"), Some("start"));
        assert_eq!(command("/start deep-link"), Some("start"));
        assert_eq!(command("/cancel@IntakeBot"), Some("cancel"));
        assert_eq!(command("hello"), None);
        assert_eq!(command(""), None);
    }
}
