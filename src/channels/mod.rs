//! Message I/O abstractions the engine talks through.

pub mod telegram;

use async_trait::async_trait;

use crate::engine::event::{Menu, MessageRef};
use crate::error::ChannelError;
use crate::store::Record;

pub use telegram::{TelegramNotifier, TelegramTransport};

/// Outbound side of the chat platform.
///
/// The engine never retries a delivery failure; it logs and moves on.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a new text message, optionally with an attached menu.
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        menu: Option<Menu>,
    ) -> Result<(), ChannelError>;

    /// Replace the text (and menu) of a previously-sent message.
    async fn edit_text(
        &self,
        message: &MessageRef,
        text: &str,
        menu: Option<Menu>,
    ) -> Result<(), ChannelError>;
}

/// Outbound notification channel for committed records.
///
/// Called only after a successful store append. Failure is non-fatal: the
/// save is still reported as successful, with a caveat.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, record: &Record) -> Result<(), ChannelError>;
}
