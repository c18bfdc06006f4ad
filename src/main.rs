use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;

use intake_bot::channels::{TelegramNotifier, TelegramTransport};
use intake_bot::config::Config;
use intake_bot::engine::IntakeEngine;
use intake_bot::store::SheetsStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env().context(
        "set BOT_TOKEN, SPREADSHEET_ID, GOOGLE_PRIVATE_KEY and GOOGLE_CLIENT_EMAIL",
    )?;

    tracing::info!(
        spreadsheet_id = %config.spreadsheet_id,
        sheet = config.sheet_name.as_deref().unwrap_or("(first sheet)"),
        channel = %config.channel_id,
        "starting intake bot"
    );

    let transport = Arc::new(TelegramTransport::new(config.bot_token.clone()));
    transport
        .health_check()
        .await
        .context("Telegram bot token rejected")?;

    let store = Arc::new(SheetsStore::new(&config));
    let notifier = Arc::new(TelegramNotifier::new(
        Arc::clone(&transport),
        config.channel_id.clone(),
    ));

    let engine = Arc::new(IntakeEngine::new(transport.clone(), store, notifier));

    // One handler task per update; per-user session locks keep concurrent
    // events for the same user serialized.
    let mut events = transport.start();
    while let Some(event) = events.next().await {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine.handle_event(event).await;
        });
    }

    Ok(())
}
