//! Error types for the intake bot.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration-related errors. All of these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Transport/notifier errors. The engine logs these and moves on.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// Record-store errors. The `Display` text of these is shown verbatim to the
/// user as the reason a save failed, so each variant carries enough detail
/// for an operator to diagnose permission/identifier problems.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(
        "Google API 404: Spreadsheet topilmadi yoki ruxsat yo'q. \
         SPREADSHEET_ID: {spreadsheet_id}. \
         Jadvalni quyidagi service account bilan baham ko'ring: {service_account}"
    )]
    SpreadsheetNotFound {
        spreadsheet_id: String,
        service_account: String,
    },

    #[error("SHEET_NAME noto'g'ri: ko'rsatilgan list mavjud emas va yaratib bo'lmadi.")]
    WorksheetUnavailable,

    #[error("Google autentifikatsiya xatosi: {0}")]
    Auth(String),

    #[error("Google API xatosi: {0}")]
    Api(String),
}

/// Result type alias for the intake bot.
pub type Result<T> = std::result::Result<T, Error>;
