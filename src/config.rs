//! Environment-based configuration.
//!
//! All values come from the process environment. Required values missing at
//! startup abort the process with a `ConfigError`.

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default channel that receives the "new record saved" notification.
const DEFAULT_CHANNEL_ID: &str = "@topicnowbot";

/// Service-account credentials for the Sheets API.
#[derive(Debug, Clone)]
pub struct ServiceAccountConfig {
    /// PEM private key. May arrive with literal `\n` escapes; un-escaped here.
    pub private_key: SecretString,
    pub client_email: String,
    pub project_id: String,
}

/// Full bot configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    /// Spreadsheet id, already normalized from a raw id or a pasted URL.
    pub spreadsheet_id: String,
    /// Optional named worksheet. `None` means the first sheet.
    pub sheet_name: Option<String>,
    pub channel_id: String,
    pub service_account: ServiceAccountConfig,
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = require("BOT_TOKEN")?;

        let spreadsheet_id = normalize_spreadsheet_id(&require("SPREADSHEET_ID")?);
        if spreadsheet_id.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "SPREADSHEET_ID".into(),
                message: "empty after normalization".into(),
            });
        }

        let sheet_name = std::env::var("SHEET_NAME")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let channel_id =
            std::env::var("CHANNEL_ID").unwrap_or_else(|_| DEFAULT_CHANNEL_ID.to_string());

        let private_key = require("GOOGLE_PRIVATE_KEY")?.replace("\\n", "\n");
        let client_email = require("GOOGLE_CLIENT_EMAIL")?;
        let project_id = std::env::var("GOOGLE_PROJECT_ID").unwrap_or_default();

        Ok(Self {
            bot_token,
            spreadsheet_id,
            sheet_name,
            channel_id,
            service_account: ServiceAccountConfig {
                private_key: SecretString::from(private_key),
                client_email,
                project_id,
            },
        })
    }
}

fn require(key: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Accept either a pure spreadsheet id or a full Google Sheets URL and return
/// the id. A URL has the id between the `/d/` marker and the next `/`.
pub fn normalize_spreadsheet_id(value: &str) -> String {
    let v = value.trim();
    if v.contains("docs.google.com") {
        if let Some(part) = v.split("/d/").nth(1) {
            return part.split('/').next().unwrap_or(part).to_string();
        }
    }
    v.to_string()
}
