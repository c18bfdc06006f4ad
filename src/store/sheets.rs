//! Google Sheets backend — appends one row per committed record.
//!
//! Talks to the Sheets v4 REST API with a service-account bearer token
//! (RS256 JWT exchanged at Google's token endpoint). The token is cached
//! until shortly before expiry.

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::{Config, ServiceAccountConfig};
use crate::error::StoreError;
use crate::store::{Record, RecordStore};

const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SCOPES: &str = "https://www.googleapis.com/auth/spreadsheets \
                      https://www.googleapis.com/auth/drive";

/// Dimensions for a worksheet created on demand.
const NEW_SHEET_ROWS: u32 = 1000;
const NEW_SHEET_COLS: u32 = 10;

/// Refresh the cached token this many seconds before it expires.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    token: String,
    expires_at: i64,
}

/// Sheets-backed record store.
pub struct SheetsStore {
    client: reqwest::Client,
    spreadsheet_id: String,
    sheet_name: Option<String>,
    service_account: ServiceAccountConfig,
    token: Mutex<Option<CachedToken>>,
}

impl SheetsStore {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            spreadsheet_id: config.spreadsheet_id.clone(),
            sheet_name: config.sheet_name.clone(),
            service_account: config.service_account.clone(),
            token: Mutex::new(None),
        }
    }

    /// Get a bearer token, minting a fresh one if the cache is stale.
    async fn access_token(&self) -> Result<String, StoreError> {
        let now = Utc::now().timestamp();

        let mut cache = self.token.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.expires_at - TOKEN_REFRESH_MARGIN_SECS > now {
                return Ok(cached.token.clone());
            }
        }

        let claims = Claims {
            iss: &self.service_account.client_email,
            scope: SCOPES,
            aud: TOKEN_URI,
            iat: now,
            exp: now + 3600,
        };

        let key = EncodingKey::from_rsa_pem(
            self.service_account.private_key.expose_secret().as_bytes(),
        )
        .map_err(|e| StoreError::Auth(format!("invalid service-account key: {e}")))?;

        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| StoreError::Auth(format!("failed to sign assertion: {e}")))?;

        let resp = self
            .client
            .post(TOKEN_URI)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| StoreError::Auth(e.to_string()))?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Auth(body));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| StoreError::Auth(e.to_string()))?;

        let access = token.access_token.clone();
        *cache = Some(CachedToken {
            token: token.access_token,
            expires_at: now + token.expires_in,
        });
        Ok(access)
    }

    /// Resolve the worksheet title to append to: the configured sub-store
    /// (created on demand if missing) or the spreadsheet's first sheet.
    async fn resolve_sheet(&self, token: &str) -> Result<String, StoreError> {
        let url = format!(
            "{SHEETS_API}/{}?fields=sheets.properties.title",
            self.spreadsheet_id
        );

        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| StoreError::Api(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(self.not_found());
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Api(format!("{status}: {body}")));
        }

        let meta: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| StoreError::Api(e.to_string()))?;

        let titles: Vec<&str> = meta["sheets"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|s| s["properties"]["title"].as_str())
            .collect();

        match &self.sheet_name {
            Some(name) => {
                if titles.iter().any(|t| *t == name.as_str()) {
                    Ok(name.clone())
                } else {
                    self.add_sheet(token, name).await?;
                    Ok(name.clone())
                }
            }
            None => titles
                .first()
                .map(|t| t.to_string())
                .ok_or_else(|| self.not_found()),
        }
    }

    /// Create the named worksheet, 1000 rows by 10 columns.
    async fn add_sheet(&self, token: &str, title: &str) -> Result<(), StoreError> {
        let url = format!("{SHEETS_API}/{}:batchUpdate", self.spreadsheet_id);
        let body = serde_json::json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": title,
                        "gridProperties": {
                            "rowCount": NEW_SHEET_ROWS,
                            "columnCount": NEW_SHEET_COLS,
                        }
                    }
                }
            }]
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Api(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(StoreError::WorksheetUnavailable)
        }
    }

    fn not_found(&self) -> StoreError {
        StoreError::SpreadsheetNotFound {
            spreadsheet_id: self.spreadsheet_id.clone(),
            service_account: self.service_account.client_email.clone(),
        }
    }
}

#[async_trait::async_trait]
impl RecordStore for SheetsStore {
    async fn append(&self, record: &Record) -> Result<(), StoreError> {
        let token = self.access_token().await?;
        let sheet = self.resolve_sheet(&token).await?;

        let url = format!(
            "{SHEETS_API}/{}/values/{}:append?valueInputOption=RAW",
            self.spreadsheet_id,
            encode_range(&sheet)
        );
        let body = serde_json::json!({ "values": [record.as_row()] });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Api(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(self.not_found());
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(StoreError::Api(format!("{status}: {detail}")));
        }

        tracing::info!(sheet = %sheet, "record appended to spreadsheet");
        Ok(())
    }
}

/// Percent-encode a sheet title as an A1 range path segment (`'Title'!A1`).
/// Single quotes inside the title are doubled per A1 notation.
fn encode_range(title: &str) -> String {
    let quoted = format!("'{}'!A1", title.replace('\'', "''"));
    let mut out = String::with_capacity(quoted.len() * 3);
    for b in quoted.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'!' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
