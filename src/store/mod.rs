//! Record sink abstraction and the finalized record type.

pub mod sheets;

use async_trait::async_trait;
use chrono::{DateTime, Local};

use crate::error::StoreError;

pub use sheets::SheetsStore;

/// A finalized intake record.
///
/// Built fresh at save time from a completed draft plus submitter identity;
/// immutable once built, handed to the store and the notifier, then dropped.
#[derive(Debug, Clone)]
pub struct Record {
    pub name: String,
    /// Canonical format, `+998 DD DDD DD DD`.
    pub phone: String,
    pub address: String,
    pub submitter_handle: String,
    pub submitter_id: i64,
    /// Wall-clock time at save, local clock.
    pub submitted_at: DateTime<Local>,
}

impl Record {
    /// The fixed persisted row shape:
    /// name, phone, address, handle, id, timestamp.
    pub fn as_row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.phone.clone(),
            self.address.clone(),
            self.submitter_handle.clone(),
            self.submitter_id.to_string(),
            self.submitted_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]
    }
}

/// Append-only tabular sink.
///
/// The engine calls `append` exactly once per confirmed save. On failure the
/// error detail is surfaced verbatim to the user and the session is
/// discarded; there is no automatic retry.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn append(&self, record: &Record) -> Result<(), StoreError>;
}
