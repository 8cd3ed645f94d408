//! Post-call records written by the `record_call_data` tool.
//!
//! Persistence is an external collaborator: the bridge only needs
//! [`CallRecordStore::insert`], and the admin surface reads through
//! [`CallRecordStore::query`] and [`CallRecordStore::stats`]. The in-memory
//! store is the default backend.

mod memory;

pub use memory::InMemoryCallRecordStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Date, OffsetDateTime};

/// Default page size for record queries.
pub const DEFAULT_QUERY_LIMIT: usize = 50;

/// Number of callers listed in [`CallStats::top_callers`].
pub const TOP_CALLERS_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum RecordStoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid record: {0}")]
    Invalid(String),
}

/// Record to be inserted. `caller_phone` must already be the trusted,
/// normalized number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCallRecord {
    pub caller_phone: String,
    pub task_type: String,
    pub call_summary: String,
    pub detail_info: String,
}

/// Stored call record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallRecord {
    pub id: u64,
    pub caller_phone: String,
    pub task_type: String,
    pub call_summary: String,
    pub detail_info: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Filters for [`CallRecordStore::query`]. Results are newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallQuery {
    pub limit: usize,
    pub phone: Option<String>,
    pub task_type: Option<String>,
    /// Calendar day (UTC) the call was recorded on
    pub date: Option<Date>,
}

impl Default for CallQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_QUERY_LIMIT,
            phone: None,
            task_type: None,
            date: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskTypeCount {
    pub task_type: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallerCount {
    pub phone: String,
    pub count: u64,
}

/// Aggregate call statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallStats {
    pub total_calls: u64,
    pub calls_today: u64,
    pub calls_last_24h: u64,
    pub by_task_type: Vec<TaskTypeCount>,
    pub top_callers: Vec<CallerCount>,
}

/// Storage backend for call records.
#[async_trait]
pub trait CallRecordStore: Send + Sync {
    /// Insert a record and return its identifier.
    async fn insert(&self, record: NewCallRecord) -> Result<u64, RecordStoreError>;

    /// Query records matching `query`, newest first.
    async fn query(&self, query: &CallQuery) -> Result<Vec<CallRecord>, RecordStoreError>;

    /// Aggregate statistics relative to `now`.
    async fn stats(&self, now: OffsetDateTime) -> Result<CallStats, RecordStoreError>;
}
