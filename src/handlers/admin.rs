//! Read-only admin surface over call records and transfers.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::{Date, OffsetDateTime, macros::format_description};
use tracing::debug;

use crate::core::records::{CallQuery, CallRecord, CallStats, DEFAULT_QUERY_LIMIT};
use crate::core::transfer::TransferRecord;
use crate::errors::{AppError, AppResult};
use crate::middleware::Auth;
use crate::state::AppState;

/// Upper bound on `limit` for one page of records
const MAX_QUERY_LIMIT: usize = 500;

#[derive(Debug, Default, Deserialize)]
pub struct CallsParams {
    pub limit: Option<usize>,
    pub phone: Option<String>,
    pub task_type: Option<String>,
    /// `YYYY-MM-DD`
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CallsResponse {
    pub ok: bool,
    pub count: usize,
    pub records: Vec<CallRecord>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub ok: bool,
    pub stats: CallStats,
}

#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub call_sid: String,
    #[serde(flatten)]
    pub record: TransferRecord,
}

fn parse_date(raw: &str) -> AppResult<Date> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|_| AppError::BadRequest(format!("Invalid date '{raw}', expected YYYY-MM-DD")))
}

fn filter(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl CallsParams {
    fn into_query(self) -> AppResult<CallQuery> {
        let limit = match self.limit {
            Some(0) => return Err(AppError::BadRequest("limit must be positive".to_string())),
            Some(limit) => limit.min(MAX_QUERY_LIMIT),
            None => DEFAULT_QUERY_LIMIT,
        };
        let date = filter(self.date).map(|d| parse_date(&d)).transpose()?;

        Ok(CallQuery {
            limit,
            phone: filter(self.phone),
            task_type: filter(self.task_type),
            date,
        })
    }
}

/// `GET /admin/calls`: recent call records, newest first
pub async fn list_calls(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<Auth>,
    Query(params): Query<CallsParams>,
) -> AppResult<Json<CallsResponse>> {
    let query = params.into_query()?;
    debug!(auth_id = ?auth.id, ?query, "Listing call records");

    let records = state.call_records.query(&query).await?;
    Ok(Json(CallsResponse {
        ok: true,
        count: records.len(),
        records,
    }))
}

/// `GET /admin/stats`: aggregate call statistics
pub async fn call_stats(State(state): State<Arc<AppState>>) -> AppResult<Json<StatsResponse>> {
    let stats = state.call_records.stats(OffsetDateTime::now_utc()).await?;
    Ok(Json(StatsResponse { ok: true, stats }))
}

/// `GET /admin/transfers/{call_sid}`: current transfer record for a call
pub async fn get_transfer(
    State(state): State<Arc<AppState>>,
    Path(call_sid): Path<String>,
) -> AppResult<Json<TransferResponse>> {
    let record = state
        .transfer_registry
        .get(&call_sid)
        .ok_or_else(|| AppError::NotFound(format!("No transfer for call {call_sid}")))?;
    Ok(Json(TransferResponse { call_sid, record }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_calls_params_defaults() {
        let query = CallsParams::default().into_query().unwrap();
        assert_eq!(query, CallQuery::default());
    }

    #[test]
    fn test_calls_params_filters() {
        let query = CallsParams {
            limit: Some(10_000),
            phone: Some(" +14155550001 ".to_string()),
            task_type: Some(String::new()),
            date: Some("2025-03-09".to_string()),
        }
        .into_query()
        .unwrap();

        assert_eq!(query.limit, MAX_QUERY_LIMIT);
        assert_eq!(query.phone.as_deref(), Some("+14155550001"));
        assert_eq!(query.task_type, None);
        assert_eq!(query.date, Some(date!(2025 - 03 - 09)));
    }

    #[test]
    fn test_calls_params_rejects_bad_input() {
        let bad_date = CallsParams {
            date: Some("09/03/2025".to_string()),
            ..Default::default()
        };
        assert!(matches!(bad_date.into_query(), Err(AppError::BadRequest(_))));

        let zero = CallsParams {
            limit: Some(0),
            ..Default::default()
        };
        assert!(matches!(zero.into_query(), Err(AppError::BadRequest(_))));
    }
}
