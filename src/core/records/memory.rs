use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use time::{Duration, OffsetDateTime};

use super::{
    CallQuery, CallRecord, CallRecordStore, CallStats, CallerCount, NewCallRecord,
    RecordStoreError, TOP_CALLERS_LIMIT, TaskTypeCount,
};

/// Process-local call record store.
///
/// Records are kept in insertion order, which is also creation order.
#[derive(Default)]
pub struct InMemoryCallRecordStore {
    next_id: AtomicU64,
    records: RwLock<Vec<CallRecord>>,
}

impl InMemoryCallRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn insert_at(
        &self,
        record: NewCallRecord,
        created_at: OffsetDateTime,
    ) -> Result<u64, RecordStoreError> {
        if record.caller_phone.is_empty() {
            return Err(RecordStoreError::Invalid(
                "caller_phone is required".to_string(),
            ));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.records.write().push(CallRecord {
            id,
            caller_phone: record.caller_phone,
            task_type: record.task_type,
            call_summary: record.call_summary,
            detail_info: record.detail_info,
            created_at,
        });
        tracing::info!(record_id = id, "Inserted call record");
        Ok(id)
    }
}

/// Sort `(key, count)` pairs by count descending, then key ascending.
fn ranked(counts: HashMap<String, u64>) -> Vec<(String, u64)> {
    let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

#[async_trait]
impl CallRecordStore for InMemoryCallRecordStore {
    async fn insert(&self, record: NewCallRecord) -> Result<u64, RecordStoreError> {
        self.insert_at(record, OffsetDateTime::now_utc())
    }

    async fn query(&self, query: &CallQuery) -> Result<Vec<CallRecord>, RecordStoreError> {
        let records = self.records.read();
        Ok(records
            .iter()
            .rev()
            .filter(|r| query.phone.as_ref().is_none_or(|p| &r.caller_phone == p))
            .filter(|r| query.task_type.as_ref().is_none_or(|t| &r.task_type == t))
            .filter(|r| query.date.is_none_or(|d| r.created_at.date() == d))
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn stats(&self, now: OffsetDateTime) -> Result<CallStats, RecordStoreError> {
        let records = self.records.read();
        let today = now.date();
        let since = now - Duration::hours(24);

        let mut by_task_type: HashMap<String, u64> = HashMap::new();
        let mut by_caller: HashMap<String, u64> = HashMap::new();
        let mut calls_today = 0;
        let mut calls_last_24h = 0;

        for record in records.iter() {
            if record.created_at.date() == today {
                calls_today += 1;
            }
            if record.created_at >= since {
                calls_last_24h += 1;
            }
            if !record.task_type.is_empty() {
                *by_task_type.entry(record.task_type.clone()).or_default() += 1;
            }
            *by_caller.entry(record.caller_phone.clone()).or_default() += 1;
        }

        Ok(CallStats {
            total_calls: records.len() as u64,
            calls_today,
            calls_last_24h,
            by_task_type: ranked(by_task_type)
                .into_iter()
                .map(|(task_type, count)| TaskTypeCount { task_type, count })
                .collect(),
            top_callers: ranked(by_caller)
                .into_iter()
                .take(TOP_CALLERS_LIMIT)
                .map(|(phone, count)| CallerCount { phone, count })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn record(phone: &str, task_type: &str) -> NewCallRecord {
        NewCallRecord {
            caller_phone: phone.to_string(),
            task_type: task_type.to_string(),
            call_summary: "summary".to_string(),
            detail_info: "details".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let store = InMemoryCallRecordStore::new();
        let first = store.insert(record("+14155550001", "Question")).await.unwrap();
        let second = store.insert(record("+14155550002", "Claim")).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_insert_rejects_missing_phone() {
        let store = InMemoryCallRecordStore::new();
        assert!(matches!(
            store.insert(record("", "Question")).await,
            Err(RecordStoreError::Invalid(_))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_query_filters_and_orders_newest_first() {
        let store = InMemoryCallRecordStore::new();
        let day1 = datetime!(2025-03-01 10:00 UTC);
        let day2 = datetime!(2025-03-02 10:00 UTC);
        store.insert_at(record("+14155550001", "Question"), day1).unwrap();
        store.insert_at(record("+14155550002", "Claim"), day1).unwrap();
        store.insert_at(record("+14155550001", "Claim"), day2).unwrap();

        let all = store.query(&CallQuery::default()).await.unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 2, 1]);

        let by_phone = store
            .query(&CallQuery {
                phone: Some("+14155550001".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_phone.len(), 2);

        let by_type_and_date = store
            .query(&CallQuery {
                task_type: Some("Claim".to_string()),
                date: Some(day1.date()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_type_and_date.len(), 1);
        assert_eq!(by_type_and_date[0].id, 2);

        let limited = store
            .query(&CallQuery {
                limit: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, 3);
    }

    #[tokio::test]
    async fn test_stats() {
        let store = InMemoryCallRecordStore::new();
        let now = datetime!(2025-03-02 12:00 UTC);
        store
            .insert_at(record("+14155550001", "Question"), datetime!(2025-02-20 09:00 UTC))
            .unwrap();
        store
            .insert_at(record("+14155550001", "Claim"), datetime!(2025-03-01 20:00 UTC))
            .unwrap();
        store
            .insert_at(record("+14155550002", "Claim"), datetime!(2025-03-02 08:00 UTC))
            .unwrap();

        let stats = store.stats(now).await.unwrap();
        assert_eq!(stats.total_calls, 3);
        assert_eq!(stats.calls_today, 1);
        assert_eq!(stats.calls_last_24h, 2);
        assert_eq!(
            stats.by_task_type,
            vec![
                TaskTypeCount {
                    task_type: "Claim".to_string(),
                    count: 2
                },
                TaskTypeCount {
                    task_type: "Question".to_string(),
                    count: 1
                },
            ]
        );
        assert_eq!(stats.top_callers[0].phone, "+14155550001");
        assert_eq!(stats.top_callers[0].count, 2);
    }
}
