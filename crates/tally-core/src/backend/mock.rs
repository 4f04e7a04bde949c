//! In-process backend for tests.
//!
//! Behaves like the hosted tables: every write bumps `sync_version` and
//! stamps `updated_at`, deletes are soft, and rows are scoped to the session
//! user. Failures, latency and realtime deltas can be scripted.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::{
    BackendError, BackendResult, DeltaStream, RealtimeEventType, RealtimeMessage, RemoteBackend,
    SelectFilter,
};
use crate::auth::AuthSession;
use crate::models::{RecordId, SyncTable};

const DELTA_BUFFER: usize = 64;

/// A call observed by the mock, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Select { table: SyncTable, filter: SelectFilter },
    Insert { table: SyncTable, id: RecordId },
    Update { table: SyncTable, id: RecordId },
    SoftDelete { table: SyncTable, id: RecordId },
    Subscribe { table: SyncTable },
}

#[derive(Debug, Default)]
struct MockState {
    rows: HashMap<SyncTable, BTreeMap<RecordId, Value>>,
    /// Remaining scripted failures per record; `None` fails forever
    failing_writes: HashMap<RecordId, Option<usize>>,
    failing_selects: HashMap<SyncTable, String>,
    subscribers: HashMap<SyncTable, mpsc::Sender<RealtimeMessage>>,
    calls: Vec<MockCall>,
    latency: Option<Duration>,
    unavailable: bool,
}

#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed or replace a row exactly as given. The row must carry an `id`.
    pub fn put_row(&self, table: SyncTable, row: Value) {
        let Some(id) = row_id(&row) else {
            tracing::warn!(%table, "MockBackend::put_row ignored a row without a valid id");
            return;
        };
        self.state().rows.entry(table).or_default().insert(id, row);
    }

    pub fn row(&self, table: SyncTable, id: RecordId) -> Option<Value> {
        self.state().rows.get(&table)?.get(&id).cloned()
    }

    pub fn rows(&self, table: SyncTable) -> Vec<Value> {
        self.state()
            .rows
            .get(&table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every write touching this record fails until cleared.
    pub fn fail_writes_for(&self, id: RecordId) {
        self.state().failing_writes.insert(id, None);
    }

    /// The next `times` writes touching this record fail.
    pub fn fail_writes_for_times(&self, id: RecordId, times: usize) {
        self.state().failing_writes.insert(id, Some(times));
    }

    pub fn clear_write_failures(&self) {
        self.state().failing_writes.clear();
    }

    pub fn fail_selects_for(&self, table: SyncTable, message: impl Into<String>) {
        self.state().failing_selects.insert(table, message.into());
    }

    /// Every call fails with `Unavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Delay applied before every call completes.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state().latency = latency;
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| {
                matches!(
                    call,
                    MockCall::Insert { .. } | MockCall::Update { .. } | MockCall::SoftDelete { .. }
                )
            })
            .count()
    }

    /// Whether a live subscriber exists for the table.
    pub fn is_subscribed(&self, table: SyncTable) -> bool {
        self.state()
            .subscribers
            .get(&table)
            .is_some_and(|sender| !sender.is_closed())
    }

    /// Deliver a realtime message to the subscriber of `table`.
    ///
    /// Returns false when nobody is listening.
    pub async fn emit(&self, table: SyncTable, message: RealtimeMessage) -> bool {
        let sender = self.state().subscribers.get(&table).cloned();
        match sender {
            Some(sender) => sender.send(message).await.is_ok(),
            None => false,
        }
    }

    /// Deliver an INSERT/UPDATE carrying `row`.
    pub async fn emit_row(&self, table: SyncTable, event_type: RealtimeEventType, row: Value) -> bool {
        self.emit(
            table,
            RealtimeMessage {
                table: table.as_str().to_string(),
                event_type,
                new_record: Some(row),
                old_record: None,
            },
        )
        .await
    }

    /// Deliver a hard DELETE for `id`.
    pub async fn emit_delete(&self, table: SyncTable, id: RecordId) -> bool {
        self.emit(
            table,
            RealtimeMessage {
                table: table.as_str().to_string(),
                event_type: RealtimeEventType::Delete,
                new_record: None,
                old_record: Some(json!({ "id": id.as_str() })),
            },
        )
        .await
    }

    async fn begin(&self, call: MockCall) -> BackendResult<()> {
        let latency = {
            let mut state = self.state();
            state.calls.push(call);
            if state.unavailable {
                return Err(BackendError::Unavailable("mock backend offline".to_string()));
            }
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }

    fn check_write_failure(state: &mut MockState, id: RecordId) -> BackendResult<()> {
        match state.failing_writes.get_mut(&id) {
            Some(None) => Err(BackendError::Api(format!("scripted failure for {id}"))),
            Some(Some(remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Err(BackendError::Api(format!("scripted failure for {id}")))
            }
            _ => Ok(()),
        }
    }

    fn write_row(
        &self,
        table: SyncTable,
        session: &AuthSession,
        id: RecordId,
        patch: &Value,
        must_exist: bool,
    ) -> BackendResult<Option<Value>> {
        let mut state = self.state();
        Self::check_write_failure(&mut state, id)?;

        let rows = state.rows.entry(table).or_default();
        let existing = rows.get(&id).cloned();
        if must_exist && existing.is_none() {
            return Err(BackendError::NotFound(format!("{table}/{id}")));
        }

        let mut row = existing.unwrap_or_else(|| json!({ "deleted_at": null }));
        let version = row.get("sync_version").and_then(Value::as_i64).unwrap_or(0) + 1;
        if let (Some(target), Some(source)) = (row.as_object_mut(), patch.as_object()) {
            for (key, value) in source {
                target.insert(key.clone(), value.clone());
            }
            target.insert("id".to_string(), json!(id.as_str()));
            target.insert("user_id".to_string(), json!(session.user_id()));
            target.insert("sync_version".to_string(), json!(version));
            target.insert("updated_at".to_string(), json!(format_timestamp(Utc::now())));
        }
        rows.insert(id, row.clone());
        Ok(Some(row))
    }
}

#[async_trait]
impl RemoteBackend for MockBackend {
    async fn select(
        &self,
        table: SyncTable,
        session: &AuthSession,
        filter: &SelectFilter,
    ) -> BackendResult<Vec<Value>> {
        self.begin(MockCall::Select {
            table,
            filter: filter.clone(),
        })
        .await?;

        let state = self.state();
        if let Some(message) = state.failing_selects.get(&table) {
            return Err(BackendError::Api(message.clone()));
        }

        let mut rows: Vec<Value> = state
            .rows
            .get(&table)
            .map(|rows| {
                rows.values()
                    .filter(|row| {
                        row.get("user_id")
                            .and_then(Value::as_str)
                            .is_none_or(|owner| owner == session.user_id())
                    })
                    .filter(|row| filter.include_deleted || is_live(row))
                    .filter(|row| match filter.updated_after {
                        Some(watermark) => row_updated_at(row).is_some_and(|at| at > watermark),
                        None => true,
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by_key(row_updated_at);
        Ok(rows)
    }

    async fn insert(
        &self,
        table: SyncTable,
        session: &AuthSession,
        record: &Value,
    ) -> BackendResult<Option<Value>> {
        let id = row_id(record)
            .ok_or_else(|| BackendError::Api("insert payload is missing a valid id".to_string()))?;
        self.begin(MockCall::Insert { table, id }).await?;
        self.write_row(table, session, id, record, false)
    }

    async fn update(
        &self,
        table: SyncTable,
        session: &AuthSession,
        id: RecordId,
        record: &Value,
    ) -> BackendResult<Option<Value>> {
        self.begin(MockCall::Update { table, id }).await?;
        self.write_row(table, session, id, record, true)
    }

    async fn soft_delete(
        &self,
        table: SyncTable,
        session: &AuthSession,
        id: RecordId,
        deleted_at: DateTime<Utc>,
    ) -> BackendResult<Option<Value>> {
        self.begin(MockCall::SoftDelete { table, id }).await?;
        let patch = json!({ "deleted_at": format_timestamp(deleted_at) });
        self.write_row(table, session, id, &patch, true)
    }

    async fn subscribe(
        &self,
        table: SyncTable,
        _session: &AuthSession,
    ) -> BackendResult<DeltaStream> {
        self.begin(MockCall::Subscribe { table }).await?;
        let (tx, rx) = mpsc::channel(DELTA_BUFFER);
        self.state().subscribers.insert(table, tx);
        Ok(rx)
    }
}

fn row_id(row: &Value) -> Option<RecordId> {
    row.get("id")?.as_str()?.parse().ok()
}

fn is_live(row: &Value) -> bool {
    row.get("deleted_at").is_none_or(Value::is_null)
}

fn row_updated_at(row: &Value) -> Option<DateTime<Utc>> {
    let raw = row.get("updated_at")?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|timestamp| timestamp.with_timezone(&Utc))
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> AuthSession {
        AuthSession::new("user-1", "token")
    }

    #[tokio::test]
    async fn writes_bump_version_and_deletes_are_soft() {
        let backend = MockBackend::new();
        let id = RecordId::new();
        let table = SyncTable::Expenses;

        let inserted = backend
            .insert(table, &session(), &json!({"id": id.as_str(), "amount": 10}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inserted["sync_version"], json!(1));
        assert_eq!(inserted["user_id"], json!("user-1"));

        let updated = backend
            .update(table, &session(), id, &json!({"amount": 12}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["sync_version"], json!(2));
        assert_eq!(updated["amount"], json!(12));

        backend
            .soft_delete(table, &session(), id, Utc::now())
            .await
            .unwrap();
        assert!(backend
            .select(table, &session(), &SelectFilter::all())
            .await
            .unwrap()
            .is_empty());
        let with_deleted = SelectFilter {
            include_deleted: true,
            ..SelectFilter::default()
        };
        assert_eq!(
            backend.select(table, &session(), &with_deleted).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn update_of_missing_row_is_not_found() {
        let backend = MockBackend::new();
        let error = backend
            .update(SyncTable::Persons, &session(), RecordId::new(), &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(error, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn scripted_failures_run_out() {
        let backend = MockBackend::new();
        let id = RecordId::new();
        backend.fail_writes_for_times(id, 1);
        let row = json!({"id": id.as_str()});

        assert!(backend.insert(SyncTable::Persons, &session(), &row).await.is_err());
        assert!(backend.insert(SyncTable::Persons, &session(), &row).await.is_ok());
        assert_eq!(backend.write_count(), 2);
    }

    #[tokio::test]
    async fn select_scopes_rows_to_session_user() {
        let backend = MockBackend::new();
        let mine = RecordId::new();
        let theirs = RecordId::new();
        backend.put_row(
            SyncTable::Persons,
            json!({"id": mine.as_str(), "user_id": "user-1", "updated_at": "2026-03-01T00:00:00Z"}),
        );
        backend.put_row(
            SyncTable::Persons,
            json!({"id": theirs.as_str(), "user_id": "user-2", "updated_at": "2026-03-01T00:00:00Z"}),
        );

        let rows = backend
            .select(SyncTable::Persons, &session(), &SelectFilter::all())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!(mine.as_str()));
    }
}
