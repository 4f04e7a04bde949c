//! Supabase (PostgREST) implementation of `RemoteBackend`.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{realtime, BackendError, BackendResult, DeltaStream, RemoteBackend, SelectFilter};
use crate::auth::AuthSession;
use crate::config::BackendConfig;
use crate::models::{RecordId, SyncTable};
use crate::util::compact_text;

const OWNER_COLUMN: &str = "user_id";
const REALTIME_BUFFER: usize = 256;

#[derive(Clone)]
pub struct SupabaseBackend {
    config: BackendConfig,
    client: Client,
}

impl SupabaseBackend {
    pub fn new(config: BackendConfig) -> BackendResult<Self> {
        Ok(Self {
            config,
            client: Client::builder().build()?,
        })
    }

    pub const fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn table_url(&self, table: SyncTable) -> String {
        format!("{}/{}", self.config.rest_url(), table.as_str())
    }

    fn authorized(&self, request: RequestBuilder, session: &AuthSession) -> RequestBuilder {
        request
            .header("apikey", &self.config.supabase_anon_key)
            .bearer_auth(&session.access_token)
            .header("Accept", "application/json")
    }

    async fn send_rows(request: RequestBuilder) -> BackendResult<Vec<Value>> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api(parse_api_error(status, &body)));
        }
        Ok(response.json::<Vec<Value>>().await?)
    }

    async fn write_returning(
        request: RequestBuilder,
        table: SyncTable,
        id: RecordId,
    ) -> BackendResult<Option<Value>> {
        let rows = Self::send_rows(request.header("Prefer", "return=representation")).await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(row)),
            None => Err(BackendError::NotFound(format!("{table}/{id}"))),
        }
    }
}

#[async_trait]
impl RemoteBackend for SupabaseBackend {
    async fn select(
        &self,
        table: SyncTable,
        session: &AuthSession,
        filter: &SelectFilter,
    ) -> BackendResult<Vec<Value>> {
        let mut query = vec![
            ("select".to_string(), "*".to_string()),
            (OWNER_COLUMN.to_string(), format!("eq.{}", session.user_id())),
            ("order".to_string(), "updated_at.asc".to_string()),
        ];
        if let Some(watermark) = filter.updated_after {
            query.push(("updated_at".to_string(), format!("gt.{}", format_timestamp(watermark))));
        }
        if !filter.include_deleted {
            query.push(("deleted_at".to_string(), "is.null".to_string()));
        }

        let request = self.authorized(self.client.get(self.table_url(table)).query(&query), session);
        Self::send_rows(request).await
    }

    async fn insert(
        &self,
        table: SyncTable,
        session: &AuthSession,
        record: &Value,
    ) -> BackendResult<Option<Value>> {
        let mut body = record.clone();
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<RecordId>().ok())
            .ok_or_else(|| BackendError::Api("insert payload is missing a valid id".to_string()))?;
        if let Some(object) = body.as_object_mut() {
            object
                .entry(OWNER_COLUMN)
                .or_insert_with(|| json!(session.user_id()));
        }

        let request = self.authorized(self.client.post(self.table_url(table)).json(&body), session);
        Self::write_returning(request, table, id).await
    }

    async fn update(
        &self,
        table: SyncTable,
        session: &AuthSession,
        id: RecordId,
        record: &Value,
    ) -> BackendResult<Option<Value>> {
        let request = self.authorized(
            self.client
                .patch(self.table_url(table))
                .query(&[
                    ("id", format!("eq.{id}")),
                    (OWNER_COLUMN, format!("eq.{}", session.user_id())),
                ])
                .json(record),
            session,
        );
        Self::write_returning(request, table, id).await
    }

    async fn soft_delete(
        &self,
        table: SyncTable,
        session: &AuthSession,
        id: RecordId,
        deleted_at: DateTime<Utc>,
    ) -> BackendResult<Option<Value>> {
        let body = json!({ "deleted_at": format_timestamp(deleted_at) });
        self.update(table, session, id, &body).await
    }

    async fn subscribe(
        &self,
        table: SyncTable,
        session: &AuthSession,
    ) -> BackendResult<DeltaStream> {
        realtime::subscribe(&self.config, table, session, REALTIME_BUFFER).await
    }
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    message: Option<String>,
    error: Option<String>,
    hint: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            let hint = payload
                .hint
                .map(|hint| format!("; hint: {}", hint.trim()))
                .unwrap_or_default();
            return format!("{}{} ({})", message.trim(), hint, status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_api_error_prefers_message_field() {
        let rendered = parse_api_error(
            StatusCode::FORBIDDEN,
            r#"{"message":"new row violates row-level security policy","hint":"check user_id"}"#,
        );
        assert_eq!(
            rendered,
            "new row violates row-level security policy; hint: check user_id (403)"
        );
    }

    #[test]
    fn parse_api_error_falls_back_to_body_or_status() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "upstream down"),
            "upstream down (502)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }

    #[test]
    fn table_url_uses_rest_endpoint() {
        let backend = SupabaseBackend::new(
            BackendConfig::new("https://project.supabase.co", "anon").unwrap(),
        )
        .unwrap();
        assert_eq!(
            backend.table_url(SyncTable::ExpenseSplits),
            "https://project.supabase.co/rest/v1/expense_splits"
        );
    }

    #[test]
    fn timestamps_are_rendered_in_utc() {
        let timestamp = DateTime::parse_from_rfc3339("2026-03-01T12:00:00+02:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_timestamp(timestamp), "2026-03-01T10:00:00.000000Z");
    }
}
