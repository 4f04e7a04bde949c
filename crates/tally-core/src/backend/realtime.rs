//! Supabase Realtime client (Phoenix channel protocol over websocket).
//!
//! One socket per table subscription. The socket task forwards
//! `postgres_changes` events into the returned [`DeltaStream`] and exits when
//! the receiver is dropped or the server closes the connection.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{BackendError, BackendResult, DeltaStream, RealtimeEventType, RealtimeMessage};
use crate::auth::AuthSession;
use crate::config::BackendConfig;
use crate::models::SyncTable;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const HEARTBEAT_TOPIC: &str = "phoenix";

#[derive(Debug, Deserialize)]
struct PhoenixFrame {
    #[serde(default)]
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct ChangeData {
    #[serde(rename = "type")]
    event_type: RealtimeEventType,
    table: String,
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    old_record: Option<Value>,
}

pub(super) async fn subscribe(
    config: &BackendConfig,
    table: SyncTable,
    session: &AuthSession,
    buffer: usize,
) -> BackendResult<DeltaStream> {
    let (ws_stream, _response) = connect_async(config.realtime_url())
        .await
        .map_err(|error| BackendError::Realtime(format!("connect failed: {error}")))?;
    let (mut write, mut read) = ws_stream.split();

    let topic = format!("realtime:public:{}", table.as_str());
    let join = json!({
        "topic": topic,
        "event": "phx_join",
        "ref": "1",
        "payload": {
            "config": {
                "postgres_changes": [{
                    "event": "*",
                    "schema": "public",
                    "table": table.as_str(),
                    "filter": format!("user_id=eq.{}", session.user_id()),
                }]
            },
            "access_token": session.access_token,
        }
    });
    write
        .send(Message::Text(join.to_string()))
        .await
        .map_err(|error| BackendError::Realtime(format!("join failed: {error}")))?;

    let (tx, rx) = mpsc::channel(buffer);
    tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut next_ref: u64 = 2;

        loop {
            tokio::select! {
                () = tx.closed() => break,
                _ = heartbeat.tick() => {
                    let frame = json!({
                        "topic": HEARTBEAT_TOPIC,
                        "event": "heartbeat",
                        "payload": {},
                        "ref": next_ref.to_string(),
                    });
                    next_ref += 1;
                    if write.send(Message::Text(frame.to_string())).await.is_err() {
                        break;
                    }
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(message) = decode_frame(&text) {
                            if tx.send(message).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if write.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        tracing::warn!(%table, %error, "Realtime socket error");
                        break;
                    }
                }
            }
        }

        tracing::debug!(%table, "Realtime subscription closed");
        write.send(Message::Close(None)).await.ok();
    });

    Ok(rx)
}

/// Decode one Phoenix frame into a row change, if it carries one.
///
/// Handles `postgres_changes` frames (`payload.data`) as well as the older
/// per-event frames (`INSERT`/`UPDATE`/`DELETE` with the change as payload).
/// Join replies, heartbeats and presence traffic yield `None`.
pub fn decode_frame(text: &str) -> Option<RealtimeMessage> {
    let frame: PhoenixFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(error) => {
            tracing::debug!(%error, "Ignoring undecodable realtime frame");
            return None;
        }
    };

    let data = match frame.event.as_str() {
        "postgres_changes" => frame.payload.get("data")?.clone(),
        "INSERT" | "UPDATE" | "DELETE" => frame.payload,
        "phx_reply" => {
            if frame.payload.get("status").and_then(Value::as_str) == Some("error") {
                tracing::warn!(topic = %frame.topic, response = %frame.payload, "Realtime join rejected");
            }
            return None;
        }
        _ => return None,
    };

    let change: ChangeData = serde_json::from_value(data).ok()?;
    Some(RealtimeMessage {
        table: change.table,
        event_type: change.event_type,
        new_record: change.record.filter(|record| !record.is_null()),
        old_record: change.old_record.filter(|record| !record.is_null()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_postgres_changes_insert() {
        let frame = r#"{
            "topic": "realtime:public:expenses",
            "event": "postgres_changes",
            "ref": null,
            "payload": {
                "ids": [1],
                "data": {
                    "schema": "public",
                    "table": "expenses",
                    "type": "INSERT",
                    "commit_timestamp": "2026-03-01T12:00:00Z",
                    "record": {"id": "0190c5e4-0000-7000-8000-000000000001", "sync_version": 1},
                    "old_record": null
                }
            }
        }"#;

        let message = decode_frame(frame).unwrap();
        assert_eq!(message.table, "expenses");
        assert_eq!(message.event_type, RealtimeEventType::Insert);
        assert_eq!(message.new_record.unwrap()["sync_version"], json!(1));
        assert!(message.old_record.is_none());
    }

    #[test]
    fn decodes_legacy_delete_frame() {
        let frame = r#"{
            "topic": "realtime:public:persons",
            "event": "DELETE",
            "payload": {
                "type": "DELETE",
                "table": "persons",
                "old_record": {"id": "0190c5e4-0000-7000-8000-000000000002"}
            }
        }"#;

        let message = decode_frame(frame).unwrap();
        assert_eq!(message.event_type, RealtimeEventType::Delete);
        assert!(message.new_record.is_none());
        assert_eq!(
            message.old_record.unwrap()["id"],
            json!("0190c5e4-0000-7000-8000-000000000002")
        );
    }

    #[test]
    fn ignores_control_frames() {
        assert!(decode_frame(r#"{"topic":"phoenix","event":"phx_reply","payload":{"status":"ok"}}"#).is_none());
        assert!(decode_frame(r#"{"topic":"realtime:public:persons","event":"presence_state","payload":{}}"#).is_none());
        assert!(decode_frame("not json").is_none());
    }
}
