//! Websocket change feed for the hosted backend.
//!
//! One channel is joined per table; the server pushes INSERT/UPDATE/DELETE
//! frames carrying old/new row images. Images are decoded best-effort and
//! only ever used for scope filtering — consumers re-fetch on every event.
//! If the socket drops, the feed ends; remounting a synchronizer
//! resubscribes.

use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::{Duration, interval};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::domain::error::RemoteError;
use crate::domain::gateway::{ChangeEvent, ChangeFeed, ChangeKind};

use super::rest::RestConfig;

const HEARTBEAT_PERIOD: Duration = Duration::from_secs(30);
const EVENT_CAPACITY: usize = 64;

pub(crate) async fn subscribe_table<T>(
    config: &RestConfig,
    table: &str,
) -> Result<ChangeFeed<T>, RemoteError>
where
    T: DeserializeOwned + Send + 'static,
{
    let url = socket_url(&config.base_url, &config.api_key);
    let (socket, _) = connect_async(url.as_str())
        .await
        .map_err(|err| RemoteError::Network(err.to_string()))?;
    let (mut write, mut read) = socket.split();

    let topic = format!("realtime:public:{table}");
    write
        .send(Message::text(frame(&topic, "phx_join", 1)))
        .await
        .map_err(|err| RemoteError::Network(err.to_string()))?;

    let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
    let task = tokio::spawn(async move {
        let mut heartbeat = interval(HEARTBEAT_PERIOD);
        // The first tick completes immediately; the join frame already
        // proved the socket alive.
        heartbeat.tick().await;
        let mut frame_ref: u64 = 1;
        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    frame_ref += 1;
                    let beat = frame("phoenix", "heartbeat", frame_ref);
                    if write.send(Message::text(beat)).await.is_err() {
                        break;
                    }
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(event) = parse_event::<T>(text.as_str(), &topic) {
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = write.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                },
            }
        }
    });
    Ok(ChangeFeed::with_closer(rx, move || task.abort()))
}

fn socket_url(base_url: &str, api_key: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let socket_base = if let Some(host) = base.strip_prefix("https://") {
        format!("wss://{host}")
    } else if let Some(host) = base.strip_prefix("http://") {
        format!("ws://{host}")
    } else {
        base.to_owned()
    };
    format!("{socket_base}/realtime/v1/websocket?apikey={api_key}&vsn=1.0.0")
}

fn frame(topic: &str, event: &str, frame_ref: u64) -> String {
    json!({
        "topic": topic,
        "event": event,
        "payload": {},
        "ref": frame_ref.to_string(),
    })
    .to_string()
}

fn parse_event<T: DeserializeOwned>(text: &str, topic: &str) -> Option<ChangeEvent<T>> {
    let value: Value = serde_json::from_str(text).ok()?;
    if value.get("topic")?.as_str()? != topic {
        return None;
    }
    let kind = match value.get("event")?.as_str()? {
        "INSERT" => ChangeKind::Insert,
        "UPDATE" => ChangeKind::Update,
        "DELETE" => ChangeKind::Delete,
        _ => return None,
    };
    let payload = value.get("payload")?;
    let new = payload
        .get("record")
        .cloned()
        .and_then(|row| serde_json::from_value(row).ok());
    let old = payload
        .get("old_record")
        .cloned()
        .and_then(|row| serde_json::from_value(row).ok());
    Some(ChangeEvent { kind, old, new })
}
