//! Jetstream wire format and websocket subscriptions.
//!
//! Jetstream sends one JSON object per text frame. Only `commit` events with
//! a `create` operation on a filtered collection become messages; everything
//! else (identity, account, deletes) is skipped silently.

use futures::future::ready;
use futures::{Stream, StreamExt};
use serde::Deserialize;

use super::{CollectError, StreamEvent, StreamFilter};
use crate::types::RawMessage;

pub const DEFAULT_ENDPOINT: &str = "wss://jetstream2.us-east.bsky.network/subscribe";

#[derive(Deserialize)]
struct JetstreamEvent {
    did: String,
    kind: String,
    #[serde(default)]
    commit: Option<Commit>,
}

#[derive(Deserialize)]
struct Commit {
    operation: String,
    collection: String,
    rkey: String,
    #[serde(default)]
    record: Option<Record>,
}

#[derive(Deserialize)]
struct Record {
    #[serde(default)]
    text: String,
}

/// Build the subscribe URL with one `wantedCollections` per filtered type.
pub fn subscribe_url(endpoint: &str, filter: &StreamFilter) -> String {
    let mut url = endpoint.to_string();
    let mut sep = if endpoint.contains('?') { '&' } else { '?' };
    for collection in &filter.collections {
        url.push(sep);
        url.push_str("wantedCollections=");
        url.push_str(&urlencoding::encode(collection));
        sep = '&';
    }
    url
}

/// Decode one frame. `Ok(None)` means the frame is valid but not a match.
pub fn parse_event(text: &str, filter: &StreamFilter) -> Result<Option<RawMessage>, String> {
    let event: JetstreamEvent =
        serde_json::from_str(text).map_err(|e| format!("invalid jetstream frame: {}", e))?;

    if event.kind != "commit" {
        return Ok(None);
    }
    let Some(commit) = event.commit else {
        return Ok(None);
    };
    if commit.operation != "create" || !filter.matches(&commit.collection) {
        return Ok(None);
    }

    Ok(Some(RawMessage {
        text: commit.record.map(|r| r.text).unwrap_or_default(),
        author_id: event.did,
        collection_id: commit.collection,
        record_key: commit.rkey,
    }))
}

fn decode_text(text: &str, filter: &StreamFilter) -> Option<StreamEvent> {
    match parse_event(text, filter) {
        Ok(Some(message)) => Some(StreamEvent::Message(message)),
        Ok(None) => None,
        Err(e) => Some(StreamEvent::Error(e)),
    }
}

/// Native websocket subscription.
#[cfg(not(target_arch = "wasm32"))]
pub struct Subscription {
    ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

#[cfg(not(target_arch = "wasm32"))]
impl Subscription {
    pub async fn open(url: &str) -> Result<Self, CollectError> {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| CollectError::Connect(e.to_string()))?;
        Ok(Self { ws })
    }

    pub fn events<'a>(
        &'a mut self,
        filter: &'a StreamFilter,
    ) -> impl Stream<Item = StreamEvent> + 'a {
        use tokio_tungstenite::tungstenite::Message;

        self.ws.by_ref().filter_map(move |frame| {
            ready(match frame {
                Ok(Message::Text(text)) => decode_text(&text, filter),
                Ok(Message::Close(_)) => Some(StreamEvent::Closed),
                Ok(_) => None,
                Err(e) => Some(StreamEvent::Error(e.to_string())),
            })
        })
    }

    pub async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            tracing::debug!(error = %e, "websocket close failed");
        }
    }
}

/// Workers websocket subscription.
#[cfg(target_arch = "wasm32")]
pub struct Subscription {
    ws: worker::WebSocket,
}

#[cfg(target_arch = "wasm32")]
impl Subscription {
    pub async fn open(url: &str) -> Result<Self, CollectError> {
        let url = worker::Url::parse(url).map_err(|e| CollectError::Connect(e.to_string()))?;
        let ws = worker::WebSocket::connect(url)
            .await
            .map_err(|e| CollectError::Connect(e.to_string()))?;
        ws.accept()
            .map_err(|e| CollectError::Connect(e.to_string()))?;
        Ok(Self { ws })
    }

    pub fn events<'a>(
        &'a mut self,
        filter: &'a StreamFilter,
    ) -> impl Stream<Item = StreamEvent> + 'a {
        use worker::WebsocketEvent;

        match self.ws.events() {
            Ok(events) => events
                .filter_map(move |event| {
                    ready(match event {
                        Ok(WebsocketEvent::Message(msg)) => {
                            msg.text().and_then(|text| decode_text(&text, filter))
                        }
                        Ok(WebsocketEvent::Close(_)) => Some(StreamEvent::Closed),
                        Err(e) => Some(StreamEvent::Error(e.to_string())),
                    })
                })
                .left_stream(),
            Err(e) => futures::stream::once(ready(StreamEvent::Error(e.to_string()))).right_stream(),
        }
    }

    pub async fn close(&mut self) {
        if let Err(e) = self.ws.close(Some(1000), Some("collection complete")) {
            tracing::debug!(error = %e, "websocket close failed");
        }
    }
}
