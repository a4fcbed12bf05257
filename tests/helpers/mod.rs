#![allow(dead_code)] // Test helpers appear unused when compiled independently

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use skymood::store::TimeIndexedStore;
use skymood::KvBackend;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response as WsResponse,
};
use tokio_tungstenite::tungstenite::Message;

/// A loopback server running on a background task.
pub struct MockServer {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.await;
    }
}

/// Find an available TCP port
pub async fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Best-effort check for whether binding to loopback is permitted in the current sandbox.
pub async fn can_bind_loopback() -> bool {
    match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => {
            drop(listener);
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => false,
        Err(_) => true, // treat other errors as non-fatal for skipping
    }
}

async fn serve_router(app: Router) -> (MockServer, String) {
    let port = free_port().await;
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .expect("failed to bind mock listener");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });
        if let Err(err) = server.await {
            eprintln!("mock server error: {}", err);
        }
    });

    (
        MockServer {
            shutdown_tx,
            handle,
        },
        format!("http://127.0.0.1:{}", port),
    )
}

/// Serve the skymood HTTP API over `store`, return (server, base URL).
pub async fn spawn_app<B>(store: Arc<TimeIndexedStore<B>>) -> (MockServer, String)
where
    B: KvBackend + Send + Sync + 'static,
{
    serve_router(skymood::build_router(store)).await
}

// ---------------------------------------------------------------------------
// Chat-completions mock

type ReplyFn = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

#[derive(Clone)]
struct ClassifierState {
    reply: ReplyFn,
    delay: Duration,
    requests: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

/// Handle to the recorded chat-completions requests.
#[derive(Clone)]
pub struct ClassifierRequests(Arc<Mutex<Vec<(Option<String>, Value)>>>);

impl ClassifierRequests {
    /// Recorded (authorization header, JSON body) pairs.
    pub async fn all(&self) -> Vec<(Option<String>, Value)> {
        self.0.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.0.lock().await.len()
    }
}

/// Spawn a chat-completions endpoint at `{base}/v1/chat/completions`.
///
/// `reply` maps the user message to the assistant reply; `None` answers 500.
/// Returns (server, base URL including `/v1`, request log).
pub async fn spawn_mock_classifier<F>(
    reply: F,
    delay: Duration,
) -> (MockServer, String, ClassifierRequests)
where
    F: Fn(&str) -> Option<String> + Send + Sync + 'static,
{
    let state = ClassifierState {
        reply: Arc::new(reply),
        delay,
        requests: Arc::new(Mutex::new(Vec::new())),
    };
    let requests = ClassifierRequests(state.requests.clone());

    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state);

    let (server, base) = serve_router(app).await;
    (server, format!("{}/v1", base), requests)
}

async fn chat_completions(
    State(state): State<ClassifierState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let user_text = body["messages"][1]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    state.requests.lock().await.push((auth, body));

    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    match (state.reply.as_ref())(&user_text) {
        Some(reply) => Json(json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": reply },
                "finish_reason": "stop"
            }]
        }))
        .into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response(),
    }
}

/// Six score lines plus a concepts line.
pub fn scores_reply(scores: [u8; 6], concepts: &str) -> String {
    format!(
        "happiness:{}\nsadness:{}\nanger:{}\nfear:{}\nsurprise:{}\ndisgust:{}\nconcepts:{}",
        scores[0], scores[1], scores[2], scores[3], scores[4], scores[5], concepts
    )
}

// ---------------------------------------------------------------------------
// Jetstream mock

/// Jetstream commit frame for a created record.
pub fn post_frame(rkey: &str, text: &str) -> String {
    commit_frame("app.bsky.feed.post", rkey, text)
}

pub fn commit_frame(collection: &str, rkey: &str, text: &str) -> String {
    json!({
        "did": "did:plc:testauthor",
        "time_us": 1_725_911_162_329_308u64,
        "kind": "commit",
        "commit": {
            "rev": "3l3qo2vutsw2b",
            "operation": "create",
            "collection": collection,
            "rkey": rkey,
            "record": {
                "$type": collection,
                "createdAt": "2024-09-09T19:46:02.102Z",
                "text": text
            },
            "cid": "bafyreidwaivazkwu67xztlmuobx35hs2lnfh3kolmgfmucldvhd3sgzcqi"
        }
    })
    .to_string()
}

/// Handle to what the Jetstream mock observed.
#[derive(Clone, Default)]
pub struct JetstreamLog {
    uris: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
}

impl JetstreamLog {
    /// Request URIs (path and query) of accepted subscriptions.
    pub async fn uris(&self) -> Vec<String> {
        self.uris.lock().await.clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Spawn a websocket server that sends `frames` to every subscriber.
///
/// With `close_after` the server closes the socket once the frames are sent;
/// otherwise it holds the connection open until the client goes away.
/// Returns (server, `ws://` endpoint, log).
pub async fn spawn_mock_jetstream(
    frames: Vec<String>,
    close_after: bool,
) -> (MockServer, String, JetstreamLog) {
    let port = free_port().await;
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .expect("failed to bind mock jetstream listener");
    let log = JetstreamLog::default();
    let task_log = log.clone();
    let frames = Arc::new(frames);

    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                accepted = listener.accept() => {
                    let Ok((stream, _)) = accepted else { continue };
                    tokio::spawn(serve_subscriber(stream, frames.clone(), close_after, task_log.clone()));
                }
            }
        }
    });

    (
        MockServer {
            shutdown_tx,
            handle,
        },
        format!("ws://127.0.0.1:{}/subscribe", port),
        log,
    )
}

async fn serve_subscriber(
    stream: tokio::net::TcpStream,
    frames: Arc<Vec<String>>,
    close_after: bool,
    log: JetstreamLog,
) {
    let (uri_tx, uri_rx) = std::sync::mpsc::channel();
    let callback = move |req: &Request, resp: WsResponse| -> Result<WsResponse, ErrorResponse> {
        let _ = uri_tx.send(req.uri().to_string());
        Ok(resp)
    };

    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };
    log.connections.fetch_add(1, Ordering::SeqCst);
    if let Ok(uri) = uri_rx.try_recv() {
        log.uris.lock().await.push(uri);
    }

    for frame in frames.iter() {
        if ws.send(Message::Text(frame.clone())).await.is_err() {
            return;
        }
    }

    if close_after {
        let _ = ws.close(None).await;
        return;
    }

    // Hold the connection until the client closes it.
    while let Some(Ok(msg)) = ws.next().await {
        if msg.is_close() {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Cloudflare KV REST mock

#[derive(Clone, Default)]
struct KvState {
    entries: Arc<Mutex<BTreeMap<String, (String, Value)>>>,
    page_size: usize,
    fail_next: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

/// Handle to the KV mock's state.
#[derive(Clone)]
pub struct KvMock {
    state: KvState,
}

impl KvMock {
    /// Answer the next `n` requests with 503.
    pub fn fail_next(&self, n: usize) {
        self.state.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub async fn keys(&self) -> Vec<String> {
        self.state.entries.lock().await.keys().cloned().collect()
    }
}

#[derive(Deserialize)]
struct ListParams {
    prefix: Option<String>,
    cursor: Option<String>,
}

#[derive(Deserialize)]
struct BulkEntry {
    key: String,
    value: String,
    #[serde(default)]
    metadata: Value,
}

/// Spawn a Cloudflare KV REST API lookalike listing `page_size` keys per page.
/// Returns (server, API base URL, handle).
pub async fn spawn_mock_kv(page_size: usize) -> (MockServer, String, KvMock) {
    let state = KvState {
        page_size,
        ..Default::default()
    };
    let mock = KvMock {
        state: state.clone(),
    };

    let ns = "/client/v4/accounts/:account/storage/kv/namespaces/:namespace";
    let app = Router::new()
        .route(&format!("{}/bulk", ns), put(kv_bulk))
        .route(&format!("{}/keys", ns), get(kv_list))
        .route(&format!("{}/values/:key", ns), get(kv_get))
        .with_state(state);

    let (server, base) = serve_router(app).await;
    (server, format!("{}/client/v4", base), mock)
}

fn injected_failure(state: &KvState) -> Option<Response> {
    state.calls.fetch_add(1, Ordering::SeqCst);
    let remaining = state.fail_next.load(Ordering::SeqCst);
    if remaining > 0 {
        state.fail_next.store(remaining - 1, Ordering::SeqCst);
        return Some((StatusCode::SERVICE_UNAVAILABLE, "try again").into_response());
    }
    None
}

async fn kv_bulk(State(state): State<KvState>, body: Bytes) -> Response {
    if let Some(failure) = injected_failure(&state) {
        return failure;
    }
    let entries: Vec<BulkEntry> = match serde_json::from_slice(&body) {
        Ok(entries) => entries,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let mut store = state.entries.lock().await;
    for entry in entries {
        store.insert(entry.key, (entry.value, entry.metadata));
    }
    Json(json!({ "success": true, "errors": [], "messages": [], "result": null })).into_response()
}

async fn kv_list(State(state): State<KvState>, Query(params): Query<ListParams>) -> Response {
    if let Some(failure) = injected_failure(&state) {
        return failure;
    }
    let prefix = params.prefix.unwrap_or_default();
    let start: usize = params
        .cursor
        .as_deref()
        .and_then(|c| c.parse().ok())
        .unwrap_or(0);

    let store = state.entries.lock().await;
    let matching: Vec<(&String, &Value)> = store
        .iter()
        .filter(|(k, _)| k.starts_with(&prefix))
        .map(|(k, (_, meta))| (k, meta))
        .collect();
    let end = (start + state.page_size).min(matching.len());
    let keys: Vec<Value> = matching[start.min(end)..end]
        .iter()
        .map(|(name, meta)| json!({ "name": name, "metadata": meta }))
        .collect();
    let cursor = if end < matching.len() {
        end.to_string()
    } else {
        String::new()
    };
    let count = keys.len();

    Json(json!({
        "success": true,
        "errors": [],
        "messages": [],
        "result": keys,
        "result_info": { "count": count, "cursor": cursor }
    }))
    .into_response()
}

async fn kv_get(
    State(state): State<KvState>,
    Path((_account, _namespace, key)): Path<(String, String, String)>,
) -> Response {
    if let Some(failure) = injected_failure(&state) {
        return failure;
    }
    match state.entries.lock().await.get(&key) {
        Some((value, _)) => value.clone().into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "errors": [{ "code": 10009, "message": "get: 'key not found'" }] })),
        )
            .into_response(),
    }
}
