use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::clock::now_ms;
use crate::handler::{self, ApiResponse};
use crate::store::{KvBackend, TimeIndexedStore};

/// Initialize tracing subscriber for native (non-WASM) builds.
/// Uses RUST_LOG env var for filtering (defaults to info). Logs go to stderr
/// so `skymood run` can print its report on stdout.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

pub fn build_router<B>(store: Arc<TimeIndexedStore<B>>) -> Router
where
    B: KvBackend + Send + Sync + 'static,
{
    Router::new()
        .route("/api/meters", get(handle_meters::<B>))
        .route("/api/concepts", get(handle_concepts::<B>))
        .route("/health", get(|| async { with_cors("ok".into_response()) }))
        .fallback(|| async { into_axum(ApiResponse::not_found()) })
        .with_state(store)
}

async fn handle_meters<B>(State(store): State<Arc<TimeIndexedStore<B>>>) -> Response
where
    B: KvBackend + Send + Sync + 'static,
{
    into_axum(handler::meters(store.as_ref(), now_ms()).await)
}

async fn handle_concepts<B>(
    State(store): State<Arc<TimeIndexedStore<B>>>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Response
where
    B: KvBackend + Send + Sync + 'static,
{
    let Query(params) = match query {
        Ok(query) => query,
        Err(rejection) => {
            return into_axum(ApiResponse::error(400, &rejection.body_text()));
        }
    };
    into_axum(handler::concepts(store.as_ref(), params.get("timestamp").map(String::as_str)).await)
}

fn into_axum(response: ApiResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    with_cors((status, Json(response.body)).into_response())
}

fn with_cors(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}
