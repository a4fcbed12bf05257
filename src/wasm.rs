use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::fmt::format::Pretty;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_web::{performance_layer, MakeWebConsoleWriter};
use worker::*;

use crate::classifier::OpenAiClassifier;
use crate::clock::now_ms;
use crate::collector::StopCondition;
use crate::handler::{self, ApiResponse};
use crate::pipeline::{self, RunConfig};
use crate::store::{TimeIndexedStore, WorkersKv};

const DEFAULT_EVENT_LIMIT: usize = 100;
const DEFAULT_COLLECT_SECONDS: u64 = 10;

/// Add CORS headers to a response.
fn with_cors(response: Response) -> Result<Response> {
    let headers = Headers::new();
    headers.set("Access-Control-Allow-Origin", "*")?;
    headers.set("Access-Control-Allow-Methods", "GET, OPTIONS")?;
    headers.set("Access-Control-Allow-Headers", "Content-Type, Accept")?;
    headers.set("Access-Control-Max-Age", "86400")?;

    for (key, value) in response.headers() {
        if !key.to_lowercase().starts_with("access-control-") {
            headers.set(&key, &value)?;
        }
    }

    Ok(Response::from_body(response.body().clone())?
        .with_status(response.status_code())
        .with_headers(headers))
}

/// Handle CORS preflight OPTIONS requests.
fn cors_preflight() -> Result<Response> {
    with_cors(Response::empty()?.with_status(204))
}

/// Initialize tracing for Cloudflare Workers.
/// Must be called via #[event(start)] to run once on worker initialization.
#[event(start)]
fn init() {
    // JSON formatting layer that writes to the Workers console
    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(true)
        .with_ansi(false)
        .with_timer(UtcTime::new(Rfc3339))
        .with_writer(MakeWebConsoleWriter::new());

    let perf_layer = performance_layer().with_details_from_fields(Pretty::default());

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(perf_layer)
        .init();
}

#[event(fetch)]
pub async fn main(req: Request, env: Env, _ctx: Context) -> Result<Response> {
    let method = req.method();
    let path = req.path();

    if method == Method::Options {
        return cors_preflight();
    }

    let response = match (method, path.as_str()) {
        (Method::Get, "/api/meters") => handle_meters(env).await,
        (Method::Get, "/api/concepts") => handle_concepts(req, env).await,
        (Method::Get, "/health") => Response::ok("ok"),
        _ => to_worker(ApiResponse::not_found()),
    };

    // Add CORS headers to all responses, including errors
    match response {
        Ok(r) => with_cors(r),
        Err(e) => {
            tracing::error!(error = %e, path = %path, "request failed");
            with_cors(to_worker(ApiResponse::internal_error())?)
        }
    }
}

/// Cron trigger: one bounded sampling run per invocation.
#[event(scheduled)]
pub async fn scheduled(_event: ScheduledEvent, env: Env, _ctx: ScheduleContext) {
    if let Err(e) = run_scheduled(&env).await {
        tracing::error!(error = %e, "scheduled run failed");
    }
}

async fn run_scheduled(env: &Env) -> Result<()> {
    let config = run_config_from_env(env)?;
    let classifier = OpenAiClassifier::from_worker_env(env);
    let store = TimeIndexedStore::new(WorkersKv::from_worker_env(env)?);

    let report = pipeline::run(&config, &classifier, &store)
        .await
        .map_err(|e| Error::RustError(e.to_string()))?;

    tracing::info!(
        collected = report.collected,
        stream_errors = report.stream_errors,
        succeeded = report.outcomes.succeeded,
        no_sentiment = report.outcomes.no_sentiment,
        failed = report.outcomes.failed,
        stored = ?report.stored,
        "scheduled run complete"
    );
    Ok(())
}

fn run_config_from_env(env: &Env) -> Result<RunConfig> {
    let event_limit = parse_var(env, "EVENT_LIMIT").unwrap_or(DEFAULT_EVENT_LIMIT);
    let collect_seconds = parse_var(env, "COLLECT_SECONDS").unwrap_or(DEFAULT_COLLECT_SECONDS);

    // "0" disables that ceiling
    let stop = StopCondition::new(
        Some(event_limit).filter(|n| *n > 0),
        Some(collect_seconds)
            .filter(|s| *s > 0)
            .map(Duration::from_secs),
    )
    .map_err(|e| Error::RustError(e.to_string()))?;

    let mut config = RunConfig::new(stop);
    if let Ok(url) = env.var("JETSTREAM_URL") {
        config = config.with_endpoint(url.to_string());
    }
    Ok(config)
}

fn parse_var<T: std::str::FromStr>(env: &Env, name: &str) -> Option<T> {
    let raw = env.var(name).ok()?.to_string();
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(name, value = %raw, "ignoring unparseable variable");
            None
        }
    }
}

async fn handle_meters(env: Env) -> Result<Response> {
    let store = TimeIndexedStore::new(WorkersKv::from_worker_env(&env)?);
    to_worker(handler::meters(&store, now_ms()).await)
}

async fn handle_concepts(req: Request, env: Env) -> Result<Response> {
    let url = req.url()?;
    let timestamp = url
        .query_pairs()
        .find(|(k, _)| k == "timestamp")
        .map(|(_, v)| v.into_owned());

    let store = TimeIndexedStore::new(WorkersKv::from_worker_env(&env)?);
    to_worker(handler::concepts(&store, timestamp.as_deref()).await)
}

fn to_worker(response: ApiResponse) -> Result<Response> {
    Ok(Response::from_json(&response.body)?.with_status(response.status))
}
