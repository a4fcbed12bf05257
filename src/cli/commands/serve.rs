use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::{memory_kv, rest_kv};
use crate::classifier::OpenAiClassifier;
use crate::cli::config::{Config, StoreBackend};
use crate::cli::ServeArgs;
use crate::native::build_router;
use crate::pipeline::{self, RunConfig};
use crate::store::{KvBackend, TimeIndexedStore};

/// Periodic sampling into the served store.
struct Sampler {
    config: RunConfig,
    classifier: OpenAiClassifier,
    every: Duration,
}

pub async fn execute_serve(config: Config, args: ServeArgs, api_key: Option<String>) -> Result<()> {
    let listen = args.listen.unwrap_or_else(|| config.server.listen.clone());

    let sampler = match args.sample_every {
        Some(secs) => Some(Sampler {
            config: config.run_config()?,
            classifier: config.classifier(api_key),
            every: Duration::from_secs(secs.max(1)),
        }),
        None => None,
    };

    match config.store.backend {
        StoreBackend::Memory => {
            let store = TimeIndexedStore::new(memory_kv(&config.store));
            serve(Arc::new(store), &listen, sampler).await
        }
        StoreBackend::Cloudflare => {
            let store = TimeIndexedStore::new(rest_kv(&config.store)?);
            serve(Arc::new(store), &listen, sampler).await
        }
    }
}

async fn serve<B>(store: Arc<TimeIndexedStore<B>>, listen: &str, sampler: Option<Sampler>) -> Result<()>
where
    B: KvBackend + Send + Sync + 'static,
{
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {}", listen))?;
    info!(addr = %listener.local_addr()?, "meters API listening");

    if let Some(sampler) = sampler {
        tokio::spawn(sample_loop(store.clone(), sampler));
    }

    axum::serve(listener, build_router(store))
        .await
        .context("server error")?;
    Ok(())
}

async fn sample_loop<B>(store: Arc<TimeIndexedStore<B>>, sampler: Sampler)
where
    B: KvBackend + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(sampler.every);
    loop {
        ticker.tick().await;
        match pipeline::run(&sampler.config, &sampler.classifier, store.as_ref()).await {
            Ok(report) => info!(
                collected = report.collected,
                stored = ?report.stored,
                "sampling run complete"
            ),
            Err(e) => error!(error = %e, "sampling run failed"),
        }
    }
}
