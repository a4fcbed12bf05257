use anyhow::Result;

use super::{memory_kv, rest_kv};
use crate::cli::config::{Config, StoreBackend};
use crate::cli::RunArgs;
use crate::pipeline::{self, RunReport};
use crate::store::TimeIndexedStore;

pub async fn execute_run(mut config: Config, args: RunArgs, api_key: Option<String>) -> Result<()> {
    if let Some(events) = args.events {
        config.stream.event_limit = events;
    }
    if let Some(seconds) = args.seconds {
        config.stream.collect_seconds = seconds;
    }

    let report = run_once(&config, api_key).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// One pipeline run against the configured backend.
pub async fn run_once(config: &Config, api_key: Option<String>) -> Result<RunReport> {
    let run_config = config.run_config()?;
    let classifier = config.classifier(api_key);

    let report = match config.store.backend {
        StoreBackend::Memory => {
            let store = TimeIndexedStore::new(memory_kv(&config.store));
            pipeline::run(&run_config, &classifier, &store).await?
        }
        StoreBackend::Cloudflare => {
            let store = TimeIndexedStore::new(rest_kv(&config.store)?);
            pipeline::run(&run_config, &classifier, &store).await?
        }
    };
    Ok(report)
}
