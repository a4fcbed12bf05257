use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::classifier::{OpenAiClassifier, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::collector::{jetstream, StopCondition, StreamFilter, POST_COLLECTION};
use crate::pipeline::RunConfig;

pub const CONFIG_FILENAME: &str = "skymood.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub classifier: ClassifierConfig,
    pub store: StoreConfig,
    pub server: ServerConfig,
}

/// Ceilings of 0 are treated as unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub endpoint: String,
    pub collections: Vec<String>,
    pub event_limit: usize,
    pub collect_seconds: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: jetstream::DEFAULT_ENDPOINT.to_string(),
            collections: vec![POST_COLLECTION.to_string()],
            event_limit: 100,
            collect_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_seconds: 30,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Cloudflare,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// Listing page size for the in-memory backend.
    pub page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            account_id: None,
            namespace_id: None,
            api_token: None,
            page_size: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8787".to_string(),
        }
    }
}

impl Config {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write {}", path.as_ref().display()))?;
        Ok(())
    }

    /// Collection ceilings, rejecting a config where both are unset.
    pub fn stop_condition(&self) -> Result<StopCondition> {
        let events = Some(self.stream.event_limit).filter(|n| *n > 0);
        let seconds = Some(self.stream.collect_seconds)
            .filter(|s| *s > 0)
            .map(Duration::from_secs);
        StopCondition::new(events, seconds)
            .context("[stream] needs event_limit or collect_seconds greater than 0")
    }

    pub fn run_config(&self) -> Result<RunConfig> {
        if self.stream.collections.is_empty() {
            bail!("[stream] collections must name at least one collection");
        }
        let mut config = RunConfig::new(self.stop_condition()?).with_endpoint(&self.stream.endpoint);
        config.filter = StreamFilter {
            collections: self.stream.collections.clone(),
        };
        Ok(config)
    }

    /// Classifier client; `api_key` (from the environment) wins over the file.
    pub fn classifier(&self, api_key: Option<String>) -> OpenAiClassifier {
        let key = api_key.or_else(|| self.classifier.api_key.clone());
        OpenAiClassifier::new(key)
            .with_base_url(&self.classifier.base_url)
            .with_model(&self.classifier.model)
            .with_timeout(Duration::from_secs(self.classifier.timeout_seconds))
    }
}

pub fn load_config_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: Config =
        toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))?;
    Ok(config)
}

/// Load `path` if given, else `skymood.toml` if present, else defaults.
pub fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config_from_path(path),
        None if Path::new(CONFIG_FILENAME).exists() => load_config_from_path(CONFIG_FILENAME),
        None => Ok(Config::default()),
    }
}
