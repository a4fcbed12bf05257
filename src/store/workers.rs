//! Workers KV binding backend.

use serde_json::Value as JsonValue;
use worker::kv::KvStore;

use super::{KvBackend, ListKey, ListPage, StoreError};

pub const KV_BINDING: &str = "METERS";

pub struct WorkersKv {
    kv: KvStore,
}

impl WorkersKv {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    pub fn from_worker_env(env: &worker::Env) -> worker::Result<Self> {
        Ok(Self::new(env.kv(KV_BINDING)?))
    }
}

fn backend_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait::async_trait(?Send)]
impl KvBackend for WorkersKv {
    async fn put(&self, key: &str, value: String, metadata: JsonValue) -> Result<(), StoreError> {
        self.kv
            .put(key, value)
            .map_err(backend_err)?
            .metadata(metadata)
            .map_err(backend_err)?
            .execute()
            .await
            .map_err(backend_err)
    }

    async fn list(&self, prefix: &str, cursor: Option<String>) -> Result<ListPage, StoreError> {
        let mut request = self.kv.list().prefix(prefix.to_string());
        if let Some(cursor) = cursor {
            request = request.cursor(cursor);
        }
        let response = request.execute().await.map_err(backend_err)?;

        Ok(ListPage {
            keys: response
                .keys
                .into_iter()
                .map(|k| ListKey {
                    name: k.name,
                    metadata: k.metadata,
                })
                .collect(),
            cursor: response.cursor,
            list_complete: response.list_complete,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.kv.get(key).text().await.map_err(backend_err)
    }
}
