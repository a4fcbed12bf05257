//! In-process backend with Workers KV listing semantics.

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Mutex;

use super::{KvBackend, ListKey, ListPage, StoreError};

/// Workers KV returns at most 1000 keys per list call.
const DEFAULT_PAGE_SIZE: usize = 1000;

struct Entry {
    value: String,
    metadata: JsonValue,
}

/// Ordered in-memory key-value store. The list cursor is the last key of
/// the previous page.
pub struct MemoryKv {
    entries: Mutex<BTreeMap<String, Entry>>,
    page_size: usize,
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Entry>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
impl KvBackend for MemoryKv {
    async fn put(&self, key: &str, value: String, metadata: JsonValue) -> Result<(), StoreError> {
        self.lock()?
            .insert(key.to_string(), Entry { value, metadata });
        Ok(())
    }

    async fn list(&self, prefix: &str, cursor: Option<String>) -> Result<ListPage, StoreError> {
        let entries = self.lock()?;
        let lower = match cursor {
            Some(after) => Bound::Excluded(after),
            None => Bound::Included(prefix.to_string()),
        };

        let mut matching = entries
            .range((lower, Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix));

        let keys: Vec<ListKey> = matching
            .by_ref()
            .take(self.page_size)
            .map(|(k, e)| ListKey {
                name: k.clone(),
                metadata: Some(e.metadata.clone()),
            })
            .collect();

        let list_complete = matching.next().is_none();
        let cursor = if list_complete {
            None
        } else {
            keys.last().map(|k| k.name.clone())
        };

        Ok(ListPage {
            keys,
            cursor,
            list_complete,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.get(key).map(|e| e.value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn lists_by_prefix_in_pages() {
        let kv = MemoryKv::with_page_size(2);
        for key in ["a1", "b1", "b2", "b3", "c1"] {
            kv.put(key, key.to_string(), json!({ "k": key })).await.unwrap();
        }

        let first = kv.list("b", None).await.unwrap();
        assert_eq!(first.keys.len(), 2);
        assert!(!first.list_complete);
        assert_eq!(first.cursor.as_deref(), Some("b2"));

        let second = kv.list("b", first.cursor).await.unwrap();
        assert_eq!(second.keys.len(), 1);
        assert_eq!(second.keys[0].name, "b3");
        assert_eq!(second.keys[0].metadata, Some(json!({ "k": "b3" })));
        assert!(second.list_complete);
        assert_eq!(second.cursor, None);
    }

    #[tokio::test]
    async fn exact_page_is_complete() {
        let kv = MemoryKv::with_page_size(2);
        kv.put("x1", String::new(), json!(null)).await.unwrap();
        kv.put("x2", String::new(), json!(null)).await.unwrap();

        let page = kv.list("x", None).await.unwrap();
        assert_eq!(page.keys.len(), 2);
        assert!(page.list_complete);
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get("nope").await.unwrap(), None);
        assert!(kv.is_empty());
    }
}
