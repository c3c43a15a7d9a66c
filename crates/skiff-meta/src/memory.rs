use std::{collections::BTreeMap, sync::Arc};

use anyhow::Result;
use tokio::sync::RwLock;

use crate::types::MetaStore;

/// In-process store used when no etcd endpoint is configured, and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetaStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    revision: u64,
    kv: BTreeMap<String, (Vec<u8>, u64)>,
}

impl MemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn next_revision(&mut self) -> u64 {
        self.revision = self.revision.saturating_add(1);
        self.revision
    }
}

#[async_trait::async_trait]
impl MetaStore for MemoryMetaStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let rev = inner.next_revision();
        inner.kv.insert(key.to_string(), (value, rev));
        Ok(rev)
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        let mut inner = self.inner.write().await;
        inner.kv.remove(key);
        Ok(inner.next_revision())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>, u64)>> {
        let inner = self.inner.read().await;
        Ok(inner
            .kv
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, (v, rev))| (k.clone(), v.clone(), *rev))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_prefix_is_bounded() {
        let store = MemoryMetaStore::new();
        store.put("/skiff/links/a", b"1".to_vec()).await.unwrap();
        store.put("/skiff/links/b", b"2".to_vec()).await.unwrap();
        store.put("/skiff/models/a", b"3".to_vec()).await.unwrap();

        let links = store.list_prefix("/skiff/links/").await.unwrap();
        let keys: Vec<&str> = links.iter().map(|(k, _, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["/skiff/links/a", "/skiff/links/b"]);
    }

    #[tokio::test]
    async fn test_revisions_increase() {
        let store = MemoryMetaStore::new();
        let r1 = store.put("k", b"v1".to_vec()).await.unwrap();
        let r2 = store.put("k", b"v2".to_vec()).await.unwrap();
        assert!(r2 > r1);
        assert_eq!(
            store.list_prefix("k").await.unwrap(),
            vec![("k".to_string(), b"v2".to_vec(), r2)]
        );

        let r3 = store.delete("k").await.unwrap();
        assert!(r3 > r2);
        assert!(store.list_prefix("k").await.unwrap().is_empty());
    }
}
