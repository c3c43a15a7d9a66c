use std::sync::Arc;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

use skiff_common::{Application, Link, Model, RegistrySnapshot};

use crate::types::MetaStore;

const APPLICATIONS_PREFIX: &str = "/skiff/applications/";
const MODELS_PREFIX: &str = "/skiff/models/";
const LINKS_PREFIX: &str = "/skiff/links/";

/// Typed persistence of registry entities as JSON, one key per entity.
///
/// Layout:
/// - `/skiff/applications/{name}` → `Application`
/// - `/skiff/models/{name}` → `Model` (with all versions)
/// - `/skiff/links/{app}` → `Link`
#[derive(Clone)]
pub struct RegistryStore {
    store: Arc<dyn MetaStore>,
}

impl RegistryStore {
    pub fn new(store: Arc<dyn MetaStore>) -> Self {
        Self { store }
    }

    pub async fn put_application(&self, app: &Application) -> Result<()> {
        self.put_json(&format!("{APPLICATIONS_PREFIX}{}", app.name), app)
            .await
    }

    pub async fn delete_application(&self, name: &str) -> Result<()> {
        self.store
            .delete(&format!("{APPLICATIONS_PREFIX}{name}"))
            .await?;
        Ok(())
    }

    pub async fn put_model(&self, model: &Model) -> Result<()> {
        self.put_json(&format!("{MODELS_PREFIX}{}", model.name), model)
            .await
    }

    pub async fn delete_model(&self, name: &str) -> Result<()> {
        self.store.delete(&format!("{MODELS_PREFIX}{name}")).await?;
        Ok(())
    }

    pub async fn put_link(&self, link: &Link) -> Result<()> {
        self.put_json(&format!("{LINKS_PREFIX}{}", link.app), link)
            .await
    }

    pub async fn delete_link(&self, app: &str) -> Result<()> {
        self.store.delete(&format!("{LINKS_PREFIX}{app}")).await?;
        Ok(())
    }

    /// Read back everything. Entries that fail to decode are skipped with a
    /// warning rather than failing startup.
    pub async fn load(&self) -> Result<RegistrySnapshot> {
        Ok(RegistrySnapshot {
            applications: self.list_json(APPLICATIONS_PREFIX).await?,
            models: self.list_json(MODELS_PREFIX).await?,
            links: self.list_json(LINKS_PREFIX).await?,
        })
    }

    async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.store.put(key, bytes).await?;
        Ok(())
    }

    async fn list_json<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        let mut out = Vec::new();
        for (key, value, _rev) in self.store.list_prefix(prefix).await? {
            match serde_json::from_slice::<T>(&value) {
                Ok(v) => out.push(v),
                Err(e) => tracing::warn!(%key, error=%e, "skipping undecodable registry entry"),
            }
        }
        Ok(out)
    }
}
