use std::sync::atomic::Ordering;
use std::sync::Arc;

use skiff_common::auth::AuthConfig;
use skiff_lifecycle::LifecycleManager;
use skiff_meta::RegistryStore;
use skiff_registry::Registry;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub lifecycle: LifecycleManager,
    pub router: Arc<skiff_router::Router>,
    /// `None` when running without persistence.
    pub store: Option<RegistryStore>,
    pub metrics: Arc<Metrics>,
    pub auth: AuthConfig,
}

impl AsRef<AuthConfig> for AppState {
    fn as_ref(&self) -> &AuthConfig {
        &self.auth
    }
}

// Persistence writes the registry's current view of an entity, so two
// racing mutations both end up storing the latest state.
impl AppState {
    pub async fn sync_application(&self, name: &str) {
        let Some(store) = &self.store else { return };
        let res = match self.registry.application(name) {
            Some(app) => store.put_application(&app).await,
            None => store.delete_application(name).await,
        };
        self.record("application", name, res);
    }

    pub async fn sync_model(&self, name: &str) {
        let Some(store) = &self.store else { return };
        let res = match self.registry.model(name) {
            Some(model) => store.put_model(&model).await,
            None => store.delete_model(name).await,
        };
        self.record("model", name, res);
    }

    pub async fn sync_link(&self, app: &str) {
        let Some(store) = &self.store else { return };
        let res = match self.registry.linked_model(app) {
            Some(model) => {
                store
                    .put_link(&skiff_common::Link {
                        app: app.to_string(),
                        model,
                    })
                    .await
            }
            None => store.delete_link(app).await,
        };
        self.record("link", app, res);
    }

    fn record(&self, kind: &str, name: &str, res: anyhow::Result<()>) {
        if let Err(e) = res {
            self.metrics.persistence_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(%kind, %name, error=%e, "failed to persist registry change");
        }
    }
}
