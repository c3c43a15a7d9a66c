use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use skiff_common::{Application, PredictResponse, QueryError, RoutingError};
use skiff_lifecycle::LifecycleManager;
use skiff_registry::Registry;

pub mod client;
pub mod metrics;
pub mod strategy;

use client::ReplicaClient;
use metrics::RouterMetrics;
use strategy::{Candidate, LeastInflight, SelectionStrategy};

/// Result of one query. `cause` is set whenever the default output was
/// returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub response: PredictResponse,
    pub cause: Option<RoutingError>,
}

/// Resolves an application query to a replica of its model's active
/// version and forwards it within the application's latency objective.
pub struct Router {
    registry: Arc<Registry>,
    lifecycle: LifecycleManager,
    client: Arc<dyn ReplicaClient>,
    strategy: Box<dyn SelectionStrategy>,
    retry_max: u32,
    metrics: RouterMetrics,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("strategy", &self.strategy.name())
            .field("retry_max", &self.retry_max)
            .finish()
    }
}

impl Router {
    pub fn new(
        registry: Arc<Registry>,
        lifecycle: LifecycleManager,
        client: Arc<dyn ReplicaClient>,
    ) -> Self {
        Self {
            registry,
            lifecycle,
            client,
            strategy: Box::new(LeastInflight),
            retry_max: 1,
            metrics: RouterMetrics::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn SelectionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Additional replicas tried after an upstream failure.
    pub fn with_retry_max(mut self, retry_max: u32) -> Self {
        self.retry_max = retry_max;
        self
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn metrics(&self) -> &RouterMetrics {
        &self.metrics
    }

    /// Answer a query for `app`.
    ///
    /// Only malformed input is an error. Every routing failure, including an
    /// exhausted latency budget, is masked by the application's default output.
    pub async fn predict(&self, app: &str, input: Value) -> Result<Prediction, QueryError> {
        self.metrics.predictions_total.fetch_add(1, Ordering::Relaxed);

        let Some(application) = self.registry.application(app) else {
            return Ok(self.fallback(
                app,
                Value::Null,
                RoutingError::UnknownApplication(app.to_string()),
            ));
        };

        if let Err(reason) = application.input_type.validate(&input) {
            self.metrics.invalid_input_total.fetch_add(1, Ordering::Relaxed);
            return Err(QueryError::InvalidInput {
                app: app.to_string(),
                reason,
            });
        }

        let budget = Duration::from_micros(application.slo_micros);
        let default_output = Value::String(application.default_output.clone());
        match tokio::time::timeout(budget, self.route(&application, &input)).await {
            Ok(Ok(output)) => Ok(Prediction {
                response: PredictResponse::prediction(output),
                cause: None,
            }),
            Ok(Err(err)) => Ok(self.fallback(app, default_output, err)),
            Err(_) => Ok(self.fallback(
                app,
                default_output,
                RoutingError::SloExceeded {
                    slo_micros: application.slo_micros,
                },
            )),
        }
    }

    async fn route(&self, app: &Application, input: &Value) -> Result<Value, RoutingError> {
        let version = self.registry.resolve(&app.name)?;
        let no_replica = || RoutingError::NoHealthyReplica {
            model: version.model.clone(),
            version: version.version.clone(),
        };

        let mut excluded: Vec<u32> = Vec::new();
        let mut last_err: Option<RoutingError> = None;
        let mut upstream_attempts = 0u32;

        loop {
            let replicas: Vec<_> = self
                .lifecycle
                .routable(&version.model, &version.version)
                .into_iter()
                .filter(|r| !excluded.contains(&r.id))
                .collect();
            let candidates: Vec<Candidate> = replicas
                .iter()
                .map(|r| Candidate {
                    replica_id: r.id,
                    inflight: r.inflight(),
                })
                .collect();

            let Some(replica) = self
                .strategy
                .select(&candidates)
                .and_then(|idx| replicas.get(idx))
            else {
                return Err(last_err.unwrap_or_else(no_replica));
            };

            // Lost a race with a drain; pick another replica.
            let Some(_guard) = replica.try_acquire() else {
                excluded.push(replica.id);
                continue;
            };

            match self.client.predict(replica.endpoint(), input).await {
                Ok(output) => {
                    tracing::debug!(
                        app=%app.name,
                        model=%version.model,
                        version=%version.version,
                        replica_id=replica.id,
                        "prediction served"
                    );
                    return Ok(output);
                }
                Err(e) => {
                    tracing::warn!(
                        app=%app.name,
                        model=%version.model,
                        version=%version.version,
                        replica_id=replica.id,
                        error=%e,
                        "replica call failed"
                    );
                    excluded.push(replica.id);
                    last_err = Some(RoutingError::Upstream {
                        model: version.model.clone(),
                        version: version.version.clone(),
                        reason: e.to_string(),
                    });
                }
            }

            upstream_attempts += 1;
            if upstream_attempts > self.retry_max {
                return Err(last_err.unwrap_or_else(no_replica));
            }
            self.metrics.retries_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn fallback(&self, app: &str, output: Value, cause: RoutingError) -> Prediction {
        self.metrics.defaults_total.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_routing_error(cause.cause());
        tracing::warn!(%app, cause=cause.cause(), error=%cause, "returning default output");
        Prediction {
            response: PredictResponse::fallback(output, cause.to_string()),
            cause: Some(cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use serde_json::json;
    use skiff_common::{Artifact, InputType, ReplicaScaler};
    use skiff_lifecycle::{host::StubHost, LifecycleConfig};

    use crate::client::StubReplicaClient;

    struct Fixture {
        registry: Arc<Registry>,
        lifecycle: LifecycleManager,
    }

    fn fixture() -> Fixture {
        let lifecycle = LifecycleManager::new(
            Arc::new(StubHost::new()),
            LifecycleConfig {
                ready_timeout: Duration::from_millis(200),
                ..LifecycleConfig::default()
            },
        );
        let scaler: Arc<dyn ReplicaScaler> = Arc::new(lifecycle.clone());
        Fixture {
            registry: Registry::new(scaler),
            lifecycle,
        }
    }

    impl Fixture {
        fn router(&self, client: Arc<dyn ReplicaClient>) -> Router {
            Router::new(self.registry.clone(), self.lifecycle.clone(), client)
        }

        fn deploy(&self, model: &str, version: &str, replicas: i64) {
            self.registry
                .deploy_model_version(
                    model,
                    version,
                    InputType::Doubles,
                    Artifact::new(format!("{model}:{version}")),
                    replicas,
                )
                .unwrap();
        }

        async fn wait_ready(&self, model: &str, version: &str, n: usize) {
            for _ in 0..500 {
                if self.lifecycle.health(model, version) == n {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("{model}:{version} never reached {n} ready replicas");
        }
    }

    fn input() -> Value {
        json!([0.1, 0.2, 0.3])
    }

    #[tokio::test]
    async fn test_boston_scenario() {
        let fx = fixture();
        let router = fx.router(Arc::new(StubReplicaClient));

        fx.registry
            .register_application("boston", InputType::Doubles, "-1.0", 100_000)
            .unwrap();

        // Before linking: exactly the default.
        let p = router.predict("boston", input()).await.unwrap();
        assert_eq!(p.response.output, json!("-1.0"));
        assert!(p.response.default);
        assert_eq!(p.cause, Some(RoutingError::NoLink("boston".to_string())));

        fx.deploy("tree-model", "1", 1);
        fx.registry.link("boston", "tree-model").unwrap();
        fx.wait_ready("tree-model", "1", 1).await;
        let p = router.predict("boston", input()).await.unwrap();
        assert_eq!(p.response, PredictResponse::prediction(json!("tree-model:1")));

        fx.registry
            .register_application("boston-new", InputType::Doubles, "-1.0", 100_000)
            .unwrap();
        fx.deploy("forest-model", "1", 1);
        fx.registry.link("boston-new", "forest-model").unwrap();
        fx.deploy("forest-model", "2", 1);
        fx.wait_ready("forest-model", "2", 1).await;
        let p = router.predict("boston-new", input()).await.unwrap();
        assert_eq!(p.response.output, json!("forest-model:2"));

        fx.registry.set_active_version("forest-model", "1").unwrap();
        fx.wait_ready("forest-model", "1", 1).await;
        let p = router.predict("boston-new", input()).await.unwrap();
        assert_eq!(p.response.output, json!("forest-model:1"));
        assert!(!p.response.default);

        // The other application is unaffected.
        let p = router.predict("boston", input()).await.unwrap();
        assert_eq!(p.response.output, json!("tree-model:1"));
    }

    #[tokio::test]
    async fn test_redeploy_after_remove_serves_new_artifact() {
        let fx = fixture();
        let router = fx.router(Arc::new(StubReplicaClient));
        fx.registry
            .deploy_model_version(
                "tree-model",
                "1",
                InputType::Doubles,
                Artifact::new("tree:old"),
                1,
            )
            .unwrap();
        fx.wait_ready("tree-model", "1", 1).await;

        fx.registry.remove_model("tree-model").unwrap();
        fx.registry
            .deploy_model_version(
                "tree-model",
                "1",
                InputType::Doubles,
                Artifact::new("tree:new"),
                1,
            )
            .unwrap();
        fx.registry
            .register_application("boston", InputType::Doubles, "-1.0", 100_000)
            .unwrap();
        fx.registry.link("boston", "tree-model").unwrap();
        fx.wait_ready("tree-model", "1", 1).await;

        let p = router.predict("boston", input()).await.unwrap();
        assert_eq!(p.response, PredictResponse::prediction(json!("tree:new")));
    }

    #[tokio::test]
    async fn test_lifecycle_target_follows_concurrent_registry_writes() {
        let fx = fixture();
        fx.deploy("tree-model", "1", 1);

        let registry = fx.registry.clone();
        let rt = tokio::runtime::Handle::current();
        std::thread::scope(|s| {
            for t in 0..4i64 {
                let registry = &registry;
                let rt = &rt;
                s.spawn(move || {
                    let _rt = rt.enter();
                    for i in 0..200 {
                        registry
                            .set_replica_count("tree-model", "1", (t + i) % 4)
                            .unwrap();
                    }
                });
            }
        });

        let recorded = fx.registry.model("tree-model").unwrap().version("1").unwrap().replicas;
        let desired = fx
            .lifecycle
            .version_health("tree-model", "1")
            .map(|h| h.desired)
            .unwrap_or(0);
        assert_eq!(desired, recorded);
        fx.wait_ready("tree-model", "1", recorded as usize).await;
    }

    #[tokio::test]
    async fn test_unknown_application() {
        let fx = fixture();
        let router = fx.router(Arc::new(StubReplicaClient));
        let p = router.predict("nope", input()).await.unwrap();
        assert_eq!(p.response.output, Value::Null);
        assert!(p.response.default);
        assert_eq!(
            p.cause,
            Some(RoutingError::UnknownApplication("nope".to_string()))
        );
        assert_eq!(router.metrics().routing_errors("unknown_application"), 1);
    }

    #[tokio::test]
    async fn test_invalid_input_is_not_masked() {
        let fx = fixture();
        let router = fx.router(Arc::new(StubReplicaClient));
        fx.registry
            .register_application("boston", InputType::Doubles, "-1.0", 100_000)
            .unwrap();
        let err = router.predict("boston", json!("text")).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidInput { .. }));
        assert_eq!(
            router
                .metrics()
                .invalid_input_total
                .load(Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn test_zero_replicas_yields_default() {
        let fx = fixture();
        let router = fx.router(Arc::new(StubReplicaClient));
        fx.registry
            .register_application("boston", InputType::Doubles, "-1.0", 100_000)
            .unwrap();
        fx.deploy("tree-model", "1", 0);
        fx.registry.link("boston", "tree-model").unwrap();

        let p = router.predict("boston", input()).await.unwrap();
        assert_eq!(p.response.output, json!("-1.0"));
        assert_eq!(
            p.cause,
            Some(RoutingError::NoHealthyReplica {
                model: "tree-model".to_string(),
                version: "1".to_string(),
            })
        );
    }

    struct SlowClient;

    #[async_trait]
    impl ReplicaClient for SlowClient {
        async fn predict(&self, _endpoint: &str, _input: &Value) -> anyhow::Result<Value> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(json!("late"))
        }
    }

    #[tokio::test]
    async fn test_slo_timeout_yields_default_and_releases_guard() {
        let fx = fixture();
        let router = fx.router(Arc::new(SlowClient));
        fx.registry
            .register_application("boston", InputType::Doubles, "-1.0", 20_000)
            .unwrap();
        fx.deploy("tree-model", "1", 1);
        fx.registry.link("boston", "tree-model").unwrap();
        fx.wait_ready("tree-model", "1", 1).await;

        let p = router.predict("boston", input()).await.unwrap();
        assert_eq!(p.response.output, json!("-1.0"));
        assert_eq!(p.cause, Some(RoutingError::SloExceeded { slo_micros: 20_000 }));

        let replica = fx.lifecycle.routable("tree-model", "1").remove(0);
        assert_eq!(replica.inflight(), 0);
    }

    /// Fails the first `failures` calls.
    struct FlakyClient {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReplicaClient for FlakyClient {
        async fn predict(&self, endpoint: &str, input: &Value) -> anyhow::Result<Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                anyhow::bail!("connection reset");
            }
            StubReplicaClient.predict(endpoint, input).await
        }
    }

    #[tokio::test]
    async fn test_retry_uses_another_replica() {
        let fx = fixture();
        let client = Arc::new(FlakyClient {
            failures: 1,
            calls: AtomicUsize::new(0),
        });
        let router = fx.router(client.clone()).with_retry_max(1);
        fx.registry
            .register_application("boston", InputType::Doubles, "-1.0", 1_000_000)
            .unwrap();
        fx.deploy("tree-model", "1", 2);
        fx.registry.link("boston", "tree-model").unwrap();
        fx.wait_ready("tree-model", "1", 2).await;

        let p = router.predict("boston", input()).await.unwrap();
        assert_eq!(p.response.output, json!("tree-model:1"));
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
        assert_eq!(router.metrics().retries_total.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_upstream_failure_without_retry_yields_default() {
        let fx = fixture();
        let client = Arc::new(FlakyClient {
            failures: 1,
            calls: AtomicUsize::new(0),
        });
        let router = fx.router(client.clone()).with_retry_max(0);
        fx.registry
            .register_application("boston", InputType::Doubles, "-1.0", 1_000_000)
            .unwrap();
        fx.deploy("tree-model", "1", 2);
        fx.registry.link("boston", "tree-model").unwrap();
        fx.wait_ready("tree-model", "1", 2).await;

        let p = router.predict("boston", input()).await.unwrap();
        assert!(p.response.default);
        assert!(matches!(p.cause, Some(RoutingError::Upstream { .. })));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_replica_failure_exhausts_candidates() {
        let fx = fixture();
        let client = Arc::new(FlakyClient {
            failures: 5,
            calls: AtomicUsize::new(0),
        });
        let router = fx.router(client.clone()).with_retry_max(3);
        fx.registry
            .register_application("boston", InputType::Doubles, "-1.0", 1_000_000)
            .unwrap();
        fx.deploy("tree-model", "1", 1);
        fx.registry.link("boston", "tree-model").unwrap();
        fx.wait_ready("tree-model", "1", 1).await;

        let p = router.predict("boston", input()).await.unwrap();
        assert!(matches!(p.cause, Some(RoutingError::Upstream { .. })));
        // The failed replica is never tried twice for one query.
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }
}
