use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;

use skiff_common::{
    Artifact, DeploymentError, ReplicaInfo, ReplicaScaler, ReplicaStatus, ScaleTarget,
    VersionHealth,
};

use crate::config::LifecycleConfig;
use crate::host::{ContainerHost, ReplicaSpec};
use crate::metrics::LifecycleMetrics;
use crate::replica::Replica;

const DRAIN_POLL: Duration = Duration::from_millis(20);
const READY_POLL: Duration = Duration::from_millis(200);
const MAX_START_BACKOFF: Duration = Duration::from_secs(30);

type VersionKey = (String, String);

/// Replica set of one model version.
struct ReplicaPool {
    model: String,
    version: String,
    /// Artifact new replicas start from, with a generation that is bumped
    /// whenever the version is redeployed with a different artifact.
    artifact: Mutex<(u64, Artifact)>,
    desired: AtomicU32,
    replicas: DashMap<u32, Arc<Replica>>,
    next_replica_id: AtomicU32,
    last_error: Mutex<Option<String>>,
    /// Serializes convergence passes for this version.
    converge: tokio::sync::Mutex<()>,
}

impl ReplicaPool {
    fn new(target: &ScaleTarget) -> Self {
        Self {
            model: target.model.clone(),
            version: target.version.clone(),
            artifact: Mutex::new((0, target.artifact.clone())),
            desired: AtomicU32::new(target.replicas),
            replicas: DashMap::new(),
            next_replica_id: AtomicU32::new(0),
            last_error: Mutex::new(None),
            converge: tokio::sync::Mutex::new(()),
        }
    }

    fn current_artifact(&self) -> (u64, Artifact) {
        self.artifact
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn generation(&self) -> u64 {
        self.artifact.lock().unwrap_or_else(PoisonError::into_inner).0
    }

    /// Returns true if `artifact` differs from the current one, in which case
    /// every running replica is now stale.
    fn replace_artifact(&self, artifact: &Artifact) -> bool {
        let mut current = self.artifact.lock().unwrap_or_else(PoisonError::into_inner);
        if current.1 == *artifact {
            return false;
        }
        *current = (current.0 + 1, artifact.clone());
        true
    }

    fn matching(&self, keep: impl Fn(&Replica) -> bool) -> Vec<Arc<Replica>> {
        let mut out: Vec<Arc<Replica>> = self
            .replicas
            .iter()
            .filter(|r| keep(r.value()))
            .map(|r| Arc::clone(r.value()))
            .collect();
        out.sort_by_key(|r| r.id);
        out
    }

    /// Replicas that count toward the desired number.
    fn live(&self) -> Vec<Arc<Replica>> {
        let generation = self.generation();
        self.matching(|r| r.generation == generation && r.status() != ReplicaStatus::Draining)
    }

    /// Replicas still running a replaced artifact.
    fn stale(&self) -> Vec<Arc<Replica>> {
        let generation = self.generation();
        self.matching(|r| r.generation != generation && r.status() != ReplicaStatus::Draining)
    }

    fn routable(&self) -> Vec<Arc<Replica>> {
        let generation = self.generation();
        self.matching(|r| r.generation == generation && r.status() == ReplicaStatus::Ready)
    }

    fn set_last_error(&self, err: Option<String>) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = err;
    }

    fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn health(&self) -> VersionHealth {
        let generation = self.generation();
        let mut healthy = 0;
        let mut draining = 0;
        for r in self.replicas.iter() {
            match r.status() {
                ReplicaStatus::Ready if r.generation == generation => healthy += 1,
                ReplicaStatus::Draining => draining += 1,
                _ => {}
            }
        }
        VersionHealth {
            model: self.model.clone(),
            version: self.version.clone(),
            desired: self.desired.load(Ordering::SeqCst),
            healthy,
            draining,
            last_error: self.last_error(),
        }
    }

    fn is_idle(&self) -> bool {
        self.desired.load(Ordering::SeqCst) == 0
            && self.replicas.is_empty()
            && self.last_error().is_none()
    }
}

struct Inner {
    host: Arc<dyn ContainerHost>,
    config: LifecycleConfig,
    metrics: Arc<LifecycleMetrics>,
    pools: DashMap<VersionKey, Arc<ReplicaPool>>,
}

/// Owns every replica in the process and converges each version's replica
/// set toward its desired count.
///
/// Registered with the registry as its [`ReplicaScaler`]; `scale` records
/// the target and returns, the work happens on spawned tasks.
#[derive(Clone)]
pub struct LifecycleManager {
    inner: Arc<Inner>,
}

impl LifecycleManager {
    pub fn new(host: Arc<dyn ContainerHost>, config: LifecycleConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                host,
                config,
                metrics: Arc::new(LifecycleMetrics::default()),
                pools: DashMap::new(),
            }),
        }
    }

    pub fn metrics(&self) -> Arc<LifecycleMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn host_kind(&self) -> &'static str {
        self.inner.host.kind()
    }

    /// Number of `Ready` replicas of a version.
    pub fn health(&self, model: &str, version: &str) -> usize {
        self.routable(model, version).len()
    }

    /// `Ready` replicas of a version, ordered by replica id.
    pub fn routable(&self, model: &str, version: &str) -> Vec<Arc<Replica>> {
        match self.inner.pool(model, version) {
            Some(pool) => pool.routable(),
            None => Vec::new(),
        }
    }

    pub fn replicas(&self) -> Vec<ReplicaInfo> {
        let mut out: Vec<ReplicaInfo> = self
            .inner
            .pools
            .iter()
            .flat_map(|p| {
                p.replicas
                    .iter()
                    .map(|r| r.info())
                    .collect::<Vec<_>>()
            })
            .collect();
        out.sort_by(|a, b| {
            (&a.model, &a.version, a.replica_id).cmp(&(&b.model, &b.version, b.replica_id))
        });
        out
    }

    pub fn version_health(&self, model: &str, version: &str) -> Option<VersionHealth> {
        self.inner.pool(model, version).map(|p| p.health())
    }

    /// Health of every version that is wanted, running or failing.
    pub fn version_healths(&self) -> Vec<VersionHealth> {
        let mut out: Vec<VersionHealth> = self
            .inner
            .pools
            .iter()
            .filter(|p| !p.is_idle())
            .map(|p| p.health())
            .collect();
        out.sort_by(|a, b| (&a.model, &a.version).cmp(&(&b.model, &b.version)));
        out
    }

    /// Probe replicas every `health_interval` until the task is aborted.
    pub fn spawn_health_loop(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.config.health_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                inner.health_tick().await;
            }
        })
    }

    /// Run one health pass. Exposed for callers that drive probing themselves.
    pub async fn check_health(&self) {
        self.inner.health_tick().await;
    }

    /// Stop every replica without waiting for in-flight requests.
    pub async fn shutdown(&self) {
        let pools: Vec<Arc<ReplicaPool>> =
            self.inner.pools.iter().map(|p| Arc::clone(p.value())).collect();
        let mut stopped = 0usize;
        for pool in pools {
            pool.desired.store(0, Ordering::SeqCst);
            for replica in pool.matching(|_| true) {
                replica.begin_drain();
                self.inner.stop_replica(&pool, &replica).await;
                stopped += 1;
            }
        }
        tracing::info!(stopped, "lifecycle manager shut down");
    }
}

impl ReplicaScaler for LifecycleManager {
    fn scale(&self, target: ScaleTarget) {
        let key = (target.model.clone(), target.version.clone());
        // `desired` is written under the map entry so an idle pool is never
        // forgotten between here and the write.
        let pool = match self.inner.pools.entry(key) {
            Entry::Occupied(e) => {
                let pool = Arc::clone(e.get());
                if pool.replace_artifact(&target.artifact) {
                    tracing::info!(
                        model=%target.model,
                        version=%target.version,
                        image=%target.artifact.image,
                        "artifact changed, replacing running replicas"
                    );
                }
                let previous = pool.desired.swap(target.replicas, Ordering::SeqCst);
                tracing::info!(
                    model=%target.model,
                    version=%target.version,
                    previous,
                    desired=target.replicas,
                    "scale requested"
                );
                pool
            }
            Entry::Vacant(_) if target.replicas == 0 => return,
            Entry::Vacant(e) => {
                tracing::info!(
                    model=%target.model,
                    version=%target.version,
                    desired=target.replicas,
                    "scale requested"
                );
                Arc::clone(e.insert(Arc::new(ReplicaPool::new(&target))).value())
            }
        };
        self.inner.spawn_converge(pool);
    }
}

impl Inner {
    fn pool(&self, model: &str, version: &str) -> Option<Arc<ReplicaPool>> {
        self.pools
            .get(&(model.to_string(), version.to_string()))
            .map(|p| Arc::clone(p.value()))
    }

    /// Drop a pool that is no longer wanted and has nothing running. A pool
    /// that was replaced or rescaled in the meantime is left alone.
    fn forget_if_idle(&self, pool: &ReplicaPool) {
        let key = (pool.model.clone(), pool.version.clone());
        let removed = self
            .pools
            .remove_if(&key, |_, p| std::ptr::eq(Arc::as_ptr(p), pool) && p.is_idle());
        if removed.is_some() {
            tracing::debug!(model=%pool.model, version=%pool.version, "released idle replica pool");
        }
    }

    fn spawn_converge(self: &Arc<Self>, pool: Arc<ReplicaPool>) {
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            tracing::error!(model=%pool.model, version=%pool.version, "no async runtime, cannot converge");
            return;
        };
        let inner = Arc::clone(self);
        rt.spawn(async move { inner.converge(&pool).await });
    }

    /// Start or drain replicas until the live count matches `desired`.
    /// Re-reads `desired` every step so a newer target supersedes an older
    /// one mid-pass.
    async fn converge(self: &Arc<Self>, pool: &Arc<ReplicaPool>) {
        let _serial = pool.converge.lock().await;
        loop {
            for replica in pool.stale() {
                self.drain(pool, replica);
            }
            let desired = pool.desired.load(Ordering::SeqCst) as usize;
            let live = pool.live();

            if live.len() < desired {
                match self.start_replica(pool).await {
                    Ok(_) => pool.set_last_error(None),
                    Err(err) => {
                        self.metrics.start_failures.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(
                            model=%err.model,
                            version=%err.version,
                            reason=%err.reason,
                            "replica start failed"
                        );
                        pool.set_last_error(Some(err.to_string()));
                        // The health loop re-converges versions below target.
                        return;
                    }
                }
            } else if live.len() > desired {
                // Prefer retiring replicas that are not serving, then the newest.
                let victim = live
                    .iter()
                    .filter(|r| r.status() != ReplicaStatus::Ready)
                    .max_by_key(|r| r.id)
                    .or_else(|| live.iter().max_by_key(|r| r.id))
                    .map(Arc::clone);
                if let Some(victim) = victim {
                    self.drain(pool, victim);
                }
            } else {
                tracing::debug!(model=%pool.model, version=%pool.version, replicas=desired, "converged");
                if desired == 0 {
                    pool.set_last_error(None);
                    self.forget_if_idle(pool);
                }
                return;
            }
        }
    }

    async fn start_replica(
        self: &Arc<Self>,
        pool: &Arc<ReplicaPool>,
    ) -> Result<Arc<Replica>, DeploymentError> {
        let (generation, artifact) = pool.current_artifact();
        let spec = ReplicaSpec {
            model: pool.model.clone(),
            version: pool.version.clone(),
            replica_id: pool.next_replica_id.fetch_add(1, Ordering::SeqCst),
            artifact,
        };

        let attempts = self.config.start_retry_max.max(1);
        let mut backoff = self.config.start_backoff;
        let mut attempt = 1;
        loop {
            match self.start_once(pool, &spec, generation).await {
                Ok(replica) => {
                    self.metrics.replicas_started.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(
                        model=%spec.model,
                        version=%spec.version,
                        replica_id=spec.replica_id,
                        endpoint=%replica.endpoint(),
                        "replica ready"
                    );
                    return Ok(replica);
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        model=%spec.model,
                        version=%spec.version,
                        replica_id=spec.replica_id,
                        attempt,
                        error=%e,
                        "replica start failed, retrying in {:?}",
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_START_BACKOFF);
                    attempt += 1;
                }
                Err(e) => {
                    return Err(DeploymentError {
                        model: spec.model,
                        version: spec.version,
                        reason: format!("{e:#} (after {attempt} attempts)"),
                    });
                }
            }
        }
    }

    /// Launch one instance and wait for its first successful probe. The
    /// replica is visible as `Starting` while waiting.
    async fn start_once(
        &self,
        pool: &ReplicaPool,
        spec: &ReplicaSpec,
        generation: u64,
    ) -> anyhow::Result<Arc<Replica>> {
        let handle = self.host.start(spec).await?;
        let replica = Arc::new(Replica::starting(
            &spec.model,
            &spec.version,
            spec.replica_id,
            generation,
            handle,
        ));
        pool.replicas.insert(replica.id, Arc::clone(&replica));

        let deadline = tokio::time::Instant::now() + self.config.ready_timeout;
        loop {
            if self.host.health_check(&replica.handle).await {
                if replica.mark_ready() {
                    return Ok(replica);
                }
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(READY_POLL).await;
        }

        pool.replicas.remove(&replica.id);
        if let Err(e) = self.host.stop(&replica.handle).await {
            tracing::warn!(instance_id=%replica.handle.instance_id, error=%e, "failed to stop unready instance");
        }
        anyhow::bail!(
            "instance {} not ready within {:?}",
            replica.handle.instance_id,
            self.config.ready_timeout
        )
    }

    /// Mark a replica draining (unroutable from now on) and stop it on a
    /// background task once in-flight requests finish or the grace elapses.
    fn drain(self: &Arc<Self>, pool: &Arc<ReplicaPool>, replica: Arc<Replica>) {
        if !replica.begin_drain() {
            return;
        }
        tracing::info!(
            model=%replica.model,
            version=%replica.version,
            replica_id=replica.id,
            inflight=replica.inflight(),
            "draining replica"
        );

        let inner = Arc::clone(self);
        let pool = Arc::clone(pool);
        tokio::spawn(async move {
            let deadline = tokio::time::Instant::now() + inner.config.drain_grace;
            while replica.inflight() > 0 && tokio::time::Instant::now() < deadline {
                tokio::time::sleep(DRAIN_POLL).await;
            }
            if replica.inflight() > 0 {
                tracing::warn!(
                    model=%replica.model,
                    version=%replica.version,
                    replica_id=replica.id,
                    inflight=replica.inflight(),
                    "drain grace elapsed, stopping with requests in flight"
                );
            }
            inner.stop_replica(&pool, &replica).await;
        });
    }

    async fn stop_replica(&self, pool: &ReplicaPool, replica: &Replica) {
        if let Err(e) = self.host.stop(&replica.handle).await {
            tracing::warn!(
                model=%replica.model,
                version=%replica.version,
                replica_id=replica.id,
                error=%e,
                "failed to stop replica"
            );
        }
        if pool.replicas.remove(&replica.id).is_some() {
            self.metrics.replicas_stopped.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                model=%replica.model,
                version=%replica.version,
                replica_id=replica.id,
                "replica stopped"
            );
        }
        self.forget_if_idle(pool);
    }

    async fn health_tick(self: &Arc<Self>) {
        let pools: Vec<Arc<ReplicaPool>> =
            self.pools.iter().map(|p| Arc::clone(p.value())).collect();

        for pool in pools {
            let probed = pool.matching(|r| {
                matches!(r.status(), ReplicaStatus::Ready | ReplicaStatus::Unhealthy)
            });
            for replica in probed {
                let healthy = self.host.health_check(&replica.handle).await;
                let failures = replica.record_probe(healthy);
                if healthy {
                    if replica.mark_recovered() {
                        tracing::info!(model=%replica.model, version=%replica.version, replica_id=replica.id, "replica recovered");
                    }
                    continue;
                }

                self.metrics
                    .health_check_failures
                    .fetch_add(1, Ordering::Relaxed);
                if failures >= self.config.replace_threshold {
                    tracing::warn!(
                        model=%replica.model,
                        version=%replica.version,
                        replica_id=replica.id,
                        failures,
                        "replacing unhealthy replica"
                    );
                    self.drain(&pool, replica);
                } else if failures >= self.config.unhealthy_threshold && replica.mark_unhealthy() {
                    tracing::warn!(
                        model=%replica.model,
                        version=%replica.version,
                        replica_id=replica.id,
                        failures,
                        "replica marked unhealthy"
                    );
                }
            }

            let desired = pool.desired.load(Ordering::SeqCst) as usize;
            // Skip versions whose convergence is already running.
            let idle = pool.converge.try_lock().is_ok();
            if idle && (pool.live().len() != desired || !pool.stale().is_empty()) {
                self.spawn_converge(pool);
            }
        }
    }
}
