use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use skiff_common::names::{validate_name, validate_version};
use skiff_common::{
    now_ms, Application, Artifact, InputType, Link, Model, ModelVersion, RegistryError,
    RegistrySnapshot, ReplicaScaler, RoutingError, ScaleTarget,
};

/// Mutations that touch more than one map acquire them in the order
/// applications → models → links, and never hold a guard into a map while
/// writing to that same map. Scale requests are issued while the model's
/// entry is held.
pub struct Registry {
    applications: DashMap<String, Application>,
    models: DashMap<String, Model>,
    /// app name → model name
    links: DashMap<String, String>,
    scaler: Arc<dyn ReplicaScaler>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("applications", &self.applications.len())
            .field("models", &self.models.len())
            .field("links", &self.links.len())
            .finish()
    }
}

fn replica_count(count: i64) -> Result<u32, RegistryError> {
    if count < 0 {
        return Err(RegistryError::InvalidConfig(format!(
            "replica count must be >= 0, got {count}"
        )));
    }
    u32::try_from(count)
        .map_err(|_| RegistryError::InvalidConfig(format!("replica count {count} is too large")))
}

fn scale_target(v: &ModelVersion) -> ScaleTarget {
    ScaleTarget {
        model: v.model.clone(),
        version: v.version.clone(),
        artifact: v.artifact.clone(),
        replicas: v.replicas,
    }
}

impl Registry {
    pub fn new(scaler: Arc<dyn ReplicaScaler>) -> Arc<Self> {
        Arc::new(Self {
            applications: DashMap::new(),
            models: DashMap::new(),
            links: DashMap::new(),
            scaler,
        })
    }

    // ── applications ────────────────────────────────────────────────

    pub fn register_application(
        &self,
        name: &str,
        input_type: InputType,
        default_output: &str,
        slo_micros: i64,
    ) -> Result<Application, RegistryError> {
        validate_name("application", name)?;
        if slo_micros <= 0 {
            return Err(RegistryError::InvalidConfig(format!(
                "latency slo must be > 0 microseconds, got {slo_micros}"
            )));
        }

        match self.applications.entry(name.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyExists(name.to_string())),
            Entry::Vacant(e) => {
                let app = Application {
                    name: name.to_string(),
                    input_type,
                    default_output: default_output.to_string(),
                    slo_micros: slo_micros as u64,
                    created_at_ms: now_ms(),
                };
                e.insert(app.clone());
                tracing::info!(app=%name, input_type=%input_type, slo_micros, "registered application");
                Ok(app)
            }
        }
    }

    pub fn deregister_application(&self, name: &str) -> Result<Application, RegistryError> {
        let (_, app) = self
            .applications
            .remove(name)
            .ok_or_else(|| RegistryError::not_found("application", name))?;
        let unlinked = self.links.remove(name).map(|(_, model)| model);
        tracing::info!(app=%name, unlinked=?unlinked, "deregistered application");
        Ok(app)
    }

    pub fn application(&self, name: &str) -> Option<Application> {
        self.applications.get(name).map(|a| a.value().clone())
    }

    pub fn applications(&self) -> Vec<Application> {
        let mut out: Vec<Application> = self
            .applications
            .iter()
            .map(|a| a.value().clone())
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    // ── models ──────────────────────────────────────────────────────

    /// Add a version to `model`, creating the model on first use.
    ///
    /// The first version is always activated. Later versions are activated
    /// only while the model is unpinned, i.e. nobody has chosen a version
    /// explicitly through [`Registry::set_active_version`].
    pub fn deploy_model_version(
        &self,
        model: &str,
        version: &str,
        input_type: InputType,
        artifact: Artifact,
        replicas: i64,
    ) -> Result<Model, RegistryError> {
        validate_name("model", model)?;
        validate_version(version)?;
        let replicas = replica_count(replicas)?;

        let deployed = ModelVersion {
            model: model.to_string(),
            version: version.to_string(),
            artifact,
            replicas,
            created_at_ms: now_ms(),
        };
        let target = scale_target(&deployed);

        // The scaler is told while the model's entry is still held, so scale
        // requests for a version reach it in the order the registry wrote them.
        let snapshot = match self.models.entry(model.to_string()) {
            Entry::Occupied(mut e) => {
                let m = e.get_mut();
                if m.input_type != input_type {
                    return Err(RegistryError::TypeMismatch {
                        expected: m.input_type,
                        actual: input_type,
                    });
                }
                if m.version(version).is_some() {
                    return Err(RegistryError::VersionExists {
                        model: model.to_string(),
                        version: version.to_string(),
                    });
                }
                m.versions.push(deployed);
                if !m.pinned {
                    m.active_version = version.to_string();
                }
                self.scaler.scale(target);
                m.clone()
            }
            Entry::Vacant(e) => {
                let m = Model {
                    name: model.to_string(),
                    input_type,
                    versions: vec![deployed],
                    active_version: version.to_string(),
                    pinned: false,
                };
                let entry = e.insert(m);
                self.scaler.scale(target);
                entry.value().clone()
            }
        };

        tracing::info!(
            %model,
            %version,
            replicas,
            active=%snapshot.active_version,
            "deployed model version"
        );
        Ok(snapshot)
    }

    /// Point routing for `model` at `version` and pin it. Used for rollback.
    pub fn set_active_version(&self, model: &str, version: &str) -> Result<Model, RegistryError> {
        let mut m = self
            .models
            .get_mut(model)
            .ok_or_else(|| RegistryError::not_found("model", model))?;
        if m.version(version).is_none() {
            return Err(RegistryError::not_found(
                "model version",
                format!("{model}:{version}"),
            ));
        }

        let previous = std::mem::replace(&mut m.active_version, version.to_string());
        m.pinned = true;
        tracing::info!(%model, %previous, active=%version, "switched active version");
        Ok(m.clone())
    }

    /// Record the desired replica count and hand it to the scaler. Returns as
    /// soon as the record is updated; scaling happens in the background.
    pub fn set_replica_count(
        &self,
        model: &str,
        version: &str,
        count: i64,
    ) -> Result<Model, RegistryError> {
        let mut m = self
            .models
            .get_mut(model)
            .ok_or_else(|| RegistryError::not_found("model", model))?;
        let count = replica_count(count)?;
        let v = m.version_mut(version).ok_or_else(|| {
            RegistryError::not_found("model version", format!("{model}:{version}"))
        })?;
        v.replicas = count;
        let target = scale_target(v);

        tracing::info!(%model, %version, replicas=count, "set replica count");
        self.scaler.scale(target);
        Ok(m.clone())
    }

    /// Remove a model and scale all of its versions to zero. Refused while
    /// any application still links to it.
    pub fn remove_model(&self, model: &str) -> Result<Model, RegistryError> {
        let removed = match self.models.entry(model.to_string()) {
            Entry::Vacant(_) => return Err(RegistryError::not_found("model", model)),
            Entry::Occupied(e) => {
                if let Some(link) = self.links.iter().find(|l| l.value() == model) {
                    return Err(RegistryError::InUse {
                        model: model.to_string(),
                        app: link.key().clone(),
                    });
                }
                for v in &e.get().versions {
                    self.scaler.scale(ScaleTarget {
                        replicas: 0,
                        ..scale_target(v)
                    });
                }
                e.remove()
            }
        };

        tracing::info!(%model, versions=removed.versions.len(), "removed model");
        Ok(removed)
    }

    pub fn model(&self, name: &str) -> Option<Model> {
        self.models.get(name).map(|m| m.value().clone())
    }

    pub fn models(&self) -> Vec<Model> {
        let mut out: Vec<Model> = self.models.iter().map(|m| m.value().clone()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    // ── links ───────────────────────────────────────────────────────

    /// Link `app` to `model`, replacing any previous link in one step.
    /// Returns the previously linked model, if any.
    pub fn link(&self, app: &str, model: &str) -> Result<Option<String>, RegistryError> {
        // Both guards are held across the insert so neither side can be
        // removed between the check and the write.
        let app_ref = self
            .applications
            .get(app)
            .ok_or_else(|| RegistryError::not_found("application", app))?;
        let model_ref = self
            .models
            .get(model)
            .ok_or_else(|| RegistryError::not_found("model", model))?;

        if app_ref.input_type != model_ref.input_type {
            return Err(RegistryError::TypeMismatch {
                expected: app_ref.input_type,
                actual: model_ref.input_type,
            });
        }

        let previous = self.links.insert(app.to_string(), model.to_string());
        tracing::info!(%app, %model, previous=?previous, "linked application");
        Ok(previous)
    }

    pub fn unlink(&self, app: &str) -> Result<String, RegistryError> {
        let (_, model) = self
            .links
            .remove(app)
            .ok_or_else(|| RegistryError::not_found("link", app))?;
        tracing::info!(%app, %model, "unlinked application");
        Ok(model)
    }

    pub fn linked_model(&self, app: &str) -> Option<String> {
        self.links.get(app).map(|m| m.value().clone())
    }

    pub fn links(&self) -> Vec<Link> {
        let mut out: Vec<Link> = self
            .links
            .iter()
            .map(|l| Link {
                app: l.key().clone(),
                model: l.value().clone(),
            })
            .collect();
        out.sort_by(|a, b| a.app.cmp(&b.app));
        out
    }

    // ── routing reads ───────────────────────────────────────────────

    /// Resolve an application to the active version of its linked model.
    pub fn resolve(&self, app: &str) -> Result<ModelVersion, RoutingError> {
        if !self.applications.contains_key(app) {
            return Err(RoutingError::UnknownApplication(app.to_string()));
        }
        let model = self
            .linked_model(app)
            .ok_or_else(|| RoutingError::NoLink(app.to_string()))?;
        let m = self
            .models
            .get(&model)
            .ok_or_else(|| RoutingError::NoActiveVersion(model.clone()))?;
        m.active()
            .cloned()
            .ok_or(RoutingError::NoActiveVersion(model))
    }

    // ── persistence ─────────────────────────────────────────────────

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            applications: self.applications(),
            models: self.models(),
            links: self.links(),
        }
    }

    /// Load previously persisted state and re-apply every version's replica
    /// count. Links whose application or model is missing, or whose input
    /// types disagree, are dropped.
    pub fn restore(&self, snapshot: RegistrySnapshot) {
        let RegistrySnapshot {
            applications,
            models,
            links,
        } = snapshot;

        for app in applications {
            self.applications.insert(app.name.clone(), app);
        }

        let mut targets = Vec::new();
        for model in models {
            if model.active().is_none() {
                tracing::warn!(model=%model.name, active=%model.active_version, "skipping model whose active version is missing");
                continue;
            }
            targets.extend(model.versions.iter().map(scale_target));
            self.models.insert(model.name.clone(), model);
        }

        for link in links {
            let app_type = self.applications.get(&link.app).map(|a| a.input_type);
            let model_type = self.models.get(&link.model).map(|m| m.input_type);
            match (app_type, model_type) {
                (Some(expected), Some(actual)) if expected != actual => {
                    let err = RegistryError::TypeMismatch { expected, actual };
                    tracing::warn!(app=%link.app, model=%link.model, error=%err, "dropping link with mismatched input types");
                }
                (Some(_), Some(_)) => {
                    self.links.insert(link.app, link.model);
                }
                _ => {
                    tracing::warn!(app=%link.app, model=%link.model, "dropping dangling link");
                }
            }
        }

        tracing::info!(
            applications = self.applications.len(),
            models = self.models.len(),
            links = self.links.len(),
            "restored registry"
        );
        for target in targets {
            self.scaler.scale(target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingScaler {
        calls: Mutex<Vec<ScaleTarget>>,
    }

    impl RecordingScaler {
        fn calls(&self) -> Vec<ScaleTarget> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ReplicaScaler for RecordingScaler {
        fn scale(&self, target: ScaleTarget) {
            self.calls.lock().unwrap().push(target);
        }
    }

    fn setup() -> (Arc<Registry>, Arc<RecordingScaler>) {
        let scaler = Arc::new(RecordingScaler::default());
        (Registry::new(scaler.clone()), scaler)
    }

    fn deploy(r: &Registry, model: &str, version: &str) -> Result<Model, RegistryError> {
        r.deploy_model_version(
            model,
            version,
            InputType::Doubles,
            Artifact::new(format!("{model}:{version}")),
            1,
        )
    }

    #[test]
    fn test_register_application() {
        let (r, _) = setup();
        let app = r
            .register_application("boston", InputType::Doubles, "-1.0", 100_000)
            .unwrap();
        assert_eq!(app.slo_micros, 100_000);
        assert_eq!(r.application("boston"), Some(app));

        assert_eq!(
            r.register_application("boston", InputType::Ints, "0", 10),
            Err(RegistryError::AlreadyExists("boston".to_string()))
        );
        assert!(matches!(
            r.register_application("other", InputType::Doubles, "-1.0", 0),
            Err(RegistryError::InvalidConfig(_))
        ));
        assert!(matches!(
            r.register_application("other", InputType::Doubles, "-1.0", -5),
            Err(RegistryError::InvalidConfig(_))
        ));
        assert!(matches!(
            r.register_application("Bad_Name", InputType::Doubles, "-1.0", 5),
            Err(RegistryError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_deploy_creates_model_and_scales() {
        let (r, scaler) = setup();
        let m = deploy(&r, "tree-model", "1").unwrap();
        assert_eq!(m.active_version, "1");
        assert!(!m.pinned);

        let calls = scaler.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "tree-model");
        assert_eq!(calls[0].version, "1");
        assert_eq!(calls[0].replicas, 1);
        assert_eq!(calls[0].artifact, Artifact::new("tree-model:1"));
    }

    #[test]
    fn test_deploy_rejects_duplicates_and_type_conflicts() {
        let (r, scaler) = setup();
        deploy(&r, "tree-model", "1").unwrap();

        assert_eq!(
            deploy(&r, "tree-model", "1"),
            Err(RegistryError::VersionExists {
                model: "tree-model".to_string(),
                version: "1".to_string(),
            })
        );
        assert_eq!(
            r.deploy_model_version("tree-model", "2", InputType::Ints, Artifact::new("x"), 1),
            Err(RegistryError::TypeMismatch {
                expected: InputType::Doubles,
                actual: InputType::Ints,
            })
        );
        assert!(matches!(
            r.deploy_model_version("tree-model", "3", InputType::Doubles, Artifact::new("x"), -1),
            Err(RegistryError::InvalidConfig(_))
        ));
        // Failed deploys never reach the scaler.
        assert_eq!(scaler.calls().len(), 1);
        assert_eq!(r.model("tree-model").unwrap().versions.len(), 1);
    }

    #[test]
    fn test_new_versions_auto_activate_until_pinned() {
        let (r, _) = setup();
        deploy(&r, "forest-model", "1").unwrap();
        assert_eq!(deploy(&r, "forest-model", "2").unwrap().active_version, "2");

        let m = r.set_active_version("forest-model", "1").unwrap();
        assert_eq!(m.active_version, "1");
        assert!(m.pinned);

        // Pinned: deploying v3 keeps v1 active.
        assert_eq!(deploy(&r, "forest-model", "3").unwrap().active_version, "1");

        // Explicit selection still works on a pinned model.
        assert_eq!(
            r.set_active_version("forest-model", "3").unwrap().active_version,
            "3"
        );
    }

    #[test]
    fn test_set_active_version_not_found() {
        let (r, _) = setup();
        assert!(matches!(
            r.set_active_version("nope", "1"),
            Err(RegistryError::NotFound { kind: "model", .. })
        ));
        deploy(&r, "tree-model", "1").unwrap();
        assert!(matches!(
            r.set_active_version("tree-model", "9"),
            Err(RegistryError::NotFound { kind: "model version", .. })
        ));
        assert_eq!(r.model("tree-model").unwrap().active_version, "1");
    }

    #[test]
    fn test_rollback_keeps_versions_intact() {
        let (r, _) = setup();
        deploy(&r, "forest-model", "1").unwrap();
        deploy(&r, "forest-model", "2").unwrap();
        r.register_application("boston-new", InputType::Doubles, "-1.0", 100_000)
            .unwrap();
        r.link("boston-new", "forest-model").unwrap();

        assert_eq!(r.resolve("boston-new").unwrap().version, "2");
        r.set_active_version("forest-model", "1").unwrap();
        let v1 = r.resolve("boston-new").unwrap();
        assert_eq!(v1.version, "1");
        assert_eq!(v1.artifact, Artifact::new("forest-model:1"));

        let m = r.model("forest-model").unwrap();
        assert_eq!(m.versions.len(), 2);
        assert_eq!(m.version("2").unwrap().artifact, Artifact::new("forest-model:2"));

        r.set_active_version("forest-model", "2").unwrap();
        assert_eq!(r.resolve("boston-new").unwrap().version, "2");
    }

    #[test]
    fn test_link_checks() {
        let (r, _) = setup();
        r.register_application("boston", InputType::Doubles, "-1.0", 100_000)
            .unwrap();
        assert!(matches!(
            r.link("boston", "tree-model"),
            Err(RegistryError::NotFound { kind: "model", .. })
        ));
        deploy(&r, "tree-model", "1").unwrap();
        assert!(matches!(
            r.link("nope", "tree-model"),
            Err(RegistryError::NotFound { kind: "application", .. })
        ));

        r.deploy_model_version("int-model", "1", InputType::Ints, Artifact::new("i"), 1)
            .unwrap();
        assert_eq!(
            r.link("boston", "int-model"),
            Err(RegistryError::TypeMismatch {
                expected: InputType::Doubles,
                actual: InputType::Ints,
            })
        );
        assert_eq!(r.linked_model("boston"), None);

        assert_eq!(r.link("boston", "tree-model"), Ok(None));
        deploy(&r, "forest-model", "1").unwrap();
        assert_eq!(
            r.link("boston", "forest-model"),
            Ok(Some("tree-model".to_string()))
        );
        assert_eq!(r.links().len(), 1);
        assert_eq!(r.linked_model("boston").as_deref(), Some("forest-model"));

        assert_eq!(r.unlink("boston"), Ok("forest-model".to_string()));
        assert!(r.unlink("boston").is_err());
    }

    #[test]
    fn test_set_replica_count() {
        let (r, scaler) = setup();
        deploy(&r, "tree-model", "1").unwrap();

        assert!(matches!(
            r.set_replica_count("tree-model", "1", -1),
            Err(RegistryError::InvalidConfig(_))
        ));
        assert!(matches!(
            r.set_replica_count("tree-model", "2", 3),
            Err(RegistryError::NotFound { .. })
        ));
        assert!(matches!(
            r.set_replica_count("nope", "1", 3),
            Err(RegistryError::NotFound { .. })
        ));

        let m = r.set_replica_count("tree-model", "1", 3).unwrap();
        assert_eq!(m.version("1").unwrap().replicas, 3);
        let last = scaler.calls().pop().unwrap();
        assert_eq!((last.version.as_str(), last.replicas), ("1", 3));

        r.set_replica_count("tree-model", "1", 0).unwrap();
        assert_eq!(scaler.calls().pop().unwrap().replicas, 0);
    }

    #[test]
    fn test_remove_model_refused_while_linked() {
        let (r, scaler) = setup();
        deploy(&r, "tree-model", "1").unwrap();
        deploy(&r, "tree-model", "2").unwrap();
        r.register_application("boston", InputType::Doubles, "-1.0", 100_000)
            .unwrap();
        r.link("boston", "tree-model").unwrap();

        assert_eq!(
            r.remove_model("tree-model"),
            Err(RegistryError::InUse {
                model: "tree-model".to_string(),
                app: "boston".to_string(),
            })
        );

        r.deregister_application("boston").unwrap();
        assert_eq!(r.linked_model("boston"), None);
        r.remove_model("tree-model").unwrap();
        assert!(r.model("tree-model").is_none());

        let zeroed: Vec<_> = scaler
            .calls()
            .into_iter()
            .filter(|t| t.replicas == 0)
            .map(|t| t.version)
            .collect();
        assert_eq!(zeroed, vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn test_resolve_errors() {
        let (r, _) = setup();
        assert_eq!(
            r.resolve("boston"),
            Err(RoutingError::UnknownApplication("boston".to_string()))
        );
        r.register_application("boston", InputType::Doubles, "-1.0", 100_000)
            .unwrap();
        assert_eq!(
            r.resolve("boston"),
            Err(RoutingError::NoLink("boston".to_string()))
        );
    }

    #[test]
    fn test_snapshot_restore() {
        let (r, _) = setup();
        r.register_application("boston", InputType::Doubles, "-1.0", 100_000)
            .unwrap();
        deploy(&r, "tree-model", "1").unwrap();
        r.set_replica_count("tree-model", "1", 2).unwrap();
        r.link("boston", "tree-model").unwrap();
        let mut snapshot = r.snapshot();
        snapshot.links.push(Link {
            app: "ghost".to_string(),
            model: "tree-model".to_string(),
        });
        let clean = r.snapshot();

        // A hand-edited store: an ints application linked to a doubles model.
        let counter = r
            .register_application("counter", InputType::Ints, "0", 1_000)
            .unwrap();
        snapshot.applications.push(counter.clone());
        snapshot.links.push(Link {
            app: "counter".to_string(),
            model: "tree-model".to_string(),
        });

        let (restored, scaler) = setup();
        restored.restore(snapshot);
        assert_eq!(restored.linked_model("counter"), None);
        assert_eq!(restored.application("counter"), Some(counter));
        restored.deregister_application("counter").unwrap();
        assert_eq!(restored.snapshot(), clean);
        let calls = scaler.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].replicas, 2);
    }

    /// Holds up the first scale request for `stall_on` replicas until
    /// released, recording every request it receives.
    struct StallingScaler {
        stall_on: u32,
        entered: AtomicBool,
        calls: Mutex<Vec<ScaleTarget>>,
    }

    impl StallingScaler {
        fn new(stall_on: u32) -> Arc<Self> {
            Arc::new(Self {
                stall_on,
                entered: AtomicBool::new(false),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn wait_entered(&self) {
            while !self.entered.load(Ordering::SeqCst) {
                std::thread::yield_now();
            }
        }

        fn last(&self) -> ScaleTarget {
            self.calls.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl ReplicaScaler for StallingScaler {
        fn scale(&self, target: ScaleTarget) {
            if target.replicas == self.stall_on && !self.entered.swap(true, Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(100));
            }
            self.calls.lock().unwrap().push(target);
        }
    }

    #[test]
    fn test_scale_requests_follow_registry_write_order() {
        let scaler = StallingScaler::new(3);
        let r = Registry::new(scaler.clone());
        deploy(&r, "tree-model", "1").unwrap();

        std::thread::scope(|s| {
            s.spawn(|| r.set_replica_count("tree-model", "1", 3).unwrap());
            scaler.wait_entered();
            s.spawn(|| r.set_replica_count("tree-model", "1", 5).unwrap());
        });

        let recorded = r.model("tree-model").unwrap().version("1").unwrap().replicas;
        assert_eq!(recorded, 5);
        assert_eq!(scaler.last().replicas, 5);
    }

    #[test]
    fn test_redeploy_racing_remove_keeps_scaler_in_step() {
        let scaler = StallingScaler::new(0);
        let r = Registry::new(scaler.clone());
        deploy(&r, "tree-model", "1").unwrap();

        std::thread::scope(|s| {
            s.spawn(|| r.remove_model("tree-model").unwrap());
            scaler.wait_entered();
            s.spawn(|| {
                r.deploy_model_version(
                    "tree-model",
                    "1",
                    InputType::Doubles,
                    Artifact::new("tree:rebuilt"),
                    1,
                )
                .unwrap()
            });
        });

        let v = r.model("tree-model").unwrap().version("1").cloned().unwrap();
        assert_eq!(v.artifact.image, "tree:rebuilt");
        let last = scaler.last();
        assert_eq!((last.replicas, last.artifact), (v.replicas, v.artifact));
    }

    #[test]
    fn test_concurrent_relink_and_rollback_are_atomic() {
        let (r, _) = setup();
        r.register_application("boston", InputType::Doubles, "-1.0", 100_000)
            .unwrap();
        deploy(&r, "tree-model", "1").unwrap();
        deploy(&r, "forest-model", "1").unwrap();
        deploy(&r, "forest-model", "2").unwrap();
        r.link("boston", "tree-model").unwrap();

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..2_000 {
                    let model = if i % 2 == 0 { "forest-model" } else { "tree-model" };
                    r.link("boston", model).unwrap();
                }
            });
            s.spawn(|| {
                for i in 0..2_000 {
                    let version = if i % 2 == 0 { "1" } else { "2" };
                    r.set_active_version("forest-model", version).unwrap();
                }
            });
            for _ in 0..2 {
                s.spawn(|| {
                    for _ in 0..2_000 {
                        let v = r.resolve("boston").expect("always resolvable");
                        let expected = match v.model.as_str() {
                            "tree-model" => vec!["1"],
                            "forest-model" => vec!["1", "2"],
                            other => panic!("unexpected model {other}"),
                        };
                        assert!(expected.contains(&v.version.as_str()));
                        assert_eq!(v.artifact.image, format!("{}:{}", v.model, v.version));
                    }
                });
            }
        });
    }
}
