use async_trait::async_trait;
use dashmap::DashMap;

use super::{ContainerHost, InstanceHandle, ReplicaSpec};

/// In-memory host: instances exist as soon as they are started and stay
/// healthy until stopped. Endpoints are `stub://{image}`.
#[derive(Debug, Default)]
pub struct StubHost {
    instances: DashMap<String, ReplicaSpec>,
}

impl StubHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instances started and not yet stopped.
    pub fn running(&self) -> usize {
        self.instances.len()
    }
}

#[async_trait]
impl ContainerHost for StubHost {
    fn kind(&self) -> &'static str {
        "stub"
    }

    async fn start(&self, spec: &ReplicaSpec) -> anyhow::Result<InstanceHandle> {
        let instance_id = format!("stub-{}", uuid::Uuid::new_v4());
        self.instances.insert(instance_id.clone(), spec.clone());
        Ok(InstanceHandle {
            instance_id,
            endpoint: format!("stub://{}", spec.artifact.image),
        })
    }

    async fn stop(&self, handle: &InstanceHandle) -> anyhow::Result<()> {
        self.instances.remove(&handle.instance_id);
        Ok(())
    }

    async fn health_check(&self, handle: &InstanceHandle) -> bool {
        self.instances.contains_key(&handle.instance_id)
    }
}
