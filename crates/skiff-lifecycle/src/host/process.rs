use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use super::{instance_name, probe_client, probe_health, ContainerHost, InstanceHandle, PortCursor, ReplicaSpec};

/// Runs the artifact image as a local executable. The process must serve
/// `GET /health` and `POST /predict` on the port given in `SKIFF_PORT`.
pub struct ProcessHost {
    http: reqwest::Client,
    ports: PortCursor,
    children: Mutex<HashMap<String, Child>>,
}

impl ProcessHost {
    pub fn new(port_start: u16) -> anyhow::Result<Self> {
        Ok(Self {
            http: probe_client()?,
            ports: PortCursor::new(port_start),
            children: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl ContainerHost for ProcessHost {
    fn kind(&self) -> &'static str {
        "process"
    }

    async fn start(&self, spec: &ReplicaSpec) -> anyhow::Result<InstanceHandle> {
        let port = self.ports.allocate().await?;
        let name = instance_name(spec);

        tracing::info!(
            model=%spec.model,
            version=%spec.version,
            replica_id=spec.replica_id,
            program=%spec.artifact.image,
            port,
            "spawning replica process"
        );
        let child = Command::new(&spec.artifact.image)
            .args(&spec.artifact.args)
            .env("SKIFF_PORT", port.to_string())
            .env("SKIFF_MODEL", &spec.model)
            .env("SKIFF_VERSION", &spec.version)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow::anyhow!("spawn {}: {e}", spec.artifact.image))?;

        let instance_id = match child.id() {
            Some(pid) => format!("{name}-{pid}"),
            None => name,
        };
        self.children.lock().await.insert(instance_id.clone(), child);

        Ok(InstanceHandle {
            instance_id,
            endpoint: format!("http://127.0.0.1:{port}"),
        })
    }

    async fn stop(&self, handle: &InstanceHandle) -> anyhow::Result<()> {
        let child = self.children.lock().await.remove(&handle.instance_id);
        let Some(mut child) = child else {
            return Ok(());
        };
        tracing::info!(instance_id=%handle.instance_id, "stopping replica process");
        child.kill().await?;
        Ok(())
    }

    async fn health_check(&self, handle: &InstanceHandle) -> bool {
        {
            let mut children = self.children.lock().await;
            match children.get_mut(&handle.instance_id) {
                Some(child) => {
                    if let Ok(Some(status)) = child.try_wait() {
                        tracing::warn!(instance_id=%handle.instance_id, %status, "replica process exited");
                        return false;
                    }
                }
                None => return false,
            }
        }
        probe_health(&self.http, &handle.endpoint).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skiff_common::Artifact;

    #[tokio::test]
    async fn test_missing_executable_fails_to_start() {
        let host = ProcessHost::new(19100).unwrap();
        let spec = ReplicaSpec {
            model: "tree-model".to_string(),
            version: "1".to_string(),
            replica_id: 0,
            artifact: Artifact::new("/nonexistent/skiff-test-binary"),
        };
        assert!(host.start(&spec).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_instance_is_unhealthy() {
        let host = ProcessHost::new(19200).unwrap();
        let handle = InstanceHandle {
            instance_id: "nope".to_string(),
            endpoint: "http://127.0.0.1:1".to_string(),
        };
        assert!(!host.health_check(&handle).await);
        host.stop(&handle).await.unwrap();
    }
}
