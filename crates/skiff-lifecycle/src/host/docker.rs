use async_trait::async_trait;
use tokio::process::Command;

use super::{instance_name, probe_client, probe_health, ContainerHost, InstanceHandle, PortCursor, ReplicaSpec};

/// Runs the artifact image with the local docker CLI, publishing the
/// container's serving port on a free local port.
pub struct DockerHost {
    http: reqwest::Client,
    ports: PortCursor,
    container_port: u16,
}

impl DockerHost {
    pub fn new(port_start: u16, container_port: u16) -> anyhow::Result<Self> {
        Ok(Self {
            http: probe_client()?,
            ports: PortCursor::new(port_start),
            container_port,
        })
    }

    fn run_args(&self, name: &str, host_port: u16, spec: &ReplicaSpec) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            name.to_string(),
            "-p".to_string(),
            format!("127.0.0.1:{host_port}:{}", self.container_port),
            "-e".to_string(),
            format!("SKIFF_PORT={}", self.container_port),
            "-e".to_string(),
            format!("SKIFF_MODEL={}", spec.model),
            "-e".to_string(),
            format!("SKIFF_VERSION={}", spec.version),
            spec.artifact.image.clone(),
        ];
        args.extend(spec.artifact.args.iter().cloned());
        args
    }
}

/// Stop and remove a container by name. Errors are ignored; the container
/// may already be gone.
async fn stop_container_by_name(name: &str) {
    tracing::info!(%name, "stopping docker container");
    let _ = Command::new("docker")
        .args(["stop", "-t", "10", name])
        .output()
        .await;
    let _ = Command::new("docker")
        .args(["rm", "-f", name])
        .output()
        .await;
}

#[async_trait]
impl ContainerHost for DockerHost {
    fn kind(&self) -> &'static str {
        "docker"
    }

    async fn start(&self, spec: &ReplicaSpec) -> anyhow::Result<InstanceHandle> {
        let name = instance_name(spec);
        let port = self.ports.allocate().await?;
        tracing::info!(
            model=%spec.model,
            version=%spec.version,
            replica_id=spec.replica_id,
            image=%spec.artifact.image,
            port,
            "starting docker container"
        );
        let out = Command::new("docker")
            .args(self.run_args(&name, port, spec))
            .output()
            .await?;
        if !out.status.success() {
            // `docker run -d` can leave a created container behind on failure.
            stop_container_by_name(&name).await;
            anyhow::bail!(
                "docker run failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }

        Ok(InstanceHandle {
            instance_id: name,
            endpoint: format!("http://127.0.0.1:{port}"),
        })
    }

    async fn stop(&self, handle: &InstanceHandle) -> anyhow::Result<()> {
        stop_container_by_name(&handle.instance_id).await;
        Ok(())
    }

    async fn health_check(&self, handle: &InstanceHandle) -> bool {
        probe_health(&self.http, &handle.endpoint).await
    }
}
