pub mod docker;
pub mod process;
pub mod stub;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;

use skiff_common::Artifact;

pub use docker::DockerHost;
pub use process::ProcessHost;
pub use stub::StubHost;

/// What a host needs to start one replica.
#[derive(Debug, Clone)]
pub struct ReplicaSpec {
    pub model: String,
    pub version: String,
    pub replica_id: u32,
    pub artifact: Artifact,
}

/// Handle to a started instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceHandle {
    /// Host-assigned identifier (container name, pid, ...).
    pub instance_id: String,
    /// Base address predictions are forwarded to.
    pub endpoint: String,
}

/// Supplies serving instances. Skiff never runs containers itself.
#[async_trait]
pub trait ContainerHost: Send + Sync {
    /// Host kind identifier, e.g. "docker".
    fn kind(&self) -> &'static str;

    /// Launch an instance. Returning does not imply readiness; the lifecycle
    /// manager polls `health_check` until the instance answers.
    async fn start(&self, spec: &ReplicaSpec) -> anyhow::Result<InstanceHandle>;

    async fn stop(&self, handle: &InstanceHandle) -> anyhow::Result<()>;

    async fn health_check(&self, handle: &InstanceHandle) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    Stub,
    Process,
    Docker,
}

impl FromStr for HostKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stub" => Ok(HostKind::Stub),
            "process" => Ok(HostKind::Process),
            "docker" => Ok(HostKind::Docker),
            other => Err(format!(
                "unknown host kind '{other}', expected stub|process|docker"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// First local port handed to process and docker replicas.
    pub port_start: u16,
    /// Port the serving process listens on inside the container.
    pub docker_container_port: u16,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            port_start: 9100,
            docker_container_port: 8080,
        }
    }
}

pub fn create_host(kind: HostKind, cfg: &HostConfig) -> anyhow::Result<Arc<dyn ContainerHost>> {
    Ok(match kind {
        HostKind::Stub => Arc::new(StubHost::new()),
        HostKind::Process => Arc::new(ProcessHost::new(cfg.port_start)?),
        HostKind::Docker => Arc::new(DockerHost::new(cfg.port_start, cfg.docker_container_port)?),
    })
}

/// Instance name for a newly started replica:
/// `skiff-{model}-{version}-{replica_id}-{uuid}`.
///
/// Model names may contain `-` and versions are sanitized, so the readable
/// prefix can be shared by different versions. The uuid suffix keeps every
/// started instance distinct; hosts address instances by the returned
/// `instance_id`, never by a name rebuilt from the spec.
pub fn instance_name(spec: &ReplicaSpec) -> String {
    let version: String = spec
        .version
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!(
        "skiff-{}-{}-{}-{}",
        spec.model,
        version,
        spec.replica_id,
        uuid::Uuid::new_v4().simple()
    )
}

pub(crate) fn probe_client() -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(2))
        .timeout(Duration::from_secs(3))
        .build()?)
}

/// GET `{endpoint}/health` and report whether it answered 2xx.
pub(crate) async fn probe_health(http: &reqwest::Client, endpoint: &str) -> bool {
    let url = format!("{}/health", endpoint.trim_end_matches('/'));
    match http.get(&url).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

pub(crate) async fn find_available_port(start_port: u16, max_tries: u16) -> anyhow::Result<u16> {
    let mut port = start_port;
    for _ in 0..max_tries {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => {
                drop(listener);
                return Ok(port);
            }
            Err(_) => {
                port = port.saturating_add(1);
            }
        }
    }
    anyhow::bail!(
        "no available port found in range [{}, {}]",
        start_port,
        start_port.saturating_add(max_tries)
    );
}

/// Hands out successive start ports so concurrent starts don't probe the
/// same one.
#[derive(Debug)]
pub(crate) struct PortCursor {
    base: u16,
    next: std::sync::atomic::AtomicU16,
}

impl PortCursor {
    const SPAN: u16 = 1000;

    pub(crate) fn new(base: u16) -> Self {
        Self {
            base,
            next: std::sync::atomic::AtomicU16::new(0),
        }
    }

    pub(crate) async fn allocate(&self) -> anyhow::Result<u16> {
        let offset = self
            .next
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            % Self::SPAN;
        find_available_port(self.base.saturating_add(offset), 100).await
    }
}
