use std::time::Duration;

use clap::Parser;

use skiff_common::telemetry::LogFormat;
use skiff_lifecycle::{HostConfig, HostKind, LifecycleConfig};

#[derive(Debug, Parser)]
#[command(name = "skiff-server", version, about = "Skiff model-serving control plane")]
pub struct Args {
    #[arg(long, env = "SKIFF_LISTEN_ADDR", default_value = "0.0.0.0:1337")]
    pub listen_addr: String,

    /// Persist registry state to etcd and restore it at startup.
    /// Without it the registry lives in memory only.
    #[arg(long, env = "SKIFF_ETCD_ENDPOINT")]
    pub etcd_endpoint: Option<String>,

    /// Replica host: stub | process | docker.
    #[arg(long, env = "SKIFF_HOST", default_value = "stub")]
    pub host: HostKind,

    /// First local port handed to process and docker replicas.
    #[arg(long, env = "SKIFF_PORT_START", default_value_t = 9100)]
    pub port_start: u16,

    #[arg(long, env = "SKIFF_DOCKER_CONTAINER_PORT", default_value_t = 8080)]
    pub docker_container_port: u16,

    /// Replica selection: least_inflight | round_robin.
    #[arg(long, env = "SKIFF_SELECTION_STRATEGY", default_value = "least_inflight")]
    pub selection_strategy: String,

    /// Other replicas tried after a failed replica call.
    #[arg(long, env = "SKIFF_RETRY_MAX", default_value_t = 1)]
    pub retry_max: u32,

    #[arg(long, env = "SKIFF_DRAIN_GRACE_MS", default_value_t = 30_000)]
    pub drain_grace_ms: u64,

    #[arg(long, env = "SKIFF_HEALTH_INTERVAL_MS", default_value_t = 5_000)]
    pub health_interval_ms: u64,

    #[arg(long, env = "SKIFF_START_RETRY_MAX", default_value_t = 3)]
    pub start_retry_max: u32,

    #[arg(long, env = "SKIFF_START_BACKOFF_MS", default_value_t = 500)]
    pub start_backoff_ms: u64,

    #[arg(long, env = "SKIFF_READY_TIMEOUT_MS", default_value_t = 60_000)]
    pub ready_timeout_ms: u64,

    #[arg(long, env = "SKIFF_UNHEALTHY_THRESHOLD", default_value_t = 3)]
    pub unhealthy_threshold: u32,

    #[arg(long, env = "SKIFF_REPLACE_THRESHOLD", default_value_t = 5)]
    pub replace_threshold: u32,

    /// OTLP/HTTP collector base URL; spans are exported when set.
    #[arg(long, env = "SKIFF_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    #[arg(long, env = "SKIFF_OTLP_TOKEN")]
    pub otlp_token: Option<String>,

    /// Log output format: text | json.
    #[arg(long, env = "SKIFF_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,
}

impl Args {
    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            drain_grace: Duration::from_millis(self.drain_grace_ms),
            start_retry_max: self.start_retry_max,
            start_backoff: Duration::from_millis(self.start_backoff_ms),
            ready_timeout: Duration::from_millis(self.ready_timeout_ms),
            health_interval: Duration::from_millis(self.health_interval_ms),
            unhealthy_threshold: self.unhealthy_threshold,
            replace_threshold: self.replace_threshold,
        }
    }

    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            port_start: self.port_start,
            docker_container_port: self.docker_container_port,
        }
    }
}
