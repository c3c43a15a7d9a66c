//! Converges each model version's desired replica count onto serving
//! instances supplied by a [`ContainerHost`].

pub mod config;
pub mod host;
mod manager;
pub mod metrics;
mod replica;

pub use config::LifecycleConfig;
pub use host::{create_host, ContainerHost, HostConfig, HostKind, InstanceHandle, ReplicaSpec};
pub use manager::LifecycleManager;
pub use metrics::LifecycleMetrics;
pub use replica::{InflightGuard, Replica};
