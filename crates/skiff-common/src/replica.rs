use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaStatus {
    Starting,
    Ready,
    Unhealthy,
    Draining,
}

impl ReplicaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicaStatus::Starting => "starting",
            ReplicaStatus::Ready => "ready",
            ReplicaStatus::Unhealthy => "unhealthy",
            ReplicaStatus::Draining => "draining",
        }
    }
}

/// Point-in-time view of one running serving instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicaInfo {
    pub model: String,
    pub version: String,
    pub replica_id: u32,

    /// Host-assigned identifier (container name, pid, ...).
    pub instance_id: String,

    /// Base address requests are forwarded to.
    pub endpoint: String,

    pub status: ReplicaStatus,
    pub inflight: u64,
    pub started_at_ms: u64,
}

/// Desired vs. actual replica counts for one model version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionHealth {
    pub model: String,
    pub version: String,
    pub desired: u32,
    pub healthy: u32,
    pub draining: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}
