use serde::{Deserialize, Serialize};

use crate::{Application, Link, Model, ReplicaInfo, VersionHealth};

/// Everything the registry holds; what gets persisted and restored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub applications: Vec<Application>,
    pub models: Vec<Model>,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub applications: Vec<Application>,
    pub links: Vec<Link>,
    pub versions: Vec<VersionHealth>,
    pub replicas: Vec<ReplicaInfo>,
}
