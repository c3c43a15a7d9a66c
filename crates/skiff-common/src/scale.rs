use crate::model::Artifact;

/// Desired replica count for one model version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleTarget {
    pub model: String,
    pub version: String,
    pub artifact: Artifact,
    pub replicas: u32,
}

/// Seam between the registry and whatever actualizes replica counts.
///
/// `scale` must return without waiting for replicas to start or stop. The
/// registry calls it while holding the model's entry, so implementations
/// must not call back into the registry.
pub trait ReplicaScaler: Send + Sync {
    fn scale(&self, target: ScaleTarget);
}
