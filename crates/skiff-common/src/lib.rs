pub mod application;
pub mod cluster;
pub mod error;
pub mod input_type;
pub mod model;
pub mod names;
pub mod predict;
pub mod replica;
pub mod scale;

pub use application::Application;
pub use cluster::{ClusterStatus, RegistrySnapshot};
pub use error::{DeploymentError, QueryError, RegistryError, RoutingError};
pub use input_type::InputType;
pub use model::{Artifact, Link, Model, ModelVersion};
pub use predict::{PredictRequest, PredictResponse};
pub use replica::{ReplicaInfo, ReplicaStatus, VersionHealth};
pub use scale::{ReplicaScaler, ScaleTarget};

pub mod auth;
pub mod telemetry;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}
