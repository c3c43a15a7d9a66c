use thiserror::Error;

use crate::input_type::InputType;

/// Caller-input errors from administrative operations.
///
/// Surfaced synchronously to the caller, never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("application '{0}' already exists")]
    AlreadyExists(String),

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("model '{model}' already has version '{version}'")]
    VersionExists { model: String, version: String },

    #[error("input type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: InputType,
        actual: InputType,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("model '{model}' is still linked by application '{app}'")]
    InUse { model: String, app: String },
}

impl RegistryError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        RegistryError::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Stable machine-readable code for API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::AlreadyExists(_) => "already_exists",
            RegistryError::NotFound { .. } => "not_found",
            RegistryError::VersionExists { .. } => "version_exists",
            RegistryError::TypeMismatch { .. } => "type_mismatch",
            RegistryError::InvalidConfig(_) => "invalid_config",
            RegistryError::InUse { .. } => "in_use",
        }
    }
}

/// Runtime condition at query time. Masked by the application's default
/// output; only logged and counted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("application '{0}' is not registered")]
    UnknownApplication(String),

    #[error("application '{0}' is not linked to a model")]
    NoLink(String),

    #[error("model '{0}' has no active version")]
    NoActiveVersion(String),

    #[error("no healthy replica of {model}:{version}")]
    NoHealthyReplica { model: String, version: String },

    #[error("replica of {model}:{version} failed: {reason}")]
    Upstream {
        model: String,
        version: String,
        reason: String,
    },

    #[error("query exceeded the {slo_micros}us latency objective")]
    SloExceeded { slo_micros: u64 },
}

impl RoutingError {
    /// Label used for per-cause counters.
    pub fn cause(&self) -> &'static str {
        match self {
            RoutingError::UnknownApplication(_) => "unknown_application",
            RoutingError::NoLink(_) => "no_link",
            RoutingError::NoActiveVersion(_) => "no_active_version",
            RoutingError::NoHealthyReplica { .. } => "no_healthy_replica",
            RoutingError::Upstream { .. } => "upstream",
            RoutingError::SloExceeded { .. } => "slo_exceeded",
        }
    }
}

/// Errors a query caller can fix; these are not masked by the default output.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("invalid input for application '{app}': {reason}")]
    InvalidInput { app: String, reason: String },
}

/// Infrastructure failure while converging replicas. Recorded against the
/// version's health; never escalated to the admin caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to start replica of {model}:{version}: {reason}")]
pub struct DeploymentError {
    pub model: String,
    pub version: String,
    pub reason: String,
}
