use serde::{Deserialize, Serialize};

use crate::input_type::InputType;

/// Immutable deployment reference bound to a model version at deploy time.
///
/// `image` is interpreted by the container host: a container image for the
/// docker host, an executable path for the process host, an opaque label for
/// the stub host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Artifact {
    pub image: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl Artifact {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            args: Vec::new(),
        }
    }
}

/// One deployable artifact of a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelVersion {
    pub model: String,
    pub version: String,
    pub artifact: Artifact,

    /// Desired number of running replicas.
    pub replicas: u32,

    #[serde(default)]
    pub created_at_ms: u64,
}

/// A named family of versions sharing an input type.
///
/// Stored under `/skiff/models/{name}` together with its versions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Model {
    pub name: String,
    pub input_type: InputType,

    /// Versions in deploy order. Never empty.
    pub versions: Vec<ModelVersion>,

    /// The version routing resolves to. Always names an entry of `versions`.
    pub active_version: String,

    /// Set once the active version was chosen explicitly; new deploys then
    /// stop auto-activating.
    #[serde(default)]
    pub pinned: bool,
}

impl Model {
    pub fn version(&self, version: &str) -> Option<&ModelVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    pub fn version_mut(&mut self, version: &str) -> Option<&mut ModelVersion> {
        self.versions.iter_mut().find(|v| v.version == version)
    }

    pub fn active(&self) -> Option<&ModelVersion> {
        self.version(&self.active_version)
    }
}

/// Routing association from an application to a model (not a version).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Link {
    pub app: String,
    pub model: String,
}
