use serde::{Deserialize, Serialize};

use crate::input_type::InputType;

/// A named, externally queryable prediction endpoint.
///
/// Stored under `/skiff/applications/{name}`. Immutable once registered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Application {
    /// Unique key. Format: `[a-z0-9]([a-z0-9-]*[a-z0-9])?`, max 63 chars.
    pub name: String,

    pub input_type: InputType,

    /// Returned verbatim whenever a query cannot be served within the SLO.
    pub default_output: String,

    /// Latency objective for a single query, in microseconds.
    pub slo_micros: u64,

    #[serde(default)]
    pub created_at_ms: u64,
}
