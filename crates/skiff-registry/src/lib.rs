//! The registry: single source of truth for applications, models, their
//! versions, and the links between applications and models.

mod registry;

pub use registry::Registry;
