//! Error types for the navigation task.

use std::path::PathBuf;
use thiserror::Error;

use crate::physics::PhysicsError;

/// Errors that can occur while building or running the navigation task.
#[derive(Debug, Error)]
pub enum NavigateError {
    /// A target site name that the phantom does not define.
    #[error("unknown site '{name}', valid sites are: {}", valid.join(", "))]
    UnknownSite {
        /// The requested site name.
        name: String,
        /// Site names the phantom does define.
        valid: Vec<String>,
    },

    /// The target has not been set or sampled yet.
    #[error("target is unresolved; set a target or enable per-episode sampling")]
    TargetUnresolved,

    /// An entity the operation depends on was not attached.
    #[error("no {entity} entity attached to the task")]
    MissingEntity {
        /// Which entity was missing (phantom, guidewire, tip).
        entity: &'static str,
    },

    /// An element with the same name already exists in the world.
    #[error("duplicate {kind} name: {name}")]
    DuplicateElement {
        /// Element kind (camera, site, body, ...).
        kind: &'static str,
        /// The conflicting name.
        name: String,
    },

    /// An element referenced by name does not exist in the world.
    #[error("{kind} not found: {name}")]
    ElementNotFound {
        /// Element kind.
        kind: &'static str,
        /// The missing name.
        name: String,
    },

    /// Geometry group index outside the renderer's group range.
    #[error("invalid geom group {group} (must be < {max})")]
    InvalidGeomGroup {
        /// The offending group.
        group: usize,
        /// Number of groups supported.
        max: usize,
    },

    /// The sampling slab is empty.
    #[error("invalid sampling bounds: ({min}, {max})")]
    InvalidBounds {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },

    /// Rejection sampling gave up after the configured number of batches.
    #[error("no valid sample found within {attempts} attempts")]
    SamplingExhausted {
        /// Number of batches drawn.
        attempts: usize,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Mesh file could not be parsed.
    #[error("invalid mesh {path}: {reason}")]
    InvalidMesh {
        /// Path to the mesh file.
        path: PathBuf,
        /// What was wrong.
        reason: String,
    },

    /// Error reported by the physics engine.
    #[error(transparent)]
    Physics(#[from] PhysicsError),

    /// I/O error from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NavigateError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an invalid mesh error.
    #[must_use]
    pub fn invalid_mesh(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidMesh {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }

    /// Check if this error originated in the physics engine.
    #[must_use]
    pub fn is_physics_error(&self) -> bool {
        matches!(self, Self::Physics(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_site_lists_valid_names() {
        let err = NavigateError::UnknownSite {
            name: "aorta".to_string(),
            valid: vec!["bca".to_string(), "lcca".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("aorta"));
        assert!(msg.contains("bca, lcca"));
    }

    #[test]
    fn test_physics_error_is_transparent() {
        let inner = PhysicsError::UnknownCamera {
            name: "top_camera".to_string(),
        };
        let expected = inner.to_string();
        let err = NavigateError::from(inner);
        assert!(err.is_physics_error());
        assert_eq!(err.to_string(), expected);
    }

    #[test]
    fn test_error_predicates() {
        let err = NavigateError::invalid_config("bad value");
        assert!(err.is_config_error());
        assert!(!err.is_physics_error());
    }
}
