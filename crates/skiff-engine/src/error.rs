//! Error types for the engine layer.
//!
//! Configuration errors surface before the first frame. Physics and
//! lifecycle errors are programming errors in game code (adding a body twice,
//! removing something that was never added) and are reported loudly. Lookup
//! races inside a step and degenerate transforms never become errors; they are
//! skipped and counted instead.

use skiff_core::entity::EntityId;
use skiff_core::CoreError;

use crate::body::BodyId;

/// Invalid startup configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown physics implementation '{name}'. Available: [{available}]")]
    UnknownBackend { name: String, available: String },

    #[error("{field} must be a positive number of frames per second, got {value}")]
    InvalidRate { field: &'static str, value: u32 },

    #[error("gravity must be finite, got {value}")]
    NonFiniteGravity { value: f64 },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Registry(#[from] CoreError),
}

/// Misuse of a physics backend's object set.
#[derive(Debug, thiserror::Error)]
pub enum PhysicsError {
    #[error("body {body} already added")]
    AlreadyRegistered { body: BodyId },

    #[error("body {body} is not in the object set")]
    NotRegistered { body: BodyId },

    #[error("class '{class}' has no registered collision filter")]
    UnknownClass { class: String },

    #[error("body {body} of class '{class}' has no shapes")]
    NoShapes { body: BodyId, class: String },

    #[error("dynamic body {body} needs a positive finite mass, got {mass}")]
    InvalidMass { body: BodyId, mass: f64 },
}

/// Misuse of the entity lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("entity {entity} is not registered")]
    UnknownEntity { entity: EntityId },

    #[error("body {body} does not belong to any registered entity")]
    UnknownBody { body: BodyId },

    #[error("class '{class}' was never declared. Declared classes: [{declared}]")]
    UnknownClass { class: String, declared: String },

    #[error(transparent)]
    Physics(#[from] PhysicsError),
}

/// Any error the engine can report.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Physics(#[from] PhysicsError),

    #[error(transparent)]
    Registry(#[from] CoreError),
}
