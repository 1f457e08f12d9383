//! Skiff Engine -- real-time 2D simulation runtime.
//!
//! This crate builds on [`skiff_core`] to run 2D games: a fixed-timestep
//! clock drives a pluggable physics backend (pairwise or rapier2d), collision
//! handlers are looked up in an explicit `(source, destination, phase)` table,
//! and a [`Game`](game::Game) keeps entities, bodies and drawables in sync
//! while handlers add and remove entities mid-step.
//!
//! # Quick Start
//!
//! ```
//! use skiff_engine::prelude::*;
//!
//! struct Rock;
//!
//! impl GameObject for Rock {
//!     fn class_name(&self) -> &str {
//!         "rock"
//!     }
//!
//!     fn create_body(&self) -> Body {
//!         Body::circle(1.0, 8.0).with_position(Vec2::new(0.0, 100.0))
//!     }
//! }
//!
//! let config = EngineConfig {
//!     physics: BackendKind::Naive,
//!     ..EngineConfig::default()
//! };
//! let mut game = GameBuilder::new(config)
//!     .class(ClassSpec::new("rock"))
//!     .build()
//!     .unwrap();
//!
//! let rock = game.add_entity(Box::new(Rock), false).unwrap();
//! let report = game.advance_frame(0.0, 0.52, &KeyState::new()).unwrap();
//! assert_eq!(report.steps, 31);
//! assert!(game.body_state(rock).unwrap().position.y < 100.0);
//! ```

#![deny(unsafe_code)]

pub mod body;
pub mod clock;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod game;
pub mod input;
pub mod logging;
pub mod math;
pub mod object;
pub mod physics;
pub mod render;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the core crate for convenience.
pub use skiff_core;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use skiff_core::prelude::*;

    pub use crate::body::{Body, BodyId, BodyKind, BodyState, Shape, ShapeGeometry, PRIMARY_SHAPE};
    pub use crate::clock::SimulationClock;
    pub use crate::config::{BackendKind, EngineConfig};
    pub use crate::context::{BodyIndex, CollisionContext};
    pub use crate::dispatch::{Arbiter, ClassSpec, CollisionHandler, ContactSide, Phase};
    pub use crate::error::{ConfigError, EngineError, LifecycleError, PhysicsError};
    pub use crate::game::{FrameReport, Game, GameBuilder};
    pub use crate::input::{InputState, Key, KeyState, MouseButton};
    pub use crate::math::Vec2;
    pub use crate::object::{GameObject, UpdateContext};
    pub use crate::physics::{create_backend, PhysicsBackend, PhysicsObject};
    pub use crate::render::{ChildSprite, Drawable, RenderLayer};
}
