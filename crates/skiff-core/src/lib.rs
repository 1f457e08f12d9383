//! Skiff Core -- identity layer for the Skiff simulation runtime.
//!
//! This crate owns the pieces of the runtime that give things a stable name:
//! generational entity ids, the collision type registry that hands every
//! entity class an immutable identifier, and the class catalog that turns
//! `collides_with` declarations into category/mask filters.
//!
//! # Quick Start
//!
//! ```
//! use skiff_core::prelude::*;
//!
//! let mut catalog = ClassCatalog::new();
//! catalog.declare(ClassDescriptor::new("asteroid").collides_with(&["bullet"])).unwrap();
//! catalog.declare(ClassDescriptor::new("bullet").collides_with(&["asteroid"])).unwrap();
//! catalog.validate().unwrap();
//!
//! let asteroid = catalog.filter_for("asteroid").unwrap();
//! let bullet = catalog.filter_for("bullet").unwrap();
//! assert!(asteroid.interacts(&bullet));
//! ```

#![deny(unsafe_code)]

pub mod class;
pub mod entity;
pub mod registry;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced while registering or resolving entity classes.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The identifier space of the registry's encoding has been used up.
    #[error("cannot register class '{class}': {encoding:?} encoding allows at most {limit} classes")]
    IdentifierSpaceExhausted {
        encoding: registry::IdEncoding,
        limit: usize,
        class: String,
    },

    /// A class name was referenced that has not been registered.
    #[error("class '{name}' not registered. Registered classes: [{registered}]")]
    UnknownClass { name: String, registered: String },

    /// A class lists a `collides_with` entry that was never declared.
    #[error("class '{class}' collides with undeclared class '{other}'")]
    UndeclaredCollider { class: String, other: String },

    /// The same class was declared twice in one catalog.
    #[error("class '{name}' is already declared")]
    DuplicateClass { name: String },

    /// Masks can only be built from bitmask identifiers.
    #[error("identifiers of a {encoding:?} registry cannot be combined into a mask")]
    NotMaskable { encoding: registry::IdEncoding },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::class::{ClassCatalog, ClassDescriptor, ClassFilter, FilterTable, ShapeFilter};
    pub use crate::entity::{EntityAllocator, EntityId};
    pub use crate::registry::{CollisionType, CollisionTypeRegistry, IdEncoding};
    pub use crate::CoreError;
}
