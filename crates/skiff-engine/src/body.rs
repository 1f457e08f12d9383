//! Rigid bodies and their shapes.
//!
//! A [`Body`] is created by a game object, handed to the physics backend when
//! the entity is registered, and from then on lives in the backend's object
//! set under its [`BodyId`]. Shapes are owned by their body and carry the
//! collision filter of the owning class once the backend has admitted them.

use std::fmt;

use serde::{Deserialize, Serialize};
use skiff_core::class::ShapeFilter;
use skiff_core::registry::CollisionType;

use crate::math::Vec2;

/// Name conventionally given to a body's main shape.
pub const PRIMARY_SHAPE: &str = "primary";

// ---------------------------------------------------------------------------
// BodyId
// ---------------------------------------------------------------------------

/// Handle of a body inside a physics backend.
///
/// Body ids are allocated monotonically by the game and never reused, so a
/// stale id can never alias a newer body.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(u64);

impl BodyId {
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BodyId({})", self.0)
    }
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Body kinematics
// ---------------------------------------------------------------------------

/// How the backend treats a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyKind {
    /// Moved by forces, gravity and contacts.
    Dynamic,
    /// Moved only by its velocity, which game code sets. Pushes dynamic
    /// bodies but is never pushed back.
    Kinematic,
    /// Never moves.
    Static,
}

/// Position, orientation and velocities of a body.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BodyState {
    pub position: Vec2,
    /// Counter-clockwise, radians.
    pub angle: f64,
    pub velocity: Vec2,
    /// Counter-clockwise, radians per second.
    pub angular_velocity: f64,
}

impl BodyState {
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite()
            && self.angle.is_finite()
            && self.velocity.is_finite()
            && self.angular_velocity.is_finite()
    }

    /// Apply a linear impulse to a body with the given inverse mass.
    pub fn apply_impulse(&mut self, impulse: Vec2, inverse_mass: f64) {
        self.velocity += impulse * inverse_mass;
    }

    /// World-space point for a point given in body-local coordinates.
    pub fn to_world(&self, local: Vec2) -> Vec2 {
        self.position + local.rotate(self.angle)
    }
}

// ---------------------------------------------------------------------------
// Shapes
// ---------------------------------------------------------------------------

/// Geometry of a shape in body-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ShapeGeometry {
    Circle { radius: f64, offset: Vec2 },
    /// Segment with rounded ends (a capsule when `radius > 0`).
    Segment { a: Vec2, b: Vec2, radius: f64 },
}

impl ShapeGeometry {
    pub fn radius(&self) -> f64 {
        match *self {
            ShapeGeometry::Circle { radius, .. } | ShapeGeometry::Segment { radius, .. } => radius,
        }
    }

    /// World-space core segment and radius. Circles become zero-length
    /// segments.
    pub fn world_capsule(&self, state: &BodyState) -> (Vec2, Vec2, f64) {
        match *self {
            ShapeGeometry::Circle { radius, offset } => {
                let center = state.to_world(offset);
                (center, center, radius)
            }
            ShapeGeometry::Segment { a, b, radius } => {
                (state.to_world(a), state.to_world(b), radius)
            }
        }
    }

    /// Area used to split a body's mass across its shapes.
    pub fn area(&self) -> f64 {
        match *self {
            ShapeGeometry::Circle { radius, .. } => std::f64::consts::PI * radius * radius,
            ShapeGeometry::Segment { a, b, radius } => {
                std::f64::consts::PI * radius * radius + 2.0 * radius * a.distance(b)
            }
        }
    }
}

/// One collision shape attached to a body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub name: String,
    pub geometry: ShapeGeometry,
    /// Bounciness. Combined multiplicatively with the other shape's.
    pub elasticity: f64,
    /// Combined multiplicatively with the other shape's.
    pub friction: f64,
    /// Set by the backend when the body is added.
    pub collision_type: CollisionType,
    /// Set by the backend when the body is added.
    pub filter: ShapeFilter,
}

impl Shape {
    pub fn new(name: impl Into<String>, geometry: ShapeGeometry) -> Self {
        Self {
            name: name.into(),
            geometry,
            elasticity: 0.8,
            friction: 1.0,
            collision_type: CollisionType::UNASSIGNED,
            filter: ShapeFilter::default(),
        }
    }

    pub fn circle(name: impl Into<String>, radius: f64) -> Self {
        Self::new(
            name,
            ShapeGeometry::Circle {
                radius,
                offset: Vec2::ZERO,
            },
        )
    }

    pub fn segment(name: impl Into<String>, a: Vec2, b: Vec2, radius: f64) -> Self {
        Self::new(name, ShapeGeometry::Segment { a, b, radius })
    }

    pub fn with_offset(mut self, offset: Vec2) -> Self {
        if let ShapeGeometry::Circle { offset: o, .. } = &mut self.geometry {
            *o = offset;
        }
        self
    }

    pub fn with_elasticity(mut self, elasticity: f64) -> Self {
        self.elasticity = elasticity;
        self
    }

    pub fn with_friction(mut self, friction: f64) -> Self {
        self.friction = friction;
        self
    }
}

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

/// A rigid body with its shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub kind: BodyKind,
    /// Total mass. Only meaningful for dynamic bodies.
    pub mass: f64,
    pub state: BodyState,
    pub shapes: Vec<Shape>,
}

impl Body {
    pub fn new(kind: BodyKind, mass: f64) -> Self {
        Self {
            kind,
            mass,
            state: BodyState::default(),
            shapes: Vec::new(),
        }
    }

    pub fn dynamic(mass: f64) -> Self {
        Self::new(BodyKind::Dynamic, mass)
    }

    pub fn kinematic() -> Self {
        Self::new(BodyKind::Kinematic, 0.0)
    }

    pub fn fixed() -> Self {
        Self::new(BodyKind::Static, 0.0)
    }

    /// A dynamic body with a single primary circle.
    pub fn circle(mass: f64, radius: f64) -> Self {
        Self::dynamic(mass).with_shape(Shape::circle(PRIMARY_SHAPE, radius))
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shapes.push(shape);
        self
    }

    pub fn with_position(mut self, position: Vec2) -> Self {
        self.state.position = position;
        self
    }

    pub fn with_angle(mut self, angle: f64) -> Self {
        self.state.angle = angle;
        self
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.state.velocity = velocity;
        self
    }

    pub fn with_angular_velocity(mut self, angular_velocity: f64) -> Self {
        self.state.angular_velocity = angular_velocity;
        self
    }

    /// Inverse mass used by contact responses. Zero for anything that is not
    /// pushed by contacts.
    pub fn inverse_mass(&self) -> f64 {
        match self.kind {
            BodyKind::Dynamic if self.mass > 0.0 => 1.0 / self.mass,
            _ => 0.0,
        }
    }

    pub fn shape(&self, name: &str) -> Option<&Shape> {
        self.shapes.iter().find(|s| s.name == name)
    }

    /// The shape named [`PRIMARY_SHAPE`], or the first shape.
    pub fn primary_shape(&self) -> Option<&Shape> {
        self.shape(PRIMARY_SHAPE).or_else(|| self.shapes.first())
    }
}
