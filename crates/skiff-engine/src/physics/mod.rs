//! Physics backends.
//!
//! A [`PhysicsBackend`] owns the authoritative set of simulated bodies and
//! advances it in fixed steps, reporting contacts through
//! [`dispatch_pair`](crate::dispatch::dispatch_pair). Two implementations
//! exist:
//!
//! - [`NaiveBackend`]: O(n^2) pairwise checks over every body, with a simple
//!   impulse response. Small, predictable, and free of external state.
//! - [`SolverBackend`]: delegates to rapier2d. Handlers run inline from
//!   rapier's event handler and contact-modification hook.
//!
//! Both backends only pair shapes whose filters accept each other in both
//! directions.

pub mod geometry;
pub mod naive;
pub mod solver;

use std::collections::BTreeMap;

use skiff_core::class::FilterTable;

use crate::body::{Body, BodyId, BodyKind, BodyState};
use crate::config::BackendKind;
use crate::context::CollisionContext;
use crate::dispatch::HandlerTable;
use crate::error::PhysicsError;
use crate::math::Vec2;

pub use naive::NaiveBackend;
pub use solver::SolverBackend;

// ---------------------------------------------------------------------------
// ObjectSet
// ---------------------------------------------------------------------------

/// A body registered with a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsObject {
    pub id: BodyId,
    /// Declared class of the owning entity.
    pub class: String,
    pub body: Body,
}

impl PhysicsObject {
    pub fn new(id: BodyId, class: impl Into<String>, body: Body) -> Self {
        Self {
            id,
            class: class.into(),
            body,
        }
    }
}

/// The backend's bodies, ordered by id (and therefore by insertion, since
/// body ids only grow).
#[derive(Debug, Default)]
pub struct ObjectSet {
    objects: BTreeMap<BodyId, PhysicsObject>,
}

impl ObjectSet {
    /// Validate `object`, stamp its class filter onto every shape and insert
    /// it.
    pub fn admit(
        &mut self,
        mut object: PhysicsObject,
        filters: &FilterTable,
    ) -> Result<&PhysicsObject, PhysicsError> {
        if self.objects.contains_key(&object.id) {
            return Err(PhysicsError::AlreadyRegistered { body: object.id });
        }
        let class = filters
            .get(&object.class)
            .ok_or_else(|| PhysicsError::UnknownClass {
                class: object.class.clone(),
            })?;
        if object.body.shapes.is_empty() {
            return Err(PhysicsError::NoShapes {
                body: object.id,
                class: object.class.clone(),
            });
        }
        let mass = object.body.mass;
        if object.body.kind == BodyKind::Dynamic && !(mass.is_finite() && mass > 0.0) {
            return Err(PhysicsError::InvalidMass {
                body: object.id,
                mass,
            });
        }
        for shape in &mut object.body.shapes {
            shape.collision_type = class.collision_type;
            shape.filter = class.filter;
        }
        let id = object.id;
        Ok(self.objects.entry(id).or_insert(object))
    }

    pub fn release(&mut self, id: BodyId) -> Result<PhysicsObject, PhysicsError> {
        self.objects
            .remove(&id)
            .ok_or(PhysicsError::NotRegistered { body: id })
    }

    pub fn get(&self, id: BodyId) -> Option<&PhysicsObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: BodyId) -> Option<&mut PhysicsObject> {
        self.objects.get_mut(&id)
    }

    pub fn contains(&self, id: BodyId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Snapshot of the ids, in order.
    pub fn ids(&self) -> Vec<BodyId> {
        self.objects.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PhysicsObject> {
        self.objects.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PhysicsObject> {
        self.objects.values_mut()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

// ---------------------------------------------------------------------------
// PhysicsBackend
// ---------------------------------------------------------------------------

/// Result of a nearest-shape point query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointQueryHit {
    pub body: BodyId,
    /// Distance from the query point to the shape surface. Zero inside.
    pub distance: f64,
}

/// A rigid-body simulation the game can drive.
pub trait PhysicsBackend: Send {
    fn kind(&self) -> BackendKind;

    /// Add a body. Its shapes receive the class filter.
    fn add_object(&mut self, object: PhysicsObject) -> Result<(), PhysicsError>;

    /// Remove a body and every shape it owns.
    fn remove_object(&mut self, id: BodyId) -> Result<PhysicsObject, PhysicsError>;

    /// Advance the simulation by exactly `dt` seconds.
    fn step(&mut self, dt: f64, ctx: &mut CollisionContext<'_>);

    fn objects(&self) -> &ObjectSet;

    fn body_state(&self, id: BodyId) -> Option<BodyState> {
        self.objects().get(id).map(|o| o.body.state)
    }

    /// Edit a body's position, angle or velocities.
    fn update_body(
        &mut self,
        id: BodyId,
        edit: &mut dyn FnMut(&mut BodyState),
    ) -> Result<(), PhysicsError>;

    fn set_gravity(&mut self, gravity: Vec2);

    fn gravity(&self) -> Vec2;

    /// Nearest shape within `max_distance` of `point` whose categories
    /// intersect `categories`.
    fn point_query_nearest(
        &self,
        point: Vec2,
        max_distance: f64,
        categories: u32,
    ) -> Option<PointQueryHit> {
        let mut best: Option<PointQueryHit> = None;
        for object in self.objects().iter() {
            for shape in &object.body.shapes {
                if shape.filter.categories & categories == 0 {
                    continue;
                }
                let distance =
                    geometry::point_distance(&shape.geometry, &object.body.state, point);
                if distance > max_distance {
                    continue;
                }
                if best.map_or(true, |b| distance < b.distance) {
                    best = Some(PointQueryHit {
                        body: object.id,
                        distance,
                    });
                }
            }
        }
        best
    }
}

/// Build the backend selected by `kind`.
pub fn create_backend(
    kind: BackendKind,
    gravity: Vec2,
    filters: FilterTable,
    handlers: HandlerTable,
) -> Box<dyn PhysicsBackend> {
    tracing::info!(backend = %kind, handlers = handlers.len(), "creating physics backend");
    match kind {
        BackendKind::Naive => Box::new(NaiveBackend::new(gravity, filters, handlers)),
        BackendKind::Solver => Box::new(SolverBackend::new(gravity, filters, handlers)),
    }
}
