//! Pairwise physics backend.
//!
//! Each step checks every pair of bodies, in id order, for touching shapes.
//! Touching pairs go through begin (first step only), pre-solve, an impulse
//! response and post-solve; pairs that stopped touching get a separate
//! callback. Bodies are then integrated with semi-implicit Euler.

use std::collections::BTreeSet;

use skiff_core::class::FilterTable;
use skiff_core::registry::CollisionType;

use crate::body::{BodyId, BodyKind, BodyState, ShapeGeometry};
use crate::config::BackendKind;
use crate::context::CollisionContext;
use crate::dispatch::{dispatch_pair, pair_key, ContactParty, HandlerTable, Phase, RawContact};
use crate::error::PhysicsError;
use crate::math::Vec2;
use crate::physics::geometry;
use crate::physics::{ObjectSet, PhysicsBackend, PhysicsObject};

/// Fraction of the penetration removed per step.
const POSITION_CORRECTION: f64 = 0.8;
/// Penetration tolerated without positional correction.
const PENETRATION_SLOP: f64 = 0.01;

/// A touching shape pair with its combined material.
#[derive(Debug, Clone, Copy)]
struct PairContact {
    raw: RawContact,
    elasticity: f64,
    friction: f64,
}

/// O(n^2) backend without external dependencies.
#[derive(Debug)]
pub struct NaiveBackend {
    objects: ObjectSet,
    filters: FilterTable,
    handlers: HandlerTable,
    gravity: Vec2,
    /// Pairs that touched at the end of the previous step.
    touching: BTreeSet<(BodyId, BodyId)>,
    /// Pairs whose begin handler rejected the contact.
    ignored: BTreeSet<(BodyId, BodyId)>,
}

impl NaiveBackend {
    pub fn new(gravity: Vec2, filters: FilterTable, handlers: HandlerTable) -> Self {
        Self {
            objects: ObjectSet::default(),
            filters,
            handlers,
            gravity,
            touching: BTreeSet::new(),
            ignored: BTreeSet::new(),
        }
    }

    /// Deepest contact between any two interacting shapes of `a` and `b`.
    fn pair_contact(&self, a: BodyId, b: BodyId) -> Option<PairContact> {
        let oa = self.objects.get(a)?;
        let ob = self.objects.get(b)?;
        if oa.body.kind != BodyKind::Dynamic && ob.body.kind != BodyKind::Dynamic {
            return None;
        }
        let mut best: Option<PairContact> = None;
        for sa in &oa.body.shapes {
            for sb in &ob.body.shapes {
                if !sa.filter.interacts(&sb.filter) {
                    continue;
                }
                let Some(hit) =
                    geometry::contact(&sa.geometry, &oa.body.state, &sb.geometry, &ob.body.state)
                else {
                    continue;
                };
                if best.map_or(false, |b| b.raw.depth >= hit.depth) {
                    continue;
                }
                best = Some(PairContact {
                    raw: RawContact {
                        a: party(oa, sa.collision_type, sa.geometry),
                        b: party(ob, sb.collision_type, sb.geometry),
                        normal: hit.normal,
                        depth: hit.depth,
                        impulse: Vec2::ZERO,
                    },
                    elasticity: sa.elasticity * sb.elasticity,
                    friction: sa.friction * sb.friction,
                });
            }
        }
        best
    }

    /// Contact description for a pair that just separated.
    fn separation_contact(&self, (a, b): (BodyId, BodyId)) -> Option<RawContact> {
        let oa = self.objects.get(a)?;
        let ob = self.objects.get(b)?;
        let sa = oa.body.primary_shape()?;
        let sb = ob.body.primary_shape()?;
        Some(RawContact {
            a: party(oa, sa.collision_type, sa.geometry),
            b: party(ob, sb.collision_type, sb.geometry),
            normal: (ob.body.state.position - oa.body.state.position).normalize_or_zero(),
            depth: 0.0,
            impulse: Vec2::ZERO,
        })
    }

    /// Apply an impulse and positional correction. Returns the impulse
    /// applied to `b`.
    fn respond(&mut self, contact: &PairContact) -> Vec2 {
        let (a, b) = (contact.raw.a.body, contact.raw.b.body);
        let (Some(inv_a), Some(inv_b)) = (
            self.objects.get(a).map(|o| o.body.inverse_mass()),
            self.objects.get(b).map(|o| o.body.inverse_mass()),
        ) else {
            return Vec2::ZERO;
        };
        let inv_sum = inv_a + inv_b;
        if inv_sum <= 0.0 {
            return Vec2::ZERO;
        }
        let (Some(state_a), Some(state_b)) = (self.body_state(a), self.body_state(b)) else {
            return Vec2::ZERO;
        };

        let n = contact.raw.normal;
        let relative = state_b.velocity - state_a.velocity;
        let normal_speed = relative.dot(n);
        let mut impulse = Vec2::ZERO;
        if normal_speed < 0.0 {
            let j = -(1.0 + contact.elasticity) * normal_speed / inv_sum;
            impulse = n * j;

            let tangent = n.perp();
            let tangent_speed = relative.dot(tangent);
            let max_friction = contact.friction * j;
            let jt = (-tangent_speed / inv_sum).clamp(-max_friction, max_friction);
            impulse += tangent * jt;
        }

        let correction =
            n * ((contact.raw.depth - PENETRATION_SLOP).max(0.0) / inv_sum * POSITION_CORRECTION);

        if let Some(o) = self.objects.get_mut(a) {
            o.body.state.apply_impulse(-impulse, inv_a);
            o.body.state.position -= correction * inv_a;
        }
        if let Some(o) = self.objects.get_mut(b) {
            o.body.state.apply_impulse(impulse, inv_b);
            o.body.state.position += correction * inv_b;
        }
        impulse
    }

    fn integrate(&mut self, dt: f64) {
        let gravity = self.gravity;
        for object in self.objects.iter_mut() {
            let state = &mut object.body.state;
            match object.body.kind {
                BodyKind::Dynamic => {
                    state.velocity += gravity * dt;
                    state.position += state.velocity * dt;
                    state.angle += state.angular_velocity * dt;
                }
                BodyKind::Kinematic => {
                    state.position += state.velocity * dt;
                    state.angle += state.angular_velocity * dt;
                }
                BodyKind::Static => {}
            }
        }
    }

    /// Refresh the body states carried by a contact after the response.
    fn refreshed(&self, mut raw: RawContact) -> RawContact {
        if let Some(state) = self.body_state(raw.a.body) {
            raw.a.state = state;
        }
        if let Some(state) = self.body_state(raw.b.body) {
            raw.b.state = state;
        }
        raw
    }
}

fn party(object: &PhysicsObject, collision_type: CollisionType, shape: ShapeGeometry) -> ContactParty {
    ContactParty {
        body: object.id,
        collision_type,
        shape,
        state: object.body.state,
    }
}

impl PhysicsBackend for NaiveBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Naive
    }

    fn add_object(&mut self, object: PhysicsObject) -> Result<(), PhysicsError> {
        let admitted = self.objects.admit(object, &self.filters)?;
        tracing::debug!(body = %admitted.id, class = admitted.class.as_str(), "naive: body added");
        Ok(())
    }

    fn remove_object(&mut self, id: BodyId) -> Result<PhysicsObject, PhysicsError> {
        let object = self.objects.release(id)?;
        self.touching.retain(|&(a, b)| a != id && b != id);
        self.ignored.retain(|&(a, b)| a != id && b != id);
        tracing::debug!(body = %id, "naive: body removed");
        Ok(object)
    }

    fn step(&mut self, dt: f64, ctx: &mut CollisionContext<'_>) {
        let ids = self.objects.ids();
        let mut now_touching = BTreeSet::new();

        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                // Tombstones stay in the set until the step ends.
                if !ctx.is_live(a) || !ctx.is_live(b) {
                    continue;
                }
                let Some(contact) = self.pair_contact(a, b) else {
                    continue;
                };
                let key = pair_key(a, b);
                now_touching.insert(key);

                if !self.touching.contains(&key)
                    && !dispatch_pair(&self.handlers, Phase::Begin, &contact.raw, ctx)
                {
                    self.ignored.insert(key);
                }
                if self.ignored.contains(&key) {
                    continue;
                }
                if !dispatch_pair(&self.handlers, Phase::PreSolve, &contact.raw, ctx) {
                    continue;
                }
                let impulse = self.respond(&contact);
                if self.handlers.has_any(
                    contact.raw.a.collision_type,
                    contact.raw.b.collision_type,
                    Phase::PostSolve,
                ) {
                    let mut post = self.refreshed(contact.raw);
                    post.impulse = impulse;
                    dispatch_pair(&self.handlers, Phase::PostSolve, &post, ctx);
                }
            }
        }

        let ended: Vec<(BodyId, BodyId)> =
            self.touching.difference(&now_touching).copied().collect();
        for key in ended {
            self.ignored.remove(&key);
            if let Some(contact) = self.separation_contact(key) {
                dispatch_pair(&self.handlers, Phase::Separate, &contact, ctx);
            }
        }
        self.touching = now_touching;

        self.integrate(dt);
    }

    fn objects(&self) -> &ObjectSet {
        &self.objects
    }

    fn update_body(
        &mut self,
        id: BodyId,
        edit: &mut dyn FnMut(&mut BodyState),
    ) -> Result<(), PhysicsError> {
        let object = self
            .objects
            .get_mut(id)
            .ok_or(PhysicsError::NotRegistered { body: id })?;
        edit(&mut object.body.state);
        Ok(())
    }

    fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = gravity;
    }

    fn gravity(&self) -> Vec2 {
        self.gravity
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
