//! rapier2d-backed physics.
//!
//! The [`SolverBackend`] mirrors every body of its [`ObjectSet`] into a rapier
//! rigid body with one collider per shape. Class filters become rapier
//! interaction groups, which are tested in both directions, exactly like
//! [`ShapeFilter::interacts`](skiff_core::class::ShapeFilter::interacts).
//!
//! Collision handlers run inline while rapier steps:
//!
//! | phase      | rapier source                                           |
//! |------------|---------------------------------------------------------|
//! | begin      | `modify_solver_contacts`, first step a pair has contacts |
//! | pre-solve  | `modify_solver_contacts`, after begin                   |
//! | post-solve | contact force event                                     |
//! | separate   | after the step, once the pair has no manifold points    |
//!
//! rapier's collision events follow the solver contacts, which a rejecting
//! handler clears, so they cannot tell an ignored pair from a separated one.
//! Touching pairs are tracked here instead, the same way the naive backend
//! does, and a pair only separates when the narrow phase reports no contact
//! points between its colliders.
//!
//! rapier's hook traits take `&self` and require `Send + Sync`, so the
//! collision context and the per-step pair sets are reached through mutexes
//! for the duration of the step.
//!
//! # Determinism
//!
//! rapier2d is compiled with `enhanced-determinism`; with a fixed step and
//! id-ordered insertion the simulation replays identically on one platform.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use rapier2d::prelude::*;
use skiff_core::class::FilterTable;
use skiff_core::registry::CollisionType;

use crate::body::{BodyId, BodyKind, BodyState, ShapeGeometry};
use crate::config::BackendKind;
use crate::context::CollisionContext;
use crate::dispatch::{dispatch_pair, pair_key, ContactParty, HandlerTable, Phase, RawContact};
use crate::error::PhysicsError;
use crate::math::Vec2;
use crate::physics::{ObjectSet, PhysicsBackend, PhysicsObject};

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

fn to_rapier(v: Vec2) -> Vector<Real> {
    vector![v.x as Real, v.y as Real]
}

fn from_rapier(v: &Vector<Real>) -> Vec2 {
    Vec2::new(v.x as f64, v.y as f64)
}

fn state_of(rb: &RigidBody) -> BodyState {
    BodyState {
        position: from_rapier(rb.translation()),
        angle: rb.rotation().angle() as f64,
        velocity: from_rapier(rb.linvel()),
        angular_velocity: rb.angvel() as f64,
    }
}

fn shared_shape(geometry: &ShapeGeometry) -> SharedShape {
    match *geometry {
        ShapeGeometry::Circle { radius, .. } => SharedShape::ball(radius as Real),
        ShapeGeometry::Segment { a, b, radius } if radius > 0.0 => SharedShape::capsule(
            point![a.x as Real, a.y as Real],
            point![b.x as Real, b.y as Real],
            radius as Real,
        ),
        ShapeGeometry::Segment { a, b, .. } => SharedShape::segment(
            point![a.x as Real, a.y as Real],
            point![b.x as Real, b.y as Real],
        ),
    }
}

/// Which of our shapes a rapier collider stands for.
#[derive(Debug, Clone, Copy)]
struct ColliderTag {
    body: BodyId,
    collision_type: CollisionType,
    shape: ShapeGeometry,
}

/// The colliders a body pair was last seen touching through.
type ColliderPair = (ColliderHandle, ColliderHandle);

/// Whether the narrow phase still has contact points between two colliders.
fn in_contact(narrow_phase: &NarrowPhase, (c1, c2): ColliderPair) -> bool {
    narrow_phase
        .contact_pair(c1, c2)
        .map_or(false, |pair| pair.manifolds.iter().any(|m| !m.points.is_empty()))
}

fn lock<'m, T>(mutex: &'m Mutex<T>) -> MutexGuard<'m, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ---------------------------------------------------------------------------
// Step-time dispatcher
// ---------------------------------------------------------------------------

/// A body pair that produced solver contacts during the current step.
#[derive(Debug, Clone, Copy)]
struct Seen {
    colliders: ColliderPair,
    /// Whether the solver may respond to the pair this step.
    accepted: bool,
}

/// Event handler and physics hooks for one `PhysicsPipeline::step` call.
struct StepDispatch<'s, 'c> {
    handlers: &'s HandlerTable,
    tags: &'s HashMap<ColliderHandle, ColliderTag>,
    /// Pairs touching at the end of the previous step.
    touching: &'s BTreeMap<(BodyId, BodyId), ColliderPair>,
    ctx: Mutex<&'s mut CollisionContext<'c>>,
    ignored: Mutex<&'s mut HashSet<(BodyId, BodyId)>>,
    seen: Mutex<BTreeMap<(BodyId, BodyId), Seen>>,
}

impl StepDispatch<'_, '_> {
    fn party(
        &self,
        bodies: &RigidBodySet,
        colliders: &ColliderSet,
        handle: ColliderHandle,
    ) -> Option<ContactParty> {
        let tag = self.tags.get(&handle)?;
        let parent = colliders.get(handle)?.parent()?;
        let rb = bodies.get(parent)?;
        Some(ContactParty {
            body: tag.body,
            collision_type: tag.collision_type,
            shape: tag.shape,
            state: state_of(rb),
        })
    }

    /// Build a contact for two colliders. The normal comes from rapier when
    /// a manifold is available, otherwise from the body centers.
    fn contact(
        &self,
        bodies: &RigidBodySet,
        colliders: &ColliderSet,
        c1: ColliderHandle,
        c2: ColliderHandle,
        manifold: Option<&ContactManifold>,
    ) -> Option<RawContact> {
        let a = self.party(bodies, colliders, c1)?;
        let b = self.party(bodies, colliders, c2)?;
        let (normal, depth) = match manifold {
            Some(m) => {
                let depth = m
                    .points
                    .iter()
                    .map(|p| -(p.dist as f64))
                    .fold(0.0, f64::max);
                (from_rapier(&m.data.normal), depth)
            }
            None => ((b.state.position - a.state.position).normalize_or_zero(), 0.0),
        };
        Some(RawContact {
            a,
            b,
            normal,
            depth,
            impulse: Vec2::ZERO,
        })
    }

    fn dispatch(&self, phase: Phase, contact: &RawContact) -> bool {
        let mut ctx = lock(&self.ctx);
        dispatch_pair(self.handlers, phase, contact, &mut **ctx)
    }

    fn is_ignored(&self, key: (BodyId, BodyId)) -> bool {
        lock(&self.ignored).contains(&key)
    }

    /// Run begin (on the first step of a touch) and then pre-solve for a
    /// pair. Both run at most once per body pair and step; later manifolds
    /// of the same pair reuse the verdict.
    fn accepts(&self, colliders: ColliderPair, contact: &RawContact) -> bool {
        let key = contact.key();
        let cached = lock(&self.seen).get(&key).map(|seen| seen.accepted);
        if let Some(accepted) = cached {
            return accepted;
        }

        if !self.touching.contains_key(&key) && !self.dispatch(Phase::Begin, contact) {
            lock(&self.ignored).insert(key);
        }
        let accepted = !self.is_ignored(key) && self.dispatch(Phase::PreSolve, contact);
        lock(&self.seen).insert(key, Seen { colliders, accepted });
        accepted
    }

    /// Close a touch: forget any rejection and run the separate handlers.
    fn separate(
        &self,
        bodies: &RigidBodySet,
        colliders: &ColliderSet,
        key: (BodyId, BodyId),
        (c1, c2): ColliderPair,
    ) {
        lock(&self.ignored).remove(&key);
        if let Some(contact) = self.contact(bodies, colliders, c1, c2, None) {
            self.dispatch(Phase::Separate, &contact);
        }
    }

    fn take_seen(&self) -> BTreeMap<(BodyId, BodyId), Seen> {
        std::mem::take(&mut *lock(&self.seen))
    }
}

impl EventHandler for StepDispatch<'_, '_> {
    // Begin and separate are tracked by the backend itself.
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
    }

    fn handle_contact_force_event(
        &self,
        dt: Real,
        bodies: &RigidBodySet,
        colliders: &ColliderSet,
        contact_pair: &ContactPair,
        total_force_magnitude: Real,
    ) {
        let Some(mut contact) = self.contact(
            bodies,
            colliders,
            contact_pair.collider1,
            contact_pair.collider2,
            contact_pair.manifolds.first(),
        ) else {
            return;
        };
        if !self.handlers.has_any(
            contact.a.collision_type,
            contact.b.collision_type,
            Phase::PostSolve,
        ) || self.is_ignored(contact.key())
        {
            return;
        }
        contact.impulse = contact.normal * (total_force_magnitude as f64 * dt as f64);
        self.dispatch(Phase::PostSolve, &contact);
    }
}

impl PhysicsHooks for StepDispatch<'_, '_> {
    fn modify_solver_contacts(&self, context: &mut ContactModificationContext) {
        if context.solver_contacts.is_empty() {
            return;
        }
        let Some(contact) = self.contact(
            context.bodies,
            context.colliders,
            context.collider1,
            context.collider2,
            Some(context.manifold),
        ) else {
            return;
        };
        if !self.accepts((context.collider1, context.collider2), &contact) {
            context.solver_contacts.clear();
        }
    }
}

// ---------------------------------------------------------------------------
// SolverBackend
// ---------------------------------------------------------------------------

/// Physics backend that delegates to rapier2d.
pub struct SolverBackend {
    pipeline: PhysicsPipeline,
    gravity: Vector<Real>,
    integration_params: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    objects: ObjectSet,
    filters: FilterTable,
    handlers: HandlerTable,
    /// Maps our BodyId -> rapier RigidBodyHandle.
    body_handles: HashMap<BodyId, RigidBodyHandle>,
    /// Maps rapier ColliderHandle -> the shape it was built from.
    collider_tags: HashMap<ColliderHandle, ColliderTag>,
    /// Pairs touching at the end of the previous step.
    touching: BTreeMap<(BodyId, BodyId), ColliderPair>,
    /// Pairs whose begin handler rejected the contact.
    ignored: HashSet<(BodyId, BodyId)>,
}

impl SolverBackend {
    pub fn new(gravity: Vec2, filters: FilterTable, handlers: HandlerTable) -> Self {
        Self {
            pipeline: PhysicsPipeline::new(),
            gravity: to_rapier(gravity),
            integration_params: IntegrationParameters::default(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            objects: ObjectSet::default(),
            filters,
            handlers,
            body_handles: HashMap::new(),
            collider_tags: HashMap::new(),
            touching: BTreeMap::new(),
            ignored: HashSet::new(),
        }
    }

    /// Number of rapier rigid bodies.
    pub fn body_count(&self) -> usize {
        self.rigid_body_set.len()
    }

    /// Number of rapier colliders.
    pub fn collider_count(&self) -> usize {
        self.collider_set.len()
    }

    /// Copy rapier's state back into the object set.
    fn sync_objects(&mut self) {
        for (&id, &handle) in &self.body_handles {
            if let (Some(rb), Some(object)) =
                (self.rigid_body_set.get(handle), self.objects.get_mut(id))
            {
                object.body.state = state_of(rb);
            }
        }
    }
}

impl PhysicsBackend for SolverBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Solver
    }

    fn add_object(&mut self, object: PhysicsObject) -> Result<(), PhysicsError> {
        let object = self.objects.admit(object, &self.filters)?;
        let body = &object.body;
        let state = body.state;

        let builder = match body.kind {
            BodyKind::Dynamic => RigidBodyBuilder::dynamic(),
            BodyKind::Kinematic => RigidBodyBuilder::kinematic_velocity_based(),
            BodyKind::Static => RigidBodyBuilder::fixed(),
        };
        let rb = builder
            .translation(to_rapier(state.position))
            .rotation(state.angle as Real)
            .linvel(to_rapier(state.velocity))
            .angvel(state.angular_velocity as Real)
            .build();
        let handle = self.rigid_body_set.insert(rb);

        let total_area: f64 = body.shapes.iter().map(|s| s.geometry.area()).sum();
        for shape in &body.shapes {
            let mut builder = ColliderBuilder::new(shared_shape(&shape.geometry))
                .restitution(shape.elasticity as Real)
                .restitution_combine_rule(CoefficientCombineRule::Multiply)
                .friction(shape.friction as Real)
                .friction_combine_rule(CoefficientCombineRule::Multiply)
                .collision_groups(InteractionGroups::new(
                    Group::from_bits_truncate(shape.filter.categories),
                    Group::from_bits_truncate(shape.filter.mask),
                ))
                .active_events(ActiveEvents::CONTACT_FORCE_EVENTS)
                .active_hooks(ActiveHooks::MODIFY_SOLVER_CONTACTS)
                .contact_force_event_threshold(0.0);
            if let ShapeGeometry::Circle { offset, .. } = shape.geometry {
                builder = builder.translation(to_rapier(offset));
            }
            if body.kind == BodyKind::Dynamic && total_area > 0.0 {
                let share = shape.geometry.area() / total_area;
                builder = builder.mass((body.mass * share) as Real);
            }
            let collider = self.collider_set.insert_with_parent(
                builder.build(),
                handle,
                &mut self.rigid_body_set,
            );
            self.collider_tags.insert(
                collider,
                ColliderTag {
                    body: object.id,
                    collision_type: shape.collision_type,
                    shape: shape.geometry,
                },
            );
        }
        self.body_handles.insert(object.id, handle);
        tracing::debug!(body = %object.id, class = object.class.as_str(), "solver: body added");
        Ok(())
    }

    fn remove_object(&mut self, id: BodyId) -> Result<PhysicsObject, PhysicsError> {
        let object = self.objects.release(id)?;
        if let Some(handle) = self.body_handles.remove(&id) {
            self.rigid_body_set.remove(
                handle,
                &mut self.island_manager,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                true,
            );
        }
        self.collider_tags.retain(|_, tag| tag.body != id);
        self.touching.retain(|&(a, b), _| a != id && b != id);
        self.ignored.retain(|&(a, b)| a != id && b != id);
        tracing::debug!(body = %id, "solver: body removed");
        Ok(object)
    }

    fn step(&mut self, dt: f64, ctx: &mut CollisionContext<'_>) {
        self.integration_params.dt = dt as Real;

        let dispatcher = StepDispatch {
            handlers: &self.handlers,
            tags: &self.collider_tags,
            touching: &self.touching,
            ctx: Mutex::new(ctx),
            ignored: Mutex::new(&mut self.ignored),
            seen: Mutex::new(BTreeMap::new()),
        };

        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &dispatcher,
            &dispatcher,
        );

        // Pairs not seen this step have separated, unless the narrow phase
        // still holds contact points for them (sleeping bodies skip the hook).
        let mut touching: BTreeMap<(BodyId, BodyId), ColliderPair> = dispatcher
            .take_seen()
            .into_iter()
            .map(|(key, seen)| (key, seen.colliders))
            .collect();
        for (&key, &colliders) in self.touching.iter() {
            if touching.contains_key(&key) {
                continue;
            }
            if in_contact(&self.narrow_phase, colliders) {
                touching.insert(key, colliders);
            } else {
                dispatcher.separate(&self.rigid_body_set, &self.collider_set, key, colliders);
            }
        }
        drop(dispatcher);
        self.touching = touching;

        self.sync_objects();
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
        let rb = self
            .body_handles
            .get(&id)
            .and_then(|&handle| self.rigid_body_set.get_mut(handle))
            .ok_or(PhysicsError::NotRegistered { body: id })?;

        let mut state = state_of(rb);
        edit(&mut state);
        rb.set_translation(to_rapier(state.position), true);
        rb.set_rotation(Rotation::new(state.angle as Real), true);
        rb.set_linvel(to_rapier(state.velocity), true);
        rb.set_angvel(state.angular_velocity as Real, true);
        object.body.state = state;
        Ok(())
    }

    fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = to_rapier(gravity);
    }

    fn gravity(&self) -> Vec2 {
        from_rapier(&self.gravity)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{Body, Shape};
    use crate::context::BodyIndex;
    use crate::dispatch::Arbiter;
    use skiff_core::class::{ClassFilter, ShapeFilter};
    use skiff_core::entity::EntityId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BALL: CollisionType = CollisionType::from_bits(1);
    const FLOOR: CollisionType = CollisionType::from_bits(2);

    fn filters(ball_mask: u32, floor_mask: u32) -> FilterTable {
        let mut table = FilterTable::default();
        table.insert(
            "ball",
            ClassFilter {
                collision_type: BALL,
                filter: ShapeFilter::new(1, ball_mask),
            },
        );
        table.insert(
            "floor",
            ClassFilter {
                collision_type: FLOOR,
                filter: ShapeFilter::new(2, floor_mask),
            },
        );
        table
    }

    /// A ball dropping onto a wide floor. Returns `(ball, floor)`.
    fn ball_over_floor(backend: &mut SolverBackend, index: &mut BodyIndex) -> (BodyId, BodyId) {
        let ball = BodyId::from_raw(0);
        let floor = BodyId::from_raw(1);
        backend
            .add_object(PhysicsObject::new(
                ball,
                "ball",
                Body::circle(1.0, 0.5).with_position(Vec2::new(0.0, 2.0)),
            ))
            .unwrap();
        backend
            .add_object(PhysicsObject::new(
                floor,
                "floor",
                Body::fixed().with_shape(Shape::segment(
                    "primary",
                    Vec2::new(-20.0, 0.0),
                    Vec2::new(20.0, 0.0),
                    0.25,
                )),
            ))
            .unwrap();
        index.insert(ball, EntityId::new(0, 0));
        index.insert(floor, EntityId::new(1, 0));
        (ball, floor)
    }

    fn run(backend: &mut SolverBackend, index: &mut BodyIndex, steps: usize) {
        for _ in 0..steps {
            let mut ctx = CollisionContext::new(index);
            backend.step(1.0 / 60.0, &mut ctx);
        }
    }

    #[test]
    fn bodies_and_colliders_are_mirrored() {
        let mut backend = SolverBackend::new(Vec2::ZERO, filters(2, 1), HandlerTable::new());
        let mut index = BodyIndex::new();
        let (ball, _) = ball_over_floor(&mut backend, &mut index);
        assert_eq!(backend.body_count(), 2);
        assert_eq!(backend.collider_count(), 2);
        backend.remove_object(ball).unwrap();
        assert_eq!(backend.body_count(), 1);
        assert_eq!(backend.collider_count(), 1);
        assert!(matches!(
            backend.remove_object(ball),
            Err(PhysicsError::NotRegistered { .. })
        ));
    }

    #[test]
    fn ball_lands_on_floor() {
        let mut backend =
            SolverBackend::new(Vec2::new(0.0, -9.81), filters(2, 1), HandlerTable::new());
        let mut index = BodyIndex::new();
        let (ball, _) = ball_over_floor(&mut backend, &mut index);
        run(&mut backend, &mut index, 180);
        let y = backend.body_state(ball).unwrap().position.y;
        assert!(y > 0.5 && y < 1.0, "ball should rest on the floor, got y={y}");
    }

    #[test]
    fn one_sided_filter_lets_ball_fall_through() {
        let mut backend =
            SolverBackend::new(Vec2::new(0.0, -9.81), filters(2, 0), HandlerTable::new());
        let mut index = BodyIndex::new();
        let (ball, _) = ball_over_floor(&mut backend, &mut index);
        run(&mut backend, &mut index, 180);
        assert!(backend.body_state(ball).unwrap().position.y < -5.0);
    }

    static LANDINGS: AtomicUsize = AtomicUsize::new(0);

    fn count_landing(arbiter: &Arbiter, _: &mut CollisionContext<'_>) -> bool {
        assert_eq!(arbiter.first.collision_type, BALL);
        LANDINGS.fetch_add(1, Ordering::SeqCst);
        true
    }

    #[test]
    fn begin_handler_runs_on_landing() {
        let mut handlers = HandlerTable::new();
        handlers.insert(BALL, FLOOR, Phase::Begin, count_landing);
        let mut backend = SolverBackend::new(Vec2::new(0.0, -9.81), filters(2, 1), handlers);
        let mut index = BodyIndex::new();
        ball_over_floor(&mut backend, &mut index);
        run(&mut backend, &mut index, 180);
        assert!(LANDINGS.load(Ordering::SeqCst) >= 1);
    }

    fn phase_through(_: &Arbiter, _: &mut CollisionContext<'_>) -> bool {
        false
    }

    #[test]
    fn rejecting_pre_solve_disables_response() {
        let mut handlers = HandlerTable::new();
        handlers.insert(BALL, FLOOR, Phase::PreSolve, phase_through);
        let mut backend = SolverBackend::new(Vec2::new(0.0, -9.81), filters(2, 1), handlers);
        let mut index = BodyIndex::new();
        let (ball, _) = ball_over_floor(&mut backend, &mut index);
        run(&mut backend, &mut index, 180);
        assert!(backend.body_state(ball).unwrap().position.y < -5.0);
    }

    fn remove_ball(arbiter: &Arbiter, ctx: &mut CollisionContext<'_>) -> bool {
        ctx.remove_entity(arbiter.first.entity);
        true
    }

    #[test]
    fn removal_inside_step_is_deferred() {
        let mut handlers = HandlerTable::new();
        handlers.insert(BALL, FLOOR, Phase::Begin, remove_ball);
        let mut backend = SolverBackend::new(Vec2::new(0.0, -9.81), filters(2, 1), handlers);
        let mut index = BodyIndex::new();
        let (ball, floor) = ball_over_floor(&mut backend, &mut index);

        let mut removals = Vec::new();
        for _ in 0..180 {
            let mut ctx = CollisionContext::new(&mut index);
            backend.step(1.0 / 60.0, &mut ctx);
            let outcome = ctx.finish();
            for (_, body) in outcome.removals {
                // Still present until the game removes it.
                assert!(backend.objects().contains(body));
                backend.remove_object(body).unwrap();
                removals.push(body);
            }
        }
        assert_eq!(removals, vec![ball]);
        assert!(index.entity_for(floor).is_some());
        assert_eq!(backend.body_count(), 1);
    }

    static PHASES: Mutex<Vec<(Phase, f64)>> = Mutex::new(Vec::new());

    fn log_phase(phase: Phase, arbiter: &Arbiter) {
        lock(&PHASES).push((phase, arbiter.first.state.position.y));
    }

    fn reject_begin(arbiter: &Arbiter, _: &mut CollisionContext<'_>) -> bool {
        log_phase(Phase::Begin, arbiter);
        false
    }

    fn log_pre_solve(arbiter: &Arbiter, _: &mut CollisionContext<'_>) -> bool {
        log_phase(Phase::PreSolve, arbiter);
        true
    }

    fn log_post_solve(arbiter: &Arbiter, _: &mut CollisionContext<'_>) -> bool {
        log_phase(Phase::PostSolve, arbiter);
        true
    }

    fn log_separate(arbiter: &Arbiter, _: &mut CollisionContext<'_>) -> bool {
        log_phase(Phase::Separate, arbiter);
        true
    }

    #[test]
    fn rejected_begin_ignores_contact_until_separation() {
        let mut handlers = HandlerTable::new();
        handlers.insert(BALL, FLOOR, Phase::Begin, reject_begin);
        handlers.insert(BALL, FLOOR, Phase::PreSolve, log_pre_solve);
        handlers.insert(BALL, FLOOR, Phase::PostSolve, log_post_solve);
        handlers.insert(BALL, FLOOR, Phase::Separate, log_separate);
        let mut backend = SolverBackend::new(Vec2::new(0.0, -9.81), filters(2, 1), handlers);
        let mut index = BodyIndex::new();
        let (ball, _) = ball_over_floor(&mut backend, &mut index);
        run(&mut backend, &mut index, 180);

        let log = lock(&PHASES).clone();
        let phases: Vec<Phase> = log.iter().map(|&(phase, _)| phase).collect();
        assert_eq!(phases, vec![Phase::Begin, Phase::Separate], "got {log:?}");
        // Ball radius 0.5 plus floor radius 0.25: the ball is fully below.
        let (_, separated_at) = log[1];
        assert!(separated_at < -0.7, "separated while overlapping at y={separated_at}");
        assert!(backend.body_state(ball).unwrap().position.y < -5.0);
        assert!(backend.ignored.is_empty());
        assert!(backend.touching.is_empty());
    }

    static RESTING_BEGINS: AtomicUsize = AtomicUsize::new(0);
    static RESTING_SEPARATES: AtomicUsize = AtomicUsize::new(0);

    fn count_resting_begin(_: &Arbiter, _: &mut CollisionContext<'_>) -> bool {
        RESTING_BEGINS.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn count_resting_separate(_: &Arbiter, _: &mut CollisionContext<'_>) -> bool {
        RESTING_SEPARATES.fetch_add(1, Ordering::SeqCst);
        true
    }

    #[test]
    fn resting_contact_begins_once_and_never_separates() {
        let mut handlers = HandlerTable::new();
        handlers.insert(BALL, FLOOR, Phase::Begin, count_resting_begin);
        handlers.insert(BALL, FLOOR, Phase::Separate, count_resting_separate);
        let mut backend = SolverBackend::new(Vec2::new(0.0, -9.81), filters(2, 1), handlers);
        let mut index = BodyIndex::new();
        let (bouncy, floor) = ball_over_floor(&mut backend, &mut index);
        backend.remove_object(bouncy).unwrap();
        let ball = BodyId::from_raw(2);
        backend
            .add_object(PhysicsObject::new(
                ball,
                "ball",
                Body::dynamic(1.0)
                    .with_shape(Shape::circle("primary", 0.5).with_elasticity(0.0))
                    .with_position(Vec2::new(0.0, 2.0)),
            ))
            .unwrap();
        index.remove_body(bouncy);
        index.insert(ball, EntityId::new(2, 0));
        assert!(index.entity_for(floor).is_some());
        // Long enough for the ball to fall asleep on the floor.
        run(&mut backend, &mut index, 600);
        assert_eq!(RESTING_BEGINS.load(Ordering::SeqCst), 1);
        assert_eq!(RESTING_SEPARATES.load(Ordering::SeqCst), 0);
        let y = backend.body_state(ball).unwrap().position.y;
        assert!(y > 0.5 && y < 1.0, "ball should rest on the floor, got y={y}");
    }

    #[test]
    fn update_body_moves_rapier_body() {
        let mut backend = SolverBackend::new(Vec2::ZERO, filters(0, 0), HandlerTable::new());
        let mut index = BodyIndex::new();
        let (ball, _) = ball_over_floor(&mut backend, &mut index);
        backend
            .update_body(ball, &mut |s| {
                s.position = Vec2::new(5.0, 5.0);
                s.velocity = Vec2::new(1.0, 0.0);
            })
            .unwrap();
        run(&mut backend, &mut index, 60);
        let state = backend.body_state(ball).unwrap();
        assert!((state.position.x - 6.0).abs() < 0.05, "got {state:?}");
        assert!((state.position.y - 5.0).abs() < 0.05);
    }

    #[test]
    fn gravity_can_change_at_runtime() {
        let mut backend = SolverBackend::new(Vec2::ZERO, filters(0, 0), HandlerTable::new());
        backend.set_gravity(Vec2::new(3.0, 0.0));
        assert_eq!(backend.gravity(), Vec2::new(3.0, 0.0));
    }
}
