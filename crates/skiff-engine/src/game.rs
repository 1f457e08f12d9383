//! The entity lifecycle manager.
//!
//! A [`Game`] keeps four views of every entity consistent: the game object
//! itself, its body in the physics backend, its entry in the [`BodyIndex`]
//! and its [`Drawable`] in a render layer. Entities enter through
//! [`Game::add_entity`] and leave through [`Game::remove_entity`], or through
//! the deferred removal paths offered to collision handlers and object
//! updates.
//!
//! # Frame order
//!
//! [`Game::advance_frame`] runs:
//!
//! 1. Zero or more fixed physics steps. After each step the removals and
//!    spawns requested by collision handlers are applied (removals first),
//!    then the post-physics-step hook runs.
//! 2. Drawables are synchronized from body state. Non-finite states are
//!    skipped for the frame.
//! 3. Every simulated entity's [`GameObject::update`] runs.
//! 4. Removals and spawns requested by the updates are applied.

use std::collections::BTreeMap;

use skiff_core::class::ClassCatalog;
use skiff_core::entity::{EntityAllocator, EntityId};

use crate::body::{Body, BodyId, BodyState};
use crate::clock::SimulationClock;
use crate::config::{BackendKind, EngineConfig};
use crate::context::{BodyIndex, CollisionContext};
use crate::dispatch::{ClassSpec, HandlerTable};
use crate::error::{EngineError, LifecycleError};
use crate::input::InputState;
use crate::math::Vec2;
use crate::object::{FrameRequests, GameObject, UpdateContext};
use crate::physics::{create_backend, PhysicsBackend, PhysicsObject};
use crate::render::{Drawable, RenderLayer};

/// Callback run once after every physics step.
pub type PostStepHook = Box<dyn FnMut(&mut Game) + Send>;

// ---------------------------------------------------------------------------
// FrameReport
// ---------------------------------------------------------------------------

/// Summary of one [`Game::advance_frame`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Fixed physics steps run.
    pub steps: u32,
    /// Entities whose drawable was not synchronized because their body state
    /// was not finite.
    pub degenerate: u32,
    /// Contacts skipped because a body was removed earlier in the same step.
    pub skipped_contacts: u32,
    pub removed: u32,
    pub spawned: u32,
}

// ---------------------------------------------------------------------------
// GameBuilder
// ---------------------------------------------------------------------------

/// Declares the entity classes and builds a [`Game`].
///
/// ```
/// use skiff_engine::prelude::*;
///
/// fn split(_: &Arbiter, _: &mut CollisionContext<'_>) -> bool {
///     true
/// }
///
/// let game = GameBuilder::new(EngineConfig::default())
///     .class(ClassSpec::new("asteroid").collides_with(&["bullet"]))
///     .class(
///         ClassSpec::new("bullet")
///             .collides_with(&["asteroid"])
///             .on("asteroid", Phase::Begin, split),
///     )
///     .build()
///     .unwrap();
/// assert_eq!(game.entity_count(), 0);
/// ```
pub struct GameBuilder {
    config: EngineConfig,
    specs: Vec<ClassSpec>,
    post_step: Option<PostStepHook>,
}

impl GameBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            specs: Vec::new(),
            post_step: None,
        }
    }

    /// Declare an entity class. Classes receive collision types in
    /// declaration order.
    pub fn class(mut self, spec: ClassSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn post_physics_step(mut self, hook: impl FnMut(&mut Game) + Send + 'static) -> Self {
        self.post_step = Some(Box::new(hook));
        self
    }

    /// Validate the configuration and the class declarations, wire the
    /// collision handlers and create the physics backend.
    pub fn build(self) -> Result<Game, EngineError> {
        self.config.validate()?;

        let mut catalog = ClassCatalog::new();
        for spec in &self.specs {
            catalog.declare(spec.descriptor().clone())?;
        }
        catalog.validate()?;

        let filters = catalog.filters()?;
        let handlers = HandlerTable::wire(&catalog, &self.specs)?;
        let backend = create_backend(
            self.config.physics,
            self.config.gravity_vector(),
            filters,
            handlers,
        );
        let clock = SimulationClock::new(self.config.physics_rate())?
            .with_max_steps(self.config.max_steps_per_advance);

        tracing::info!(
            classes = catalog.descriptors().len(),
            backend = %self.config.physics,
            physics_rate = self.config.physics_rate(),
            "game built"
        );

        Ok(Game {
            config: self.config,
            catalog,
            backend,
            clock,
            allocator: EntityAllocator::new(),
            next_body: 0,
            index: BodyIndex::new(),
            entities: BTreeMap::new(),
            post_step: self.post_step,
            hook_generation: 0,
            requests: FrameRequests::default(),
        })
    }
}

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

struct EntityRecord {
    object: Box<dyn GameObject>,
    body: BodyId,
    background: bool,
    /// The body of a background entity, which never enters the backend.
    detached: Option<Body>,
    drawable: Drawable,
}

/// Owns every entity and drives the simulation.
pub struct Game {
    config: EngineConfig,
    catalog: ClassCatalog,
    backend: Box<dyn PhysicsBackend>,
    clock: SimulationClock,
    allocator: EntityAllocator,
    next_body: u64,
    index: BodyIndex,
    entities: BTreeMap<EntityId, EntityRecord>,
    post_step: Option<PostStepHook>,
    /// Bumped whenever the hook is set or cleared.
    hook_generation: u64,
    requests: FrameRequests,
}

impl Game {
    /// Register an object.
    ///
    /// Background entities get a body and a body index entry but are never
    /// simulated and never updated.
    pub fn add_entity(
        &mut self,
        object: Box<dyn GameObject>,
        background: bool,
    ) -> Result<EntityId, EngineError> {
        let class = object.class_name().to_owned();
        if self.catalog.descriptor(&class).is_none() {
            return Err(LifecycleError::UnknownClass {
                class,
                declared: self.catalog.registry().registered_names().join(", "),
            }
            .into());
        }

        let body = object.create_body();
        let state = body.state;
        let body_id = BodyId::from_raw(self.next_body);
        let detached = if background {
            Some(body)
        } else {
            self.backend
                .add_object(PhysicsObject::new(body_id, class.as_str(), body))
                .map_err(LifecycleError::from)?;
            None
        };
        self.next_body += 1;

        let entity = self.allocator.allocate();
        self.index.insert(body_id, entity);

        let layer = if background {
            RenderLayer::Background
        } else {
            RenderLayer::Main
        };
        let mut drawable = Drawable::new(entity, &class, layer, object.children());
        drawable.sync(&state);

        tracing::debug!(%entity, body = %body_id, class = class.as_str(), background, "entity added");
        self.entities.insert(
            entity,
            EntityRecord {
                object,
                body: body_id,
                background,
                detached,
                drawable,
            },
        );
        Ok(entity)
    }

    /// Unregister an entity from the backend and its render layer, run its
    /// cleanup hook and release its id.
    pub fn remove_entity(&mut self, entity: EntityId) -> Result<(), EngineError> {
        let record = self
            .entities
            .get(&entity)
            .ok_or(LifecycleError::UnknownEntity { entity })?;
        if !record.background {
            self.backend
                .remove_object(record.body)
                .map_err(LifecycleError::from)?;
        }
        self.index.remove_entity(entity);
        if let Some(mut record) = self.entities.remove(&entity) {
            record.object.cleanup();
        }
        self.allocator.deallocate(entity);
        tracing::debug!(%entity, "entity removed");
        Ok(())
    }

    /// Complete a removal requested during a step. The body index entry is
    /// already gone.
    fn finish_removal(&mut self, entity: EntityId, body: BodyId) {
        let Some(mut record) = self.entities.remove(&entity) else {
            return;
        };
        if !record.background {
            if let Err(err) = self.backend.remove_object(body) {
                tracing::warn!(%entity, %body, error = %err, "deferred removal found no body");
            }
        }
        record.object.cleanup();
        self.allocator.deallocate(entity);
        tracing::debug!(%entity, %body, "entity removed after step");
    }

    pub fn get_entity_from_body(&self, body: BodyId) -> Result<EntityId, LifecycleError> {
        self.index
            .entity_for(body)
            .ok_or(LifecycleError::UnknownBody { body })
    }

    pub fn body_of(&self, entity: EntityId) -> Option<BodyId> {
        self.index.body_for(entity)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Registered entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    /// Class name of a registered entity.
    pub fn class_of(&self, entity: EntityId) -> Option<&str> {
        self.entities
            .get(&entity)
            .map(|record| record.drawable.class.as_str())
    }

    pub fn body_state(&self, entity: EntityId) -> Option<BodyState> {
        let record = self.entities.get(&entity)?;
        match &record.detached {
            Some(body) => Some(body.state),
            None => self.backend.body_state(record.body),
        }
    }

    /// Edit an entity's position, angle or velocities.
    pub fn update_body(
        &mut self,
        entity: EntityId,
        mut edit: impl FnMut(&mut BodyState),
    ) -> Result<(), EngineError> {
        let record = self
            .entities
            .get_mut(&entity)
            .ok_or(LifecycleError::UnknownEntity { entity })?;
        match &mut record.detached {
            Some(body) => edit(&mut body.state),
            None => self
                .backend
                .update_body(record.body, &mut edit)
                .map_err(LifecycleError::from)?,
        }
        Ok(())
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.backend.set_gravity(gravity);
    }

    pub fn gravity(&self) -> Vec2 {
        self.backend.gravity()
    }

    /// Category bits of the named classes, for [`point_query_nearest`].
    ///
    /// [`point_query_nearest`]: Self::point_query_nearest
    pub fn categories(&self, classes: &[&str]) -> Result<u32, EngineError> {
        Ok(self.catalog.registry().mask_for(classes)?)
    }

    /// Nearest simulated entity with a shape within `max_distance` of
    /// `point` whose categories intersect `categories`.
    pub fn point_query_nearest(
        &self,
        point: Vec2,
        max_distance: f64,
        categories: u32,
    ) -> Option<EntityId> {
        let hit = self
            .backend
            .point_query_nearest(point, max_distance, categories)?;
        self.index.entity_for(hit.body)
    }

    /// Drawables of one render layer, in entity order.
    pub fn drawables(&self, layer: RenderLayer) -> impl Iterator<Item = &Drawable> + '_ {
        self.entities
            .values()
            .map(|record| &record.drawable)
            .filter(move |drawable| drawable.layer == layer)
    }

    pub fn drawable(&self, entity: EntityId) -> Option<&Drawable> {
        self.entities.get(&entity).map(|record| &record.drawable)
    }

    /// Replace the post-physics-step hook.
    pub fn set_post_physics_step(&mut self, hook: impl FnMut(&mut Game) + Send + 'static) {
        self.post_step = Some(Box::new(hook));
        self.hook_generation += 1;
    }

    pub fn clear_post_physics_step(&mut self) {
        self.post_step = None;
        self.hook_generation += 1;
    }

    // -- accessors ----------------------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn backend(&self) -> &dyn PhysicsBackend {
        self.backend.as_ref()
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    /// Simulated seconds, counting the step in progress.
    pub fn sim_time(&self) -> f64 {
        self.clock.sim_time()
    }

    pub fn step_count(&self) -> u64 {
        self.clock.step_count()
    }

    // -- frame --------------------------------------------------------------

    /// Advance the game by `elapsed` wall-clock seconds.
    ///
    /// `now` is the wall-clock time handed to object updates.
    pub fn advance_frame(
        &mut self,
        now: f64,
        elapsed: f64,
        input: &dyn InputState,
    ) -> Result<FrameReport, EngineError> {
        let mut report = FrameReport::default();

        // The clock counts each step before it runs, so the post-step hook
        // sees the live clock.
        if self.clock.accumulate(elapsed) {
            let dt = self.clock.physics_dt();
            while self.clock.next_step() {
                let result = self.run_fixed_step(dt, &mut report);
                report.steps = self.clock.last_diagnostics().steps;
                result?;
            }
        }

        self.sync_drawables(&mut report);

        let updating: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|(_, record)| !record.background)
            .map(|(&entity, _)| entity)
            .collect();
        for entity in updating {
            let Some(record) = self.entities.get_mut(&entity) else {
                continue;
            };
            let mut ctx = UpdateContext::new(
                now,
                elapsed,
                entity,
                Some(record.body),
                input,
                self.backend.as_mut(),
                &mut record.drawable,
                &mut self.requests,
            );
            record.object.update(&mut ctx);
        }

        self.apply_frame_requests(&mut report)?;
        Ok(report)
    }

    fn run_fixed_step(&mut self, dt: f64, report: &mut FrameReport) -> Result<(), EngineError> {
        let mut ctx = CollisionContext::new(&mut self.index);
        self.backend.step(dt, &mut ctx);
        let outcome = ctx.finish();
        tracing::debug!(
            step = self.clock.step_count(),
            removals = outcome.removals.len(),
            spawns = outcome.spawns.len(),
            skipped = outcome.skipped_contacts,
            "physics step"
        );

        report.skipped_contacts += outcome.skipped_contacts;
        for (entity, body) in outcome.removals {
            self.finish_removal(entity, body);
            report.removed += 1;
        }
        for request in outcome.spawns {
            self.add_entity(request.object, request.background)?;
            report.spawned += 1;
        }

        if let Some(mut hook) = self.post_step.take() {
            let generation = self.hook_generation;
            hook(self);
            // A hook that replaced or cleared itself keeps that change.
            if self.hook_generation == generation {
                self.post_step = Some(hook);
            }
        }
        Ok(())
    }

    fn sync_drawables(&mut self, report: &mut FrameReport) {
        for (entity, record) in &mut self.entities {
            if record.background {
                continue;
            }
            let Some(state) = self.backend.body_state(record.body) else {
                continue;
            };
            if !record.drawable.sync(&state) {
                report.degenerate += 1;
                tracing::debug!(%entity, body = %record.body, "skipping non-finite transform");
            }
        }
    }

    fn apply_frame_requests(&mut self, report: &mut FrameReport) -> Result<(), EngineError> {
        if self.requests.is_empty() {
            return Ok(());
        }
        let requests = std::mem::take(&mut self.requests);
        for entity in requests.removals {
            // Repeated and stale requests are ignored.
            if self.entities.contains_key(&entity) {
                self.remove_entity(entity)?;
                report.removed += 1;
            }
        }
        for request in requests.spawns {
            self.add_entity(request.object, request.background)?;
            report.spawned += 1;
        }
        Ok(())
    }

    /// Check that the body index matches the registered entities.
    pub fn index_is_consistent(&self) -> bool {
        self.index.len() == self.entities.len()
            && self.entities.iter().all(|(&entity, record)| {
                self.index.entity_for(record.body) == Some(entity)
                    && (record.background || self.backend.objects().contains(record.body))
            })
            && self.backend.objects().len()
                == self.entities.values().filter(|r| !r.background).count()
    }
}

impl std::fmt::Debug for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("backend", &self.backend.kind())
            .field("entities", &self.entities.len())
            .field("step_count", &self.clock.step_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
