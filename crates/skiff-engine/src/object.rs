//! The game object trait and the per-frame update context.

use skiff_core::entity::EntityId;

use crate::body::{Body, BodyId, BodyState};
use crate::context::SpawnRequest;
use crate::input::InputState;
use crate::physics::PhysicsBackend;
use crate::render::{ChildSprite, Drawable};

/// A simulated game object.
///
/// The game calls [`create_body`](GameObject::create_body) once when the
/// object is added, [`update`](GameObject::update) once per frame after the
/// physics steps, and [`cleanup`](GameObject::cleanup) once after the object
/// has been removed from every layer.
pub trait GameObject: Send {
    /// Name of the declared class this object belongs to.
    fn class_name(&self) -> &str;

    fn create_body(&self) -> Body;

    /// Visual children that follow the body.
    fn children(&self) -> Vec<ChildSprite> {
        Vec::new()
    }

    fn update(&mut self, _ctx: &mut UpdateContext<'_>) {}

    fn cleanup(&mut self) {}
}

/// Entity additions and removals requested while objects update.
#[derive(Debug, Default)]
pub(crate) struct FrameRequests {
    pub(crate) spawns: Vec<SpawnRequest>,
    pub(crate) removals: Vec<EntityId>,
}

impl FrameRequests {
    pub(crate) fn is_empty(&self) -> bool {
        self.spawns.is_empty() && self.removals.is_empty()
    }
}

/// What a game object can see and do during [`GameObject::update`].
///
/// Spawns and removals take effect after every object has been updated.
pub struct UpdateContext<'a> {
    now: f64,
    dt: f64,
    entity: EntityId,
    body: Option<BodyId>,
    input: &'a dyn InputState,
    backend: &'a mut dyn PhysicsBackend,
    drawable: &'a mut Drawable,
    requests: &'a mut FrameRequests,
}

impl<'a> UpdateContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        now: f64,
        dt: f64,
        entity: EntityId,
        body: Option<BodyId>,
        input: &'a dyn InputState,
        backend: &'a mut dyn PhysicsBackend,
        drawable: &'a mut Drawable,
        requests: &'a mut FrameRequests,
    ) -> Self {
        Self {
            now,
            dt,
            entity,
            body,
            input,
            backend,
            drawable,
            requests,
        }
    }

    /// Wall-clock time of this frame, in seconds.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Elapsed time since the previous frame.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn input(&self) -> &dyn InputState {
        self.input
    }

    /// The entity's current body state. `None` for background entities.
    pub fn body_state(&self) -> Option<BodyState> {
        self.body.and_then(|body| self.backend.body_state(body))
    }

    /// Edit the entity's body. Returns `false` for background entities.
    pub fn update_body(&mut self, mut edit: impl FnMut(&mut BodyState)) -> bool {
        match self.body {
            Some(body) => self.backend.update_body(body, &mut edit).is_ok(),
            None => false,
        }
    }

    pub fn drawable(&self) -> &Drawable {
        self.drawable
    }

    /// Show or hide a child sprite. Returns `false` if there is no such
    /// child.
    pub fn set_child_visible(&mut self, name: &str, visible: bool) -> bool {
        self.drawable.set_child_visible(name, visible)
    }

    pub fn spawn(&mut self, object: Box<dyn GameObject>) {
        self.requests.spawns.push(SpawnRequest {
            object,
            background: false,
        });
    }

    pub fn spawn_background(&mut self, object: Box<dyn GameObject>) {
        self.requests.spawns.push(SpawnRequest {
            object,
            background: true,
        });
    }

    pub fn remove(&mut self, entity: EntityId) {
        self.requests.removals.push(entity);
    }

    pub fn remove_self(&mut self) {
        self.requests.removals.push(self.entity);
    }
}
