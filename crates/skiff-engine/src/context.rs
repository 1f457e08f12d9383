//! Body-to-entity bookkeeping and the context handed to collision handlers.
//!
//! During a physics step the backend is iterating its own object set, so
//! nothing may be structurally removed from it. Handlers therefore act through
//! a [`CollisionContext`]:
//!
//! - A removal unlinks the entity from the [`BodyIndex`] at once. Every later
//!   contact involving its body in the same step fails to resolve and is
//!   skipped. The body itself stays in the backend as a tombstone until the
//!   step ends.
//! - Spawns are queued.
//!
//! [`CollisionContext::finish`] hands both queues to the game, which applies
//! removals first, then spawns.

use std::collections::HashMap;

use skiff_core::entity::EntityId;

use crate::body::BodyId;
use crate::error::LifecycleError;
use crate::object::GameObject;

// ---------------------------------------------------------------------------
// BodyIndex
// ---------------------------------------------------------------------------

/// Bidirectional `BodyId <-> EntityId` map.
#[derive(Debug, Default)]
pub struct BodyIndex {
    body_to_entity: HashMap<BodyId, EntityId>,
    entity_to_body: HashMap<EntityId, BodyId>,
}

impl BodyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a body to its entity. Returns `false` if either side was already
    /// linked, in which case nothing changes.
    pub fn insert(&mut self, body: BodyId, entity: EntityId) -> bool {
        if self.body_to_entity.contains_key(&body) || self.entity_to_body.contains_key(&entity) {
            return false;
        }
        self.body_to_entity.insert(body, entity);
        self.entity_to_body.insert(entity, body);
        true
    }

    pub fn entity_for(&self, body: BodyId) -> Option<EntityId> {
        self.body_to_entity.get(&body).copied()
    }

    pub fn body_for(&self, entity: EntityId) -> Option<BodyId> {
        self.entity_to_body.get(&entity).copied()
    }

    /// Unlink by entity, returning its body.
    pub fn remove_entity(&mut self, entity: EntityId) -> Option<BodyId> {
        let body = self.entity_to_body.remove(&entity)?;
        self.body_to_entity.remove(&body);
        Some(body)
    }

    /// Unlink by body, returning its entity.
    pub fn remove_body(&mut self, body: BodyId) -> Option<EntityId> {
        let entity = self.body_to_entity.remove(&body)?;
        self.entity_to_body.remove(&entity);
        Some(entity)
    }

    pub fn contains_body(&self, body: BodyId) -> bool {
        self.body_to_entity.contains_key(&body)
    }

    pub fn len(&self) -> usize {
        self.body_to_entity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body_to_entity.is_empty()
    }

    /// All linked bodies, unordered.
    pub fn bodies(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.body_to_entity.keys().copied()
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// An entity waiting to be added once it is safe to do so.
pub struct SpawnRequest {
    pub object: Box<dyn GameObject>,
    pub background: bool,
}

impl std::fmt::Debug for SpawnRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnRequest")
            .field("class", &self.object.class_name())
            .field("background", &self.background)
            .finish()
    }
}

/// What handlers asked for during one step.
#[derive(Debug, Default)]
pub struct StepOutcome {
    /// Entities unlinked during the step, with the body they owned, in
    /// request order.
    pub removals: Vec<(EntityId, BodyId)>,
    pub spawns: Vec<SpawnRequest>,
    /// Contacts dropped because a body no longer resolved to an entity.
    pub skipped_contacts: u32,
}

// ---------------------------------------------------------------------------
// CollisionContext
// ---------------------------------------------------------------------------

/// Mutable view of the game offered to collision handlers.
pub struct CollisionContext<'a> {
    index: &'a mut BodyIndex,
    removals: Vec<(EntityId, BodyId)>,
    spawns: Vec<SpawnRequest>,
    skipped_contacts: u32,
}

impl<'a> CollisionContext<'a> {
    pub fn new(index: &'a mut BodyIndex) -> Self {
        Self {
            index,
            removals: Vec::new(),
            spawns: Vec::new(),
            skipped_contacts: 0,
        }
    }

    /// Entity owning `body`. Fails for bodies whose entity was removed
    /// earlier in this step.
    pub fn resolve(&self, body: BodyId) -> Result<EntityId, LifecycleError> {
        self.index
            .entity_for(body)
            .ok_or(LifecycleError::UnknownBody { body })
    }

    pub fn is_live(&self, body: BodyId) -> bool {
        self.index.contains_body(body)
    }

    /// Remove an entity. Its body stops resolving immediately; structural
    /// removal happens when the step ends.
    ///
    /// Returns `false` if the entity is unknown or already removed.
    pub fn remove_entity(&mut self, entity: EntityId) -> bool {
        match self.index.remove_entity(entity) {
            Some(body) => {
                tracing::debug!(%entity, %body, "entity removal requested during step");
                self.removals.push((entity, body));
                true
            }
            None => false,
        }
    }

    /// Queue a new entity. It is added after this step's removals.
    pub fn spawn(&mut self, object: Box<dyn GameObject>, background: bool) {
        self.spawns.push(SpawnRequest { object, background });
    }

    pub(crate) fn note_skipped(&mut self) {
        self.skipped_contacts += 1;
    }

    pub fn pending_removals(&self) -> usize {
        self.removals.len()
    }

    pub fn finish(self) -> StepOutcome {
        StepOutcome {
            removals: self.removals,
            spawns: self.spawns,
            skipped_contacts: self.skipped_contacts,
        }
    }
}
