//! Collision handler table and the invocation contract shared by backends.
//!
//! Classes declare handlers explicitly through [`ClassSpec::on`]. At backend
//! construction [`HandlerTable::wire`] installs every handler whose target
//! class is listed in the declaring class's `collides_with`, keyed by
//! `(source type, destination type, phase)`.
//!
//! Backends report each contact as a [`RawContact`] and call
//! [`dispatch_pair`], which:
//!
//! 1. resolves both bodies to entities and skips the contact if either fails,
//! 2. runs the handler declared by the first body's class against the second,
//! 3. re-checks that both entities are still registered,
//! 4. runs the handler declared by the second body's class against the first,
//! 5. returns whether the contact should proceed (`true` when no handler
//!    objects).

use std::collections::HashMap;
use std::fmt;

use skiff_core::class::{ClassCatalog, ClassDescriptor};
use skiff_core::entity::EntityId;
use skiff_core::registry::CollisionType;
use skiff_core::CoreError;

use crate::body::{BodyId, BodyState, ShapeGeometry};
use crate::context::CollisionContext;
use crate::math::Vec2;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Point in a contact's life at which a handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Shapes started touching. Returning `false` ignores the contact until
    /// the shapes separate.
    Begin,
    /// Shapes are touching this step, before the response is applied.
    /// Returning `false` skips the response for this step.
    PreSolve,
    /// The response has been applied; [`Arbiter::impulse`] is set.
    PostSolve,
    /// Shapes stopped touching.
    Separate,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Begin, Phase::PreSolve, Phase::PostSolve, Phase::Separate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Begin => "begin",
            Phase::PreSolve => "pre_solve",
            Phase::PostSolve => "post_solve",
            Phase::Separate => "separate",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Contacts
// ---------------------------------------------------------------------------

/// One side of a contact as seen by the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactParty {
    pub body: BodyId,
    pub collision_type: CollisionType,
    pub shape: ShapeGeometry,
    pub state: BodyState,
}

/// A contact between two shapes, before entities are resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawContact {
    pub a: ContactParty,
    pub b: ContactParty,
    /// Unit normal pointing from `a` towards `b`.
    pub normal: Vec2,
    /// Penetration depth, zero when merely touching or separating.
    pub depth: f64,
    /// Total impulse applied to `b`. Zero outside post-solve.
    pub impulse: Vec2,
}

impl RawContact {
    pub fn key(&self) -> (BodyId, BodyId) {
        pair_key(self.a.body, self.b.body)
    }
}

/// Order-independent key of a body pair.
pub fn pair_key(a: BodyId, b: BodyId) -> (BodyId, BodyId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// One side of a contact as seen by a handler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactSide {
    pub entity: EntityId,
    pub body: BodyId,
    pub collision_type: CollisionType,
    pub shape: ShapeGeometry,
    pub state: BodyState,
}

/// Contact description passed to handlers.
///
/// `first` always belongs to the class that declared the handler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arbiter {
    pub phase: Phase,
    pub first: ContactSide,
    pub second: ContactSide,
    /// Unit normal pointing from `first` towards `second`.
    pub normal: Vec2,
    pub depth: f64,
    /// Impulse applied to `second` by the response. Only set in post-solve.
    pub impulse: Vec2,
}

impl Arbiter {
    fn swapped(&self) -> Arbiter {
        Arbiter {
            phase: self.phase,
            first: self.second,
            second: self.first,
            normal: -self.normal,
            depth: self.depth,
            impulse: -self.impulse,
        }
    }

    /// Relative speed of `second` towards `first` along the normal.
    pub fn approach_speed(&self) -> f64 {
        (self.first.state.velocity - self.second.state.velocity).dot(self.normal)
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// A collision handler. The return value only matters for
/// [`Phase::Begin`] and [`Phase::PreSolve`].
pub type CollisionHandler = fn(&Arbiter, &mut CollisionContext<'_>) -> bool;

/// Declaration of an entity class: its collision partners and handlers.
#[derive(Clone)]
pub struct ClassSpec {
    descriptor: ClassDescriptor,
    handlers: Vec<(String, Phase, CollisionHandler)>,
}

impl ClassSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            descriptor: ClassDescriptor::new(name),
            handlers: Vec::new(),
        }
    }

    pub fn collides_with(mut self, others: &[&str]) -> Self {
        self.descriptor = self.descriptor.collides_with(others);
        self
    }

    /// Run `handler` when a shape of this class meets one of `other` in
    /// `phase`. Declaring a handler again for the same pair and phase
    /// replaces the earlier one.
    pub fn on(mut self, other: &str, phase: Phase, handler: CollisionHandler) -> Self {
        self.handlers
            .retain(|(o, p, _)| !(o.as_str() == other && *p == phase));
        self.handlers.push((other.to_owned(), phase, handler));
        self
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ClassDescriptor {
        &self.descriptor
    }
}

impl fmt::Debug for ClassSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers: Vec<String> = self
            .handlers
            .iter()
            .map(|(other, phase, _)| format!("{other}:{phase}"))
            .collect();
        f.debug_struct("ClassSpec")
            .field("descriptor", &self.descriptor)
            .field("handlers", &handlers)
            .finish()
    }
}

/// Handlers keyed by `(source type, destination type, phase)`.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<(CollisionType, CollisionType, Phase), CollisionHandler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table for `specs`, whose classes must all be declared in
    /// `catalog`.
    ///
    /// Handlers aimed at a class the declaring class does not list in
    /// `collides_with` are never called; they are logged and dropped.
    pub fn wire(catalog: &ClassCatalog, specs: &[ClassSpec]) -> Result<Self, CoreError> {
        let mut table = Self::new();
        for spec in specs {
            let src = catalog.collision_type(spec.name())?;
            for (other, phase, handler) in &spec.handlers {
                if !spec.descriptor.lists(other) {
                    tracing::warn!(
                        class = spec.name(),
                        other = other.as_str(),
                        phase = %phase,
                        "handler ignored: class does not list the other class in collides_with"
                    );
                    continue;
                }
                let dst = catalog.collision_type(other)?;
                tracing::info!(
                    class = spec.name(),
                    other = other.as_str(),
                    phase = %phase,
                    "wired collision handler"
                );
                table.insert(src, dst, *phase, *handler);
            }
        }
        Ok(table)
    }

    pub fn insert(
        &mut self,
        src: CollisionType,
        dst: CollisionType,
        phase: Phase,
        handler: CollisionHandler,
    ) {
        self.handlers.insert((src, dst, phase), handler);
    }

    pub fn get(
        &self,
        src: CollisionType,
        dst: CollisionType,
        phase: Phase,
    ) -> Option<CollisionHandler> {
        self.handlers.get(&(src, dst, phase)).copied()
    }

    /// Whether a handler exists for the pair in either orientation.
    pub fn has_any(&self, a: CollisionType, b: CollisionType, phase: Phase) -> bool {
        self.handlers.contains_key(&(a, b, phase)) || self.handlers.contains_key(&(b, a, phase))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.handlers.keys().collect();
        keys.sort();
        f.debug_struct("HandlerTable").field("keys", &keys).finish()
    }
}

// ---------------------------------------------------------------------------
// dispatch_pair
// ---------------------------------------------------------------------------

fn side(party: &ContactParty, entity: EntityId) -> ContactSide {
    ContactSide {
        entity,
        body: party.body,
        collision_type: party.collision_type,
        shape: party.shape,
        state: party.state,
    }
}

/// Run the handlers of both orientations of `contact` for `phase`.
///
/// Returns `false` when the contact must not proceed: a handler rejected it,
/// or one of the bodies no longer belongs to a registered entity.
pub fn dispatch_pair(
    table: &HandlerTable,
    phase: Phase,
    contact: &RawContact,
    ctx: &mut CollisionContext<'_>,
) -> bool {
    let (entity_a, entity_b) = match (ctx.resolve(contact.a.body), ctx.resolve(contact.b.body)) {
        (Ok(a), Ok(b)) => (a, b),
        _ => {
            tracing::trace!(
                a = %contact.a.body,
                b = %contact.b.body,
                phase = %phase,
                "contact skipped: body no longer registered"
            );
            ctx.note_skipped();
            return false;
        }
    };

    let arbiter = Arbiter {
        phase,
        first: side(&contact.a, entity_a),
        second: side(&contact.b, entity_b),
        normal: contact.normal,
        depth: contact.depth,
        impulse: contact.impulse,
    };
    let (ta, tb) = (contact.a.collision_type, contact.b.collision_type);

    let mut proceed = true;
    if let Some(handler) = table.get(ta, tb, phase) {
        proceed &= handler(&arbiter, ctx);
    }

    if !ctx.is_live(contact.a.body) || !ctx.is_live(contact.b.body) {
        ctx.note_skipped();
        return false;
    }

    if let Some(handler) = table.get(tb, ta, phase) {
        proceed &= handler(&arbiter.swapped(), ctx);
    }

    proceed && ctx.is_live(contact.a.body) && ctx.is_live(contact.b.body)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
