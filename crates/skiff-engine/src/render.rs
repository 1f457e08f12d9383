//! Presentation state read by an external renderer.
//!
//! The engine does not draw anything. Each entity owns a [`Drawable`] that the
//! game keeps in sync with its body after every frame's physics steps; a
//! renderer walks [`Game::drawables`](crate::game::Game::drawables) layer by
//! layer and draws what it finds.

use skiff_core::entity::EntityId;

use crate::body::BodyState;
use crate::math::{presentation_rotation, Vec2};

/// Draw layer. Background is drawn first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderLayer {
    Background,
    Main,
}

/// A purely visual sprite attached to an entity.
///
/// Children have no physics. They follow the parent's transform plus an
/// offset given in the parent's local frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildSprite {
    pub name: String,
    pub offset: Vec2,
    pub visible: bool,
}

impl ChildSprite {
    pub fn new(name: impl Into<String>, offset: Vec2) -> Self {
        Self {
            name: name.into(),
            offset,
            visible: true,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

/// Current transform of a child sprite.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildTransform {
    pub sprite: ChildSprite,
    pub position: Vec2,
    /// Degrees, same convention as [`Drawable::rotation`].
    pub rotation: f64,
}

/// Presentation transform of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Drawable {
    pub entity: EntityId,
    pub class: String,
    pub layer: RenderLayer,
    pub position: Vec2,
    /// Degrees in `[0, 360)`.
    pub rotation: f64,
    /// Children share the parent's layer.
    pub children: Vec<ChildTransform>,
}

impl Drawable {
    pub(crate) fn new(
        entity: EntityId,
        class: &str,
        layer: RenderLayer,
        children: Vec<ChildSprite>,
    ) -> Self {
        Self {
            entity,
            class: class.to_owned(),
            layer,
            position: Vec2::ZERO,
            rotation: presentation_rotation(0.0),
            children: children
                .into_iter()
                .map(|sprite| ChildTransform {
                    sprite,
                    position: Vec2::ZERO,
                    rotation: presentation_rotation(0.0),
                })
                .collect(),
        }
    }

    /// Copy the body's transform. Returns `false` and leaves the previous
    /// transform untouched when the state is not finite.
    pub(crate) fn sync(&mut self, state: &BodyState) -> bool {
        if !state.position.is_finite() || !state.angle.is_finite() {
            return false;
        }
        self.position = state.position;
        self.rotation = presentation_rotation(state.angle);
        for child in &mut self.children {
            child.position = state.to_world(child.sprite.offset);
            child.rotation = self.rotation;
        }
        true
    }

    pub fn child(&self, name: &str) -> Option<&ChildTransform> {
        self.children.iter().find(|c| c.sprite.name == name)
    }

    pub(crate) fn set_child_visible(&mut self, name: &str, visible: bool) -> bool {
        match self.children.iter_mut().find(|c| c.sprite.name == name) {
            Some(child) => {
                child.sprite.visible = visible;
                true
            }
            None => false,
        }
    }
}
