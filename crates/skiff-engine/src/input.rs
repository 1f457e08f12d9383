//! Input state consumed by game objects.
//!
//! The engine never talks to a window system. Whatever drives the frame loop
//! hands the game an [`InputState`]; [`KeyState`] is an in-memory
//! implementation used by headless runs and tests.

use std::collections::HashSet;

use crate::math::Vec2;

/// Keyboard keys games react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Space,
    Escape,
    Char(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
}

/// Read-only view of the current input.
pub trait InputState {
    fn is_key_down(&self, key: Key) -> bool;
    fn is_button_down(&self, button: MouseButton) -> bool;
    /// Cursor position in world coordinates.
    fn cursor(&self) -> Vec2;
}

/// Input state that only changes when told to.
#[derive(Debug, Clone, Default)]
pub struct KeyState {
    keys: HashSet<Key>,
    buttons: HashSet<MouseButton>,
    cursor: Vec2,
}

impl KeyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, key: Key) {
        self.keys.insert(key);
    }

    pub fn release(&mut self, key: Key) {
        self.keys.remove(&key);
    }

    pub fn press_button(&mut self, button: MouseButton) {
        self.buttons.insert(button);
    }

    pub fn release_button(&mut self, button: MouseButton) {
        self.buttons.remove(&button);
    }

    pub fn set_cursor(&mut self, cursor: Vec2) {
        self.cursor = cursor;
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.buttons.clear();
    }
}

impl InputState for KeyState {
    fn is_key_down(&self, key: Key) -> bool {
        self.keys.contains(&key)
    }

    fn is_button_down(&self, button: MouseButton) -> bool {
        self.buttons.contains(&button)
    }

    fn cursor(&self) -> Vec2 {
        self.cursor
    }
}
