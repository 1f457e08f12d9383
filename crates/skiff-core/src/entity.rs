//! Entity identifiers and allocation.
//!
//! An [`EntityId`] is a 64-bit handle with a *generation* in the high 32 bits
//! and a slot *index* in the low 32 bits. A slot is only handed out again
//! after the entity that used it has been fully unregistered, and the bumped
//! generation makes any handle kept by gameplay code detectably stale.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A generational entity identifier.
///
/// Layout: `[generation: u32 | index: u32]`. Ordering follows the raw value,
/// which gives stable iteration order in ordered maps.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Construct an `EntityId` from a slot index and generation.
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    /// The slot index (low 32 bits).
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// The generation (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

/// Hands out [`EntityId`]s and recycles released slots.
///
/// Released slots wait in a FIFO queue, so a slot is not reused until every
/// slot released before it has been reused first.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    generations: Vec<u32>,
    alive: Vec<bool>,
    free_slots: VecDeque<u32>,
    live: usize,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh id, reusing the oldest released slot if there is one.
    pub fn allocate(&mut self) -> EntityId {
        self.live += 1;
        if let Some(index) = self.free_slots.pop_front() {
            self.alive[index as usize] = true;
            return EntityId::new(index, self.generations[index as usize]);
        }
        let index = self.generations.len() as u32;
        self.generations.push(0);
        self.alive.push(true);
        EntityId::new(index, 0)
    }

    /// Release an id. The slot's generation is bumped so the released handle
    /// never matches again.
    ///
    /// Returns `false` for ids that are stale, already released or were never
    /// allocated.
    pub fn deallocate(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        let idx = id.index() as usize;
        self.alive[idx] = false;
        self.generations[idx] = self.generations[idx].wrapping_add(1);
        self.free_slots.push_back(id.index());
        self.live -= 1;
        true
    }

    /// Whether `id` is allocated and its generation is current.
    pub fn is_alive(&self, id: EntityId) -> bool {
        let idx = id.index() as usize;
        idx < self.generations.len() && self.alive[idx] && self.generations[idx] == id.generation()
    }

    /// Number of ids currently allocated.
    pub fn alive_count(&self) -> usize {
        self.live
    }

    /// Iterate over every allocated id in slot order.
    pub fn iter_alive(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .map(|(idx, _)| EntityId::new(idx as u32, self.generations[idx]))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
