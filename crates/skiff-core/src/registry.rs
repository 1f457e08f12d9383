//! Collision type registration.
//!
//! Every entity class that takes part in the simulation is registered once in
//! a [`CollisionTypeRegistry`] and receives an immutable [`CollisionType`].
//! Identifiers are assigned strictly in registration order and are never
//! released, so a class keeps its identifier for the lifetime of the
//! registry.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::CoreError;

// ---------------------------------------------------------------------------
// CollisionType
// ---------------------------------------------------------------------------

/// Identifier of a registered entity class.
///
/// The value `0` is never assigned by a registry and marks a shape whose
/// class has not been applied yet.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct CollisionType(u32);

impl CollisionType {
    pub const UNASSIGNED: CollisionType = CollisionType(0);

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for CollisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollisionType({:#x})", self.0)
    }
}

// ---------------------------------------------------------------------------
// IdEncoding
// ---------------------------------------------------------------------------

/// How identifiers are derived from the registration count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdEncoding {
    /// `1, 2, 3, ...`. Usable as map keys only.
    Sequential,
    /// `1, 2, 4, 8, ...`. Each identifier is a single bit, so identifiers
    /// can be OR-ed into category masks.
    Bitmask,
}

impl IdEncoding {
    /// Maximum number of classes this encoding can identify.
    pub fn limit(self) -> usize {
        match self {
            IdEncoding::Sequential => (u32::MAX - 1) as usize,
            // The top bit is kept free so "all categories" stays representable.
            IdEncoding::Bitmask => 31,
        }
    }

    /// Identifier for the class registered after `registered` others.
    fn nth(self, registered: usize) -> u32 {
        match self {
            IdEncoding::Sequential => registered as u32 + 1,
            IdEncoding::Bitmask => 1u32 << registered,
        }
    }
}

// ---------------------------------------------------------------------------
// CollisionTypeRegistry
// ---------------------------------------------------------------------------

/// Maps class names to [`CollisionType`]s.
///
/// Registering a name twice returns the identifier it got the first time.
#[derive(Debug, Clone)]
pub struct CollisionTypeRegistry {
    encoding: IdEncoding,
    by_name: HashMap<String, CollisionType>,
    /// Names in registration order.
    names: Vec<String>,
}

impl CollisionTypeRegistry {
    pub fn new(encoding: IdEncoding) -> Self {
        Self {
            encoding,
            by_name: HashMap::new(),
            names: Vec::new(),
        }
    }

    pub fn encoding(&self) -> IdEncoding {
        self.encoding
    }

    /// Register `name` and return its identifier.
    ///
    /// Fails with [`CoreError::IdentifierSpaceExhausted`] once the encoding's
    /// limit is reached. Nothing is recorded on failure.
    pub fn register(&mut self, name: &str) -> Result<CollisionType, CoreError> {
        if let Some(&existing) = self.by_name.get(name) {
            return Ok(existing);
        }
        let limit = self.encoding.limit();
        if self.names.len() >= limit {
            return Err(CoreError::IdentifierSpaceExhausted {
                encoding: self.encoding,
                limit,
                class: name.to_owned(),
            });
        }
        let id = CollisionType(self.encoding.nth(self.names.len()));
        self.by_name.insert(name.to_owned(), id);
        self.names.push(name.to_owned());
        tracing::debug!(class = name, id = ?id, "registered collision type");
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<CollisionType> {
        self.by_name.get(name).copied()
    }

    /// Like [`lookup`](Self::lookup), but unknown names are an error that
    /// lists what is registered.
    pub fn get(&self, name: &str) -> Result<CollisionType, CoreError> {
        self.lookup(name).ok_or_else(|| CoreError::UnknownClass {
            name: name.to_owned(),
            registered: self.registered_names().join(", "),
        })
    }

    /// Name of the class that owns `id`.
    pub fn name_of(&self, id: CollisionType) -> Option<&str> {
        self.names
            .iter()
            .find(|name| self.by_name.get(name.as_str()) == Some(&id))
            .map(String::as_str)
    }

    /// OR the identifiers of `names` into one category mask.
    pub fn mask_for<S: AsRef<str>>(&self, names: &[S]) -> Result<u32, CoreError> {
        if self.encoding != IdEncoding::Bitmask {
            return Err(CoreError::NotMaskable {
                encoding: self.encoding,
            });
        }
        names
            .iter()
            .try_fold(0u32, |mask, name| Ok(mask | self.get(name.as_ref())?.bits()))
    }

    /// Registered `(name, id)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, CollisionType)> + '_ {
        self.names
            .iter()
            .map(|name| (name.as_str(), self.by_name[name.as_str()]))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names of all registered classes, sorted.
    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for CollisionTypeRegistry {
    fn default() -> Self {
        Self::new(IdEncoding::Bitmask)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
