//! Entity class declarations and collision filters.
//!
//! A [`ClassCatalog`] is filled once at startup with one [`ClassDescriptor`]
//! per entity class. Declaration order fixes each class's bitmask
//! [`CollisionType`]; the `collides_with` lists are turned into the
//! category/mask pair ([`ShapeFilter`]) that backends apply to every shape of
//! the class.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::registry::{CollisionType, CollisionTypeRegistry, IdEncoding};
use crate::CoreError;

// ---------------------------------------------------------------------------
// ShapeFilter
// ---------------------------------------------------------------------------

/// Category/mask pair carried by every shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShapeFilter {
    /// Categories this shape belongs to.
    pub categories: u32,
    /// Categories this shape accepts contacts from.
    pub mask: u32,
}

impl ShapeFilter {
    /// Belongs to every category and accepts every category.
    pub const ALL: ShapeFilter = ShapeFilter {
        categories: u32::MAX,
        mask: u32::MAX,
    };

    pub fn new(categories: u32, mask: u32) -> Self {
        Self { categories, mask }
    }

    /// Whether two shapes may touch. Both sides must accept the other.
    #[inline]
    pub fn interacts(&self, other: &ShapeFilter) -> bool {
        self.categories & other.mask != 0 && other.categories & self.mask != 0
    }
}

// ---------------------------------------------------------------------------
// ClassDescriptor
// ---------------------------------------------------------------------------

/// Static description of one entity class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    pub name: String,
    /// Names of the classes this class wants contacts with.
    pub collides_with: Vec<String>,
}

impl ClassDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collides_with: Vec::new(),
        }
    }

    pub fn collides_with(mut self, others: &[&str]) -> Self {
        self.collides_with
            .extend(others.iter().map(|s| (*s).to_owned()));
        self
    }

    pub fn lists(&self, other: &str) -> bool {
        self.collides_with.iter().any(|c| c == other)
    }
}

// ---------------------------------------------------------------------------
// FilterTable
// ---------------------------------------------------------------------------

/// Resolved collision data of one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassFilter {
    pub collision_type: CollisionType,
    pub filter: ShapeFilter,
}

/// Per-class filters handed to physics backends.
#[derive(Debug, Clone, Default)]
pub struct FilterTable {
    entries: HashMap<String, ClassFilter>,
}

impl FilterTable {
    pub fn insert(&mut self, class: &str, entry: ClassFilter) {
        self.entries.insert(class.to_owned(), entry);
    }

    pub fn get(&self, class: &str) -> Option<&ClassFilter> {
        self.entries.get(class)
    }

    /// Name of the class whose collision type is `id`.
    pub fn class_of(&self, id: CollisionType) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.collision_type == id)
            .map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn class_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

// ---------------------------------------------------------------------------
// ClassCatalog
// ---------------------------------------------------------------------------

/// All entity classes of a game, in declaration order.
#[derive(Debug, Clone)]
pub struct ClassCatalog {
    registry: CollisionTypeRegistry,
    descriptors: Vec<ClassDescriptor>,
}

impl ClassCatalog {
    /// An empty catalog backed by a bitmask registry.
    pub fn new() -> Self {
        Self {
            registry: CollisionTypeRegistry::new(IdEncoding::Bitmask),
            descriptors: Vec::new(),
        }
    }

    /// Declare a class and register its collision type.
    pub fn declare(&mut self, descriptor: ClassDescriptor) -> Result<CollisionType, CoreError> {
        if self.descriptor(&descriptor.name).is_some() {
            return Err(CoreError::DuplicateClass {
                name: descriptor.name,
            });
        }
        let id = self.registry.register(&descriptor.name)?;
        self.descriptors.push(descriptor);
        Ok(id)
    }

    /// Check that every `collides_with` entry names a declared class.
    pub fn validate(&self) -> Result<(), CoreError> {
        for descriptor in &self.descriptors {
            for other in &descriptor.collides_with {
                if self.registry.lookup(other).is_none() {
                    return Err(CoreError::UndeclaredCollider {
                        class: descriptor.name.clone(),
                        other: other.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn descriptor(&self, name: &str) -> Option<&ClassDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    pub fn descriptors(&self) -> &[ClassDescriptor] {
        &self.descriptors
    }

    pub fn registry(&self) -> &CollisionTypeRegistry {
        &self.registry
    }

    pub fn collision_type(&self, name: &str) -> Result<CollisionType, CoreError> {
        self.registry.get(name)
    }

    /// Filter for shapes of `name`: own category plus the OR of the
    /// categories it lists in `collides_with`.
    pub fn filter_for(&self, name: &str) -> Result<ShapeFilter, CoreError> {
        let categories = self.registry.get(name)?.bits();
        let descriptor = self.descriptor(name).ok_or_else(|| CoreError::UnknownClass {
            name: name.to_owned(),
            registered: self.registry.registered_names().join(", "),
        })?;
        let mask = self.registry.mask_for(&descriptor.collides_with)?;
        Ok(ShapeFilter { categories, mask })
    }

    /// Resolve the filters of every declared class.
    pub fn filters(&self) -> Result<FilterTable, CoreError> {
        let mut table = FilterTable::default();
        for descriptor in &self.descriptors {
            table.insert(
                &descriptor.name,
                ClassFilter {
                    collision_type: self.registry.get(&descriptor.name)?,
                    filter: self.filter_for(&descriptor.name)?,
                },
            );
        }
        Ok(table)
    }
}

impl Default for ClassCatalog {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
