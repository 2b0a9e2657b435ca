//! Registry collaborators: object lookup and raw-id assignment per domain.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::group::{AnyTagGroup, SerializedTagGroup, TagGroup};
use crate::identifier::{Identifier, RegistryKey};
use crate::tag::TagValue;

/// Object lookup for one domain.
///
/// Raw ids are registry-local integers; two processes only agree on them if
/// their registries were populated in the same order.
pub trait TagRegistry<T>: Send + Sync {
    fn exists_by_id(&self, id: &Identifier) -> bool {
        self.get_by_id(id).is_some()
    }

    fn get_by_id(&self, id: &Identifier) -> Option<T>;

    fn raw_id(&self, value: &T) -> Option<i32>;

    fn get_by_raw_id(&self, raw_id: i32) -> Option<T>;
}

/// In-memory registry; raw ids are assigned in insertion order.
///
/// Provides:
/// - Id ↔ value bidirectional lookup
/// - Value ↔ raw id bidirectional lookup
#[derive(Clone, Debug, PartialEq)]
pub struct SimpleRegistry<T: TagValue> {
    entries: Vec<(Identifier, T)>,
    id_to_idx: HashMap<Identifier, usize>,
    value_to_idx: HashMap<T, usize>,
}

impl<T: TagValue> Default for SimpleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TagValue> SimpleRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            id_to_idx: HashMap::new(),
            value_to_idx: HashMap::new(),
        }
    }

    /// Build a registry from `(id, value)` pairs, numbered in iteration order.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (Identifier, T)>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for (id, value) in entries {
            registry.register(id, value)?;
        }
        Ok(registry)
    }

    /// Register `value` under `id`, returning its raw id.
    ///
    /// # Errors
    ///
    /// - Returns error if `id` is already registered
    /// - Returns error if `value` is already registered under another id
    pub fn register(&mut self, id: Identifier, value: T) -> Result<i32, RegistryError> {
        if self.id_to_idx.contains_key(&id) {
            return Err(RegistryError::DuplicateId(id));
        }
        if let Some(&idx) = self.value_to_idx.get(&value) {
            return Err(RegistryError::DuplicateValue {
                id,
                existing: self.entries[idx].0.clone(),
            });
        }
        let idx = self.entries.len();
        let raw = i32::try_from(idx).map_err(|_| RegistryError::Full)?;
        self.id_to_idx.insert(id.clone(), idx);
        self.value_to_idx.insert(value.clone(), idx);
        self.entries.push((id, value));
        Ok(raw)
    }

    /// Value → id
    #[inline]
    pub fn id_of(&self, value: &T) -> Option<&Identifier> {
        self.value_to_idx.get(value).map(|&i| &self.entries[i].0)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in raw-id order.
    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, &T)> + '_ {
        self.entries.iter().map(|(id, value)| (id, value))
    }
}

impl<T: TagValue> TagRegistry<T> for SimpleRegistry<T> {
    #[inline]
    fn exists_by_id(&self, id: &Identifier) -> bool {
        self.id_to_idx.contains_key(id)
    }

    #[inline]
    fn get_by_id(&self, id: &Identifier) -> Option<T> {
        self.id_to_idx.get(id).map(|&i| self.entries[i].1.clone())
    }

    #[inline]
    fn raw_id(&self, value: &T) -> Option<i32> {
        self.value_to_idx.get(value).and_then(|&i| i32::try_from(i).ok())
    }

    #[inline]
    fn get_by_raw_id(&self, raw_id: i32) -> Option<T> {
        let idx = usize::try_from(raw_id).ok()?;
        self.entries.get(idx).map(|(_, value)| value.clone())
    }
}

/// Errors raised while populating a [`SimpleRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate registry id: {0}")]
    DuplicateId(Identifier),
    #[error("value for '{id}' is already registered as '{existing}'")]
    DuplicateValue { id: Identifier, existing: Identifier },
    #[error("registry is full")]
    Full,
}

// =============================================================================
// Registry provider: domain key → typed registry
// =============================================================================

/// Domain-typed operations on erased tag groups.
///
/// The registry entry is the one place that knows the domain's object type,
/// so it is also what converts between erased groups and their wire form.
pub(crate) trait ErasedRegistry: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn serialize_group(&self, group: &dyn AnyTagGroup) -> Option<SerializedTagGroup>;
    fn deserialize_group(&self, serialized: &SerializedTagGroup) -> Arc<dyn AnyTagGroup>;
}

struct TypedRegistry<T: TagValue> {
    registry: Arc<dyn TagRegistry<T>>,
}

impl<T: TagValue> ErasedRegistry for TypedRegistry<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn serialize_group(&self, group: &dyn AnyTagGroup) -> Option<SerializedTagGroup> {
        let group = group.as_any().downcast_ref::<TagGroup<T>>()?;
        Some(group.serialize(self.registry.as_ref()))
    }

    fn deserialize_group(&self, serialized: &SerializedTagGroup) -> Arc<dyn AnyTagGroup> {
        Arc::new(TagGroup::<T>::deserialize(serialized, self.registry.as_ref()))
    }
}

/// Registry provider: the registries known to this process, by domain key.
#[derive(Clone, Default)]
pub struct Registries {
    by_key: BTreeMap<RegistryKey, Arc<dyn ErasedRegistry>>,
}

impl Registries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the registry backing `key`.
    pub fn register<T: TagValue>(
        &mut self,
        key: RegistryKey,
        registry: Arc<dyn TagRegistry<T>>,
    ) -> &mut Self {
        self.by_key.insert(key, Arc::new(TypedRegistry { registry }));
        self
    }

    /// Typed registry for `key`, if registered with object type `T`.
    pub fn get<T: TagValue>(&self, key: &RegistryKey) -> Option<Arc<dyn TagRegistry<T>>> {
        self.by_key
            .get(key)?
            .as_any()
            .downcast_ref::<TypedRegistry<T>>()
            .map(|typed| typed.registry.clone())
    }

    #[inline]
    pub fn contains(&self, key: &RegistryKey) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &RegistryKey> + '_ {
        self.by_key.keys()
    }

    pub(crate) fn erased(&self, key: &RegistryKey) -> Option<&dyn ErasedRegistry> {
        self.by_key.get(key).map(|r| r.as_ref())
    }
}
