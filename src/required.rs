//! Code-declared tag dependencies that outlive any one reload generation.
//!
//! Code asks for a [`TagWrapper`] once (usually at startup) and keeps it.
//! Each successful reload rebinds every wrapper to the freshly resolved tag
//! with a single atomic store, so readers never see a half-built tag.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::collections::btree_map;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use indexmap::{map, IndexMap};
use parking_lot::RwLock;

use crate::group::{AnyTagGroup, TagGroup};
use crate::identifier::{Identifier, IdentifierError, RegistryKey};
use crate::manager::TagManager;
use crate::tag::{Tag, TagValue};

// =============================================================================
// TagWrapper
// =============================================================================

/// Stable handle to the current contents of one tag id.
pub struct TagWrapper<T: TagValue> {
    id: Identifier,
    delegate: ArcSwapOption<Tag<T>>,
}

impl<T: TagValue> TagWrapper<T> {
    fn new(id: Identifier) -> Self {
        Self {
            id,
            delegate: ArcSwapOption::empty(),
        }
    }

    #[inline]
    pub fn id(&self) -> &Identifier {
        &self.id
    }

    /// The currently bound tag, or an error if no generation was bound yet.
    pub fn try_tag(&self) -> Result<Arc<Tag<T>>, UnboundTagError> {
        self.delegate
            .load_full()
            .ok_or_else(|| UnboundTagError(self.id.clone()))
    }

    /// The currently bound tag.
    ///
    /// # Panics
    ///
    /// If the handle was never bound. Reading a required tag before the first
    /// reload is a programming error; use [`try_tag`](Self::try_tag) to check first.
    pub fn tag(&self) -> Arc<Tag<T>> {
        match self.try_tag() {
            Ok(tag) => tag,
            Err(err) => panic!("{err}"),
        }
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        self.delegate.load().is_some()
    }

    /// Panics if unbound, like [`tag`](Self::tag).
    pub fn contains(&self, value: &T) -> bool {
        self.tag().contains(value)
    }

    /// Panics if unbound, like [`tag`](Self::tag).
    pub fn values(&self) -> Vec<T> {
        self.tag().to_vec()
    }

    pub(crate) fn bind(&self, tag: Arc<Tag<T>>) {
        self.delegate.store(Some(tag));
    }
}

impl<T: TagValue> fmt::Debug for TagWrapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagWrapper")
            .field("id", &self.id)
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// A [`TagWrapper`] was read before any tag generation was bound to it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("required tag {0} is not bound yet")]
pub struct UnboundTagError(pub Identifier);

// =============================================================================
// RequiredTagList
// =============================================================================

/// The required tag ids of one domain and the handles issued for them.
pub struct RequiredTagList<T: TagValue> {
    key: RegistryKey,
    wrappers: RwLock<IndexMap<Identifier, Arc<TagWrapper<T>>>>,
    empty: Arc<Tag<T>>,
    /// Bumped on every newly declared id; shared with the owning [`RequiredTags`].
    revision: Arc<AtomicU64>,
}

impl<T: TagValue> RequiredTagList<T> {
    pub fn new(key: RegistryKey) -> Self {
        Self::with_revision(key, Arc::new(AtomicU64::new(0)))
    }

    fn with_revision(key: RegistryKey, revision: Arc<AtomicU64>) -> Self {
        Self {
            key,
            wrappers: RwLock::new(IndexMap::new()),
            empty: Arc::new(Tag::empty()),
            revision,
        }
    }

    #[inline]
    pub fn key(&self) -> &RegistryKey {
        &self.key
    }

    /// Declare `id` as required and get its handle.
    ///
    /// Declaring the same id twice returns the handle issued the first time.
    pub fn add(&self, id: Identifier) -> Arc<TagWrapper<T>> {
        if let Some(existing) = self.wrappers.read().get(&id) {
            return existing.clone();
        }
        match self.wrappers.write().entry(id) {
            map::Entry::Occupied(entry) => entry.get().clone(),
            map::Entry::Vacant(entry) => {
                let wrapper = Arc::new(TagWrapper::new(entry.key().clone()));
                entry.insert(wrapper.clone());
                self.revision.fetch_add(1, Ordering::AcqRel);
                wrapper
            }
        }
    }

    /// Declared ids, in declaration order.
    pub fn ids(&self) -> Vec<Identifier> {
        self.wrappers.read().keys().cloned().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.wrappers.read().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.wrappers.read().is_empty()
    }

    /// Rebind every handle to this domain's tags in `manager`.
    ///
    /// Ids absent from the manager (or a manager without this domain) bind to
    /// an empty tag.
    pub fn update_tag_manager(&self, manager: &TagManager) {
        let group = manager.group::<T>(&self.key);
        if group.is_none() {
            tracing::debug!(registry = %self.key, "no tag group for required tags, binding empty tags");
        }
        for (id, wrapper) in self.wrappers.read().iter() {
            let tag = group.map_or_else(|| self.empty.clone(), |group| group.get_tag_or_empty(id));
            wrapper.bind(tag);
        }
    }

    /// Rebind every handle to a shared empty tag.
    pub fn clear_all_tags(&self) {
        for wrapper in self.wrappers.read().values() {
            wrapper.bind(self.empty.clone());
        }
    }

    /// Declared ids with no tag in `manager`'s group for this domain.
    pub fn get_missing_tags(&self, manager: &TagManager) -> BTreeSet<Identifier> {
        let group = manager.group::<T>(&self.key);
        self.wrappers
            .read()
            .keys()
            .filter(|id| !group.is_some_and(|group| group.contains_tag(id)))
            .cloned()
            .collect()
    }

    /// A group holding an empty tag for every declared id.
    pub fn builtin_group(&self) -> TagGroup<T> {
        TagGroup::new(
            self.wrappers
                .read()
                .keys()
                .map(|id| (id.clone(), self.empty.clone()))
                .collect(),
        )
    }
}

impl<T: TagValue> fmt::Debug for RequiredTagList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequiredTagList")
            .field("key", &self.key)
            .field("ids", &self.ids())
            .finish()
    }
}

/// Type-erased [`RequiredTagList`], as stored by [`RequiredTags`].
trait AnyRequiredTagList: Send + Sync {
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    fn update_tag_manager(&self, manager: &TagManager);
    fn clear_all_tags(&self);
    fn get_missing_tags(&self, manager: &TagManager) -> BTreeSet<Identifier>;
    fn builtin_group(&self) -> Arc<dyn AnyTagGroup>;
}

impl<T: TagValue> AnyRequiredTagList for RequiredTagList<T> {
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn update_tag_manager(&self, manager: &TagManager) {
        RequiredTagList::update_tag_manager(self, manager);
    }

    fn clear_all_tags(&self) {
        RequiredTagList::clear_all_tags(self);
    }

    fn get_missing_tags(&self, manager: &TagManager) -> BTreeSet<Identifier> {
        RequiredTagList::get_missing_tags(self, manager)
    }

    fn builtin_group(&self) -> Arc<dyn AnyTagGroup> {
        Arc::new(RequiredTagList::builtin_group(self))
    }
}

// =============================================================================
// RequiredTags
// =============================================================================

/// Required tag lists across every domain.
#[derive(Default)]
pub struct RequiredTags {
    lists: RwLock<BTreeMap<RegistryKey, Arc<dyn AnyRequiredTagList>>>,
    revision: Arc<AtomicU64>,
}

impl RequiredTags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Changes whenever a domain or an id is newly declared, so holders of a
    /// [`builtin_manager`](Self::builtin_manager) can tell it went stale.
    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// The required list for `key`, created on first use.
    ///
    /// Fails if `key` was already registered for another object type.
    pub fn register<T: TagValue>(
        &self,
        key: RegistryKey,
    ) -> Result<Arc<RequiredTagList<T>>, RequiredTagsError> {
        let erased: Arc<dyn AnyRequiredTagList> = match self.lists.write().entry(key.clone()) {
            btree_map::Entry::Occupied(entry) => entry.get().clone(),
            btree_map::Entry::Vacant(entry) => {
                let list = Arc::new(RequiredTagList::<T>::with_revision(
                    key.clone(),
                    self.revision.clone(),
                ));
                entry.insert(list.clone());
                self.revision.fetch_add(1, Ordering::AcqRel);
                list
            }
        };
        erased
            .into_any_arc()
            .downcast::<RequiredTagList<T>>()
            .map_err(|_| RequiredTagsError::TypeMismatch(key))
    }

    pub fn keys(&self) -> Vec<RegistryKey> {
        self.lists.read().keys().cloned().collect()
    }

    pub fn update_tag_manager(&self, manager: &TagManager) {
        for list in self.lists.read().values() {
            list.update_tag_manager(manager);
        }
    }

    pub fn clear_all_tags(&self) {
        for list in self.lists.read().values() {
            list.clear_all_tags();
        }
    }

    /// Missing ids per domain; domains with nothing missing are left out.
    pub fn get_missing_tags(&self, manager: &TagManager) -> BTreeMap<RegistryKey, BTreeSet<Identifier>> {
        self.lists
            .read()
            .iter()
            .filter_map(|(key, list)| {
                let missing = list.get_missing_tags(manager);
                (!missing.is_empty()).then(|| (key.clone(), missing))
            })
            .collect()
    }

    /// A manager with an empty tag for every declared id of every domain.
    pub fn builtin_manager(&self) -> TagManager {
        TagManager::new(
            self.lists
                .read()
                .iter()
                .map(|(key, list)| (key.clone(), list.builtin_group()))
                .collect(),
        )
    }
}

impl fmt::Debug for RequiredTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.lists.read().keys()).finish()
    }
}

/// Errors while declaring required tags.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequiredTagsError {
    #[error("required tags for {0} were already registered with another object type")]
    TypeMismatch(RegistryKey),
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identifier {
        Identifier::parse(s).unwrap()
    }

    fn key(s: &str) -> RegistryKey {
        RegistryKey::parse(s).unwrap()
    }

    fn manager(tags: &[(&str, &[&'static str])]) -> TagManager {
        let group: TagGroup<&'static str> = TagGroup::new(
            tags.iter()
                .map(|(name, values)| (id(name), Arc::new(values.iter().copied().collect())))
                .collect(),
        );
        TagManager::empty().with_group(key("block"), group)
    }

    #[test]
    fn handle_rebinds_across_generations() {
        let list = RequiredTagList::<&'static str>::new(key("block"));
        let x = list.add(id("x"));

        assert!(!x.is_bound());
        assert_eq!(x.try_tag().unwrap_err(), UnboundTagError(id("x")));

        list.update_tag_manager(&manager(&[("x", &["p", "q"])]));
        assert_eq!(x.values(), ["p", "q"]);
        assert!(x.contains(&"p"));

        list.update_tag_manager(&manager(&[("y", &["p"])]));
        assert!(x.values().is_empty());
    }

    #[test]
    #[should_panic(expected = "not bound")]
    fn unbound_handle_panics() {
        let list = RequiredTagList::<&'static str>::new(key("block"));
        list.add(id("x")).values();
    }

    #[test]
    fn add_is_idempotent() {
        let list = RequiredTagList::<&'static str>::new(key("block"));
        let a = list.add(id("x"));
        let b = list.add(id("x"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn clear_binds_empty_tags() {
        let list = RequiredTagList::<&'static str>::new(key("block"));
        let x = list.add(id("x"));
        list.update_tag_manager(&manager(&[("x", &["p"])]));
        list.clear_all_tags();
        assert!(x.is_bound());
        assert!(x.values().is_empty());
    }

    #[test]
    fn missing_tags_are_declared_minus_present() {
        let list = RequiredTagList::<&'static str>::new(key("block"));
        list.add(id("a"));
        list.add(id("b"));
        let missing = list.get_missing_tags(&manager(&[("a", &["p"])]));
        assert_eq!(missing, BTreeSet::from([id("b")]));

        let all = list.get_missing_tags(&TagManager::empty());
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn register_reuses_list_and_checks_type() {
        let required = RequiredTags::new();
        let first = required.register::<&'static str>(key("block")).unwrap();
        let again = required.register::<&'static str>(key("block")).unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        assert_eq!(
            required.register::<u32>(key("block")).unwrap_err(),
            RequiredTagsError::TypeMismatch(key("block"))
        );
    }

    #[test]
    fn registry_wide_operations() {
        let required = RequiredTags::new();
        let blocks = required.register::<&'static str>(key("block")).unwrap();
        let items = required.register::<u32>(key("item")).unwrap();
        let logs = blocks.add(id("logs"));
        let fuel = items.add(id("fuel"));

        let builtin = required.builtin_manager();
        assert_eq!(builtin.len(), 2);
        assert!(required.get_missing_tags(&builtin).is_empty());

        let fresh = manager(&[("logs", &["oak"])]);
        let missing = required.get_missing_tags(&fresh);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[&key("item")], BTreeSet::from([id("fuel")]));

        required.update_tag_manager(&fresh);
        assert_eq!(logs.values(), ["oak"]);
        assert!(fuel.values().is_empty());

        required.clear_all_tags();
        assert!(logs.values().is_empty());
    }

    #[test]
    fn revision_tracks_new_declarations_only() {
        let required = RequiredTags::new();
        assert_eq!(required.revision(), 0);

        let blocks = required.register::<&'static str>(key("block")).unwrap();
        let after_register = required.revision();
        assert!(after_register > 0);

        blocks.add(id("logs"));
        let after_add = required.revision();
        assert!(after_add > after_register);

        blocks.add(id("logs"));
        required.register::<&'static str>(key("block")).unwrap();
        assert_eq!(required.revision(), after_add);
    }
}
