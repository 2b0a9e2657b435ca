//! Immutable, queryable collections of resolved tags for one domain.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;
use crate::registry::TagRegistry;
use crate::tag::{Tag, TagValue};

/// Resolved tags of one object domain, keyed by tag id.
///
/// Lookups never fail: unknown ids map to a shared empty tag.
#[derive(Clone, Debug)]
pub struct TagGroup<T: TagValue> {
    tags: BTreeMap<Identifier, Arc<Tag<T>>>,
    empty: Arc<Tag<T>>,
}

impl<T: TagValue> Default for TagGroup<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: TagValue> TagGroup<T> {
    pub fn new(tags: BTreeMap<Identifier, Arc<Tag<T>>>) -> Self {
        Self {
            tags,
            empty: Arc::new(Tag::empty()),
        }
    }

    pub fn empty() -> Self {
        Self::new(BTreeMap::new())
    }

    #[inline]
    pub fn get_tag(&self, id: &Identifier) -> Option<Arc<Tag<T>>> {
        self.tags.get(id).cloned()
    }

    /// The tag for `id`, or the group's shared empty tag.
    #[inline]
    pub fn get_tag_or_empty(&self, id: &Identifier) -> Arc<Tag<T>> {
        self.get_tag(id).unwrap_or_else(|| self.empty.clone())
    }

    /// Reverse lookup: the id a tag instance of this group is registered under.
    pub fn tag_id(&self, tag: &Arc<Tag<T>>) -> Option<&Identifier> {
        self.tags
            .iter()
            .find(|(_, candidate)| Arc::ptr_eq(candidate, tag))
            .map(|(id, _)| id)
    }

    /// Ids of every tag containing `value`.
    ///
    /// Linear scan over the whole group; meant for diagnostics.
    pub fn get_tags_for(&self, value: &T) -> Vec<Identifier> {
        self.tags
            .iter()
            .filter(|(_, tag)| tag.contains(value))
            .map(|(id, _)| id.clone())
            .collect()
    }

    #[inline]
    pub fn contains_tag(&self, id: &Identifier) -> bool {
        self.tags.contains_key(id)
    }

    pub fn tag_ids(&self) -> impl Iterator<Item = &Identifier> + '_ {
        self.tags.keys()
    }

    #[inline]
    pub fn tags(&self) -> &BTreeMap<Identifier, Arc<Tag<T>>> {
        &self.tags
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Convert every member into the registry's raw id.
    ///
    /// Raw ids are registry-local; the result is only meaningful to a peer
    /// whose registry uses the same numbering.
    pub fn serialize<R>(&self, registry: &R) -> SerializedTagGroup
    where
        R: TagRegistry<T> + ?Sized,
    {
        let mut contents = BTreeMap::new();
        for (id, tag) in &self.tags {
            let mut raw_ids = Vec::with_capacity(tag.len());
            let mut unregistered = 0usize;
            for value in tag.values() {
                match registry.raw_id(value) {
                    Some(raw) => raw_ids.push(raw),
                    None => unregistered += 1,
                }
            }
            if unregistered > 0 {
                tracing::warn!(tag = %id, unregistered, "skipping tag members without a raw id");
            }
            contents.insert(id.clone(), raw_ids);
        }
        SerializedTagGroup { contents }
    }

    /// Rebuild a group from raw ids using the destination registry.
    ///
    /// Raw ids the registry cannot resolve are dropped; the tag itself is kept.
    pub fn deserialize<R>(serialized: &SerializedTagGroup, registry: &R) -> Self
    where
        R: TagRegistry<T> + ?Sized,
    {
        let mut tags = BTreeMap::new();
        for (id, raw_ids) in &serialized.contents {
            let mut dropped = Vec::new();
            let tag: Tag<T> = raw_ids
                .iter()
                .filter_map(|&raw| {
                    let value = registry.get_by_raw_id(raw);
                    if value.is_none() {
                        dropped.push(raw);
                    }
                    value
                })
                .collect();
            if !dropped.is_empty() {
                tracing::warn!(tag = %id, ?dropped, "dropping unknown raw ids from received tag");
            }
            tags.insert(id.clone(), Arc::new(tag));
        }
        Self::new(tags)
    }
}

/// Wire form of a [`TagGroup`]: tag id → raw ids, in member order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedTagGroup {
    pub contents: BTreeMap<Identifier, Vec<i32>>,
}

impl SerializedTagGroup {
    #[inline]
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

/// Type-erased view of a `TagGroup<T>`, as stored by the tag manager.
pub trait AnyTagGroup: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    fn contains_tag(&self, id: &Identifier) -> bool;
    fn tag_ids(&self) -> Vec<Identifier>;
    fn len(&self) -> usize;
}

impl<T: TagValue> AnyTagGroup for TagGroup<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn contains_tag(&self, id: &Identifier) -> bool {
        TagGroup::contains_tag(self, id)
    }

    fn tag_ids(&self) -> Vec<Identifier> {
        self.tags.keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.tags.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SimpleRegistry;

    fn id(s: &str) -> Identifier {
        Identifier::parse(s).unwrap()
    }

    fn blocks() -> SimpleRegistry<&'static str> {
        SimpleRegistry::from_entries(["stone", "dirt", "sand", "glass"].map(|n| (id(n), n))).unwrap()
    }

    fn sample_group() -> TagGroup<&'static str> {
        let mut tags = BTreeMap::new();
        tags.insert(id("soil"), Arc::new(["dirt", "sand"].into_iter().collect()));
        tags.insert(id("hard"), Arc::new(["stone", "glass", "sand"].into_iter().collect()));
        TagGroup::new(tags)
    }

    #[test]
    fn unknown_id_yields_shared_empty_tag() {
        let group = sample_group();
        let a = group.get_tag_or_empty(&id("nope"));
        let b = group.get_tag_or_empty(&id("other"));
        assert!(a.is_empty());
        assert!(!a.contains(&"stone"));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(group.get_tag(&id("nope")).is_none());
    }

    #[test]
    fn reverse_queries() {
        let group = sample_group();
        assert_eq!(group.get_tags_for(&"sand"), vec![id("hard"), id("soil")]);
        assert!(group.get_tags_for(&"water").is_empty());

        let soil = group.get_tag(&id("soil")).unwrap();
        assert_eq!(group.tag_id(&soil), Some(&id("soil")));
        let foreign: Arc<Tag<&str>> = Arc::new(["dirt", "sand"].into_iter().collect());
        assert_eq!(group.tag_id(&foreign), None);
    }

    #[test]
    fn serialize_uses_raw_ids_in_member_order() {
        let serialized = sample_group().serialize(&blocks());
        assert_eq!(serialized.contents[&id("soil")], vec![1, 2]);
        assert_eq!(serialized.contents[&id("hard")], vec![0, 3, 2]);
    }

    #[test]
    fn serialize_round_trip() {
        let registry = blocks();
        let group = sample_group();
        let back = TagGroup::deserialize(&group.serialize(&registry), &registry);
        assert_eq!(back.len(), group.len());
        for (tag_id, tag) in group.tags() {
            assert_eq!(back.get_tag_or_empty(tag_id).to_vec(), tag.to_vec());
        }
    }

    #[test]
    fn deserialize_drops_unknown_raw_ids() {
        let mut contents = BTreeMap::new();
        contents.insert(id("soil"), vec![1, 99, 2]);
        let group = TagGroup::deserialize(&SerializedTagGroup { contents }, &blocks());
        assert_eq!(group.get_tag_or_empty(&id("soil")).to_vec(), vec!["dirt", "sand"]);
    }

    #[test]
    fn erased_view_downcasts() {
        let group: Arc<dyn AnyTagGroup> = Arc::new(sample_group());
        assert_eq!(group.len(), 2);
        assert!(group.contains_tag(&id("soil")));
        assert!(group.as_any().downcast_ref::<TagGroup<&'static str>>().is_some());
        assert!(group.as_any().downcast_ref::<TagGroup<u32>>().is_none());
        assert!(group.into_any_arc().downcast::<TagGroup<&'static str>>().is_ok());
    }
}
