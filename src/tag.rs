//! Resolved, immutable tags.

use std::hash::Hash;

use indexmap::IndexSet;
use rand::Rng;

/// Bound for objects that can be members of a tag.
///
/// Blanket-implemented; domain objects are usually cheap handles
/// (interned ids, `Arc`s, small enums).
pub trait TagValue: Clone + Eq + Hash + Send + Sync + 'static {}

impl<T: Clone + Eq + Hash + Send + Sync + 'static> TagValue for T {}

/// A resolved set of domain objects.
///
/// Values are deduplicated and keep first-seen order. A `Tag` is created once
/// per reload and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag<T: TagValue> {
    values: IndexSet<T>,
}

impl<T: TagValue> Default for Tag<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: TagValue> Tag<T> {
    pub fn empty() -> Self {
        Self {
            values: IndexSet::new(),
        }
    }

    /// Membership test (O(1)).
    #[inline]
    pub fn contains(&self, value: &T) -> bool {
        self.values.contains(value)
    }

    /// Members in first-seen order.
    #[inline]
    pub fn values(&self) -> impl ExactSizeIterator<Item = &T> + '_ {
        self.values.iter()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.values.get_index(index)
    }

    /// Uniformly random member, `None` for an empty tag.
    pub fn get_random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&T> {
        if self.values.is_empty() {
            return None;
        }
        self.values.get_index(rng.gen_range(0..self.values.len()))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Owned copy of the members, in order.
    pub fn to_vec(&self) -> Vec<T> {
        self.values.iter().cloned().collect()
    }
}

impl<T: TagValue> FromIterator<T> for Tag<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn from_iter_deduplicates_in_first_seen_order() {
        let tag: Tag<&str> = ["dirt", "stone", "dirt", "sand"].into_iter().collect();
        assert_eq!(tag.to_vec(), vec!["dirt", "stone", "sand"]);
        assert_eq!(tag.len(), 3);
        assert!(tag.contains(&"sand"));
        assert!(!tag.contains(&"glass"));
    }

    #[test]
    fn empty_tag_has_no_members() {
        let tag: Tag<u32> = Tag::empty();
        assert!(tag.is_empty());
        assert_eq!(tag.values().count(), 0);
        assert!(!tag.contains(&7));
        assert_eq!(tag.get_random(&mut StdRng::seed_from_u64(1)), None);
    }

    #[test]
    fn get_random_returns_a_member() {
        let tag: Tag<u32> = (0..10).collect();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..32 {
            let v = tag.get_random(&mut rng).unwrap();
            assert!(tag.contains(v));
        }
    }
}
