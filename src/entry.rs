//! Members of a tag definition, before resolution.

use std::fmt;
use std::sync::Arc;

use crate::identifier::Identifier;
use crate::tag::{Tag, TagValue};

/// One member of a tag definition.
///
/// The kind set is closed: a required or optional reference to either a
/// single object or another tag.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TagEntry {
    /// `"ns:id"`: the object must exist.
    Object(Identifier),
    /// `{"id": "ns:id", "required": false}`
    OptionalObject(Identifier),
    /// `"#ns:tag"`: the referenced tag must resolve.
    TagRef(Identifier),
    /// `{"id": "#ns:tag", "required": false}`
    OptionalTagRef(Identifier),
}

impl TagEntry {
    pub fn id(&self) -> &Identifier {
        match self {
            Self::Object(id) | Self::OptionalObject(id) | Self::TagRef(id) | Self::OptionalTagRef(id) => id,
        }
    }

    #[inline]
    pub fn is_required(&self) -> bool {
        matches!(self, Self::Object(_) | Self::TagRef(_))
    }

    /// Feed the objects this entry stands for into `collect`.
    ///
    /// Returns `false` only when a required target is absent; optional
    /// entries always succeed and contribute whatever exists.
    pub fn resolve<T, FT, FO, C>(&self, tag_lookup: FT, object_lookup: FO, collect: &mut C) -> bool
    where
        T: TagValue,
        FT: Fn(&Identifier) -> Option<Arc<Tag<T>>>,
        FO: Fn(&Identifier) -> Option<T>,
        C: FnMut(T),
    {
        match self {
            Self::Object(id) => match object_lookup(id) {
                Some(value) => {
                    collect(value);
                    true
                }
                None => false,
            },
            Self::OptionalObject(id) => {
                if let Some(value) = object_lookup(id) {
                    collect(value);
                }
                true
            }
            Self::TagRef(id) => match tag_lookup(id) {
                Some(tag) => {
                    tag.values().cloned().for_each(&mut *collect);
                    true
                }
                None => false,
            },
            Self::OptionalTagRef(id) => {
                if let Some(tag) = tag_lookup(id) {
                    tag.values().cloned().for_each(&mut *collect);
                }
                true
            }
        }
    }

    /// Visit the tag this entry requires, if any.
    pub fn for_each_tag_id(&self, mut f: impl FnMut(&Identifier)) {
        if let Self::TagRef(id) = self {
            f(id);
        }
    }

    /// Visit the tag this entry optionally pulls from, if any.
    pub fn for_each_group_id(&self, mut f: impl FnMut(&Identifier)) {
        if let Self::OptionalTagRef(id) = self {
            f(id);
        }
    }
}

impl fmt::Display for TagEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(id) => write!(f, "{id}"),
            Self::OptionalObject(id) => write!(f, "{id}?"),
            Self::TagRef(id) => write!(f, "#{id}"),
            Self::OptionalTagRef(id) => write!(f, "#{id}?"),
        }
    }
}

/// An entry plus the label of the source that contributed it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedEntry {
    pub entry: TagEntry,
    pub source: String,
}

impl TrackedEntry {
    pub fn new(entry: TagEntry, source: impl Into<String>) -> Self {
        Self {
            entry,
            source: source.into(),
        }
    }
}

impl fmt::Display for TrackedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (from {})", self.entry, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identifier {
        Identifier::parse(s).unwrap()
    }

    fn objects(id: &Identifier) -> Option<&'static str> {
        match id.path() {
            "stone" => Some("stone"),
            "dirt" => Some("dirt"),
            _ => None,
        }
    }

    fn tags(tag: &Identifier) -> Option<Arc<Tag<&'static str>>> {
        (tag.path() == "soil").then(|| Arc::new(["dirt", "grass"].into_iter().collect()))
    }

    fn run(entry: &TagEntry) -> (bool, Vec<&'static str>) {
        let mut out = Vec::new();
        let ok = entry.resolve(tags, objects, &mut |v| out.push(v));
        (ok, out)
    }

    #[test]
    fn required_object() {
        assert_eq!(run(&TagEntry::Object(id("stone"))), (true, vec!["stone"]));
        assert_eq!(run(&TagEntry::Object(id("glass"))), (false, vec![]));
    }

    #[test]
    fn optional_object_never_fails() {
        assert_eq!(run(&TagEntry::OptionalObject(id("dirt"))), (true, vec!["dirt"]));
        assert_eq!(run(&TagEntry::OptionalObject(id("glass"))), (true, vec![]));
    }

    #[test]
    fn tag_references_feed_every_member() {
        assert_eq!(run(&TagEntry::TagRef(id("soil"))), (true, vec!["dirt", "grass"]));
        assert_eq!(run(&TagEntry::TagRef(id("ores"))), (false, vec![]));
        assert_eq!(run(&TagEntry::OptionalTagRef(id("ores"))), (true, vec![]));
        assert_eq!(
            run(&TagEntry::OptionalTagRef(id("soil"))),
            (true, vec!["dirt", "grass"])
        );
    }

    #[test]
    fn dependency_edges_by_kind() {
        let entries = [
            TagEntry::Object(id("a")),
            TagEntry::OptionalObject(id("b")),
            TagEntry::TagRef(id("c")),
            TagEntry::OptionalTagRef(id("d")),
        ];
        let mut required = Vec::new();
        let mut optional = Vec::new();
        for e in &entries {
            e.for_each_tag_id(|i| required.push(i.path().to_string()));
            e.for_each_group_id(|i| optional.push(i.path().to_string()));
        }
        assert_eq!(required, ["c"]);
        assert_eq!(optional, ["d"]);
    }

    #[test]
    fn display_marks_kind() {
        assert_eq!(TagEntry::TagRef(id("logs")).to_string(), "#minecraft:logs");
        assert_eq!(TagEntry::OptionalObject(id("x:y")).to_string(), "x:y?");
        let tracked = TrackedEntry::new(TagEntry::Object(id("x:y")), "pack/a");
        assert_eq!(tracked.to_string(), "x:y (from pack/a)");
    }
}
