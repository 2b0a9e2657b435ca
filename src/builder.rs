//! Per-tag accumulation of entries from layered sources.
//!
//! A tag document looks like:
//!
//! ```json
//! {
//!   "replace": false,
//!   "values": [
//!     "minecraft:stone",
//!     "#minecraft:logs",
//!     { "id": "mymod:ruby_ore", "required": false }
//!   ]
//! }
//! ```
//!
//! Each source contributes one document per tag id; documents are merged in
//! priority order (lowest first) into one [`TagBuilder`].

use std::sync::Arc;

use indexmap::IndexSet;
use serde::Deserialize;

use crate::entry::{TagEntry, TrackedEntry};
use crate::identifier::{Identifier, IdentifierError};
use crate::tag::{Tag, TagValue};

/// A parsed tag document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagDocument {
    /// Discard everything accumulated from earlier sources before appending.
    pub replace: bool,
    pub entries: Vec<TagEntry>,
}

/// Raw JSON structure.
#[derive(Debug, Deserialize)]
struct RawTagDocument {
    #[serde(default)]
    replace: bool,
    values: Vec<RawValue>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Plain(String),
    Detailed {
        id: String,
        #[serde(default = "default_required")]
        required: bool,
    },
}

fn default_required() -> bool {
    true
}

impl TagDocument {
    /// Parse a document from raw JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DocumentError> {
        let raw: RawTagDocument = serde_json::from_slice(bytes)?;
        Self::from_raw(raw)
    }

    /// Parse a document from a JSON string.
    pub fn from_str(content: &str) -> Result<Self, DocumentError> {
        let raw: RawTagDocument = serde_json::from_str(content)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawTagDocument) -> Result<Self, DocumentError> {
        let entries = raw
            .values
            .into_iter()
            .map(|value| match value {
                RawValue::Plain(id) => parse_entry(&id, true),
                RawValue::Detailed { id, required } => parse_entry(&id, required),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            replace: raw.replace,
            entries,
        })
    }
}

fn parse_entry(raw: &str, required: bool) -> Result<TagEntry, DocumentError> {
    let entry = match raw.strip_prefix('#') {
        Some(tag) => {
            let id = Identifier::parse(tag)?;
            if required {
                TagEntry::TagRef(id)
            } else {
                TagEntry::OptionalTagRef(id)
            }
        }
        None => {
            let id = Identifier::parse(raw)?;
            if required {
                TagEntry::Object(id)
            } else {
                TagEntry::OptionalObject(id)
            }
        }
    };
    Ok(entry)
}

/// Errors while reading a tag document.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("malformed tag document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid entry id: {0}")]
    Identifier(#[from] IdentifierError),
}

/// Mutable, append-only accumulator for one tag id during one load pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagBuilder {
    entries: Vec<TrackedEntry>,
}

impl TagBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry.
    pub fn add(&mut self, entry: TagEntry, source: impl Into<String>) -> &mut Self {
        self.entries.push(TrackedEntry::new(entry, source));
        self
    }

    /// Merge a document from `source`, honoring its `replace` flag.
    pub fn merge(&mut self, document: TagDocument, source: &str) -> &mut Self {
        if document.replace {
            self.entries.clear();
        }
        self.entries.extend(
            document
                .entries
                .into_iter()
                .map(|entry| TrackedEntry::new(entry, source)),
        );
        self
    }

    /// Parse `bytes` as a tag document and merge it.
    pub fn read(&mut self, bytes: &[u8], source: &str) -> Result<&mut Self, DocumentError> {
        let document = TagDocument::from_slice(bytes)?;
        Ok(self.merge(document, source))
    }

    #[inline]
    pub fn entries(&self) -> &[TrackedEntry] {
        &self.entries
    }

    /// Visit every required tag reference.
    pub fn for_each_tag_id(&self, mut f: impl FnMut(&Identifier)) {
        for tracked in &self.entries {
            tracked.entry.for_each_tag_id(&mut f);
        }
    }

    /// Visit every optional tag reference.
    pub fn for_each_group_id(&self, mut f: impl FnMut(&Identifier)) {
        for tracked in &self.entries {
            tracked.entry.for_each_group_id(&mut f);
        }
    }

    /// Resolve every entry in order.
    ///
    /// All-or-nothing: if any required entry fails, the complete list of
    /// failing entries is returned and no tag is produced.
    pub fn build<T, FT, FO>(&self, tag_lookup: FT, object_lookup: FO) -> Result<Tag<T>, Vec<TrackedEntry>>
    where
        T: TagValue,
        FT: Fn(&Identifier) -> Option<Arc<Tag<T>>>,
        FO: Fn(&Identifier) -> Option<T>,
    {
        let mut values: IndexSet<T> = IndexSet::new();
        let mut missing = Vec::new();
        for tracked in &self.entries {
            let resolved = tracked.entry.resolve(&tag_lookup, &object_lookup, &mut |value| {
                values.insert(value);
            });
            if !resolved {
                missing.push(tracked.clone());
            }
        }
        if missing.is_empty() {
            Ok(values.into_iter().collect())
        } else {
            Err(missing)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> Identifier {
        Identifier::parse(s).unwrap()
    }

    fn doc(value: serde_json::Value) -> TagDocument {
        TagDocument::from_slice(value.to_string().as_bytes()).unwrap()
    }

    fn no_tags(_: &Identifier) -> Option<Arc<Tag<String>>> {
        None
    }

    fn any_object(id: &Identifier) -> Option<String> {
        (id.namespace() != "missing").then(|| id.path().to_string())
    }

    #[test]
    fn parse_all_value_forms() {
        let document = doc(json!({
            "values": [
                "stone",
                "#minecraft:logs",
                { "id": "mymod:ruby", "required": false },
                { "id": "#mymod:gems", "required": false },
                { "id": "mymod:sapphire" }
            ]
        }));
        assert!(!document.replace);
        assert_eq!(
            document.entries,
            vec![
                TagEntry::Object(id("minecraft:stone")),
                TagEntry::TagRef(id("minecraft:logs")),
                TagEntry::OptionalObject(id("mymod:ruby")),
                TagEntry::OptionalTagRef(id("mymod:gems")),
                TagEntry::Object(id("mymod:sapphire")),
            ]
        );
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(TagDocument::from_str("{").is_err());
        assert!(TagDocument::from_str(r#"{"replace": true}"#).is_err());
        assert!(TagDocument::from_str(r#"{"values": [42]}"#).is_err());
        assert!(matches!(
            TagDocument::from_str(r#"{"values": ["Not Valid"]}"#),
            Err(DocumentError::Identifier(_))
        ));
    }

    #[test]
    fn replace_discards_earlier_sources() {
        let mut builder = TagBuilder::new();
        builder.merge(doc(json!({"replace": false, "values": ["x"]})), "A");
        builder.merge(doc(json!({"replace": true, "values": ["y"]})), "B");
        assert_eq!(
            builder.entries(),
            &[TrackedEntry::new(TagEntry::Object(id("y")), "B")]
        );
    }

    #[test]
    fn merge_without_replace_appends() {
        let mut builder = TagBuilder::new();
        builder
            .read(br#"{"values": ["x"]}"#, "A")
            .unwrap()
            .read(br#"{"values": ["y"]}"#, "B")
            .unwrap();
        let sources: Vec<&str> = builder.entries().iter().map(|e| e.source.as_str()).collect();
        assert_eq!(sources, ["A", "B"]);
    }

    #[test]
    fn build_deduplicates_preserving_order() {
        let mut builder = TagBuilder::new();
        builder
            .add(TagEntry::Object(id("b")), "s")
            .add(TagEntry::Object(id("a")), "s")
            .add(TagEntry::Object(id("b")), "s");
        let tag = builder.build(no_tags, any_object).unwrap();
        assert_eq!(tag.to_vec(), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn build_reports_every_failing_entry() {
        let mut builder = TagBuilder::new();
        builder
            .add(TagEntry::Object(id("missing:one")), "s")
            .add(TagEntry::Object(id("present")), "s")
            .add(TagEntry::OptionalObject(id("missing:opt")), "s")
            .add(TagEntry::TagRef(id("nowhere")), "s");
        let failed = builder.build(no_tags, any_object).unwrap_err();
        let failed: Vec<String> = failed.iter().map(|e| e.entry.to_string()).collect();
        assert_eq!(failed, ["missing:one", "#minecraft:nowhere"]);
    }

    #[test]
    fn dependency_visitors_split_required_and_optional() {
        let mut builder = TagBuilder::new();
        builder.merge(
            doc(json!({"values": ["#a", {"id": "#b", "required": false}, "c"]})),
            "s",
        );
        let mut required = Vec::new();
        let mut optional = Vec::new();
        builder.for_each_tag_id(|i| required.push(i.clone()));
        builder.for_each_group_id(|i| optional.push(i.clone()));
        assert_eq!(required, vec![id("a")]);
        assert_eq!(optional, vec![id("b")]);
    }
}
