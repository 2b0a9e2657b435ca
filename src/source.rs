//! Tag document sources (the resource-manager side of loading).

use std::collections::{BTreeMap, BTreeSet};

use crate::identifier::Identifier;

/// One raw tag document and the label of the source it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagResource {
    pub source: String,
    pub bytes: Vec<u8>,
}

/// Supplies tag documents for a directory prefix such as `tags/blocks`.
pub trait TagSource: Send + Sync {
    /// Every logical tag id with at least one document under `directory`.
    fn find_tag_ids(&self, directory: &str) -> Vec<Identifier>;

    /// The documents for `id`, ordered lowest source priority first.
    fn documents(&self, directory: &str, id: &Identifier) -> Vec<TagResource>;
}

#[derive(Clone, Debug)]
struct MemoryPack {
    name: String,
    files: BTreeMap<(String, Identifier), Vec<u8>>,
}

/// A stack of named in-memory data packs.
///
/// Packs pushed later take priority: their documents are merged after (and
/// may `replace`) those of earlier packs.
///
/// ```ignore
/// let mut packs = MemoryDataPacks::new();
/// packs
///     .push_pack("vanilla")
///     .insert("tags/blocks", id("minecraft:logs"), r#"{"values": ["oak_log"]}"#)
///     .push_pack("mymod")
///     .insert("tags/blocks", id("minecraft:logs"), r#"{"values": ["mymod:palm_log"]}"#);
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryDataPacks {
    packs: Vec<MemoryPack>,
}

impl MemoryDataPacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new, higher-priority pack; subsequent inserts go into it.
    pub fn push_pack(&mut self, name: impl Into<String>) -> &mut Self {
        self.packs.push(MemoryPack {
            name: name.into(),
            files: BTreeMap::new(),
        });
        self
    }

    /// Add (or overwrite) a document in the most recently pushed pack.
    ///
    /// A pack named `default` is created if none exists yet.
    pub fn insert(
        &mut self,
        directory: &str,
        id: Identifier,
        document: impl Into<Vec<u8>>,
    ) -> &mut Self {
        if self.packs.is_empty() {
            self.push_pack("default");
        }
        if let Some(pack) = self.packs.last_mut() {
            pack.files.insert((directory.to_string(), id), document.into());
        }
        self
    }

    /// Pack names, lowest priority first.
    pub fn pack_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.packs.iter().map(|p| p.name.as_str())
    }
}

impl TagSource for MemoryDataPacks {
    fn find_tag_ids(&self, directory: &str) -> Vec<Identifier> {
        let ids: BTreeSet<&Identifier> = self
            .packs
            .iter()
            .flat_map(|pack| pack.files.keys())
            .filter(|(dir, _)| dir == directory)
            .map(|(_, id)| id)
            .collect();
        ids.into_iter().cloned().collect()
    }

    fn documents(&self, directory: &str, id: &Identifier) -> Vec<TagResource> {
        let key = (directory.to_string(), id.clone());
        self.packs
            .iter()
            .filter_map(|pack| {
                pack.files.get(&key).map(|bytes| TagResource {
                    source: pack.name.clone(),
                    bytes: bytes.clone(),
                })
            })
            .collect()
    }
}
