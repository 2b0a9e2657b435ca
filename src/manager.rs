//! One complete reload generation of tags across every domain.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::group::{AnyTagGroup, SerializedTagGroup, TagGroup};
use crate::identifier::{Identifier, RegistryKey};
use crate::registry::Registries;
use crate::service::{ApplyError, TagService};
use crate::tag::{Tag, TagValue};
use crate::wire::{PacketReader, PacketWriter, WireError};

/// Immutable map of domain → tag group for one generation.
///
/// Instances are replaced wholesale on reload; a superseded manager stays
/// valid for whoever still holds it.
#[derive(Clone, Default)]
pub struct TagManager {
    groups: BTreeMap<RegistryKey, Arc<dyn AnyTagGroup>>,
}

impl TagManager {
    pub fn new(groups: BTreeMap<RegistryKey, Arc<dyn AnyTagGroup>>) -> Self {
        Self { groups }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Builder method: add (or replace) the group of one domain.
    pub fn with_group<T: TagValue>(mut self, key: RegistryKey, group: TagGroup<T>) -> Self {
        self.groups.insert(key, Arc::new(group));
        self
    }

    /// Typed group for `key`; `None` if absent or of another object type.
    pub fn group<T: TagValue>(&self, key: &RegistryKey) -> Option<&TagGroup<T>> {
        self.groups.get(key)?.as_any().downcast_ref::<TagGroup<T>>()
    }

    /// Shared typed group for `key`, for holders that outlive this manager.
    pub fn group_arc<T: TagValue>(&self, key: &RegistryKey) -> Option<Arc<TagGroup<T>>> {
        self.groups
            .get(key)?
            .clone()
            .into_any_arc()
            .downcast::<TagGroup<T>>()
            .ok()
    }

    #[inline]
    pub fn erased_group(&self, key: &RegistryKey) -> Option<&Arc<dyn AnyTagGroup>> {
        self.groups.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &RegistryKey> + '_ {
        self.groups.keys()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Fail-loud tag lookup for call sites that need the tag to exist.
    ///
    /// `on_missing` builds the caller's error when the domain or tag is absent.
    pub fn get_tag<T, E>(
        &self,
        key: &RegistryKey,
        id: &Identifier,
        on_missing: impl FnOnce(&Identifier) -> E,
    ) -> Result<Arc<Tag<T>>, E>
    where
        T: TagValue,
    {
        match self.group::<T>(key).and_then(|group| group.get_tag(id)) {
            Some(tag) => Ok(tag),
            None => Err(on_missing(id)),
        }
    }

    /// Fail-loud reverse lookup of a tag instance's id.
    pub fn get_tag_id<T, E>(
        &self,
        key: &RegistryKey,
        tag: &Arc<Tag<T>>,
        on_missing: impl FnOnce() -> E,
    ) -> Result<Identifier, E>
    where
        T: TagValue,
    {
        match self.group::<T>(key).and_then(|group| group.tag_id(tag)) {
            Some(id) => Ok(id.clone()),
            None => Err(on_missing()),
        }
    }

    /// Serialize every domain whose registry is known.
    ///
    /// Domains without a registry are logged and omitted; the packet is
    /// still usable for the rest.
    pub fn to_packet(&self, registries: &Registries) -> TagPacket {
        let mut groups = BTreeMap::new();
        for (key, group) in &self.groups {
            let Some(registry) = registries.erased(key) else {
                tracing::error!(registry = %key, "unknown registry, omitting its tags from packet");
                continue;
            };
            match registry.serialize_group(group.as_ref()) {
                Some(serialized) => {
                    groups.insert(key.clone(), serialized);
                }
                None => tracing::error!(
                    registry = %key,
                    "registry object type does not match tag group, omitting its tags from packet"
                ),
            }
        }
        TagPacket { groups }
    }

    /// Rebuild a manager from a packet; unknown domains are logged and omitted.
    pub fn from_packet(registries: &Registries, packet: &TagPacket) -> Self {
        let mut groups = BTreeMap::new();
        for (key, serialized) in &packet.groups {
            match registries.erased(key) {
                Some(registry) => {
                    groups.insert(key.clone(), registry.deserialize_group(serialized));
                }
                None => {
                    tracing::error!(registry = %key, "unknown registry in tag packet, skipping");
                }
            }
        }
        Self { groups }
    }

    /// Publish this manager as `service`'s current generation.
    pub fn apply(self, service: &TagService, generation: u64) -> Result<Arc<TagManager>, ApplyError> {
        service.apply(generation, self)
    }
}

impl fmt::Debug for TagManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.groups.iter().map(|(key, group)| (key, group.len())))
            .finish()
    }
}

/// Tag replication payload: serialized groups by domain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagPacket {
    pub groups: BTreeMap<RegistryKey, SerializedTagGroup>,
}

impl TagPacket {
    pub fn write(&self, buf: &mut PacketWriter) -> Result<(), WireError> {
        buf.write_len(self.groups.len())?;
        for (key, group) in &self.groups {
            buf.write_identifier(key.id())?;
            group.write(buf)?;
        }
        Ok(())
    }

    pub fn read(buf: &mut PacketReader<'_>) -> Result<Self, WireError> {
        let count = buf.read_len()?;
        let mut groups = BTreeMap::new();
        for _ in 0..count {
            let key = RegistryKey::new(buf.read_identifier()?);
            groups.insert(key, SerializedTagGroup::read(buf)?);
        }
        Ok(Self { groups })
    }

    /// Fails on anything the decoder would reject, such as an over-long tag id.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut buf = PacketWriter::new();
        self.write(&mut buf)?;
        Ok(buf.into_bytes())
    }

    /// Decode a complete packet; trailing bytes are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        Self::read(&mut PacketReader::new(bytes))
    }
}
