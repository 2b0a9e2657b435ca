//! # Data-driven tags (bevy-data-tags)
//!
//! Named sets of domain objects (blocks, items, fluids, ...) defined by
//! layered JSON documents, resolved per domain with tag-to-tag references,
//! and published atomically as one generation.
//!
//! ## Pipeline
//!
//! ```text
//! TagSource ─► TagGroupLoader (per domain) ─► TagGroup ─┐
//!                                                       ├─► TagManager ─► TagService::apply
//! TagSource ─► TagGroupLoader (per domain) ─► TagGroup ─┘
//! ```
//!
//! Code that depends on specific tags declares them up front and holds
//! [`TagWrapper`] handles, which every successful reload rebinds:
//!
//! ```ignore
//! use bevy_data_tags::{required_tags, RegistryKey, TagReloader, TagService, TagsConfig};
//!
//! required_tags! {
//!     pub mod BlockTags<crate::Block> in "minecraft:block" {
//!         LOGS = "minecraft:logs";
//!     }
//! }
//!
//! let service = TagService::new();
//! let handles = BlockTags::register(service.required())?;
//!
//! let mut reloader = TagReloader::new(TagsConfig::default());
//! reloader.add_domain(RegistryKey::parse(BlockTags::REGISTRY)?, block_registry);
//! reloader.reload(&service, &data_packs)?;
//!
//! assert!(handles.logs.contains(&oak_log));
//! ```

pub mod bevy;
pub mod builder;
pub mod config;
pub mod entry;
pub mod group;
pub mod identifier;
pub mod loader;
pub mod manager;
pub mod registry;
pub mod reload;
pub mod required;
pub mod service;
pub mod source;
pub mod tag;
pub mod wire;

pub use builder::{DocumentError, TagBuilder, TagDocument};
pub use config::{OnCycle, OnMissingRequired, TagsConfig, TagsConfigError};
pub use entry::{TagEntry, TrackedEntry};
pub use group::{AnyTagGroup, SerializedTagGroup, TagGroup};
pub use identifier::{Identifier, IdentifierError, RegistryKey, DEFAULT_NAMESPACE};
pub use loader::{AnyTagGroupLoader, TagGroupLoader};
pub use manager::{TagManager, TagPacket};
pub use registry::{Registries, RegistryError, SimpleRegistry, TagRegistry};
pub use reload::{PreparedTags, ReloadError, TagReloader};
pub use required::{RequiredTagList, RequiredTags, RequiredTagsError, TagWrapper, UnboundTagError};
pub use service::{ApplyError, TagService};
pub use source::{MemoryDataPacks, TagResource, TagSource};
pub use tag::{Tag, TagValue};
pub use wire::{PacketReader, PacketWriter, WireError};

pub use bevy_data_tags_macro::required_tags;
