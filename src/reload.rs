//! The reload pipeline: concurrent per-domain loads, then one publication.
//!
//! ```text
//! begin_generation ─► prepare (rayon, one task per domain) ─► barrier
//!                                                              │
//!                  apply: missing-required check ─► TagService::apply
//! ```
//!
//! Nothing is published until every domain of the generation has loaded, and
//! a generation that a newer reload superseded is never published.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;

use crate::config::{OnMissingRequired, TagsConfig};
use crate::group::AnyTagGroup;
use crate::identifier::{Identifier, RegistryKey};
use crate::loader::{AnyTagGroupLoader, TagGroupLoader};
use crate::manager::TagManager;
use crate::registry::TagRegistry;
use crate::service::{ApplyError, TagService};
use crate::source::TagSource;
use crate::tag::TagValue;

/// Every domain's freshly loaded group for one generation.
pub struct PreparedTags {
    generation: u64,
    groups: BTreeMap<RegistryKey, Arc<dyn AnyTagGroup>>,
}

impl PreparedTags {
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn keys(&self) -> impl Iterator<Item = &RegistryKey> + '_ {
        self.groups.keys()
    }

    pub fn into_manager(self) -> TagManager {
        TagManager::new(self.groups)
    }
}

impl fmt::Debug for PreparedTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedTags")
            .field("generation", &self.generation)
            .field("registries", &self.groups.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Loads every registered domain and publishes the result to a [`TagService`].
#[derive(Default)]
pub struct TagReloader {
    loaders: Vec<Box<dyn AnyTagGroupLoader>>,
    config: TagsConfig,
}

impl TagReloader {
    pub fn new(config: TagsConfig) -> Self {
        Self {
            loaders: Vec::new(),
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &TagsConfig {
        &self.config
    }

    /// Load tags for `key` from its default directory using `registry`.
    pub fn add_domain<T: TagValue>(
        &mut self,
        key: RegistryKey,
        registry: Arc<dyn TagRegistry<T>>,
    ) -> &mut Self {
        let loader = TagGroupLoader::new(key, registry).with_cycle_policy(self.config.on_cycle);
        self.add_loader(loader)
    }

    /// Add a preconfigured loader; a loader for the same domain is replaced.
    pub fn add_loader(&mut self, loader: impl AnyTagGroupLoader + 'static) -> &mut Self {
        if let Some(existing) = self.loaders.iter_mut().find(|l| l.key() == loader.key()) {
            tracing::warn!(registry = %loader.key(), "replacing tag loader for registry");
            *existing = Box::new(loader);
        } else {
            self.loaders.push(Box::new(loader));
        }
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &RegistryKey> + '_ {
        self.loaders.iter().map(|l| l.key())
    }

    /// Load every domain concurrently and wait for all of them.
    pub fn prepare(&self, generation: u64, source: &dyn TagSource) -> PreparedTags {
        let groups = self
            .loaders
            .par_iter()
            .map(|loader| (loader.key().clone(), loader.load_erased(source)))
            .collect::<BTreeMap<_, _>>();
        tracing::debug!(generation, registries = groups.len(), "prepared tag generation");
        PreparedTags { generation, groups }
    }

    /// Check the required tags against `prepared` and publish it.
    pub fn apply(
        &self,
        prepared: PreparedTags,
        service: &TagService,
    ) -> Result<Arc<TagManager>, ReloadError> {
        let generation = prepared.generation;
        let manager = prepared.into_manager();

        let missing = service.required().get_missing_tags(&manager);
        if !missing.is_empty() {
            match self.config.on_missing_required {
                OnMissingRequired::Error => {
                    tracing::error!(
                        generation,
                        missing = %format_missing(&missing),
                        "rejecting tag generation with missing required tags"
                    );
                    return Err(ReloadError::MissingRequiredTags { missing });
                }
                OnMissingRequired::Warn => tracing::warn!(
                    generation,
                    missing = %format_missing(&missing),
                    "publishing tag generation with missing required tags"
                ),
            }
        }

        Ok(service.apply(generation, manager)?)
    }

    /// Begin a generation, load every domain from `source` and publish.
    ///
    /// On failure the previously published generation stays current and the
    /// required handles are bound to it again.
    pub fn reload(
        &self,
        service: &TagService,
        source: &dyn TagSource,
    ) -> Result<Arc<TagManager>, ReloadError> {
        let generation = service.begin_generation();
        if self.config.clear_during_reload {
            service.required().clear_all_tags();
        }

        let prepared = self.prepare(generation, source);
        let result = self.apply(prepared, service);
        if result.is_err() && self.config.clear_during_reload {
            service.rebind_required();
        }
        result
    }
}

impl fmt::Debug for TagReloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagReloader")
            .field("registries", &self.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}

fn format_missing(missing: &BTreeMap<RegistryKey, BTreeSet<Identifier>>) -> String {
    missing
        .iter()
        .map(|(key, ids)| {
            let ids = ids.iter().map(|id| id.to_string()).collect::<Vec<_>>();
            format!("{key}: [{}]", ids.join(", "))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that stop a reload from publishing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReloadError {
    #[error("missing required tags: {}", format_missing(.missing))]
    MissingRequiredTags {
        missing: BTreeMap<RegistryKey, BTreeSet<Identifier>>,
    },
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::OnCycle;
    use crate::registry::SimpleRegistry;
    use crate::source::MemoryDataPacks;

    fn id(s: &str) -> Identifier {
        Identifier::parse(s).unwrap()
    }

    fn key(s: &str) -> RegistryKey {
        RegistryKey::parse(s).unwrap()
    }

    fn reloader(config: TagsConfig) -> TagReloader {
        let blocks = SimpleRegistry::from_entries(["stone", "dirt"].map(|n| (id(n), n))).unwrap();
        let items = SimpleRegistry::from_entries([(id("coal"), 1u32)]).unwrap();
        let mut reloader = TagReloader::new(config);
        reloader
            .add_domain::<&'static str>(key("block"), Arc::new(blocks))
            .add_domain::<u32>(key("item"), Arc::new(items));
        reloader
    }

    fn packs() -> MemoryDataPacks {
        let mut packs = MemoryDataPacks::new();
        packs
            .insert("tags/blocks", id("soil"), json!({"values": ["dirt"]}).to_string())
            .insert("tags/items", id("fuel"), json!({"values": ["coal"]}).to_string());
        packs
    }

    #[test]
    fn prepare_loads_every_domain() {
        let prepared = reloader(TagsConfig::default()).prepare(7, &packs());
        assert_eq!(prepared.generation(), 7);
        assert_eq!(prepared.keys().count(), 2);
        let manager = prepared.into_manager();
        let fuel = manager.group::<u32>(&key("item")).unwrap();
        assert_eq!(fuel.get_tag_or_empty(&id("fuel")).to_vec(), [1]);
    }

    #[test]
    fn add_loader_replaces_same_domain() {
        let mut reloader = reloader(TagsConfig::default());
        let registry = SimpleRegistry::from_entries([(id("stone"), "stone")]).unwrap();
        reloader.add_loader(
            TagGroupLoader::<&'static str>::new(key("block"), Arc::new(registry))
                .with_cycle_policy(OnCycle::Error),
        );
        assert_eq!(reloader.keys().count(), 2);
    }

    #[test]
    fn reload_publishes_and_binds_required() {
        let service = TagService::new();
        let soil = service
            .required()
            .register::<&'static str>(key("block"))
            .unwrap()
            .add(id("soil"));

        let manager = reloader(TagsConfig::default()).reload(&service, &packs()).unwrap();
        assert_eq!(manager.len(), 2);
        assert_eq!(soil.values(), ["dirt"]);
        assert_eq!(service.generation(), 1);
    }

    #[test]
    fn missing_required_rejects_generation() {
        let service = TagService::new();
        let required = service.required().register::<&'static str>(key("block")).unwrap();
        let soil = required.add(id("soil"));
        required.add(id("ores"));

        let config = TagsConfig {
            clear_during_reload: true,
            ..TagsConfig::default()
        };
        let err = reloader(config).reload(&service, &packs()).unwrap_err();
        match &err {
            ReloadError::MissingRequiredTags { missing } => {
                assert_eq!(missing[&key("block")], BTreeSet::from([id("ores")]));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().contains("minecraft:ores"));

        // Still on the builtin generation, handles rebound to it.
        assert_eq!(service.generation(), 0);
        assert!(soil.is_bound());
        assert!(soil.values().is_empty());
    }

    #[test]
    fn missing_required_can_be_tolerated() {
        let service = TagService::new();
        let ores = service
            .required()
            .register::<&'static str>(key("block"))
            .unwrap()
            .add(id("ores"));

        let config = TagsConfig {
            on_missing_required: OnMissingRequired::Warn,
            ..TagsConfig::default()
        };
        reloader(config).reload(&service, &packs()).unwrap();
        assert_eq!(service.generation(), 1);
        assert!(ores.values().is_empty());
    }

    #[test]
    fn superseded_prepare_is_not_published() {
        let service = TagService::new();
        let reloader = reloader(TagsConfig::default());

        let stale = reloader.prepare(service.begin_generation(), &packs());
        reloader.reload(&service, &packs()).unwrap();

        assert!(matches!(
            reloader.apply(stale, &service),
            Err(ReloadError::Apply(ApplyError::Superseded { generation: 1, latest: 2 }))
        ));
        assert_eq!(service.generation(), 2);
    }
}
