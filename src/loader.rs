//! Tag group loading: discovery, merge and dependency-ordered resolution.
//!
//! # Data flow
//!
//! 1. Discovery/merge: every document of every tag id under the domain's
//!    directory is merged, lowest priority first, into one [`TagBuilder`].
//!    Unreadable documents are logged and skipped.
//! 2. Graph: each builder's tag references become edges `owner → referenced`.
//!    An edge that would close a cycle is not inserted (see [`OnCycle`]).
//! 3. Resolution: an iterative post-order walk builds every tag after the tags
//!    it references, sharing one visited set across the whole domain.
//! 4. Whatever resolved becomes the [`TagGroup`]; failed tags are absent.
//!
//! One bad tag never aborts the domain. It is missing, and so is every tag
//! that *requires* it; optional references to it contribute nothing.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::builder::TagBuilder;
use crate::config::OnCycle;
use crate::entry::TrackedEntry;
use crate::group::{AnyTagGroup, TagGroup};
use crate::identifier::{Identifier, RegistryKey};
use crate::registry::TagRegistry;
use crate::source::TagSource;
use crate::tag::{Tag, TagValue};

/// Loads the tag group of one domain.
pub struct TagGroupLoader<T: TagValue> {
    key: RegistryKey,
    registry: Arc<dyn TagRegistry<T>>,
    data_type: String,
    directory: String,
    on_cycle: OnCycle,
}

impl<T: TagValue> TagGroupLoader<T> {
    /// Loader reading `key.tag_directory()`, resolving objects via `registry`.
    pub fn new(key: RegistryKey, registry: Arc<dyn TagRegistry<T>>) -> Self {
        Self {
            data_type: key.id().path().to_string(),
            directory: key.tag_directory(),
            key,
            registry,
            on_cycle: OnCycle::default(),
        }
    }

    /// Override the resource directory (default: `tags/<path>s`).
    pub fn with_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Override the human-readable data type used in logs (default: key path).
    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = data_type.into();
        self
    }

    pub fn with_cycle_policy(mut self, on_cycle: OnCycle) -> Self {
        self.on_cycle = on_cycle;
        self
    }

    #[inline]
    pub fn key(&self) -> &RegistryKey {
        &self.key
    }

    #[inline]
    pub fn directory(&self) -> &str {
        &self.directory
    }

    /// Discover and merge every tag document of this domain.
    pub fn prepare_tags(&self, source: &dyn TagSource) -> BTreeMap<Identifier, TagBuilder> {
        let mut builders = BTreeMap::new();
        for id in source.find_tag_ids(&self.directory) {
            let mut builder = TagBuilder::new();
            let mut merged = false;
            for resource in source.documents(&self.directory, &id) {
                match builder.read(&resource.bytes, &resource.source) {
                    Ok(_) => merged = true,
                    Err(error) => tracing::warn!(
                        tag = %id,
                        source = %resource.source,
                        data_type = %self.data_type,
                        %error,
                        "skipping unreadable tag document"
                    ),
                }
            }
            if merged {
                builders.insert(id, builder);
            }
        }
        builders
    }

    /// Resolve every builder in dependency order.
    pub fn build_group(&self, builders: BTreeMap<Identifier, TagBuilder>) -> TagGroup<T> {
        let graph = DependencyGraph::new(builders, self.on_cycle, &self.data_type);
        let mut resolved: BTreeMap<Identifier, Arc<Tag<T>>> = BTreeMap::new();
        let mut failed = 0usize;

        for node in graph.resolution_order() {
            let (id, builder) = &graph.nodes[node];
            if graph.poisoned[node] {
                tracing::error!(
                    tag = %id,
                    data_type = %self.data_type,
                    "couldn't load tag as it takes part in a reference cycle"
                );
                failed += 1;
                continue;
            }
            let result = builder.build(
                |tag: &Identifier| resolved.get(tag).cloned(),
                |object: &Identifier| self.registry.get_by_id(object),
            );
            match result {
                Ok(tag) => {
                    resolved.insert(id.clone(), Arc::new(tag));
                }
                Err(missing) => {
                    tracing::error!(
                        tag = %id,
                        data_type = %self.data_type,
                        missing = %format_entries(&missing),
                        "couldn't load tag as it is missing following references"
                    );
                    failed += 1;
                }
            }
        }

        tracing::debug!(
            data_type = %self.data_type,
            loaded = resolved.len(),
            failed,
            "resolved tag group"
        );
        TagGroup::new(resolved)
    }

    /// Full load: discovery, merge and resolution.
    pub fn load(&self, source: &dyn TagSource) -> TagGroup<T> {
        self.build_group(self.prepare_tags(source))
    }
}

fn format_entries(entries: &[TrackedEntry]) -> String {
    entries
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Type-erased loader, one per domain in a reload pipeline.
pub trait AnyTagGroupLoader: Send + Sync {
    fn key(&self) -> &RegistryKey;
    fn load_erased(&self, source: &dyn TagSource) -> Arc<dyn AnyTagGroup>;
}

impl<T: TagValue> AnyTagGroupLoader for TagGroupLoader<T> {
    fn key(&self) -> &RegistryKey {
        &self.key
    }

    fn load_erased(&self, source: &dyn TagSource) -> Arc<dyn AnyTagGroup> {
        Arc::new(self.load(source))
    }
}

// =============================================================================
// Dependency graph: arena of tag ids with index edges
// =============================================================================

struct DependencyGraph {
    nodes: Vec<(Identifier, TagBuilder)>,
    edges: Vec<Vec<usize>>,
    /// Set for owners of a cycle-closing reference under `OnCycle::Error`.
    poisoned: Vec<bool>,
}

impl DependencyGraph {
    fn new(builders: BTreeMap<Identifier, TagBuilder>, on_cycle: OnCycle, data_type: &str) -> Self {
        let nodes: Vec<(Identifier, TagBuilder)> = builders.into_iter().collect();
        let index: HashMap<&Identifier, usize> =
            nodes.iter().enumerate().map(|(i, (id, _))| (id, i)).collect();

        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        let mut poisoned = vec![false; nodes.len()];

        for (owner, (owner_id, builder)) in nodes.iter().enumerate() {
            let mut referenced = Vec::new();
            builder.for_each_tag_id(|id| referenced.push(id.clone()));
            builder.for_each_group_id(|id| referenced.push(id.clone()));

            for target_id in &referenced {
                // References to undefined tags need no ordering; they fail (or
                // contribute nothing) at build time.
                let Some(&target) = index.get(target_id) else {
                    continue;
                };
                if edges[owner].contains(&target) {
                    continue;
                }
                if target == owner || Self::reaches(&edges, target, owner) {
                    tracing::warn!(
                        tag = %owner_id,
                        reference = %target_id,
                        data_type = %data_type,
                        "ignoring tag reference that would close a dependency cycle"
                    );
                    if on_cycle == OnCycle::Error {
                        poisoned[owner] = true;
                    }
                    continue;
                }
                edges[owner].push(target);
            }
        }

        Self {
            nodes,
            edges,
            poisoned,
        }
    }

    /// Is `to` reachable from `from` over the edges inserted so far?
    fn reaches(edges: &[Vec<usize>], from: usize, to: usize) -> bool {
        let mut seen = vec![false; edges.len()];
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if std::mem::replace(&mut seen[node], true) {
                continue;
            }
            stack.extend(edges[node].iter().copied().filter(|&next| !seen[next]));
        }
        false
    }

    /// Post-order over all nodes: every node after the nodes it references.
    ///
    /// Iterative; each node is visited once across the whole domain.
    fn resolution_order(&self) -> Vec<usize> {
        let mut visited = vec![false; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, bool)> = Vec::new();

        for root in 0..self.nodes.len() {
            if visited[root] {
                continue;
            }
            stack.push((root, false));
            while let Some((node, expanded)) = stack.pop() {
                if expanded {
                    order.push(node);
                    continue;
                }
                if std::mem::replace(&mut visited[node], true) {
                    continue;
                }
                stack.push((node, true));
                for &dep in self.edges[node].iter().rev() {
                    if !visited[dep] {
                        stack.push((dep, false));
                    }
                }
            }
        }
        order
    }
}
