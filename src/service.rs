//! The injectable holder of the current tag generation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::{ReentrantMutex, RwLock};

use crate::manager::TagManager;
use crate::required::RequiredTags;

type ApplyListener = Arc<dyn Fn(&TagManager) + Send + Sync>;

/// Owns the published [`TagManager`] and the required tag handles.
///
/// Readers load the current manager without locking. Publication goes
/// through [`apply`](Self::apply) only, which is serialized and rejects
/// generations that a newer reload has superseded.
pub struct TagService {
    current: ArcSwap<TagManager>,
    latest_generation: AtomicU64,
    published_generation: AtomicU64,
    /// [`RequiredTags::revision`] the builtin manager in `current` was built at.
    builtin_revision: AtomicU64,
    required: RequiredTags,
    listeners: RwLock<Vec<ApplyListener>>,
    /// Reentrant so apply listeners can call back into the service.
    apply_lock: ReentrantMutex<()>,
}

impl Default for TagService {
    fn default() -> Self {
        Self::new()
    }
}

impl TagService {
    pub fn new() -> Self {
        Self::with_required(RequiredTags::new())
    }

    /// Start from `required`'s builtin manager: every declared id present
    /// with an empty tag.
    ///
    /// Until the first apply, ids declared later show up in
    /// [`current`](Self::current) as well.
    pub fn with_required(required: RequiredTags) -> Self {
        let revision = required.revision();
        let builtin = required.builtin_manager();
        Self {
            current: ArcSwap::from_pointee(builtin),
            latest_generation: AtomicU64::new(0),
            published_generation: AtomicU64::new(0),
            builtin_revision: AtomicU64::new(revision),
            required,
            listeners: RwLock::new(Vec::new()),
            apply_lock: ReentrantMutex::new(()),
        }
    }

    /// The currently published manager.
    pub fn current(&self) -> Arc<TagManager> {
        if self.generation() == 0
            && self.builtin_revision.load(Ordering::Acquire) != self.required.revision()
        {
            self.refresh_builtin();
        }
        self.current.load_full()
    }

    /// Rebuild the builtin manager if no generation has been applied since
    /// the last declaration.
    fn refresh_builtin(&self) {
        let _guard = self.apply_lock.lock();
        if self.generation() != 0 {
            return;
        }
        let revision = self.required.revision();
        self.current.store(Arc::new(self.required.builtin_manager()));
        self.builtin_revision.store(revision, Ordering::Release);
    }

    #[inline]
    pub fn required(&self) -> &RequiredTags {
        &self.required
    }

    /// Generation number of the current manager (0 before the first apply).
    #[inline]
    pub fn generation(&self) -> u64 {
        self.published_generation.load(Ordering::Acquire)
    }

    /// Register a hook run after every successful apply, e.g. to recompute
    /// caches keyed on tag membership.
    ///
    /// Listeners may call back into the service. A listener added from inside
    /// a listener first runs on the next apply.
    pub fn on_apply(&self, listener: impl Fn(&TagManager) + Send + Sync + 'static) {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Claim a new generation number; every older one becomes stale.
    pub fn begin_generation(&self) -> u64 {
        self.latest_generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Publish `manager` as generation `generation`.
    ///
    /// Rebinds the required handles, swaps the current manager and runs the
    /// apply listeners, all while holding the writer lock.
    pub fn apply(&self, generation: u64, manager: TagManager) -> Result<Arc<TagManager>, ApplyError> {
        let _guard = self.apply_lock.lock();

        let latest = self.latest_generation.load(Ordering::Acquire);
        if generation < latest {
            tracing::debug!(generation, latest, "dropping superseded tag generation");
            return Err(ApplyError::Superseded { generation, latest });
        }

        let manager = Arc::new(manager);
        self.required.update_tag_manager(&manager);
        self.current.store(manager.clone());
        self.published_generation.store(generation, Ordering::Release);
        tracing::info!(generation, registries = manager.len(), "applied tag generation");

        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            listener(&manager);
        }

        Ok(manager)
    }

    /// Claim a generation and apply `manager` under it.
    ///
    /// Used for managers that were not loaded locally, e.g. decoded from a
    /// [`TagPacket`](crate::manager::TagPacket).
    pub fn publish(&self, manager: TagManager) -> Result<Arc<TagManager>, ApplyError> {
        let generation = self.begin_generation();
        self.apply(generation, manager)
    }

    /// Rebind the required handles to the current manager, e.g. after a
    /// failed reload cleared them.
    pub fn rebind_required(&self) {
        let _guard = self.apply_lock.lock();
        self.required.update_tag_manager(&self.current());
    }

    /// Drop the published state: clear the required handles, reinstate the
    /// builtin manager and invalidate in-flight generations.
    pub fn reset(&self) {
        let _guard = self.apply_lock.lock();
        self.begin_generation();
        self.required.clear_all_tags();
        let revision = self.required.revision();
        self.current.store(Arc::new(self.required.builtin_manager()));
        self.builtin_revision.store(revision, Ordering::Release);
        self.published_generation.store(0, Ordering::Release);
        tracing::debug!("reset tag service to builtin tags");
    }
}

impl fmt::Debug for TagService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagService")
            .field("generation", &self.generation())
            .field("current", &self.current())
            .field("required", &self.required)
            .finish()
    }
}

/// Errors raised when publishing a tag generation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error("tag generation {generation} was superseded by generation {latest}")]
    Superseded { generation: u64, latest: u64 },
}
