//! Bevy integration for data-driven tags.
//!
//! Provides:
//! - `DataTagsPlugin`: builder-pattern plugin that shares a [`TagService`] as a Resource
//! - `TagServiceHandle`: the Resource systems read tags through
//!
//! # Example
//!
//! ```ignore
//! use bevy::prelude::*;
//! use bevy_data_tags::bevy::*;
//! use bevy_data_tags::TagsConfig;
//!
//! fn main() {
//!     App::new()
//!         .add_plugins(DataTagsPlugin::new().with_config(TagsConfig::from_file("tags.toml")?))
//!         .add_systems(Update, burn_fuel)
//!         .run();
//! }
//!
//! fn burn_fuel(tags: Res<TagServiceHandle>) {
//!     let current = tags.current();
//!     // ...
//! }
//! ```

use std::ops::Deref;
use std::sync::Arc;

use bevy::prelude::*;

use crate::config::TagsConfig;
use crate::service::TagService;

// =============================================================================
// Plugin
// =============================================================================

/// Bevy plugin for the tag service.
///
/// ```ignore
/// let service = Arc::new(TagService::new());
/// App::new().add_plugins(DataTagsPlugin::new().with_service(service.clone()));
/// ```
#[derive(Default)]
pub struct DataTagsPlugin {
    service: Option<Arc<TagService>>,
    config: TagsConfig,
}

impl DataTagsPlugin {
    /// Create a plugin with a fresh service and default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing service, e.g. one a reload pipeline already publishes to.
    pub fn with_service(mut self, service: Arc<TagService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn with_config(mut self, config: TagsConfig) -> Self {
        self.config = config;
        self
    }
}

impl Plugin for DataTagsPlugin {
    fn build(&self, app: &mut App) {
        let service = self
            .service
            .clone()
            .unwrap_or_else(|| Arc::new(TagService::new()));

        app.insert_resource(TagServiceHandle(service));
        app.insert_resource(self.config);
    }
}

// =============================================================================
// Resources
// =============================================================================

/// Shared handle to the app's [`TagService`].
#[derive(Resource, Clone, Debug)]
pub struct TagServiceHandle(pub Arc<TagService>);

impl Deref for TagServiceHandle {
    type Target = TagService;

    fn deref(&self) -> &TagService {
        &self.0
    }
}

impl Resource for TagsConfig {}

// =============================================================================
// Tests
// =============================================================================
