//! TOML configuration for tag loading.
//!
//! ```toml
//! # What to do with a tag reference that would close a cycle:
//! # "warn" (default) skips the reference, "error" also fails the referencing tag.
//! on_cycle = "warn"
//!
//! # What a reload does when code-declared tags are missing:
//! # "error" (default) rejects the generation, "warn" publishes it anyway.
//! on_missing_required = "error"
//!
//! # Rebind required handles to empty tags while a reload is in flight.
//! clear_during_reload = false
//! ```

use std::path::Path;

use serde::Deserialize;

/// Behavior when a tag reference would close a dependency cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnCycle {
    /// Skip the reference and log a warning (default)
    #[default]
    Warn,
    /// Skip the reference and fail the tag that made it
    Error,
}

/// Behavior when required tags are absent from a freshly loaded generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnMissingRequired {
    /// Reject the generation (default, safest)
    #[default]
    Error,
    /// Log and publish anyway; handles read empty tags
    Warn,
}

/// Parsed tag-loading configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TagsConfig {
    pub on_cycle: OnCycle,
    pub on_missing_required: OnMissingRequired,
    pub clear_during_reload: bool,
}

/// Raw TOML structure.
#[derive(Debug, Deserialize)]
struct RawTagsConfig {
    /// "warn" (default) or "error"
    on_cycle: Option<String>,
    /// "error" (default) or "warn"
    on_missing_required: Option<String>,
    #[serde(default)]
    clear_during_reload: bool,
}

impl TagsConfig {
    /// Parse from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TagsConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            TagsConfigError::Io(format!("Failed to read {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_str(&content)
    }

    /// Parse from a TOML string.
    pub fn from_str(content: &str) -> Result<Self, TagsConfigError> {
        let raw: RawTagsConfig =
            toml::from_str(content).map_err(|e| TagsConfigError::Parse(e.to_string()))?;

        let on_cycle = match raw.on_cycle.as_deref() {
            None | Some("warn") => OnCycle::Warn,
            Some("error") => OnCycle::Error,
            Some(other) => {
                return Err(TagsConfigError::Validation(format!(
                    "Invalid on_cycle value '{}': expected 'warn' or 'error'",
                    other
                )));
            }
        };

        let on_missing_required = match raw.on_missing_required.as_deref() {
            None | Some("error") => OnMissingRequired::Error,
            Some("warn") => OnMissingRequired::Warn,
            Some(other) => {
                return Err(TagsConfigError::Validation(format!(
                    "Invalid on_missing_required value '{}': expected 'error' or 'warn'",
                    other
                )));
            }
        };

        Ok(Self {
            on_cycle,
            on_missing_required,
            clear_during_reload: raw.clear_during_reload,
        })
    }
}

/// Errors during config parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagsConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = TagsConfig::from_str("").unwrap();
        assert_eq!(config, TagsConfig::default());
        assert_eq!(config.on_cycle, OnCycle::Warn);
        assert_eq!(config.on_missing_required, OnMissingRequired::Error);
        assert!(!config.clear_during_reload);
    }

    #[test]
    fn parse_all_options() {
        let toml = r#"
on_cycle = "error"
on_missing_required = "warn"
clear_during_reload = true
"#;
        let config = TagsConfig::from_str(toml).unwrap();
        assert_eq!(config.on_cycle, OnCycle::Error);
        assert_eq!(config.on_missing_required, OnMissingRequired::Warn);
        assert!(config.clear_during_reload);
    }

    #[test]
    fn on_cycle_invalid_value() {
        let result = TagsConfig::from_str(r#"on_cycle = "explode""#);
        let err = result.unwrap_err();
        assert!(matches!(err, TagsConfigError::Validation(_)));
        assert!(err.to_string().contains("explode"));
    }

    #[test]
    fn on_missing_required_invalid_value() {
        let err = TagsConfig::from_str(r#"on_missing_required = "maybe""#).unwrap_err();
        assert!(err.to_string().contains("maybe"));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            TagsConfig::from_str("on_cycle = "),
            Err(TagsConfigError::Parse(_))
        ));
    }
}
