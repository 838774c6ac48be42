//! Process-wide rendering configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TemplateError, TemplateResult};

/// Environment variable toggling source caching.
pub const ENV_CACHE_TEMPLATES: &str = "VISTA_CACHE_TEMPLATES";
/// Environment variable overriding the scripted markup trim mode.
pub const ENV_TRIM_MODE: &str = "VISTA_TRIM_MODE";

/// Rendering configuration shared by every view of a store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Honor modification times instead of re-reading on every render
    pub cache_template_loading: bool,
    /// Trim mode handed to the scripted markup compiler (`-`, `>`, `<>`)
    pub trim_mode: String,
    /// Extension of scripted markup templates
    pub scripted_extension: String,
    /// Extension of structured builder templates
    pub builder_extension: String,
    /// Leading character of partial file names
    pub partial_marker: char,
    /// Content type defaulted for builder output
    pub builder_content_type: String,
    /// Indentation width of builder output (0 renders compact markup)
    pub builder_indent: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            cache_template_loading: false,
            trim_mode: "-".to_string(),
            scripted_extension: "erb".to_string(),
            builder_extension: "builder".to_string(),
            partial_marker: '_',
            builder_content_type: "application/xml".to_string(),
            builder_indent: 2,
        }
    }
}

impl RenderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML configuration document.
    pub fn from_yaml_str(content: &str) -> TemplateResult<Self> {
        let config: RenderConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML configuration file.
    pub fn from_yaml_file(path: &Path) -> TemplateResult<Self> {
        debug!("Loading render config from {:?}", path);
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Apply `VISTA_CACHE_TEMPLATES` and `VISTA_TRIM_MODE` when set.
    pub fn with_env_overrides(mut self) -> TemplateResult<Self> {
        if let Ok(value) = std::env::var(ENV_CACHE_TEMPLATES) {
            self.cache_template_loading = parse_flag(&value).ok_or_else(|| {
                TemplateError::Config(format!("{} must be a boolean, got {:?}", ENV_CACHE_TEMPLATES, value))
            })?;
        }
        if let Ok(value) = std::env::var(ENV_TRIM_MODE) {
            self.trim_mode = value;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.cache_template_loading = enabled;
        self
    }

    pub fn with_trim_mode(mut self, mode: impl Into<String>) -> Self {
        self.trim_mode = mode.into();
        self
    }

    pub fn with_builder_indent(mut self, indent: usize) -> Self {
        self.builder_indent = indent;
        self
    }

    /// Check extensions and trim mode for consistency.
    pub fn validate(&self) -> TemplateResult<()> {
        if self.scripted_extension.is_empty() || self.builder_extension.is_empty() {
            return Err(TemplateError::Config(
                "template extensions must not be empty".to_string(),
            ));
        }
        if self.scripted_extension == self.builder_extension {
            return Err(TemplateError::Config(format!(
                "scripted and builder templates share the extension {:?}",
                self.scripted_extension
            )));
        }
        if let Some(c) = self.trim_mode.chars().find(|c| !matches!(c, '-' | '<' | '>')) {
            return Err(TemplateError::Config(format!(
                "unsupported trim mode character {:?} in {:?}",
                c, self.trim_mode
            )));
        }
        Ok(())
    }
}

/// Parse a boolean-ish flag value.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RenderConfig::default();
        assert!(!config.cache_template_loading);
        assert_eq!(config.trim_mode, "-");
        assert_eq!(config.scripted_extension, "erb");
        assert_eq!(config.builder_extension, "builder");
        assert_eq!(config.partial_marker, '_');
    }

    #[test]
    fn test_from_yaml_partial_document() {
        let config = RenderConfig::from_yaml_str("cache_template_loading: true\ntrim_mode: \"<>\"\n").unwrap();
        assert!(config.cache_template_loading);
        assert_eq!(config.trim_mode, "<>");
        assert_eq!(config.builder_extension, "builder");
    }

    #[test]
    fn test_rejects_shared_extension() {
        let result = RenderConfig::from_yaml_str("scripted_extension: tpl\nbuilder_extension: tpl\n");
        assert!(matches!(result, Err(TemplateError::Config(_))));
    }

    #[test]
    fn test_rejects_unknown_trim_mode() {
        let config = RenderConfig::new().with_trim_mode("%");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
