//! Configuration management for prop-shape matching
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (prop-shapes.toml)
//! - Environment variables (PROP_SHAPES__*)
//!
//! ## Example config file (prop-shapes.toml):
//! ```toml
//! [matching]
//! reference_hops = 1
//! excluded_field_types = ["map", "password", "language", "list_string_dynamic"]
//! image_extensions = ["avif", "gif", "jpeg", "jpg", "png", "svg", "webp"]
//!
//! [evaluation]
//! utc_normalized_field_types = ["datetime"]
//!
//! [cache]
//! enabled = true
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShapesConfig {
    /// Matcher settings
    #[serde(default)]
    pub matching: MatchingConfig,

    /// Evaluator settings
    #[serde(default)]
    pub evaluation: EvaluationConfig,

    /// Result cache settings
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Matcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// How many references the matcher may follow
    #[serde(default = "default_reference_hops")]
    pub reference_hops: u8,

    /// Field types never offered for binding
    #[serde(default = "default_excluded_field_types")]
    pub excluded_field_types: Vec<String>,

    /// Extensions an `image/*` URI prop accepts
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

/// Evaluator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Field types whose offset-less date-times get a `Z` appended
    #[serde(default = "default_utc_normalized_field_types")]
    pub utc_normalized_field_types: Vec<String>,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Memoize matcher results
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// Default value functions
fn default_reference_hops() -> u8 {
    1
}

fn default_true() -> bool {
    true
}

fn default_excluded_field_types() -> Vec<String> {
    ["map", "password", "language", "list_string_dynamic"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_image_extensions() -> Vec<String> {
    ["avif", "gif", "jpeg", "jpg", "png", "svg", "webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_utc_normalized_field_types() -> Vec<String> {
    vec!["datetime".to_string()]
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            reference_hops: default_reference_hops(),
            excluded_field_types: default_excluded_field_types(),
            image_extensions: default_image_extensions(),
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            utc_normalized_field_types: default_utc_normalized_field_types(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl ShapesConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = [
            "prop-shapes.toml",
            ".prop-shapes.toml",
            "config/prop-shapes.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "prop-shapes") {
            let xdg_config = config_dir.config_dir().join("prop-shapes.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (PROP_SHAPES__*)
        builder = builder.add_source(
            Environment::with_prefix("PROP_SHAPES")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ShapesConfig::default();
        assert_eq!(config.matching.reference_hops, 1);
        assert!(config.cache.enabled);
        assert!(config.matching.excluded_field_types.contains(&"password".to_string()));
        assert_eq!(config.evaluation.utc_normalized_field_types, vec!["datetime"]);
    }

    #[test]
    fn test_serialize_config() {
        let config = ShapesConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[matching]"));
        assert!(toml_str.contains("[evaluation]"));
        assert!(toml_str.contains("[cache]"));
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[matching]\nreference_hops = 2\n\n[cache]\nenabled = false\n",
        )
        .unwrap();

        let config = ShapesConfig::load_from(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.matching.reference_hops, 2);
        assert!(!config.cache.enabled);
        assert_eq!(config.matching.image_extensions.len(), 7);
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = ShapesConfig::default();
        config.matching.reference_hops = 3;
        config.save(path.to_str().unwrap()).unwrap();

        let saved = std::fs::read_to_string(&path).unwrap();
        let loaded: ShapesConfig = toml::from_str(&saved).unwrap();
        assert_eq!(loaded.matching.reference_hops, 3);
    }
}
