//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.formcast.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".formcast.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Submission pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Live update settings.
    #[serde(default)]
    pub hub: HubSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path (`-` for stdout).
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "formcast_report.md".to_string()
}

/// Submission pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Run persist, aggregate and publish one submission at a time per form.
    #[serde(default = "default_true")]
    pub serialize_per_form: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            serialize_per_form: true,
        }
    }
}

/// Live viewer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSettings {
    /// Updates buffered per viewer before further ones are dropped.
    #[serde(default = "default_viewer_buffer")]
    pub viewer_buffer: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            viewer_buffer: default_viewer_buffer(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_viewer_buffer() -> usize {
    32
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.formcast.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }

        if args.no_serialize {
            self.pipeline.serialize_per_form = false;
        }

        if let Some(buffer) = args.viewer_buffer {
            self.hub.viewer_buffer = buffer;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
