//! Config facade: assembles the layered sources and deserializes the result.

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::StripConfig;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loads `StripConfig` from the layered sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, then the global file, then workspace files under `workspace_root`,
    /// then `ATC__` environment variables.
    pub fn load(workspace_root: &Path) -> Result<StripConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        Self::finish(builder)
    }

    /// Defaults, then the given file (required), then `ATC__` environment variables.
    pub fn load_from_file(path: &Path) -> Result<StripConfig, ConfigError> {
        debug!(config_path = %path.display(), "Loading configuration file");
        let builder = merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()).required(true));
        Self::finish(builder)
    }

    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<StripConfig, ConfigError> {
        builder
            .add_source(
                Environment::with_prefix("ATC")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
