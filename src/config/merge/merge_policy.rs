//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Only top-level keys that other layers commonly override are seeded here; every
/// section carries serde defaults for the rest.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("output_dir", "output")?
        .set_default("feed.url", crate::config::DEFAULT_FEED_URL)?
        .set_default("render.max_attempts", 3)?
        .set_default("render.min_success", 4)
}
