//! Configuration System
//!
//! Layered configuration for a strip run: built-in defaults, the global config file,
//! workspace config files, then `ATC__`-prefixed environment variables. Everything a
//! stage needs (style preamble, feed URL, retry policy, thresholds) is carried here and
//! threaded through explicitly.

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::provider::ProviderType;
use crate::render::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

pub const DEFAULT_FEED_URL: &str = "https://feeds.npr.org/2/rss.xml";
pub const DEFAULT_TITLE: &str = "AI THINGS CONSIDERED";
pub const DEFAULT_STYLE_PREAMBLE: &str = "Vintage comic panel illustration. Muted earth tone palette - cream, warm brown, dusty blue, sage green, faded ochre. Flat geometric shapes with clean precise linework. Diagrammatic, nostalgic mid-century newspaper illustration aesthetic. Hand-drawn feel with architectural precision.";

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripConfig {
    /// Directory receiving dated archives and the latest pointers
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub style: StyleConfig,

    #[serde(default)]
    pub reasoning: ReasoningConfig,

    #[serde(default)]
    pub image: ImageConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub references: ReferencesConfig,

    #[serde(default)]
    pub synthesis: SynthesisConfig,

    #[serde(default)]
    pub fonts: FontConfig,

    #[serde(default)]
    pub web: WebConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for StripConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            feed: FeedConfig::default(),
            style: StyleConfig::default(),
            reasoning: ReasoningConfig::default(),
            image: ImageConfig::default(),
            render: RenderConfig::default(),
            references: ReferencesConfig::default(),
            synthesis: SynthesisConfig::default(),
            fonts: FontConfig::default(),
            web: WebConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_url")]
    pub url: String,
    #[serde(default = "default_feed_timeout")]
    pub timeout_secs: u64,
}

fn default_feed_url() -> String {
    DEFAULT_FEED_URL.to_string()
}

fn default_feed_timeout() -> u64 {
    30
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: default_feed_url(),
            timeout_secs: default_feed_timeout(),
        }
    }
}

/// Visual identity of the strip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_preamble")]
    pub preamble: String,
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

fn default_preamble() -> String {
    DEFAULT_STYLE_PREAMBLE.to_string()
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            preamble: default_preamble(),
        }
    }
}

/// Reasoning backend used for selection and optional scene writing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default = "default_provider_type")]
    pub provider_type: ProviderType,
    #[serde(default = "default_reasoning_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

fn default_provider_type() -> ProviderType {
    ProviderType::Gemini
}

fn default_reasoning_model() -> String {
    "gemini-2.5-flash".to_string()
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            provider_type: default_provider_type(),
            model: default_reasoning_model(),
            api_key: None,
            endpoint: None,
            temperature: None,
        }
    }
}

impl ReasoningConfig {
    /// Configured key, else the provider's conventional environment variable
    pub fn resolved_api_key(&self) -> Option<String> {
        let env_var = match self.provider_type {
            ProviderType::Gemini => "GOOGLE_AI_API_KEY",
            ProviderType::OpenAI => "OPENAI_API_KEY",
        };
        non_empty(self.api_key.clone()).or_else(|| non_empty(std::env::var(env_var).ok()))
    }
}

/// Image backend used for panel rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_image_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default = "default_image_size")]
    pub size: String,
}

fn default_image_model() -> String {
    "gemini-3-pro-image-preview".to_string()
}

fn default_aspect_ratio() -> String {
    "2:3".to_string()
}

fn default_image_size() -> String {
    "1K".to_string()
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            model: default_image_model(),
            api_key: None,
            endpoint: None,
            aspect_ratio: default_aspect_ratio(),
            size: default_image_size(),
        }
    }
}

impl ImageConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        non_empty(self.api_key.clone())
            .or_else(|| non_empty(std::env::var("GOOGLE_AI_API_KEY").ok()))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Panel rendering: retry policy, pool size and the success threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_min_success")]
    pub min_success: usize,
    /// Stop retrying once the success threshold can no longer be met
    #[serde(default)]
    pub short_circuit: bool,
    /// When set, each rendered panel is also written here as `panel_{n}.png`
    #[serde(default)]
    pub panel_cache_dir: Option<PathBuf>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_concurrency() -> usize {
    6
}

fn default_min_success() -> usize {
    4
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            concurrency: default_concurrency(),
            min_success: default_min_success(),
            short_circuit: false,
            panel_cache_dir: None,
        }
    }
}

impl RenderConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.backoff_multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferencesConfig {
    /// JSON manifest of known people; no manifest means no references
    #[serde(default)]
    pub manifest: Option<PathBuf>,
}

/// Where the scene description in each prompt comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneSource {
    /// Built from title and summary alone
    #[default]
    Derived,
    /// Written by the reasoning backend, falling back to `Derived`
    Reasoning,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesisConfig {
    #[serde(default)]
    pub scene_source: SceneSource,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FontConfig {
    #[serde(default)]
    pub title: Option<PathBuf>,
    #[serde(default)]
    pub date: Option<PathBuf>,
}

/// Downscaled JPEG copy of each strip for web delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_web_enabled")]
    pub enabled: bool,
    /// Wider strips are scaled down to this width, keeping aspect ratio
    #[serde(default = "default_web_max_width")]
    pub max_width: u32,
    #[serde(default = "default_web_quality")]
    pub quality: u8,
}

fn default_web_enabled() -> bool {
    true
}

fn default_web_max_width() -> u32 {
    1000
}

fn default_web_quality() -> u8 {
    85
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: default_web_enabled(),
            max_width: default_web_max_width(),
            quality: default_web_quality(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Provider(String, String),
    Render(String),
    Style(String),
    Feed(String),
    Web(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Provider(name, msg) => write!(f, "Provider '{}': {}", name, msg),
            ValidationError::Render(msg) => write!(f, "Render: {}", msg),
            ValidationError::Style(msg) => write!(f, "Style: {}", msg),
            ValidationError::Feed(msg) => write!(f, "Feed: {}", msg),
            ValidationError::Web(msg) => write!(f, "Web: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

fn validate_endpoint(endpoint: &Option<String>) -> Result<(), String> {
    match endpoint {
        Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
            Err(format!("Endpoint must be an http(s) URL, got '{}'", url))
        }
        _ => Ok(()),
    }
}

impl StripConfig {
    /// Validate the entire configuration, collecting every problem
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.reasoning.model.trim().is_empty() {
            errors.push(ValidationError::Provider(
                "reasoning".to_string(),
                "Model name cannot be empty".to_string(),
            ));
        }
        if let Err(e) = validate_endpoint(&self.reasoning.endpoint) {
            errors.push(ValidationError::Provider("reasoning".to_string(), e));
        }
        if self.image.model.trim().is_empty() {
            errors.push(ValidationError::Provider(
                "image".to_string(),
                "Model name cannot be empty".to_string(),
            ));
        }
        if let Err(e) = validate_endpoint(&self.image.endpoint) {
            errors.push(ValidationError::Provider("image".to_string(), e));
        }

        if !(1..=10).contains(&self.render.max_attempts) {
            errors.push(ValidationError::Render(format!(
                "max_attempts must be between 1 and 10, got {}",
                self.render.max_attempts
            )));
        }
        if !(1..=crate::types::PANEL_COUNT).contains(&self.render.min_success) {
            errors.push(ValidationError::Render(format!(
                "min_success must be between 1 and {}, got {}",
                crate::types::PANEL_COUNT,
                self.render.min_success
            )));
        }
        if self.render.concurrency == 0 {
            errors.push(ValidationError::Render(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if !(self.render.backoff_multiplier >= 1.0) {
            errors.push(ValidationError::Render(format!(
                "backoff_multiplier must be at least 1.0, got {}",
                self.render.backoff_multiplier
            )));
        }

        if self.style.title.trim().is_empty() {
            errors.push(ValidationError::Style("Title cannot be empty".to_string()));
        }
        if self.style.preamble.trim().is_empty() {
            errors.push(ValidationError::Style(
                "Style preamble cannot be empty".to_string(),
            ));
        }

        if self.feed.url.trim().is_empty() {
            errors.push(ValidationError::Feed("Feed URL cannot be empty".to_string()));
        }

        if self.web.enabled {
            if self.web.max_width == 0 {
                errors.push(ValidationError::Web("max_width must be at least 1".to_string()));
            }
            if !(1..=100).contains(&self.web.quality) {
                errors.push(ValidationError::Web(format!(
                    "quality must be between 1 and 100, got {}",
                    self.web.quality
                )));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// `validate` folded into a single error for callers that just need to stop
    pub fn ensure_valid(&self) -> Result<(), ApiError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Serializes tests that touch process environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config() {
        let config = StripConfig::default();
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.feed.url, DEFAULT_FEED_URL);
        assert_eq!(config.style.title, "AI THINGS CONSIDERED");
        assert_eq!(config.render.max_attempts, 3);
        assert_eq!(config.render.min_success, 4);
        assert_eq!(config.image.aspect_ratio, "2:3");
        assert_eq!(config.image.size, "1K");
        assert_eq!(config.synthesis.scene_source, SceneSource::Derived);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = StripConfig::default();
        config.render.max_attempts = 0;
        config.render.min_success = 7;
        config.render.concurrency = 0;
        config.style.preamble = "  ".to_string();
        config.reasoning.endpoint = Some("not-a-url".to_string());

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(config.ensure_valid().is_err());
    }

    #[test]
    fn test_web_copy_defaults_and_validation() {
        let mut config = StripConfig::default();
        assert!(config.web.enabled);
        assert_eq!(config.web.max_width, 1000);
        assert_eq!(config.web.quality, 85);

        config.web.quality = 0;
        config.web.max_width = 0;
        assert_eq!(config.validate().unwrap_err().len(), 2);

        config.web.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_policy_from_render_config() {
        let policy = RenderConfig::default().retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(2));
        assert_eq!(policy.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn test_load_from_toml_file() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("strip.toml");

        std::fs::write(
            &config_file,
            r#"
output_dir = "/srv/comics"

[style]
preamble = "Woodcut print."

[reasoning]
provider_type = "openai"
model = "gpt-4o-mini"

[render]
max_attempts = 5
short_circuit = true

[synthesis]
scene_source = "reasoning"
"#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&config_file).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/srv/comics"));
        assert_eq!(config.style.preamble, "Woodcut print.");
        assert_eq!(config.style.title, DEFAULT_TITLE);
        assert_eq!(config.reasoning.provider_type, ProviderType::OpenAI);
        assert_eq!(config.render.max_attempts, 5);
        assert_eq!(config.render.min_success, 4);
        assert!(config.render.short_circuit);
        assert_eq!(config.synthesis.scene_source, SceneSource::Reasoning);
    }

    #[test]
    fn test_environment_overrides_file() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("strip.toml");
        std::fs::write(&config_file, "[render]\nmax_attempts = 5\n").unwrap();

        std::env::set_var("ATC__RENDER__MAX_ATTEMPTS", "2");
        let config = ConfigLoader::load_from_file(&config_file);
        std::env::remove_var("ATC__RENDER__MAX_ATTEMPTS");

        assert_eq!(config.unwrap().render.max_attempts, 2);
    }

    #[test]
    fn test_workspace_config_is_loaded() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let temp_dir = TempDir::new().unwrap();
        let workspace = temp_dir.path();
        std::fs::create_dir_all(workspace.join("config")).unwrap();
        std::fs::write(
            workspace.join("config").join("config.toml"),
            "[feed]\nurl = \"https://example.com/feed.xml\"\n",
        )
        .unwrap();

        let original = std::env::var("XDG_CONFIG_HOME").ok();
        std::env::set_var("XDG_CONFIG_HOME", temp_dir.path().join("xdg"));
        let config = ConfigLoader::load(workspace);
        match original {
            Some(value) => std::env::set_var("XDG_CONFIG_HOME", value),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }

        assert_eq!(config.unwrap().feed.url, "https://example.com/feed.xml");
    }

    #[test]
    fn test_explicit_api_key_wins() {
        let config = ImageConfig {
            api_key: Some("from-config".to_string()),
            ..ImageConfig::default()
        };
        assert_eq!(config.resolved_api_key().as_deref(), Some("from-config"));
    }
}
