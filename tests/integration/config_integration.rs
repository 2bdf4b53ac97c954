//! Layered configuration: workspace files, environment and explicit files

use ai_things_considered::config::{ConfigLoader, SceneSource};
use ai_things_considered::provider::ProviderType;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempDir;

/// Serializes tests that touch process environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

struct EnvGuard {
    saved: Vec<(&'static str, Option<String>)>,
}

impl EnvGuard {
    fn set(vars: &[(&'static str, Option<&str>)]) -> Self {
        let saved = vars
            .iter()
            .map(|(key, value)| {
                let original = std::env::var(key).ok();
                match value {
                    Some(v) => std::env::set_var(key, v),
                    None => std::env::remove_var(key),
                }
                (*key, original)
            })
            .collect();
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

#[test]
fn environment_specific_file_overrides_base() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let workspace = TempDir::new().unwrap();
    let xdg = TempDir::new().unwrap();
    let _env = EnvGuard::set(&[
        ("XDG_CONFIG_HOME", Some(xdg.path().to_str().unwrap())),
        ("ATC_ENV", Some("production")),
    ]);

    let config_dir = workspace.path().join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        "output_dir = \"base-output\"\n[render]\nconcurrency = 2\n",
    )
    .unwrap();
    std::fs::write(
        config_dir.join("production.toml"),
        "output_dir = \"/srv/atc\"\n[synthesis]\nscene_source = \"reasoning\"\n",
    )
    .unwrap();

    let config = ConfigLoader::load(workspace.path()).unwrap();

    assert_eq!(config.output_dir, PathBuf::from("/srv/atc"));
    assert_eq!(config.render.concurrency, 2);
    assert_eq!(config.synthesis.scene_source, SceneSource::Reasoning);
    assert!(config.validate().is_ok());
}

#[test]
fn global_file_sits_below_workspace_and_env() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let workspace = TempDir::new().unwrap();
    let xdg = TempDir::new().unwrap();
    let _env = EnvGuard::set(&[
        ("XDG_CONFIG_HOME", Some(xdg.path().to_str().unwrap())),
        ("ATC_ENV", None),
        ("ATC__REASONING__MODEL", Some("gpt-4o-mini")),
    ]);

    let global_dir = xdg.path().join("ai-things-considered");
    std::fs::create_dir_all(&global_dir).unwrap();
    std::fs::write(
        global_dir.join("config.toml"),
        "[reasoning]\nprovider_type = \"openai\"\nmodel = \"from-global\"\n[style]\ntitle = \"GLOBAL TITLE\"\n",
    )
    .unwrap();
    std::fs::create_dir_all(workspace.path().join("config")).unwrap();
    std::fs::write(
        workspace.path().join("config").join("config.toml"),
        "[style]\ntitle = \"WORKSPACE TITLE\"\n",
    )
    .unwrap();

    let config = ConfigLoader::load(workspace.path()).unwrap();

    assert_eq!(config.reasoning.provider_type, ProviderType::OpenAI);
    assert_eq!(config.reasoning.model, "gpt-4o-mini");
    assert_eq!(config.style.title, "WORKSPACE TITLE");
    assert_eq!(
        ConfigLoader::global_config_path(),
        Some(global_dir.join("config.toml"))
    );
}

#[test]
fn missing_explicit_file_is_an_error() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    assert!(ConfigLoader::load_from_file(&dir.path().join("absent.toml")).is_err());
}
