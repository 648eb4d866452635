use anyhow::{anyhow, Context, Result};
use jsonc_parser::{parse_to_serde_value, ParseOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::time;

use crate::matching::MatchMode;
use crate::prompt::{Tone, ToneProfile};

const APP_NAME: &str = "brandcap-rs";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// JSON/JSONC catalog; the built-in demo catalog is used when unset.
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,

    /// CSV with `image,baseColour,articleType,gender` columns.
    #[serde(default)]
    pub samples_path: Option<PathBuf>,

    #[serde(default)]
    pub result_log_path: Option<PathBuf>,

    #[serde(default)]
    pub default_tone: Tone,

    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    #[serde(default = "default_max_length")]
    pub default_max_length: u32,

    #[serde(default)]
    pub match_mode: MatchMode,

    #[serde(default)]
    pub tone_templates: HashMap<Tone, ToneProfile>,

    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    #[default]
    None,
    Groq,
    Gemini,
}

impl GenerationProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationProvider::None => "none",
            GenerationProvider::Groq => "groq",
            GenerationProvider::Gemini => "gemini",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    #[serde(default)]
    pub provider: GenerationProvider,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_top_p")]
    pub top_p: Option<f32>,

    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: Option<f32>,

    #[serde(default = "default_sampling")]
    pub sampling: bool,

    #[serde(default)]
    pub groq: GroqConfig,

    #[serde(default)]
    pub gemini: GeminiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroqConfig {
    #[serde(default = "default_groq_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_groq_model")]
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeminiConfig {
    #[serde(default = "default_gemini_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_gemini_model")]
    pub model: String,

    /// Model used to describe uploaded images when no base caption is given.
    #[serde(default = "default_gemini_model")]
    pub vision_model: String,
}

fn default_temperature() -> f32 {
    0.9
}

fn default_max_length() -> u32 {
    60
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_top_p() -> Option<f32> {
    Some(0.95)
}

fn default_repetition_penalty() -> Option<f32> {
    Some(1.2)
}

fn default_sampling() -> bool {
    true
}

fn default_groq_endpoint() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}

fn default_groq_model() -> String {
    "llama-3.1-8b-instant".to_string()
}

fn default_gemini_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_path: None,
            samples_path: None,
            result_log_path: None,
            default_tone: Tone::default(),
            default_temperature: default_temperature(),
            default_max_length: default_max_length(),
            match_mode: MatchMode::default(),
            tone_templates: HashMap::new(),
            generation: GenerationConfig::default(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: GenerationProvider::default(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            top_p: default_top_p(),
            repetition_penalty: default_repetition_penalty(),
            sampling: default_sampling(),
            groq: GroqConfig::default(),
            gemini: GeminiConfig::default(),
        }
    }
}

impl Default for GroqConfig {
    fn default() -> Self {
        Self {
            endpoint: default_groq_endpoint(),
            model: default_groq_model(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_gemini_endpoint(),
            model: default_gemini_model(),
            vision_model: default_gemini_model(),
        }
    }
}

impl GenerationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(5))
    }
}

#[derive(Clone)]
pub struct ConfigManager {
    inner: Arc<ConfigManagerInner>,
}

struct ConfigManagerInner {
    config: RwLock<Config>,
    config_path: PathBuf,
    change_tx: watch::Sender<Config>,
    watcher_active: AtomicBool,
}

impl ConfigManager {
    /// Loads `config.jsonc` from the platform config directory, writing the
    /// defaults there on first run.
    pub fn load() -> Result<Self> {
        let config_dir = project_dirs()?.config_dir().to_path_buf();
        fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        Self::load_from(&config_dir.join("config.jsonc"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            Self::read_config_from_disk(path)?
        } else {
            let default_config = Config::default();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
            Self::write_config_file(path, &default_config)?;
            tracing::info!("Created default config at: {:?}", path);
            default_config
        };

        tracing::info!("Loaded config from: {:?}", path);

        let (change_tx, _) = watch::channel(config.clone());

        Ok(Self {
            inner: Arc::new(ConfigManagerInner {
                config: RwLock::new(config),
                config_path: path.to_path_buf(),
                change_tx,
                watcher_active: AtomicBool::new(false),
            }),
        })
    }

    pub fn start_watching(&self) {
        if self.inner.watcher_active.swap(true, Ordering::SeqCst) {
            return;
        }

        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let mut last_state = Self::file_state(&inner.config_path);
            let mut ticker = time::interval(Duration::from_millis(500));

            loop {
                ticker.tick().await;

                let current_state = Self::file_state(&inner.config_path);
                if current_state == last_state {
                    continue;
                }

                last_state = current_state;

                match Self::read_config_from_disk(&inner.config_path) {
                    Ok(new_config) => {
                        let mut guard = inner.config.write().expect("config lock poisoned");
                        if *guard != new_config {
                            let old_config = guard.clone();
                            *guard = new_config.clone();
                            drop(guard);

                            if inner.change_tx.send(new_config.clone()).is_ok() {
                                tracing::info!("Reloaded config from: {:?}", inner.config_path);
                                tracing::debug!(
                                    ?old_config,
                                    ?new_config,
                                    "Config watcher applied update"
                                );
                            }
                        }
                    }
                    Err(err) => {
                        tracing::warn!("Failed to reload config: {err:#}");
                    }
                }
            }
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<Config> {
        self.inner.change_tx.subscribe()
    }

    pub fn get(&self) -> Config {
        self.inner
            .config
            .read()
            .expect("config lock poisoned")
            .clone()
    }

    pub fn config_path(&self) -> &Path {
        &self.inner.config_path
    }

    fn read_config_from_disk(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {:?}", path))?;
        parse_config(&content)
    }

    fn write_config_file(path: &Path, config: &Config) -> Result<()> {
        let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
        fs::write(path, json).with_context(|| format!("Failed to write config file at {:?}", path))
    }

    fn file_state(path: &Path) -> Option<(SystemTime, u64)> {
        let metadata = fs::metadata(path).ok()?;
        let modified = metadata.modified().ok()?;
        Some((modified, metadata.len()))
    }
}

/// Where accepted results are appended: `result_log_path` when set, else
/// `results.tsv` in the platform data directory.
pub fn result_log_path(config: &Config) -> Result<PathBuf> {
    if let Some(path) = &config.result_log_path {
        return Ok(path.clone());
    }

    let data_dir = project_dirs()?.data_dir().to_path_buf();
    Ok(data_dir.join("results.tsv"))
}

pub fn parse_config(content: &str) -> Result<Config> {
    let value = parse_to_serde_value(content, &ParseOptions::default())
        .context("Failed to parse config as JSONC")?
        .ok_or_else(|| anyhow!("Config file did not contain a JSON value"))?;
    serde_json::from_value(value).context("Failed to deserialize config")
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME).context("Failed to get config directory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config = parse_config("{}").expect("parse");
        assert_eq!(config, Config::default());
        assert_eq!(config.generation.provider, GenerationProvider::None);
        assert_eq!(config.match_mode, MatchMode::Boundary);
    }

    #[test]
    fn parses_comments_and_overrides() {
        let content = r#"{
            // use the hosted model
            "default_tone": "luxury",
            "match_mode": "substring",
            "tone_templates": {
                "fun": { "template": "Be silly about {base}", "max_length": 40 }
            },
            "generation": {
                "provider": "gemini",
                "request_timeout_secs": 1,
                "top_p": null
            }
        }"#;

        let config = parse_config(content).expect("parse");
        assert_eq!(config.default_tone, Tone::Luxury);
        assert_eq!(config.match_mode, MatchMode::Substring);
        assert_eq!(config.generation.provider, GenerationProvider::Gemini);
        assert_eq!(config.generation.top_p, None);
        assert_eq!(config.generation.repetition_penalty, Some(1.2));
        assert_eq!(config.generation.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.tone_templates[&Tone::Fun].max_length, Some(40));
        assert_eq!(config.generation.gemini.model, "gemini-2.5-flash");
    }

    #[test]
    fn rejects_unknown_tone() {
        assert!(parse_config(r#"{ "default_tone": "grumpy" }"#).is_err());
    }

    #[test]
    fn defaults_round_trip_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.jsonc");

        let manager = ConfigManager::load_from(&path).expect("load");
        assert!(path.exists());
        assert_eq!(manager.get(), Config::default());

        let reloaded = ConfigManager::load_from(&path).expect("reload");
        assert_eq!(reloaded.get(), Config::default());
        assert_eq!(reloaded.config_path(), path.as_path());
    }

    #[test]
    fn explicit_result_log_path_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.jsonc");
        fs::write(&path, r#"{ "result_log_path": "/tmp/brandcap-results.tsv" }"#).expect("write");

        let manager = ConfigManager::load_from(&path).expect("load");
        assert_eq!(
            result_log_path(&manager.get()).expect("path"),
            PathBuf::from("/tmp/brandcap-results.tsv")
        );
    }
}
