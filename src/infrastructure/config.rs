use std::sync::{Arc, RwLock};

use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::domain::response::ConcatStrategy;
use crate::domain::traits::SplitMode;
use crate::domain::ConfigurationService;

/// Tunables for a single registered translation model's pool and cache.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FabricConfig {
    pub mini_batch_words: usize,
    pub max_length_break: usize,
    pub num_workers: usize,
    pub cache: CacheSettings,
    pub ssplit_mode: SsplitModeSetting,
    pub concat_strategy: ConcatStrategySetting,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            mini_batch_words: 1024,
            max_length_break: 128,
            num_workers: 4,
            cache: CacheSettings::default(),
            ssplit_mode: SsplitModeSetting::WrappedText,
            concat_strategy: ConcatStrategySetting::Faithful,
        }
    }
}

impl FabricConfig {
    /// `max_length_break > mini_batch_words` would let a single sentence
    /// overflow any possible batch; this is a construction-time fatal.
    pub fn validate(&self) -> Result<(), crate::domain::InferenceError> {
        if self.max_length_break > self.mini_batch_words {
            return Err(crate::domain::InferenceError::InvalidConfig {
                message: format!(
                    "max_length_break ({}) must not exceed mini_batch_words ({})",
                    self.max_length_break, self.mini_batch_words
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SsplitModeSetting {
    OneSentencePerLine,
    OneParagraphPerLine,
    WrappedText,
}

impl From<SsplitModeSetting> for SplitMode {
    fn from(s: SsplitModeSetting) -> Self {
        match s {
            SsplitModeSetting::OneSentencePerLine => SplitMode::OneSentencePerLine,
            SsplitModeSetting::OneParagraphPerLine => SplitMode::OneParagraphPerLine,
            SsplitModeSetting::WrappedText => SplitMode::WrappedText,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcatStrategySetting {
    Faithful,
    Space,
}

impl From<ConcatStrategySetting> for ConcatStrategy {
    fn from(s: ConcatStrategySetting) -> Self {
        match s {
            ConcatStrategySetting::Faithful => ConcatStrategy::Faithful,
            ConcatStrategySetting::Space => ConcatStrategy::Space,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Sharded,
    Lru,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheSettings {
    pub kind: CacheKind,
    pub shards: usize,
    pub size_limit_bytes: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            kind: CacheKind::Sharded,
            shards: 4096,
            size_limit_bytes: 64 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// One named entry in the model registry: which hub repo/revision/device to
/// load `R` inference backend replicas from. `FabricConfig`'s tunables
/// (batching/cache/splitting) are process-wide; only the backend identity
/// and replica count vary per model.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelEntry {
    pub name: String,
    pub model_repo: String,
    pub revision: String,
    pub device: String,
    pub replicas: usize,
}

impl Default for ModelEntry {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            model_repo: "Helsinki-NLP/opus-mt-en-de".to_string(),
            revision: "main".to_string(),
            device: "cpu".to_string(),
            replicas: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub fabric: FabricConfig,
    pub server: ServerConfig,
    pub models: Vec<ModelEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fabric: FabricConfig::default(),
            server: ServerConfig::default(),
            models: vec![ModelEntry::default()],
        }
    }
}

/// Layered configuration: `config/default` → `config/{environment}` →
/// `config/local` → `INFERENCE_*` environment variables.
pub struct FileConfigurationService {
    config: Arc<RwLock<AppConfig>>,
}

impl FileConfigurationService {
    pub fn new() -> Result<Self, ConfigError> {
        Self::new_with_environment(None)
    }

    pub fn new_with_environment(env: Option<&str>) -> Result<Self, ConfigError> {
        let default_env = std::env::var("INFERENCE_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = env.unwrap_or(&default_env);

        let mut builder = Config::builder().add_source(File::with_name("config/default").required(false));

        if environment != "default" {
            builder = builder.add_source(File::with_name(&format!("config/{}", environment)).required(false));
        }

        builder = builder.add_source(File::with_name("config/local").required(false));
        builder = builder.add_source(Environment::with_prefix("INFERENCE").separator("__"));

        let settings = builder.build()?;

        let config: AppConfig = match settings.try_deserialize() {
            Ok(config) => {
                tracing::info!(environment, "loaded configuration");
                config
            }
            Err(e) => {
                tracing::warn!(environment, error = %e, "failed to deserialize config, using defaults");
                AppConfig::default()
            }
        };

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
        })
    }

    pub fn get_app_config(&self) -> Result<AppConfig> {
        let config = self
            .config
            .read()
            .map_err(|_| anyhow::anyhow!("failed to acquire read lock on configuration"))?;
        Ok(config.clone())
    }
}

impl ConfigurationService for FileConfigurationService {
    fn fabric_config(&self) -> FabricConfig {
        self.config.read().expect("configuration lock poisoned").fabric.clone()
    }

    fn server_config(&self) -> ServerConfig {
        self.config.read().expect("configuration lock poisoned").server.clone()
    }

    fn models(&self) -> Vec<ModelEntry> {
        self.config.read().expect("configuration lock poisoned").models.clone()
    }
}
