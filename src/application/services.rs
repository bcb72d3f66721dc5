use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::application::{ModelManagementUseCase, TranslateUseCase};
use crate::domain::traits::{ConfigurationService, HtmlProcessor, InferenceBackend, TranslationService};
use crate::infrastructure::async_service::AsyncService;
use crate::infrastructure::cache::build_cache;
use crate::infrastructure::config::{FileConfigurationService, ModelEntry};
use crate::infrastructure::html::RegexHtmlProcessor;
use crate::infrastructure::inference_backend::{fetch_eos_id, BackendConfig, CandleMarianBackend};
use crate::infrastructure::splitter::HeuristicSplitter;
use crate::infrastructure::text_processor::TextProcessor;
use crate::infrastructure::tokenizer::HfTokenizer;
use crate::infrastructure::translation_model::{ModelConfig, TranslationModel};

/// Application-level dependency injection: one `AsyncService` fans out
/// across a registry of named `TranslationModel`s.
pub struct ApplicationServices {
    pub translate_use_case: TranslateUseCase,
    pub model_management_use_case: ModelManagementUseCase,
    pub config_service: Arc<dyn ConfigurationService>,
    pub service: Arc<dyn TranslationService>,
}

impl ApplicationServices {
    /// Create application services with real hub-backed models.
    pub async fn new() -> Result<Self> {
        Self::create_with_real_services().await
    }

    pub async fn create_with_real_services() -> Result<Self> {
        tracing::info!("Creating application services with real translation backends...");

        let config_service: Arc<dyn ConfigurationService> = Arc::new(FileConfigurationService::new()?);
        let fabric = config_service.fabric_config();
        fabric.validate()?;

        let html: Arc<dyn HtmlProcessor> = Arc::new(RegexHtmlProcessor::new());

        let mut models = HashMap::new();
        for entry in config_service.models() {
            let model = build_model(&entry, &fabric)
                .await
                .with_context(|| format!("loading model '{}'", entry.name))?;
            models.insert(entry.name.clone(), model);
        }

        let service: Arc<dyn TranslationService> = AsyncService::new(models.clone(), fabric.num_workers.max(1), Some(html));

        let model_names: Vec<String> = models.keys().cloned().collect();
        let translate_use_case = TranslateUseCase::new(service.clone());
        let model_management_use_case = ModelManagementUseCase::new(service.clone(), model_names);

        tracing::info!(models = models.len(), "✅ application services created");

        Ok(Self {
            translate_use_case,
            model_management_use_case,
            config_service,
            service,
        })
    }

    /// Create with custom dependencies (for testing).
    pub fn with_dependencies(
        config_service: Arc<dyn ConfigurationService>,
        service: Arc<dyn TranslationService>,
        model_names: Vec<String>,
    ) -> Self {
        let translate_use_case = TranslateUseCase::new(service.clone());
        let model_management_use_case = ModelManagementUseCase::new(service.clone(), model_names);

        Self {
            translate_use_case,
            model_management_use_case,
            config_service,
            service,
        }
    }
}

async fn build_model(entry: &ModelEntry, fabric: &crate::infrastructure::config::FabricConfig) -> Result<Arc<TranslationModel>> {
    let backend_config = BackendConfig {
        model_repo: entry.model_repo.clone(),
        revision: entry.revision.clone(),
        device: entry.device.clone(),
        ..Default::default()
    };

    // Loading weights happens per replica below via hf_hub's local cache, so
    // fetching just `config.json` here to learn the eos id is cheap even
    // though it duplicates a network round-trip against the first replica.
    let eos_id = fetch_eos_id(&backend_config)?;
    let tokenizer = Arc::new(HfTokenizer::from_hub(&entry.model_repo, &entry.revision, eos_id)?);

    let mut replicas: Vec<Arc<dyn InferenceBackend>> = Vec::with_capacity(entry.replicas.max(1));
    for _ in 0..entry.replicas.max(1) {
        replicas.push(Arc::new(CandleMarianBackend::load(&backend_config)?));
    }

    let processor = TextProcessor::new(
        Arc::new(HeuristicSplitter),
        tokenizer.clone(),
        fabric.max_length_break,
        fabric.ssplit_mode.into(),
        fabric.mini_batch_words,
    )?;

    let model_config = ModelConfig {
        name: entry.name.clone(),
        mini_batch_words: fabric.mini_batch_words,
        max_length_break: fabric.max_length_break,
        replicas: entry.replicas.max(1),
    };

    let model = TranslationModel::new(model_config, processor, tokenizer, build_cache(&fabric.cache))?.with_replicas(replicas);

    Ok(Arc::new(model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::response::{Response, ResponseOptions};
    use crate::infrastructure::config::{CacheSettings, ConcatStrategySetting, FabricConfig, ServerConfig, SsplitModeSetting};
    use async_trait::async_trait;

    struct StubConfig;

    impl ConfigurationService for StubConfig {
        fn fabric_config(&self) -> FabricConfig {
            FabricConfig {
                mini_batch_words: 100,
                max_length_break: 8,
                num_workers: 1,
                cache: CacheSettings::default(),
                ssplit_mode: SsplitModeSetting::WrappedText,
                concat_strategy: ConcatStrategySetting::Faithful,
            }
        }

        fn server_config(&self) -> ServerConfig {
            ServerConfig::default()
        }

        fn models(&self) -> Vec<ModelEntry> {
            vec![ModelEntry::default()]
        }
    }

    struct StubService;

    #[async_trait]
    impl TranslationService for StubService {
        async fn translate(&self, _model: &str, _text: String, _options: ResponseOptions) -> Result<Response, crate::domain::errors::InferenceError> {
            Ok(Response::default())
        }

        async fn pivot(
            &self,
            _model_a: &str,
            _model_b: &str,
            _text: String,
            _options: ResponseOptions,
        ) -> Result<Response, crate::domain::errors::InferenceError> {
            Ok(Response::default())
        }

        fn cache_stats(&self) -> HashMap<String, crate::infrastructure::cache::CacheStats> {
            HashMap::new()
        }
    }

    #[test]
    fn with_dependencies_wires_use_cases_without_real_models() {
        let services = ApplicationServices::with_dependencies(Arc::new(StubConfig), Arc::new(StubService), vec!["m".to_string()]);
        assert_eq!(services.model_management_use_case.list_models(), &["m".to_string()]);
    }
}
