use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::domain::response::{Response, ResponseOptions};
use crate::domain::traits::TranslationService;
use crate::infrastructure::cache::CacheStats;

/// Orchestrates the public translate/pivot surface on top of
/// `TranslationService`: business-level validation here, the actual work
/// delegated to the service.
pub struct TranslateUseCase {
    service: Arc<dyn TranslationService>,
}

impl TranslateUseCase {
    pub fn new(service: Arc<dyn TranslationService>) -> Self {
        Self { service }
    }

    /// Empty input is legal: it produces an empty `Response`, not an error,
    /// so only the model name is validated here.
    pub async fn translate(&self, model: String, text: String, options: ResponseOptions) -> Result<Response> {
        if model.trim().is_empty() {
            return Err(anyhow!("model name cannot be empty"));
        }

        let response = self.service.translate(&model, text, options).await?;
        tracing::debug!(model = %model, sentences = response.num_sentences(), "translation complete");
        Ok(response)
    }

    pub async fn pivot(
        &self,
        model_a: String,
        model_b: String,
        text: String,
        options: ResponseOptions,
    ) -> Result<Response> {
        if model_a.trim().is_empty() || model_b.trim().is_empty() {
            return Err(anyhow!("pivot requires two non-empty model names"));
        }

        let response = self.service.pivot(&model_a, &model_b, text, options).await?;
        tracing::debug!(model_a = %model_a, model_b = %model_b, sentences = response.num_sentences(), "pivot complete");
        Ok(response)
    }
}

/// Read-only model registry + cache introspection. No hot model-swap:
/// registering models is a construction-time concern, not a runtime one.
pub struct ModelManagementUseCase {
    service: Arc<dyn TranslationService>,
    model_names: Vec<String>,
}

impl ModelManagementUseCase {
    pub fn new(service: Arc<dyn TranslationService>, model_names: Vec<String>) -> Self {
        Self { service, model_names }
    }

    pub fn list_models(&self) -> &[String] {
        &self.model_names
    }

    pub fn cache_stats(&self) -> HashMap<String, CacheStats> {
        self.service.cache_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::InferenceError;
    use async_trait::async_trait;

    struct StubService;

    #[async_trait]
    impl TranslationService for StubService {
        async fn translate(&self, _model: &str, _text: String, _options: ResponseOptions) -> Result<Response, InferenceError> {
            Ok(Response::default())
        }

        async fn pivot(
            &self,
            _model_a: &str,
            _model_b: &str,
            _text: String,
            _options: ResponseOptions,
        ) -> Result<Response, InferenceError> {
            Ok(Response::default())
        }

        fn cache_stats(&self) -> HashMap<String, CacheStats> {
            HashMap::new()
        }
    }

    #[tokio::test]
    async fn rejects_empty_model_name() {
        let use_case = TranslateUseCase::new(Arc::new(StubService));
        let result = use_case.translate(String::new(), "hi".to_string(), ResponseOptions::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn accepts_empty_text_as_legal_input() {
        let use_case = TranslateUseCase::new(Arc::new(StubService));
        let result = use_case.translate("m".to_string(), String::new(), ResponseOptions::default()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn pivot_rejects_missing_model_names() {
        let use_case = TranslateUseCase::new(Arc::new(StubService));
        let result = use_case
            .pivot("a".to_string(), String::new(), "hi".to_string(), ResponseOptions::default())
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn model_management_lists_registered_names() {
        let use_case = ModelManagementUseCase::new(Arc::new(StubService), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(use_case.list_models(), &["a".to_string(), "b".to_string()]);
    }
}
