pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use application::*;
pub use domain::*;
pub use infrastructure::*;
pub use presentation::*;

use std::sync::Arc;

/// Simple but flexible dependency injection container, backed by a registry
/// of named translation models (held inside `AsyncService`, not here directly).
pub struct Container {
    pub config_service: Arc<dyn domain::ConfigurationService>,
    pub translation_service: Arc<dyn domain::TranslationService>,
}

impl Container {
    /// Create a container with real, hub-backed collaborators.
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_real_services().await
    }

    pub async fn with_real_services() -> anyhow::Result<Self> {
        tracing::info!("Creating container with real translation backends...");
        let services = application::ApplicationServices::new().await?;
        tracing::info!("✅ Container ready");

        Ok(Self {
            config_service: services.config_service.clone(),
            translation_service: services.service.clone(),
        })
    }

    /// Create with custom dependencies (for testing).
    pub fn with_dependencies(
        config_service: Arc<dyn domain::ConfigurationService>,
        translation_service: Arc<dyn domain::TranslationService>,
    ) -> Self {
        Self {
            config_service,
            translation_service,
        }
    }

    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }
}

/// Builder for flexible dependency injection container construction.
#[derive(Default)]
pub struct ContainerBuilder {
    config_service: Option<Arc<dyn domain::ConfigurationService>>,
    translation_service: Option<Arc<dyn domain::TranslationService>>,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_service(mut self, service: Arc<dyn domain::ConfigurationService>) -> Self {
        self.config_service = Some(service);
        self
    }

    pub fn with_translation_service(mut self, service: Arc<dyn domain::TranslationService>) -> Self {
        self.translation_service = Some(service);
        self
    }

    pub async fn build(self) -> anyhow::Result<Container> {
        let config_service = match self.config_service {
            Some(service) => service,
            None => Arc::new(infrastructure::config::FileConfigurationService::new()?),
        };

        let translation_service = match self.translation_service {
            Some(service) => service,
            None => {
                let services = application::ApplicationServices::new().await?;
                services.service.clone()
            }
        };

        Ok(Container {
            config_service,
            translation_service,
        })
    }
}

/// Re-export commonly used types for easier access.
pub mod prelude {
    pub use crate::domain::{ConfigurationService, ResponseOptions, TranslationService};
    pub use crate::application::ApplicationServices;
    pub use crate::{Container, ContainerBuilder};
    pub use std::sync::Arc;
}
