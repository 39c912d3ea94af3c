//! Process wiring: logging, catalog and profile loading, and assembly of
//! the orchestrator from [`AppConfig`].

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::adapters::ai::MockProviderAdapter;
use crate::adapters::history::InMemoryHistoryStore;
use crate::adapters::memory::{
    HashingEmbedder, InMemorySemanticMemory, InMemoryShortTermMemory, RedisShortTermMemory,
};
use crate::adapters::profile::InMemoryProfileStore;
use crate::adapters::rate_limiter::SlidingWindowRateLimiter;
use crate::adapters::resilience::CircuitBreakerRegistry;
use crate::application::{PipelineDeps, RequestOrchestrator};
use crate::config::{AppConfig, ConfigError, ServerConfig};
use crate::domain::capability::{
    CapabilityDefinition, CapabilityRegistry, FnHandler, HandlerError, RegistryError,
};
use crate::domain::catalog::{Catalog, CatalogError};
use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::routing::ProviderRouter;
use crate::ports::{CallerProfile, ShortTermMemory};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("failed to load profiles: {0}")]
    Profiles(String),

    #[error("failed to connect short-term memory: {0}")]
    Memory(#[from] DomainError),

    #[error("failed to register capability: {0}")]
    Registry(#[from] RegistryError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Installs the global subscriber. `RUST_LOG` wins over `server.log_level`.
pub fn init_tracing(server: &ServerConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&server.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if server.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

pub fn load_catalog(server: &ServerConfig) -> Result<Catalog, CatalogError> {
    match &server.catalog_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading catalog");
            Catalog::from_yaml_file(path)
        }
        None => Ok(Catalog::default()),
    }
}

pub fn load_profiles(path: &Path) -> Result<Vec<CallerProfile>, StartupError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| StartupError::Profiles(e.to_string()))?;
    serde_yaml::from_str(&contents).map_err(|e| StartupError::Profiles(e.to_string()))
}

/// One echoing adapter per provider named in the catalog, ordered by first
/// appearance. Network providers plug in through the same port.
pub fn local_provider_adapters(catalog: &Catalog) -> Vec<MockProviderAdapter> {
    let mut providers: BTreeMap<&str, (usize, Vec<&str>)> = BTreeMap::new();
    for (index, model) in catalog.models().iter().enumerate() {
        providers
            .entry(model.provider.as_str())
            .or_insert_with(|| (index, Vec::new()))
            .1
            .push(model.id.as_str());
    }
    let mut ordered: Vec<_> = providers.into_iter().collect();
    ordered.sort_by_key(|(_, (first_seen, _))| *first_seen);
    ordered
        .into_iter()
        .enumerate()
        .map(|(priority, (name, (_, models)))| {
            MockProviderAdapter::new(name, &models).with_fallback_priority(priority as u32)
        })
        .collect()
}

/// Capabilities every deployment ships with.
pub fn register_builtin_capabilities(registry: &CapabilityRegistry) -> Result<(), RegistryError> {
    registry.register(
        CapabilityDefinition::new(
            "echo",
            "utility",
            "Returns its parameters unchanged",
            Arc::new(FnHandler::new(|params: Value, _ctx| async move {
                Ok::<_, HandlerError>(params)
            })),
        )
        .with_tags(vec!["debug".into()]),
    )?;

    registry.register(
        CapabilityDefinition::new(
            "current_time",
            "utility",
            "Current UTC time in RFC 3339 format",
            Arc::new(FnHandler::new(|_params: Value, _ctx| async move {
                Ok::<_, HandlerError>(json!({"utc": Timestamp::now().to_rfc3339()}))
            })),
        )
        .with_tags(vec!["time".into(), "clock".into()]),
    )?;

    registry.register(
        CapabilityDefinition::new(
            "word_count",
            "text",
            "Counts the words in a piece of text",
            Arc::new(FnHandler::new(|params: Value, _ctx| async move {
                let text = params
                    .get("text")
                    .and_then(Value::as_str)
                    .ok_or_else(|| HandlerError::new("parameter 'text' must be a string"))?;
                Ok(json!({"words": text.split_whitespace().count()}))
            })),
        )
        .with_parameter_schema(json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        }))
        .with_tags(vec!["text".into(), "analysis".into()]),
    )?;
    Ok(())
}

/// Assembles the orchestrator and its collaborators from configuration.
pub async fn build_orchestrator(config: &AppConfig) -> Result<RequestOrchestrator, StartupError> {
    let catalog = Arc::new(load_catalog(&config.server)?);

    let mut router = ProviderRouter::new(
        Arc::clone(&catalog),
        Arc::new(CircuitBreakerRegistry::new(config.routing.circuit_breaker())),
    )
    .with_retry_policy(config.routing.retry_policy());
    for adapter in local_provider_adapters(&catalog) {
        router = router.with_adapter(Arc::new(adapter));
    }

    let limiter = Arc::new(SlidingWindowRateLimiter::new(
        config.capabilities.burst_interval(),
    ));
    let registry = CapabilityRegistry::with_config(limiter, config.capabilities.registry());
    register_builtin_capabilities(&registry)?;

    let mut profiles = InMemoryProfileStore::new();
    if let Some(path) = &config.server.profiles_path {
        let seeded = load_profiles(path)?;
        tracing::info!(count = seeded.len(), "seeded caller profiles");
        profiles = profiles.with_profiles(seeded);
    }

    let short_term: Arc<dyn ShortTermMemory> = match &config.memory.redis_url {
        Some(url) => {
            tracing::info!("short-term memory backed by redis");
            Arc::new(RedisShortTermMemory::connect(url).await?)
        }
        None => Arc::new(InMemoryShortTermMemory::new()),
    };

    let deps = PipelineDeps {
        catalog,
        registry: Arc::new(registry),
        router: Arc::new(router),
        profiles: Arc::new(profiles),
        history: Arc::new(InMemoryHistoryStore::new()),
        short_term,
        semantic: Arc::new(InMemorySemanticMemory::new()),
        embedder: Arc::new(HashingEmbedder::new(config.memory.embedding_dimensions)),
        settings: config.memory.stage_settings(),
    };
    Ok(RequestOrchestrator::new(deps).with_request_timeout(config.server.request_timeout()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::capability::CapabilityExecutionContext;
    use std::io::Write;

    #[test]
    fn local_adapters_cover_every_catalog_provider() {
        let catalog = Catalog::default();
        let adapters = local_provider_adapters(&catalog);
        let mut names: Vec<String> = adapters
            .iter()
            .map(|a| crate::ports::ProviderAdapter::descriptor(a).name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["anthropic", "local", "openai"]);
    }

    #[test]
    fn profiles_load_from_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "- caller_id: alice\n  plan: pro\n  display_name: Alice\n  preferred_persona: null\n- caller_id: bob\n  plan: free\n  display_name: null\n  preferred_persona: coach"
        )
        .unwrap();

        let profiles = load_profiles(file.path()).unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[1].preferred_persona.as_deref(), Some("coach"));
    }

    #[test]
    fn missing_profiles_file_is_reported() {
        let err = load_profiles(Path::new("/nonexistent/profiles.yaml")).unwrap_err();
        assert!(matches!(err, StartupError::Profiles(_)));
    }

    #[tokio::test]
    async fn builtin_word_count_validates_text() {
        let registry = CapabilityRegistry::new(Arc::new(SlidingWindowRateLimiter::default()));
        register_builtin_capabilities(&registry).unwrap();

        let ok = registry
            .execute(
                "word_count",
                CapabilityExecutionContext::new(json!({"text": "one two three"})),
            )
            .await
            .unwrap();
        assert_eq!(ok.output, Some(json!({"words": 3})));

        let bad = registry
            .execute("word_count", CapabilityExecutionContext::new(json!({})))
            .await
            .unwrap();
        assert!(!bad.success);
    }

    #[tokio::test]
    async fn default_config_builds_an_orchestrator() {
        let orchestrator = build_orchestrator(&AppConfig::default()).await.unwrap();
        assert_eq!(orchestrator.router().providers().len(), 3);
        assert_eq!(orchestrator.registry().names().len(), 3);
    }
}
