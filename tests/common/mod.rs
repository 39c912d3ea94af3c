//! Shared harness for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use conductor::adapters::ai::MockProviderAdapter;
use conductor::adapters::events::RecordingStageObserver;
use conductor::adapters::history::InMemoryHistoryStore;
use conductor::adapters::memory::{
    HashingEmbedder, InMemorySemanticMemory, InMemoryShortTermMemory,
};
use conductor::adapters::profile::InMemoryProfileStore;
use conductor::adapters::rate_limiter::SlidingWindowRateLimiter;
use conductor::adapters::resilience::CircuitBreakerRegistry;
use conductor::application::{PipelineDeps, RequestOrchestrator, StageSettings};
use conductor::domain::capability::CapabilityRegistry;
use conductor::domain::catalog::Catalog;
use conductor::domain::foundation::UserId;
use conductor::domain::routing::{ProviderRouter, RetryPolicy};
use conductor::ports::{CallerProfile, CircuitBreakerConfig};

pub struct Harness {
    pub orchestrator: Arc<RequestOrchestrator>,
    pub router: Arc<ProviderRouter>,
    pub registry: Arc<CapabilityRegistry>,
    pub profiles: InMemoryProfileStore,
    pub history: InMemoryHistoryStore,
    pub recorder: RecordingStageObserver,
    pub openai: MockProviderAdapter,
    pub anthropic: MockProviderAdapter,
    pub local: MockProviderAdapter,
}

pub struct HarnessBuilder {
    openai: MockProviderAdapter,
    anthropic: MockProviderAdapter,
    local: MockProviderAdapter,
    breaker: CircuitBreakerConfig,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            openai: MockProviderAdapter::new("openai", &["gpt-4o", "gpt-4o-mini"])
                .with_fallback_priority(1),
            anthropic: MockProviderAdapter::new("anthropic", &["claude-sonnet", "claude-haiku"])
                .with_fallback_priority(0),
            local: MockProviderAdapter::new("local", &["llama-3-70b"]).with_fallback_priority(2),
            breaker: CircuitBreakerConfig::default(),
        }
    }

    pub fn openai(mut self, f: impl FnOnce(MockProviderAdapter) -> MockProviderAdapter) -> Self {
        self.openai = f(self.openai);
        self
    }

    pub fn anthropic(mut self, f: impl FnOnce(MockProviderAdapter) -> MockProviderAdapter) -> Self {
        self.anthropic = f(self.anthropic);
        self
    }

    pub fn local(mut self, f: impl FnOnce(MockProviderAdapter) -> MockProviderAdapter) -> Self {
        self.local = f(self.local);
        self
    }

    pub fn breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = config;
        self
    }

    pub fn build(self) -> Harness {
        let catalog = Arc::new(Catalog::default());
        let router = Arc::new(
            ProviderRouter::new(
                Arc::clone(&catalog),
                Arc::new(CircuitBreakerRegistry::new(self.breaker)),
            )
            .with_retry_policy(RetryPolicy::no_retry(Duration::from_secs(5)))
            .with_adapter(Arc::new(self.openai.clone()))
            .with_adapter(Arc::new(self.anthropic.clone()))
            .with_adapter(Arc::new(self.local.clone())),
        );
        let registry = Arc::new(CapabilityRegistry::new(Arc::new(
            SlidingWindowRateLimiter::default(),
        )));
        let profiles = InMemoryProfileStore::new().with_profiles([
            caller("alice", "pro"),
            caller("frank", "free"),
            caller("erin", "enterprise"),
        ]);
        let history = InMemoryHistoryStore::new();
        let recorder = RecordingStageObserver::new();

        let deps = PipelineDeps {
            catalog,
            registry: Arc::clone(&registry),
            router: Arc::clone(&router),
            profiles: Arc::new(profiles.clone()),
            history: Arc::new(history.clone()),
            short_term: Arc::new(InMemoryShortTermMemory::new()),
            semantic: Arc::new(InMemorySemanticMemory::new()),
            embedder: Arc::new(HashingEmbedder::default()),
            settings: StageSettings::default(),
        };
        let orchestrator =
            Arc::new(RequestOrchestrator::new(deps).with_observer(Arc::new(recorder.clone())));

        Harness {
            orchestrator,
            router,
            registry,
            profiles,
            history,
            recorder,
            openai: self.openai,
            anthropic: self.anthropic,
            local: self.local,
        }
    }
}

pub fn harness() -> Harness {
    HarnessBuilder::new().build()
}

pub fn caller(id: &str, plan: &str) -> CallerProfile {
    CallerProfile::new(UserId::new(id).unwrap(), plan)
}

pub fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}
