//! Provider router - primary selection, fallback chain and circuit breaking.
//!
//! For each request the router resolves the model's natural provider, builds
//! an ordered fallback chain and walks it until one provider answers:
//!
//! ```text
//! primary ──fail──▶ fallback 1 ──fail──▶ fallback 2 ──fail──▶ AllProvidersFailed
//!    │                  │                    │
//!    └─ circuit open ───┘ (skipped, not contacted)
//! ```
//!
//! Each provider call is admitted by that provider's circuit breaker and
//! retried with backoff under [`RetryPolicy`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;

use super::errors::{AttemptOutcome, ProviderAttempt, RoutingError};
use super::retry::RetryPolicy;
use crate::domain::catalog::{Catalog, PlanDefinition};
use crate::domain::foundation::CancellationSignal;
use crate::ports::{
    CircuitBreaker, CircuitBreakerFactory, CircuitSnapshot, FinishReason, Permit,
    ProviderAdapter, ProviderDescriptor, ProviderError, ProviderRequest, TokenUsage,
};

/// Per-request routing inputs beyond the request itself.
#[derive(Debug, Clone, Default)]
pub struct RouteHints {
    /// Caller's plan; its downgrade chain seeds the fallback chain.
    pub plan: Option<PlanDefinition>,
    /// Providers appended after the plan-derived fallbacks.
    pub fallback_providers: Vec<String>,
    pub cancellation: CancellationSignal,
}

impl RouteHints {
    pub fn with_plan(mut self, plan: PlanDefinition) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn with_fallback_providers(mut self, providers: Vec<String>) -> Self {
        self.fallback_providers = providers;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationSignal) -> Self {
        self.cancellation = cancellation;
        self
    }
}

/// A provider/model pair in the fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteCandidate {
    pub provider: String,
    pub model: String,
}

/// Execution metadata attached to every routed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingMetadata {
    /// Provider that produced the response.
    pub served_by: String,
    /// Model that produced the response.
    pub model: String,
    pub fallback_used: bool,
    pub primary_provider: String,
    pub primary_failure_reason: Option<String>,
    pub attempts: Vec<ProviderAttempt>,
    pub usage: TokenUsage,
    /// Cost in micro-dollars from the serving provider's cost table.
    pub cost_micros: u64,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedResponse {
    pub content: String,
    pub finish_reason: FinishReason,
    pub metadata: RoutingMetadata,
}

/// Releases an unreported permit on drop, so a cancelled probe never
/// leaves the breaker's gate closed.
struct PermitGuard {
    breaker: Arc<dyn CircuitBreaker>,
    permit: Option<Permit>,
}

impl PermitGuard {
    fn new(breaker: Arc<dyn CircuitBreaker>, permit: Permit) -> Self {
        Self {
            breaker,
            permit: Some(permit),
        }
    }

    fn success(mut self) {
        if let Some(permit) = self.permit.take() {
            self.breaker.record_success(permit);
        }
    }

    fn failure(mut self) {
        if let Some(permit) = self.permit.take() {
            self.breaker.record_failure(permit);
        }
    }
}

impl Drop for PermitGuard {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.breaker.release(permit);
        }
    }
}

/// Errors caused by the request rather than the provider's health.
fn is_request_fault(err: &ProviderError) -> bool {
    matches!(
        err,
        ProviderError::InvalidRequest(_)
            | ProviderError::ContextTooLong { .. }
            | ProviderError::ContentFiltered { .. }
    )
}

pub struct ProviderRouter {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    catalog: Arc<Catalog>,
    breakers: Arc<dyn CircuitBreakerFactory>,
    retry: RetryPolicy,
}

impl ProviderRouter {
    pub fn new(catalog: Arc<Catalog>, breakers: Arc<dyn CircuitBreakerFactory>) -> Self {
        Self {
            adapters: HashMap::new(),
            catalog,
            breakers,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Registers an adapter under its descriptor's name.
    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        let name = adapter.descriptor().name;
        self.adapters.insert(name, adapter);
        self
    }

    /// Descriptors of every registered adapter, sorted by fallback priority.
    pub fn providers(&self) -> Vec<ProviderDescriptor> {
        let mut all: Vec<_> = self.adapters.values().map(|a| a.descriptor()).collect();
        all.sort_by(|a, b| {
            a.fallback_priority
                .cmp(&b.fallback_priority)
                .then_with(|| a.name.cmp(&b.name))
        });
        all
    }

    /// Breaker snapshots for every provider called so far.
    pub fn circuit_states(&self) -> Vec<(String, CircuitSnapshot)> {
        self.breakers.snapshots()
    }

    fn enabled_adapter(&self, provider: &str) -> Option<&Arc<dyn ProviderAdapter>> {
        self.adapters
            .get(provider)
            .filter(|adapter| adapter.descriptor().enabled)
    }

    /// Ordered candidates for `model`: the primary first, then one entry per
    /// distinct fallback provider.
    ///
    /// Fallbacks come from the plan's downgrade chain (models the plan
    /// allows), then from `hints.fallback_providers`. Without a plan, the
    /// remaining enabled providers are used in fallback-priority order.
    pub fn fallback_chain(
        &self,
        model: &str,
        hints: &RouteHints,
    ) -> Result<Vec<RouteCandidate>, RoutingError> {
        let primary = self
            .catalog
            .provider_for_model(model)
            .ok_or_else(|| RoutingError::UnknownModel {
                model: model.to_string(),
            })?;

        let mut chain = vec![RouteCandidate {
            provider: primary.to_string(),
            model: model.to_string(),
        }];
        let push = |chain: &mut Vec<RouteCandidate>, provider: &str, model: &str| {
            if chain.iter().any(|c| c.provider == provider)
                || self.enabled_adapter(provider).is_none()
            {
                return;
            }
            chain.push(RouteCandidate {
                provider: provider.to_string(),
                model: model.to_string(),
            });
        };

        match &hints.plan {
            Some(plan) => {
                for fallback_model in plan.downgrade_chain.iter().filter(|m| plan.allows_model(m)) {
                    if let Some(provider) = self.catalog.provider_for_model(fallback_model) {
                        push(&mut chain, provider, fallback_model);
                    }
                }
            }
            None => {
                for descriptor in self.providers() {
                    if let Some(default_model) = descriptor.default_model() {
                        push(&mut chain, &descriptor.name, default_model);
                    }
                }
            }
        }

        for provider in &hints.fallback_providers {
            let default_model = self
                .adapters
                .get(provider)
                .and_then(|a| a.descriptor().default_model().map(str::to_string));
            if let Some(default_model) = default_model {
                push(&mut chain, provider, &default_model);
            }
        }

        Ok(chain)
    }

    /// Routes `request` to the first provider in its chain that answers.
    #[tracing::instrument(skip_all, fields(model = %request.model, trace_id = %request.metadata.trace_id))]
    pub async fn call(
        &self,
        request: ProviderRequest,
        hints: RouteHints,
    ) -> Result<RoutedResponse, RoutingError> {
        let started = Instant::now();
        let chain = self.fallback_chain(&request.model, &hints)?;
        let primary_provider = chain[0].provider.clone();
        let mut attempts: Vec<ProviderAttempt> = Vec::with_capacity(chain.len());

        for (position, candidate) in chain.iter().enumerate() {
            if hints.cancellation.is_cancelled() {
                return Err(RoutingError::Cancelled);
            }
            if position > 0 {
                tracing::warn!(
                    from = %chain[position - 1].provider,
                    to = %candidate.provider,
                    reason = attempts.last().and_then(|a| a.failure_reason()).unwrap_or_default(),
                    "falling back to next provider"
                );
            }

            let Some(adapter) = self.enabled_adapter(&candidate.provider) else {
                attempts.push(ProviderAttempt {
                    provider: candidate.provider.clone(),
                    model: candidate.model.clone(),
                    tries: 0,
                    outcome: AttemptOutcome::Unavailable,
                });
                continue;
            };

            let breaker = self.breakers.breaker_for(&candidate.provider);
            let permit = match breaker.try_acquire() {
                Ok(permit) => permit,
                Err(rejected) => {
                    tracing::debug!(provider = %candidate.provider, "circuit open, skipping provider");
                    attempts.push(ProviderAttempt {
                        provider: candidate.provider.clone(),
                        model: candidate.model.clone(),
                        tries: 0,
                        outcome: AttemptOutcome::CircuitOpen {
                            retry_after_ms: rejected.retry_after.as_millis() as u64,
                        },
                    });
                    continue;
                }
            };
            let guard = PermitGuard::new(breaker, permit);

            let attempt_request = request.for_model(&candidate.model);
            let (result, tries) = self
                .retry
                .run(&hints.cancellation, || adapter.call(attempt_request.clone()))
                .await;

            match result {
                Ok(response) => {
                    guard.success();
                    attempts.push(ProviderAttempt {
                        provider: candidate.provider.clone(),
                        model: candidate.model.clone(),
                        tries,
                        outcome: AttemptOutcome::Served,
                    });
                    let cost_micros = adapter.descriptor().costs.cost_micros(&response.usage);
                    let metadata = RoutingMetadata {
                        served_by: candidate.provider.clone(),
                        model: response.model,
                        fallback_used: position > 0,
                        primary_failure_reason: if position > 0 {
                            attempts.first().and_then(|a| a.failure_reason())
                        } else {
                            None
                        },
                        primary_provider,
                        usage: response.usage,
                        cost_micros,
                        latency_ms: started.elapsed().as_millis() as u64,
                        attempts,
                    };
                    tracing::debug!(
                        served_by = %metadata.served_by,
                        fallback_used = metadata.fallback_used,
                        cost_micros,
                        "provider call routed"
                    );
                    return Ok(RoutedResponse {
                        content: response.content,
                        finish_reason: response.finish_reason,
                        metadata,
                    });
                }
                Err(ProviderError::Cancelled) => {
                    drop(guard);
                    return Err(RoutingError::Cancelled);
                }
                Err(err) => {
                    if is_request_fault(&err) {
                        drop(guard);
                    } else {
                        guard.failure();
                    }
                    attempts.push(ProviderAttempt {
                        provider: candidate.provider.clone(),
                        model: candidate.model.clone(),
                        tries,
                        outcome: AttemptOutcome::Failed {
                            reason: err.to_string(),
                        },
                    });
                }
            }
        }

        tracing::error!(
            attempted = attempts.len(),
            primary = %primary_provider,
            "all providers failed"
        );
        Err(RoutingError::AllProvidersFailed { attempts })
    }
}
