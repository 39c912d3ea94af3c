//! Capability registry - registration, discovery and policy-enforced execution.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use super::history::{CapabilityStats, ExecutionHistory, ExecutionRecord, DEFAULT_HISTORY_SIZE};
use super::schema::validate_parameters;
use super::{
    CapabilityDefinition, CapabilityError, CapabilityExecutionContext, CapabilityExecutionResult,
    CapabilityPatch, RegistryError,
};
use crate::domain::foundation::{CapabilityId, Timestamp};
use crate::ports::{CapabilityRateLimiter, RateLimitDecision, RateLimitKey};

/// Default bound on consecutive fallback hops.
pub const DEFAULT_MAX_FALLBACK_DEPTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Execution records kept per capability.
    pub history_size: usize,
    /// Maximum fallback hops for one execution, across all capabilities.
    pub max_fallback_depth: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            history_size: DEFAULT_HISTORY_SIZE,
            max_fallback_depth: DEFAULT_MAX_FALLBACK_DEPTH,
        }
    }
}

/// Registry of executable capabilities.
///
/// Shared as `Arc<CapabilityRegistry>`; every method takes `&self`.
pub struct CapabilityRegistry {
    definitions: DashMap<String, Arc<CapabilityDefinition>>,
    histories: DashMap<String, Arc<Mutex<ExecutionHistory>>>,
    limiter: Arc<dyn CapabilityRateLimiter>,
    config: RegistryConfig,
}

impl CapabilityRegistry {
    pub fn new(limiter: Arc<dyn CapabilityRateLimiter>) -> Self {
        Self::with_config(limiter, RegistryConfig::default())
    }

    pub fn with_config(limiter: Arc<dyn CapabilityRateLimiter>, config: RegistryConfig) -> Self {
        Self {
            definitions: DashMap::new(),
            histories: DashMap::new(),
            limiter,
            config,
        }
    }

    /// Registers a capability under its unique name.
    pub fn register(&self, def: CapabilityDefinition) -> Result<CapabilityId, RegistryError> {
        def.validate()?;
        match self.definitions.entry(def.name.clone()) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateName { name: def.name }),
            Entry::Vacant(slot) => {
                let id = def.id;
                self.histories.insert(
                    def.name.clone(),
                    Arc::new(Mutex::new(ExecutionHistory::new(self.config.history_size))),
                );
                tracing::info!(capability = %def.name, version = %def.version, "capability registered");
                slot.insert(Arc::new(def));
                Ok(id)
            }
        }
    }

    /// Removes a capability together with its limiter state and history.
    pub async fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        if self.definitions.remove(name).is_none() {
            return Err(RegistryError::NotFound {
                name: name.to_string(),
            });
        }
        self.histories.remove(name);
        self.limiter.reset_capability(name).await;
        tracing::info!(capability = %name, "capability unregistered");
        Ok(())
    }

    /// Applies a partial update. Limiter state is cleared when the rate
    /// limit changes.
    pub async fn update(&self, name: &str, patch: CapabilityPatch) -> Result<(), RegistryError> {
        let current = self.get_by_name(name).ok_or_else(|| RegistryError::NotFound {
            name: name.to_string(),
        })?;
        let mut updated = (*current).clone();
        patch.apply_to(&mut updated);
        updated.validate()?;
        let rate_changed = updated.policy.rate_limit != current.policy.rate_limit;

        match self.definitions.get_mut(name) {
            Some(mut entry) => *entry = Arc::new(updated),
            None => {
                return Err(RegistryError::NotFound {
                    name: name.to_string(),
                })
            }
        }
        if rate_changed {
            self.limiter.reset_capability(name).await;
        }
        tracing::debug!(capability = %name, rate_changed, "capability updated");
        Ok(())
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<CapabilityDefinition>> {
        self.definitions.get(name).map(|e| Arc::clone(e.value()))
    }

    /// Case-insensitive substring search over name, description and tags,
    /// sorted by name. An empty query lists everything.
    pub fn search(&self, query: &str) -> Vec<Arc<CapabilityDefinition>> {
        let needle = query.trim().to_lowercase();
        self.collect_sorted(|def| def.matches(&needle))
    }

    pub fn list_by_category(&self, category: &str) -> Vec<Arc<CapabilityDefinition>> {
        self.collect_sorted(|def| def.category.eq_ignore_ascii_case(category))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.definitions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn stats(&self, name: &str) -> Option<CapabilityStats> {
        let history = self.histories.get(name).map(|e| Arc::clone(e.value()))?;
        let guard = history.lock().unwrap_or_else(PoisonError::into_inner);
        Some(guard.stats())
    }

    /// Runs a capability under its execution policy.
    ///
    /// Only an unknown name is an `Err`; every other failure comes back as an
    /// unsuccessful result, after any permitted fallback has been tried.
    pub async fn execute(
        &self,
        name: &str,
        ctx: CapabilityExecutionContext,
    ) -> Result<CapabilityExecutionResult, CapabilityError> {
        self.execute_hop(name.to_string(), ctx).await
    }

    fn execute_hop(
        &self,
        name: String,
        mut ctx: CapabilityExecutionContext,
    ) -> BoxFuture<'_, Result<CapabilityExecutionResult, CapabilityError>> {
        async move {
            let def = self
                .get_by_name(&name)
                .ok_or_else(|| CapabilityError::NotFound { name: name.clone() })?;
            ctx.capability_id = Some(def.id);

            let started = Instant::now();
            let outcome = self.run_once(&def, &ctx).await;
            let duration_ms = started.elapsed().as_millis() as u64;
            self.record(&name, &outcome, duration_ms, ctx.fallback_chain.len());

            let error = match outcome {
                Ok(output) => {
                    return Ok(CapabilityExecutionResult::succeeded(
                        &name,
                        output,
                        duration_ms,
                        &ctx,
                    ))
                }
                Err(error) => error,
            };

            let Some(fallback) = self.fallback_for(&def, &ctx, &error) else {
                return Ok(CapabilityExecutionResult::failed(&name, error, duration_ms, &ctx));
            };

            tracing::warn!(
                capability = %name,
                fallback = %fallback,
                error = %error,
                "capability failed, trying fallback"
            );
            match self.execute_hop(fallback.clone(), ctx.next_hop(&name)).await {
                Ok(mut result) => {
                    result.fallback_used = result.fallback_used.or(Some(fallback));
                    Ok(result)
                }
                Err(missing) => {
                    tracing::warn!(capability = %name, error = %missing, "fallback capability unavailable");
                    Ok(CapabilityExecutionResult::failed(&name, error, duration_ms, &ctx))
                }
            }
        }
        .boxed()
    }

    async fn run_once(
        &self,
        def: &CapabilityDefinition,
        ctx: &CapabilityExecutionContext,
    ) -> Result<Value, CapabilityError> {
        let name = def.name.clone();

        validate_parameters(&def.parameter_schema, &ctx.parameters).map_err(|e| {
            CapabilityError::InvalidParameters {
                name: name.clone(),
                field: e.field().to_string(),
                message: e.to_string(),
            }
        })?;

        let key = RateLimitKey::new(&def.name, ctx.caller_id.as_ref());
        if let RateLimitDecision::Denied {
            retry_after_secs, ..
        } = self.limiter.check(&key, &def.policy.rate_limit).await
        {
            tracing::warn!(capability = %name, caller = %key.caller, retry_after_secs, "capability rate limited");
            return Err(CapabilityError::RateLimited {
                name,
                retry_after_secs,
            });
        }

        if def.policy.requires_auth && !ctx.authenticated {
            tracing::warn!(capability = %name, "unauthenticated capability call rejected");
            return Err(CapabilityError::Unauthorized { name });
        }

        let timeout_ms = def.policy.timeout_ms;
        let call = def.handler.call(ctx.parameters.clone(), ctx);
        tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => Err(CapabilityError::Cancelled { name }),
            res = tokio::time::timeout(Duration::from_millis(timeout_ms), call) => match res {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(e)) => Err(CapabilityError::HandlerFailed { name, message: e.message }),
                Err(_) => Err(CapabilityError::TimedOut { name, timeout_ms }),
            },
        }
    }

    fn fallback_for(
        &self,
        def: &CapabilityDefinition,
        ctx: &CapabilityExecutionContext,
        error: &CapabilityError,
    ) -> Option<String> {
        if error.is_terminal() {
            return None;
        }
        let fallback = def.policy.fallback_capability.as_ref()?;
        if ctx.retry_count >= def.policy.max_retries
            || ctx.fallback_chain.len() >= self.config.max_fallback_depth
            || ctx.fallback_chain.iter().any(|n| n == fallback)
        {
            return None;
        }
        Some(fallback.clone())
    }

    fn record(
        &self,
        name: &str,
        outcome: &Result<Value, CapabilityError>,
        duration_ms: u64,
        fallback_depth: usize,
    ) {
        let Some(history) = self.histories.get(name).map(|e| Arc::clone(e.value())) else {
            return;
        };
        let mut guard = history.lock().unwrap_or_else(PoisonError::into_inner);
        guard.push(ExecutionRecord {
            succeeded: outcome.is_ok(),
            duration_ms,
            error_kind: outcome.as_ref().err().map(CapabilityError::kind),
            fallback_depth,
            at: Timestamp::now(),
        });
    }

    fn collect_sorted(
        &self,
        keep: impl Fn(&CapabilityDefinition) -> bool,
    ) -> Vec<Arc<CapabilityDefinition>> {
        let mut found: Vec<Arc<CapabilityDefinition>> = self
            .definitions
            .iter()
            .filter(|e| keep(e.value()))
            .map(|e| Arc::clone(e.value()))
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }
}
