//! In-memory sliding-window rate limiter for capability executions.
//!
//! Each `(capability, caller)` key owns a deque of admission instants behind
//! its own mutex; the `DashMap` only guards key lookup, so unrelated keys
//! never contend. Windows left idle for longer than their span are swept
//! every few hundred checks. Not shared across processes.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::domain::capability::RateLimitPolicy;
use crate::ports::{
    CapabilityRateLimiter, DenialReason, RateLimitDecision, RateLimitKey, RateLimitStatus,
};

/// Default burst interval.
pub const DEFAULT_BURST_INTERVAL: Duration = Duration::from_secs(1);

/// Checks between sweeps of idle windows.
const SWEEP_EVERY: u64 = 256;

#[derive(Debug, Default)]
struct WindowState {
    admitted: VecDeque<Instant>,
    /// How long an admission stays relevant: the longer of the policy window
    /// and the burst interval.
    span: Duration,
}

type Window = Arc<Mutex<WindowState>>;

#[derive(Debug)]
pub struct SlidingWindowRateLimiter {
    burst_interval: Duration,
    windows: DashMap<RateLimitKey, Window>,
    checks: AtomicU64,
}

impl Default for SlidingWindowRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_BURST_INTERVAL)
    }
}

impl SlidingWindowRateLimiter {
    pub fn new(burst_interval: Duration) -> Self {
        Self {
            burst_interval,
            windows: DashMap::new(),
            checks: AtomicU64::new(0),
        }
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Drops every window whose admissions have all aged out.
    ///
    /// A window some caller is holding is skipped, so an admission is never
    /// recorded into a window that has already left the map.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.windows.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            let mut state = slot.lock().unwrap_or_else(PoisonError::into_inner);
            let span = state.span;
            Self::prune(&mut state.admitted, now, span);
            !state.admitted.is_empty()
        });
    }

    fn window(&self, key: &RateLimitKey) -> Window {
        Arc::clone(self.windows.entry(key.clone()).or_default().value())
    }

    fn prune(entries: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while entries
            .front()
            .is_some_and(|oldest| now.duration_since(*oldest) >= window)
        {
            entries.pop_front();
        }
    }

    fn ceil_secs(d: Duration) -> u64 {
        let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
        secs.max(1)
    }

    fn decide(&self, state: &mut WindowState, policy: &RateLimitPolicy) -> RateLimitDecision {
        let window = Duration::from_secs(policy.window_secs);
        state.span = window.max(self.burst_interval);
        let now = Instant::now();
        let entries = &mut state.admitted;
        Self::prune(entries, now, window);

        if entries.len() >= policy.requests_per_window as usize {
            let oldest = entries.front().copied().unwrap_or(now);
            return RateLimitDecision::Denied {
                retry_after_secs: Self::ceil_secs(window.saturating_sub(now.duration_since(oldest))),
                reason: DenialReason::Window,
            };
        }

        let in_burst: Vec<Instant> = entries
            .iter()
            .rev()
            .take_while(|t| now.duration_since(**t) < self.burst_interval)
            .copied()
            .collect();
        if in_burst.len() >= policy.burst_limit as usize {
            let oldest = in_burst.last().copied().unwrap_or(now);
            return RateLimitDecision::Denied {
                retry_after_secs: Self::ceil_secs(
                    self.burst_interval.saturating_sub(now.duration_since(oldest)),
                ),
                reason: DenialReason::Burst,
            };
        }

        entries.push_back(now);
        RateLimitDecision::Allowed {
            remaining: policy
                .requests_per_window
                .saturating_sub(entries.len() as u32),
        }
    }
}

#[async_trait]
impl CapabilityRateLimiter for SlidingWindowRateLimiter {
    async fn check(&self, key: &RateLimitKey, policy: &RateLimitPolicy) -> RateLimitDecision {
        let decision = {
            let slot = self.window(key);
            let mut state = slot.lock().unwrap_or_else(PoisonError::into_inner);
            self.decide(&mut state, policy)
        };
        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep();
        }
        decision
    }

    async fn status(&self, key: &RateLimitKey, policy: &RateLimitPolicy) -> RateLimitStatus {
        let window = Duration::from_secs(policy.window_secs);
        let slot = self.windows.get(key).map(|e| Arc::clone(e.value()));
        let used = match slot {
            Some(slot) => {
                let used = {
                    let mut state = slot.lock().unwrap_or_else(PoisonError::into_inner);
                    Self::prune(&mut state.admitted, Instant::now(), window);
                    state.admitted.len()
                };
                drop(slot);
                if used == 0 {
                    self.windows.remove_if(key, |_, slot| {
                        Arc::strong_count(slot) == 1
                            && slot
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .admitted
                                .is_empty()
                    });
                }
                used as u32
            }
            None => 0,
        };
        RateLimitStatus {
            limit: policy.requests_per_window,
            used,
            window_secs: policy.window_secs,
        }
    }

    async fn reset(&self, key: &RateLimitKey) {
        self.windows.remove(key);
    }

    async fn reset_capability(&self, capability: &str) {
        self.windows.retain(|k, _| k.capability != capability);
    }
}
