//! In-memory profile store.
//!
//! Usage counters are keyed by caller and stamped with the UTC day they
//! belong to; a read or increment on a later day starts from zero.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::ports::{CallerProfile, ProfileStore, UsageDelta, UsageSnapshot};

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

#[derive(Clone)]
pub struct InMemoryProfileStore {
    profiles: Arc<RwLock<HashMap<UserId, CallerProfile>>>,
    usage: Arc<RwLock<HashMap<UserId, UsageSnapshot>>>,
    today: Clock,
}

impl Default for InMemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryProfileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryProfileStore").finish_non_exhaustive()
    }
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self {
            profiles: Arc::new(RwLock::new(HashMap::new())),
            usage: Arc::new(RwLock::new(HashMap::new())),
            today: Arc::new(|| Timestamp::now().utc_day()),
        }
    }

    /// Replaces the day source; used to exercise the midnight rollover.
    pub fn with_clock(mut self, today: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.today = Arc::new(today);
        self
    }

    /// Seeds profiles, e.g. from configuration.
    pub fn with_profiles(self, profiles: impl IntoIterator<Item = CallerProfile>) -> Self {
        if let Ok(mut map) = self.profiles.try_write() {
            for profile in profiles {
                map.insert(profile.caller_id.clone(), profile);
            }
        }
        self
    }

    pub async fn upsert_profile(&self, profile: CallerProfile) {
        self.profiles
            .write()
            .await
            .insert(profile.caller_id.clone(), profile);
    }

    /// Overwrites a caller's counters.
    pub async fn set_usage(&self, caller_id: &UserId, usage: UsageSnapshot) {
        self.usage.write().await.insert(caller_id.clone(), usage);
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get_profile(&self, caller_id: &UserId) -> Result<Option<CallerProfile>, DomainError> {
        Ok(self.profiles.read().await.get(caller_id).cloned())
    }

    async fn get_usage(&self, caller_id: &UserId) -> Result<UsageSnapshot, DomainError> {
        let today = (self.today)();
        let usage = self.usage.read().await;
        Ok(match usage.get(caller_id) {
            Some(snapshot) if snapshot.day == today => *snapshot,
            _ => UsageSnapshot::empty(today),
        })
    }

    async fn increment_usage(
        &self,
        caller_id: &UserId,
        delta: UsageDelta,
    ) -> Result<UsageSnapshot, DomainError> {
        let today = (self.today)();
        let mut usage = self.usage.write().await;
        let entry = usage
            .entry(caller_id.clone())
            .or_insert_with(|| UsageSnapshot::empty(today));
        if entry.day != today {
            *entry = UsageSnapshot::empty(today);
        }
        entry.messages = entry.messages.saturating_add(delta.messages);
        entry.tokens = entry.tokens.saturating_add(delta.tokens);
        entry.cost_micros = entry.cost_micros.saturating_add(delta.cost_micros);
        Ok(*entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn caller(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[tokio::test]
    async fn unknown_caller_has_no_profile_and_zero_usage() {
        let store = InMemoryProfileStore::new();
        assert!(store.get_profile(&caller("ghost")).await.unwrap().is_none());
        let usage = store.get_usage(&caller("ghost")).await.unwrap();
        assert_eq!(usage.messages, 0);
        assert_eq!(usage.cost_micros, 0);
    }

    #[tokio::test]
    async fn seeded_profiles_are_returned() {
        let store = InMemoryProfileStore::new().with_profiles([
            CallerProfile::new(caller("alice"), "pro").with_preferred_persona("engineer"),
        ]);
        let profile = store.get_profile(&caller("alice")).await.unwrap().unwrap();
        assert_eq!(profile.plan, "pro");
        assert_eq!(profile.preferred_persona.as_deref(), Some("engineer"));
    }

    #[tokio::test]
    async fn increments_accumulate_within_a_day() {
        let store = InMemoryProfileStore::new();
        let alice = caller("alice");
        let delta = UsageDelta {
            messages: 1,
            tokens: 120,
            cost_micros: 450,
        };
        store.increment_usage(&alice, delta).await.unwrap();
        let totals = store.increment_usage(&alice, delta).await.unwrap();

        assert_eq!(totals.messages, 2);
        assert_eq!(totals.tokens, 240);
        assert_eq!(totals.cost_micros, 900);
        assert_eq!(store.get_usage(&alice).await.unwrap(), totals);
    }

    #[tokio::test]
    async fn counters_reset_on_a_new_day() {
        let day = Arc::new(AtomicU32::new(1));
        let clock_day = Arc::clone(&day);
        let store = InMemoryProfileStore::new().with_clock(move || {
            NaiveDate::from_ymd_opt(2026, 3, clock_day.load(Ordering::SeqCst)).unwrap()
        });
        let alice = caller("alice");
        let delta = UsageDelta {
            messages: 3,
            tokens: 10,
            cost_micros: 5,
        };
        store.increment_usage(&alice, delta).await.unwrap();

        day.store(2, Ordering::SeqCst);
        assert_eq!(store.get_usage(&alice).await.unwrap().messages, 0);

        let totals = store.increment_usage(&alice, delta).await.unwrap();
        assert_eq!(totals.messages, 3);
        assert_eq!(totals.day, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
    }
}
