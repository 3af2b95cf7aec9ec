//! Staging cache - TTL-bound scratch state for one in-progress planning session.
//!
//! A session is keyed by (month, user). The record holds the frozen inputs and,
//! per step, the last computed preview and the user's accepted choice. It is
//! disposable: the month ledger stays the source of truth once a session is
//! finalized, reset, or expired.
//!
//! Storage sits behind [`StagingStore`] so the workflow never checks whether a
//! backend is configured: [`NoopStagingStore`] stands in when it is not.

use crate::{
    config::settings::StagingConfig,
    core::{
        dss::{
            BudgetAllocation, BudgetPreview, DebtPreview, DebtStrategy, DssStep, GoalPreview,
            GoalPrioritization, OverviewPreview, StepChoice, StepPreview,
        },
        types::InputSnapshot,
    },
    errors::{Error, Result},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;
use tracing::{debug, info, trace, warn};

/// Key-value backend with per-entry expiry.
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Returns the live value under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;
    /// Stores `value` under `key` for `ttl`, replacing any previous value.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
    /// Removes `key`; removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Backend used when no cache is configured: reads find nothing, writes vanish.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStagingStore;

#[async_trait]
impl StagingStore for NoopStagingStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        trace!("No staging backend configured, miss for {}", key);
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}

/// In-process backend.
#[derive(Debug, Default)]
pub struct MemoryStagingStore {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryStagingStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    /// Whether the store holds no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl StagingStore for MemoryStagingStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(key.to_string(), (value, now + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Preview and accepted value of one decision step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSlot<P, A> {
    /// Last computed preview
    pub preview: Option<P>,
    /// Value the user confirmed
    pub accepted: Option<A>,
}

impl<P, A> Default for StepSlot<P, A> {
    fn default() -> Self {
        Self {
            preview: None,
            accepted: None,
        }
    }
}

impl<P, A> StepSlot<P, A> {
    fn clear(&mut self, preview: bool, accepted: bool) {
        if preview {
            self.preview = None;
        }
        if accepted {
            self.accepted = None;
        }
    }
}

/// Scratch state of one planning session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingRecord {
    /// Month being planned
    pub month_id: i64,
    /// Owner of the session
    pub user_id: String,
    /// Inputs frozen at initialization
    pub inputs: InputSnapshot,
    /// When the session was initialized
    pub created_at: DateTime<Utc>,
    /// When the record was last saved
    pub updated_at: DateTime<Utc>,
    /// Step 0 preview
    pub overview: Option<OverviewPreview>,
    /// Step 1
    pub goals: StepSlot<GoalPreview, GoalPrioritization>,
    /// Step 2
    pub debts: StepSlot<DebtPreview, DebtStrategy>,
    /// Step 3
    pub budget: StepSlot<BudgetPreview, BudgetAllocation>,
}

impl StagingRecord {
    /// A fresh record with no previews or choices.
    #[must_use]
    pub fn new(month_id: i64, user_id: &str, inputs: InputSnapshot) -> Self {
        let now = Utc::now();
        Self {
            month_id,
            user_id: user_id.to_string(),
            inputs,
            created_at: now,
            updated_at: now,
            overview: None,
            goals: StepSlot::default(),
            debts: StepSlot::default(),
            budget: StepSlot::default(),
        }
    }

    /// Stores `preview` in its step's slot.
    pub fn store_preview(&mut self, preview: StepPreview) {
        match preview {
            StepPreview::Overview(p) => self.overview = Some(p),
            StepPreview::GoalPrioritization(p) => self.goals.preview = Some(p),
            StepPreview::DebtStrategy(p) => self.debts.preview = Some(p),
            StepPreview::BudgetAllocation(p) => self.budget.preview = Some(p),
        }
    }

    /// Stores `choice` as its step's accepted value.
    pub fn accept(&mut self, choice: StepChoice) {
        match choice {
            StepChoice::GoalPrioritization(c) => self.goals.accepted = Some(c),
            StepChoice::DebtStrategy(c) => self.debts.accepted = Some(c),
            StepChoice::BudgetAllocation(c) => self.budget.accepted = Some(c),
        }
    }

    /// Whether `step` has a stored preview.
    #[must_use]
    pub fn has_preview(&self, step: DssStep) -> bool {
        match step {
            DssStep::Overview => self.overview.is_some(),
            DssStep::GoalPrioritization => self.goals.preview.is_some(),
            DssStep::DebtStrategy => self.debts.preview.is_some(),
            DssStep::BudgetAllocation => self.budget.preview.is_some(),
        }
    }

    /// Whether `step` has an accepted value. The overview never does.
    #[must_use]
    pub fn is_accepted(&self, step: DssStep) -> bool {
        match step {
            DssStep::Overview => false,
            DssStep::GoalPrioritization => self.goals.accepted.is_some(),
            DssStep::DebtStrategy => self.debts.accepted.is_some(),
            DssStep::BudgetAllocation => self.budget.accepted.is_some(),
        }
    }

    /// Whether every decision step has an accepted value.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        DssStep::ALL
            .into_iter()
            .filter(|s| s.is_decision())
            .all(|s| self.is_accepted(s))
    }

    fn clear_step(&mut self, step: DssStep, preview: bool, accepted: bool) {
        match step {
            DssStep::Overview => {
                if preview {
                    self.overview = None;
                }
            }
            DssStep::GoalPrioritization => self.goals.clear(preview, accepted),
            DssStep::DebtStrategy => self.debts.clear(preview, accepted),
            DssStep::BudgetAllocation => self.budget.clear(preview, accepted),
        }
    }

    /// Invalidation before recomputing the preview of `step`: previews of
    /// `step` and later, acceptances of later steps. The step's own acceptance
    /// stays until it is applied again.
    pub fn invalidate_for_preview(&mut self, step: DssStep) {
        for s in DssStep::ALL.into_iter().filter(|s| *s >= step) {
            self.clear_step(s, true, s > step);
        }
    }

    /// Invalidation after applying `step`: previews and acceptances of later steps.
    pub fn invalidate_after(&mut self, step: DssStep) {
        for s in DssStep::ALL.into_iter().filter(|s| *s > step) {
            self.clear_step(s, true, true);
        }
    }
}

/// Typed access to the staging store for planning sessions.
#[derive(Clone)]
pub struct StagingCache {
    store: Arc<dyn StagingStore>,
    config: StagingConfig,
}

impl StagingCache {
    /// Wraps `store` with the given key prefix and TTL.
    #[must_use]
    pub fn new(store: Arc<dyn StagingStore>, config: StagingConfig) -> Self {
        Self { store, config }
    }

    /// In-memory store when enabled, no-op store otherwise.
    #[must_use]
    pub fn from_config(config: StagingConfig) -> Self {
        let store: Arc<dyn StagingStore> = if config.enabled {
            Arc::new(MemoryStagingStore::new())
        } else {
            info!("Staging cache disabled; planning sessions will not persist between steps.");
            Arc::new(NoopStagingStore)
        };
        Self::new(store, config)
    }

    /// Cache key of a session.
    #[must_use]
    pub fn key(&self, month_id: i64, user_id: &str) -> String {
        format!("{}:{}:{}", self.config.key_prefix, month_id, user_id)
    }

    /// Starts a new session, discarding any previous one for the same key.
    pub async fn initialize(
        &self,
        month_id: i64,
        user_id: &str,
        inputs: InputSnapshot,
    ) -> Result<StagingRecord> {
        self.clear(month_id, user_id).await?;
        let mut record = StagingRecord::new(month_id, user_id, inputs);
        self.save(&mut record).await?;
        info!("Initialized planning session {}", self.key(month_id, user_id));
        Ok(record)
    }

    /// Loads a session or fails with `NotInitialized`.
    pub async fn get_or_fail(&self, month_id: i64, user_id: &str) -> Result<StagingRecord> {
        let key = self.key(month_id, user_id);
        let not_initialized = || Error::NotInitialized {
            month_id,
            user_id: user_id.to_string(),
        };

        let Some(raw) = self.store.get(&key).await? else {
            debug!("Staging miss for {}", key);
            return Err(not_initialized());
        };
        serde_json::from_str(&raw).map_err(|e| {
            warn!("Discarding unreadable staging record {}: {}", key, e);
            not_initialized()
        })
    }

    /// Writes `record`, refreshing its TTL.
    pub async fn save(&self, record: &mut StagingRecord) -> Result<()> {
        record.updated_at = Utc::now();
        let key = self.key(record.month_id, &record.user_id);
        let raw = serde_json::to_string(record)?;
        self.store.set(&key, raw, self.config.ttl()).await?;
        trace!("Saved staging record {}", key);
        Ok(())
    }

    /// Deletes a session.
    pub async fn clear(&self, month_id: i64, user_id: &str) -> Result<()> {
        let key = self.key(month_id, user_id);
        self.store.delete(&key).await?;
        debug!("Cleared staging record {}", key);
        Ok(())
    }

    /// When a record saved now would expire.
    #[must_use]
    pub fn expires_at(&self, saved_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        chrono::Duration::from_std(self.config.ttl())
            .ok()
            .and_then(|ttl| saved_at.checked_add_signed(ttl))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::dss::{CriteriaWeights, RankedGoal};
    use crate::test_utils::sample_inputs;
    use std::collections::BTreeMap;

    fn cache_with_ttl(ttl_secs: u64) -> StagingCache {
        StagingCache::new(
            Arc::new(MemoryStagingStore::new()),
            StagingConfig {
                ttl_secs,
                ..StagingConfig::default()
            },
        )
    }

    fn ranking(goal: &str) -> GoalPrioritization {
        GoalPrioritization {
            ranked: vec![RankedGoal {
                goal_id: goal.to_string(),
                name: goal.to_string(),
                rank: 1,
                weight: 1.0,
            }],
            consistency_ratio: 0.0,
            is_consistent: true,
        }
    }

    fn strategy() -> DebtStrategy {
        DebtStrategy {
            strategy: crate::core::dss::PayoffStrategy::Avalanche,
            total_debt_budget: 0.0,
            payments: Vec::new(),
            extra_weights: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_get_before_initialize_fails() {
        let cache = cache_with_ttl(60);
        let result = cache.get_or_fail(1, "u").await;
        assert!(matches!(result, Err(Error::NotInitialized { month_id: 1, .. })));
    }

    #[tokio::test]
    async fn test_initialize_replaces_previous_session() -> Result<()> {
        let cache = cache_with_ttl(60);
        let mut record = cache.initialize(1, "u", sample_inputs()).await?;
        record.accept(StepChoice::GoalPrioritization(ranking("g1")));
        cache.save(&mut record).await?;

        cache.initialize(1, "u", sample_inputs()).await?;
        let fresh = cache.get_or_fail(1, "u").await?;
        assert!(!fresh.is_accepted(DssStep::GoalPrioritization));
        Ok(())
    }

    #[tokio::test]
    async fn test_sessions_are_isolated_by_key() -> Result<()> {
        let cache = cache_with_ttl(60);
        cache.initialize(1, "alice", sample_inputs()).await?;
        assert!(cache.get_or_fail(1, "bob").await.is_err());
        assert!(cache.get_or_fail(2, "alice").await.is_err());
        assert!(cache.get_or_fail(1, "alice").await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_record_is_not_initialized() -> Result<()> {
        let cache = cache_with_ttl(0);
        cache.initialize(1, "u", sample_inputs()).await?;
        let result = cache.get_or_fail(1, "u").await;
        assert!(matches!(result, Err(Error::NotInitialized { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_removes_record() -> Result<()> {
        let cache = cache_with_ttl(60);
        cache.initialize(1, "u", sample_inputs()).await?;
        cache.clear(1, "u").await?;
        assert!(cache.get_or_fail(1, "u").await.is_err());
        // Clearing twice is fine
        cache.clear(1, "u").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_noop_store_degrades_silently() -> Result<()> {
        let cache = StagingCache::from_config(StagingConfig {
            enabled: false,
            ..StagingConfig::default()
        });
        let mut record = cache.initialize(1, "u", sample_inputs()).await?;
        cache.save(&mut record).await?;
        cache.clear(1, "u").await?;
        assert!(matches!(
            cache.get_or_fail(1, "u").await,
            Err(Error::NotInitialized { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_garbage_record_reads_as_not_initialized() -> Result<()> {
        let store = Arc::new(MemoryStagingStore::new());
        let cache = StagingCache::new(
            Arc::clone(&store) as Arc<dyn StagingStore>,
            StagingConfig::default(),
        );
        store
            .set(&cache.key(1, "u"), "not json".to_string(), Duration::from_secs(60))
            .await?;
        assert!(matches!(
            cache.get_or_fail(1, "u").await,
            Err(Error::NotInitialized { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_key_uses_configured_prefix() {
        let cache = StagingCache::from_config(StagingConfig {
            key_prefix: "planner".to_string(),
            ..StagingConfig::default()
        });
        assert_eq!(cache.key(7, "alice"), "planner:7:alice");
    }

    #[test]
    fn test_preview_invalidation_keeps_own_acceptance() {
        let mut record = StagingRecord::new(1, "u", sample_inputs());
        record.accept(StepChoice::GoalPrioritization(ranking("g1")));
        record.accept(StepChoice::DebtStrategy(strategy()));
        record.store_preview(StepPreview::GoalPrioritization(GoalPreview {
            criteria: CriteriaWeights::default(),
            ranking: ranking("g1"),
        }));

        record.invalidate_for_preview(DssStep::GoalPrioritization);
        assert!(!record.has_preview(DssStep::GoalPrioritization));
        assert!(record.is_accepted(DssStep::GoalPrioritization));
        assert!(!record.is_accepted(DssStep::DebtStrategy));
    }

    #[test]
    fn test_apply_invalidation_keeps_step_and_earlier() {
        let mut record = StagingRecord::new(1, "u", sample_inputs());
        record.accept(StepChoice::GoalPrioritization(ranking("g1")));
        record.accept(StepChoice::DebtStrategy(strategy()));
        record.store_preview(StepPreview::GoalPrioritization(GoalPreview {
            criteria: CriteriaWeights::default(),
            ranking: ranking("g1"),
        }));

        record.invalidate_after(DssStep::GoalPrioritization);
        assert!(record.has_preview(DssStep::GoalPrioritization));
        assert!(record.is_accepted(DssStep::GoalPrioritization));
        assert!(!record.is_accepted(DssStep::DebtStrategy));
        assert!(!record.is_complete());
    }

    #[tokio::test]
    async fn test_memory_store_purges_expired_on_write() -> Result<()> {
        let store = MemoryStagingStore::new();
        store.set("a", "1".to_string(), Duration::ZERO).await?;
        store.set("b", "2".to_string(), Duration::from_secs(60)).await?;
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("a").await?, None);
        assert_eq!(store.get("b").await?.as_deref(), Some("2"));
        Ok(())
    }
}
