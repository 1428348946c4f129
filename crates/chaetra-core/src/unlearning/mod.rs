//! Unlearning and relearning.
//!
//! Decides what contradicting evidence does to an item once the confidence
//! model has been applied, and carries the administrative `unlearn` override.
//! Relearning needs no special path: supporting evidence on a flagged or
//! archived item goes through the normal promotion check.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::{debug, info};

use crate::config::LearningConfig;
use crate::error::ChaetraResult;
use crate::memory::{apply_transition, MemoryStore};
use crate::types::{ItemId, KnowledgeItem, KnowledgeQuery, Tier};

/// What a contradiction did to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContradictionOutcome {
    /// Tombstoned.
    Unlearned,
    /// Demoted from `Core` to `Archived`.
    Archived,
    /// Left in place with the review flag raised.
    UnderReview,
    /// Confidence is still at the core bar; flagged, tier unchanged.
    KeptFlagged,
}

/// Thresholds applied after contradicting evidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContradictionPolicy {
    low_threshold: f64,
    archive_threshold: f64,
    core_threshold: f64,
    archive_contradicted_core: bool,
}

impl ContradictionPolicy {
    pub fn from_config(config: &LearningConfig) -> Self {
        Self {
            low_threshold: config.unlearn_threshold(),
            archive_threshold: config.archive_confidence_threshold,
            core_threshold: config.core_confidence_threshold,
            archive_contradicted_core: config.archive_contradicted_core,
        }
    }

    /// Classify an item whose ledger just received contradicting evidence.
    pub fn classify(&self, item: &KnowledgeItem) -> ContradictionOutcome {
        let c = item.confidence;
        match item.tier {
            Tier::ShortTerm if c < self.low_threshold => ContradictionOutcome::Unlearned,
            Tier::Core if c < self.low_threshold && !self.archive_contradicted_core => {
                ContradictionOutcome::Unlearned
            }
            Tier::Core if c < self.low_threshold || c <= self.archive_threshold => {
                ContradictionOutcome::Archived
            }
            Tier::ShortTerm | Tier::Core if c >= self.core_threshold => {
                ContradictionOutcome::KeptFlagged
            }
            _ => ContradictionOutcome::UnderReview,
        }
    }

    /// Classify and apply the resulting transition to a draft item.
    pub fn resolve(
        &self,
        item: &mut KnowledgeItem,
        source: &str,
        now: DateTime<Utc>,
    ) -> ChaetraResult<ContradictionOutcome> {
        let outcome = self.classify(item);
        match outcome {
            ContradictionOutcome::Unlearned => {
                apply_transition(item, Tier::Removed, now)?;
                item.removal_reason = Some(format!(
                    "contradicted by {} (confidence {:.2})",
                    source, item.confidence
                ));
            }
            ContradictionOutcome::Archived => {
                apply_transition(item, Tier::Archived, now)?;
            }
            ContradictionOutcome::UnderReview | ContradictionOutcome::KeptFlagged => {}
        }
        debug!(item_id = %item.id, outcome = %outcome, confidence = item.confidence, "Contradiction resolved");
        Ok(outcome)
    }

    /// Confidence below which contradicted knowledge is dropped.
    pub fn low_threshold(&self) -> f64 {
        self.low_threshold
    }
}

/// Administrative unlearning on top of the memory store.
pub struct UnlearningController {
    store: Arc<MemoryStore>,
    policy: ContradictionPolicy,
}

impl UnlearningController {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        let policy = ContradictionPolicy::from_config(store.config());
        Self { store, policy }
    }

    pub fn policy(&self) -> &ContradictionPolicy {
        &self.policy
    }

    /// Force an item out of memory regardless of its confidence.
    ///
    /// The item is tombstoned, never deleted, so its ledger stays auditable.
    pub async fn unlearn(&self, id: ItemId, reason: impl Into<String>) -> ChaetraResult<()> {
        let reason = reason.into();
        let item = self.store.remove(id, reason.clone()).await?;
        info!(item_id = %id, topic = %item.topic, reason = %reason, "Item unlearned");
        Ok(())
    }

    /// Items awaiting external review.
    pub fn flagged(&self) -> Vec<KnowledgeItem> {
        self.store
            .retrieve(&KnowledgeQuery::new().under_review(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Statement;

    fn item(tier: Tier, confidence: f64) -> KnowledgeItem {
        let mut item = KnowledgeItem::new("t", Statement::text("s"), "d", 0.7, Utc::now());
        item.tier = tier;
        item.confidence = confidence;
        item
    }

    fn policy(archive_core: bool) -> ContradictionPolicy {
        let config = LearningConfig::builder()
            .archive_contradicted_core(archive_core)
            .build()
            .unwrap();
        ContradictionPolicy::from_config(&config)
    }

    #[test]
    fn test_short_term_outcomes() {
        let p = policy(true);
        assert_eq!(p.classify(&item(Tier::ShortTerm, 0.2)), ContradictionOutcome::Unlearned);
        assert_eq!(p.classify(&item(Tier::ShortTerm, 0.5)), ContradictionOutcome::UnderReview);
        assert_eq!(p.classify(&item(Tier::ShortTerm, 0.85)), ContradictionOutcome::KeptFlagged);
    }

    #[test]
    fn test_core_outcomes() {
        let p = policy(true);
        assert_eq!(p.classify(&item(Tier::Core, 0.9)), ContradictionOutcome::KeptFlagged);
        assert_eq!(p.classify(&item(Tier::Core, 0.5)), ContradictionOutcome::UnderReview);
        assert_eq!(p.classify(&item(Tier::Core, 0.3)), ContradictionOutcome::Archived);
        assert_eq!(p.classify(&item(Tier::Core, 0.1)), ContradictionOutcome::Archived);

        let strict = policy(false);
        assert_eq!(strict.classify(&item(Tier::Core, 0.1)), ContradictionOutcome::Unlearned);
        assert_eq!(strict.classify(&item(Tier::Core, 0.3)), ContradictionOutcome::Archived);
    }

    #[test]
    fn test_archived_items_are_only_flagged() {
        let p = policy(true);
        assert_eq!(p.classify(&item(Tier::Archived, 0.05)), ContradictionOutcome::UnderReview);
    }

    #[test]
    fn test_resolve_records_removal_reason() {
        let p = policy(true);
        let mut i = item(Tier::ShortTerm, 0.1);
        let outcome = p.resolve(&mut i, "backtest", Utc::now()).unwrap();
        assert_eq!(outcome, ContradictionOutcome::Unlearned);
        assert_eq!(i.tier, Tier::Removed);
        assert!(i.removal_reason.unwrap().contains("backtest"));
    }

    #[tokio::test]
    async fn test_unlearn_tombstones() {
        let store = Arc::new(MemoryStore::new(Arc::new(LearningConfig::default())).unwrap());
        let id = store.create("t", Statement::text("s"), "d");
        let controller = UnlearningController::new(store.clone());

        controller.unlearn(id, "superseded").await.unwrap();
        let item = store.get(id).unwrap();
        assert_eq!(item.tier, Tier::Removed);
        assert_eq!(item.removal_reason.as_deref(), Some("superseded"));

        assert!(controller.unlearn(id, "again").await.is_err());
    }
}
