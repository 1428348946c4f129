//! Validation engine.
//!
//! Turns an external observation into committed state: find or create the
//! item for the observed triple, append the evidence, recompute confidence
//! and apply whichever tier decision follows. All of it happens inside one
//! per-item mutation, so readers never see evidence without its tier effect.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::confidence::ConfidenceModel;
use crate::error::{ChaetraError, ChaetraResult, ErrorCode};
use crate::memory::{apply_transition, MemoryStore, TransitionRules};
use crate::types::{Evidence, ItemId, KnowledgeItem, Observation, Polarity, Tier};
use crate::unlearning::{ContradictionOutcome, ContradictionPolicy};

/// An upsert can race with a concurrent removal of the same triple. Each
/// retry resolves to a fresh item, so a handful of attempts is plenty.
const MAX_UPSERT_ATTEMPTS: usize = 3;

/// Result of ingesting one piece of evidence.
#[derive(Debug, Clone)]
pub struct ObserveOutcome {
    pub item_id: ItemId,
    /// Whether the observation created the item.
    pub created: bool,
    /// Tier before the evidence was applied.
    pub previous_tier: Tier,
    /// Committed state after the evidence.
    pub item: KnowledgeItem,
    /// Set when the evidence was contradicting.
    pub contradiction: Option<ContradictionOutcome>,
}

impl ObserveOutcome {
    /// Whether the evidence moved the item to another tier.
    pub fn tier_changed(&self) -> bool {
        self.previous_tier != self.item.tier
    }
}

/// Evidence ingestion orchestrator.
pub struct ValidationEngine {
    store: Arc<MemoryStore>,
    model: ConfidenceModel,
    rules: TransitionRules,
    policy: ContradictionPolicy,
}

impl ValidationEngine {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        let config = store.config();
        let rules = TransitionRules::from_config(config);
        let policy = ContradictionPolicy::from_config(config);
        let model = store.model();
        Self {
            store,
            model,
            rules,
            policy,
        }
    }

    /// Create-or-append for an observation, stamped now.
    pub async fn observe(&self, observation: Observation) -> ChaetraResult<ObserveOutcome> {
        self.observe_at(observation, Utc::now()).await
    }

    /// Create-or-append for an observation at an explicit time.
    pub async fn observe_at(
        &self,
        observation: Observation,
        now: DateTime<Utc>,
    ) -> ChaetraResult<ObserveOutcome> {
        observation.evidence.validate()?;

        let mut last_err = None;
        for attempt in 1..=MAX_UPSERT_ATTEMPTS {
            let upsert = self.store.upsert(&observation, now);
            match self
                .apply(upsert.id, observation.evidence.clone(), now)
                .await
            {
                Ok((item, previous_tier, contradiction)) => {
                    return Ok(ObserveOutcome {
                        item_id: upsert.id,
                        created: upsert.created,
                        previous_tier,
                        item,
                        contradiction,
                    });
                }
                Err(e) if e.code() == ErrorCode::KnwItemRemoved => {
                    debug!(item_id = %upsert.id, attempt, "Item removed during observe, retrying");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        warn!(topic = %observation.topic, "Observe kept hitting removed items");
        Err(last_err.unwrap_or_else(|| ChaetraError::internal("observe retries exhausted")))
    }

    /// Apply evidence to an existing item.
    pub async fn apply_evidence(
        &self,
        id: ItemId,
        evidence: Evidence,
    ) -> ChaetraResult<ObserveOutcome> {
        evidence.validate()?;
        let (item, previous_tier, contradiction) = self.apply(id, evidence, Utc::now()).await?;
        Ok(ObserveOutcome {
            item_id: id,
            created: false,
            previous_tier,
            item,
            contradiction,
        })
    }

    async fn apply(
        &self,
        id: ItemId,
        evidence: Evidence,
        now: DateTime<Utc>,
    ) -> ChaetraResult<(KnowledgeItem, Tier, Option<ContradictionOutcome>)> {
        let model = self.model;
        let rules = self.rules;
        let policy = self.policy;

        let (item, (previous_tier, contradiction)) = self
            .store
            .mutate(id, move |item| {
                let previous_tier = item.tier;
                let polarity = evidence.polarity;
                let source = evidence.source.clone();
                model.apply_to(item, evidence);
                item.last_updated_at = now;

                let contradiction = match polarity {
                    Polarity::Supporting => {
                        if rules.promotion_ready(item) {
                            apply_transition(item, Tier::Core, now)?;
                        } else if item.tier == Tier::Core
                            && item.under_review
                            && rules.meets_promotion_bar(item)
                        {
                            item.under_review = false;
                        }
                        None
                    }
                    Polarity::Contradicting => Some(policy.resolve(item, &source, now)?),
                };
                Ok((previous_tier, contradiction))
            })
            .await?;

        Ok(((*item).clone(), previous_tier, contradiction))
    }

    /// The rules used for promotion decisions.
    pub fn rules(&self) -> &TransitionRules {
        &self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LearningConfig;
    use crate::types::Statement;

    fn engine() -> (Arc<MemoryStore>, ValidationEngine) {
        let store = Arc::new(MemoryStore::new(Arc::new(LearningConfig::default())).unwrap());
        (store.clone(), ValidationEngine::new(store))
    }

    fn obs(evidence: Evidence) -> Observation {
        Observation::new("momentum", Statement::text("tech leads"), "markets", evidence)
    }

    #[tokio::test]
    async fn test_observe_creates_then_appends() {
        let (store, engine) = engine();
        let first = engine.observe(obs(Evidence::supporting("a"))).await.unwrap();
        let second = engine.observe(obs(Evidence::supporting("b"))).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.item_id, second.item_id);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(first.item_id).unwrap().evidence.len(), 2);
    }

    #[tokio::test]
    async fn test_third_supporting_observation_promotes() {
        let (_, engine) = engine();
        let mut last = None;
        for source in ["a", "b", "c"] {
            last = Some(engine.observe(obs(Evidence::supporting(source))).await.unwrap());
        }
        let last = last.unwrap();
        assert!(last.tier_changed());
        assert_eq!(last.item.tier, Tier::Core);
        assert_eq!(last.item.validation_count, 3);
        assert!((last.item.confidence - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_invalid_evidence_creates_nothing() {
        let (store, engine) = engine();
        let err = engine
            .observe(obs(Evidence::supporting("").with_weight(1.0)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::EvdMissingSource);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_strong_contradiction_unlearns_short_term_item() {
        let (store, engine) = engine();
        let out = engine
            .observe(obs(Evidence::contradicting("a").with_weight(5.0)))
            .await
            .unwrap();
        assert_eq!(out.contradiction, Some(ContradictionOutcome::Unlearned));
        assert_eq!(store.get(out.item_id).unwrap().tier, Tier::Removed);

        let again = engine.observe(obs(Evidence::supporting("b"))).await.unwrap();
        assert!(again.created);
        assert_ne!(again.item_id, out.item_id);
    }

    #[tokio::test]
    async fn test_flagged_core_item_is_cleared_by_recovery() {
        let (_, engine) = engine();
        for source in ["a", "b", "c"] {
            engine.observe(obs(Evidence::supporting(source))).await.unwrap();
        }
        let flagged = engine
            .observe(obs(Evidence::contradicting("d").with_weight(3.0)))
            .await
            .unwrap();
        assert_eq!(flagged.contradiction, Some(ContradictionOutcome::UnderReview));
        assert!(flagged.item.under_review);
        assert_eq!(flagged.item.tier, Tier::Core);

        let recovered = engine
            .observe(obs(Evidence::supporting("e").with_weight(2.0)))
            .await
            .unwrap();
        assert!(!recovered.item.under_review);
        assert_eq!(recovered.item.tier, Tier::Core);
    }

    #[tokio::test]
    async fn test_apply_evidence_to_unknown_item() {
        let (_, engine) = engine();
        let err = engine
            .apply_evidence(ItemId::new(), Evidence::supporting("a"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::KnwItemNotFound);
    }
}
