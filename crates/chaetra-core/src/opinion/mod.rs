//! Opinion engine.
//!
//! Opinions are computed at query time from the live items of a topic.
//! An opinion holds item ids only and re-resolves them on every formation.
//! Only formations that clear the store threshold are recorded, and a
//! recorded opinion's history is only ever appended to.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::config::OpinionWeights;
use crate::confidence::clamp_unit;
use crate::error::{ChaetraError, ChaetraResult};
use crate::events::{EventBus, KnowledgeEvent};
use crate::memory::MemoryStore;
use crate::types::{CoreBelief, ItemId, KnowledgeItem, Opinion, OpinionFormation, Polarity};

/// Aggregates knowledge items into topic-level opinions.
pub struct OpinionEngine {
    store: Arc<MemoryStore>,
    weights: OpinionWeights,
    min_to_store: f64,
    book: DashMap<String, Opinion>,
    events: Option<EventBus>,
}

struct Aggregate {
    belief: CoreBelief,
    supporting: Vec<ItemId>,
    contradicting: Vec<ItemId>,
}

impl OpinionEngine {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        let config = store.config();
        let weights = config.opinion_weights.clone();
        let min_to_store = config.opinion_min_confidence_to_store;
        Self {
            store,
            weights,
            min_to_store,
            book: DashMap::new(),
            events: None,
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Form an opinion on a topic from its current items.
    pub fn form_opinion(&self, topic: &str) -> ChaetraResult<OpinionFormation> {
        self.form_opinion_at(topic, Utc::now())
    }

    /// Form an opinion with an explicit timestamp for its history entry.
    ///
    /// Below the store threshold the opinion is returned with `stored ==
    /// false`, an empty history, and any previously recorded opinion for the
    /// topic is left as it was.
    pub fn form_opinion_at(&self, topic: &str, now: DateTime<Utc>) -> ChaetraResult<OpinionFormation> {
        let aggregate = self.aggregate(topic)?;
        let confidence = aggregate.belief.confidence;

        if confidence < self.min_to_store {
            debug!(
                topic,
                confidence,
                threshold = self.min_to_store,
                "Opinion below store threshold"
            );
            return Ok(OpinionFormation {
                opinion: Opinion {
                    topic: topic.to_string(),
                    core_belief: aggregate.belief,
                    supporting_items: aggregate.supporting,
                    contradicting_items: aggregate.contradicting,
                    history: Vec::new(),
                    formed_at: now,
                    last_updated: now,
                },
                stored: false,
            });
        }

        let opinion = match self.book.entry(topic.to_string()) {
            Entry::Occupied(mut existing) => {
                let opinion = existing.get_mut();
                opinion.supporting_items = aggregate.supporting;
                opinion.contradicting_items = aggregate.contradicting;
                opinion.adopt(aggregate.belief, now);
                opinion.clone()
            }
            Entry::Vacant(vacant) => {
                let mut opinion = Opinion {
                    topic: topic.to_string(),
                    core_belief: aggregate.belief.clone(),
                    supporting_items: aggregate.supporting,
                    contradicting_items: aggregate.contradicting,
                    history: Vec::new(),
                    formed_at: now,
                    last_updated: now,
                };
                opinion.adopt(aggregate.belief, now);
                vacant.insert(opinion).value().clone()
            }
        };

        info!(
            topic,
            confidence,
            supporting = opinion.supporting_items.len(),
            contradicting = opinion.contradicting_items.len(),
            history = opinion.history.len(),
            "Opinion recorded"
        );
        if let Some(ref bus) = self.events {
            bus.emit(KnowledgeEvent::OpinionRecorded {
                topic: topic.to_string(),
                confidence,
                timestamp: now,
            });
        }

        Ok(OpinionFormation {
            opinion,
            stored: true,
        })
    }

    /// Re-form a recorded opinion from the current items.
    pub fn update_opinion(&self, topic: &str) -> ChaetraResult<OpinionFormation> {
        if !self.book.contains_key(topic) {
            return Err(ChaetraError::opinion_not_found(topic));
        }
        self.form_opinion(topic)
    }

    /// The recorded opinion for a topic.
    pub fn get_opinion(&self, topic: &str) -> ChaetraResult<Opinion> {
        self.book
            .get(topic)
            .map(|o| o.value().clone())
            .ok_or_else(|| ChaetraError::opinion_not_found(topic))
    }

    /// Every recorded opinion, by topic.
    pub fn list_opinions(&self) -> Vec<Opinion> {
        let mut opinions: Vec<Opinion> = self.book.iter().map(|o| o.value().clone()).collect();
        opinions.sort_by(|a, b| a.topic.cmp(&b.topic));
        opinions
    }

    /// Load previously recorded opinions, replacing any with the same topic.
    pub fn restore(&self, opinions: Vec<Opinion>) -> usize {
        let count = opinions.len();
        for opinion in opinions {
            self.book.insert(opinion.topic.clone(), opinion);
        }
        count
    }

    fn aggregate(&self, topic: &str) -> ChaetraResult<Aggregate> {
        let weighted: Vec<(KnowledgeItem, f64)> = self
            .store
            .query_by_topic(topic)
            .into_iter()
            .filter_map(|item| self.weights.multiplier(item.tier).map(|m| (item, m)))
            .collect();

        if weighted.is_empty() {
            return Err(ChaetraError::empty_topic(topic));
        }

        let total_weight: f64 = weighted.iter().map(|(_, m)| m).sum();
        let confidence = if total_weight > 0.0 {
            clamp_unit(weighted.iter().map(|(i, m)| i.confidence * m).sum::<f64>() / total_weight)
        } else {
            0.0
        };

        let (supporting, contradicting): (Vec<_>, Vec<_>) = weighted
            .iter()
            .partition(|(item, _)| item.net_polarity() == Polarity::Supporting);

        let anchor = strongest(supporting.iter().copied())
            .or_else(|| strongest(weighted.iter()))
            .ok_or_else(|| ChaetraError::empty_topic(topic))?;

        Ok(Aggregate {
            belief: CoreBelief {
                statement: anchor.statement.clone(),
                confidence,
            },
            supporting: supporting.iter().map(|(item, _)| item.id).collect(),
            contradicting: contradicting.iter().map(|(item, _)| item.id).collect(),
        })
    }
}

/// Highest weighted confidence; the oldest item wins ties.
fn strongest<'a>(
    items: impl Iterator<Item = &'a (KnowledgeItem, f64)>,
) -> Option<&'a KnowledgeItem> {
    items
        .max_by(|(a, ma), (b, mb)| {
            (a.confidence * ma)
                .total_cmp(&(b.confidence * mb))
                .then(b.created_at.cmp(&a.created_at))
        })
        .map(|(item, _)| item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LearningConfig;
    use crate::types::{Evidence, Statement, Tier};

    fn engine() -> (Arc<MemoryStore>, OpinionEngine) {
        let store = Arc::new(MemoryStore::new(Arc::new(LearningConfig::default())).unwrap());
        (store.clone(), OpinionEngine::new(store))
    }

    fn seeded(tier: Tier, supports: usize, contradicts: usize, statement: &str) -> KnowledgeItem {
        let model = crate::confidence::ConfidenceModel::new(0.1);
        let mut item = KnowledgeItem::new("topic", Statement::text(statement), "d", 0.7, Utc::now());
        for _ in 0..supports {
            model.apply_to(&mut item, Evidence::supporting("s"));
        }
        for _ in 0..contradicts {
            model.apply_to(&mut item, Evidence::contradicting("c"));
        }
        item.tier = tier;
        item
    }

    #[test]
    fn test_empty_topic_is_not_found() {
        let (_, engine) = engine();
        let err = engine.form_opinion("nothing").unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::KnwTopicEmpty);
    }

    #[test]
    fn test_weighted_mean_and_partition() {
        let (store, engine) = engine();
        let core = seeded(Tier::Core, 3, 1, "core view");
        let weak = seeded(Tier::ShortTerm, 0, 3, "weak view");
        let (core_conf, weak_conf) = (core.confidence, weak.confidence);
        store.restore(vec![core.clone(), weak.clone()]).unwrap();

        let formed = engine.form_opinion("topic").unwrap();
        let expected = (core_conf * 1.0 + weak_conf * 0.5) / 1.5;
        assert!((formed.opinion.core_belief.confidence - expected).abs() < 1e-9);
        assert!(formed.stored);
        assert_eq!(formed.opinion.supporting_items, vec![core.id]);
        assert_eq!(formed.opinion.contradicting_items, vec![weak.id]);
        assert_eq!(formed.opinion.core_belief.statement, Statement::text("core view"));
        assert_eq!(formed.opinion.history.len(), 1);
    }

    #[test]
    fn test_below_threshold_is_transient() {
        let (store, engine) = engine();
        store.restore(vec![seeded(Tier::ShortTerm, 0, 2, "s")]).unwrap();

        let formed = engine.form_opinion("topic").unwrap();
        assert!(!formed.stored);
        assert!(formed.opinion.history.is_empty());
        assert!(engine.get_opinion("topic").is_err());
    }

    #[test]
    fn test_transient_formation_leaves_record_alone() {
        let (store, engine) = engine();
        store.restore(vec![seeded(Tier::Core, 3, 0, "strong")]).unwrap();
        assert!(engine.form_opinion("topic").unwrap().stored);

        let doubts = ["d1", "d2", "d3"].map(|s| seeded(Tier::ShortTerm, 0, 7, s));
        store.restore(doubts.to_vec()).unwrap();

        let formed = engine.form_opinion("topic").unwrap();
        assert!(!formed.stored);
        assert!(formed.opinion.history.is_empty());
        assert_eq!(engine.get_opinion("topic").unwrap().history.len(), 1);
    }

    #[test]
    fn test_archived_items_are_excluded() {
        let (store, engine) = engine();
        store.restore(vec![seeded(Tier::Archived, 3, 0, "old")]).unwrap();
        assert!(engine.form_opinion("topic").is_err());
    }

    #[test]
    fn test_history_only_grows() {
        let (store, engine) = engine();
        store.restore(vec![seeded(Tier::Core, 3, 0, "s")]).unwrap();

        assert!(matches!(
            engine.update_opinion("topic"),
            Err(ChaetraError::NotFound { .. })
        ));
        engine.form_opinion("topic").unwrap();
        let updated = engine.update_opinion("topic").unwrap();
        assert_eq!(updated.opinion.history.len(), 2);
        assert_eq!(
            updated.opinion.history.last().map(|h| h.confidence),
            Some(updated.opinion.core_belief.confidence)
        );
        assert_eq!(engine.list_opinions().len(), 1);
    }
}
