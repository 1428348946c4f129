//! Tiered knowledge store.
//!
//! Items live in per-item slots. Readers clone the current `Arc` snapshot
//! without waiting on writers; writers serialize on the slot's async lock
//! (with a bounded wait), mutate a private copy and swap it in only when the
//! whole mutation succeeds. A failed mutation leaves the item untouched.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::transitions::apply_transition;
use crate::config::LearningConfig;
use crate::confidence::ConfidenceModel;
use crate::error::{ChaetraError, ChaetraResult};
use crate::events::{EventBus, KnowledgeEvent};
use crate::types::{
    dedup_key, Evidence, ItemId, KnowledgeItem, KnowledgeQuery, Observation, Statement, Tier,
};

/// One item's storage cell.
struct ItemSlot {
    writer: Mutex<()>,
    current: RwLock<Arc<KnowledgeItem>>,
}

impl ItemSlot {
    fn new(item: KnowledgeItem) -> Self {
        Self {
            writer: Mutex::new(()),
            current: RwLock::new(Arc::new(item)),
        }
    }

    // The cell only ever holds a fully built snapshot, so a poisoned lock
    // still guards a consistent value.
    fn load(&self) -> Arc<KnowledgeItem> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace(&self, item: Arc<KnowledgeItem>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = item;
    }
}

/// Result of creating or looking up an item by its triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upsert {
    pub id: ItemId,
    /// False when a live item with the same triple already existed.
    pub created: bool,
}

/// Concurrent, tiered store of knowledge items.
pub struct MemoryStore {
    config: Arc<LearningConfig>,
    model: ConfidenceModel,
    items: DashMap<ItemId, Arc<ItemSlot>>,
    by_topic: DashMap<String, Vec<ItemId>>,
    /// Dedup index over live items only.
    by_key: DashMap<String, ItemId>,
    events: Option<EventBus>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new(config: Arc<LearningConfig>) -> ChaetraResult<Self> {
        config.validate()?;
        let model = ConfidenceModel::new(config.validation_confidence_boost);
        Ok(Self {
            config,
            model,
            items: DashMap::new(),
            by_topic: DashMap::new(),
            by_key: DashMap::new(),
            events: None,
        })
    }

    /// Emit lifecycle events on the given bus.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// The configuration this store was built with.
    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    /// Shared handle to the configuration.
    pub fn config_arc(&self) -> Arc<LearningConfig> {
        Arc::clone(&self.config)
    }

    /// The confidence model applied by [`MemoryStore::add_evidence`].
    pub fn model(&self) -> ConfidenceModel {
        self.model
    }

    /// Create a short-term item, or return the live item with the same
    /// `(topic, statement, domain)`.
    pub fn create(
        &self,
        topic: impl Into<String>,
        statement: Statement,
        domain: impl Into<String>,
    ) -> ItemId {
        let now = Utc::now();
        let item = KnowledgeItem::new(
            topic,
            statement,
            domain,
            self.config.hypothesis_initial_confidence,
            now,
        );
        self.insert_if_absent(item).id
    }

    /// Create or look up the item an observation refers to.
    ///
    /// Tags and metadata only apply to a newly created item.
    pub fn upsert(&self, observation: &Observation, now: DateTime<Utc>) -> Upsert {
        let item = KnowledgeItem::new(
            observation.topic.clone(),
            observation.statement.clone(),
            observation.domain.clone(),
            self.config.hypothesis_initial_confidence,
            now,
        )
        .with_tags(observation.tags.clone())
        .with_metadata(observation.metadata.clone());
        self.insert_if_absent(item)
    }

    fn insert_if_absent(&self, item: KnowledgeItem) -> Upsert {
        match self.by_key.entry(item.dedup_key()) {
            Entry::Occupied(existing) => Upsert {
                id: *existing.get(),
                created: false,
            },
            Entry::Vacant(vacant) => {
                let id = item.id;
                let topic = item.topic.clone();
                let timestamp = item.created_at;
                self.by_topic.entry(topic.clone()).or_default().push(id);
                self.items.insert(id, Arc::new(ItemSlot::new(item)));
                vacant.insert(id);

                debug!(item_id = %id, topic = %topic, "Created short-term item");
                self.emit(KnowledgeEvent::ItemCreated {
                    item_id: id,
                    topic,
                    timestamp,
                });
                Upsert { id, created: true }
            }
        }
    }

    /// Append evidence to an item and update its confidence.
    ///
    /// Never changes the tier.
    pub async fn add_evidence(&self, id: ItemId, evidence: Evidence) -> ChaetraResult<KnowledgeItem> {
        evidence.validate()?;
        let model = self.model;
        let now = Utc::now();
        let (item, _) = self
            .mutate(id, |item| {
                model.apply_to(item, evidence);
                item.last_updated_at = now;
                Ok(())
            })
            .await?;
        Ok((*item).clone())
    }

    /// Move an item to another tier.
    pub async fn transition_tier(&self, id: ItemId, target: Tier) -> ChaetraResult<KnowledgeItem> {
        let now = Utc::now();
        let (item, _) = self
            .mutate(id, |item| apply_transition(item, target, now).map(|_| ()))
            .await?;
        Ok((*item).clone())
    }

    /// Tombstone an item, recording why.
    pub async fn remove(&self, id: ItemId, reason: impl Into<String>) -> ChaetraResult<KnowledgeItem> {
        let reason = reason.into();
        let now = Utc::now();
        let (item, _) = self
            .mutate(id, |item| {
                apply_transition(item, Tier::Removed, now)?;
                item.removal_reason = Some(reason);
                Ok(())
            })
            .await?;
        Ok((*item).clone())
    }

    /// Apply `f` to a private copy of the item and commit it atomically.
    ///
    /// Waits at most the configured mutation timeout for the item lock.
    /// Tombstoned items are rejected before `f` runs. If `f` fails nothing
    /// is committed.
    pub async fn mutate<F, R>(&self, id: ItemId, f: F) -> ChaetraResult<(Arc<KnowledgeItem>, R)>
    where
        F: FnOnce(&mut KnowledgeItem) -> ChaetraResult<R>,
    {
        let slot = self.slot(id)?;
        let wait = self.config.mutation_timeout();
        let _guard = tokio::time::timeout(wait, slot.writer.lock())
            .await
            .map_err(|_| {
                warn!(item_id = %id, waited_ms = wait.as_millis() as u64, "Item lock wait timed out");
                ChaetraError::mutation_timeout(id.to_string(), wait)
            })?;

        let before = slot.load();
        if !before.is_live() {
            return Err(ChaetraError::removed(id.to_string()));
        }

        let mut draft = (*before).clone();
        let out = f(&mut draft)?;
        let after = Arc::new(draft);
        slot.replace(Arc::clone(&after));

        // Index upkeep happens under the item lock so a concurrent upsert
        // never resolves to a freshly tombstoned item for long.
        if !after.is_live() {
            self.by_key
                .remove_if(&after.dedup_key(), |_, owner| *owner == id);
        }
        self.after_commit(&before, &after);

        Ok((after, out))
    }

    fn after_commit(&self, before: &KnowledgeItem, after: &KnowledgeItem) {
        let timestamp = after.last_updated_at;

        if let Some(evidence) = after.evidence.get(before.evidence.len()..) {
            for e in evidence {
                debug!(
                    item_id = %after.id,
                    polarity = %e.polarity,
                    weight = e.weight,
                    confidence = after.confidence,
                    "Evidence applied"
                );
                self.emit(KnowledgeEvent::EvidenceApplied {
                    item_id: after.id,
                    polarity: e.polarity,
                    confidence: after.confidence,
                    timestamp,
                });
            }
        }

        if !before.under_review && after.under_review {
            info!(item_id = %after.id, confidence = after.confidence, "Item flagged for review");
            self.emit(KnowledgeEvent::FlaggedForReview {
                item_id: after.id,
                confidence: after.confidence,
                timestamp,
            });
        }

        if before.tier != after.tier {
            info!(
                item_id = %after.id,
                topic = %after.topic,
                from = %before.tier,
                to = %after.tier,
                confidence = after.confidence,
                "Tier changed"
            );
            self.emit(KnowledgeEvent::TierChanged {
                item_id: after.id,
                from: before.tier,
                to: after.tier,
                timestamp,
            });
            if after.tier == Tier::Removed {
                self.emit(KnowledgeEvent::Unlearned {
                    item_id: after.id,
                    reason: after
                        .removal_reason
                        .clone()
                        .unwrap_or_else(|| "removed".to_string()),
                    timestamp,
                });
            }
        }
    }

    /// Current state of an item, including tombstones.
    pub fn get(&self, id: ItemId) -> ChaetraResult<KnowledgeItem> {
        self.get_arc(id).map(|item| (*item).clone())
    }

    /// Current snapshot of an item without copying it.
    pub fn get_arc(&self, id: ItemId) -> ChaetraResult<Arc<KnowledgeItem>> {
        self.slot(id).map(|slot| slot.load())
    }

    /// Live items of a topic.
    pub fn query_by_topic(&self, topic: &str) -> Vec<KnowledgeItem> {
        self.topic_snapshot(topic)
            .into_iter()
            .filter(|item| item.is_live())
            .map(|item| (*item).clone())
            .collect()
    }

    /// Items matching a query, oldest first, truncated to the query limit.
    pub fn retrieve(&self, query: &KnowledgeQuery) -> Vec<KnowledgeItem> {
        let candidates = match query.topic {
            Some(ref topic) => self.topic_snapshot(topic),
            None => self.items.iter().map(|slot| slot.load()).collect(),
        };

        let mut matched: Vec<KnowledgeItem> = candidates
            .into_iter()
            .filter(|item| query.matches(item))
            .map(|item| (*item).clone())
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.0.cmp(&b.id.0)));
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        matched
    }

    /// Lock-free snapshot of every item in the given tiers.
    pub fn snapshot(&self, tiers: &[Tier]) -> Vec<Arc<KnowledgeItem>> {
        self.items
            .iter()
            .map(|slot| slot.load())
            .filter(|item| tiers.contains(&item.tier))
            .collect()
    }

    /// Every item, tombstones included.
    pub fn all_items(&self) -> Vec<KnowledgeItem> {
        self.items.iter().map(|slot| (*slot.load()).clone()).collect()
    }

    /// Item count per tier.
    pub fn count_by_tier(&self) -> HashMap<Tier, usize> {
        let mut counts = HashMap::new();
        for slot in self.items.iter() {
            *counts.entry(slot.load().tier).or_insert(0) += 1;
        }
        counts
    }

    /// Total number of items, tombstones included.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Load previously persisted items.
    ///
    /// Every item's confidence must replay from its ledger; otherwise nothing
    /// is loaded. Items whose id is already present are skipped. Returns the
    /// number of items inserted.
    pub fn restore(&self, items: Vec<KnowledgeItem>) -> ChaetraResult<usize> {
        if let Some(bad) = items.iter().find(|item| !self.model.verify(item)) {
            return Err(ChaetraError::replay_mismatch(bad.id.to_string()));
        }

        let mut inserted = 0;
        for item in items {
            if self.items.contains_key(&item.id) {
                debug!(item_id = %item.id, "Skipping restore of existing item");
                continue;
            }
            let id = item.id;
            if item.is_live() {
                match self.by_key.entry(item.dedup_key()) {
                    Entry::Occupied(existing) => {
                        warn!(
                            item_id = %id,
                            existing = %existing.get(),
                            "Duplicate live triple on restore, keeping first"
                        );
                        continue;
                    }
                    Entry::Vacant(vacant) => {
                        vacant.insert(id);
                    }
                }
            }
            self.by_topic.entry(item.topic.clone()).or_default().push(id);
            self.items.insert(id, Arc::new(ItemSlot::new(item)));
            inserted += 1;
        }

        info!(inserted, "Restored knowledge items");
        Ok(inserted)
    }

    fn slot(&self, id: ItemId) -> ChaetraResult<Arc<ItemSlot>> {
        self.items
            .get(&id)
            .map(|slot| Arc::clone(slot.value()))
            .ok_or_else(|| ChaetraError::not_found(id.to_string()))
    }

    fn topic_snapshot(&self, topic: &str) -> Vec<Arc<KnowledgeItem>> {
        let ids = self
            .by_topic
            .get(topic)
            .map(|ids| ids.value().clone())
            .unwrap_or_default();
        ids.into_iter()
            .filter_map(|id| self.slot(id).ok())
            .map(|slot| slot.load())
            .collect()
    }

    fn emit(&self, event: KnowledgeEvent) {
        if let Some(ref bus) = self.events {
            bus.emit(event);
        }
    }
}
