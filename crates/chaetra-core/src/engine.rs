//! The chaetra engine: one handle over every component.

use std::sync::Arc;

use tracing::info;

use crate::config::LearningConfig;
use crate::error::ChaetraResult;
use crate::events::{EventBus, EventSubscriber};
use crate::memory::MemoryStore;
use crate::opinion::OpinionEngine;
use crate::sweeper::{SweepReport, TierSweeper};
use crate::types::{
    Evidence, ItemId, KnowledgeItem, KnowledgeQuery, Observation, Opinion, OpinionFormation,
    Polarity, Statement, Tier,
};
use crate::unlearning::UnlearningController;
use crate::validation::{ObserveOutcome, ValidationEngine};

/// Tag applied to observations recorded through [`Chaetra::learn_from_feedback`].
pub const FEEDBACK_TAG: &str = "feedback_learning";

/// Knowledge memory and confidence engine.
///
/// # Example
///
/// ```ignore
/// use chaetra_core::{Chaetra, Evidence, LearningConfig, Statement};
///
/// let chaetra = Chaetra::new(LearningConfig::default())?;
/// let id = chaetra
///     .observe("sector_momentum", Statement::text("tech leads"), "markets", Evidence::supporting("scan"))
///     .await?;
/// let opinion = chaetra.form_opinion("sector_momentum")?;
/// ```
pub struct Chaetra {
    store: Arc<MemoryStore>,
    validation: ValidationEngine,
    unlearning: UnlearningController,
    opinions: OpinionEngine,
    sweeper: Arc<TierSweeper>,
    events: Option<EventBus>,
}

impl Chaetra {
    /// Create an engine. The configuration is validated first.
    pub fn new(config: LearningConfig) -> ChaetraResult<Self> {
        Self::build(config, None)
    }

    /// Create an engine that publishes lifecycle events on `bus`.
    pub fn with_events(config: LearningConfig, bus: EventBus) -> ChaetraResult<Self> {
        Self::build(config, Some(bus))
    }

    fn build(config: LearningConfig, events: Option<EventBus>) -> ChaetraResult<Self> {
        let mut store = MemoryStore::new(Arc::new(config))?;
        let mut opinions_bus = None;
        if let Some(ref bus) = events {
            store = store.with_event_bus(bus.clone());
            opinions_bus = Some(bus.clone());
        }
        let store = Arc::new(store);

        let mut opinions = OpinionEngine::new(store.clone());
        if let Some(bus) = opinions_bus {
            opinions = opinions.with_event_bus(bus);
        }

        info!(
            core_threshold = store.config().core_confidence_threshold,
            archive_threshold = store.config().archive_confidence_threshold,
            ttl_secs = store.config().short_term_ttl_seconds,
            "Chaetra engine initialized"
        );

        Ok(Self {
            validation: ValidationEngine::new(store.clone()),
            unlearning: UnlearningController::new(store.clone()),
            sweeper: Arc::new(TierSweeper::new(store.clone())),
            opinions,
            store,
            events,
        })
    }

    /// Create-or-append: record one piece of evidence about a statement.
    pub async fn observe(
        &self,
        topic: impl Into<String>,
        statement: Statement,
        domain: impl Into<String>,
        evidence: Evidence,
    ) -> ChaetraResult<ItemId> {
        let outcome = self
            .validation
            .observe(Observation::new(topic, statement, domain, evidence))
            .await?;
        Ok(outcome.item_id)
    }

    /// Record an observation and get the full outcome back.
    pub async fn observe_with(&self, observation: Observation) -> ChaetraResult<ObserveOutcome> {
        self.validation.observe(observation).await
    }

    /// Record whether an earlier hypothesis matched what actually happened.
    pub async fn learn_from_feedback(
        &self,
        topic: impl Into<String>,
        statement: Statement,
        domain: impl Into<String>,
        outcome_matched: bool,
        source: impl Into<String>,
    ) -> ChaetraResult<ObserveOutcome> {
        let polarity = if outcome_matched {
            Polarity::Supporting
        } else {
            Polarity::Contradicting
        };
        let observation = Observation::new(topic, statement, domain, Evidence::new(source, polarity))
            .with_tags([FEEDBACK_TAG])
            .with_metadata("outcome_matched", serde_json::Value::Bool(outcome_matched));
        self.validation.observe(observation).await
    }

    /// Current state of an item, tombstones included.
    pub fn get_knowledge_item(&self, id: ItemId) -> ChaetraResult<KnowledgeItem> {
        self.store.get(id)
    }

    /// Items of a topic, restricted to `tiers` when given; live items otherwise.
    pub fn query_topic(&self, topic: &str, tiers: Option<&[Tier]>) -> Vec<KnowledgeItem> {
        let mut query = KnowledgeQuery::new().topic(topic);
        if let Some(tiers) = tiers {
            query = query.tiers(tiers.iter().copied());
        }
        self.store.retrieve(&query)
    }

    /// Items matching an arbitrary filter.
    pub fn retrieve(&self, query: &KnowledgeQuery) -> Vec<KnowledgeItem> {
        self.store.retrieve(query)
    }

    /// Items waiting on external review.
    pub fn flagged_for_review(&self) -> Vec<KnowledgeItem> {
        self.unlearning.flagged()
    }

    /// Aggregate a topic into an opinion, recording it if it clears the bar.
    pub fn form_opinion(&self, topic: &str) -> ChaetraResult<OpinionFormation> {
        self.opinions.form_opinion(topic)
    }

    /// Re-form a recorded opinion.
    pub fn update_opinion(&self, topic: &str) -> ChaetraResult<OpinionFormation> {
        self.opinions.update_opinion(topic)
    }

    /// The recorded opinion for a topic.
    pub fn get_opinion(&self, topic: &str) -> ChaetraResult<Opinion> {
        self.opinions.get_opinion(topic)
    }

    pub fn list_opinions(&self) -> Vec<Opinion> {
        self.opinions.list_opinions()
    }

    /// Administrative removal, bypassing confidence rules.
    pub async fn unlearn(&self, id: ItemId, reason: impl Into<String>) -> ChaetraResult<()> {
        self.unlearning.unlearn(id, reason).await
    }

    /// Run one sweep tick now.
    pub async fn sweep_now(&self) -> SweepReport {
        self.sweeper.sweep().await
    }

    /// Load persisted items and opinions.
    ///
    /// Items are checked by ledger replay before anything is loaded.
    pub fn restore(&self, items: Vec<KnowledgeItem>, opinions: Vec<Opinion>) -> ChaetraResult<(usize, usize)> {
        let items = self.store.restore(items)?;
        let opinions = self.opinions.restore(opinions);
        Ok((items, opinions))
    }

    /// Subscribe to lifecycle events, if the engine publishes them.
    pub fn subscribe(&self) -> Option<EventSubscriber> {
        self.events.as_ref().map(EventBus::subscribe)
    }

    pub fn config(&self) -> &LearningConfig {
        self.store.config()
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn validation(&self) -> &ValidationEngine {
        &self.validation
    }

    pub fn opinions(&self) -> &OpinionEngine {
        &self.opinions
    }

    pub fn sweeper(&self) -> Arc<TierSweeper> {
        self.sweeper.clone()
    }
}
