//! Knowledge item types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::evidence::{Evidence, Polarity};
use super::tier::Tier;
use crate::confidence::clamp_unit;

/// Unique, immutable identifier of a knowledge item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub Uuid);

impl ItemId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The asserted content of a knowledge item.
///
/// Opaque to the engine: only the schema tag and raw content are carried,
/// and equality is byte-wise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Statement {
    /// Caller-supplied schema tag (e.g. `text`, `pattern/v1`).
    pub schema: String,
    /// Raw payload.
    pub content: String,
}

impl Statement {
    /// Create a statement with an explicit schema.
    pub fn new(schema: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            content: content.into(),
        }
    }

    /// Plain-text statement.
    pub fn text(content: impl Into<String>) -> Self {
        Self::new("text", content)
    }
}

/// Key used to deduplicate observations of the same hypothesis.
///
/// MD5 over the length-prefixed `(topic, schema, content, domain)` fields.
pub fn dedup_key(topic: &str, statement: &Statement, domain: &str) -> String {
    let mut buf = String::with_capacity(
        topic.len() + statement.schema.len() + statement.content.len() + domain.len() + 32,
    );
    for part in [
        topic,
        statement.schema.as_str(),
        statement.content.as_str(),
        domain,
    ] {
        buf.push_str(&part.len().to_string());
        buf.push(':');
        buf.push_str(part);
    }
    format!("{:x}", md5::compute(buf.as_bytes()))
}

/// A knowledge item held by the memory store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    /// Unique identifier.
    pub id: ItemId,
    /// Grouping key (concept, correlation name, ...).
    pub topic: String,
    /// Asserted content.
    pub statement: Statement,
    /// Context tag set by the caller.
    pub domain: String,
    /// Current confidence in [0, 1].
    pub confidence: f64,
    /// Confidence at creation; the start point for ledger replay.
    pub initial_confidence: f64,
    /// Current tier.
    pub tier: Tier,
    /// Corroborating evidence events since creation.
    pub validation_count: u32,
    /// Raised by contradicting evidence, cleared on re-promotion.
    #[serde(default)]
    pub under_review: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp; the short-term expiry window starts here.
    pub last_updated_at: DateTime<Utc>,
    /// Evidence ledger in applied order.
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Custom metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Why the item was tombstoned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removal_reason: Option<String>,
}

impl KnowledgeItem {
    /// Create a new short-term item.
    pub fn new(
        topic: impl Into<String>,
        statement: Statement,
        domain: impl Into<String>,
        initial_confidence: f64,
        now: DateTime<Utc>,
    ) -> Self {
        let confidence = clamp_unit(initial_confidence);
        Self {
            id: ItemId::new(),
            topic: topic.into(),
            statement,
            domain: domain.into(),
            confidence,
            initial_confidence: confidence,
            tier: Tier::ShortTerm,
            validation_count: 0,
            under_review: false,
            created_at: now,
            last_updated_at: now,
            evidence: Vec::new(),
            tags: Vec::new(),
            metadata: HashMap::new(),
            removal_reason: None,
        }
    }

    /// Set the tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Set the metadata.
    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Dedup key of this item's `(topic, statement, domain)` triple.
    pub fn dedup_key(&self) -> String {
        dedup_key(&self.topic, &self.statement, &self.domain)
    }

    /// Sum of evidence weights signed by polarity.
    pub fn net_evidence_weight(&self) -> f64 {
        self.evidence.iter().map(Evidence::signed_weight).sum()
    }

    /// Polarity of the net evidence. Ties count as supporting.
    pub fn net_polarity(&self) -> Polarity {
        if self.net_evidence_weight() < 0.0 {
            Polarity::Contradicting
        } else {
            Polarity::Supporting
        }
    }

    /// When a short-term item expires if it receives no further evidence.
    ///
    /// `None` for tiers that never expire, or if the instant is unrepresentable.
    pub fn expires_at(&self, ttl: chrono::Duration) -> Option<DateTime<Utc>> {
        if !self.tier.expires() {
            return None;
        }
        self.last_updated_at.checked_add_signed(ttl)
    }

    /// Whether the item is not tombstoned.
    pub fn is_live(&self) -> bool {
        self.tier.is_live()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> KnowledgeItem {
        KnowledgeItem::new(
            "sector_momentum",
            Statement::text("tech leads energy"),
            "equities",
            0.7,
            Utc::now(),
        )
    }

    #[test]
    fn test_new_item_starts_short_term() {
        let item = item();
        assert_eq!(item.tier, Tier::ShortTerm);
        assert_eq!(item.confidence, 0.7);
        assert_eq!(item.initial_confidence, 0.7);
        assert_eq!(item.validation_count, 0);
        assert!(!item.under_review);
        assert!(item.evidence.is_empty());
    }

    #[test]
    fn test_initial_confidence_is_clamped() {
        let item = KnowledgeItem::new("t", Statement::text("s"), "d", 1.4, Utc::now());
        assert_eq!(item.confidence, 1.0);
    }

    #[test]
    fn test_dedup_key_separates_fields() {
        let a = dedup_key("ab", &Statement::text("c"), "d");
        let b = dedup_key("a", &Statement::text("bc"), "d");
        assert_ne!(a, b);
        assert_eq!(a, dedup_key("ab", &Statement::text("c"), "d"));
        assert_ne!(
            dedup_key("t", &Statement::new("text", "x"), "d"),
            dedup_key("t", &Statement::new("json", "x"), "d")
        );
    }

    #[test]
    fn test_net_polarity() {
        let mut item = item();
        assert_eq!(item.net_polarity(), Polarity::Supporting);
        item.evidence.push(Evidence::contradicting("a").with_weight(2.0));
        item.evidence.push(Evidence::supporting("b"));
        assert_eq!(item.net_evidence_weight(), -1.0);
        assert_eq!(item.net_polarity(), Polarity::Contradicting);
    }

    #[test]
    fn test_expiry_only_for_short_term() {
        let mut item = item();
        let ttl = chrono::Duration::seconds(60);
        assert_eq!(item.expires_at(ttl), Some(item.last_updated_at + ttl));
        item.tier = Tier::Core;
        assert_eq!(item.expires_at(ttl), None);
    }

    #[test]
    fn test_serialization_round_trip() {
        let item = item().with_tags(vec!["AAPL".to_string()]);
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"tier\":\"short_term\""));
        let back: KnowledgeItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back, item);
    }
}
