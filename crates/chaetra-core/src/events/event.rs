//! Knowledge lifecycle events.
//!
//! Emitted after a mutation is committed, so subscribers only ever see
//! committed state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ItemId, Polarity, Tier};

/// Knowledge lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KnowledgeEvent {
    /// A new hypothesis entered short-term memory.
    ItemCreated {
        item_id: ItemId,
        topic: String,
        timestamp: DateTime<Utc>,
    },
    /// Evidence was appended to an item's ledger.
    EvidenceApplied {
        item_id: ItemId,
        polarity: Polarity,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },
    /// An item moved between tiers.
    TierChanged {
        item_id: ItemId,
        from: Tier,
        to: Tier,
        timestamp: DateTime<Utc>,
    },
    /// An item was flagged for external review.
    FlaggedForReview {
        item_id: ItemId,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },
    /// An item was tombstoned.
    Unlearned {
        item_id: ItemId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// An opinion was recorded.
    OpinionRecorded {
        topic: String,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },
}

impl KnowledgeEvent {
    /// Get the event type as a string for filtering.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ItemCreated { .. } => "knowledge.created",
            Self::EvidenceApplied { .. } => "knowledge.evidence",
            Self::TierChanged { .. } => "knowledge.tier_changed",
            Self::FlaggedForReview { .. } => "knowledge.flagged",
            Self::Unlearned { .. } => "knowledge.unlearned",
            Self::OpinionRecorded { .. } => "opinion.recorded",
        }
    }

    /// Get the item this event relates to, if any.
    pub fn item_id(&self) -> Option<ItemId> {
        match self {
            Self::ItemCreated { item_id, .. }
            | Self::EvidenceApplied { item_id, .. }
            | Self::TierChanged { item_id, .. }
            | Self::FlaggedForReview { item_id, .. }
            | Self::Unlearned { item_id, .. } => Some(*item_id),
            Self::OpinionRecorded { .. } => None,
        }
    }

    /// Get the timestamp of this event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ItemCreated { timestamp, .. }
            | Self::EvidenceApplied { timestamp, .. }
            | Self::TierChanged { timestamp, .. }
            | Self::FlaggedForReview { timestamp, .. }
            | Self::Unlearned { timestamp, .. }
            | Self::OpinionRecorded { timestamp, .. } => *timestamp,
        }
    }
}
