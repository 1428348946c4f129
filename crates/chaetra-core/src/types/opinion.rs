//! Topic-level opinions aggregated from knowledge items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::knowledge_item::{ItemId, Statement};

/// The belief an opinion currently holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreBelief {
    /// Synthesized statement.
    pub statement: Statement,
    /// Aggregate confidence, not equal to any single item's.
    pub confidence: f64,
}

/// A past belief, kept forever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpinionSnapshot {
    pub confidence: f64,
    pub statement: Statement,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate view over the knowledge items of one topic.
///
/// Holds item ids only; the memory store stays the owner and every query
/// re-resolves them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opinion {
    /// Topic key shared with the constituent items.
    pub topic: String,
    /// Current belief.
    pub core_belief: CoreBelief,
    /// Items whose net evidence supports their statement.
    pub supporting_items: Vec<ItemId>,
    /// Items whose net evidence contradicts their statement.
    pub contradicting_items: Vec<ItemId>,
    /// Append-only belief log. The last entry mirrors `core_belief`.
    #[serde(default)]
    pub history: Vec<OpinionSnapshot>,
    /// When the opinion was first stored.
    pub formed_at: DateTime<Utc>,
    /// When the belief last changed.
    pub last_updated: DateTime<Utc>,
}

impl Opinion {
    /// Adopt a new belief, appending it to the history first.
    pub fn adopt(&mut self, belief: CoreBelief, now: DateTime<Utc>) {
        self.history.push(OpinionSnapshot {
            confidence: belief.confidence,
            statement: belief.statement.clone(),
            timestamp: now,
        });
        self.core_belief = belief;
        self.last_updated = now;
    }

    /// Ids of every constituent item.
    pub fn item_ids(&self) -> impl Iterator<Item = &ItemId> {
        self.supporting_items
            .iter()
            .chain(self.contradicting_items.iter())
    }
}

/// Result of forming or updating an opinion.
#[derive(Debug, Clone, PartialEq)]
pub struct OpinionFormation {
    /// The computed opinion. When not stored, `history` is empty; any
    /// recorded opinion for the topic is left as it was.
    pub opinion: Opinion,
    /// Whether the opinion cleared the store threshold and was recorded.
    pub stored: bool,
}
