//! Query filters for knowledge retrieval.

use serde::{Deserialize, Serialize};

use super::knowledge_item::KnowledgeItem;
use super::tier::Tier;

/// Filter applied by [`crate::MemoryStore::retrieve`].
///
/// Empty fields match everything. Tombstoned items only match when
/// `Tier::Removed` is listed explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Accepted tiers. Empty means all live tiers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tiers: Vec<Tier>,
    /// Matches when the item carries any of these tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub under_review: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl KnowledgeQuery {
    /// Create an empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a topic.
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Restrict to a domain.
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Restrict to the given tiers.
    pub fn tiers(mut self, tiers: impl IntoIterator<Item = Tier>) -> Self {
        self.tiers = tiers.into_iter().collect();
        self
    }

    /// Require any of the given tags.
    pub fn tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Filter on the review flag.
    pub fn under_review(mut self, flagged: bool) -> Self {
        self.under_review = Some(flagged);
        self
    }

    /// Require a minimum confidence.
    pub fn min_confidence(mut self, confidence: f64) -> Self {
        self.min_confidence = Some(confidence);
        self
    }

    /// Cap the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether an item satisfies every criterion.
    pub fn matches(&self, item: &KnowledgeItem) -> bool {
        if self.tiers.is_empty() {
            if !item.is_live() {
                return false;
            }
        } else if !self.tiers.contains(&item.tier) {
            return false;
        }

        if let Some(ref topic) = self.topic {
            if &item.topic != topic {
                return false;
            }
        }
        if let Some(ref domain) = self.domain {
            if &item.domain != domain {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| item.tags.contains(t)) {
            return false;
        }
        if let Some(flagged) = self.under_review {
            if item.under_review != flagged {
                return false;
            }
        }
        if let Some(min) = self.min_confidence {
            if item.confidence < min {
                return false;
            }
        }
        true
    }
}
