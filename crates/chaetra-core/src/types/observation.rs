//! Inbound observations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::evidence::Evidence;
use super::knowledge_item::Statement;

/// One external observation: a hypothesis plus the evidence for or against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub topic: String,
    pub statement: Statement,
    pub domain: String,
    pub evidence: Evidence,
    /// Tags applied when the observation creates a new item.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Metadata applied when the observation creates a new item.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Observation {
    /// Create an observation.
    pub fn new(
        topic: impl Into<String>,
        statement: Statement,
        domain: impl Into<String>,
        evidence: Evidence,
    ) -> Self {
        Self {
            topic: topic.into(),
            statement,
            domain: domain.into(),
            evidence,
            tags: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Set the tags.
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Add one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
