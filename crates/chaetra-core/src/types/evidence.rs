//! Evidence records attached to knowledge items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{ChaetraError, ChaetraResult, ErrorCode};

/// Whether evidence corroborates or contradicts a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Polarity {
    Supporting,
    Contradicting,
}

/// A single observation about a knowledge item.
///
/// Owned by exactly one item's ledger and never discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Opaque provenance identifier.
    pub source: String,
    /// Supporting or contradicting.
    pub polarity: Polarity,
    /// Caller-supplied strength, strictly positive.
    pub weight: f64,
    /// When the observation was made.
    pub timestamp: DateTime<Utc>,
    /// Per-unit-weight boost in force when this record entered a ledger.
    ///
    /// Stamped by the confidence model; replay uses it so a ledger recomputes
    /// to the same confidence after the configured boost changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_boost: Option<f64>,
}

impl Evidence {
    /// Create evidence with weight 1.0 stamped now.
    pub fn new(source: impl Into<String>, polarity: Polarity) -> Self {
        Self {
            source: source.into(),
            polarity,
            weight: 1.0,
            timestamp: Utc::now(),
            applied_boost: None,
        }
    }

    /// Supporting evidence with weight 1.0.
    pub fn supporting(source: impl Into<String>) -> Self {
        Self::new(source, Polarity::Supporting)
    }

    /// Contradicting evidence with weight 1.0.
    pub fn contradicting(source: impl Into<String>) -> Self {
        Self::new(source, Polarity::Contradicting)
    }

    /// Set the weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Set the timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Weight signed by polarity.
    pub fn signed_weight(&self) -> f64 {
        match self.polarity {
            Polarity::Supporting => self.weight,
            Polarity::Contradicting => -self.weight,
        }
    }

    /// Reject evidence that must never reach a ledger.
    pub fn validate(&self) -> ChaetraResult<()> {
        if self.source.trim().is_empty() {
            return Err(ChaetraError::invalid_evidence(
                ErrorCode::EvdMissingSource,
                "evidence source must not be empty",
            ));
        }
        if !(self.weight > 0.0 && self.weight.is_finite()) {
            return Err(ChaetraError::invalid_evidence(
                ErrorCode::EvdNonPositiveWeight,
                format!("evidence weight must be positive, got {}", self.weight),
            ));
        }
        Ok(())
    }
}
