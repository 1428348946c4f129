//! Confidence model.
//!
//! Pure arithmetic over evidence: given the current confidence, validation
//! count and one evidence record, compute the next state. Because no
//! evidence is ever discarded, an item's confidence can always be recomputed
//! by replaying its ledger from the initial confidence.

use crate::types::{Evidence, KnowledgeItem, Polarity};

/// Outcome of applying one evidence record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceUpdate {
    /// New confidence, clamped to [0, 1].
    pub confidence: f64,
    /// New validation count.
    pub validation_count: u32,
    /// Whether the evidence raises the review flag.
    pub flags_review: bool,
}

/// Result of replaying a ledger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayResult {
    pub confidence: f64,
    pub validation_count: u32,
    /// True if any contradicting evidence was seen.
    pub contradicted: bool,
}

/// Bounded additive confidence model.
///
/// Supporting evidence adds `boost * weight` and counts as a validation;
/// contradicting evidence subtracts `boost * weight` and flags the item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceModel {
    boost: f64,
}

impl ConfidenceModel {
    /// Create a model with the given per-unit-weight boost.
    pub fn new(boost: f64) -> Self {
        Self { boost }
    }

    /// The per-unit-weight delta.
    pub fn boost(&self) -> f64 {
        self.boost
    }

    /// Compute the state after one new evidence record at this model's boost.
    pub fn apply(&self, confidence: f64, validation_count: u32, evidence: &Evidence) -> ConfidenceUpdate {
        step(confidence, validation_count, evidence, self.boost)
    }

    /// Append evidence to an item's ledger and update its confidence.
    ///
    /// Does not touch the tier; tier decisions belong to the caller.
    pub fn apply_to(&self, item: &mut KnowledgeItem, mut evidence: Evidence) -> ConfidenceUpdate {
        evidence.applied_boost = Some(self.boost);
        let update = self.apply(item.confidence, item.validation_count, &evidence);
        item.confidence = update.confidence;
        item.validation_count = update.validation_count;
        if update.flags_review {
            item.under_review = true;
        }
        item.evidence.push(evidence);
        update
    }

    /// Replay a ledger from an initial confidence.
    ///
    /// Each record is applied at the boost stamped on it; unstamped records
    /// fall back to this model's boost.
    pub fn replay(&self, initial_confidence: f64, ledger: &[Evidence]) -> ReplayResult {
        ledger.iter().fold(
            ReplayResult {
                confidence: clamp_unit(initial_confidence),
                validation_count: 0,
                contradicted: false,
            },
            |acc, evidence| {
                let boost = evidence.applied_boost.unwrap_or(self.boost);
                let update = step(acc.confidence, acc.validation_count, evidence, boost);
                ReplayResult {
                    confidence: update.confidence,
                    validation_count: update.validation_count,
                    contradicted: acc.contradicted || update.flags_review,
                }
            },
        )
    }

    /// Whether the stored confidence and validation count match a replay.
    pub fn verify(&self, item: &KnowledgeItem) -> bool {
        let replay = self.replay(item.initial_confidence, &item.evidence);
        replay.confidence == item.confidence && replay.validation_count == item.validation_count
    }
}

fn step(confidence: f64, validation_count: u32, evidence: &Evidence, boost: f64) -> ConfidenceUpdate {
    let delta = boost * evidence.weight;
    match evidence.polarity {
        Polarity::Supporting => ConfidenceUpdate {
            confidence: clamp_unit(confidence + delta),
            validation_count: validation_count.saturating_add(1),
            flags_review: false,
        },
        Polarity::Contradicting => ConfidenceUpdate {
            confidence: clamp_unit(confidence - delta),
            validation_count,
            flags_review: true,
        },
    }
}

/// Confidence values are held on a grid of `1 / CONFIDENCE_SCALE`.
///
/// Repeated additions of a boost like 0.1 drift by an ulp or two. Snapping to
/// the grid keeps `0.7 + 0.1` equal to the literal `0.8`, so inclusive
/// threshold comparisons behave as written. The scale is an exact integer,
/// which makes `k / CONFIDENCE_SCALE` the nearest double to the decimal.
pub const CONFIDENCE_SCALE: f64 = 1e9;

/// Snap to the confidence grid and clamp to [0, 1]; NaN collapses to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    let snapped = (value * CONFIDENCE_SCALE).round() / CONFIDENCE_SCALE;
    snapped.clamp(0.0, 1.0)
}
