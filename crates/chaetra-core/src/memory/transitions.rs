//! Tier transition rules.
//!
//! Pure predicates over a single item. The memory store applies the
//! resulting transitions through its per-item mutation path.

use chrono::{DateTime, Duration, Utc};

use crate::config::LearningConfig;
use crate::error::{ChaetraError, ChaetraResult};
use crate::types::{KnowledgeItem, Tier};

/// Thresholds governing tier movement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionRules {
    core_threshold: f64,
    archive_threshold: f64,
    min_validations: u32,
    short_term_ttl: Duration,
}

impl TransitionRules {
    /// Build rules from the learning configuration.
    pub fn from_config(config: &LearningConfig) -> Self {
        Self {
            core_threshold: config.core_confidence_threshold,
            archive_threshold: config.archive_confidence_threshold,
            min_validations: config.min_validations_for_core,
            short_term_ttl: config.short_term_ttl(),
        }
    }

    /// Confidence and validation count both clear the promotion bar.
    pub fn meets_promotion_bar(&self, item: &KnowledgeItem) -> bool {
        item.confidence >= self.core_threshold && item.validation_count >= self.min_validations
    }

    /// A `ShortTerm` or `Archived` item that may enter `Core`.
    pub fn promotion_ready(&self, item: &KnowledgeItem) -> bool {
        matches!(item.tier, Tier::ShortTerm | Tier::Archived) && self.meets_promotion_bar(item)
    }

    /// A `ShortTerm` item untouched for the whole TTL.
    pub fn is_expired(&self, item: &KnowledgeItem, now: DateTime<Utc>) -> bool {
        item.tier == Tier::ShortTerm && now - item.last_updated_at >= self.short_term_ttl
    }

    /// A `Core` item whose confidence decayed to the archive threshold.
    pub fn should_archive(&self, item: &KnowledgeItem) -> bool {
        item.tier == Tier::Core && item.confidence <= self.archive_threshold
    }

    /// The transition a sweep tick should apply, if any.
    ///
    /// Both conditions are checked for short-term items, and promotion wins
    /// over expiry so an item that just qualified is never expired.
    pub fn sweep_decision(&self, item: &KnowledgeItem, now: DateTime<Utc>) -> Option<Tier> {
        match item.tier {
            Tier::ShortTerm => {
                let expired = self.is_expired(item, now);
                let promotable = self.promotion_ready(item);
                if promotable {
                    Some(Tier::Core)
                } else if expired {
                    Some(Tier::Removed)
                } else {
                    None
                }
            }
            Tier::Core if self.should_archive(item) => Some(Tier::Archived),
            _ => None,
        }
    }

    /// Promotion confidence threshold.
    pub fn core_threshold(&self) -> f64 {
        self.core_threshold
    }

    /// Archival confidence threshold.
    pub fn archive_threshold(&self) -> f64 {
        self.archive_threshold
    }
}

/// Move an item to `target`, enforcing the tier state machine.
///
/// Entering `Core` clears the review flag. Returns the previous tier.
pub fn apply_transition(
    item: &mut KnowledgeItem,
    target: Tier,
    now: DateTime<Utc>,
) -> ChaetraResult<Tier> {
    let from = item.tier;
    if !from.can_transition_to(target) {
        return Err(ChaetraError::InvalidTransition {
            item_id: item.id.to_string(),
            from,
            to: target,
        });
    }
    item.tier = target;
    if target == Tier::Core {
        item.under_review = false;
    }
    item.last_updated_at = now;
    Ok(from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::ConfidenceModel;
    use crate::types::{Evidence, Statement};

    fn rules() -> TransitionRules {
        TransitionRules::from_config(&LearningConfig::default())
    }

    fn item(tier: Tier, confidence: f64, validations: u32, age: Duration) -> KnowledgeItem {
        let now = Utc::now();
        let mut item = KnowledgeItem::new("t", Statement::text("s"), "d", 0.7, now - age);
        item.tier = tier;
        item.confidence = confidence;
        item.validation_count = validations;
        item
    }

    #[test]
    fn test_promotion_needs_both_conditions() {
        let r = rules();
        assert!(r.promotion_ready(&item(Tier::ShortTerm, 0.8, 3, Duration::zero())));
        assert!(!r.promotion_ready(&item(Tier::ShortTerm, 0.95, 2, Duration::zero())));
        assert!(!r.promotion_ready(&item(Tier::ShortTerm, 0.79, 10, Duration::zero())));
        assert!(!r.promotion_ready(&item(Tier::Core, 0.9, 5, Duration::zero())));
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let r = rules();
        let now = Utc::now();
        let mut i = item(Tier::ShortTerm, 0.5, 0, Duration::zero());
        i.last_updated_at = now - Duration::seconds(86_399);
        assert!(!r.is_expired(&i, now));
        i.last_updated_at = now - Duration::seconds(86_400);
        assert!(r.is_expired(&i, now));
    }

    #[test]
    fn test_promotion_takes_precedence_over_expiry() {
        let r = rules();
        let i = item(Tier::ShortTerm, 0.9, 3, Duration::days(3));
        assert!(r.is_expired(&i, Utc::now()));
        assert_eq!(r.sweep_decision(&i, Utc::now()), Some(Tier::Core));
    }

    #[test]
    fn test_sweep_decisions() {
        let r = rules();
        let now = Utc::now();
        assert_eq!(
            r.sweep_decision(&item(Tier::ShortTerm, 0.5, 1, Duration::days(2)), now),
            Some(Tier::Removed)
        );
        assert_eq!(
            r.sweep_decision(&item(Tier::ShortTerm, 0.5, 1, Duration::hours(1)), now),
            None
        );
        assert_eq!(
            r.sweep_decision(&item(Tier::Core, 0.3, 5, Duration::zero()), now),
            Some(Tier::Archived)
        );
        assert_eq!(
            r.sweep_decision(&item(Tier::Core, 0.5, 5, Duration::days(30)), now),
            None
        );
        assert_eq!(
            r.sweep_decision(&item(Tier::Archived, 0.1, 5, Duration::days(30)), now),
            None
        );
    }

    #[test]
    fn test_apply_transition_enforces_state_machine() {
        let now = Utc::now();
        let mut i = item(Tier::ShortTerm, 0.9, 3, Duration::zero());
        i.under_review = true;
        assert_eq!(apply_transition(&mut i, Tier::Core, now).unwrap(), Tier::ShortTerm);
        assert_eq!(i.tier, Tier::Core);
        assert!(!i.under_review);

        let err = apply_transition(&mut i, Tier::ShortTerm, now).unwrap_err();
        assert!(matches!(err, ChaetraError::InvalidTransition { .. }));
        assert_eq!(i.tier, Tier::Core);
    }

    #[test]
    fn test_thresholds_hold_for_accumulated_confidence() {
        let r = rules();
        let model = ConfidenceModel::new(0.1);
        let now = Utc::now();

        let mut i = KnowledgeItem::new("t", Statement::text("s"), "d", 0.7, now);
        model.apply_to(&mut i, Evidence::supporting("feed"));
        assert_eq!(i.confidence, 0.8);
        model.apply_to(&mut i, Evidence::supporting("feed"));
        model.apply_to(&mut i, Evidence::supporting("feed"));
        assert_eq!(i.confidence, 1.0);
        assert!(r.promotion_ready(&i));
        apply_transition(&mut i, Tier::Core, now).unwrap();

        for n in 1..=7 {
            model.apply_to(&mut i, Evidence::contradicting("feed"));
            assert_eq!(r.should_archive(&i), n >= 7, "after {} contradictions", n);
        }
        assert_eq!(i.confidence, 0.3);
        assert_eq!(r.sweep_decision(&i, now), Some(Tier::Archived));

        let single = TransitionRules::from_config(
            &LearningConfig::builder().min_validations_for_core(1).build().unwrap(),
        );
        let mut j = KnowledgeItem::new("t", Statement::text("s"), "d", 0.7, now);
        model.apply_to(&mut j, Evidence::supporting("feed"));
        assert!(single.meets_promotion_bar(&j));
        assert_eq!(single.sweep_decision(&j, now), Some(Tier::Core));
    }
}
