//! Storage tiers a knowledge item moves through.
//!
//! ```text
//! ShortTerm ──promote──▶ Core ──decay──▶ Archived
//!     │                   │  ▲              │
//!     │                   │  └──relearn─────┘
//!     └──expire/unlearn──▶ Removed ◀──unlearn┘
//! ```

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Validation status of a knowledge item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Tier {
    /// Tentative hypothesis, subject to TTL expiry.
    ShortTerm,
    /// Validated knowledge.
    Core,
    /// Demoted knowledge kept for historical queries.
    Archived,
    /// Tombstoned. Terminal.
    Removed,
}

impl Tier {
    /// All tiers that still hold live knowledge.
    pub const LIVE: [Tier; 3] = [Tier::ShortTerm, Tier::Core, Tier::Archived];

    /// Whether the state machine allows moving from `self` to `target`.
    ///
    /// Any live tier can be tombstoned; `Removed` is terminal.
    pub fn can_transition_to(&self, target: Tier) -> bool {
        matches!(
            (self, target),
            (Tier::ShortTerm, Tier::Core)
                | (Tier::Core, Tier::Archived)
                | (Tier::Archived, Tier::Core)
                | (Tier::ShortTerm | Tier::Core | Tier::Archived, Tier::Removed)
        )
    }

    /// Whether the item is not tombstoned.
    pub fn is_live(&self) -> bool {
        !matches!(self, Tier::Removed)
    }

    /// Whether the tier is subject to TTL expiry.
    pub fn expires(&self) -> bool {
        matches!(self, Tier::ShortTerm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_allowed_transitions() {
        assert!(Tier::ShortTerm.can_transition_to(Tier::Core));
        assert!(Tier::ShortTerm.can_transition_to(Tier::Removed));
        assert!(Tier::Core.can_transition_to(Tier::Archived));
        assert!(Tier::Core.can_transition_to(Tier::Removed));
        assert!(Tier::Archived.can_transition_to(Tier::Core));
        assert!(Tier::Archived.can_transition_to(Tier::Removed));
    }

    #[test]
    fn test_forbidden_transitions() {
        assert!(!Tier::ShortTerm.can_transition_to(Tier::Archived));
        assert!(!Tier::Core.can_transition_to(Tier::ShortTerm));
        assert!(!Tier::Archived.can_transition_to(Tier::ShortTerm));
        assert!(!Tier::Core.can_transition_to(Tier::Core));
        for tier in [Tier::ShortTerm, Tier::Core, Tier::Archived, Tier::Removed] {
            assert!(!Tier::Removed.can_transition_to(tier));
        }
    }

    #[test]
    fn test_string_round_trip() {
        assert_eq!(Tier::ShortTerm.to_string(), "short_term");
        assert_eq!(Tier::from_str("archived").unwrap(), Tier::Archived);
        assert!(Tier::from_str("bogus").is_err());
    }
}
