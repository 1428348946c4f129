//! End-to-end knowledge lifecycle through the public engine API.

use chaetra_core::{
    Chaetra, ChaetraError, ContradictionOutcome, ErrorCode, Evidence, LearningConfig, Observation,
    Statement, Tier,
};
use chrono::{Duration, Utc};

fn engine() -> Chaetra {
    Chaetra::new(LearningConfig::default()).unwrap()
}

fn momentum() -> Statement {
    Statement::text("tech sector leads")
}

#[tokio::test]
async fn test_three_supporting_observations_reach_core() {
    let chaetra = engine();

    let mut id = None;
    for source in ["scan-1", "scan-2", "scan-3"] {
        id = Some(
            chaetra
                .observe("sector_momentum", momentum(), "markets", Evidence::supporting(source))
                .await
                .unwrap(),
        );
    }

    let item = chaetra.get_knowledge_item(id.unwrap()).unwrap();
    assert_eq!(item.tier, Tier::Core);
    assert_eq!(item.validation_count, 3);
    assert_eq!(item.evidence.len(), 3);
    assert!(item.confidence >= 0.8);
    assert!(!item.under_review);
}

#[tokio::test]
async fn test_two_observations_stay_short_term() {
    let chaetra = engine();
    let mut id = None;
    for source in ["scan-1", "scan-2"] {
        id = Some(
            chaetra
                .observe("sector_momentum", momentum(), "markets", Evidence::supporting(source))
                .await
                .unwrap(),
        );
    }

    let item = chaetra.get_knowledge_item(id.unwrap()).unwrap();
    assert_eq!(item.tier, Tier::ShortTerm);
    assert_eq!(item.validation_count, 2);
}

#[tokio::test]
async fn test_contradicted_core_item_is_archived() {
    let chaetra = engine();

    // 0.7 + 0.025 + 0.025 + 0.05 lands on exactly 0.8 with three validations.
    let mut id = None;
    for (source, weight) in [("a", 0.25), ("b", 0.25), ("c", 0.5)] {
        id = Some(
            chaetra
                .observe(
                    "sector_momentum",
                    momentum(),
                    "markets",
                    Evidence::supporting(source).with_weight(weight),
                )
                .await
                .unwrap(),
        );
    }
    let id = id.unwrap();
    let core = chaetra.get_knowledge_item(id).unwrap();
    assert_eq!(core.tier, Tier::Core);
    assert_eq!(core.confidence, 0.8);

    let mut outcomes = Vec::new();
    for n in 0..6 {
        let outcome = chaetra
            .observe_with(Observation::new(
                "sector_momentum",
                momentum(),
                "markets",
                Evidence::contradicting(format!("close-{}", n)),
            ))
            .await
            .unwrap();
        outcomes.push(outcome);
    }

    // 0.7, 0.6, 0.5 and 0.4 keep it in core under review.
    for outcome in &outcomes[..4] {
        assert_eq!(outcome.item.tier, Tier::Core);
        assert_eq!(outcome.contradiction, Some(ContradictionOutcome::UnderReview));
        assert!(outcome.item.under_review);
    }

    // The fifth lands exactly on the archive threshold.
    let fifth = &outcomes[4];
    assert_eq!(fifth.contradiction, Some(ContradictionOutcome::Archived));
    assert_eq!(fifth.previous_tier, Tier::Core);
    assert!(fifth.tier_changed());
    assert_eq!(fifth.item.tier, Tier::Archived);
    assert_eq!(fifth.item.confidence, 0.3);
    assert_eq!(fifth.item.evidence.len(), 8);

    // Further contradictions leave it archived.
    let sixth = &outcomes[5];
    assert_eq!(sixth.contradiction, Some(ContradictionOutcome::UnderReview));
    assert_eq!(sixth.previous_tier, Tier::Archived);
    assert!(!sixth.tier_changed());

    let archived = chaetra.get_knowledge_item(id).unwrap();
    assert_eq!(archived.tier, Tier::Archived);
    assert_eq!(archived.confidence, 0.2);
    assert_eq!(archived.evidence.len(), 9);
}

#[tokio::test]
async fn test_archived_item_can_be_relearned() {
    let chaetra = engine();
    for (source, weight) in [("a", 0.25), ("b", 0.25), ("c", 0.5)] {
        chaetra
            .observe(
                "sector_momentum",
                momentum(),
                "markets",
                Evidence::supporting(source).with_weight(weight),
            )
            .await
            .unwrap();
    }
    for n in 0..6 {
        chaetra
            .observe(
                "sector_momentum",
                momentum(),
                "markets",
                Evidence::contradicting(format!("close-{}", n)),
            )
            .await
            .unwrap();
    }

    // Six fresh validations walk it from 0.2 back up to 0.8.
    let mut last = None;
    for n in 0..6 {
        last = Some(
            chaetra
                .observe_with(Observation::new(
                    "sector_momentum",
                    momentum(),
                    "markets",
                    Evidence::supporting(format!("rescan-{}", n)),
                ))
                .await
                .unwrap(),
        );
    }
    let last = last.unwrap();
    assert!(!last.created);
    assert_eq!(last.previous_tier, Tier::Archived);
    assert_eq!(last.item.tier, Tier::Core);
    assert_eq!(last.item.confidence, 0.8);
    assert_eq!(last.item.validation_count, 9);
    assert!(!last.item.under_review);
}

#[tokio::test]
async fn test_stale_short_term_item_expires_on_sweep() {
    let chaetra = engine();
    let id = chaetra
        .observe("gap_fill", Statement::text("gaps fill by noon"), "markets", Evidence::supporting("open"))
        .await
        .unwrap();

    let early = chaetra.sweeper().sweep_at(Utc::now() + Duration::hours(1)).await;
    assert_eq!(early.expired, 0);
    assert_eq!(chaetra.get_knowledge_item(id).unwrap().tier, Tier::ShortTerm);

    let report = chaetra
        .sweeper()
        .sweep_at(Utc::now() + Duration::seconds(86_400 + 60))
        .await;
    assert_eq!(report.expired, 1);
    assert!(report.errors.is_empty());

    let item = chaetra.get_knowledge_item(id).unwrap();
    assert_eq!(item.tier, Tier::Removed);
    assert!(item.removal_reason.is_some());
    assert!(chaetra.query_topic("gap_fill", None).is_empty());
}

#[tokio::test]
async fn test_opinion_weights_tiers() {
    let chaetra = engine();

    // Core item: three validations, then one contradiction down to 0.9.
    for source in ["a", "b", "c"] {
        chaetra
            .observe("sector_momentum", momentum(), "markets", Evidence::supporting(source))
            .await
            .unwrap();
    }
    chaetra
        .observe("sector_momentum", momentum(), "markets", Evidence::contradicting("d"))
        .await
        .unwrap();

    // Short-term item pushed down to 0.4.
    chaetra
        .observe(
            "sector_momentum",
            Statement::text("energy sector leads"),
            "markets",
            Evidence::contradicting("e").with_weight(3.0),
        )
        .await
        .unwrap();

    let formed = chaetra.form_opinion("sector_momentum").unwrap();
    assert!(formed.stored);
    let opinion = formed.opinion;
    assert!((opinion.core_belief.confidence - 0.7333).abs() < 0.001);
    assert_eq!(opinion.core_belief.statement, momentum());
    assert_eq!(opinion.supporting_items.len(), 1);
    assert_eq!(opinion.contradicting_items.len(), 1);
    assert_eq!(opinion.history.len(), 1);

    let recorded = chaetra.get_opinion("sector_momentum").unwrap();
    assert_eq!(recorded.core_belief, opinion.core_belief);
}

#[tokio::test]
async fn test_opinion_below_threshold_is_not_stored() {
    let chaetra = engine();
    chaetra
        .observe(
            "rates",
            Statement::text("cuts priced in"),
            "macro",
            Evidence::contradicting("fomc").with_weight(2.0),
        )
        .await
        .unwrap();

    let formed = chaetra.form_opinion("rates").unwrap();
    assert!(!formed.stored);
    assert!(formed.opinion.history.is_empty());

    let err = chaetra.get_opinion("rates").unwrap_err();
    assert_eq!(err.code(), ErrorCode::KnwOpinionNotFound);
}

#[tokio::test]
async fn test_opinion_on_unknown_topic_fails() {
    let chaetra = engine();
    let err = chaetra.form_opinion("nothing_here").unwrap_err();
    assert!(matches!(err, ChaetraError::NotFound { .. }));
    assert_eq!(err.code(), ErrorCode::KnwTopicEmpty);
}

#[tokio::test]
async fn test_observe_deduplicates_triple() {
    let chaetra = engine();
    let a = chaetra
        .observe("t", Statement::text("s"), "d", Evidence::supporting("x"))
        .await
        .unwrap();
    let b = chaetra
        .observe("t", Statement::text("s"), "d", Evidence::supporting("y"))
        .await
        .unwrap();
    let other_domain = chaetra
        .observe("t", Statement::text("s"), "other", Evidence::supporting("z"))
        .await
        .unwrap();

    assert_eq!(a, b);
    assert_ne!(a, other_domain);
    assert_eq!(chaetra.query_topic("t", None).len(), 2);
}

#[tokio::test]
async fn test_unlearned_triple_starts_fresh() {
    let chaetra = engine();
    let first = chaetra
        .observe("t", Statement::text("s"), "d", Evidence::supporting("x"))
        .await
        .unwrap();
    chaetra.unlearn(first, "operator request").await.unwrap();

    let removed = chaetra.get_knowledge_item(first).unwrap();
    assert_eq!(removed.tier, Tier::Removed);
    assert_eq!(removed.removal_reason.as_deref(), Some("operator request"));

    let second = chaetra
        .observe("t", Statement::text("s"), "d", Evidence::supporting("y"))
        .await
        .unwrap();
    assert_ne!(first, second);
    let fresh = chaetra.get_knowledge_item(second).unwrap();
    assert_eq!(fresh.evidence.len(), 1);
    assert_eq!(fresh.validation_count, 1);
}

#[tokio::test]
async fn test_invalid_evidence_is_rejected() {
    let chaetra = engine();
    let err = chaetra
        .observe(
            "t",
            Statement::text("s"),
            "d",
            Evidence::supporting("x").with_weight(-1.0),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::EvdNonPositiveWeight);
    assert!(chaetra.query_topic("t", None).is_empty());
}
