//! Tier sweep over the whole store.
//!
//! Scan phase reads a lock-free snapshot to pick candidates. Apply phase
//! goes through the store's per-item mutation path and re-evaluates each
//! candidate against its fresh state, so a sweep never overrides evidence
//! that landed between scan and apply.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ErrorCode;
use crate::memory::{apply_transition, MemoryStore, TransitionRules};
use crate::types::{ItemId, Tier};

/// Result of one sweep tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    /// Items promoted `ShortTerm -> Core`.
    pub promoted: usize,
    /// Items expired `ShortTerm -> Removed`.
    pub expired: usize,
    /// Items archived `Core -> Archived`.
    pub archived: usize,
    /// Candidates that no longer qualified when their lock was taken.
    pub skipped: usize,
    /// Per-item failures; the sweep carried on past each one.
    pub errors: Vec<String>,
    /// Whether the stop signal ended the tick early.
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SweepReport {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            ..Default::default()
        }
    }

    fn complete(mut self) -> Self {
        self.completed_at = Some(Utc::now());
        self
    }

    /// Tier transitions applied by this tick.
    pub fn total_transitions(&self) -> usize {
        self.promoted + self.expired + self.archived
    }

    /// Wall time of the tick.
    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

/// Periodic tier maintenance.
pub struct TierSweeper {
    store: Arc<MemoryStore>,
    rules: TransitionRules,
    stop: CancellationToken,
}

impl TierSweeper {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        let rules = TransitionRules::from_config(store.config());
        Self {
            store,
            rules,
            stop: CancellationToken::new(),
        }
    }

    /// Token that stops current and future ticks between items.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Signal any running tick to stop after its current item.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Run one tick now.
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Run one tick as if the clock read `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::new();

        let mut candidates: Vec<(ItemId, DateTime<Utc>)> = self
            .store
            .snapshot(&[Tier::ShortTerm, Tier::Core])
            .into_iter()
            .filter(|item| self.rules.sweep_decision(item, now).is_some())
            .map(|item| (item.id, item.created_at))
            .collect();
        candidates.sort_by_key(|&(_, created_at)| created_at);

        debug!(candidates = candidates.len(), "Sweep scan complete");

        for (id, _) in candidates {
            if self.stop.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let rules = self.rules;
            let result = self
                .store
                .mutate(id, move |item| {
                    let Some(target) = rules.sweep_decision(item, now) else {
                        return Ok(None);
                    };
                    apply_transition(item, target, now)?;
                    if target == Tier::Removed {
                        item.removal_reason = Some("short-term ttl expired".to_string());
                    }
                    Ok(Some(target))
                })
                .await;

            match result {
                Ok((_, Some(Tier::Core))) => report.promoted += 1,
                Ok((_, Some(Tier::Removed))) => report.expired += 1,
                Ok((_, Some(Tier::Archived))) => report.archived += 1,
                Ok((_, _)) => report.skipped += 1,
                Err(e) if e.code() == ErrorCode::KnwItemRemoved => report.skipped += 1,
                Err(e) => {
                    warn!(item_id = %id, error = %e, "Sweep skipped item");
                    report.errors.push(format!("{}: {}", id, e));
                }
            }
        }

        let report = report.complete();
        if report.total_transitions() > 0 || !report.errors.is_empty() {
            info!(
                promoted = report.promoted,
                expired = report.expired,
                archived = report.archived,
                skipped = report.skipped,
                errors = report.errors.len(),
                cancelled = report.cancelled,
                "Sweep complete"
            );
        } else {
            debug!(skipped = report.skipped, "Sweep complete, nothing to do");
        }
        report
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}
