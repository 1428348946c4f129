//! Tier sweeper: TTL expiry, promotion catch-up and archival on a timer.

mod scheduler;
mod sweep;

pub use scheduler::{SweepScheduler, SweepSchedulerConfig};
pub use sweep::{SweepReport, TierSweeper};
