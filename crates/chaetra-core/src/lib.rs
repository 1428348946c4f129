//! chaetra-core - Core library for chaetra.
//!
//! A domain-agnostic knowledge memory: observations become short-term
//! hypotheses, accumulate evidence, and are promoted to core knowledge,
//! archived, or unlearned as their confidence moves. Confidence is a bounded
//! scalar that can always be recomputed from an item's evidence ledger.
//!
//! # Example
//!
//! ```ignore
//! use chaetra_core::{Chaetra, Evidence, LearningConfig, Statement};
//!
//! let chaetra = Chaetra::new(LearningConfig::default())?;
//! for source in ["scan-1", "scan-2", "scan-3"] {
//!     chaetra
//!         .observe("sector_momentum", Statement::text("tech leads"), "markets", Evidence::supporting(source))
//!         .await?;
//! }
//! let formed = chaetra.form_opinion("sector_momentum")?;
//! assert!(formed.stored);
//! ```

pub mod config;
pub mod confidence;
pub mod engine;
pub mod error;
pub mod events;
pub mod memory;
pub mod opinion;
pub mod persistence;
pub mod runtime;
pub mod sweeper;
pub mod types;
pub mod unlearning;
pub mod validation;

// Re-export commonly used types
pub use config::{LearningConfig, LearningConfigBuilder, OpinionWeights};
pub use confidence::ConfidenceModel;
pub use engine::{Chaetra, FEEDBACK_TAG};
pub use error::{ChaetraError, ChaetraResult, ErrorCode};
pub use events::{EventBus, EventSubscriber, KnowledgeEvent};
pub use memory::{MemoryStore, TransitionRules};
pub use opinion::OpinionEngine;
pub use persistence::{SnapshotStore, SqliteSnapshotStore};
pub use runtime::{BackgroundRuntime, PersistStats, RuntimeConfig};
pub use sweeper::{SweepReport, SweepScheduler, SweepSchedulerConfig, TierSweeper};
pub use types::{
    Evidence, ItemId, KnowledgeItem, KnowledgeQuery, Observation, Opinion, OpinionFormation,
    Polarity, Statement, Tier,
};
pub use unlearning::{ContradictionOutcome, UnlearningController};
pub use validation::{ObserveOutcome, ValidationEngine};
