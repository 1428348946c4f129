//! Tiered knowledge memory: the concurrent store and its tier rules.

mod store;
mod transitions;

pub use store::{MemoryStore, Upsert};
pub use transitions::{apply_transition, TransitionRules};
