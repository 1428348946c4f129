//! Core types for chaetra.

mod evidence;
mod filter;
mod knowledge_item;
mod observation;
mod opinion;
mod tier;

pub use evidence::{Evidence, Polarity};
pub use filter::KnowledgeQuery;
pub use knowledge_item::{dedup_key, ItemId, KnowledgeItem, Statement};
pub use observation::Observation;
pub use opinion::{CoreBelief, Opinion, OpinionFormation, OpinionSnapshot};
pub use tier::Tier;
