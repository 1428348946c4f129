//! Event system for knowledge lifecycle events.

mod bus;
mod event;

pub use bus::{EventBus, EventSubscriber};
pub use event::KnowledgeEvent;
