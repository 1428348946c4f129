//! Durable snapshots and JSON Lines interchange.

mod jsonl;
mod sqlite;

pub use jsonl::{export_jsonl, import_jsonl, ExportStats, ImportStats};
#[cfg(test)]
pub use sqlite::MockSnapshotStore;
pub use sqlite::{SnapshotStore, SqliteSnapshotStore};
