//! JSON Lines export and import.
//!
//! One JSON object per line. Exported items carry their full ledger, so an
//! import can verify confidence by replay. The importer is generic over the
//! record type, which lets the same reader feed observation logs.

use std::future::Future;

use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufWriter};

use crate::error::ChaetraResult;
use crate::types::KnowledgeItem;

/// Statistics from an export operation.
#[derive(Debug, Default, Clone)]
pub struct ExportStats {
    /// Total items processed.
    pub total: u64,
    /// Successfully exported items.
    pub exported: u64,
    /// Error messages for failed exports.
    pub errors: Vec<String>,
}

impl ExportStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if export completed without errors.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.total == self.exported
    }
}

/// Statistics from an import operation.
#[derive(Debug, Default, Clone)]
pub struct ImportStats {
    /// Non-empty lines read.
    pub total: u64,
    /// Records accepted by the batch callback.
    pub imported: u64,
    /// Parsed records the callback declined (duplicates, ...).
    pub skipped: u64,
    /// Error messages for failed lines or batches.
    pub errors: Vec<String>,
}

impl ImportStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if import completed without errors.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    fn record_batch(&mut self, size: usize, result: ChaetraResult<usize>) {
        match result {
            Ok(count) => {
                self.imported += count as u64;
                self.skipped += size.saturating_sub(count) as u64;
            }
            Err(e) => self.errors.push(format!("Batch import error: {}", e)),
        }
    }
}

/// Export items to JSON Lines.
///
/// Write failures are recorded per item and do not stop the export.
pub async fn export_jsonl<W, S>(items: S, writer: W) -> ChaetraResult<ExportStats>
where
    W: AsyncWrite + Unpin,
    S: Stream<Item = KnowledgeItem>,
{
    let mut stats = ExportStats::new();
    let mut writer = BufWriter::new(writer);
    let mut items = std::pin::pin!(items);

    while let Some(item) = items.next().await {
        stats.total += 1;

        let mut line = match serde_json::to_string(&item) {
            Ok(json) => json,
            Err(e) => {
                stats
                    .errors
                    .push(format!("Serialization error for item {}: {}", item.id, e));
                continue;
            }
        };
        line.push('\n');

        if let Err(e) = writer.write_all(line.as_bytes()).await {
            stats
                .errors
                .push(format!("Write error for item {}: {}", item.id, e));
            continue;
        }
        stats.exported += 1;
    }

    if let Err(e) = writer.flush().await {
        stats.errors.push(format!("Final flush error: {}", e));
    }

    Ok(stats)
}

/// Import JSON Lines records in batches.
///
/// Malformed lines are recorded as errors but don't abort the import.
/// `import_batch` returns how many records of the batch it accepted.
pub async fn import_jsonl<T, R, F, Fut>(
    reader: R,
    batch_size: usize,
    mut import_batch: F,
) -> ChaetraResult<ImportStats>
where
    T: DeserializeOwned,
    R: AsyncBufRead + Unpin,
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = ChaetraResult<usize>>,
{
    let batch_size = batch_size.max(1);
    let mut stats = ImportStats::new();
    let mut batch = Vec::with_capacity(batch_size);
    let mut lines = reader.lines();

    while let Some(raw) = lines.next_line().await? {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        stats.total += 1;

        match serde_json::from_str::<T>(line) {
            Ok(record) => {
                batch.push(record);
                if batch.len() >= batch_size {
                    let size = batch.len();
                    let result = import_batch(std::mem::take(&mut batch)).await;
                    stats.record_batch(size, result);
                }
            }
            Err(e) => {
                stats
                    .errors
                    .push(format!("Parse error at line {}: {}", stats.total, e));
            }
        }
    }

    if !batch.is_empty() {
        let size = batch.len();
        let result = import_batch(batch).await;
        stats.record_batch(size, result);
    }

    Ok(stats)
}
