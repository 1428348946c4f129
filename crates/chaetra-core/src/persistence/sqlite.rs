//! SQLite snapshot storage.
//!
//! Items and their ledgers are stored so that confidence replays exactly on
//! load. Ledger rows and opinion history rows are insert-only.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use tracing::debug;

use crate::error::{ChaetraError, ChaetraResult};
use crate::types::{
    CoreBelief, Evidence, ItemId, KnowledgeItem, Opinion, OpinionSnapshot, Polarity, Statement,
    Tier,
};

/// Durable backing for items and opinions.
#[cfg_attr(test, mockall::automock)]
pub trait SnapshotStore: Send + Sync {
    /// Upsert an item row and append any ledger entries not yet stored.
    fn save_item(&self, item: &KnowledgeItem) -> ChaetraResult<()>;

    /// Every stored item with its ledger in applied order.
    fn load_items(&self) -> ChaetraResult<Vec<KnowledgeItem>>;

    /// Upsert an opinion and append its new history entries.
    ///
    /// Returns the number of history rows appended.
    fn record_opinion(&self, opinion: &Opinion) -> ChaetraResult<usize>;

    /// Every stored opinion with its full history.
    fn load_opinions(&self) -> ChaetraResult<Vec<Opinion>>;
}

/// SQLite-backed snapshot store
pub struct SqliteSnapshotStore {
    conn: Mutex<Connection>,
}

impl SqliteSnapshotStore {
    /// Open or create a store at the given path
    pub fn new(path: impl AsRef<Path>) -> ChaetraResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> ChaetraResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> ChaetraResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ChaetraError::database(format!("connection lock poisoned: {}", e)))
    }

    fn init_schema(&self) -> ChaetraResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS knowledge_items (
                id TEXT PRIMARY KEY,
                topic TEXT NOT NULL,
                statement_schema TEXT NOT NULL,
                statement_content TEXT NOT NULL,
                domain TEXT NOT NULL,
                dedup_key TEXT NOT NULL,
                confidence REAL NOT NULL,
                initial_confidence REAL NOT NULL,
                tier TEXT NOT NULL,
                validation_count INTEGER NOT NULL,
                under_review INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                last_updated_at TEXT NOT NULL,
                tags TEXT NOT NULL,
                metadata TEXT NOT NULL,
                removal_reason TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_items_topic ON knowledge_items(topic);
            CREATE INDEX IF NOT EXISTS idx_items_tier ON knowledge_items(tier);
            CREATE INDEX IF NOT EXISTS idx_items_dedup ON knowledge_items(dedup_key);

            CREATE TABLE IF NOT EXISTS evidence_ledger (
                item_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                source TEXT NOT NULL,
                polarity TEXT NOT NULL,
                weight REAL NOT NULL,
                timestamp TEXT NOT NULL,
                applied_boost REAL,
                PRIMARY KEY (item_id, seq),
                FOREIGN KEY (item_id) REFERENCES knowledge_items(id)
            );

            CREATE TABLE IF NOT EXISTS opinions (
                topic TEXT PRIMARY KEY,
                statement_schema TEXT NOT NULL,
                statement_content TEXT NOT NULL,
                confidence REAL NOT NULL,
                supporting_items TEXT NOT NULL,
                contradicting_items TEXT NOT NULL,
                formed_at TEXT NOT NULL,
                last_updated TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS opinion_history (
                topic TEXT NOT NULL,
                seq INTEGER NOT NULL,
                confidence REAL NOT NULL,
                statement_schema TEXT NOT NULL,
                statement_content TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                PRIMARY KEY (topic, seq),
                FOREIGN KEY (topic) REFERENCES opinions(topic)
            );
        "#,
        )?;
        Ok(())
    }

    fn ledger_for(conn: &Connection, item_id: &str) -> ChaetraResult<Vec<Evidence>> {
        let mut stmt = conn.prepare(
            "SELECT source, polarity, weight, timestamp, applied_boost FROM evidence_ledger
             WHERE item_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt
            .query_map(params![item_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<f64>>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(source, polarity, weight, timestamp, applied_boost)| -> ChaetraResult<Evidence> {
                Ok(Evidence {
                    source,
                    polarity: parse_enum::<Polarity>(&polarity)?,
                    weight,
                    timestamp: parse_time(&timestamp)?,
                    applied_boost,
                })
            })
            .collect()
    }

    fn history_for(conn: &Connection, topic: &str) -> ChaetraResult<Vec<OpinionSnapshot>> {
        let mut stmt = conn.prepare(
            "SELECT confidence, statement_schema, statement_content, timestamp
             FROM opinion_history WHERE topic = ?1 ORDER BY seq",
        )?;
        let rows = stmt
            .query_map(params![topic], |row| {
                Ok((
                    row.get::<_, f64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(confidence, schema, content, timestamp)| -> ChaetraResult<OpinionSnapshot> {
                Ok(OpinionSnapshot {
                    confidence,
                    statement: Statement::new(schema, content),
                    timestamp: parse_time(&timestamp)?,
                })
            })
            .collect()
    }
}

/// Raw `knowledge_items` row before decoding.
struct ItemRow {
    id: String,
    topic: String,
    schema: String,
    content: String,
    domain: String,
    confidence: f64,
    initial_confidence: f64,
    tier: String,
    validation_count: u32,
    under_review: bool,
    created_at: String,
    last_updated_at: String,
    tags: String,
    metadata: String,
    removal_reason: Option<String>,
}

impl SnapshotStore for SqliteSnapshotStore {
    fn save_item(&self, item: &KnowledgeItem) -> ChaetraResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let id = item.id.to_string();

        tx.execute(
            r#"
            INSERT OR REPLACE INTO knowledge_items (
                id, topic, statement_schema, statement_content, domain, dedup_key,
                confidence, initial_confidence, tier, validation_count, under_review,
                created_at, last_updated_at, tags, metadata, removal_reason
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                id,
                item.topic,
                item.statement.schema,
                item.statement.content,
                item.domain,
                item.dedup_key(),
                item.confidence,
                item.initial_confidence,
                item.tier.to_string(),
                item.validation_count,
                item.under_review,
                format_time(item.created_at),
                format_time(item.last_updated_at),
                serde_json::to_string(&item.tags)?,
                serde_json::to_string(&item.metadata)?,
                item.removal_reason,
            ],
        )?;

        let stored: i64 = tx.query_row(
            "SELECT COUNT(*) FROM evidence_ledger WHERE item_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        let stored = stored as usize;
        if stored > item.evidence.len() {
            return Err(ChaetraError::database(format!(
                "ledger for item '{}' has {} stored entries but only {} in memory",
                id,
                stored,
                item.evidence.len()
            )));
        }

        for (seq, evidence) in item.evidence.iter().enumerate().skip(stored) {
            tx.execute(
                "INSERT INTO evidence_ledger
                    (item_id, seq, source, polarity, weight, timestamp, applied_boost)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    seq as i64,
                    evidence.source,
                    evidence.polarity.to_string(),
                    evidence.weight,
                    format_time(evidence.timestamp),
                    evidence.applied_boost,
                ],
            )?;
        }

        tx.commit()?;
        debug!(item_id = %item.id, appended = item.evidence.len() - stored, "Saved item snapshot");
        Ok(())
    }

    fn load_items(&self) -> ChaetraResult<Vec<KnowledgeItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, topic, statement_schema, statement_content, domain, confidence,
                   initial_confidence, tier, validation_count, under_review, created_at,
                   last_updated_at, tags, metadata, removal_reason
            FROM knowledge_items ORDER BY created_at, id
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ItemRow {
                    id: row.get(0)?,
                    topic: row.get(1)?,
                    schema: row.get(2)?,
                    content: row.get(3)?,
                    domain: row.get(4)?,
                    confidence: row.get(5)?,
                    initial_confidence: row.get(6)?,
                    tier: row.get(7)?,
                    validation_count: row.get(8)?,
                    under_review: row.get(9)?,
                    created_at: row.get(10)?,
                    last_updated_at: row.get(11)?,
                    tags: row.get(12)?,
                    metadata: row.get(13)?,
                    removal_reason: row.get(14)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let evidence = Self::ledger_for(&conn, &row.id)?;
            let metadata: HashMap<String, serde_json::Value> = serde_json::from_str(&row.metadata)?;
            items.push(KnowledgeItem {
                id: ItemId::from_str(&row.id)
                    .map_err(|e| ChaetraError::database(format!("bad item id '{}': {}", row.id, e)))?,
                topic: row.topic,
                statement: Statement::new(row.schema, row.content),
                domain: row.domain,
                confidence: row.confidence,
                initial_confidence: row.initial_confidence,
                tier: parse_enum::<Tier>(&row.tier)?,
                validation_count: row.validation_count,
                under_review: row.under_review,
                created_at: parse_time(&row.created_at)?,
                last_updated_at: parse_time(&row.last_updated_at)?,
                evidence,
                tags: serde_json::from_str(&row.tags)?,
                metadata,
                removal_reason: row.removal_reason,
            });
        }
        Ok(items)
    }

    fn record_opinion(&self, opinion: &Opinion) -> ChaetraResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT OR REPLACE INTO opinions (
                topic, statement_schema, statement_content, confidence,
                supporting_items, contradicting_items, formed_at, last_updated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                opinion.topic,
                opinion.core_belief.statement.schema,
                opinion.core_belief.statement.content,
                opinion.core_belief.confidence,
                serde_json::to_string(&opinion.supporting_items)?,
                serde_json::to_string(&opinion.contradicting_items)?,
                format_time(opinion.formed_at),
                format_time(opinion.last_updated),
            ],
        )?;

        let stored: i64 = tx.query_row(
            "SELECT COUNT(*) FROM opinion_history WHERE topic = ?1",
            params![opinion.topic],
            |row| row.get(0),
        )?;
        let stored = stored as usize;

        let mut appended = 0;
        for (seq, snapshot) in opinion.history.iter().enumerate().skip(stored) {
            tx.execute(
                "INSERT INTO opinion_history
                    (topic, seq, confidence, statement_schema, statement_content, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    opinion.topic,
                    seq as i64,
                    snapshot.confidence,
                    snapshot.statement.schema,
                    snapshot.statement.content,
                    format_time(snapshot.timestamp),
                ],
            )?;
            appended += 1;
        }

        tx.commit()?;
        Ok(appended)
    }

    fn load_opinions(&self) -> ChaetraResult<Vec<Opinion>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT topic, statement_schema, statement_content, confidence,
                   supporting_items, contradicting_items, formed_at, last_updated
            FROM opinions ORDER BY topic
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut opinions = Vec::with_capacity(rows.len());
        for (topic, schema, content, confidence, supporting, contradicting, formed, updated) in rows {
            let history = Self::history_for(&conn, &topic)?;
            opinions.push(Opinion {
                topic,
                core_belief: CoreBelief {
                    statement: Statement::new(schema, content),
                    confidence,
                },
                supporting_items: serde_json::from_str(&supporting)?,
                contradicting_items: serde_json::from_str(&contradicting)?,
                history,
                formed_at: parse_time(&formed)?,
                last_updated: parse_time(&updated)?,
            });
        }
        Ok(opinions)
    }
}

fn format_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(raw: &str) -> ChaetraResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ChaetraError::database(format!("bad timestamp '{}': {}", raw, e)))
}

fn parse_enum<T: FromStr>(raw: &str) -> ChaetraResult<T> {
    T::from_str(raw).map_err(|_| ChaetraError::database(format!("unknown value '{}'", raw)))
}
