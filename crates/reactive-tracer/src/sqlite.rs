//! SQLite-backed trace store

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, Row};

use crate::error::{Result, TraceError};
use crate::message::{Message, MessageFilter, TraceLevel, TracerRecord};
use crate::store::TraceStore;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tracers (
        uuid          TEXT PRIMARY KEY NOT NULL,
        path          TEXT NOT NULL,
        application   TEXT NOT NULL,
        key           TEXT NOT NULL,
        instance_uuid TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS messages (
        seq         INTEGER PRIMARY KEY AUTOINCREMENT,
        uuid        TEXT NOT NULL UNIQUE,
        tracer_uuid TEXT NOT NULL REFERENCES tracers(uuid) ON DELETE CASCADE,
        path        TEXT NOT NULL,
        text        TEXT NOT NULL,
        level       TEXT NOT NULL,
        timestamp   TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_messages_tracer ON messages(tracer_uuid, seq);
";

/// Ids bound per DELETE statement, well under SQLite's variable limit
const DELETE_BATCH: usize = 500;

const MESSAGE_COLUMNS: &str = "uuid, tracer_uuid, path, text, level, timestamp";

/// Trace store persisted in a SQLite database
pub struct SqliteTraceStore {
    conn: Mutex<Connection>,
}

impl SqliteTraceStore {
    /// Open (or create) a database file and migrate it
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(TraceError::storage("open", path.display().to_string()))?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory database and migrate it
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(TraceError::storage("open", ":memory:"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(TraceError::storage("pragma", "foreign_keys"))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let level: String = row.get(4)?;
    let timestamp: String = row.get(5)?;
    let level = TraceLevel::parse(&level).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("unknown trace level '{}'", level).into(),
        )
    })?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    Ok(Message {
        uuid: row.get(0)?,
        tracer_uuid: row.get(1)?,
        path: row.get(2)?,
        text: row.get(3)?,
        level,
        persist_to_disk: true,
        timestamp,
    })
}

fn insert_messages(conn: &Connection, messages: &[Message]) -> Result<()> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "INSERT INTO messages ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            MESSAGE_COLUMNS
        ))
        .map_err(TraceError::storage("create_messages", "messages"))?;
    for message in messages {
        stmt.execute(params![
            message.uuid,
            message.tracer_uuid,
            message.path,
            message.text,
            message.level.as_str(),
            message.timestamp.to_rfc3339(),
        ])
        .map_err(TraceError::storage("create_messages", message.uuid.clone()))?;
    }
    Ok(())
}

fn delete_by_ids(conn: &Connection, ids: &[String]) -> Result<usize> {
    let mut deleted = 0;
    for chunk in ids.chunks(DELETE_BATCH) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        deleted += conn
            .execute(
                &format!("DELETE FROM messages WHERE uuid IN ({})", placeholders),
                params_from_iter(chunk.iter()),
            )
            .map_err(TraceError::storage(
                "delete_messages",
                format!("{} messages", ids.len()),
            ))?;
    }
    Ok(deleted)
}

fn select_messages(conn: &Connection, filter: &MessageFilter) -> Result<Vec<Message>> {
    // SQLite treats a negative LIMIT as unbounded
    let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
    let target = filter.tracer_uuid.clone().unwrap_or_else(|| "*".to_string());

    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM messages
             WHERE (?1 IS NULL OR tracer_uuid = ?1)
             ORDER BY seq ASC
             LIMIT ?2",
            MESSAGE_COLUMNS
        ))
        .map_err(TraceError::storage("find_messages", target.clone()))?;
    let rows = stmt
        .query_map(params![filter.tracer_uuid, limit], message_from_row)
        .map_err(TraceError::storage("find_messages", target.clone()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(TraceError::storage("find_messages", target))
}

impl TraceStore for SqliteTraceStore {
    fn migrate(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(SCHEMA)
            .map_err(TraceError::storage("migrate", "tracers,messages"))
    }

    fn create_tracer(&self, record: &TracerRecord) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO tracers (uuid, path, application, key, instance_uuid)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.uuid,
                    record.path,
                    record.application,
                    record.key,
                    record.instance_uuid
                ],
            )
            .map_err(TraceError::storage("create_tracer", record.uuid.clone()))?;
        Ok(())
    }

    fn update_tracer(&self, record: &TracerRecord) -> Result<()> {
        let changed = self
            .conn
            .lock()
            .execute(
                "UPDATE tracers SET path = ?2, application = ?3, key = ?4, instance_uuid = ?5
                 WHERE uuid = ?1",
                params![
                    record.uuid,
                    record.path,
                    record.application,
                    record.key,
                    record.instance_uuid
                ],
            )
            .map_err(TraceError::storage("update_tracer", record.uuid.clone()))?;
        if changed == 0 {
            return Err(TraceError::Storage {
                operation: "update_tracer",
                target: record.uuid.clone(),
                message: "tracer not found".to_string(),
            });
        }
        Ok(())
    }

    fn delete_tracer(&self, uuid: &str) -> Result<()> {
        self.conn
            .lock()
            .execute("DELETE FROM tracers WHERE uuid = ?1", params![uuid])
            .map_err(TraceError::storage("delete_tracer", uuid))?;
        Ok(())
    }

    fn tracers(&self) -> Result<Vec<TracerRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT uuid, path, application, key, instance_uuid FROM tracers ORDER BY rowid")
            .map_err(TraceError::storage("tracers", "tracers"))?;
        let records = stmt
            .query_map([], |row| {
                Ok(TracerRecord {
                    uuid: row.get(0)?,
                    path: row.get(1)?,
                    application: row.get(2)?,
                    key: row.get(3)?,
                    instance_uuid: row.get(4)?,
                    messages: Vec::new(),
                })
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(TraceError::storage("tracers", "tracers"))?;

        records
            .into_iter()
            .map(|mut record| {
                record.messages = select_messages(&conn, &MessageFilter::tracer(&record.uuid))?;
                Ok(record)
            })
            .collect()
    }

    fn create_messages(&self, messages: &[Message]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(TraceError::storage("create_messages", "begin"))?;
        insert_messages(&tx, messages)?;
        tx.commit()
            .map_err(TraceError::storage("create_messages", "commit"))
    }

    fn find_messages(&self, filter: &MessageFilter) -> Result<Vec<Message>> {
        select_messages(&self.conn.lock(), filter)
    }

    fn count_messages(&self, tracer_uuid: &str) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row(
                "SELECT COUNT(*) FROM messages WHERE tracer_uuid = ?1",
                params![tracer_uuid],
                |row| row.get(0),
            )
            .map_err(TraceError::storage("count_messages", tracer_uuid))?;
        Ok(count as usize)
    }

    fn delete_messages(&self, ids: &[String]) -> Result<usize> {
        delete_by_ids(&self.conn.lock(), ids)
    }

    fn apply_retention(&self, evict: &[String], insert: &[Message]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(TraceError::storage("apply_retention", "begin"))?;
        delete_by_ids(&tx, evict)?;
        insert_messages(&tx, insert)?;
        tx.commit()
            .map_err(TraceError::storage("apply_retention", "commit"))
    }
}
