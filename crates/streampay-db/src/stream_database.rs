use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

use streampay_types::{PersistedStatus, StreamPart, StreamRecord, StreamStore};

use crate::schema::{STREAM_INDEXES, STREAM_PART_TABLE, STREAM_TABLE, ensure_index, ensure_table};

const STREAM_COLUMNS: &str = "id,counterparty_id,price,delay,total_parts,parts_paid,fee,memo,name,created_at,status";

/// SQLite-backed stream store (streams.db).
pub struct SqliteStreamStore {
    conn: Mutex<Connection>,
}

impl SqliteStreamStore {
    /// Open (or create) a stream database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open stream database: {}", path.display()))?;
        Self::init(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        ensure_table(&conn, &STREAM_TABLE).context("Failed to initialize stream schema")?;
        ensure_table(&conn, &STREAM_PART_TABLE)
            .context("Failed to initialize stream part schema")?;
        for index in STREAM_INDEXES {
            ensure_index(&conn, index)?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_record(row: &Row<'_>) -> rusqlite::Result<StreamRecord> {
        let status: String = row.get("status")?;
        let status = status.parse::<PersistedStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, e.into())
        })?;
        Ok(StreamRecord {
            id: row.get("id")?,
            counterparty_id: row.get("counterparty_id")?,
            price: row.get("price")?,
            delay: row.get("delay")?,
            total_parts: row.get("total_parts")?,
            parts_paid: row.get("parts_paid")?,
            fee: row.get("fee")?,
            memo: row.get("memo")?,
            name: row.get("name")?,
            created_at: row.get("created_at")?,
            status,
        })
    }
}

impl StreamStore for SqliteStreamStore {
    fn insert_stream(&self, record: &StreamRecord) -> Result<()> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO stream ({STREAM_COLUMNS}) \
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)"
                ),
                params![
                    record.id,
                    record.counterparty_id,
                    record.price,
                    record.delay,
                    record.total_parts,
                    record.parts_paid,
                    record.fee,
                    record.memo,
                    record.name,
                    record.created_at,
                    record.status.as_str(),
                ],
            )
            .with_context(|| format!("Failed to insert stream {}", record.id))?;
        Ok(())
    }

    fn update_stream_progress(
        &self,
        id: &str,
        parts_paid: u32,
        status: PersistedStatus,
    ) -> Result<()> {
        let changed = self
            .conn()
            .execute(
                "UPDATE stream SET parts_paid = ?1, status = ?2 WHERE id = ?3",
                params![parts_paid, status.as_str(), id],
            )
            .with_context(|| format!("Failed to update stream {id}"))?;
        if changed == 0 {
            anyhow::bail!("stream {id} is not persisted");
        }
        Ok(())
    }

    fn insert_part(&self, part: &StreamPart) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO stream_part (payment_hash, stream_id) VALUES (?1, ?2)",
                params![part.payment_hash, part.stream_id],
            )
            .with_context(|| format!("Failed to insert part for stream {}", part.stream_id))?;
        Ok(())
    }

    fn list_streams(&self) -> Result<Vec<StreamRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {STREAM_COLUMNS} FROM stream ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map([], Self::read_record)?;
        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }
        Ok(records)
    }

    fn get_stream(&self, id: &str) -> Result<Option<StreamRecord>> {
        let conn = self.conn();
        let record = conn
            .query_row(
                &format!("SELECT {STREAM_COLUMNS} FROM stream WHERE id = ?1"),
                [id],
                Self::read_record,
            )
            .optional()?;
        Ok(record)
    }

    fn list_parts(&self, stream_id: &str) -> Result<Vec<StreamPart>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT payment_hash, stream_id FROM stream_part WHERE stream_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map([stream_id], |row| {
            Ok(StreamPart {
                payment_hash: row.get(0)?,
                stream_id: row.get(1)?,
            })
        })?;
        let mut parts = Vec::new();
        for part in rows {
            parts.push(part?);
        }
        Ok(parts)
    }

    fn reset_running_to_paused(&self) -> Result<usize> {
        let changed = self
            .conn()
            .execute(
                "UPDATE stream SET status = ?1 WHERE status = ?2",
                params![
                    PersistedStatus::Paused.as_str(),
                    PersistedStatus::Running.as_str()
                ],
            )
            .context("Failed to reset running streams")?;
        if changed > 0 {
            log::info!("reset {} running stream(s) to paused", changed);
        }
        Ok(changed)
    }
}
