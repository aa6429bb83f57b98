#![forbid(unsafe_code)]

mod error;
mod schema;

pub use error::StoreError;

use crate::pipeline::PipelineError;
use crate::sync::SyncState;
use pf_core::envelope;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use sha2::Digest as _;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DB_FILE: &str = "pf_sync.db";
const LOCAL_SLOT: &str = "local";
const SYNC_LEASE_KEY: &str = "sync_lease";

/// How long a sync lease holds before another handle may take it over.
pub const SYNC_LEASE_TTL_MS: u64 = 10 * 60 * 1000;

/// The device's persisted clocks. `remote` is never stored; it is read from the remote meta
/// at the start of each sync attempt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalClock {
    pub local_ms: u64,
    pub last_sync_ms: u64,
    pub model_version: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredSnapshot {
    pub sealed: String,
    pub digest: String,
    pub model_version: f64,
    pub updated_at_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncLogEntry {
    pub seq: i64,
    pub ts_ms: u64,
    pub disposition: String,
    pub detail: Option<String>,
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join(DB_FILE);
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;

        schema::preflight_gate(&conn)?;
        schema::install_schema(&conn, to_sqlite_i64(crate::time::now_ms())?)?;

        Ok(Self { conn, storage_dir })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn clock(&self) -> Result<LocalClock, StoreError> {
        read_clock(&self.conn)
    }

    /// Advances the local clock for a write at `ts_ms`. The clock never stands still: a write
    /// in the same millisecond as the previous one still moves it forward.
    pub fn record_local_write(&mut self, ts_ms: u64) -> Result<LocalClock, StoreError> {
        let tx = self.conn.transaction()?;
        bump_local(&tx, ts_ms)?;
        let clock = read_clock(&tx)?;
        tx.commit()?;
        Ok(clock)
    }

    /// Both sides now hold the data stamped `ts_ms`.
    pub fn record_synced(&mut self, ts_ms: u64) -> Result<LocalClock, StoreError> {
        write_clock(&self.conn, Some(ts_ms), Some(ts_ms))?;
        read_clock(&self.conn)
    }

    pub fn set_local_clock(&mut self, ts_ms: u64) -> Result<LocalClock, StoreError> {
        write_clock(&self.conn, Some(ts_ms), None)?;
        read_clock(&self.conn)
    }

    /// Stores sealed envelope text as the local snapshot and returns its digest.
    pub fn save_sealed(&mut self, sealed: &str, now_ms: u64) -> Result<String, StoreError> {
        save_sealed(&self.conn, sealed, now_ms)
    }

    pub fn load_sealed(&self) -> Result<Option<StoredSnapshot>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT sealed, digest, model_version, updated_at_ms FROM snapshots WHERE slot=?1",
                params![LOCAL_SLOT],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((sealed, digest, model_version, updated_at_ms)) = row else {
            return Ok(None);
        };
        let actual = sha256_hex(&sealed);
        if actual != digest {
            return Err(StoreError::DigestMismatch {
                expected: digest,
                actual,
            });
        }
        Ok(Some(StoredSnapshot {
            sealed,
            digest,
            model_version,
            updated_at_ms: from_sqlite_u64(updated_at_ms)?,
        }))
    }

    /// Saves a locally produced snapshot and advances the local clock in one transaction.
    pub fn commit_local_change(
        &mut self,
        sealed: &str,
        ts_ms: u64,
    ) -> Result<LocalClock, StoreError> {
        let tx = self.conn.transaction()?;
        save_sealed(&tx, sealed, ts_ms)?;
        bump_local(&tx, ts_ms)?;
        let clock = read_clock(&tx)?;
        tx.commit()?;
        Ok(clock)
    }

    /// Saves a snapshot taken from the remote and adopts the remote's clock as both the local
    /// and the last-sync clock, in one transaction.
    pub fn commit_pulled(
        &mut self,
        sealed: &str,
        remote_ms: u64,
        now_ms: u64,
    ) -> Result<LocalClock, StoreError> {
        let tx = self.conn.transaction()?;
        save_sealed(&tx, sealed, now_ms)?;
        write_clock(&tx, Some(remote_ms), Some(remote_ms))?;
        let clock = read_clock(&tx)?;
        tx.commit()?;
        Ok(clock)
    }

    /// Takes the store's sync lease, or reports the attempt already holding it. A lease older
    /// than [`SYNC_LEASE_TTL_MS`] is treated as abandoned.
    pub fn begin_sync(&mut self, now_ms: u64) -> Result<SyncState, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let held = tx
            .query_row(
                "SELECT value FROM meta WHERE key=?1",
                params![SYNC_LEASE_KEY],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .and_then(|value| value.parse::<u64>().ok());
        let current = match held {
            Some(started_at_ms) if now_ms.saturating_sub(started_at_ms) < SYNC_LEASE_TTL_MS => {
                SyncState::InProgress { started_at_ms }
            }
            Some(started_at_ms) => {
                tracing::warn!(started_at_ms, "taking over an abandoned sync lease");
                SyncState::Idle
            }
            None => SyncState::Idle,
        };
        let next = current.begin(now_ms)?;
        tx.execute(
            "INSERT INTO meta(key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![SYNC_LEASE_KEY, now_ms.to_string()],
        )?;
        tx.commit()?;
        Ok(next)
    }

    /// Releases the lease taken by `begin_sync`. A lease someone else took over is left alone.
    pub fn finish_sync(&mut self, state: SyncState) -> Result<SyncState, StoreError> {
        if let SyncState::InProgress { started_at_ms } = state {
            self.conn.execute(
                "DELETE FROM meta WHERE key=?1 AND value=?2",
                params![SYNC_LEASE_KEY, started_at_ms.to_string()],
            )?;
        }
        Ok(state.finish())
    }

    pub fn append_sync_log(
        &self,
        ts_ms: u64,
        disposition: &str,
        detail: Option<&str>,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO sync_log(ts_ms, disposition, detail) VALUES (?1, ?2, ?3)",
            params![to_sqlite_i64(ts_ms)?, disposition, detail],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent entries first.
    pub fn sync_log(&self, limit: usize) -> Result<Vec<SyncLogEntry>, StoreError> {
        let limit = i64::try_from(limit).map_err(|_| StoreError::InvalidInput("numeric overflow"))?;
        let mut stmt = self.conn.prepare(
            "SELECT seq, ts_ms, disposition, detail FROM sync_log ORDER BY seq DESC LIMIT ?1",
        )?;
        let mut rows = stmt.query(params![limit])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(SyncLogEntry {
                seq: row.get(0)?,
                ts_ms: from_sqlite_u64(row.get(1)?)?,
                disposition: row.get(2)?,
                detail: row.get(3)?,
            });
        }
        Ok(out)
    }
}

fn read_clock(conn: &Connection) -> Result<LocalClock, StoreError> {
    let (local_ms, last_sync_ms, model_version) = conn
        .query_row(
            "SELECT local_ms, last_sync_ms, model_version FROM sync_clock WHERE singleton=1",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            },
        )
        .optional()?
        .ok_or(StoreError::InvalidInput("RESET_REQUIRED: clock row is missing"))?;

    Ok(LocalClock {
        local_ms: from_sqlite_u64(local_ms)?,
        last_sync_ms: from_sqlite_u64(last_sync_ms)?,
        model_version,
    })
}

fn write_clock(
    conn: &Connection,
    local_ms: Option<u64>,
    last_sync_ms: Option<u64>,
) -> Result<(), StoreError> {
    let local_ms = local_ms.map(to_sqlite_i64).transpose()?;
    let last_sync_ms = last_sync_ms.map(to_sqlite_i64).transpose()?;
    conn.execute(
        "UPDATE sync_clock SET local_ms=COALESCE(?1, local_ms), last_sync_ms=COALESCE(?2, last_sync_ms), \
         updated_at_ms=?3 WHERE singleton=1",
        params![local_ms, last_sync_ms, to_sqlite_i64(crate::time::now_ms())?],
    )?;
    Ok(())
}

fn bump_local(conn: &Connection, ts_ms: u64) -> Result<(), StoreError> {
    let current = read_clock(conn)?.local_ms;
    let next = ts_ms.max(current.saturating_add(1));
    write_clock(conn, Some(next), None)
}

fn save_sealed(conn: &Connection, sealed: &str, now_ms: u64) -> Result<String, StoreError> {
    let model_version = envelope::decode(sealed)
        .map_err(PipelineError::from)?
        .model_version;
    let digest = sha256_hex(sealed);
    let now = to_sqlite_i64(now_ms)?;

    conn.execute(
        "INSERT INTO snapshots(slot, sealed, digest, model_version, updated_at_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5) \
         ON CONFLICT(slot) DO UPDATE SET sealed=excluded.sealed, digest=excluded.digest, \
         model_version=excluded.model_version, updated_at_ms=excluded.updated_at_ms",
        params![LOCAL_SLOT, sealed, digest, model_version, now],
    )?;
    conn.execute(
        "UPDATE sync_clock SET model_version=?1, updated_at_ms=?2 WHERE singleton=1",
        params![model_version, now],
    )?;
    Ok(digest)
}

fn sha256_hex(text: &str) -> String {
    let digest = sha2::Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(64);
    for b in digest {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn to_sqlite_i64(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::InvalidInput("numeric overflow"))
}

fn from_sqlite_u64(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::InvalidInput("negative timestamp in storage"))
}
