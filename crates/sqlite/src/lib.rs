//! SQLite-backed `VersionStore`.
//!
//! One table, `prompt_versions`, keyed by `(prompt_id, version)`. Writes run
//! inside `IMMEDIATE` transactions and the status change is a guarded
//! `UPDATE ... WHERE status = ?` so that the compare-and-set holds even when
//! several processes share the database file.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use promptgate_storage::{
    now_rfc3339, validate_key, ApprovalStatus, StatusUpdate, StorageError, Transition,
    VersionRecord, VersionStore,
};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS prompt_versions (
    prompt_id   TEXT NOT NULL,
    version     TEXT NOT NULL,
    prompt_text TEXT NOT NULL,
    status      TEXT NOT NULL CHECK (status IN ('Pending', 'Approved', 'Rejected')),
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    PRIMARY KEY (prompt_id, version)
);
";

/// Milliseconds a writer waits on a locked database before giving up.
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Errors raised by the SQLite backend before they are folded into
/// [`StorageError::Backend`].
#[derive(Debug, thiserror::Error)]
pub enum SqliteStoreError {
    #[error("sqlite error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("connection lock poisoned")]
    Poisoned,

    #[error("blocking task failed: {0}")]
    Join(String),
}

impl From<SqliteStoreError> for StorageError {
    fn from(err: SqliteStoreError) -> Self {
        StorageError::Backend(err.to_string())
    }
}

/// A `VersionStore` persisted in a single SQLite database.
///
/// The connection is shared behind a mutex and every call runs on tokio's
/// blocking pool.
#[derive(Clone)]
pub struct SqliteVersionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVersionStore {
    /// Open (or create) a database file and apply the schema.
    pub fn open(path: &Path) -> Result<Self, SqliteStoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        Self::init(conn)
    }

    /// Private in-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, SqliteStoreError> {
        conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteVersionStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| SqliteStoreError::Poisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| SqliteStoreError::Join(e.to_string()))?
    }
}

fn backend(err: rusqlite::Error) -> StorageError {
    SqliteStoreError::Db(err).into()
}

fn parse_status(raw: &str) -> Result<ApprovalStatus, StorageError> {
    raw.parse::<ApprovalStatus>()
        .map_err(|e| SqliteStoreError::Corrupt(e).into())
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<(VersionRecord, String)> {
    let status: String = row.get(3)?;
    Ok((
        VersionRecord {
            prompt_id: row.get(0)?,
            version: row.get(1)?,
            prompt_text: row.get(2)?,
            status: ApprovalStatus::Pending,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        },
        status,
    ))
}

fn finish_record(
    (mut record, status): (VersionRecord, String),
) -> Result<VersionRecord, StorageError> {
    record.status = parse_status(&status)?;
    Ok(record)
}

#[async_trait]
impl VersionStore for SqliteVersionStore {
    async fn put(&self, record: VersionRecord) -> Result<(), StorageError> {
        validate_key(&record.prompt_id, &record.version)?;
        self.with_conn(move |conn| {
            let result = conn.execute(
                "INSERT INTO prompt_versions
                     (prompt_id, version, prompt_text, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.prompt_id,
                    record.version,
                    record.prompt_text,
                    record.status.as_str(),
                    record.created_at,
                    record.updated_at,
                ],
            );
            match result {
                Ok(_) => Ok(()),
                Err(e) if is_constraint_violation(&e) => Err(StorageError::duplicate(
                    &record.prompt_id,
                    &record.version,
                )),
                Err(e) => Err(backend(e)),
            }
        })
        .await
    }

    async fn update_status(
        &self,
        prompt_id: &str,
        version: &str,
        new_status: ApprovalStatus,
    ) -> Result<StatusUpdate, StorageError> {
        let prompt_id = prompt_id.to_string();
        let version = version.to_string();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(backend)?;

            let current: Option<String> = tx
                .query_row(
                    "SELECT status FROM prompt_versions WHERE prompt_id = ?1 AND version = ?2",
                    params![prompt_id, version],
                    |row| row.get(0),
                )
                .optional()
                .map_err(backend)?;
            let previous = match current {
                Some(raw) => parse_status(&raw)?,
                None => return Err(StorageError::not_found(&prompt_id, &version)),
            };

            match previous.transition_to(new_status) {
                Transition::Apply => {
                    let changed = tx
                        .execute(
                            "UPDATE prompt_versions SET status = ?1, updated_at = ?2
                             WHERE prompt_id = ?3 AND version = ?4 AND status = ?5",
                            params![
                                new_status.as_str(),
                                now_rfc3339(),
                                prompt_id,
                                version,
                                previous.as_str(),
                            ],
                        )
                        .map_err(backend)?;
                    if changed != 1 {
                        // The row moved between the read and the guarded write.
                        return Err(StorageError::Backend(format!(
                            "status of {prompt_id}/{version} changed concurrently"
                        )));
                    }
                    tx.commit().map_err(backend)?;
                    tracing::debug!(
                        prompt_id = %prompt_id,
                        version = %version,
                        from = %previous,
                        to = %new_status,
                        "status updated"
                    );
                    Ok(StatusUpdate {
                        previous,
                        current: new_status,
                        changed: true,
                    })
                }
                Transition::Unchanged => Ok(StatusUpdate {
                    previous,
                    current: previous,
                    changed: false,
                }),
                Transition::Conflict => Err(StorageError::Conflict {
                    prompt_id,
                    version,
                    current: previous,
                    requested: new_status,
                }),
            }
        })
        .await
    }

    async fn get(&self, prompt_id: &str, version: &str) -> Result<VersionRecord, StorageError> {
        let prompt_id = prompt_id.to_string();
        let version = version.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT prompt_id, version, prompt_text, status, created_at, updated_at
                     FROM prompt_versions WHERE prompt_id = ?1 AND version = ?2",
                    params![prompt_id, version],
                    row_to_record,
                )
                .optional()
                .map_err(backend)?;
            match row {
                Some(row) => finish_record(row),
                None => Err(StorageError::not_found(&prompt_id, &version)),
            }
        })
        .await
    }

    async fn list(
        &self,
        prompt_id: &str,
        status_filter: Option<ApprovalStatus>,
    ) -> Result<Vec<VersionRecord>, StorageError> {
        let prompt_id = prompt_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT prompt_id, version, prompt_text, status, created_at, updated_at
                     FROM prompt_versions
                     WHERE prompt_id = ?1 AND (?2 IS NULL OR status = ?2)
                     ORDER BY version",
                )
                .map_err(backend)?;
            let rows = stmt
                .query_map(
                    params![prompt_id, status_filter.map(ApprovalStatus::as_str)],
                    row_to_record,
                )
                .map_err(backend)?;
            let mut records = Vec::new();
            for row in rows {
                records.push(finish_record(row.map_err(backend)?)?);
            }
            Ok(records)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn corrupt_status_is_reported_not_panicked() {
        let store = SqliteVersionStore::open_in_memory().unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute_batch(
                "DROP TABLE prompt_versions;
                 CREATE TABLE prompt_versions (
                     prompt_id TEXT, version TEXT, prompt_text TEXT,
                     status TEXT, created_at TEXT, updated_at TEXT,
                     PRIMARY KEY (prompt_id, version));
                 INSERT INTO prompt_versions VALUES ('p1', '1', 't', 'Maybe', 'x', 'x');",
            )
            .unwrap();
        }
        let err = store.get("p1", "1").await.unwrap_err();
        assert!(matches!(err, StorageError::Backend(ref m) if m.contains("corrupt")));
    }

    #[tokio::test]
    async fn schema_check_rejects_unknown_status() {
        let store = SqliteVersionStore::open_in_memory().unwrap();
        let mut record = VersionRecord::pending("p1", "1", "t");
        record.status = ApprovalStatus::Approved;
        store.put(record).await.unwrap();

        let conn = store.conn.lock().unwrap();
        let result = conn.execute(
            "UPDATE prompt_versions SET status = 'Archived' WHERE prompt_id = 'p1'",
            [],
        );
        assert!(result.is_err());
    }
}
