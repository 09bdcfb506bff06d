//! SQLite implementation of [`RelationalStore`] with a small lazy pool.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::{ToSql, ToSqlOutput, Value};
use rusqlite::{Connection, ErrorCode, OpenFlags, params_from_iter};
use simracing_telemetry_errors::{SinkError, SinkErrorKind, SinkResult};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::relational::{InsertRow, RelationalStore, StoreValue, TableSpec};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed connection pool bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolPolicy {
    pub max_open: usize,
    pub max_idle: usize,
    pub max_lifetime: Duration,
}

impl PoolPolicy {
    pub const DEFAULT: PoolPolicy = PoolPolicy {
        max_open: 10,
        max_idle: 10,
        max_lifetime: Duration::from_secs(5 * 60),
    };
}

impl Default for PoolPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl ToSql for StoreValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match *self {
            StoreValue::Real(v) => ToSqlOutput::Owned(Value::Real(v)),
            StoreValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(v)),
        })
    }
}

struct PooledConnection {
    conn: Connection,
    opened_at: Instant,
}

impl PooledConnection {
    fn open(path: &Path) -> SinkResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(classify)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(classify)?;
        debug!(path = %path.display(), "opened SQLite connection");
        Ok(Self {
            conn,
            opened_at: Instant::now(),
        })
    }

    fn expired(&self, policy: &PoolPolicy) -> bool {
        self.opened_at.elapsed() >= policy.max_lifetime
    }
}

/// SQLite database file shared by the relational sinks.
///
/// Nothing is opened until the first statement runs. At most
/// `max_open` statements run at once, each on the blocking thread pool;
/// connections are returned to an idle list of at most `max_idle` entries
/// and discarded once older than `max_lifetime`.
pub struct SqliteStore {
    path: PathBuf,
    policy: PoolPolicy,
    permits: Semaphore,
    idle: Mutex<Vec<PooledConnection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("policy", &self.policy)
            .field("idle", &self.idle.lock().len())
            .finish()
    }
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_policy(path, PoolPolicy::DEFAULT)
    }

    pub fn with_policy(path: impl Into<PathBuf>, policy: PoolPolicy) -> Self {
        Self {
            path: path.into(),
            permits: Semaphore::new(policy.max_open.max(1)),
            policy,
            idle: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> PoolPolicy {
        self.policy
    }

    /// Connections currently parked in the pool.
    pub fn idle_connections(&self) -> usize {
        self.idle.lock().len()
    }

    fn take_idle(&self) -> Option<PooledConnection> {
        let mut idle = self.idle.lock();
        while let Some(pooled) = idle.pop() {
            if !pooled.expired(&self.policy) {
                return Some(pooled);
            }
        }
        None
    }

    fn release(&self, pooled: PooledConnection) {
        if pooled.expired(&self.policy) {
            return;
        }
        let mut idle = self.idle.lock();
        if idle.len() < self.policy.max_idle {
            idle.push(pooled);
        }
    }

    /// Run `work` against a pooled connection on the blocking thread pool.
    async fn with_connection<T, F>(&self, work: F) -> SinkResult<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| SinkError::transient(e.to_string()))?;

        let reused = self.take_idle();
        let path = self.path.clone();
        let (pooled, result) = tokio::task::spawn_blocking(move || {
            let pooled = match reused {
                Some(pooled) => pooled,
                None => PooledConnection::open(&path)?,
            };
            let result = work(&pooled.conn);
            Ok::<_, SinkError>((pooled, result))
        })
        .await
        .map_err(|e| SinkError::transient(format!("SQLite worker failed: {e}")))??;

        match result {
            Ok(value) => {
                self.release(pooled);
                Ok(value)
            }
            Err(err) => {
                let err = classify(err);
                if err.kind() != SinkErrorKind::Transient {
                    self.release(pooled);
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl RelationalStore for SqliteStore {
    async fn ensure_table(&self, table: &TableSpec) -> SinkResult {
        let sql = create_table_sql(table);
        self.with_connection(move |conn| conn.execute_batch(&sql))
            .await
    }

    async fn insert(&self, table: &str, row: InsertRow) -> SinkResult {
        let sql = insert_sql(table, &row.columns);
        self.with_connection(move |conn| {
            let mut statement = conn.prepare_cached(&sql)?;
            statement.execute(params_from_iter(row.values.iter()))?;
            Ok(())
        })
        .await
    }
}

/// Map a SQLite failure onto the sink error taxonomy.
fn classify(err: rusqlite::Error) -> SinkError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::ConstraintViolation
                if matches!(
                    failure.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                ) =>
            {
                SinkError::DuplicateRecord
            }
            ErrorCode::CannotOpen
            | ErrorCode::NotADatabase
            | ErrorCode::ReadOnly
            | ErrorCode::PermissionDenied => SinkError::configuration(err.to_string()),
            _ => SinkError::transient(err.to_string()),
        },
        rusqlite::Error::InvalidPath(path) => SinkError::InvalidPath(path.clone()),
        _ => SinkError::transient(err.to_string()),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn create_table_sql(table: &TableSpec) -> String {
    let mut definitions = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_owned()];
    definitions.extend(
        table
            .columns
            .iter()
            .map(|c| format!("{} {} NOT NULL", quote_ident(&c.name), c.column_type)),
    );
    if !table.unique.is_empty() {
        let unique = table
            .unique
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        definitions.push(format!("UNIQUE ({unique})"));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({});",
        quote_ident(&table.name),
        definitions.join(", ")
    )
}

fn insert_sql(table: &str, columns: &[String]) -> String {
    let names = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({names}) VALUES ({placeholders})",
        quote_ident(table)
    )
}
