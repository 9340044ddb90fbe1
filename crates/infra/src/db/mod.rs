use std::path::Path;
use std::sync::{Arc, Mutex};

use dropoff_domain::ports::BoxFuture;
use dropoff_domain::ports::db::{DbError, RowSet, SqlExecutor, SqlValue};
use rusqlite::Connection;
use rusqlite::types::{Type, Value, ValueRef};
use thiserror::Error;

use crate::config::AppConfig;

pub const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: String,
}

impl DbConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            path: config.database_path.clone(),
        }
    }
}

/// One SQLite connection shared by every statement. Statements run one at a
/// time, so `BEGIN`/`COMMIT` issued through `execute` scope the writes in
/// between.
///
/// Clones share the connection, and the lock is only held per statement, not
/// across a `BEGIN`...`COMMIT` span. Only one caller may drive a transaction
/// through a given adapter at a time.
#[derive(Debug, Clone)]
pub struct SqliteAdapter {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAdapter {
    pub fn open(config: &DbConfig) -> Result<Self, StorageError> {
        Self::from_connection(Connection::open(Path::new(&config.path))?)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn schema_version(conn: &Connection) -> Result<i64, StorageError> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

fn migrate(conn: &Connection) -> Result<(), StorageError> {
    let current = schema_version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(StorageError::UnsupportedSchemaVersion {
            found: current,
            supported: SCHEMA_VERSION,
        });
    }

    if current < 1 {
        conn.execute_batch(include_str!("../../migrations/0001_trips.sql"))?;
        conn.execute("PRAGMA user_version = 1", []).map(|_| ())?;
        tracing::info!(version = 1, "applied sqlite migration");
    }

    Ok(())
}

fn to_sqlite(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(value) => Value::Integer(*value),
        SqlValue::Real(value) => Value::Real(*value),
        SqlValue::Text(value) => Value::Text(value.clone()),
    }
}

fn from_sqlite(index: usize, name: &str, value: ValueRef<'_>) -> rusqlite::Result<SqlValue> {
    match value {
        ValueRef::Null => Ok(SqlValue::Null),
        ValueRef::Integer(value) => Ok(SqlValue::Integer(value)),
        ValueRef::Real(value) => Ok(SqlValue::Real(value)),
        ValueRef::Text(bytes) => String::from_utf8(bytes.to_vec())
            .map(SqlValue::Text)
            .map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
            }),
        ValueRef::Blob(_) => Err(rusqlite::Error::InvalidColumnType(
            index,
            name.to_string(),
            Type::Blob,
        )),
    }
}

fn run_statement(
    conn: &Connection,
    statement: &str,
    params: &[SqlValue],
) -> rusqlite::Result<RowSet> {
    let values: Vec<Value> = params.iter().map(to_sqlite).collect();
    let mut stmt = conn.prepare(statement)?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    if columns.is_empty() {
        let rows_affected = stmt.execute(rusqlite::params_from_iter(values.iter()))?;
        return Ok(RowSet {
            columns,
            rows: Vec::new(),
            rows_affected,
        });
    }

    let rows = stmt
        .query_map(rusqlite::params_from_iter(values.iter()), |row| {
            columns
                .iter()
                .enumerate()
                .map(|(index, name)| from_sqlite(index, name, row.get_ref(index)?))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let rows_affected = conn.changes() as usize;

    Ok(RowSet {
        columns,
        rows,
        rows_affected,
    })
}

impl SqlExecutor for SqliteAdapter {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn execute(
        &self,
        statement: &str,
        params: Vec<SqlValue>,
    ) -> BoxFuture<'_, Result<RowSet, DbError>> {
        let conn = self.conn.clone();
        let statement = statement.to_string();
        Box::pin(async move {
            let conn = conn
                .lock()
                .map_err(|_| DbError::Unavailable("sqlite connection lock poisoned".into()))?;
            run_statement(&conn, &statement, &params).map_err(|err| {
                tracing::debug!(error = %err, statement = %statement, "sqlite statement failed");
                DbError::Operation(err.to_string())
            })
        })
    }
}
