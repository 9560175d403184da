//! SQLite-backed fact store.
//!
//! Fact tables are upserted by natural key during ingestion. Derived tables
//! are replaced inside a single clear-then-repopulate transaction per stage, so
//! a reader starting after the commit sees either the old or the new contents,
//! never a mix.

mod derived;
mod facts;
pub mod schema;

pub use facts::IngestRun;

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::{Map, Value};
use std::path::Path;

use crate::errors::{DoraError, Result};

pub struct DoraStore {
    conn: Connection,
}

impl DoraStore {
    /// Open (or create) the store at `path` and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "Opened store");
        Self::with_connection(conn)
    }

    /// Fresh in-memory store, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok(Self { conn })
    }

    /// Every table in export order.
    pub fn table_names() -> impl Iterator<Item = &'static str> {
        schema::FACT_TABLES
            .iter()
            .chain(schema::DERIVED_TABLES.iter())
            .copied()
    }

    /// Dump a table as JSON row objects, ordered by primary key.
    pub fn table_rows(&self, table: &str) -> Result<Vec<Map<String, Value>>> {
        if !Self::table_names().any(|t| t == table) {
            return Err(DoraError::decode(format!("unknown table: {table}")));
        }
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {table} ORDER BY 1"))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt.query_map([], |row| {
            let mut object = Map::with_capacity(columns.len());
            for (idx, name) in columns.iter().enumerate() {
                object.insert(name.clone(), json_value(row.get_ref(idx)?));
            }
            Ok(object)
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Row count of a table.
    pub fn count(&self, table: &str) -> Result<i64> {
        if !Self::table_names().any(|t| t == table) {
            return Err(DoraError::decode(format!("unknown table: {table}")));
        }
        Ok(self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })?)
    }
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}
