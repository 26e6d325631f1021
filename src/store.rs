use std::fs;

use camino::Utf8Path;
use rusqlite::types::{ToSql, ToSqlOutput};
use rusqlite::{Connection, params_from_iter};
use tracing::debug;

use crate::domain::{FieldMap, FieldValue};
use crate::error::{HermesError, StorageError};

pub const SCHEMA_VERSION: i64 = 2;

const MIGRATIONS: [(i64, &str); 2] = [
    (1, include_str!("../migrations/0001_collection_schema.sql")),
    (2, include_str!("../migrations/0002_markets_and_space_weather.sql")),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    Inserted,
    Duplicate,
}

/// Persistence seam used by the pipeline. Implementations must enforce a
/// uniqueness constraint on each table's natural key.
pub trait Storage {
    fn upsert(
        &self,
        table: &str,
        natural_key: &[&str],
        fields: &FieldMap,
    ) -> Result<InsertResult, StorageError>;

    fn append(&self, table: &str, fields: &FieldMap) -> Result<(), StorageError>;
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Text(value) => ToSqlOutput::from(value.as_str()),
            FieldValue::Integer(value) => ToSqlOutput::from(*value),
            FieldValue::Real(value) => ToSqlOutput::from(*value),
            FieldValue::Bool(value) => ToSqlOutput::from(*value),
        })
    }
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Utf8Path) -> Result<Self, HermesError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| HermesError::Filesystem(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(StorageError::from)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        let current = self.schema_version()?;
        if current > SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: current,
                supported: SCHEMA_VERSION,
            });
        }

        for (version, sql) in MIGRATIONS {
            if current < version {
                self.conn.execute_batch(sql)?;
                self.conn
                    .execute_batch(&format!("PRAGMA user_version = {version}"))?;
                debug!(version, "applied schema migration");
            }
        }

        Ok(())
    }

    pub fn row_count(&self, table: &str) -> Result<u64, StorageError> {
        check_identifier(table)?;
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })?;
        Ok(count.max(0) as u64)
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    fn insert_sql(table: &str, fields: &FieldMap) -> Result<String, StorageError> {
        check_identifier(table)?;
        if fields.is_empty() {
            return Err(StorageError::EmptyRow(table.to_string()));
        }
        let mut columns = Vec::with_capacity(fields.len());
        for column in fields.keys() {
            check_identifier(column)?;
            columns.push(column.as_str());
        }
        let placeholders = (1..=columns.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>();
        Ok(format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        ))
    }
}

impl Storage for SqliteStore {
    fn upsert(
        &self,
        table: &str,
        natural_key: &[&str],
        fields: &FieldMap,
    ) -> Result<InsertResult, StorageError> {
        if natural_key.is_empty() {
            return Err(StorageError::InvalidIdentifier(format!(
                "empty natural key for {table}"
            )));
        }
        for field in natural_key {
            check_identifier(field)?;
            if fields.get(*field).is_none_or(FieldValue::is_blank) {
                return Err(StorageError::MissingKeyField {
                    table: table.to_string(),
                    field: field.to_string(),
                });
            }
        }

        let insert = Self::insert_sql(table, fields)?;
        let sql = format!("{insert} ON CONFLICT({}) DO NOTHING", natural_key.join(", "));
        let changed = self
            .conn
            .prepare_cached(&sql)?
            .execute(params_from_iter(fields.values()))?;

        Ok(if changed == 0 {
            InsertResult::Duplicate
        } else {
            InsertResult::Inserted
        })
    }

    fn append(&self, table: &str, fields: &FieldMap) -> Result<(), StorageError> {
        let sql = Self::insert_sql(table, fields)?;
        self.conn
            .prepare_cached(&sql)?
            .execute(params_from_iter(fields.values()))?;
        Ok(())
    }
}

fn check_identifier(name: &str) -> Result<(), StorageError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|ch| ch.is_ascii_lowercase() || ch == '_');
    let valid_rest = chars.all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_');
    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(StorageError::InvalidIdentifier(name.to_string()))
    }
}
