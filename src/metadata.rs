use rusqlite::params;
use serde::Serialize;

use crate::domain::{CollectionRun, FieldMap, FieldValue, RunStatus};
use crate::error::StorageError;
use crate::store::{SqliteStore, Storage};

pub const METADATA_TABLE: &str = "collection_metadata";

pub struct MetadataRecorder<'a, S: Storage> {
    storage: &'a S,
}

impl<'a, S: Storage> MetadataRecorder<'a, S> {
    pub fn new(storage: &'a S) -> Self {
        Self { storage }
    }

    pub fn record(&self, run: &CollectionRun) -> Result<(), StorageError> {
        self.storage.append(METADATA_TABLE, &run_fields(run))
    }
}

fn run_fields(run: &CollectionRun) -> FieldMap {
    let counter = |value: u64| -> FieldValue {
        FieldValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    };
    let mut fields = FieldMap::new();
    fields.insert("layer".to_string(), run.layer.as_str().into());
    fields.insert("collector".to_string(), run.collector_name.as_str().into());
    fields.insert("status".to_string(), run.status.as_str().into());
    fields.insert("records_collected".to_string(), counter(run.records_collected));
    fields.insert("records_duplicate".to_string(), counter(run.records_duplicate));
    fields.insert("records_rejected".to_string(), counter(run.records_rejected));
    fields.insert("records_unresolved".to_string(), counter(run.records_unresolved));
    fields.insert("items_failed".to_string(), counter(run.items_failed));
    if let Some(detail) = &run.error_detail {
        fields.insert("error_message".to_string(), detail.as_str().into());
    }
    fields.insert("started_at".to_string(), run.started_at.to_rfc3339().into());
    fields.insert("finished_at".to_string(), run.finished_at.to_rfc3339().into());
    fields
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectorStats {
    pub collector: String,
    pub layer: String,
    pub total_runs: u64,
    pub successes: u64,
    pub partials: u64,
    pub failures: u64,
    pub success_rate: f64,
    pub last_finished_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub id: i64,
    pub layer: String,
    pub collector: String,
    pub status: RunStatus,
    pub records_collected: u64,
    pub records_duplicate: u64,
    pub records_rejected: u64,
    pub records_unresolved: u64,
    pub items_failed: u64,
    pub error_message: Option<String>,
    pub started_at: String,
    pub finished_at: String,
}

impl SqliteStore {
    pub fn success_rates(&self) -> Result<Vec<CollectorStats>, StorageError> {
        let mut statement = self.connection().prepare(
            "
            SELECT collector,
                   layer,
                   COUNT(*),
                   SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END),
                   SUM(CASE WHEN status = 'partial' THEN 1 ELSE 0 END),
                   SUM(CASE WHEN status = 'failure' THEN 1 ELSE 0 END),
                   MAX(finished_at)
            FROM collection_metadata
            GROUP BY collector, layer
            ORDER BY collector
            ",
        )?;
        let rows = statement.query_map([], |row| {
            let total_runs = count(row.get(2)?);
            let successes = count(row.get(3)?);
            let partials = count(row.get(4)?);
            let failures = count(row.get(5)?);
            let success_rate = if total_runs == 0 {
                0.0
            } else {
                (successes + partials) as f64 / total_runs as f64
            };
            Ok(CollectorStats {
                collector: row.get(0)?,
                layer: row.get(1)?,
                total_runs,
                successes,
                partials,
                failures,
                success_rate,
                last_finished_at: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunSummary>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut statement = self.connection().prepare(
            "
            SELECT id, layer, collector, status, records_collected, records_duplicate,
                   records_rejected, records_unresolved, items_failed, error_message,
                   started_at, finished_at
            FROM collection_metadata
            ORDER BY id DESC
            LIMIT ?1
            ",
        )?;
        let rows = statement.query_map(params![limit], |row| {
            let status = row.get::<_, String>(3)?.parse::<RunStatus>().map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    Box::new(err),
                )
            })?;
            Ok(RunSummary {
                id: row.get(0)?,
                layer: row.get(1)?,
                collector: row.get(2)?,
                status,
                records_collected: count(row.get(4)?),
                records_duplicate: count(row.get(5)?),
                records_rejected: count(row.get(6)?),
                records_unresolved: count(row.get(7)?),
                items_failed: count(row.get(8)?),
                error_message: row.get(9)?,
                started_at: row.get(10)?,
                finished_at: row.get(11)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn count(value: i64) -> u64 {
    value.max(0) as u64
}
