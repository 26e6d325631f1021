use tracing::{debug, error};

use crate::domain::NormalizedRecord;
use crate::store::{InsertResult, Storage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    SkippedDuplicate,
    Failed(String),
}

pub struct Deduplicator<'a, S: Storage> {
    storage: &'a S,
}

impl<'a, S: Storage> Deduplicator<'a, S> {
    pub fn new(storage: &'a S) -> Self {
        Self { storage }
    }

    pub fn upsert(&self, record: NormalizedRecord) -> UpsertOutcome {
        let table = record.kind.table();
        let columns = record.key.columns();
        let row = record.row();
        match self.storage.upsert(table, &columns, &row) {
            Ok(InsertResult::Inserted) => {
                debug!(table, key = %record.key, "inserted");
                UpsertOutcome::Inserted
            }
            Ok(InsertResult::Duplicate) => {
                debug!(table, key = %record.key, "duplicate skipped");
                UpsertOutcome::SkippedDuplicate
            }
            Err(err) => {
                error!(table, key = %record.key, error = %err, "storage failure");
                UpsertOutcome::Failed(err.to_string())
            }
        }
    }
}
