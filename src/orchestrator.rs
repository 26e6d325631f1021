use std::fmt;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::dedup::{Deduplicator, UpsertOutcome};
use crate::domain::{CollectionRun, LocationPolicy, NormalizedRecord, RunStatus, SourceRecord};
use crate::fetch::Fetch;
use crate::metadata::MetadataRecorder;
use crate::providers::SourceAdapter;
use crate::resolve::{Resolution, Resolver};
use crate::store::Storage;
use crate::validate::{Validation, Validator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Started,
    Fetching,
    Validating,
    Resolving,
    Persisting,
    Closed(RunStatus),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Started => write!(f, "started"),
            Phase::Fetching => write!(f, "fetching"),
            Phase::Validating => write!(f, "validating"),
            Phase::Resolving => write!(f, "resolving"),
            Phase::Persisting => write!(f, "persisting"),
            Phase::Closed(status) => write!(f, "closed({status})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub collector: String,
    pub phase: Phase,
    pub message: String,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Debug, Default)]
struct Tally {
    inserted: u64,
    duplicates: u64,
    rejected: u64,
    unresolved: u64,
    items_failed: u64,
    first_problem: Option<String>,
    fatal: Option<String>,
}

impl Tally {
    fn note(&mut self, problem: String) {
        if self.first_problem.is_none() {
            self.first_problem = Some(problem);
        }
    }

    fn accepted(&self) -> u64 {
        self.inserted + self.duplicates
    }

    fn status(&self, total: u64) -> RunStatus {
        if self.fatal.is_some() {
            return RunStatus::Failure;
        }
        let accepted = self.accepted();
        if accepted == total {
            RunStatus::Success
        } else if accepted == 0 {
            RunStatus::Failure
        } else {
            RunStatus::Partial
        }
    }
}

/// Nothing inside a run escapes as an error: item-level problems are counted,
/// and a storage failure closes the run as `failure` without touching the
/// remaining records.
pub struct Orchestrator<'a, S: Storage> {
    storage: &'a S,
    fetcher: &'a dyn Fetch,
    validator: Validator,
    resolver: Resolver,
    sink: &'a dyn ProgressSink,
}

impl<'a, S: Storage> Orchestrator<'a, S> {
    pub fn new(
        storage: &'a S,
        fetcher: &'a dyn Fetch,
        validator: Validator,
        resolver: Resolver,
    ) -> Self {
        Self {
            storage,
            fetcher,
            validator,
            resolver,
            sink: &NoProgress,
        }
    }

    pub fn with_progress(mut self, sink: &'a dyn ProgressSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn run_all(&mut self, adapters: &[Box<dyn SourceAdapter>]) -> Vec<CollectionRun> {
        adapters
            .iter()
            .map(|adapter| self.run(adapter.as_ref()))
            .collect()
    }

    pub fn run(&mut self, adapter: &dyn SourceAdapter) -> CollectionRun {
        let collector = adapter.collector_name();
        let started_at = Utc::now();
        let mut tally = Tally::default();
        self.enter(collector, Phase::Started, format!("layer {}", adapter.layer()));
        self.resolver.begin_run();

        let window = adapter.window(started_at);
        self.enter(
            collector,
            Phase::Fetching,
            format!("{} to {}", window.start_date(), window.end_date()),
        );
        let items = adapter.list_items(self.fetcher, &window);
        let total = items.len() as u64;
        let mut fetched = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Ok(record) => fetched.push(record),
                Err(failure) => {
                    warn!(collector, item = %failure.item, reason = %failure.reason, "item failed after retries");
                    tally.items_failed += 1;
                    tally.note(format!("{}: {}", failure.item, failure.reason));
                }
            }
        }

        self.enter(collector, Phase::Validating, format!("{} records", fetched.len()));
        let valid = self.validate_all(adapter, fetched, &mut tally);

        self.enter(collector, Phase::Resolving, format!("{} records", valid.len()));
        let located = self.resolve_all(collector, valid, &mut tally);

        self.enter(collector, Phase::Persisting, format!("{} records", located.len()));
        self.persist_all(collector, located, &mut tally);

        let status = tally.status(total);
        let error_detail = match status {
            RunStatus::Success => None,
            _ => tally.fatal.clone().or_else(|| tally.first_problem.clone()),
        };
        let run = CollectionRun {
            layer: adapter.layer(),
            collector_name: collector.to_string(),
            status,
            records_collected: tally.inserted,
            records_duplicate: tally.duplicates,
            records_rejected: tally.rejected,
            records_unresolved: tally.unresolved,
            items_failed: tally.items_failed,
            error_detail,
            started_at,
            finished_at: Utc::now(),
        };
        self.enter(
            collector,
            Phase::Closed(status),
            format!(
                "{} new, {} duplicate, {} rejected, {} unresolved, {} failed",
                run.records_collected,
                run.records_duplicate,
                run.records_rejected,
                run.records_unresolved,
                run.items_failed
            ),
        );
        info!(
            collector,
            status = %run.status,
            collected = run.records_collected,
            duplicate = run.records_duplicate,
            rejected = run.records_rejected,
            unresolved = run.records_unresolved,
            failed = run.items_failed,
            "run closed"
        );

        if let Err(err) = MetadataRecorder::new(self.storage).record(&run) {
            error!(collector, error = %err, "could not append collection metadata");
        }
        run
    }

    fn validate_all(
        &self,
        adapter: &dyn SourceAdapter,
        records: Vec<SourceRecord>,
        tally: &mut Tally,
    ) -> Vec<NormalizedRecord> {
        let collector = adapter.collector_name();
        let mut valid = Vec::with_capacity(records.len());
        for record in records {
            let draft = match adapter.map_fields(&record) {
                Ok(draft) => draft,
                Err(reason) => {
                    warn!(collector, item = %record.label, reason = %reason, "unmappable payload");
                    tally.rejected += 1;
                    tally.note(format!("{}: {reason}", record.label));
                    continue;
                }
            };
            match self.validator.validate(adapter.kind(), draft) {
                Validation::Valid(normalized) => valid.push(normalized),
                Validation::Invalid(reason) => {
                    warn!(collector, item = %record.label, reason = %reason, "rejected");
                    tally.rejected += 1;
                    tally.note(format!("{}: {reason}", record.label));
                }
            }
        }
        valid
    }

    fn resolve_all(
        &mut self,
        collector: &str,
        records: Vec<NormalizedRecord>,
        tally: &mut Tally,
    ) -> Vec<NormalizedRecord> {
        let mut located = Vec::with_capacity(records.len());
        for mut record in records {
            let strategy = match (record.location, record.kind.resolution()) {
                (None, Some(strategy)) => strategy,
                _ => {
                    located.push(record);
                    continue;
                }
            };
            let title = record.title().unwrap_or_default().to_string();
            match self.resolver.resolve(self.fetcher, strategy, &title) {
                Resolution::Resolved(candidate) => {
                    record.set_location(candidate.coordinates, candidate.source_id);
                    located.push(record);
                }
                Resolution::Unresolved(reason) => {
                    if record.kind.location_policy() == LocationPolicy::Required {
                        debug!(collector, key = %record.key, reason = %reason, "skipped without location");
                        tally.unresolved += 1;
                        tally.note(format!("{title}: {reason}"));
                    } else {
                        located.push(record);
                    }
                }
            }
        }
        located
    }

    fn persist_all(&self, collector: &str, records: Vec<NormalizedRecord>, tally: &mut Tally) {
        let dedup = Deduplicator::new(self.storage);
        for record in records {
            match dedup.upsert(record) {
                UpsertOutcome::Inserted => tally.inserted += 1,
                UpsertOutcome::SkippedDuplicate => tally.duplicates += 1,
                UpsertOutcome::Failed(reason) => {
                    error!(collector, reason = %reason, "storage failure; aborting batch");
                    tally.fatal = Some(format!("storage failure: {reason}"));
                    return;
                }
            }
        }
    }

    fn enter(&self, collector: &str, phase: Phase, message: String) {
        debug!(collector, phase = %phase, "{message}");
        self.sink.event(ProgressEvent {
            collector: collector.to_string(),
            phase,
            message,
        });
    }
}
