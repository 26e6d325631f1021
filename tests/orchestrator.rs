use std::cell::{Cell, RefCell};

use assert_matches::assert_matches;
use chrono::NaiveDate;
use serde_json::{Value, json};

use hermes_pipeline::domain::{
    CollectionWindow, Coordinates, FieldMap, FieldValue, Layer, RecordDraft, RecordKind, RunStatus, SourceId,
    SourceRecord,
};
use hermes_pipeline::error::StorageError;
use hermes_pipeline::fetch::{Fetch, FetchOutcome, FetchRequest};
use hermes_pipeline::normalize::NameNormalizer;
use hermes_pipeline::orchestrator::{Orchestrator, Phase, ProgressEvent, ProgressSink};
use hermes_pipeline::providers::{ItemFailure, ItemResult, SourceAdapter};
use hermes_pipeline::resolve::{LocatedEntity, Resolver, SecondarySource};
use hermes_pipeline::store::{InsertResult, SqliteStore, Storage};
use hermes_pipeline::validate::Validator;

struct Offline;

impl Fetch for Offline {
    fn fetch(&self, _request: &FetchRequest) -> FetchOutcome {
        FetchOutcome::NetworkFailure("offline".to_string())
    }
}

/// Serves canned items and maps flat JSON objects straight onto fields.
/// `lat`/`lon` become the record location.
struct ScriptedAdapter {
    name: &'static str,
    layer: Layer,
    kind: RecordKind,
    source: SourceId,
    items: Vec<ItemResult>,
}

impl ScriptedAdapter {
    fn new(name: &'static str, layer: Layer, kind: RecordKind, payloads: Vec<Value>) -> Self {
        let items = payloads
            .into_iter()
            .enumerate()
            .map(|(index, payload)| Ok(SourceRecord::new(SourceId::Eonet, format!("item {index}"), payload)))
            .collect();
        Self {
            name,
            layer,
            kind,
            source: SourceId::Eonet,
            items,
        }
    }

    fn with_failures(mut self, failures: &[&str]) -> Self {
        for item in failures {
            self.items
                .push(Err(ItemFailure::new(*item, "network failure: connection reset")));
        }
        self
    }
}

impl SourceAdapter for ScriptedAdapter {
    fn collector_name(&self) -> &str {
        self.name
    }

    fn layer(&self) -> Layer {
        self.layer
    }

    fn kind(&self) -> RecordKind {
        self.kind
    }

    fn list_items(&self, _fetcher: &dyn Fetch, _window: &CollectionWindow) -> Vec<ItemResult> {
        self.items.clone()
    }

    fn map_fields(&self, record: &SourceRecord) -> Result<RecordDraft, String> {
        let object = record
            .payload
            .as_object()
            .ok_or_else(|| "payload is not an object".to_string())?;
        let mut draft = RecordDraft::new();
        let (mut latitude, mut longitude) = (None, None);
        for (name, value) in object {
            match (name.as_str(), value) {
                ("lat", value) => latitude = value.as_f64(),
                ("lon", value) => longitude = value.as_f64(),
                (_, Value::String(text)) => draft = draft.with(name, text.as_str()),
                (_, Value::Bool(flag)) => draft = draft.with(name, *flag),
                (_, Value::Number(number)) => {
                    draft = match number.as_i64() {
                        Some(integer) => draft.with(name, integer),
                        None => draft.with_opt(name, number.as_f64()),
                    }
                }
                _ => {}
            }
        }
        let location = latitude
            .zip(longitude)
            .map(|(latitude, longitude)| Coordinates::new(latitude, longitude));
        Ok(draft.located(location, self.source))
    }
}

/// In-memory storage that keeps rows for inspection and can be told to fail.
#[derive(Default)]
struct MemoryStorage {
    rows: RefCell<Vec<(String, FieldMap)>>,
    appended: RefCell<Vec<(String, FieldMap)>>,
    upserts: Cell<u32>,
    failing: bool,
}

impl MemoryStorage {
    fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    fn rows_in(&self, table: &str) -> Vec<FieldMap> {
        self.rows
            .borrow()
            .iter()
            .filter(|(name, _)| name == table)
            .map(|(_, row)| row.clone())
            .collect()
    }
}

impl Storage for MemoryStorage {
    fn upsert(
        &self,
        table: &str,
        natural_key: &[&str],
        fields: &FieldMap,
    ) -> Result<InsertResult, StorageError> {
        self.upserts.set(self.upserts.get() + 1);
        if self.failing {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: 2,
                supported: 1,
            });
        }
        let key = |row: &FieldMap| {
            natural_key
                .iter()
                .map(|column| row.get(*column).cloned())
                .collect::<Vec<_>>()
        };
        let wanted = key(fields);
        let mut rows = self.rows.borrow_mut();
        if rows
            .iter()
            .any(|(name, row)| name == table && key(row) == wanted)
        {
            return Ok(InsertResult::Duplicate);
        }
        rows.push((table.to_string(), fields.clone()));
        Ok(InsertResult::Inserted)
    }

    fn append(&self, table: &str, fields: &FieldMap) -> Result<(), StorageError> {
        self.appended
            .borrow_mut()
            .push((table.to_string(), fields.clone()));
        Ok(())
    }
}

struct FixedSource {
    id: SourceId,
    entities: Vec<(&'static str, f64, f64)>,
}

impl SecondarySource for FixedSource {
    fn source_id(&self) -> SourceId {
        self.id
    }

    fn located_entities(&self, _fetcher: &dyn Fetch) -> Result<Vec<LocatedEntity>, String> {
        Ok(self
            .entities
            .iter()
            .map(|(name, latitude, longitude)| LocatedEntity {
                name: name.to_string(),
                coordinates: Coordinates::new(*latitude, *longitude),
            })
            .collect())
    }
}

#[derive(Default)]
struct RecordingSink {
    phases: RefCell<Vec<Phase>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.phases.borrow_mut().push(event.phase);
    }
}

fn validator() -> Validator {
    Validator::new(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap())
}

fn plain_resolver() -> Resolver {
    Resolver::new(NameNormalizer::default())
}

fn storm_resolver() -> Resolver {
    Resolver::new(NameNormalizer::default())
        .with_source(Box::new(FixedSource {
            id: SourceId::Noaa,
            entities: vec![("Rafael", 23.4, -84.1)],
        }))
        .with_source(Box::new(FixedSource {
            id: SourceId::Jtwc,
            entities: vec![("Typhoon 16W (Kalmaegi)", 18.2, 125.4)],
        }))
}

fn weather(city: &str, temperature: f64) -> Value {
    json!({
        "city": city,
        "observed_at": "2024-11-04T10:00:00Z",
        "temperature_c": temperature,
        "humidity_percent": 70,
    })
}

fn article(link: &str) -> Value {
    json!({
        "link": link,
        "title": "Markets rally",
        "published_at": "2024-11-04T08:00:00Z",
    })
}

fn storm(id: &str, title: &str) -> Value {
    json!({
        "storm_id": id,
        "title": title,
        "event_time": "2024-11-07T00:00:00Z",
        "status": "active",
    })
}

#[test]
fn out_of_range_temperature_is_rejected_and_run_is_partial() {
    let store = SqliteStore::open_in_memory().unwrap();
    let adapter = ScriptedAdapter::new(
        "weather",
        Layer::Weather,
        RecordKind::Weather,
        vec![weather("London", 11.5), weather("Tokyo", 250.0), weather("Paris", 9.0)],
    );

    let mut orchestrator = Orchestrator::new(&store, &Offline, validator(), plain_resolver());
    let run = orchestrator.run(&adapter);

    assert_eq!(run.status, RunStatus::Partial);
    assert_eq!(run.records_collected, 2);
    assert_eq!(run.records_rejected, 1);
    assert_matches!(run.error_detail, Some(detail) if detail.contains("temperature_c"));
    assert_eq!(store.row_count("weather").unwrap(), 2);

    let recorded = store.recent_runs(10).unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].collector, "weather");
    assert_eq!(recorded[0].status, RunStatus::Partial);
    assert_eq!(recorded[0].records_rejected, 1);
}

#[test]
fn rerun_over_the_same_items_inserts_nothing_new() {
    let store = SqliteStore::open_in_memory().unwrap();
    let adapter = ScriptedAdapter::new(
        "news",
        Layer::News,
        RecordKind::NewsArticle,
        vec![article("https://example.test/a"), article("https://example.test/b")],
    );
    let mut orchestrator = Orchestrator::new(&store, &Offline, validator(), plain_resolver());

    let first = orchestrator.run(&adapter);
    let second = orchestrator.run(&adapter);

    assert_eq!(first.records_collected, 2);
    assert_eq!(second.records_collected, 0);
    assert_eq!(second.records_duplicate, 2);
    assert_eq!(second.status, RunStatus::Success);
    assert_eq!(second.error_detail, None);
    assert_eq!(store.row_count("news").unwrap(), 2);
    assert_eq!(store.recent_runs(10).unwrap().len(), 2);
}

#[test]
fn duplicate_link_within_one_batch_is_skipped() {
    let store = SqliteStore::open_in_memory().unwrap();
    let adapter = ScriptedAdapter::new(
        "news",
        Layer::News,
        RecordKind::NewsArticle,
        vec![article("https://example.test/a"), article("https://example.test/a")],
    );
    let mut orchestrator = Orchestrator::new(&store, &Offline, validator(), plain_resolver());

    let run = orchestrator.run(&adapter);

    assert_eq!(run.records_collected, 1);
    assert_eq!(run.records_duplicate, 1);
    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(store.row_count("news").unwrap(), 1);
}

#[test]
fn storm_without_coordinates_is_located_by_a_lower_priority_source() {
    let storage = MemoryStorage::default();
    let adapter = ScriptedAdapter::new(
        "storms",
        Layer::Disasters,
        RecordKind::Storm,
        vec![storm("EONET_6412", "Typhoon Kalmaegi")],
    );
    let mut orchestrator = Orchestrator::new(&storage, &Offline, validator(), storm_resolver());

    let run = orchestrator.run(&adapter);

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.records_collected, 1);
    let rows = storage.rows_in("storms");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("latitude"), Some(&FieldValue::Real(18.2)));
    assert_eq!(rows[0].get("longitude"), Some(&FieldValue::Real(125.4)));
    assert_eq!(
        rows[0].get("location_source"),
        Some(&FieldValue::Text("jtwc".to_string()))
    );
}

#[test]
fn storm_with_primary_coordinates_keeps_them() {
    let storage = MemoryStorage::default();
    let mut located = storm("EONET_7000", "Hurricane Rafael");
    located["lat"] = json!(24.0);
    located["lon"] = json!(-85.0);
    let adapter = ScriptedAdapter::new("storms", Layer::Disasters, RecordKind::Storm, vec![located]);
    let mut orchestrator = Orchestrator::new(&storage, &Offline, validator(), storm_resolver());

    orchestrator.run(&adapter);

    let rows = storage.rows_in("storms");
    assert_eq!(rows[0].get("latitude"), Some(&FieldValue::Real(24.0)));
    assert_eq!(
        rows[0].get("location_source"),
        Some(&FieldValue::Text("eonet".to_string()))
    );
}

#[test]
fn unresolved_storm_is_counted_and_skipped() {
    let storage = MemoryStorage::default();
    let adapter = ScriptedAdapter::new(
        "storms",
        Layer::Disasters,
        RecordKind::Storm,
        vec![
            storm("EONET_6412", "Typhoon Kalmaegi"),
            storm("EONET_6413", "Cyclone Nobody"),
        ],
    );
    let mut orchestrator = Orchestrator::new(&storage, &Offline, validator(), storm_resolver());

    let run = orchestrator.run(&adapter);

    assert_eq!(run.status, RunStatus::Partial);
    assert_eq!(run.records_collected, 1);
    assert_eq!(run.records_unresolved, 1);
    assert_matches!(run.error_detail, Some(detail) if detail.starts_with("Cyclone Nobody"));
    assert_eq!(storage.rows_in("storms").len(), 1);
}

#[test]
fn storage_failure_closes_the_run_as_failure() {
    let storage = MemoryStorage::failing();
    let adapter = ScriptedAdapter::new(
        "news",
        Layer::News,
        RecordKind::NewsArticle,
        vec![
            article("https://example.test/a"),
            article("https://example.test/b"),
            article("https://example.test/c"),
        ],
    );
    let mut orchestrator = Orchestrator::new(&storage, &Offline, validator(), plain_resolver());

    let run = orchestrator.run(&adapter);

    assert_eq!(run.status, RunStatus::Failure);
    assert_eq!(run.records_collected, 0);
    assert_matches!(run.error_detail, Some(detail) if detail.starts_with("storage failure"));
    assert_eq!(storage.upserts.get(), 1);
    assert_eq!(storage.appended.borrow().len(), 1);
}

#[test]
fn empty_window_is_a_success() {
    let storage = MemoryStorage::default();
    let adapter = ScriptedAdapter::new("earthquakes", Layer::Disasters, RecordKind::Earthquake, vec![]);
    let mut orchestrator = Orchestrator::new(&storage, &Offline, validator(), plain_resolver());

    let run = orchestrator.run(&adapter);

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.records_collected, 0);
    let appended = storage.appended.borrow();
    assert_eq!(appended.len(), 1);
    assert_eq!(appended[0].0, "collection_metadata");
    assert_eq!(
        appended[0].1.get("status"),
        Some(&FieldValue::Text("success".to_string()))
    );
}

#[test]
fn item_failures_count_against_the_run() {
    let storage = MemoryStorage::default();
    let adapter = ScriptedAdapter::new(
        "stocks",
        Layer::Markets,
        RecordKind::Stock,
        vec![json!({"date": "2024-11-04", "symbol": "AAPL", "close": 222.0})],
    )
    .with_failures(&["MSFT"]);
    let mut orchestrator = Orchestrator::new(&storage, &Offline, validator(), plain_resolver());

    let run = orchestrator.run(&adapter);
    assert_eq!(run.status, RunStatus::Partial);
    assert_eq!(run.items_failed, 1);
    assert_matches!(run.error_detail, Some(detail) if detail.starts_with("MSFT"));

    let all_failed = ScriptedAdapter::new("stocks", Layer::Markets, RecordKind::Stock, vec![])
        .with_failures(&["AAPL", "MSFT"]);
    let run = orchestrator.run(&all_failed);
    assert_eq!(run.status, RunStatus::Failure);
    assert_eq!(run.items_failed, 2);
}

#[test]
fn runs_each_collector_in_order_and_reports_phases() {
    let storage = MemoryStorage::default();
    let sink = RecordingSink::default();
    let adapters: Vec<Box<dyn SourceAdapter>> = vec![
        Box::new(ScriptedAdapter::new(
            "news",
            Layer::News,
            RecordKind::NewsArticle,
            vec![article("https://example.test/a")],
        )),
        Box::new(ScriptedAdapter::new("earthquakes", Layer::Disasters, RecordKind::Earthquake, vec![])),
    ];
    let mut orchestrator =
        Orchestrator::new(&storage, &Offline, validator(), plain_resolver()).with_progress(&sink);

    let runs = orchestrator.run_all(&adapters);

    let names = runs.iter().map(|run| run.collector_name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, ["news", "earthquakes"]);
    let phases = sink.phases.borrow();
    assert_eq!(
        phases[..6],
        [
            Phase::Started,
            Phase::Fetching,
            Phase::Validating,
            Phase::Resolving,
            Phase::Persisting,
            Phase::Closed(RunStatus::Success),
        ]
    );
    assert_eq!(phases.len(), 12);
}
