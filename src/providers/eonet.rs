use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::{
    CollectionWindow, Coordinates, Layer, RecordDraft, RecordKind, SourceId, SourceRecord,
};
use crate::fetch::{Fetch, FetchRequest};
use crate::providers::{ItemFailure, ItemResult, SourceAdapter, text_at};

pub const STORMS_COLLECTOR: &str = "storms";
pub const WILDFIRES_COLLECTOR: &str = "wildfires";
const BASE_URL: &str = "https://eonet.gsfc.nasa.gov/api/v3/events";

pub struct EonetAdapter {
    collector: &'static str,
    category: &'static str,
    kind: RecordKind,
    key_field: &'static str,
    days: u32,
    base_url: String,
}

impl EonetAdapter {
    pub fn storms(days: u32) -> Self {
        Self {
            collector: STORMS_COLLECTOR,
            category: "severeStorms",
            kind: RecordKind::Storm,
            key_field: "storm_id",
            days: days.max(1),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn wildfires(days: u32) -> Self {
        Self {
            collector: WILDFIRES_COLLECTOR,
            category: "wildfires",
            kind: RecordKind::Wildfire,
            key_field: "fire_id",
            days: days.max(1),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl SourceAdapter for EonetAdapter {
    fn collector_name(&self) -> &str {
        self.collector
    }

    fn layer(&self) -> Layer {
        Layer::Disasters
    }

    fn kind(&self) -> RecordKind {
        self.kind
    }

    fn window(&self, now: DateTime<Utc>) -> CollectionWindow {
        CollectionWindow::last_days(now, self.days)
    }

    fn list_items(&self, fetcher: &dyn Fetch, window: &CollectionWindow) -> Vec<ItemResult> {
        let request = FetchRequest::get(SourceId::Eonet, &self.base_url)
            .param("category", self.category)
            .param("status", "open")
            .param("days", window.days().max(1).to_string());
        let body = match fetcher.fetch(&request).into_json() {
            Ok(body) => body,
            Err(reason) => return vec![Err(ItemFailure::new("eonet feed", reason))],
        };
        let Some(Value::Array(events)) = body.get("events") else {
            return vec![Err(ItemFailure::new("eonet feed", "missing events"))];
        };
        events
            .iter()
            .map(|event| {
                let label = text_at(event, "/title").unwrap_or_else(|| self.category.to_string());
                Ok(SourceRecord::new(SourceId::Eonet, label, event.clone()))
            })
            .collect()
    }

    fn map_fields(&self, record: &SourceRecord) -> Result<RecordDraft, String> {
        let event = &record.payload;
        // Tracks are ordered oldest first; the last point is the current position.
        let latest = event
            .get("geometry")
            .and_then(Value::as_array)
            .and_then(|points| points.last());
        let location = latest
            .and_then(|point| point.get("coordinates"))
            .and_then(Value::as_array)
            .and_then(|position| Coordinates::from_geojson(position));
        let event_time = latest.and_then(|point| text_at(point, "/date"));
        let status = if event.get("closed").is_some_and(|closed| !closed.is_null()) {
            "closed"
        } else {
            "active"
        };

        Ok(RecordDraft::new()
            .with_opt(self.key_field, text_at(event, "/id"))
            .with_opt("title", text_at(event, "/title"))
            .with_opt("event_time", event_time)
            .with("status", status)
            .with_opt("source_url", text_at(event, "/sources/0/url"))
            .located(location, SourceId::Eonet))
    }
}
