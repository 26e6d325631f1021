use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::{
    CollectionWindow, Coordinates, Layer, RecordDraft, RecordKind, SourceId, SourceRecord,
};
use crate::fetch::{Fetch, FetchRequest};
use crate::providers::{
    ItemFailure, ItemResult, SourceAdapter, integer_at, number_at, text_at,
    unix_millis_to_rfc3339,
};

pub const COLLECTOR: &str = "earthquakes";
const BASE_URL: &str = "https://earthquake.usgs.gov/fdsnws/event/1/query";

pub struct EarthquakeAdapter {
    min_magnitude: f64,
    days: u32,
    base_url: String,
}

impl EarthquakeAdapter {
    pub fn new(min_magnitude: f64, days: u32) -> Self {
        Self {
            min_magnitude,
            days: days.max(1),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl SourceAdapter for EarthquakeAdapter {
    fn collector_name(&self) -> &str {
        COLLECTOR
    }

    fn layer(&self) -> Layer {
        Layer::Disasters
    }

    fn kind(&self) -> RecordKind {
        RecordKind::Earthquake
    }

    fn window(&self, now: DateTime<Utc>) -> CollectionWindow {
        CollectionWindow::last_days(now, self.days)
    }

    fn list_items(&self, fetcher: &dyn Fetch, window: &CollectionWindow) -> Vec<ItemResult> {
        let request = FetchRequest::get(SourceId::Usgs, &self.base_url)
            .param("format", "geojson")
            .param("starttime", window.start_date().to_string())
            .param("endtime", window.end_date().to_string())
            .param("minmagnitude", self.min_magnitude.to_string())
            .param("orderby", "time");
        let body = match fetcher.fetch(&request).into_json() {
            Ok(body) => body,
            Err(reason) => return vec![Err(ItemFailure::new("usgs feed", reason))],
        };
        let Some(Value::Array(features)) = body.get("features") else {
            return vec![Err(ItemFailure::new("usgs feed", "missing features"))];
        };
        features
            .iter()
            .map(|feature| {
                let label = text_at(feature, "/id").unwrap_or_else(|| "earthquake".to_string());
                Ok(SourceRecord::new(SourceId::Usgs, label, feature.clone()))
            })
            .collect()
    }

    fn map_fields(&self, record: &SourceRecord) -> Result<RecordDraft, String> {
        let feature = &record.payload;
        let position = feature
            .pointer("/geometry/coordinates")
            .and_then(Value::as_array);
        let location = position.and_then(|position| Coordinates::from_geojson(position));
        let depth_km = position
            .and_then(|position| position.get(2))
            .and_then(Value::as_f64);
        let event_time = integer_at(feature, "/properties/time").and_then(unix_millis_to_rfc3339);
        let tsunami = integer_at(feature, "/properties/tsunami").map(|flag| flag != 0);

        Ok(RecordDraft::new()
            .with_opt("event_id", text_at(feature, "/id"))
            .with_opt("magnitude", number_at(feature, "/properties/mag"))
            .with_opt("magnitude_type", text_at(feature, "/properties/magType"))
            .with_opt("place", text_at(feature, "/properties/place"))
            .with_opt("event_time", event_time)
            .with_opt("depth_km", depth_km)
            .with_opt("tsunami", tsunami)
            .with_opt("significance", integer_at(feature, "/properties/sig"))
            .with_opt("url", text_at(feature, "/properties/url"))
            .located(location, SourceId::Usgs))
    }
}
