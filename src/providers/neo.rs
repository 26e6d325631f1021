use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::domain::{CollectionWindow, Layer, RecordDraft, RecordKind, SourceId, SourceRecord};
use crate::fetch::{Fetch, FetchRequest};
use crate::providers::{ItemFailure, ItemResult, SourceAdapter, number_at, text_at};

pub const COLLECTOR: &str = "near_earth_objects";
const BASE_URL: &str = "https://api.nasa.gov/neo/rest/v1/feed";

pub struct NearEarthObjectsAdapter {
    days: u32,
    api_key: String,
    base_url: String,
}

impl NearEarthObjectsAdapter {
    pub fn new(days: u32, api_key: String) -> Self {
        Self {
            days: days.clamp(1, 7),
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl SourceAdapter for NearEarthObjectsAdapter {
    fn collector_name(&self) -> &str {
        COLLECTOR
    }

    fn layer(&self) -> Layer {
        Layer::Space
    }

    fn kind(&self) -> RecordKind {
        RecordKind::NearEarthObject
    }

    fn window(&self, now: DateTime<Utc>) -> CollectionWindow {
        CollectionWindow::last_days(now, self.days)
    }

    fn list_items(&self, fetcher: &dyn Fetch, window: &CollectionWindow) -> Vec<ItemResult> {
        let request = FetchRequest::get(SourceId::NasaNeo, &self.base_url)
            .param("start_date", window.start_date().to_string())
            .param("end_date", window.end_date().to_string())
            .param("api_key", &self.api_key);
        let body = match fetcher.fetch(&request).into_json() {
            Ok(body) => body,
            Err(reason) => return vec![Err(ItemFailure::new("neo feed", reason))],
        };
        let Some(Value::Object(by_date)) = body.get("near_earth_objects") else {
            return vec![Err(ItemFailure::new("neo feed", "missing near_earth_objects"))];
        };

        let mut items = Vec::new();
        for (date, objects) in by_date {
            let Some(objects) = objects.as_array() else {
                continue;
            };
            for object in objects {
                let label = text_at(object, "/name").unwrap_or_else(|| date.clone());
                items.push(Ok(SourceRecord::new(
                    SourceId::NasaNeo,
                    label,
                    json!({ "date": date, "object": object }),
                )));
            }
        }
        items
    }

    fn map_fields(&self, record: &SourceRecord) -> Result<RecordDraft, String> {
        let payload = &record.payload;
        let object = payload
            .get("object")
            .ok_or_else(|| "payload has no object".to_string())?;
        let hazardous = object
            .get("is_potentially_hazardous_asteroid")
            .and_then(Value::as_bool);

        Ok(RecordDraft::new()
            .with_opt("neo_id", text_at(object, "/id"))
            .with_opt("date", text_at(payload, "/date"))
            .with_opt("name", text_at(object, "/name"))
            .with_opt(
                "diameter_min_m",
                number_at(object, "/estimated_diameter/meters/estimated_diameter_min"),
            )
            .with_opt(
                "diameter_max_m",
                number_at(object, "/estimated_diameter/meters/estimated_diameter_max"),
            )
            .with_opt("is_hazardous", hazardous)
            .with_opt(
                "miss_distance_km",
                number_at(object, "/close_approach_data/0/miss_distance/kilometers"),
            )
            .with_opt(
                "miss_distance_lunar",
                number_at(object, "/close_approach_data/0/miss_distance/lunar"),
            )
            .with_opt(
                "velocity_kmh",
                number_at(
                    object,
                    "/close_approach_data/0/relative_velocity/kilometers_per_hour",
                ),
            )
            .with_opt(
                "orbiting_body",
                text_at(object, "/close_approach_data/0/orbiting_body"),
            ))
    }
}
