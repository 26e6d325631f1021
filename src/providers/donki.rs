use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::{CollectionWindow, Layer, RecordDraft, RecordKind, SourceId, SourceRecord};
use crate::fetch::{Fetch, FetchRequest};
use crate::providers::{ItemFailure, ItemResult, SourceAdapter, text_at};

pub const COLLECTOR: &str = "solar_flares";
const BASE_URL: &str = "https://api.nasa.gov/DONKI/FLR";

pub struct SolarFlareAdapter {
    days: u32,
    api_key: String,
    base_url: String,
}

impl SolarFlareAdapter {
    pub fn new(days: u32, api_key: String) -> Self {
        Self {
            days,
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl SourceAdapter for SolarFlareAdapter {
    fn collector_name(&self) -> &str {
        COLLECTOR
    }

    fn layer(&self) -> Layer {
        Layer::Space
    }

    fn kind(&self) -> RecordKind {
        RecordKind::SolarFlare
    }

    fn window(&self, now: DateTime<Utc>) -> CollectionWindow {
        CollectionWindow::last_days(now, self.days)
    }

    fn list_items(&self, fetcher: &dyn Fetch, window: &CollectionWindow) -> Vec<ItemResult> {
        let request = FetchRequest::get(SourceId::NasaDonki, &self.base_url)
            .param("startDate", window.start_date().to_string())
            .param("endDate", window.end_date().to_string())
            .param("api_key", &self.api_key);
        let body = match fetcher.fetch(&request).into_body() {
            Ok(body) => body,
            Err(reason) => return vec![Err(ItemFailure::new("flare catalogue", reason))],
        };
        // Quiet windows come back as an empty body rather than `[]`.
        if body.trim().is_empty() {
            return Vec::new();
        }
        let flares = match serde_json::from_str::<Value>(&body) {
            Ok(Value::Array(flares)) => flares,
            Ok(_) => {
                return vec![Err(ItemFailure::new(
                    "flare catalogue",
                    "expected a list of flares",
                ))];
            }
            Err(err) => {
                return vec![Err(ItemFailure::new(
                    "flare catalogue",
                    format!("malformed JSON: {err}"),
                ))];
            }
        };

        flares
            .into_iter()
            .map(|flare| {
                let label = text_at(&flare, "/flrID").unwrap_or_else(|| "flare".to_string());
                Ok(SourceRecord::new(SourceId::NasaDonki, label, flare))
            })
            .collect()
    }

    fn map_fields(&self, record: &SourceRecord) -> Result<RecordDraft, String> {
        let flare = &record.payload;
        let linked_events = flare
            .get("linkedEvents")
            .and_then(Value::as_array)
            .map(|events| events.len() as i64);

        Ok(RecordDraft::new()
            .with_opt("flare_id", text_at(flare, "/flrID"))
            .with_opt("begin_time", text_at(flare, "/beginTime"))
            .with_opt("peak_time", text_at(flare, "/peakTime"))
            .with_opt("end_time", text_at(flare, "/endTime"))
            .with_opt("class_type", text_at(flare, "/classType"))
            .with_opt("source_location", text_at(flare, "/sourceLocation"))
            .with_opt("active_region", text_at(flare, "/activeRegionNum"))
            .with_opt("linked_events", linked_events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FieldValue;
    use serde_json::json;

    #[test]
    fn maps_flare_entry() {
        let adapter = SolarFlareAdapter::new(30, "DEMO_KEY".into());
        let record = SourceRecord::new(
            SourceId::NasaDonki,
            "2024-11-04T09:36:00-FLR-001",
            json!({
                "flrID": "2024-11-04T09:36:00-FLR-001",
                "beginTime": "2024-11-04T09:36Z",
                "peakTime": "2024-11-04T09:52Z",
                "endTime": null,
                "classType": "X1.8",
                "sourceLocation": "S08E33",
                "activeRegionNum": 13878,
                "linkedEvents": [{"activityID": "2024-11-04T10:12:00-CME-001"}]
            }),
        );
        let draft = adapter.map_fields(&record).unwrap();
        assert_eq!(
            draft.fields["flare_id"],
            FieldValue::from("2024-11-04T09:36:00-FLR-001")
        );
        assert_eq!(draft.fields["class_type"], FieldValue::from("X1.8"));
        assert_eq!(draft.fields["active_region"], FieldValue::from("13878"));
        assert_eq!(draft.fields["linked_events"], FieldValue::from(1i64));
        assert!(!draft.fields.contains_key("end_time"));
        assert!(draft.location.is_none());
    }

    #[test]
    fn quiet_window_yields_no_items() {
        struct Quiet;
        impl Fetch for Quiet {
            fn fetch(&self, _request: &FetchRequest) -> crate::fetch::FetchOutcome {
                crate::fetch::FetchOutcome::Success(String::new())
            }
        }
        let adapter = SolarFlareAdapter::new(30, "DEMO_KEY".into());
        let window = adapter.window(Utc::now());
        assert_eq!(window.days(), 30);
        assert!(adapter.list_items(&Quiet, &window).is_empty());
    }
}
