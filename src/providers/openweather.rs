use crate::domain::{
    CollectionWindow, Coordinates, Layer, RecordDraft, RecordKind, SourceId, SourceRecord,
};
use crate::fetch::{Fetch, FetchRequest};
use crate::providers::{
    ItemFailure, ItemResult, SourceAdapter, integer_at, number_at, text_at,
    unix_seconds_to_rfc3339,
};

pub const COLLECTOR: &str = "weather";
const BASE_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

pub struct WeatherAdapter {
    cities: Vec<String>,
    api_key: Option<String>,
    base_url: String,
}

impl WeatherAdapter {
    pub fn new(cities: Vec<String>, api_key: Option<String>) -> Self {
        Self {
            cities,
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl SourceAdapter for WeatherAdapter {
    fn collector_name(&self) -> &str {
        COLLECTOR
    }

    fn layer(&self) -> Layer {
        Layer::Weather
    }

    fn kind(&self) -> RecordKind {
        RecordKind::Weather
    }

    fn list_items(&self, fetcher: &dyn Fetch, _window: &CollectionWindow) -> Vec<ItemResult> {
        let Some(api_key) = self.api_key.as_deref() else {
            return vec![Err(ItemFailure::new(COLLECTOR, "OPENWEATHER_API_KEY is not set"))];
        };
        self.cities
            .iter()
            .map(|city| {
                let request = FetchRequest::get(SourceId::OpenWeather, &self.base_url)
                    .param("q", city)
                    .param("appid", api_key)
                    .param("units", "metric");
                fetcher
                    .fetch(&request)
                    .into_json()
                    .map(|body| SourceRecord::new(SourceId::OpenWeather, city, body))
                    .map_err(|reason| ItemFailure::new(city, reason))
            })
            .collect()
    }

    fn map_fields(&self, record: &SourceRecord) -> Result<RecordDraft, String> {
        let body = &record.payload;
        let city = text_at(body, "/name").unwrap_or_else(|| record.label.clone());
        let observed_at = integer_at(body, "/dt").and_then(unix_seconds_to_rfc3339);
        let location = number_at(body, "/coord/lat")
            .zip(number_at(body, "/coord/lon"))
            .map(|(latitude, longitude)| Coordinates::new(latitude, longitude));

        Ok(RecordDraft::new()
            .with("city", city)
            .with_opt("observed_at", observed_at)
            .with_opt("country", text_at(body, "/sys/country"))
            .with_opt("temperature_c", number_at(body, "/main/temp"))
            .with_opt("feels_like_c", number_at(body, "/main/feels_like"))
            .with_opt("temp_min_c", number_at(body, "/main/temp_min"))
            .with_opt("temp_max_c", number_at(body, "/main/temp_max"))
            .with_opt("pressure_hpa", number_at(body, "/main/pressure"))
            .with_opt("humidity_percent", integer_at(body, "/main/humidity"))
            .with_opt("weather_main", text_at(body, "/weather/0/main"))
            .with_opt("weather_description", text_at(body, "/weather/0/description"))
            .with_opt("wind_speed_ms", number_at(body, "/wind/speed"))
            .with_opt("clouds_percent", integer_at(body, "/clouds/all"))
            .located(location, SourceId::OpenWeather))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FieldValue;
    use serde_json::json;

    #[test]
    fn maps_current_conditions() {
        let adapter = WeatherAdapter::new(vec!["London".into()], Some("key".into()));
        let record = SourceRecord::new(
            SourceId::OpenWeather,
            "London",
            json!({
                "coord": {"lon": -0.1257, "lat": 51.5085},
                "weather": [{"main": "Clouds", "description": "overcast clouds"}],
                "main": {"temp": 11.2, "feels_like": 10.4, "pressure": 1031, "humidity": 81},
                "wind": {"speed": 3.6},
                "clouds": {"all": 100},
                "dt": 1730714400,
                "sys": {"country": "GB"},
                "name": "London"
            }),
        );
        let draft = adapter.map_fields(&record).unwrap();
        assert_eq!(
            draft.fields["observed_at"],
            FieldValue::from("2024-11-04T10:00:00+00:00")
        );
        assert_eq!(draft.fields["humidity_percent"], FieldValue::from(81i64));
        assert_eq!(draft.fields["pressure_hpa"], FieldValue::from(1031.0));
        assert_eq!(draft.location, Some(Coordinates::new(51.5085, -0.1257)));
        assert_eq!(draft.location_source, Some(SourceId::OpenWeather));
    }

    #[test]
    fn missing_key_fails_the_whole_listing_without_requests() {
        struct Unreachable;
        impl Fetch for Unreachable {
            fn fetch(&self, _request: &FetchRequest) -> crate::fetch::FetchOutcome {
                panic!("no request expected");
            }
        }
        let adapter = WeatherAdapter::new(vec!["London".into()], None);
        let now = chrono::Utc::now();
        let items = adapter.list_items(&Unreachable, &adapter.window(now));
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }
}
