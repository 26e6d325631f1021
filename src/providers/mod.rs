pub mod alphavantage;
pub mod coingecko;
pub mod donki;
pub mod eonet;
pub mod forex;
pub mod jtwc;
pub mod neo;
pub mod newsapi;
pub mod noaa;
pub mod nominatim;
pub mod openweather;
pub mod usgs;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::ResolvedConfig;
use crate::domain::{
    Capabilities, CollectionWindow, Layer, LocationPolicy, RecordDraft, RecordKind, SourceId,
    SourceRecord,
};
use crate::fetch::Fetch;
use crate::normalize::NameNormalizer;
use crate::resolve::Resolver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub item: String,
    pub reason: String,
}

impl ItemFailure {
    pub fn new(item: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            reason: reason.into(),
        }
    }
}

pub type ItemResult = Result<SourceRecord, ItemFailure>;

pub trait SourceAdapter {
    fn collector_name(&self) -> &str;
    fn layer(&self) -> Layer;
    fn kind(&self) -> RecordKind;

    fn describe_capabilities(&self) -> Capabilities {
        let kind = self.kind();
        Capabilities {
            supports_location: kind.location_policy() != LocationPolicy::Absent,
            natural_key_fields: kind.natural_key_fields(),
        }
    }

    fn window(&self, now: DateTime<Utc>) -> CollectionWindow {
        CollectionWindow::last_days(now, 1)
    }

    fn list_items(&self, fetcher: &dyn Fetch, window: &CollectionWindow) -> Vec<ItemResult>;

    fn map_fields(&self, record: &SourceRecord) -> Result<RecordDraft, String>;
}

pub const COLLECTOR_NAMES: [&str; 10] = [
    alphavantage::COLLECTOR,
    coingecko::COLLECTOR,
    forex::COLLECTOR,
    neo::COLLECTOR,
    donki::COLLECTOR,
    openweather::COLLECTOR,
    newsapi::COLLECTOR,
    usgs::COLLECTOR,
    eonet::STORMS_COLLECTOR,
    eonet::WILDFIRES_COLLECTOR,
];

pub fn build_adapters(config: &ResolvedConfig) -> Vec<Box<dyn SourceAdapter>> {
    let collectors = &config.collectors;
    vec![
        Box::new(alphavantage::StocksAdapter::new(
            collectors.stocks.symbols.clone(),
            config.api_keys.alpha_vantage.clone(),
        )),
        Box::new(coingecko::CryptoAdapter::new(collectors.crypto.coins.clone())),
        Box::new(forex::ForexAdapter::new(
            collectors.forex.pairs.clone(),
            config.api_keys.alpha_vantage.clone(),
        )),
        Box::new(neo::NearEarthObjectsAdapter::new(
            collectors.near_earth_objects.days,
            config.api_keys.nasa.clone(),
        )),
        Box::new(donki::SolarFlareAdapter::new(
            collectors.solar_flares.days,
            config.api_keys.nasa.clone(),
        )),
        Box::new(openweather::WeatherAdapter::new(
            collectors.weather.cities.clone(),
            config.api_keys.openweather.clone(),
        )),
        Box::new(newsapi::NewsAdapter::new(
            collectors.news.categories.clone(),
            config.api_keys.newsapi.clone(),
        )),
        Box::new(usgs::EarthquakeAdapter::new(
            collectors.earthquakes.min_magnitude,
            collectors.earthquakes.days,
        )),
        Box::new(eonet::EonetAdapter::storms(collectors.storms.days)),
        Box::new(eonet::EonetAdapter::wildfires(collectors.wildfires.days)),
    ]
}

pub fn build_resolver(config: &ResolvedConfig) -> Resolver {
    let mut resolver = Resolver::new(NameNormalizer::new(&config.prefixes));
    for source in &config.resolver_sources {
        resolver = match source {
            SourceId::Noaa => resolver.with_source(Box::new(noaa::NoaaSource::new())),
            SourceId::Jtwc => resolver.with_source(Box::new(jtwc::JtwcSource::new())),
            _ => resolver,
        };
    }
    resolver.with_geocoder(Box::new(nominatim::NominatimGeocoder::new()))
}

pub(crate) fn text_at(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

pub(crate) fn number_at(value: &Value, pointer: &str) -> Option<f64> {
    match value.pointer(pointer)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}

pub(crate) fn integer_at(value: &Value, pointer: &str) -> Option<i64> {
    match value.pointer(pointer)? {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float.round() as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn unix_seconds_to_rfc3339(seconds: i64) -> Option<String> {
    DateTime::from_timestamp(seconds, 0).map(|time| time.to_rfc3339())
}

pub(crate) fn unix_millis_to_rfc3339(millis: i64) -> Option<String> {
    DateTime::from_timestamp_millis(millis).map(|time| time.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn number_at_accepts_strings_and_numbers() {
        let payload = json!({"a": "12.5", "b": 7, "c": "1.2%", "d": null});
        assert_eq!(number_at(&payload, "/a"), Some(12.5));
        assert_eq!(number_at(&payload, "/b"), Some(7.0));
        assert_eq!(number_at(&payload, "/c"), Some(1.2));
        assert_eq!(number_at(&payload, "/d"), None);
        assert_eq!(number_at(&payload, "/missing"), None);
    }

    #[test]
    fn text_at_skips_blank_strings() {
        let payload = json!({"name": "  ", "id": 42});
        assert_eq!(text_at(&payload, "/name"), None);
        assert_eq!(text_at(&payload, "/id").as_deref(), Some("42"));
    }

    #[test]
    fn epoch_conversions() {
        assert_eq!(
            unix_seconds_to_rfc3339(1_730_714_400).as_deref(),
            Some("2024-11-04T10:00:00+00:00")
        );
        assert_eq!(
            unix_millis_to_rfc3339(1_730_714_400_000).as_deref(),
            Some("2024-11-04T10:00:00+00:00")
        );
    }
}
