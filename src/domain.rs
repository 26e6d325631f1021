use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HermesError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Eonet,
    Noaa,
    Jtwc,
    Nominatim,
    Usgs,
    OpenWeather,
    NewsApi,
    NasaNeo,
    NasaDonki,
    AlphaVantage,
    CoinGecko,
}

impl SourceId {
    pub const ALL: [SourceId; 11] = [
        SourceId::Eonet,
        SourceId::Noaa,
        SourceId::Jtwc,
        SourceId::Nominatim,
        SourceId::Usgs,
        SourceId::OpenWeather,
        SourceId::NewsApi,
        SourceId::NasaNeo,
        SourceId::NasaDonki,
        SourceId::AlphaVantage,
        SourceId::CoinGecko,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Eonet => "eonet",
            SourceId::Noaa => "noaa",
            SourceId::Jtwc => "jtwc",
            SourceId::Nominatim => "nominatim",
            SourceId::Usgs => "usgs",
            SourceId::OpenWeather => "openweather",
            SourceId::NewsApi => "newsapi",
            SourceId::NasaNeo => "nasaneo",
            SourceId::NasaDonki => "nasadonki",
            SourceId::AlphaVantage => "alphavantage",
            SourceId::CoinGecko => "coingecko",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = HermesError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        SourceId::ALL
            .into_iter()
            .find(|source| source.as_str() == normalized)
            .ok_or_else(|| HermesError::UnknownSource(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Markets,
    Space,
    Weather,
    Disasters,
    News,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Markets => "markets",
            Layer::Space => "space",
            Layer::Weather => "weather",
            Layer::Disasters => "disasters",
            Layer::News => "news",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationPolicy {
    Required,
    Optional,
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    NameMatch,
    Geocode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Stock,
    Crypto,
    ForexRate,
    NearEarthObject,
    SolarFlare,
    Weather,
    NewsArticle,
    Earthquake,
    Storm,
    Wildfire,
}

impl RecordKind {
    pub fn table(&self) -> &'static str {
        match self {
            RecordKind::Stock => "stocks",
            RecordKind::Crypto => "crypto",
            RecordKind::ForexRate => "forex",
            RecordKind::NearEarthObject => "near_earth_objects",
            RecordKind::SolarFlare => "solar_flares",
            RecordKind::Weather => "weather",
            RecordKind::NewsArticle => "news",
            RecordKind::Earthquake => "earthquakes",
            RecordKind::Storm => "storms",
            RecordKind::Wildfire => "wildfires",
        }
    }

    pub fn natural_key_fields(&self) -> &'static [&'static str] {
        match self {
            RecordKind::Stock => &["date", "symbol"],
            RecordKind::Crypto => &["coin_id", "date"],
            RecordKind::ForexRate => &["pair", "date"],
            RecordKind::NearEarthObject => &["neo_id", "date"],
            RecordKind::SolarFlare => &["flare_id"],
            RecordKind::Weather => &["city", "observed_at"],
            RecordKind::NewsArticle => &["link"],
            RecordKind::Earthquake => &["event_id"],
            RecordKind::Storm => &["storm_id"],
            RecordKind::Wildfire => &["fire_id"],
        }
    }

    pub fn location_policy(&self) -> LocationPolicy {
        match self {
            RecordKind::Storm | RecordKind::Wildfire | RecordKind::Earthquake => {
                LocationPolicy::Required
            }
            RecordKind::Weather => LocationPolicy::Optional,
            RecordKind::Stock
            | RecordKind::Crypto
            | RecordKind::ForexRate
            | RecordKind::NearEarthObject
            | RecordKind::SolarFlare
            | RecordKind::NewsArticle => LocationPolicy::Absent,
        }
    }

    pub fn resolution(&self) -> Option<ResolutionStrategy> {
        match self {
            RecordKind::Storm => Some(ResolutionStrategy::NameMatch),
            RecordKind::Wildfire => Some(ResolutionStrategy::Geocode),
            _ => None,
        }
    }

    pub fn event_date_field(&self) -> &'static str {
        match self {
            RecordKind::Stock
            | RecordKind::Crypto
            | RecordKind::ForexRate
            | RecordKind::NearEarthObject => "date",
            RecordKind::SolarFlare => "begin_time",
            RecordKind::Weather => "observed_at",
            RecordKind::NewsArticle => "published_at",
            RecordKind::Earthquake | RecordKind::Storm | RecordKind::Wildfire => "event_time",
        }
    }

    pub fn tracks_location_source(&self) -> bool {
        self.resolution().is_some()
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table())
    }
}

impl FromStr for RecordKind {
    type Err = HermesError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "stock" | "stocks" => Ok(RecordKind::Stock),
            "crypto" => Ok(RecordKind::Crypto),
            "forex" | "forex_rate" => Ok(RecordKind::ForexRate),
            "near_earth_object" | "near_earth_objects" | "neo" => Ok(RecordKind::NearEarthObject),
            "solar_flare" | "solar_flares" => Ok(RecordKind::SolarFlare),
            "weather" => Ok(RecordKind::Weather),
            "news" | "news_article" => Ok(RecordKind::NewsArticle),
            "earthquake" | "earthquakes" => Ok(RecordKind::Earthquake),
            "storm" | "storms" => Ok(RecordKind::Storm),
            "wildfire" | "wildfires" => Ok(RecordKind::Wildfire),
            _ => Err(HermesError::InvalidRecordKind(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Real(value) => Some(*value),
            FieldValue::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(value) => value.trim().is_empty(),
            FieldValue::Real(value) => value.is_nan(),
            _ => false,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(value) => write!(f, "{value}"),
            FieldValue::Integer(value) => write!(f, "{value}"),
            FieldValue::Real(value) => write!(f, "{value}"),
            FieldValue::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Real(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

pub type FieldMap = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// EONET and USGS geometries are GeoJSON positions: longitude first.
    pub fn from_geojson(position: &[serde_json::Value]) -> Option<Self> {
        let longitude = position.first()?.as_f64()?;
        let latitude = position.get(1)?.as_f64()?;
        Some(Self::new(latitude, longitude))
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub source_id: SourceId,
    pub fetched_at: DateTime<Utc>,
    pub label: String,
    pub payload: serde_json::Value,
}

impl SourceRecord {
    pub fn new(source_id: SourceId, label: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            source_id,
            fetched_at: Utc::now(),
            label: label.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NaturalKey {
    parts: Vec<(&'static str, FieldValue)>,
}

impl NaturalKey {
    /// Fails with the name of the first key field that is missing or blank.
    pub fn extract(kind: RecordKind, fields: &FieldMap) -> Result<Self, &'static str> {
        let mut parts = Vec::new();
        for name in kind.natural_key_fields() {
            match fields.get(*name) {
                Some(value) if !value.is_blank() => parts.push((*name, value.clone())),
                _ => return Err(*name),
            }
        }
        Ok(Self { parts })
    }

    pub fn columns(&self) -> Vec<&'static str> {
        self.parts.iter().map(|(name, _)| *name).collect()
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .parts
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>();
        write!(f, "{}", rendered.join(", "))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordDraft {
    pub fields: FieldMap,
    pub location: Option<Coordinates>,
    pub location_source: Option<SourceId>,
}

impl RecordDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn with_opt<V: Into<FieldValue>>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with(name, value),
            None => self,
        }
    }

    pub fn located(mut self, coordinates: Option<Coordinates>, source: SourceId) -> Self {
        if let Some(coordinates) = coordinates {
            self.location = Some(coordinates);
            self.location_source = Some(source);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub kind: RecordKind,
    pub key: NaturalKey,
    pub fields: FieldMap,
    pub location: Option<Coordinates>,
    pub location_source: Option<SourceId>,
}

impl NormalizedRecord {
    pub fn set_location(&mut self, coordinates: Coordinates, source: SourceId) {
        self.location = Some(coordinates);
        self.location_source = Some(source);
    }

    pub fn title(&self) -> Option<&str> {
        self.fields.get("title").and_then(FieldValue::as_text)
    }

    pub fn row(&self) -> FieldMap {
        let mut row = self.fields.clone();
        if let Some(location) = self.location {
            row.insert("latitude".to_string(), location.latitude.into());
            row.insert("longitude".to_string(), location.longitude.into());
        }
        if self.kind.tracks_location_source() {
            if let Some(source) = self.location_source {
                row.insert("location_source".to_string(), source.as_str().into());
            }
        }
        row
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NameKey(String);

impl NameKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, other: &NameKey) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.0.contains(&other.0) || other.0.contains(&self.0)
    }
}

impl fmt::Display for NameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Exact,
    Contains,
    Geocoded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionCandidate {
    pub name_key: NameKey,
    pub coordinates: Coordinates,
    pub confidence: Confidence,
    pub source_id: SourceId,
}

impl ResolutionCandidate {
    pub fn latitude(&self) -> f64 {
        self.coordinates.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.coordinates.longitude
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Partial,
    Failure,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failure => "failure",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = HermesError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "success" => Ok(RunStatus::Success),
            "partial" => Ok(RunStatus::Partial),
            "failure" => Ok(RunStatus::Failure),
            other => Err(HermesError::InvalidConfig(format!("run status {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionRun {
    pub layer: Layer,
    pub collector_name: String,
    pub status: RunStatus,
    pub records_collected: u64,
    pub records_duplicate: u64,
    pub records_rejected: u64,
    pub records_unresolved: u64,
    pub items_failed: u64,
    pub error_detail: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CollectionWindow {
    pub fn last_days(now: DateTime<Utc>, days: u32) -> Self {
        let start = Duration::try_days(i64::from(days))
            .and_then(|span| now.checked_sub_signed(span))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { start, end: now }
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end.date_naive()
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub supports_location: bool,
    pub natural_key_fields: &'static [&'static str],
}
