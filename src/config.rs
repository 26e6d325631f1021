use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::NaiveDate;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::SourceId;
use crate::error::HermesError;
use crate::fetch::RetryPolicy;
use crate::normalize::DEFAULT_PREFIXES;
use crate::validate::parse_event_date;

pub const DEFAULT_CONFIG_FILE: &str = "hermes.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub collection_epoch: Option<String>,
    #[serde(default)]
    pub fetch: Option<FetchSection>,
    #[serde(default)]
    pub throttle: BTreeMap<String, u64>,
    #[serde(default)]
    pub resolver: Option<ResolverSection>,
    #[serde(default)]
    pub collectors: CollectorsSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FetchSection {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub base_delay_ms: Option<u64>,
    #[serde(default)]
    pub rate_limit_delay_ms: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ResolverSection {
    #[serde(default)]
    pub sources: Option<Vec<String>>,
    #[serde(default)]
    pub prefixes: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CollectorsSection {
    #[serde(default)]
    pub stocks: Option<ListEntry>,
    #[serde(default)]
    pub crypto: Option<ListEntry>,
    #[serde(default)]
    pub forex: Option<ListEntry>,
    #[serde(default)]
    pub weather: Option<ListEntry>,
    #[serde(default)]
    pub news: Option<ListEntry>,
    #[serde(default)]
    pub earthquakes: Option<EarthquakeEntry>,
    #[serde(default)]
    pub near_earth_objects: Option<DaysEntry>,
    #[serde(default)]
    pub solar_flares: Option<DaysEntry>,
    #[serde(default)]
    pub storms: Option<DaysEntry>,
    #[serde(default)]
    pub wildfires: Option<DaysEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ListEntry {
    Shorthand(Vec<String>),
    Detailed(ListEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ListEntryObject {
    #[serde(
        alias = "symbols",
        alias = "coins",
        alias = "pairs",
        alias = "cities",
        alias = "categories"
    )]
    pub items: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DaysEntry {
    Shorthand(u32),
    Detailed(DaysEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DaysEntryObject {
    #[serde(default)]
    pub days: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct EarthquakeEntry {
    #[serde(default)]
    pub min_magnitude: Option<f64>,
    #[serde(default)]
    pub days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StocksSettings {
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CryptoSettings {
    pub coins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyPair {
    pub from: String,
    pub to: String,
}

impl CurrencyPair {
    pub fn parse(text: &str) -> Result<Self, HermesError> {
        let invalid = || HermesError::InvalidConfig(format!("forex pair `{text}` is not FROM/TO"));
        let (from, to) = text.split_once('/').ok_or_else(invalid)?;
        let (from, to) = (from.trim().to_uppercase(), to.trim().to_uppercase());
        let is_code = |code: &str| code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase());
        if !is_code(&from) || !is_code(&to) {
            return Err(invalid());
        }
        Ok(Self { from, to })
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.from, self.to)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForexSettings {
    pub pairs: Vec<CurrencyPair>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSettings {
    pub cities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewsSettings {
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EarthquakeSettings {
    pub min_magnitude: f64,
    pub days: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowSettings {
    pub days: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectorSettings {
    pub stocks: StocksSettings,
    pub crypto: CryptoSettings,
    pub forex: ForexSettings,
    pub near_earth_objects: WindowSettings,
    pub solar_flares: WindowSettings,
    pub weather: WeatherSettings,
    pub news: NewsSettings,
    pub earthquakes: EarthquakeSettings,
    pub storms: WindowSettings,
    pub wildfires: WindowSettings,
}

/// Provider credentials. Read from the environment only, never from the config file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiKeys {
    pub alpha_vantage: Option<String>,
    pub openweather: Option<String>,
    pub newsapi: Option<String>,
    pub nasa: String,
}

impl ApiKeys {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            alpha_vantage: read("ALPHA_VANTAGE_KEY"),
            openweather: read("OPENWEATHER_API_KEY"),
            newsapi: read("NEWSAPI_KEY"),
            nasa: read("NASA_API_KEY").unwrap_or_else(|| "DEMO_KEY".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub database: Utf8PathBuf,
    pub collection_epoch: NaiveDate,
    pub retry: RetryPolicy,
    pub throttle: HashMap<SourceId, Duration>,
    pub resolver_sources: Vec<SourceId>,
    pub prefixes: Vec<String>,
    pub collectors: CollectorSettings,
    pub api_keys: ApiKeys,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, HermesError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| HermesError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content).map_err(|err| HermesError::ConfigParse(err.to_string()))?
        };

        Self::resolve_config(config, ApiKeys::from_env())
    }

    pub fn resolve_config(config: Config, api_keys: ApiKeys) -> Result<ResolvedConfig, HermesError> {
        let database = match config.database {
            Some(path) => Utf8PathBuf::from(path),
            None => default_database_path(),
        };

        let collection_epoch = match config.collection_epoch.as_deref() {
            Some(text) => parse_event_date(text).ok_or_else(|| {
                HermesError::InvalidConfig(format!("collection_epoch `{text}` is not a date"))
            })?,
            None => default_epoch(),
        };

        let retry = resolve_retry(config.fetch.unwrap_or_default())?;
        let throttle = resolve_throttle(&config.throttle)?;

        let resolver = config.resolver.unwrap_or_default();
        let resolver_sources = match resolver.sources {
            Some(names) => names
                .iter()
                .map(|name| parse_secondary_source(name))
                .collect::<Result<Vec<_>, HermesError>>()?,
            None => vec![SourceId::Noaa, SourceId::Jtwc],
        };
        let prefixes = resolver
            .prefixes
            .unwrap_or_else(|| DEFAULT_PREFIXES.iter().map(|p| p.to_string()).collect());

        let collectors = resolve_collectors(config.collectors)?;

        Ok(ResolvedConfig {
            database,
            collection_epoch,
            retry,
            throttle,
            resolver_sources,
            prefixes,
            collectors,
            api_keys,
        })
    }
}

fn resolve_retry(section: FetchSection) -> Result<RetryPolicy, HermesError> {
    let defaults = RetryPolicy::default();
    let max_attempts = section.max_attempts.unwrap_or(defaults.max_attempts);
    if max_attempts == 0 {
        return Err(HermesError::InvalidConfig(
            "fetch.max_attempts must be at least 1".to_string(),
        ));
    }
    Ok(RetryPolicy {
        max_attempts,
        base_delay: section
            .base_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.base_delay),
        rate_limit_delay: section
            .rate_limit_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.rate_limit_delay),
        timeout: section
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout),
    })
}

fn resolve_throttle(
    overrides: &BTreeMap<String, u64>,
) -> Result<HashMap<SourceId, Duration>, HermesError> {
    let mut throttle = default_throttle();
    for (name, millis) in overrides {
        let source: SourceId = name.parse()?;
        throttle.insert(source, Duration::from_millis(*millis));
    }
    Ok(throttle)
}

fn parse_secondary_source(name: &str) -> Result<SourceId, HermesError> {
    match name.parse::<SourceId>()? {
        source @ (SourceId::Noaa | SourceId::Jtwc) => Ok(source),
        other => Err(HermesError::InvalidConfig(format!(
            "{other} cannot be used as a name-matching source"
        ))),
    }
}

fn resolve_collectors(section: CollectorsSection) -> Result<CollectorSettings, HermesError> {
    let near_earth_days = days_or(section.near_earth_objects, 7);
    let flare_days = window_days("solar_flares.days", days_or(section.solar_flares, 30))?;
    let pairs = list_or(section.forex, DEFAULT_PAIRS)
        .iter()
        .map(|pair| CurrencyPair::parse(pair))
        .collect::<Result<Vec<_>, HermesError>>()?;
    let earthquakes = section.earthquakes.unwrap_or_default();
    let earthquake_days = window_days("earthquakes.days", earthquakes.days.unwrap_or(7))?;
    let storm_days = window_days("storms.days", days_or(section.storms, 60))?;
    let wildfire_days = window_days("wildfires.days", days_or(section.wildfires, 60))?;
    let min_magnitude = earthquakes.min_magnitude.unwrap_or(4.5);
    if !(-2.0..=10.0).contains(&min_magnitude) {
        return Err(HermesError::InvalidConfig(format!(
            "earthquakes.min_magnitude {min_magnitude} outside [-2, 10]"
        )));
    }

    Ok(CollectorSettings {
        stocks: StocksSettings {
            symbols: list_or(section.stocks, &["AAPL", "GOOGL", "MSFT"])
                .into_iter()
                .map(|symbol| symbol.to_uppercase())
                .collect(),
        },
        crypto: CryptoSettings {
            coins: list_or(section.crypto, DEFAULT_COINS)
                .into_iter()
                .map(|coin| coin.to_lowercase())
                .collect(),
        },
        forex: ForexSettings { pairs },
        near_earth_objects: WindowSettings {
            days: near_earth_days.clamp(1, 7),
        },
        solar_flares: WindowSettings { days: flare_days },
        weather: WeatherSettings {
            cities: list_or(section.weather, DEFAULT_CITIES),
        },
        news: NewsSettings {
            categories: list_or(section.news, &["business", "technology"]),
        },
        earthquakes: EarthquakeSettings {
            min_magnitude,
            days: earthquake_days,
        },
        storms: WindowSettings {
            days: storm_days,
        },
        wildfires: WindowSettings {
            days: wildfire_days,
        },
    })
}

const DEFAULT_COINS: &[&str] = &[
    "bitcoin",
    "ethereum",
    "tether",
    "binancecoin",
    "solana",
    "ripple",
    "cardano",
    "dogecoin",
    "polkadot",
    "litecoin",
];

const DEFAULT_PAIRS: &[&str] = &[
    "EUR/USD", "GBP/USD", "USD/JPY", "USD/CHF", "AUD/USD", "USD/CAD", "USD/CNY",
];

const DEFAULT_CITIES: &[&str] = &[
    "London",
    "New York",
    "Tokyo",
    "Paris",
    "Sydney",
    "Singapore",
    "Dubai",
    "Hong Kong",
    "Los Angeles",
    "Mumbai",
];

fn list_or(entry: Option<ListEntry>, defaults: &[&str]) -> Vec<String> {
    let items = match entry {
        Some(ListEntry::Shorthand(items)) => items,
        Some(ListEntry::Detailed(obj)) => obj.items,
        None => return defaults.iter().map(|item| item.to_string()).collect(),
    };
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

pub const MAX_WINDOW_DAYS: u32 = 3650;

fn window_days(name: &str, days: u32) -> Result<u32, HermesError> {
    if days > MAX_WINDOW_DAYS {
        return Err(HermesError::InvalidConfig(format!(
            "{name} {days} exceeds {MAX_WINDOW_DAYS}"
        )));
    }
    Ok(days.max(1))
}

fn days_or(entry: Option<DaysEntry>, default: u32) -> u32 {
    match entry {
        Some(DaysEntry::Shorthand(days)) => days,
        Some(DaysEntry::Detailed(obj)) => obj.days.unwrap_or(default),
        None => default,
    }
}

pub fn default_throttle() -> HashMap<SourceId, Duration> {
    HashMap::from([
        (SourceId::Nominatim, Duration::from_millis(1000)),
        (SourceId::AlphaVantage, Duration::from_millis(12000)),
        (SourceId::CoinGecko, Duration::from_millis(2000)),
    ])
}

pub fn default_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN)
}

pub fn default_database_path() -> Utf8PathBuf {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(
                dirs.data_local_dir()
                    .join("hermes-pipeline")
                    .join("hermes.db"),
            )
            .ok()
        })
        .unwrap_or_else(|| Utf8PathBuf::from("hermes.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_config() {
        let resolved = ConfigLoader::resolve_config(Config::default(), ApiKeys::default()).unwrap();
        assert_eq!(resolved.retry, RetryPolicy::default());
        assert_eq!(resolved.resolver_sources, vec![SourceId::Noaa, SourceId::Jtwc]);
        assert_eq!(resolved.collectors.stocks.symbols, vec!["AAPL", "GOOGL", "MSFT"]);
        assert_eq!(resolved.collectors.earthquakes.min_magnitude, 4.5);
        assert_eq!(
            resolved.throttle.get(&SourceId::Nominatim),
            Some(&Duration::from_secs(1))
        );
        assert_eq!(resolved.collection_epoch, default_epoch());
    }

    #[test]
    fn shorthand_and_detailed_collector_entries() {
        let config: Config = serde_json::from_str(
            r#"{
                "collectors": {
                    "weather": ["Oslo", " "],
                    "stocks": {"symbols": ["ibm"]},
                    "near_earth_objects": 30,
                    "storms": {"days": 10}
                }
            }"#,
        )
        .unwrap();
        let resolved = ConfigLoader::resolve_config(config, ApiKeys::default()).unwrap();
        assert_eq!(resolved.collectors.weather.cities, vec!["Oslo"]);
        assert_eq!(resolved.collectors.stocks.symbols, vec!["IBM"]);
        assert_eq!(resolved.collectors.near_earth_objects.days, 7);
        assert_eq!(resolved.collectors.storms.days, 10);
    }

    #[test]
    fn forex_pairs_are_parsed_and_checked() {
        let config: Config =
            serde_json::from_str(r#"{"collectors": {"forex": {"pairs": ["eur/usd", "USD / JPY"]}}}"#)
                .unwrap();
        let resolved = ConfigLoader::resolve_config(config, ApiKeys::default()).unwrap();
        let labels = resolved
            .collectors
            .forex
            .pairs
            .iter()
            .map(CurrencyPair::label)
            .collect::<Vec<_>>();
        assert_eq!(labels, vec!["EUR/USD", "USD/JPY"]);

        let bad: Config =
            serde_json::from_str(r#"{"collectors": {"forex": ["EURUSD"]}}"#).unwrap();
        assert!(matches!(
            ConfigLoader::resolve_config(bad, ApiKeys::default()),
            Err(HermesError::InvalidConfig(message)) if message.contains("EURUSD")
        ));
    }

    #[test]
    fn api_keys_fall_back_for_nasa_only() {
        let keys = ApiKeys::from_lookup(|name| match name {
            "NEWSAPI_KEY" => Some("abc".to_string()),
            "OPENWEATHER_API_KEY" => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(keys.newsapi.as_deref(), Some("abc"));
        assert_eq!(keys.openweather, None);
        assert_eq!(keys.alpha_vantage, None);
        assert_eq!(keys.nasa, "DEMO_KEY");
    }
}
