use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate};
use regex::Regex;

use crate::domain::{
    FieldValue, LocationPolicy, NaturalKey, NormalizedRecord, RecordDraft, RecordKind,
};

static STOCK_SYMBOL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]{1,5}(\.[A-Z]{1,2})?$").expect("stock symbol pattern is valid")
});

static CURRENCY_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{3}$").expect("currency code pattern is valid"));

static FLARE_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ABCMX][0-9]+(\.[0-9]+)?$").expect("flare class pattern is valid")
});

#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Valid(NormalizedRecord),
    Invalid(String),
}

#[derive(Debug, Clone, Copy)]
enum Check {
    Range(f64, f64),
    NonNegative,
    NonEmpty,
    StockSymbol,
    CurrencyCode,
    FlareClass,
    HttpUrl,
}

#[derive(Debug, Clone, Copy)]
struct FieldRule {
    field: &'static str,
    required: bool,
    check: Check,
}

const fn required(field: &'static str, check: Check) -> FieldRule {
    FieldRule {
        field,
        required: true,
        check,
    }
}

const fn optional(field: &'static str, check: Check) -> FieldRule {
    FieldRule {
        field,
        required: false,
        check,
    }
}

const CELSIUS: Check = Check::Range(-100.0, 60.0);
const PERCENT: Check = Check::Range(0.0, 100.0);

fn rules(kind: RecordKind) -> &'static [FieldRule] {
    const STOCK: &[FieldRule] = &[
        required("symbol", Check::StockSymbol),
        optional("open", Check::NonNegative),
        optional("high", Check::NonNegative),
        optional("low", Check::NonNegative),
        optional("close", Check::NonNegative),
        optional("volume", Check::NonNegative),
    ];
    const CRYPTO: &[FieldRule] = &[
        required("symbol", Check::NonEmpty),
        required("price_usd", Check::NonNegative),
        optional("market_cap", Check::NonNegative),
        optional("volume_24h", Check::NonNegative),
    ];
    const FOREX: &[FieldRule] = &[
        required("from_currency", Check::CurrencyCode),
        required("to_currency", Check::CurrencyCode),
        required("rate", Check::NonNegative),
        optional("bid", Check::NonNegative),
        optional("ask", Check::NonNegative),
    ];
    const NEO: &[FieldRule] = &[
        required("name", Check::NonEmpty),
        optional("diameter_min_m", Check::NonNegative),
        optional("diameter_max_m", Check::NonNegative),
        optional("miss_distance_km", Check::NonNegative),
        optional("velocity_kmh", Check::NonNegative),
    ];
    const SOLAR_FLARE: &[FieldRule] = &[
        required("begin_time", Check::NonEmpty),
        required("class_type", Check::FlareClass),
    ];
    const WEATHER: &[FieldRule] = &[
        required("temperature_c", CELSIUS),
        optional("feels_like_c", CELSIUS),
        optional("temp_min_c", CELSIUS),
        optional("temp_max_c", CELSIUS),
        optional("humidity_percent", PERCENT),
        optional("pressure_hpa", Check::Range(800.0, 1100.0)),
        optional("wind_speed_ms", Check::NonNegative),
        optional("clouds_percent", PERCENT),
    ];
    const NEWS: &[FieldRule] = &[
        required("title", Check::NonEmpty),
        required("link", Check::HttpUrl),
    ];
    const EARTHQUAKE: &[FieldRule] = &[
        required("magnitude", Check::Range(-2.0, 10.0)),
        optional("depth_km", Check::Range(-10.0, 800.0)),
    ];
    const EVENT: &[FieldRule] = &[required("title", Check::NonEmpty)];

    match kind {
        RecordKind::Stock => STOCK,
        RecordKind::Crypto => CRYPTO,
        RecordKind::ForexRate => FOREX,
        RecordKind::NearEarthObject => NEO,
        RecordKind::SolarFlare => SOLAR_FLARE,
        RecordKind::Weather => WEATHER,
        RecordKind::NewsArticle => NEWS,
        RecordKind::Earthquake => EARTHQUAKE,
        RecordKind::Storm | RecordKind::Wildfire => EVENT,
    }
}

#[derive(Debug, Clone)]
pub struct Validator {
    epoch: NaiveDate,
}

impl Validator {
    pub fn new(epoch: NaiveDate) -> Self {
        Self { epoch }
    }

    pub fn epoch(&self) -> NaiveDate {
        self.epoch
    }

    pub fn validate(&self, kind: RecordKind, draft: RecordDraft) -> Validation {
        match self.check(kind, &draft) {
            Ok(key) => Validation::Valid(NormalizedRecord {
                kind,
                key,
                fields: draft.fields,
                location: draft.location,
                location_source: draft.location_source,
            }),
            Err(reason) => Validation::Invalid(reason),
        }
    }

    fn check(&self, kind: RecordKind, draft: &RecordDraft) -> Result<NaturalKey, String> {
        let key = NaturalKey::extract(kind, &draft.fields)
            .map_err(|field| format!("missing natural key field `{field}`"))?;

        for rule in rules(kind) {
            match draft.fields.get(rule.field) {
                Some(value) => check_value(rule.field, rule.check, value)?,
                None if rule.required => {
                    return Err(format!("missing required field `{}`", rule.field));
                }
                None => {}
            }
        }

        match draft.location {
            Some(location) if !location.is_valid() => {
                return Err(format!("coordinates out of range: {location}"));
            }
            None if kind.location_policy() == LocationPolicy::Required
                && kind.resolution().is_none() =>
            {
                return Err("missing coordinates".to_string());
            }
            _ => {}
        }

        let date_field = kind.event_date_field();
        if let Some(value) = draft.fields.get(date_field) {
            let text = value
                .as_text()
                .ok_or_else(|| format!("`{date_field}` is not a date"))?;
            let date = parse_event_date(text)
                .ok_or_else(|| format!("`{date_field}` is not a date: {text}"))?;
            if date < self.epoch {
                return Err(format!(
                    "`{date_field}` {date} precedes collection epoch {}",
                    self.epoch
                ));
            }
        }

        Ok(key)
    }
}

fn check_value(field: &str, check: Check, value: &FieldValue) -> Result<(), String> {
    match check {
        Check::Range(min, max) => {
            let number = numeric(field, value)?;
            if !(min..=max).contains(&number) {
                return Err(format!("`{field}` = {number} outside [{min}, {max}]"));
            }
        }
        Check::NonNegative => {
            let number = numeric(field, value)?;
            if number < 0.0 {
                return Err(format!("`{field}` = {number} is negative"));
            }
        }
        Check::NonEmpty => {
            if value.is_blank() {
                return Err(format!("`{field}` is empty"));
            }
        }
        Check::StockSymbol => {
            let symbol = value.as_text().unwrap_or_default();
            if !STOCK_SYMBOL.is_match(symbol) {
                return Err(format!("invalid stock symbol `{value}`"));
            }
        }
        Check::CurrencyCode => {
            let code = value.as_text().unwrap_or_default();
            if !CURRENCY_CODE.is_match(code) {
                return Err(format!("`{field}` is not a currency code: {value}"));
            }
        }
        Check::FlareClass => {
            let class = value.as_text().unwrap_or_default();
            if !FLARE_CLASS.is_match(class) {
                return Err(format!("invalid flare class `{value}`"));
            }
        }
        Check::HttpUrl => {
            let link = value.as_text().unwrap_or_default().trim();
            let has_scheme = link.starts_with("http://") || link.starts_with("https://");
            if !has_scheme || link.len() <= "https://".len() {
                return Err(format!("`{field}` is not an http(s) URL: {value}"));
            }
        }
    }
    Ok(())
}

fn numeric(field: &str, value: &FieldValue) -> Result<f64, String> {
    value
        .as_f64()
        .filter(|number| number.is_finite())
        .ok_or_else(|| format!("`{field}` is not numeric: {value}"))
}

/// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` dates.
pub fn parse_event_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.date_naive());
    }
    let date_part = text.get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}
