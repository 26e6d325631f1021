use serde_json::Value;

use crate::config::CurrencyPair;
use crate::domain::{CollectionWindow, Layer, RecordDraft, RecordKind, SourceId, SourceRecord};
use crate::fetch::{Fetch, FetchRequest};
use crate::providers::alphavantage::refusal_message;
use crate::providers::{ItemFailure, ItemResult, SourceAdapter, number_at, text_at};

pub const COLLECTOR: &str = "forex";
const BASE_URL: &str = "https://www.alphavantage.co/query";

pub struct ForexAdapter {
    pairs: Vec<CurrencyPair>,
    api_key: Option<String>,
    base_url: String,
}

impl ForexAdapter {
    pub fn new(pairs: Vec<CurrencyPair>, api_key: Option<String>) -> Self {
        Self {
            pairs,
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn fetch_rate(&self, fetcher: &dyn Fetch, api_key: &str, pair: &CurrencyPair) -> ItemResult {
        let label = pair.label();
        let request = FetchRequest::get(SourceId::AlphaVantage, &self.base_url)
            .param("function", "CURRENCY_EXCHANGE_RATE")
            .param("from_currency", &pair.from)
            .param("to_currency", &pair.to)
            .param("apikey", api_key);
        let body = fetcher
            .fetch(&request)
            .into_json()
            .map_err(|reason| ItemFailure::new(&label, reason))?;

        if let Some(message) = refusal_message(&body) {
            return Err(ItemFailure::new(&label, message));
        }
        match body.get("Realtime Currency Exchange Rate") {
            Some(Value::Object(rate)) if !rate.is_empty() => Ok(SourceRecord::new(
                SourceId::AlphaVantage,
                label,
                Value::Object(rate.clone()),
            )),
            _ => Err(ItemFailure::new(label, "no exchange rate in response")),
        }
    }
}

impl SourceAdapter for ForexAdapter {
    fn collector_name(&self) -> &str {
        COLLECTOR
    }

    fn layer(&self) -> Layer {
        Layer::Markets
    }

    fn kind(&self) -> RecordKind {
        RecordKind::ForexRate
    }

    fn list_items(&self, fetcher: &dyn Fetch, _window: &CollectionWindow) -> Vec<ItemResult> {
        let Some(api_key) = self.api_key.as_deref() else {
            return vec![Err(ItemFailure::new(COLLECTOR, "ALPHA_VANTAGE_KEY is not set"))];
        };
        self.pairs
            .iter()
            .map(|pair| self.fetch_rate(fetcher, api_key, pair))
            .collect()
    }

    fn map_fields(&self, record: &SourceRecord) -> Result<RecordDraft, String> {
        let rate = &record.payload;
        let from = text_at(rate, "/1. From_Currency Code").map(|code| code.to_uppercase());
        let to = text_at(rate, "/3. To_Currency Code").map(|code| code.to_uppercase());
        let pair = match (&from, &to) {
            (Some(from), Some(to)) => format!("{from}/{to}"),
            _ => record.label.clone(),
        };
        let refreshed = text_at(rate, "/6. Last Refreshed");
        let date = refreshed
            .as_deref()
            .and_then(|text| text.get(..10))
            .map(str::to_string);

        Ok(RecordDraft::new()
            .with("pair", pair)
            .with_opt("date", date)
            .with_opt("from_currency", from)
            .with_opt("to_currency", to)
            .with_opt("rate", number_at(rate, "/5. Exchange Rate"))
            .with_opt("bid", number_at(rate, "/8. Bid Price"))
            .with_opt("ask", number_at(rate, "/9. Ask Price"))
            .with_opt("refreshed_at", refreshed))
    }
}
