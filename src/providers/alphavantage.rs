use serde_json::Value;

use crate::domain::{CollectionWindow, Layer, RecordDraft, RecordKind, SourceId, SourceRecord};
use crate::fetch::{Fetch, FetchRequest};
use crate::providers::{ItemFailure, ItemResult, SourceAdapter, integer_at, number_at, text_at};

pub const COLLECTOR: &str = "stocks";
const BASE_URL: &str = "https://www.alphavantage.co/query";

pub struct StocksAdapter {
    symbols: Vec<String>,
    api_key: Option<String>,
    base_url: String,
}

impl StocksAdapter {
    pub fn new(symbols: Vec<String>, api_key: Option<String>) -> Self {
        Self {
            symbols,
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn fetch_quote(&self, fetcher: &dyn Fetch, api_key: &str, symbol: &str) -> ItemResult {
        let request = FetchRequest::get(SourceId::AlphaVantage, &self.base_url)
            .param("function", "GLOBAL_QUOTE")
            .param("symbol", symbol)
            .param("apikey", api_key);
        let body = fetcher
            .fetch(&request)
            .into_json()
            .map_err(|reason| ItemFailure::new(symbol, reason))?;

        if let Some(message) = refusal_message(&body) {
            return Err(ItemFailure::new(symbol, message));
        }
        match body.get("Global Quote") {
            Some(Value::Object(quote)) if !quote.is_empty() => Ok(SourceRecord::new(
                SourceId::AlphaVantage,
                symbol,
                Value::Object(quote.clone()),
            )),
            _ => Err(ItemFailure::new(symbol, "no quote in response")),
        }
    }
}

/// Quota exhaustion and bad parameters both come back as 200 with a message body.
pub(crate) fn refusal_message(body: &Value) -> Option<String> {
    text_at(body, "/Error Message")
        .or_else(|| text_at(body, "/Note"))
        .or_else(|| text_at(body, "/Information"))
}

impl SourceAdapter for StocksAdapter {
    fn collector_name(&self) -> &str {
        COLLECTOR
    }

    fn layer(&self) -> Layer {
        Layer::Markets
    }

    fn kind(&self) -> RecordKind {
        RecordKind::Stock
    }

    fn list_items(&self, fetcher: &dyn Fetch, _window: &CollectionWindow) -> Vec<ItemResult> {
        let Some(api_key) = self.api_key.as_deref() else {
            return vec![Err(ItemFailure::new(COLLECTOR, "ALPHA_VANTAGE_KEY is not set"))];
        };
        self.symbols
            .iter()
            .map(|symbol| self.fetch_quote(fetcher, api_key, symbol))
            .collect()
    }

    fn map_fields(&self, record: &SourceRecord) -> Result<RecordDraft, String> {
        let quote = &record.payload;
        let symbol = text_at(quote, "/01. symbol").unwrap_or_else(|| record.label.clone());
        Ok(RecordDraft::new()
            .with("symbol", symbol.to_uppercase())
            .with_opt("date", text_at(quote, "/07. latest trading day"))
            .with_opt("open", number_at(quote, "/02. open"))
            .with_opt("high", number_at(quote, "/03. high"))
            .with_opt("low", number_at(quote, "/04. low"))
            .with_opt("close", number_at(quote, "/05. price"))
            .with_opt("volume", integer_at(quote, "/06. volume"))
            .with_opt("change_percent", text_at(quote, "/10. change percent")))
    }
}
