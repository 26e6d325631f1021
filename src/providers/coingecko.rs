use serde_json::{Value, json};

use crate::domain::{CollectionWindow, Layer, RecordDraft, RecordKind, SourceId, SourceRecord};
use crate::fetch::{Fetch, FetchRequest};
use crate::providers::{ItemFailure, ItemResult, SourceAdapter, number_at, text_at};

pub const COLLECTOR: &str = "crypto";
const BASE_URL: &str = "https://api.coingecko.com/api/v3/coins/markets";

pub struct CryptoAdapter {
    coins: Vec<String>,
    base_url: String,
}

impl CryptoAdapter {
    pub fn new(coins: Vec<String>) -> Self {
        Self {
            coins,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl SourceAdapter for CryptoAdapter {
    fn collector_name(&self) -> &str {
        COLLECTOR
    }

    fn layer(&self) -> Layer {
        Layer::Markets
    }

    fn kind(&self) -> RecordKind {
        RecordKind::Crypto
    }

    fn list_items(&self, fetcher: &dyn Fetch, window: &CollectionWindow) -> Vec<ItemResult> {
        if self.coins.is_empty() {
            return Vec::new();
        }
        let request = FetchRequest::get(SourceId::CoinGecko, &self.base_url)
            .param("vs_currency", "usd")
            .param("ids", self.coins.join(","))
            .param("per_page", self.coins.len().to_string())
            .param("page", "1")
            .param("price_change_percentage", "24h");
        let body = match fetcher.fetch(&request).into_json() {
            Ok(body) => body,
            Err(reason) => return vec![Err(ItemFailure::new("coin markets", reason))],
        };
        let Value::Array(coins) = body else {
            return vec![Err(ItemFailure::new("coin markets", "expected a list of coins"))];
        };

        let date = window.end_date().to_string();
        coins
            .into_iter()
            .map(|coin| {
                let label = text_at(&coin, "/id").unwrap_or_else(|| "coin".to_string());
                Ok(SourceRecord::new(
                    SourceId::CoinGecko,
                    label,
                    json!({ "date": date, "coin": coin }),
                ))
            })
            .collect()
    }

    fn map_fields(&self, record: &SourceRecord) -> Result<RecordDraft, String> {
        let payload = &record.payload;
        let coin = payload
            .get("coin")
            .ok_or_else(|| "payload has no coin".to_string())?;
        let symbol = text_at(coin, "/symbol").map(|symbol| symbol.to_uppercase());

        Ok(RecordDraft::new()
            .with_opt("coin_id", text_at(coin, "/id"))
            .with_opt("date", text_at(payload, "/date"))
            .with_opt("symbol", symbol)
            .with_opt("name", text_at(coin, "/name"))
            .with_opt("price_usd", number_at(coin, "/current_price"))
            .with_opt("change_24h", number_at(coin, "/price_change_24h"))
            .with_opt(
                "change_percent_24h",
                number_at(coin, "/price_change_percentage_24h"),
            )
            .with_opt("market_cap", number_at(coin, "/market_cap"))
            .with_opt("volume_24h", number_at(coin, "/total_volume"))
            .with_opt("last_updated", text_at(coin, "/last_updated")))
    }
}
