use serde_json::{Value, json};

use crate::domain::{CollectionWindow, Layer, RecordDraft, RecordKind, SourceId, SourceRecord};
use crate::fetch::{Fetch, FetchRequest};
use crate::providers::{ItemFailure, ItemResult, SourceAdapter, text_at};

pub const COLLECTOR: &str = "news";
const BASE_URL: &str = "https://newsapi.org/v2/top-headlines";
const PAGE_SIZE: &str = "50";

pub struct NewsAdapter {
    categories: Vec<String>,
    api_key: Option<String>,
    base_url: String,
}

impl NewsAdapter {
    pub fn new(categories: Vec<String>, api_key: Option<String>) -> Self {
        Self {
            categories,
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn fetch_category(
        &self,
        fetcher: &dyn Fetch,
        api_key: &str,
        category: &str,
    ) -> Result<Vec<Value>, String> {
        let request = FetchRequest::get(SourceId::NewsApi, &self.base_url)
            .param("category", category)
            .param("language", "en")
            .param("pageSize", PAGE_SIZE)
            .param("apiKey", api_key);
        let body = fetcher.fetch(&request).into_json()?;
        if text_at(&body, "/status").as_deref() == Some("error") {
            let message = text_at(&body, "/message").unwrap_or_else(|| "unknown error".to_string());
            return Err(message);
        }
        match body.get("articles") {
            Some(Value::Array(articles)) => Ok(articles.clone()),
            _ => Err("missing articles".to_string()),
        }
    }
}

impl SourceAdapter for NewsAdapter {
    fn collector_name(&self) -> &str {
        COLLECTOR
    }

    fn layer(&self) -> Layer {
        Layer::News
    }

    fn kind(&self) -> RecordKind {
        RecordKind::NewsArticle
    }

    fn list_items(&self, fetcher: &dyn Fetch, _window: &CollectionWindow) -> Vec<ItemResult> {
        let Some(api_key) = self.api_key.as_deref() else {
            return vec![Err(ItemFailure::new(COLLECTOR, "NEWSAPI_KEY is not set"))];
        };
        let mut items = Vec::new();
        for category in &self.categories {
            match self.fetch_category(fetcher, api_key, category) {
                Ok(articles) => items.extend(articles.into_iter().map(|article| {
                    let label = text_at(&article, "/url").unwrap_or_else(|| category.clone());
                    Ok(SourceRecord::new(
                        SourceId::NewsApi,
                        label,
                        json!({ "category": category, "article": article }),
                    ))
                })),
                Err(reason) => items.push(Err(ItemFailure::new(category, reason))),
            }
        }
        items
    }

    fn map_fields(&self, record: &SourceRecord) -> Result<RecordDraft, String> {
        let payload = &record.payload;
        let article = payload
            .get("article")
            .ok_or_else(|| "payload has no article".to_string())?;
        Ok(RecordDraft::new()
            .with_opt("link", text_at(article, "/url"))
            .with_opt("title", text_at(article, "/title"))
            .with_opt("source", text_at(article, "/source/name"))
            .with_opt("category", text_at(payload, "/category"))
            .with_opt("description", text_at(article, "/description"))
            .with_opt("author", text_at(article, "/author"))
            .with_opt("published_at", text_at(article, "/publishedAt")))
    }
}
