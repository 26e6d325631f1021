use serde_json::Value;

use crate::domain::{Coordinates, SourceId};
use crate::fetch::{Fetch, FetchRequest};
use crate::providers::{number_at, text_at};
use crate::resolve::{LocatedEntity, SecondarySource};

const CURRENT_STORMS_URL: &str = "https://www.nhc.noaa.gov/CurrentStorms.json";

pub struct NoaaSource {
    url: String,
}

impl NoaaSource {
    pub fn new() -> Self {
        Self {
            url: CURRENT_STORMS_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

impl Default for NoaaSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SecondarySource for NoaaSource {
    fn source_id(&self) -> SourceId {
        SourceId::Noaa
    }

    fn located_entities(&self, fetcher: &dyn Fetch) -> Result<Vec<LocatedEntity>, String> {
        let body = fetcher
            .fetch(&FetchRequest::get(SourceId::Noaa, &self.url))
            .into_json()?;
        Ok(parse_active_storms(&body))
    }
}

pub fn parse_active_storms(body: &Value) -> Vec<LocatedEntity> {
    let Some(storms) = body.get("activeStorms").and_then(Value::as_array) else {
        return Vec::new();
    };
    storms
        .iter()
        .filter_map(|storm| {
            let name = text_at(storm, "/name")?;
            let latitude = number_at(storm, "/latitudeNumeric")?;
            let longitude = number_at(storm, "/longitudeNumeric")?;
            Some(LocatedEntity {
                name,
                coordinates: Coordinates::new(latitude, longitude),
            })
        })
        .collect()
}
