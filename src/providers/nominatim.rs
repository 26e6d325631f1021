use serde_json::Value;

use crate::domain::{Coordinates, SourceId};
use crate::fetch::{Fetch, FetchOutcome, FetchRequest};
use crate::providers::number_at;
use crate::resolve::Geocoder;

const SEARCH_URL: &str = "https://nominatim.openstreetmap.org/search";

pub struct NominatimGeocoder {
    url: String,
}

impl NominatimGeocoder {
    pub fn new() -> Self {
        Self {
            url: SEARCH_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

impl Default for NominatimGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Geocoder for NominatimGeocoder {
    fn source_id(&self) -> SourceId {
        SourceId::Nominatim
    }

    fn geocode(&self, fetcher: &dyn Fetch, place: &str) -> Result<Option<Coordinates>, String> {
        let request = FetchRequest::get(SourceId::Nominatim, &self.url)
            .param("q", place)
            .param("format", "json")
            .param("limit", "1");
        let body = match fetcher.fetch(&request) {
            FetchOutcome::NotFound => return Ok(None),
            outcome => outcome.into_json()?,
        };
        Ok(first_place(&body))
    }
}

fn first_place(body: &Value) -> Option<Coordinates> {
    let place = body.as_array()?.first()?;
    let latitude = number_at(place, "/lat")?;
    let longitude = number_at(place, "/lon")?;
    Some(Coordinates::new(latitude, longitude))
}
