use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use crate::domain::{
    Confidence, Coordinates, NameKey, ResolutionCandidate, ResolutionStrategy, SourceId,
};
use crate::fetch::Fetch;
use crate::normalize::NameNormalizer;

static COORDINATE_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+\.?\d*)\s*°?\s*([NS])\s*,?\s*(\d+\.?\d*)\s*°?\s*([EW])")
        .expect("coordinate pattern is valid")
});

#[derive(Debug, Clone, PartialEq)]
pub struct LocatedEntity {
    pub name: String,
    pub coordinates: Coordinates,
}

pub trait SecondarySource {
    fn source_id(&self) -> SourceId;
    fn located_entities(&self, fetcher: &dyn Fetch) -> Result<Vec<LocatedEntity>, String>;
}

pub trait Geocoder {
    fn source_id(&self) -> SourceId;
    fn geocode(&self, fetcher: &dyn Fetch, place: &str) -> Result<Option<Coordinates>, String>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(ResolutionCandidate),
    Unresolved(String),
}

type KeyedEntities = Vec<(NameKey, LocatedEntity)>;

/// Secondary sources are consulted in the order they were added; the first
/// source with a containment match wins even if a later one also matches.
pub struct Resolver {
    normalizer: NameNormalizer,
    sources: Vec<Box<dyn SecondarySource>>,
    geocoder: Option<Box<dyn Geocoder>>,
    entity_cache: Vec<Option<KeyedEntities>>,
    geocode_cache: HashMap<String, Option<Coordinates>>,
}

impl Resolver {
    pub fn new(normalizer: NameNormalizer) -> Self {
        Self {
            normalizer,
            sources: Vec::new(),
            geocoder: None,
            entity_cache: Vec::new(),
            geocode_cache: HashMap::new(),
        }
    }

    pub fn with_source(mut self, source: Box<dyn SecondarySource>) -> Self {
        self.sources.push(source);
        self.entity_cache.push(None);
        self
    }

    pub fn with_geocoder(mut self, geocoder: Box<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn begin_run(&mut self) {
        self.entity_cache.iter_mut().for_each(|slot| *slot = None);
        self.geocode_cache.clear();
    }

    pub fn resolve(
        &mut self,
        fetcher: &dyn Fetch,
        strategy: ResolutionStrategy,
        title: &str,
    ) -> Resolution {
        match strategy {
            ResolutionStrategy::NameMatch => self.resolve_by_name(fetcher, title),
            ResolutionStrategy::Geocode => self.resolve_by_geocode(fetcher, title),
        }
    }

    pub fn resolve_by_name(&mut self, fetcher: &dyn Fetch, title: &str) -> Resolution {
        let key = self.normalizer.normalize(title);
        if key.is_empty() {
            info!(title, "unresolved: title yields an empty name key");
            return Resolution::Unresolved("empty name key".to_string());
        }

        for index in 0..self.sources.len() {
            self.load_source(index, fetcher);
            let source_id = self.sources[index].source_id();
            let Some(entities) = self.entity_cache[index].as_ref() else {
                continue;
            };
            let found = entities.iter().find(|(candidate, entity)| {
                key.matches(candidate) && entity.coordinates.is_valid()
            });
            if let Some((candidate_key, entity)) = found {
                let confidence = if *candidate_key == key {
                    Confidence::Exact
                } else {
                    Confidence::Contains
                };
                info!(
                    title,
                    name_key = %key,
                    source = %source_id,
                    matched = %entity.name,
                    coordinates = %entity.coordinates,
                    "resolved by name"
                );
                return Resolution::Resolved(ResolutionCandidate {
                    name_key: candidate_key.clone(),
                    coordinates: entity.coordinates,
                    confidence,
                    source_id,
                });
            }
        }

        info!(title, name_key = %key, "unresolved: no secondary source matched");
        Resolution::Unresolved(format!("no secondary source matched `{key}`"))
    }

    pub fn resolve_by_geocode(&mut self, fetcher: &dyn Fetch, title: &str) -> Resolution {
        let Some(locality) = extract_locality(title) else {
            info!(title, "unresolved: no locality in title");
            return Resolution::Unresolved("no locality in title".to_string());
        };
        let Some(geocoder) = self.geocoder.as_ref() else {
            info!(title, locality = %locality, "unresolved: no geocoder configured");
            return Resolution::Unresolved("no geocoder configured".to_string());
        };

        let found = match self.geocode_cache.get(&locality) {
            Some(cached) => *cached,
            None => match geocoder.geocode(fetcher, &locality) {
                Ok(found) => {
                    self.geocode_cache.insert(locality.clone(), found);
                    found
                }
                Err(reason) => {
                    warn!(title, locality = %locality, reason = %reason, "geocoding failed");
                    self.geocode_cache.insert(locality, None);
                    return Resolution::Unresolved(format!("geocoding failed: {reason}"));
                }
            },
        };

        match found {
            Some(coordinates) if coordinates.is_valid() => {
                info!(title, locality = %locality, coordinates = %coordinates, "resolved by geocoding");
                Resolution::Resolved(ResolutionCandidate {
                    name_key: NameKey::new(locality.to_lowercase()),
                    coordinates,
                    confidence: Confidence::Geocoded,
                    source_id: geocoder.source_id(),
                })
            }
            _ => {
                info!(title, locality = %locality, "unresolved: locality not found");
                Resolution::Unresolved(format!("locality `{locality}` not found"))
            }
        }
    }

    fn load_source(&mut self, index: usize, fetcher: &dyn Fetch) {
        if self.entity_cache[index].is_some() {
            return;
        }
        let source = &self.sources[index];
        let entities = match source.located_entities(fetcher) {
            Ok(entities) => {
                info!(source = %source.source_id(), count = entities.len(), "loaded secondary source");
                entities
            }
            Err(reason) => {
                warn!(source = %source.source_id(), reason = %reason, "secondary source unavailable for this run");
                Vec::new()
            }
        };
        let normalizer = &self.normalizer;
        let keyed = entities
            .into_iter()
            .map(|entity| (normalizer.normalize(&entity.name), entity))
            .collect();
        self.entity_cache[index] = Some(keyed);
    }
}

pub fn extract_locality(title: &str) -> Option<String> {
    let parts = title
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>();
    match parts.as_slice() {
        [.., region, state] => Some(format!("{region}, {state}")),
        _ => None,
    }
}

/// Finds the first `15.8N 120.5E` style pair in free text. South and west are negative.
pub fn parse_coordinates(text: &str) -> Option<Coordinates> {
    let captures = COORDINATE_PAIR.captures(text)?;
    let mut latitude = captures.get(1)?.as_str().parse::<f64>().ok()?;
    let mut longitude = captures.get(3)?.as_str().parse::<f64>().ok()?;
    if captures.get(2)?.as_str().eq_ignore_ascii_case("s") {
        latitude = -latitude;
    }
    if captures.get(4)?.as_str().eq_ignore_ascii_case("w") {
        longitude = -longitude;
    }
    let coordinates = Coordinates::new(latitude, longitude);
    coordinates.is_valid().then_some(coordinates)
}
