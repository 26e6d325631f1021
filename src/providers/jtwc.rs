use quick_xml::Reader;
use quick_xml::events::Event;

use crate::domain::SourceId;
use crate::fetch::{Fetch, FetchRequest};
use crate::resolve::{LocatedEntity, SecondarySource, parse_coordinates};

const RSS_URL: &str = "https://www.metoc.navy.mil/jtwc/rss/jtwc.rss";

pub struct JtwcSource {
    url: String,
}

impl JtwcSource {
    pub fn new() -> Self {
        Self {
            url: RSS_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

impl Default for JtwcSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SecondarySource for JtwcSource {
    fn source_id(&self) -> SourceId {
        SourceId::Jtwc
    }

    fn located_entities(&self, fetcher: &dyn Fetch) -> Result<Vec<LocatedEntity>, String> {
        let body = fetcher
            .fetch(&FetchRequest::get(SourceId::Jtwc, &self.url))
            .into_body()?;
        let items = parse_rss_items(&body)?;
        Ok(items
            .into_iter()
            .filter_map(|item| {
                let coordinates =
                    parse_coordinates(&item.description).or_else(|| parse_coordinates(&item.title))?;
                Some(LocatedEntity {
                    name: storm_name(&item.title).to_string(),
                    coordinates,
                })
            })
            .collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RssItem {
    pub title: String,
    pub description: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Description,
}

pub fn parse_rss_items(xml: &str) -> Result<Vec<RssItem>, String> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut items = Vec::new();
    let mut current: Option<RssItem> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"item" => current = Some(RssItem::default()),
                b"title" => field = Some(Field::Title),
                b"description" => field = Some(Field::Description),
                _ => {}
            },
            Ok(Event::Text(te)) => {
                let text = te.unescape().unwrap_or_default();
                append(current.as_mut(), field, &text);
            }
            Ok(Event::CData(cdata)) => {
                let raw = cdata.into_inner();
                append(current.as_mut(), field, &String::from_utf8_lossy(&raw));
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"item" => {
                    if let Some(item) = current.take().filter(|item| !item.title.is_empty()) {
                        items.push(item);
                    }
                }
                b"title" | b"description" => field = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(format!(
                    "malformed RSS at byte {}: {err}",
                    reader.buffer_position()
                ));
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(items)
}

/// `"Typhoon 16W (Kalmaegi) Warning #20"` names the storm `"Typhoon 16W (Kalmaegi)"`.
fn storm_name(title: &str) -> &str {
    match title.to_ascii_lowercase().find(" warning") {
        Some(end) => title[..end].trim(),
        None => title.trim(),
    }
}

fn append(item: Option<&mut RssItem>, field: Option<Field>, text: &str) {
    let (Some(item), Some(field)) = (item, field) else {
        return;
    };
    let target = match field {
        Field::Title => &mut item.title,
        Field::Description => &mut item.description,
    };
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(text.trim());
}
