use serde::{Deserialize, Serialize};

/// Sentinel that replaces every missing or blank field.
pub const NOT_AVAILABLE: &str = "N/A";

/// Column order shared by the CSV writer and the JSON document.
pub const EVENT_FIELDS: [&str; 6] = [
    "event_name",
    "start_date",
    "end_date",
    "location",
    "sanction",
    "link",
];

/// Canonical event record produced by the normalizer.
///
/// Every field is always present; missing data is [`NOT_AVAILABLE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub event_name: String,
    pub start_date: String,
    pub end_date: String,
    pub location: String,
    pub sanction: String,
    pub link: String,
}

impl NormalizedEvent {
    /// Fields in [`EVENT_FIELDS`] order.
    pub fn fields(&self) -> [&str; 6] {
        [
            &self.event_name,
            &self.start_date,
            &self.end_date,
            &self.location,
            &self.sanction,
            &self.link,
        ]
    }
}

/// Loosely-shaped record emitted by a source adapter before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub event_name: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub location: Option<String>,
    pub sanction: Option<String>,
    pub link: Option<String>,
}

impl From<&NormalizedEvent> for RawRecord {
    fn from(event: &NormalizedEvent) -> Self {
        Self {
            event_name: Some(event.event_name.clone()),
            start_date: Some(event.start_date.clone()),
            end_date: Some(event.end_date.clone()),
            location: Some(event.location.clone()),
            sanction: Some(event.sanction.clone()),
            link: Some(event.link.clone()),
        }
    }
}

/// Persisted JSON snapshot: `{count, events}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsDocument {
    pub count: usize,
    pub events: Vec<NormalizedEvent>,
}

impl EventsDocument {
    pub fn new(events: Vec<NormalizedEvent>) -> Self {
        Self {
            count: events.len(),
            events,
        }
    }
}

/// What a target yielded once its payload went through extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Harvest {
    Events(Vec<NormalizedEvent>),
    /// Markup no extractor could turn into events.
    Markup(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NormalizedEvent {
        NormalizedEvent {
            event_name: "Spring Classic".into(),
            start_date: "2024-04-06".into(),
            end_date: "2024-04-07".into(),
            location: "Indianapolis, IN".into(),
            sanction: "USSSA".into(),
            link: "https://example.com/e/1".into(),
        }
    }

    #[test]
    fn test_document_count_matches_events() {
        let doc = EventsDocument::new(vec![sample(), sample()]);
        assert_eq!(doc.count, 2);

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["count"], 2);
        assert_eq!(json["events"][0]["sanction"], "USSSA");
    }

    #[test]
    fn test_fields_follow_column_order() {
        let event = sample();
        let fields = event.fields();
        assert_eq!(fields[0], "Spring Classic");
        assert_eq!(fields[5], "https://example.com/e/1");
        assert_eq!(EVENT_FIELDS.len(), fields.len());
    }

    #[test]
    fn test_json_keys_are_stable() {
        let json = serde_json::to_value(sample()).unwrap();
        let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        for field in EVENT_FIELDS {
            assert!(keys.iter().any(|k| k == field), "missing {field}");
        }
    }
}
