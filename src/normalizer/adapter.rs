use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::domain::RawRecord;

/// Where a field's value comes from, as JSON pointers relative to one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldSource {
    /// A single pointer.
    One(String),
    /// The first pointer holding a non-blank scalar.
    First(Vec<String>),
    /// Every non-blank value, joined.
    Join {
        join: Vec<String>,
        #[serde(default = "default_separator")]
        separator: String,
    },
}

fn default_separator() -> String {
    ", ".to_string()
}

impl FieldSource {
    fn first<I: IntoIterator<Item = &'static str>>(pointers: I) -> Self {
        FieldSource::First(pointers.into_iter().map(String::from).collect())
    }

    fn resolve(&self, record: &Value) -> Option<String> {
        match self {
            FieldSource::One(pointer) => scalar(record.pointer(pointer)?),
            FieldSource::First(pointers) => pointers
                .iter()
                .find_map(|pointer| record.pointer(pointer).and_then(scalar)),
            FieldSource::Join { join, separator } => {
                let parts: Vec<String> = join
                    .iter()
                    .filter_map(|pointer| record.pointer(pointer).and_then(scalar))
                    .collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join(separator))
                }
            }
        }
    }
}

/// Data-driven mapping from a structured payload to raw event records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMap {
    /// Pointer to the array of records. When unset, common envelope keys are
    /// tried and a bare array is used as-is.
    pub records: Option<String>,

    /// Base URL for resolving relative links
    pub link_base: Option<String>,

    pub event_name: FieldSource,
    pub start_date: FieldSource,
    pub end_date: FieldSource,
    pub location: FieldSource,
    pub sanction: FieldSource,
    pub link: FieldSource,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            records: None,
            link_base: None,
            event_name: FieldSource::first(["/name", "/eventName", "/event_name", "/title"]),
            start_date: FieldSource::first(["/startDate", "/start_date", "/start", "/dates/start"]),
            end_date: FieldSource::first(["/endDate", "/end_date", "/end", "/dates/end"]),
            location: FieldSource::first(["/location", "/venue/name", "/venue", "/city"]),
            sanction: FieldSource::first(["/sanction", "/sanctioningBody", "/organization"]),
            link: FieldSource::first(["/url", "/link", "/href", "/registrationUrl"]),
        }
    }
}

const ENVELOPE_POINTERS: [&str; 6] = [
    "/events",
    "/data/events",
    "/data",
    "/results",
    "/items",
    "/tournaments",
];

pub struct FieldMapAdapter {
    map: FieldMap,
}

impl FieldMapAdapter {
    pub fn new(map: FieldMap) -> Self {
        Self { map }
    }

    pub fn records(&self, payload: &Value) -> Vec<RawRecord> {
        self.locate(payload)
            .iter()
            .filter(|record| record.is_object())
            .map(|record| self.record(record))
            .collect()
    }

    fn locate<'a>(&self, payload: &'a Value) -> Vec<&'a Value> {
        if let Some(ref pointer) = self.map.records {
            return match payload.pointer(pointer) {
                Some(Value::Array(items)) => items.iter().collect(),
                Some(other) => vec![other],
                None => Vec::new(),
            };
        }

        if let Value::Array(items) = payload {
            return items.iter().collect();
        }

        ENVELOPE_POINTERS
            .iter()
            .find_map(|pointer| payload.pointer(pointer).and_then(Value::as_array))
            .map(|items| items.iter().collect())
            .unwrap_or_else(|| vec![payload])
    }

    fn record(&self, record: &Value) -> RawRecord {
        RawRecord {
            event_name: self.map.event_name.resolve(record),
            start_date: self.map.start_date.resolve(record),
            end_date: self.map.end_date.resolve(record),
            location: self.map.location.resolve(record),
            sanction: self.map.sanction.resolve(record),
            link: self
                .map
                .link
                .resolve(record)
                .map(|link| absolutize(self.map.link_base.as_deref(), link)),
        }
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn absolutize(base: Option<&str>, link: String) -> String {
    match base.and_then(|base| Url::parse(base).ok()) {
        Some(base) => base
            .join(&link)
            .map(|url| url.to_string())
            .unwrap_or(link),
        None => link,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_default_map_reads_common_keys() {
        let payload = json!({
            "data": {
                "events": [
                    {"eventName": "Fall Classic", "startDate": "2024-10-05", "city": "Muncie", "url": "https://x.test/e/1"},
                    {"title": "Winter Warmup", "dates": {"start": "2024-12-01", "end": "2024-12-02"}},
                    "not a record"
                ]
            }
        });

        let records = FieldMapAdapter::new(FieldMap::default()).records(&payload);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event_name.as_deref(), Some("Fall Classic"));
        assert_eq!(records[0].location.as_deref(), Some("Muncie"));
        assert_eq!(records[0].link.as_deref(), Some("https://x.test/e/1"));
        assert_eq!(records[1].end_date.as_deref(), Some("2024-12-02"));
        assert_eq!(records[1].sanction, None);
    }

    #[test]
    fn test_explicit_records_pointer_and_join() {
        let map: FieldMap = toml::from_str(
            r#"
            records = "/payload/rows"
            link_base = "https://pgfusa.com/tournaments/"
            event_name = "/tournament_name"
            link = "/slug"

            [location]
            join = ["/city", "/state"]
            "#,
        )
        .unwrap();

        let payload = json!({"payload": {"rows": [
            {"tournament_name": "PGF Nationals", "city": "Huntington Beach", "state": "CA", "slug": "nationals-2025"}
        ]}});

        let records = FieldMapAdapter::new(map).records(&payload);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_name.as_deref(), Some("PGF Nationals"));
        assert_eq!(records[0].location.as_deref(), Some("Huntington Beach, CA"));
        assert_eq!(
            records[0].link.as_deref(),
            Some("https://pgfusa.com/tournaments/nationals-2025")
        );
        // Unmapped fields fall back to the defaults
        assert_eq!(records[0].start_date, None);
    }

    #[test]
    fn test_single_object_payload_is_one_record() {
        let records = FieldMapAdapter::new(FieldMap::default()).records(&json!({"name": "Solo", "start": 20240101}));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].start_date.as_deref(), Some("20240101"));
    }

    #[test]
    fn test_missing_records_pointer_yields_nothing() {
        let map = FieldMap {
            records: Some("/nope".into()),
            ..Default::default()
        };
        assert!(FieldMapAdapter::new(map).records(&json!({"events": []})).is_empty());
    }
}
