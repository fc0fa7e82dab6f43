//! Maps per-site raw records into [`NormalizedEvent`]s.
//!
//! Source adapters ([`FieldMapAdapter`] for structured payloads,
//! [`SelectorExtractor`] for markup) only pull candidate values out of a
//! payload; every record then passes through [`Normalizer::normalize`].

mod adapter;
mod extractor;

pub use adapter::{FieldMap, FieldMapAdapter, FieldSource};
pub use extractor::{SelectorExtractor, SelectorTable};

use crate::domain::{NormalizedEvent, RawRecord, NOT_AVAILABLE};

#[derive(Clone)]
pub struct Normalizer;

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Total and idempotent: blank values become `"N/A"`, whitespace is
    /// trimmed and collapsed, and a missing sanction is attributed to
    /// `source_tag`.
    pub fn normalize(&self, raw: &RawRecord, source_tag: &str) -> NormalizedEvent {
        let sanction = clean(raw.sanction.as_deref())
            .or_else(|| clean(Some(source_tag)))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        NormalizedEvent {
            event_name: field(raw.event_name.as_deref()),
            start_date: field(raw.start_date.as_deref()),
            end_date: field(raw.end_date.as_deref()),
            location: field(raw.location.as_deref()),
            sanction,
            link: field(raw.link.as_deref()),
        }
    }

    /// Normalize a batch, dropping records that carry no data at all.
    pub fn normalize_all(&self, records: &[RawRecord], source_tag: &str) -> Vec<NormalizedEvent> {
        records
            .iter()
            .filter(|raw| !is_blank(raw))
            .map(|raw| self.normalize(raw, source_tag))
            .collect()
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    let collapsed = value?.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

fn field(value: Option<&str>) -> String {
    clean(value).unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn is_blank(raw: &RawRecord) -> bool {
    [
        &raw.event_name,
        &raw.start_date,
        &raw.end_date,
        &raw.location,
        &raw.sanction,
        &raw.link,
    ]
    .iter()
    .all(|value| clean(value.as_deref()).is_none())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawRecord {
        RawRecord {
            event_name: Some("  Fall   Classic \n 14U ".into()),
            start_date: Some("2024-10-05".into()),
            end_date: None,
            location: Some("\tIndianapolis, IN".into()),
            sanction: None,
            link: Some("".into()),
        }
    }

    #[test]
    fn test_normalize_cleans_and_fills() {
        let event = Normalizer::new().normalize(&raw(), "USSSA");

        assert_eq!(event.event_name, "Fall Classic 14U");
        assert_eq!(event.start_date, "2024-10-05");
        assert_eq!(event.end_date, "N/A");
        assert_eq!(event.location, "Indianapolis, IN");
        assert_eq!(event.sanction, "USSSA");
        assert_eq!(event.link, "N/A");
    }

    #[test]
    fn test_explicit_sanction_wins() {
        let record = RawRecord {
            sanction: Some(" PGF ".into()),
            ..raw()
        };
        assert_eq!(Normalizer::new().normalize(&record, "USSSA").sanction, "PGF");
    }

    #[test]
    fn test_empty_record_is_all_sentinels() {
        let event = Normalizer::new().normalize(&RawRecord::default(), "  ");
        assert!(event.fields().iter().all(|f| *f == NOT_AVAILABLE));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let normalizer = Normalizer::new();
        for tag in ["USSSA", ""] {
            let once = normalizer.normalize(&raw(), tag);
            let twice = normalizer.normalize(&RawRecord::from(&once), tag);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_normalize_all_drops_blank_records() {
        let records = vec![
            raw(),
            RawRecord::default(),
            RawRecord {
                location: Some("   ".into()),
                ..Default::default()
            },
        ];
        let events = Normalizer::new().normalize_all(&records, "USSSA");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_name, "Fall Classic 14U");
    }
}
