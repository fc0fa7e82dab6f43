use ::scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::app::{Result, ScoutError};
use crate::domain::RawRecord;
use crate::normalizer::adapter::absolutize;

/// CSS selectors describing where events live in rendered markup.
///
/// `row` selects one element per event; field selectors are evaluated inside
/// each row and take the element's text. `link` takes the `href` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorTable {
    pub row: String,
    pub event_name: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub location: Option<String>,
    pub sanction: Option<String>,
    pub link: Option<String>,
    /// Base URL for resolving relative links
    pub link_base: Option<String>,
}

impl Default for SelectorTable {
    fn default() -> Self {
        Self {
            row: "table tbody tr".to_string(),
            event_name: Some("td:nth-of-type(1)".to_string()),
            start_date: Some("td:nth-of-type(2)".to_string()),
            end_date: Some("td:nth-of-type(3)".to_string()),
            location: Some("td:nth-of-type(4)".to_string()),
            sanction: None,
            link: Some("a[href]".to_string()),
            link_base: None,
        }
    }
}

struct CompiledFields {
    event_name: Option<Selector>,
    start_date: Option<Selector>,
    end_date: Option<Selector>,
    location: Option<Selector>,
    sanction: Option<Selector>,
    link: Option<Selector>,
}

/// Extracts raw records from markup using a [`SelectorTable`].
pub struct SelectorExtractor {
    row: Selector,
    fields: CompiledFields,
    link_base: Option<String>,
}

impl SelectorExtractor {
    pub fn new(table: &SelectorTable) -> Result<Self> {
        Ok(Self {
            row: compile(&table.row)?,
            fields: CompiledFields {
                event_name: compile_opt(table.event_name.as_deref())?,
                start_date: compile_opt(table.start_date.as_deref())?,
                end_date: compile_opt(table.end_date.as_deref())?,
                location: compile_opt(table.location.as_deref())?,
                sanction: compile_opt(table.sanction.as_deref())?,
                link: compile_opt(table.link.as_deref())?,
            },
            link_base: table.link_base.clone(),
        })
    }

    pub fn extract(&self, markup: &str) -> Vec<RawRecord> {
        let document = Html::parse_document(markup);

        document
            .select(&self.row)
            .map(|row| RawRecord {
                event_name: text_of(row, self.fields.event_name.as_ref()),
                start_date: text_of(row, self.fields.start_date.as_ref()),
                end_date: text_of(row, self.fields.end_date.as_ref()),
                location: text_of(row, self.fields.location.as_ref()),
                sanction: text_of(row, self.fields.sanction.as_ref()),
                link: self
                    .fields
                    .link
                    .as_ref()
                    .and_then(|selector| href_of(row, selector))
                    .map(|href| absolutize(self.link_base.as_deref(), href)),
            })
            .collect()
    }
}

fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| ScoutError::Config(format!("Invalid selector {:?}: {}", selector, e)))
}

fn compile_opt(selector: Option<&str>) -> Result<Option<Selector>> {
    selector.map(compile).transpose()
}

fn text_of(row: ElementRef<'_>, selector: Option<&Selector>) -> Option<String> {
    let element = row.select(selector?).next()?;
    let text = element.text().collect::<Vec<_>>().join(" ");
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn href_of(row: ElementRef<'_>, selector: &Selector) -> Option<String> {
    // A row that is itself the link has no matching descendant.
    if let Some(href) = row.value().attr("href") {
        return Some(href.to_string());
    }
    row.select(selector)
        .find_map(|element| element.value().attr("href"))
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::Normalizer;

    const TABLE: &str = r#"
        <html><body>
          <table>
            <thead><tr><th>Event</th><th>Start</th><th>End</th><th>Where</th></tr></thead>
            <tbody>
              <tr>
                <td><a href="/event/101">Fall <b>Classic</b></a></td>
                <td>10/05/2024</td><td>10/06/2024</td><td>Muncie, IN</td>
              </tr>
              <tr>
                <td>Winter Warmup</td><td>12/01/2024</td><td></td><td>Carmel, IN</td>
              </tr>
            </tbody>
          </table>
        </body></html>"#;

    #[test]
    fn test_default_table_reads_rows() {
        let table = SelectorTable {
            link_base: Some("https://usssa.com/fastpitch/".into()),
            ..Default::default()
        };
        let records = SelectorExtractor::new(&table).unwrap().extract(TABLE);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].start_date.as_deref(), Some("10/05/2024"));
        assert_eq!(records[0].link.as_deref(), Some("https://usssa.com/event/101"));
        assert_eq!(records[1].end_date, None);
        assert_eq!(records[1].link, None);

        let event = Normalizer::new().normalize(&records[0], "USSSA");
        assert_eq!(event.event_name, "Fall Classic");
    }

    #[test]
    fn test_card_layout_with_row_links() {
        let markup = r#"
            <div class="events">
              <a class="card" href="https://bullpen.test/e/7">
                <h3>Bullpen Bash</h3><span class="date">Mar 3</span><span class="venue">Plainfield</span>
              </a>
            </div>"#;
        let table = SelectorTable {
            row: "a.card".into(),
            event_name: Some("h3".into()),
            start_date: Some(".date".into()),
            end_date: None,
            location: Some(".venue".into()),
            sanction: None,
            link: Some("a".into()),
            link_base: None,
        };

        let records = SelectorExtractor::new(&table).unwrap().extract(markup);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_name.as_deref(), Some("Bullpen Bash"));
        assert_eq!(records[0].link.as_deref(), Some("https://bullpen.test/e/7"));
    }

    #[test]
    fn test_invalid_selector_is_a_config_error() {
        let table = SelectorTable {
            row: "tr[".into(),
            ..Default::default()
        };
        assert!(matches!(
            SelectorExtractor::new(&table),
            Err(ScoutError::Config(_))
        ));
    }

    #[test]
    fn test_no_rows_is_empty() {
        let extractor = SelectorExtractor::new(&SelectorTable::default()).unwrap();
        assert!(extractor.extract("<p>No events scheduled</p>").is_empty());
    }
}
