use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::scraper::{ResourceKind, ResponseFeed};

fn default_kinds() -> Vec<ResourceKind> {
    vec![ResourceKind::Xhr, ResourceKind::Fetch]
}

/// Which page responses carry the data worth capturing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptRule {
    /// A response matches when its URL contains any of these.
    pub url_contains: Vec<String>,

    /// Resource kinds considered (default: xhr, fetch)
    #[serde(default = "default_kinds")]
    pub kinds: Vec<ResourceKind>,
}

impl InterceptRule {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            url_contains: markers.into_iter().map(Into::into).collect(),
            kinds: default_kinds(),
        }
    }

    pub fn matches(&self, url: &str, kind: ResourceKind) -> bool {
        self.kinds.contains(&kind)
            && self
                .url_contains
                .iter()
                .any(|marker| url.contains(marker.as_str()))
    }
}

/// Which captured response wins when several match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapturePolicy {
    #[default]
    First,
    Last,
    /// Concatenate array payloads; otherwise collect them into one array.
    Merge,
}

/// A matching response with its body parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct InterceptedResponse {
    pub url: String,
    pub kind: ResourceKind,
    pub body: Result<Value, String>,
}

/// Collects the structured payloads a page fetches while it renders.
pub struct Interceptor {
    feed: ResponseFeed,
    policy: CapturePolicy,
    accept_empty: bool,
    captured: Vec<InterceptedResponse>,
}

impl Interceptor {
    pub fn new(feed: ResponseFeed, policy: CapturePolicy, accept_empty: bool) -> Self {
        Self {
            feed,
            policy,
            accept_empty,
            captured: Vec::new(),
        }
    }

    /// Pull every response delivered so far. Returns how many were new.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while let Ok(response) = self.feed.try_recv() {
            let body = response
                .body
                .and_then(|text| serde_json::from_str::<Value>(&text).map_err(|e| e.to_string()));
            if let Err(ref reason) = body {
                debug!(url = %response.url, reason = %reason, "Captured response is not JSON");
            }
            self.captured.push(InterceptedResponse {
                url: response.url,
                kind: response.kind,
                body,
            });
            count += 1;
        }
        count
    }

    pub fn captured(&self) -> &[InterceptedResponse] {
        &self.captured
    }

    /// The payload chosen by the capture policy, if any usable one arrived.
    ///
    /// Unparseable bodies are skipped, and so are empty structures unless
    /// empty payloads are accepted.
    pub fn take_payload(mut self) -> Option<Value> {
        self.drain();

        let accept_empty = self.accept_empty;
        let mut usable = self
            .captured
            .into_iter()
            .filter_map(|response| response.body.ok())
            .filter(|value| accept_empty || !is_empty_structure(value));

        match self.policy {
            CapturePolicy::First => usable.next(),
            CapturePolicy::Last => usable.last(),
            CapturePolicy::Merge => merge(usable.collect()),
        }
    }
}

/// Null, blank strings and empty arrays or objects.
pub fn is_empty_structure(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Whether `value` holds the expected structure at `pointer` (a JSON pointer
/// such as `/data/events`), or at the root when no pointer is given.
pub fn payload_is_usable(value: &Value, pointer: Option<&str>, accept_empty: bool) -> bool {
    let target = match pointer {
        Some(pointer) => value.pointer(pointer),
        None => Some(value),
    };
    match target {
        Some(target) => accept_empty || !is_empty_structure(target),
        None => false,
    }
}

fn merge(values: Vec<Value>) -> Option<Value> {
    if values.is_empty() {
        return None;
    }
    if values.iter().all(Value::is_array) {
        let items = values
            .into_iter()
            .flat_map(|value| match value {
                Value::Array(items) => items,
                other => vec![other],
            })
            .collect();
        return Some(Value::Array(items));
    }
    Some(Value::Array(values))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::scraper::ObservedResponse;

    fn feed_of(bodies: &[Result<&str, &str>]) -> ResponseFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        for (i, body) in bodies.iter().enumerate() {
            tx.send(ObservedResponse {
                url: format!("https://site.test/api/events?page={}", i),
                kind: ResourceKind::Xhr,
                body: body.map(str::to_string).map_err(str::to_string),
            })
            .unwrap();
        }
        rx
    }

    #[test]
    fn test_rule_requires_marker_and_kind() {
        let rule = InterceptRule::new(["/api/events", "graphql"]);
        assert!(rule.matches("https://x.test/api/events?page=1", ResourceKind::Xhr));
        assert!(rule.matches("https://x.test/graphql", ResourceKind::Fetch));
        assert!(!rule.matches("https://x.test/api/events", ResourceKind::Script));
        assert!(!rule.matches("https://x.test/static/app.js", ResourceKind::Xhr));
    }

    #[test]
    fn test_rule_without_markers_matches_nothing() {
        let rule = InterceptRule::new(Vec::<String>::new());
        assert!(!rule.matches("https://x.test/api", ResourceKind::Xhr));
    }

    #[test]
    fn test_rule_from_toml_defaults_kinds() {
        let rule: InterceptRule = toml::from_str("url_contains = [\"/api/\"]").unwrap();
        assert_eq!(rule.kinds, vec![ResourceKind::Xhr, ResourceKind::Fetch]);
    }

    #[test]
    fn test_first_policy_skips_unusable_bodies() {
        let feed = feed_of(&[Err("body evicted"), Ok("<html>"), Ok("[]"), Ok("[1,2]"), Ok("[3]")]);
        let interceptor = Interceptor::new(feed, CapturePolicy::First, false);
        assert_eq!(interceptor.take_payload(), Some(json!([1, 2])));
    }

    #[test]
    fn test_last_policy() {
        let feed = feed_of(&[Ok("[1]"), Ok("[2]"), Ok("{}")]);
        let interceptor = Interceptor::new(feed, CapturePolicy::Last, false);
        assert_eq!(interceptor.take_payload(), Some(json!([2])));
    }

    #[test]
    fn test_merge_policy_concatenates_arrays() {
        let feed = feed_of(&[Ok("[1]"), Ok("[2, 3]")]);
        let interceptor = Interceptor::new(feed, CapturePolicy::Merge, false);
        assert_eq!(interceptor.take_payload(), Some(json!([1, 2, 3])));

        let feed = feed_of(&[Ok("{\"a\":1}"), Ok("[2]")]);
        let interceptor = Interceptor::new(feed, CapturePolicy::Merge, false);
        assert_eq!(interceptor.take_payload(), Some(json!([{"a": 1}, [2]])));
    }

    #[test]
    fn test_empty_payload_only_with_opt_in() {
        let interceptor = Interceptor::new(feed_of(&[Ok("[]")]), CapturePolicy::First, false);
        assert_eq!(interceptor.take_payload(), None);

        let interceptor = Interceptor::new(feed_of(&[Ok("[]")]), CapturePolicy::First, true);
        assert_eq!(interceptor.take_payload(), Some(json!([])));
    }

    #[test]
    fn test_drain_records_parse_failures() {
        let mut interceptor =
            Interceptor::new(feed_of(&[Ok("not json"), Ok("[1]")]), CapturePolicy::First, false);
        assert_eq!(interceptor.drain(), 2);
        assert!(interceptor.captured()[0].body.is_err());
        assert_eq!(interceptor.drain(), 0);
    }

    #[test]
    fn test_payload_is_usable_with_pointer() {
        let value = json!({"data": {"events": [{"name": "x"}]}, "meta": {}});
        assert!(payload_is_usable(&value, Some("/data/events"), false));
        assert!(!payload_is_usable(&value, Some("/meta"), false));
        assert!(payload_is_usable(&value, Some("/meta"), true));
        assert!(!payload_is_usable(&value, Some("/missing"), true));
        assert!(payload_is_usable(&value, None, false));
    }
}
