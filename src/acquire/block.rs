use regex::{RegexSet, RegexSetBuilder};

/// Signatures of anti-bot interstitials, matched case-insensitively.
pub const DEFAULT_BLOCK_SIGNATURES: [&str; 5] =
    ["access denied", "forbidden", "captcha", "403", "blocked"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Usable,
    /// The matched signature.
    Blocked(String),
}

/// Classifies markup as usable or an anti-bot block page.
///
/// Markup served with a success status can still be a block page, so this
/// looks at content only.
#[derive(Debug, Clone)]
pub struct BlockDetector {
    signatures: Vec<String>,
    set: RegexSet,
}

impl BlockDetector {
    pub fn new<I, S>(signatures: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let signatures: Vec<String> = signatures.into_iter().map(Into::into).collect();
        let set = RegexSetBuilder::new(&signatures)
            .case_insensitive(true)
            .build()?;
        Ok(Self { signatures, set })
    }

    pub fn classify(&self, markup: &str) -> Verdict {
        match self.set.matches(markup).iter().next() {
            Some(index) => Verdict::Blocked(self.signatures[index].clone()),
            None => Verdict::Usable,
        }
    }
}

impl Default for BlockDetector {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIGNATURES).expect("default block signatures are valid regexes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_default_signatures_case_insensitively() {
        let detector = BlockDetector::default();
        assert_eq!(
            detector.classify("<h1>ACCESS DENIED</h1>"),
            Verdict::Blocked("access denied".to_string())
        );
        assert_eq!(
            detector.classify("<div>Please solve the CAPTCHA</div>"),
            Verdict::Blocked("captcha".to_string())
        );
        assert!(matches!(detector.classify("Error 403"), Verdict::Blocked(_)));
    }

    #[test]
    fn test_ordinary_markup_is_usable() {
        let detector = BlockDetector::default();
        assert_eq!(
            detector.classify("<table><tr><td>Spring Classic</td></tr></table>"),
            Verdict::Usable
        );
    }

    #[test]
    fn test_custom_signatures() {
        let detector = BlockDetector::new(["cf-challenge", r"rate limit(ed)?"]).unwrap();
        assert_eq!(
            detector.classify("<div id=\"cf-challenge\">"),
            Verdict::Blocked("cf-challenge".to_string())
        );
        assert!(matches!(
            detector.classify("You have been Rate Limited"),
            Verdict::Blocked(_)
        ));
        assert_eq!(detector.classify("Access Denied"), Verdict::Usable);
    }

    #[test]
    fn test_empty_signature_list_never_blocks() {
        let detector = BlockDetector::new(Vec::<String>::new()).unwrap();
        assert_eq!(detector.classify("captcha forbidden 403"), Verdict::Usable);
    }

    #[test]
    fn test_invalid_signature_is_rejected() {
        assert!(BlockDetector::new(["(unclosed"]).is_err());
    }
}
