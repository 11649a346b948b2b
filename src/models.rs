use serde::{Deserialize, Serialize};

/// One organic search result as extracted from a result page.
///
/// `index` is the display index: global and ever-increasing across fetches in
/// paged mode, restarting at 1 on every fetch in unpaged mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    pub index: usize,
    pub title: String,
    pub url: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

/// Continuation tokens scraped from the pagination forms at the bottom of a
/// result page. Opaque; echoed back verbatim in the `nextParams` field of the
/// adjacent-page request. Empty string means "no token captured".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageTokens {
    pub previous: String,
    pub next: String,
}

impl PageTokens {
    /// Positional capture: the first non-empty token on a page is "next";
    /// a second occurrence reclassifies the first as "previous".
    pub fn push(&mut self, token: &str) {
        if token.is_empty() {
            return;
        }
        if self.next.is_empty() {
            self.next = token.to_string();
        } else {
            self.previous = std::mem::replace(&mut self.next, token.to_string());
        }
    }
}

/// Everything extracted from a single result page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    pub results: Vec<SearchResult>,
    pub instant_answer: Option<String>,
    pub tokens: PageTokens,
}

/// DuckDuckGo `df` time-filter codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeFilter {
    #[default]
    Any,
    Day,
    Week,
    Month,
    Year,
}

impl TimeFilter {
    pub fn code(self) -> &'static str {
        match self {
            TimeFilter::Any => "",
            TimeFilter::Day => "d",
            TimeFilter::Week => "w",
            TimeFilter::Month => "m",
            TimeFilter::Year => "y",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_token_is_next() {
        let mut t = PageTokens::default();
        t.push("abc");
        assert_eq!(t.next, "abc");
        assert!(t.previous.is_empty());
    }

    #[test]
    fn second_token_reclassifies_first_as_previous() {
        let mut t = PageTokens::default();
        t.push("first");
        t.push("second");
        assert_eq!(t.previous, "first");
        assert_eq!(t.next, "second");
    }

    #[test]
    fn empty_tokens_are_ignored() {
        let mut t = PageTokens::default();
        t.push("");
        t.push("real");
        t.push("");
        assert_eq!(t.next, "real");
        assert!(t.previous.is_empty());
    }
}
