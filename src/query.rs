//! Search parameters and the pagination cursor.
//!
//! The upstream service multiplexes forward and backward continuation through
//! one numeric `dc` field distinguished only by its sign, paired with the
//! previous-vs-next token choice. The arithmetic here mirrors that protocol
//! exactly; it is not an internal design choice.

use crate::error::SearchError;
use crate::models::{PageTokens, TimeFilter};

/// Fixed page stride of the upstream service: the first page carries 30
/// results, every later page 50, so page N starts at `50 * (N - 1) + 30`.
fn start_offset(page: u32) -> i64 {
    50 * (i64::from(page) - 1) + 30
}

/// Safe-search sentinels for the `p` field.
const SAFE_NORMAL: &str = "1";
const SAFE_OFF: &str = "-2";

#[derive(Debug, Clone)]
pub struct QueryState {
    pub keywords: Vec<String>,
    pub region: String,
    pub sites: Vec<String>,
    pub duration: TimeFilter,
    pub unsafe_search: bool,
    /// 0 means "first page"; navigating backward from 0 is an error.
    pub page: u32,
    /// Results fetched by the most recent request.
    pub fetched_last: i64,
    /// Sign-encoded cumulative cursor (`dc`); starts at 1, negative while the
    /// last transition was backward.
    pub cursor: i64,
    pub tokens: PageTokens,
}

impl QueryState {
    pub fn new(
        keywords: Vec<String>,
        region: String,
        sites: Vec<String>,
        duration: TimeFilter,
        unsafe_search: bool,
    ) -> Self {
        QueryState {
            keywords,
            region,
            sites,
            duration,
            unsafe_search,
            page: 0,
            fetched_last: 0,
            cursor: 1,
            tokens: PageTokens::default(),
        }
    }

    /// The `q` field: keywords joined by spaces with any site filters folded
    /// in as `site:` terms.
    pub fn effective_query(&self) -> String {
        let mut q = self.keywords.join(" ");
        for site in &self.sites {
            if !q.is_empty() {
                q.push(' ');
            }
            q.push_str("site:");
            q.push_str(site);
        }
        q
    }

    /// Form fields for fetching the page the cursor currently points at.
    pub fn build_request(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("q", self.effective_query()),
            ("kl", self.region.clone()),
            (
                "p",
                (if self.unsafe_search { SAFE_OFF } else { SAFE_NORMAL }).to_string(),
            ),
            ("df", self.duration.code().to_string()),
        ];
        if self.page > 0 {
            let token = if self.cursor < 0 {
                self.tokens.previous.clone()
            } else {
                self.tokens.next.clone()
            };
            fields.push(("s", start_offset(self.page).to_string()));
            fields.push(("nextParams", token));
            fields.push(("dc", self.cursor.to_string()));
            fields.push(("v", "l".to_string()));
            fields.push(("o", "json".to_string()));
            fields.push(("api", "d.js".to_string()));
        }
        fields
    }

    pub fn advance(&mut self) {
        self.page += 1;
        if self.cursor < 0 {
            self.cursor = self.cursor.abs();
        } else {
            self.cursor += self.fetched_last;
        }
    }

    pub fn retreat(&mut self) -> Result<(), SearchError> {
        if self.page == 0 {
            return Err(SearchError::AtFirstPage);
        }
        self.page -= 1;
        if self.cursor > 0 {
            self.cursor = -self.cursor;
        } else {
            self.cursor += self.fetched_last;
        }
        Ok(())
    }

    /// Back to the first-page state; fails when already there.
    pub fn rewind(&mut self) -> Result<(), SearchError> {
        if self.page == 0 {
            return Err(SearchError::AtFirstPage);
        }
        self.page = 0;
        self.fetched_last = 0;
        self.cursor = 1;
        self.tokens = PageTokens::default();
        Ok(())
    }

    /// Record the outcome of the fetch the last `build_request` produced.
    pub fn record_fetch(&mut self, count: usize, tokens: PageTokens) {
        self.fetched_last = count as i64;
        self.tokens = tokens;
    }
}
