//! Session state and navigation over the paginated result stream.
//!
//! The session owns the query cursor, the accumulated results and the
//! `{display index -> url}` lookup table. In paged mode results accumulate
//! across fetches and navigation slices them locally, falling back to a real
//! fetch only when local data runs out; in unpaged mode (`page_size == 0`)
//! every navigation step is a fresh server fetch that replaces everything.

use std::collections::BTreeMap;

use crate::error::SearchError;
use crate::fetcher::Transport;
use crate::models::{SearchResult, TimeFilter};
use crate::opener::Opener;
use crate::parser;
use crate::query::QueryState;

/// Search bangs resolve server-side into a redirect; they are handed straight
/// to the opener instead of being fetched and parsed.
const BANG_RESOLVER_URL: &str = "https://duckduckgo.com/?q=";

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// 0 = unpaged ("show everything fetched"), 1-25 = fixed page size.
    pub page_size: usize,
    pub region: String,
    pub sites: Vec<String>,
    pub duration: TimeFilter,
    pub unsafe_search: bool,
    pub expand_urls: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            page_size: 10,
            region: "us-en".to_string(),
            sites: Vec::new(),
            duration: TimeFilter::Any,
            unsafe_search: false,
            expand_urls: false,
        }
    }
}

pub struct Session {
    transport: Transport,
    opener: Opener,
    pub opts: SessionOptions,
    query: Option<QueryState>,
    results: Vec<SearchResult>,
    lookup: BTreeMap<usize, String>,
    display_offset: usize,
    pub instant_answer: Option<String>,
}

impl Session {
    pub fn new(transport: Transport, opener: Opener, opts: SessionOptions) -> Self {
        Session {
            transport,
            opener,
            opts,
            query: None,
            results: Vec::new(),
            lookup: BTreeMap::new(),
            display_offset: 0,
            instant_answer: None,
        }
    }

    pub fn has_query(&self) -> bool {
        self.query.is_some()
    }

    /// The result window navigation currently points at.
    pub fn visible(&self) -> &[SearchResult] {
        if self.opts.page_size == 0 {
            return &self.results;
        }
        let start = self.display_offset.min(self.results.len());
        let end = (start + self.opts.page_size).min(self.results.len());
        &self.results[start..end]
    }

    pub fn display_offset(&self) -> usize {
        self.display_offset
    }

    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    pub fn lookup_url(&self, index: usize) -> Option<&str> {
        self.lookup.get(&index).map(String::as_str)
    }

    fn active_query(&mut self) -> Result<&mut QueryState, SearchError> {
        self.query.as_mut().ok_or(SearchError::NoActiveQuery)
    }

    /// Fetch the page the query cursor points at and merge it in: append in
    /// paged mode, replace wholesale in unpaged mode.
    pub async fn fetch_current_page(&mut self) -> Result<usize, SearchError> {
        let paged = self.opts.page_size > 0;
        let query = self.query.as_ref().ok_or(SearchError::NoActiveQuery)?;
        let fields = query.build_request();
        let html = self.transport.fetch_page(&fields).await?;

        let start_index = if paged { self.results.len() } else { 0 };
        let page = parser::parse(&html, start_index);
        let count = page.results.len();
        tracing::debug!(count, start_index, "parsed result page");

        if !paged {
            self.results.clear();
            self.lookup.clear();
        }
        for r in &page.results {
            self.lookup.insert(r.index, r.url.clone());
        }
        self.results.extend(page.results);
        self.instant_answer = page.instant_answer;

        if let Some(q) = self.query.as_mut() {
            q.record_fetch(count, page.tokens);
        }
        Ok(count)
    }

    pub async fn next(&mut self) -> Result<(), SearchError> {
        self.active_query()?;
        if self.opts.page_size > 0 {
            if self.results.len() > self.display_offset + self.opts.page_size {
                self.display_offset += self.opts.page_size;
                return Ok(());
            }
            let snapshot = self.query.clone();
            self.active_query()?.advance();
            match self.fetch_current_page().await {
                Ok(_) => {
                    self.display_offset += self.opts.page_size;
                    Ok(())
                }
                Err(e) => {
                    self.query = snapshot;
                    Err(e)
                }
            }
        } else {
            let snapshot = self.query.clone();
            self.active_query()?.advance();
            match self.fetch_current_page().await {
                Ok(_) => Ok(()),
                Err(e) => {
                    self.query = snapshot;
                    Err(e)
                }
            }
        }
    }

    pub async fn previous(&mut self) -> Result<(), SearchError> {
        self.active_query()?;
        if self.opts.page_size > 0 {
            // everything before the window is already local
            if self.display_offset == 0 {
                return Err(SearchError::AtFirstPage);
            }
            self.display_offset = self.display_offset.saturating_sub(self.opts.page_size);
            Ok(())
        } else {
            let snapshot = self.query.clone();
            self.active_query()?.retreat()?;
            match self.fetch_current_page().await {
                Ok(_) => Ok(()),
                Err(e) => {
                    self.query = snapshot;
                    Err(e)
                }
            }
        }
    }

    pub async fn first(&mut self) -> Result<(), SearchError> {
        self.active_query()?;
        if self.opts.page_size > 0 {
            if self.display_offset == 0 {
                return Err(SearchError::AtFirstPage);
            }
            self.display_offset = 0;
            Ok(())
        } else {
            let snapshot = self.query.clone();
            self.active_query()?.rewind()?;
            match self.fetch_current_page().await {
                Ok(_) => Ok(()),
                Err(e) => {
                    self.query = snapshot;
                    Err(e)
                }
            }
        }
    }

    /// Start a fresh query, replacing the whole result set. Bang directives
    /// skip the transport entirely and go straight to the opener. On a
    /// transport failure the previous session state stays navigable.
    ///
    /// Returns true when the input was a bang and was opened instead.
    pub async fn new_query(&mut self, raw: &str) -> Result<bool, SearchError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SearchError::NoActiveQuery);
        }
        if is_bang(raw) {
            let url = format!("{}{}", BANG_RESOLVER_URL, urlencoding::encode(raw));
            self.opener.open(&url)?;
            return Ok(true);
        }

        let snapshot = (
            self.query.take(),
            std::mem::take(&mut self.results),
            std::mem::take(&mut self.lookup),
            self.display_offset,
            self.instant_answer.take(),
        );
        self.query = Some(QueryState::new(
            raw.split_whitespace().map(str::to_string).collect(),
            self.opts.region.clone(),
            self.opts.sites.clone(),
            self.opts.duration,
            self.opts.unsafe_search,
        ));
        self.display_offset = 0;

        match self.fetch_current_page().await {
            Ok(_) => Ok(false),
            Err(e) => {
                (
                    self.query,
                    self.results,
                    self.lookup,
                    self.display_offset,
                    self.instant_answer,
                ) = snapshot;
                Err(e)
            }
        }
    }

    /// Resolve selection tokens into `(index, url)` pairs. Tokens are single
    /// indices, inclusive ranges (`a-b`, order-normalized) or the literal `a`
    /// meaning every currently visible index. Bad tokens are reported
    /// individually and never abort the rest.
    pub fn resolve_selection(&self, tokens: &[&str]) -> (Vec<(usize, String)>, Vec<String>) {
        let mut picked: Vec<(usize, String)> = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        let mut push = |picked: &mut Vec<(usize, String)>, errors: &mut Vec<String>, i: usize| {
            match self.lookup.get(&i) {
                Some(url) => picked.push((i, url.clone())),
                None => errors.push(SearchError::OutOfBounds(i).to_string()),
            }
        };

        for token in tokens {
            if *token == "a" {
                for r in self.visible() {
                    push(&mut picked, &mut errors, r.index);
                }
            } else if let Some((lo, hi)) = parse_range(token) {
                let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
                for i in lo..=hi {
                    push(&mut picked, &mut errors, i);
                }
            } else if let Ok(i) = token.parse::<usize>() {
                push(&mut picked, &mut errors, i);
            } else {
                errors.push(format!("Invalid selection: {token}"));
            }
        }
        (picked, errors)
    }

    /// Open every selected result; returns the per-token failure messages.
    pub fn open_selection(&self, tokens: &[&str], force_gui: bool) -> Vec<String> {
        let (picked, mut errors) = self.resolve_selection(tokens);
        let opener = Opener {
            prefer_gui: force_gui || self.opener.prefer_gui,
            ..self.opener.clone()
        };
        for (_, url) in picked {
            if let Err(e) = opener.open(&url) {
                errors.push(e.to_string());
            }
        }
        errors
    }

    /// Copy a result URL to the clipboard; the index must be on the current
    /// page.
    pub fn copy_url(&self, index: usize) -> Result<(), SearchError> {
        let url = self
            .visible()
            .iter()
            .find(|r| r.index == index)
            .map(|r| r.url.clone())
            .ok_or(SearchError::OutOfBounds(index))?;
        crate::opener::copy_to_clipboard(&url)
    }

    /// Open a single result by display index (bare-number command).
    pub fn open_index(&self, index: usize) -> Result<(), SearchError> {
        let url = if self.opts.page_size > 0 {
            self.visible()
                .iter()
                .find(|r| r.index == index)
                .map(|r| r.url.clone())
        } else {
            self.lookup.get(&index).cloned()
        };
        match url {
            Some(url) => self.opener.open(&url),
            None => Err(SearchError::OutOfBounds(index)),
        }
    }

    pub fn toggle_url_expansion(&mut self) {
        self.opts.expand_urls = !self.opts.expand_urls;
    }
}

/// A bang directive: leading `!`, or `!` in second position after a single
/// prefix character (e.g. `w!`). Resolved by the service's own redirect.
fn is_bang(raw: &str) -> bool {
    let first = raw.split_whitespace().next().unwrap_or("");
    first.starts_with('!') || first.chars().nth(1) == Some('!')
}

fn parse_range(token: &str) -> Option<(usize, usize)> {
    let (a, b) = token.split_once('-')?;
    Some((a.parse().ok()?, b.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PageTokens;

    fn result_block(title: &str, url: &str) -> String {
        format!(
            r#"<div class="links_main"><h2 class="result__title">
               <a href="{url}">{title}</a></h2>
               <a class="result__snippet" href="{url}">snippet for {title}</a></div>"#
        )
    }

    fn page_html(n: usize, offset: usize, with_prev: bool) -> String {
        let mut html = String::new();
        for i in 0..n {
            let k = offset + i;
            html.push_str(&result_block(
                &format!("Result {k}"),
                &format!("https://example.com/{k}"),
            ));
        }
        if with_prev {
            html.push_str(
                r#"<div class="nav-link"><form>
                <input type="hidden" name="nextParams" value="tok-prev" /></form></div>"#,
            );
        }
        html.push_str(
            r#"<div class="nav-link"><form>
            <input type="hidden" name="nextParams" value="tok-next" /></form></div>"#,
        );
        html
    }

    fn session_with(server: &mockito::Server, opts: SessionOptions) -> Session {
        Session::new(
            Transport::with_base_url(&server.url()),
            Opener::default(),
            opts,
        )
    }

    #[tokio::test]
    async fn operations_without_a_query_fail() {
        let server = mockito::Server::new_async().await;
        let mut s = session_with(&server, SessionOptions::default());
        assert!(matches!(
            s.fetch_current_page().await,
            Err(SearchError::NoActiveQuery)
        ));
        assert!(matches!(s.next().await, Err(SearchError::NoActiveQuery)));
        assert!(matches!(s.first().await, Err(SearchError::NoActiveQuery)));
    }

    #[tokio::test]
    async fn paged_next_fetches_when_local_data_runs_out() {
        let mut server = mockito::Server::new_async().await;
        let _page1 = server
            .mock("POST", "/")
            .with_body(page_html(10, 0, false))
            .create_async()
            .await;
        let _page2 = server
            .mock("POST", "/")
            .match_body(mockito::Matcher::UrlEncoded("s".into(), "30".into()))
            .with_body(page_html(10, 10, true))
            .create_async()
            .await;

        let mut s = session_with(&server, SessionOptions::default());
        s.new_query("hello world").await.expect("first fetch");
        assert_eq!(s.result_count(), 10);
        assert_eq!(s.display_offset(), 0);
        assert_eq!(s.visible().len(), 10);

        s.next().await.expect("second fetch");
        assert_eq!(s.display_offset(), 10);
        assert_eq!(s.result_count(), 20);
        // indices kept global across fetches
        assert_eq!(s.visible()[0].index, 11);
        assert!(s.lookup_url(20).is_some());
    }

    #[tokio::test]
    async fn paged_previous_is_local_and_bounded() {
        let mut server = mockito::Server::new_async().await;
        let _page1 = server
            .mock("POST", "/")
            .with_body(page_html(20, 0, false))
            .expect(1)
            .create_async()
            .await;

        let mut s = session_with(&server, SessionOptions::default());
        s.new_query("hello").await.expect("fetch");
        assert!(matches!(
            s.previous().await,
            Err(SearchError::AtFirstPage)
        ));
        s.next().await.expect("local move");
        assert_eq!(s.display_offset(), 10);
        s.previous().await.expect("local move back");
        assert_eq!(s.display_offset(), 0);
        assert!(matches!(s.first().await, Err(SearchError::AtFirstPage)));
    }

    #[tokio::test]
    async fn unpaged_fetches_replace_the_lookup_table() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("POST", "/")
            .with_body(page_html(5, 0, false))
            .expect(2)
            .create_async()
            .await;

        let mut s = session_with(
            &server,
            SessionOptions {
                page_size: 0,
                ..SessionOptions::default()
            },
        );
        s.new_query("hello").await.expect("fetch");
        assert_eq!(s.result_count(), 5);
        s.next().await.expect("refetch");
        // replaced wholesale, indices restart at 1
        assert_eq!(s.result_count(), 5);
        assert_eq!(s.visible()[0].index, 1);
        assert_eq!(s.lookup_url(1), Some("https://example.com/0"));
        assert!(s.lookup_url(6).is_none());
    }

    #[tokio::test]
    async fn transport_failure_keeps_previous_results_navigable() {
        let mut server = mockito::Server::new_async().await;
        let page1 = server
            .mock("POST", "/")
            .with_body(page_html(10, 0, false))
            .create_async()
            .await;

        let mut s = session_with(&server, SessionOptions::default());
        s.new_query("hello").await.expect("fetch");
        page1.remove_async().await;
        let _fail = server
            .mock("POST", "/")
            .with_status(503)
            .create_async()
            .await;

        let err = s.next().await.unwrap_err();
        assert!(matches!(err, SearchError::Connection(_)));
        assert_eq!(s.result_count(), 10);
        assert_eq!(s.display_offset(), 0);

        // a failed replacement query keeps the old result set too
        let err = s.new_query("other query").await.unwrap_err();
        assert!(matches!(err, SearchError::Connection(_)));
        assert_eq!(s.result_count(), 10);
        assert_eq!(s.visible()[0].title, "Result 0");
    }

    #[tokio::test]
    async fn bang_query_skips_the_transport() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/")
            .expect(0)
            .create_async()
            .await;

        let mut s = Session::new(
            Transport::with_base_url(&server.url()),
            Opener {
                url_handler: Some("true".to_string()),
                ..Opener::default()
            },
            SessionOptions::default(),
        );
        let opened = s.new_query("!w hello world").await.expect("bang open");
        assert!(opened);
        assert!(!s.has_query());
        m.assert_async().await;
    }

    #[test]
    fn bang_detection_covers_both_positions() {
        assert!(is_bang("!w rust"));
        assert!(is_bang("w! rust"));
        assert!(!is_bang("rust lang"));
        assert!(!is_bang("rust!"));
    }

    #[tokio::test]
    async fn selection_tokens_resolve_ranges_and_all() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("POST", "/")
            .with_body(page_html(5, 0, false))
            .create_async()
            .await;

        let mut s = session_with(
            &server,
            SessionOptions {
                page_size: 0,
                ..SessionOptions::default()
            },
        );
        s.new_query("hello").await.expect("fetch");

        // reversed range normalizes
        let (picked, errors) = s.resolve_selection(&["5-3"]);
        assert_eq!(
            picked.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![3, 4, 5]
        );
        assert!(errors.is_empty());

        // "a" selects every key in the lookup table, ascending
        let (picked, errors) = s.resolve_selection(&["a"]);
        assert_eq!(
            picked.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
        assert!(errors.is_empty());

        // bad tokens are reported individually, the rest still resolve
        let (picked, errors) = s.resolve_selection(&["2", "99", "x", "4"]);
        assert_eq!(
            picked.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![2, 4]
        );
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("99"));
    }

    #[test]
    fn advance_then_retreat_restores_query_cursor() {
        let mut q = QueryState::new(
            vec!["x".into()],
            "us-en".into(),
            Vec::new(),
            TimeFilter::Any,
            false,
        );
        q.record_fetch(
            30,
            PageTokens {
                previous: "p".into(),
                next: "n".into(),
            },
        );
        q.advance();
        q.retreat().unwrap();
        assert_eq!(q.page, 0);
        assert!(q.cursor < 0);
    }
}
