//! Single-pass scanner for DuckDuckGo's HTML result pages.
//!
//! The page is consumed as a flat stream of start-tag / end-tag / text events;
//! no tree is built. Context is tracked with a per-tag-name stack of pending
//! annotations: every interesting start tag pushes the annotation that its
//! matching end tag will pop, so nested same-name tags cannot desynchronize
//! the scan and stray end tags from malformed markup pop nothing and no-op.

use std::collections::HashMap;

use crate::models::{PageTokens, ParsedPage, SearchResult};

// Class markers and field names of the upstream page. These are part of the
// wire contract with html.duckduckgo.com and must match the live markup.
const RESULT_CLASS: &str = "links_main";
const TITLE_CLASS: &str = "result__title";
const SNIPPET_CLASS: &str = "result__snippet";
const FILETYPE_CLASS: &str = "result__type";
const INSTANT_CLASS: &str = "zci__result";
const NAV_CLASS: &str = "nav-link";
const TOKEN_FIELD: &str = "nextParams";
// "See also" anchors nested in a title point back into the search UI itself.
const INTERNAL_SEARCH_PREFIX: &str = "/html";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Parse one result page. `start_index` seeds the running display index:
/// the first completed result gets `start_index + 1`.
///
/// Best-effort by design: malformed markup never fails, result blocks that
/// never yield a URL are dropped silently.
pub fn parse(html: &str, start_index: usize) -> ParsedPage {
    let mut scan = PageScan::new(start_index);
    let mut tok = Tokenizer::new(html);
    while let Some(event) = tok.next_event() {
        match event {
            Event::Start {
                name,
                attrs,
                self_closing,
            } => scan.start_tag(&name, &attrs, self_closing),
            Event::End { name } => scan.end_tag(&name),
            Event::Text(t) => scan.text(t),
        }
    }
    scan.finish()
}

/// What to do when the end tag matching an annotated start tag arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Result,
    Title,
    TitleAnchor,
    Filetype,
    Abstract,
    Instant,
    Nav,
}

/// Which accumulator, if any, text events currently feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Off,
    Title,
    Filetype,
    Abstract,
    Instant,
}

struct PageScan {
    // tag name -> LIFO of annotations for the end tags still owed
    pending: HashMap<String, Vec<Option<Exit>>>,
    capture: Capture,
    buf: String,
    // start of the filetype label within `buf` while capturing it
    filetype_mark: usize,
    in_result: bool,
    in_title: bool,
    in_nav: bool,
    title: String,
    url: String,
    abstract_text: String,
    filetype: Option<String>,
    index: usize,
    page: ParsedPage,
}

impl PageScan {
    fn new(start_index: usize) -> Self {
        PageScan {
            pending: HashMap::new(),
            capture: Capture::Off,
            buf: String::new(),
            filetype_mark: 0,
            in_result: false,
            in_title: false,
            in_nav: false,
            title: String::new(),
            url: String::new(),
            abstract_text: String::new(),
            filetype: None,
            index: start_index,
            page: ParsedPage::default(),
        }
    }

    fn start_tag(&mut self, name: &str, attrs: &[(String, String)], self_closing: bool) {
        let mut exit = None;

        match name {
            "div" => {
                if !self.in_result && has_class(attrs, RESULT_CLASS) {
                    self.in_result = true;
                    self.reset_result();
                    exit = Some(Exit::Result);
                } else if !self.in_result
                    && self.capture == Capture::Off
                    && has_class(attrs, INSTANT_CLASS)
                {
                    self.capture = Capture::Instant;
                    exit = Some(Exit::Instant);
                } else if has_class(attrs, NAV_CLASS) {
                    self.in_nav = true;
                    exit = Some(Exit::Nav);
                }
            }
            "h2" => {
                if self.in_result && has_class(attrs, TITLE_CLASS) {
                    self.in_title = true;
                    exit = Some(Exit::Title);
                }
            }
            "a" => {
                if self.in_title {
                    if let Some(href) = attr(attrs, "href").filter(|h| !h.is_empty()) {
                        if href.starts_with(INTERNAL_SEARCH_PREFIX) {
                            // "see also" link back into the search UI, not the result
                        } else if self.url.is_empty() {
                            self.url = clean_target(href);
                            self.capture = Capture::Title;
                            exit = Some(Exit::TitleAnchor);
                        }
                    }
                } else if self.in_result
                    && has_class(attrs, SNIPPET_CLASS)
                    && attr(attrs, "href").is_some_and(|h| !h.is_empty())
                {
                    self.capture = Capture::Abstract;
                    exit = Some(Exit::Abstract);
                }
            }
            "span" => {
                if self.capture == Capture::Title && has_class(attrs, FILETYPE_CLASS) {
                    self.capture = Capture::Filetype;
                    self.filetype_mark = self.buf.len();
                    exit = Some(Exit::Filetype);
                }
            }
            "input" => {
                if self.in_nav
                    && attr(attrs, "name") == Some(TOKEN_FIELD)
                    && let Some(value) = attr(attrs, "value")
                {
                    self.page.tokens.push(value);
                }
            }
            "form" => {
                if has_class(attrs, NAV_CLASS) {
                    self.in_nav = true;
                    exit = Some(Exit::Nav);
                }
            }
            _ => {}
        }

        // Void and self-closed elements owe no end tag.
        if !self_closing && !VOID_ELEMENTS.contains(&name) {
            self.pending.entry(name.to_string()).or_default().push(exit);
        }
    }

    fn end_tag(&mut self, name: &str) {
        // Unmatched closes pop nothing; the annotation is simply absent.
        let exit = self
            .pending
            .get_mut(name)
            .and_then(|stack| stack.pop())
            .flatten();
        let Some(exit) = exit else { return };

        match exit {
            Exit::Result => {
                self.in_result = false;
                self.finish_result();
            }
            Exit::Title => self.in_title = false,
            Exit::TitleAnchor => {
                self.title = drain(&mut self.buf);
                self.capture = Capture::Off;
            }
            Exit::Filetype => {
                let label = decode_text(&self.buf[self.filetype_mark..]);
                self.buf.truncate(self.filetype_mark);
                if !label.is_empty() {
                    self.buf.push_str(&format!("[{}] ", label));
                    self.filetype = Some(label);
                }
                self.capture = Capture::Title;
            }
            Exit::Abstract => {
                self.abstract_text = drain(&mut self.buf);
                self.capture = Capture::Off;
            }
            Exit::Instant => {
                let text = drain(&mut self.buf);
                if !text.is_empty() {
                    self.page.instant_answer = Some(text);
                }
                self.capture = Capture::Off;
            }
            Exit::Nav => self.in_nav = false,
        }
    }

    fn text(&mut self, t: &str) {
        if self.capture != Capture::Off {
            self.buf.push_str(t);
        }
    }

    fn reset_result(&mut self) {
        self.title.clear();
        self.url.clear();
        self.abstract_text.clear();
        self.filetype = None;
        self.buf.clear();
    }

    /// A result block counts only if a URL was captured; partial blocks
    /// (ads, spelling suggestions, stray containers) are dropped.
    fn finish_result(&mut self) {
        if self.url.is_empty() {
            return;
        }
        self.index += 1;
        self.page.results.push(SearchResult {
            index: self.index,
            title: std::mem::take(&mut self.title),
            url: std::mem::take(&mut self.url),
            abstract_text: std::mem::take(&mut self.abstract_text),
            metadata: self.filetype.take(),
        });
    }

    fn finish(mut self) -> ParsedPage {
        // Salvage a result block left open by truncated markup.
        if self.in_result {
            if self.capture == Capture::Title {
                self.title = drain(&mut self.buf);
            } else if self.capture == Capture::Abstract {
                self.abstract_text = drain(&mut self.buf);
            }
            self.finish_result();
        }
        self.page
    }
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn has_class(attrs: &[(String, String)], marker: &str) -> bool {
    attr(attrs, "class").is_some_and(|c| c.split_ascii_whitespace().any(|t| t == marker))
}

/// Decode entities and collapse whitespace runs in a captured text block.
fn decode_text(raw: &str) -> String {
    html_escape::decode_html_entities(raw)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn drain(buf: &mut String) -> String {
    let out = decode_text(buf);
    buf.clear();
    out
}

/// Unwrap the `duckduckgo.com/l/?uddg=…` redirect around a result target,
/// dropping the trailing `&rut=…` tracking parameter; bare targets just get
/// their entities decoded.
fn clean_target(href: &str) -> String {
    let href = href.trim();
    if href.contains("/l/?") || href.contains("/l/%3F") {
        if let Some(pos) = href.find("uddg=") {
            let tail = &href[pos + 5..];
            let encoded = &tail[..tail.find('&').unwrap_or(tail.len())];
            return match urlencoding::decode(encoded) {
                Ok(decoded) => decoded.into_owned(),
                Err(_) => encoded.to_string(),
            };
        }
    }
    html_escape::decode_html_entities(href).into_owned()
}

// ---------------------------------------------------------------------------
// Tag-stream tokenizer
// ---------------------------------------------------------------------------

enum Event<'a> {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    End {
        name: String,
    },
    Text(&'a str),
}

struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    // set after <script>/<style>: skip raw text until this closer
    raw_closer: Option<&'static str>,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Tokenizer {
            input,
            pos: 0,
            raw_closer: None,
        }
    }

    fn next_event(&mut self) -> Option<Event<'a>> {
        let input = self.input;
        loop {
            if self.pos >= input.len() {
                return None;
            }

            if let Some(closer) = self.raw_closer.take() {
                let rest = &input[self.pos..];
                match find_ci(rest, closer) {
                    Some(idx) => self.pos += idx,
                    None => {
                        self.pos = input.len();
                        return None;
                    }
                }
                continue;
            }

            let rest = &input[self.pos..];
            if !rest.starts_with('<') {
                let end = rest.find('<').unwrap_or(rest.len());
                let text = &rest[..end];
                self.pos += end;
                if !text.is_empty() {
                    return Some(Event::Text(text));
                }
                continue;
            }

            if rest.starts_with("<!--") {
                self.pos += match rest.find("-->") {
                    Some(idx) => idx + 3,
                    None => rest.len(),
                };
                continue;
            }
            if rest.starts_with("<!") || rest.starts_with("<?") {
                self.pos += match rest.find('>') {
                    Some(idx) => idx + 1,
                    None => rest.len(),
                };
                continue;
            }
            if let Some(tail) = rest.strip_prefix("</") {
                let name: String = tail
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
                    .collect::<String>()
                    .to_ascii_lowercase();
                self.pos += match rest.find('>') {
                    Some(idx) => idx + 1,
                    None => rest.len(),
                };
                if name.is_empty() {
                    continue;
                }
                return Some(Event::End { name });
            }
            if rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
                return Some(self.start_tag());
            }

            // Bare '<' in text; emit it literally and move on.
            self.pos += 1;
            return Some(Event::Text("<"));
        }
    }

    fn start_tag(&mut self) -> Event<'a> {
        let input = self.input;
        let bytes = input.as_bytes();
        let len = bytes.len();
        let mut i = self.pos + 1;

        let name_start = i;
        while i < len && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-') {
            i += 1;
        }
        let name = input[name_start..i].to_ascii_lowercase();

        let mut attrs: Vec<(String, String)> = Vec::new();
        let mut self_closing = false;

        while i < len {
            while i < len && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= len {
                break;
            }
            match bytes[i] {
                b'>' => {
                    i += 1;
                    break;
                }
                b'/' => {
                    if i + 1 < len && bytes[i + 1] == b'>' {
                        self_closing = true;
                        i += 2;
                        break;
                    }
                    i += 1;
                }
                _ => {
                    let attr_start = i;
                    while i < len && !matches!(bytes[i], b'=' | b'>' | b'/') && !bytes[i].is_ascii_whitespace() {
                        i += 1;
                    }
                    let attr_name = input[attr_start..i].to_ascii_lowercase();
                    while i < len && bytes[i].is_ascii_whitespace() {
                        i += 1;
                    }
                    let mut value = String::new();
                    if i < len && bytes[i] == b'=' {
                        i += 1;
                        while i < len && bytes[i].is_ascii_whitespace() {
                            i += 1;
                        }
                        if i < len && (bytes[i] == b'"' || bytes[i] == b'\'') {
                            let quote = bytes[i];
                            i += 1;
                            let value_start = i;
                            while i < len && bytes[i] != quote {
                                i += 1;
                            }
                            value = decode_attr(&input[value_start..i]);
                            if i < len {
                                i += 1; // closing quote
                            }
                        } else {
                            let value_start = i;
                            while i < len && bytes[i] != b'>' && !bytes[i].is_ascii_whitespace() {
                                i += 1;
                            }
                            value = decode_attr(&input[value_start..i]);
                        }
                    }
                    if !attr_name.is_empty() {
                        attrs.push((attr_name, value));
                    }
                }
            }
        }
        self.pos = i;

        if !self_closing {
            match name.as_str() {
                "script" => self.raw_closer = Some("</script"),
                "style" => self.raw_closer = Some("</style"),
                _ => {}
            }
        }

        Event::Start {
            name,
            attrs,
            self_closing,
        }
    }
}

fn decode_attr(raw: &str) -> String {
    html_escape::decode_html_entities(raw).into_owned()
}

fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PAGE: &str = r#"<!DOCTYPE html>
<html><body>
  <div class="zci__result">Rust is a <b>systems</b> programming language.</div>
  <div class="links_main links_deep result__body">
    <h2 class="result__title">
      <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust%2Dlang.org%2F&amp;rut=abc123">Rust Programming Language</a>
    </h2>
    <a class="result__snippet" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust%2Dlang.org%2F">A language empowering everyone to build reliable &amp; efficient software.</a>
  </div>
  <div class="links_main links_deep result__body">
    <h2 class="result__title">
      <a class="result__a" href="https://doc.rust-lang.org/book.pdf"><span class="result__type">PDF</span> The Rust Book</a>
    </h2>
    <a class="result__snippet" href="https://doc.rust-lang.org/book.pdf">The book about Rust.</a>
  </div>
  <div class="nav-link">
    <form action="/html/" method="post">
      <input type="submit" class="btn" value="Previous" />
      <input type="hidden" name="nextParams" value="prev-token-blob" />
      <input type="hidden" name="q" value="rust" />
    </form>
  </div>
  <div class="nav-link">
    <form action="/html/" method="post">
      <input type="submit" class="btn" value="Next" />
      <input type="hidden" name="nextParams" value="next-token-blob" />
    </form>
  </div>
</body></html>"#;

    #[test]
    fn extracts_results_instant_answer_and_tokens() {
        let page = parse(PAGE, 0);
        assert_eq!(page.results.len(), 2);

        let first = &page.results[0];
        assert_eq!(first.index, 1);
        assert_eq!(first.title, "Rust Programming Language");
        assert_eq!(first.url, "https://www.rust-lang.org/");
        assert_eq!(
            first.abstract_text,
            "A language empowering everyone to build reliable & efficient software."
        );
        assert_eq!(first.metadata, None);

        let second = &page.results[1];
        assert_eq!(second.index, 2);
        assert_eq!(second.title, "[PDF] The Rust Book");
        assert_eq!(second.url, "https://doc.rust-lang.org/book.pdf");
        assert_eq!(second.metadata.as_deref(), Some("PDF"));

        assert_eq!(
            page.instant_answer.as_deref(),
            Some("Rust is a systems programming language.")
        );
        assert_eq!(page.tokens.previous, "prev-token-blob");
        assert_eq!(page.tokens.next, "next-token-blob");
    }

    #[test]
    fn parse_is_idempotent_on_fixed_input() {
        assert_eq!(parse(PAGE, 0), parse(PAGE, 0));
    }

    #[test]
    fn start_index_seeds_the_running_counter() {
        let page = parse(PAGE, 25);
        assert_eq!(page.results[0].index, 26);
        assert_eq!(page.results[1].index, 27);
    }

    #[test]
    fn single_token_page_reports_only_next() {
        let html = r#"<div class="nav-link"><form>
            <input type="hidden" name="nextParams" value="only-one" />
        </form></div>"#;
        let page = parse(html, 0);
        assert_eq!(page.tokens.next, "only-one");
        assert!(page.tokens.previous.is_empty());
    }

    #[test]
    fn url_less_blocks_are_dropped() {
        let html = r#"<div class="links_main">
            <h2 class="result__title">No anchor here</h2>
            <a class="result__snippet" href="https://x.example/">orphan snippet</a>
        </div>"#;
        let page = parse(html, 0);
        assert!(page.results.is_empty());
    }

    #[test]
    fn see_also_anchor_is_skipped_in_favor_of_result_link() {
        let html = r#"<div class="links_main"><h2 class="result__title">
            <a href="/html/?q=related+search">Related</a>
            <a href="https://real.example/page">Real Title</a>
        </h2></div>"#;
        let page = parse(html, 0);
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].url, "https://real.example/page");
        assert_eq!(page.results[0].title, "Real Title");
    }

    #[test]
    fn unbalanced_closing_tags_never_panic() {
        let html = r#"</div></a></h2>
        <div class="links_main"><h2 class="result__title">
        <a href="https://ok.example/">Ok</a></h2></div></div></div>"#;
        let page = parse(html, 0);
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].title, "Ok");
    }

    #[test]
    fn truncated_markup_salvages_open_block() {
        let html = r#"<div class="links_main"><h2 class="result__title">
            <a href="https://cut.example/">Cut off mid"#;
        let page = parse(html, 0);
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].url, "https://cut.example/");
        assert_eq!(page.results[0].title, "Cut off mid");
    }

    #[test]
    fn script_contents_are_not_parsed() {
        let html = r#"<script>var x = "<div class='links_main'>";</script>
        <div class="links_main"><h2 class="result__title">
        <a href="https://only.example/">Only</a></h2></div>"#;
        let page = parse(html, 0);
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].url, "https://only.example/");
    }

    #[test]
    fn entities_in_titles_and_targets_are_decoded() {
        let html = r#"<div class="links_main"><h2 class="result__title">
            <a href="https://e.example/?a=1&amp;b=2">Q&amp;A &#8212; archive</a>
        </h2></div>"#;
        let page = parse(html, 0);
        assert_eq!(page.results[0].url, "https://e.example/?a=1&b=2");
        assert_eq!(page.results[0].title, "Q&A — archive");
    }
}
