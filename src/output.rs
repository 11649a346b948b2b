use colored::Colorize;
use colored_json::ToColoredJson;
use serde_json::json;

use crate::models::SearchResult;
use crate::session::Session;

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Serialize the visible window as JSON instead of the terminal layout.
    pub json: bool,
}

/// Render the window navigation currently points at.
pub fn render_window(session: &Session, opts: &RenderOptions) {
    if opts.json {
        print_json(session.visible());
        return;
    }
    if session.display_offset() == 0
        && let Some(answer) = &session.instant_answer
    {
        println!();
        println!("{}", wrap_indented(answer, 2).bold());
    }
    println!();
    for result in session.visible() {
        print_result(result, session.opts.expand_urls);
    }
}

fn print_result(result: &SearchResult, expand_urls: bool) {
    let shown_url = if expand_urls {
        result.url.as_str()
    } else {
        domain_of(&result.url)
    };
    let mut header = format!(
        "{} {}",
        format!("{}.", result.index).cyan().bold(),
        result.title.bold()
    );
    if let Some(meta) = &result.metadata {
        header.push_str(&format!(" {}", format!("({meta})").dimmed()));
    }
    println!("{header} {}", format!("[{shown_url}]").yellow());
    if !result.abstract_text.is_empty() {
        println!("{}", wrap_indented(&result.abstract_text, 4));
    }
    println!();
}

fn print_json(results: &[SearchResult]) {
    let value: Vec<_> = results
        .iter()
        .map(|r| {
            let mut obj = json!({
                "title": r.title,
                "url": r.url,
                "abstract": r.abstract_text,
            });
            if let Some(meta) = &r.metadata {
                obj["metadata"] = json!(meta);
            }
            obj
        })
        .collect();
    match serde_json::to_string_pretty(&value) {
        Ok(s) => match s.to_colored_json_auto() {
            Ok(cs) => println!("{cs}"),
            Err(_) => println!("{s}"),
        },
        Err(e) => eprintln!("failed to serialize results: {e}"),
    }
}

pub fn print_help() {
    println!(
        "omniprompt keys:
  n, p, f      fetch the next, previous or first set of results
  index        open the result at index in the browser
  d keywords   new search for 'keywords' with the current options
  o [index|range|a ...]  open results by index, range (m-n) or all visible
  O [index|range|a ...]  like 'o', but prefer a GUI browser
  x            toggle URL expansion and redisplay
  c index      copy the result URL to the clipboard
  q, ^D, double Enter    exit
  ?            show this help
  *            anything else starts a new search"
    );
}

fn wrap_indented(text: &str, indent: usize) -> String {
    let width = terminal_size::terminal_size()
        .map(|(terminal_size::Width(w), _)| w as usize)
        .unwrap_or(80)
        .max(indent + 20);
    let pad = " ".repeat(indent);
    let options = textwrap::Options::new(width)
        .initial_indent(&pad)
        .subsequent_indent(&pad);
    textwrap::fill(text, options)
}

fn domain_of(url: &str) -> &str {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .or_else(|| url.strip_prefix("//"))
        .unwrap_or(url);
    &rest[..rest.find('/').unwrap_or(rest.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_extraction() {
        assert_eq!(domain_of("https://www.rust-lang.org/learn"), "www.rust-lang.org");
        assert_eq!(domain_of("http://example.com"), "example.com");
        assert_eq!(domain_of("//cdn.example.com/x"), "cdn.example.com");
        assert_eq!(domain_of("mailto:x@example.com"), "mailto:x@example.com");
    }

    #[test]
    fn wrapping_indents_every_line() {
        let wrapped = wrap_indented("word ".repeat(60).trim(), 4);
        assert!(wrapped.lines().count() > 1);
        assert!(wrapped.lines().all(|l| l.starts_with("    ")));
    }
}
