//! External collaborators: the browser/URL handler and the clipboard.
//!
//! Both shell out to platform utilities, ddg-style: a configured URL handler
//! always wins, then `BROWSER`, then the platform opener. Best-effort; a
//! failure comes back as a message, never a crash.

use std::io::Write;
use std::process::{Command, Stdio};

use crate::error::SearchError;

#[derive(Debug, Clone, Default)]
pub struct Opener {
    /// External handler command; takes precedence over everything else.
    pub url_handler: Option<String>,
    /// Skip text-mode browsers and force a GUI one.
    pub prefer_gui: bool,
    /// Leave the spawned process's output visible (debug mode).
    pub show_output: bool,
}

const TEXT_BROWSERS: &[&str] = &["elinks", "links", "lynx", "w3m", "www-browser"];

impl Opener {
    pub fn open(&self, url: &str) -> Result<(), SearchError> {
        let (program, mut args): (String, Vec<String>) = if let Some(handler) = &self.url_handler {
            (handler.clone(), Vec::new())
        } else if let Some(browser) = std::env::var("BROWSER")
            .ok()
            .filter(|b| !b.trim().is_empty())
            .filter(|b| !self.prefer_gui || !TEXT_BROWSERS.contains(&b.trim()))
        {
            (browser, Vec::new())
        } else {
            platform_opener()
        };
        args.push(url.to_string());

        tracing::debug!(%program, %url, "opening URL");
        let mut cmd = Command::new(&program);
        cmd.args(&args);
        if !self.show_output {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        cmd.spawn()
            .map(|_| ())
            .map_err(|e| SearchError::Open(format!("{program}: {e}")))
    }
}

fn platform_opener() -> (String, Vec<String>) {
    if cfg!(target_os = "macos") {
        ("open".to_string(), Vec::new())
    } else if cfg!(target_os = "windows") {
        ("cmd".to_string(), vec!["/c".to_string(), "start".to_string()])
    } else {
        ("xdg-open".to_string(), Vec::new())
    }
}

/// Pipe text into the first clipboard utility that exists on this system.
pub fn copy_to_clipboard(text: &str) -> Result<(), SearchError> {
    let candidates: &[(&str, &[&str])] = if cfg!(target_os = "macos") {
        &[("pbcopy", &[])]
    } else if cfg!(target_os = "windows") {
        &[("clip", &[])]
    } else {
        &[
            ("xsel", &["-b", "-i"]),
            ("xclip", &["-selection", "clipboard"]),
            ("wl-copy", &[]),
        ]
    };

    for (program, args) in candidates {
        let child = Command::new(program)
            .args(*args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        let Ok(mut child) = child else { continue };
        // stdin must be dropped before wait() so the utility sees EOF
        if let Some(mut stdin) = child.stdin.take()
            && stdin.write_all(text.as_bytes()).is_err()
        {
            continue;
        }
        match child.wait() {
            Ok(status) if status.success() => return Ok(()),
            _ => continue,
        }
    }
    Err(SearchError::Clipboard(
        "no clipboard utility found".to_string(),
    ))
}
