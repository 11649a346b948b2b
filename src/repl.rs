//! Line-oriented command interpreter over the session.
//!
//! A pure dispatcher: one input line in, one session operation out. The loop
//! survives every recoverable condition; only stream errors (or any error at
//! all in debug mode) end it.

use std::io::{self, BufRead, Write};

use anyhow::Result;

use crate::error::SearchError;
use crate::output::{self, RenderOptions};
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    First,
    Next,
    Previous,
    Query(String),
    Open(Vec<String>, bool),
    Copy(usize),
    ToggleExpand,
    Help,
    Quit,
    Index(usize),
    Blank,
}

/// Strip leading/trailing whitespace and collapse internal runs to one space.
pub fn normalize(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Map one normalized line onto a command; longest/most-specific match wins,
/// anything unrecognized becomes a fresh query.
pub fn parse_command(line: &str) -> Command {
    if line.is_empty() {
        return Command::Blank;
    }
    match line {
        "f" => return Command::First,
        "n" => return Command::Next,
        "p" => return Command::Previous,
        "x" => return Command::ToggleExpand,
        "?" => return Command::Help,
        "q" => return Command::Quit,
        _ => {}
    }
    if let Some(rest) = line.strip_prefix("d ") {
        let rest = rest.trim();
        if !rest.is_empty() {
            return Command::Query(rest.to_string());
        }
    }
    for (prefix, gui) in [("o ", false), ("O ", true)] {
        if let Some(rest) = line.strip_prefix(prefix) {
            let tokens: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
            if !tokens.is_empty() {
                return Command::Open(tokens, gui);
            }
        }
    }
    if let Some(rest) = line.strip_prefix("c ")
        && let Ok(index) = rest.trim().parse::<usize>()
    {
        return Command::Copy(index);
    }
    if let Ok(index) = line.parse::<usize>() {
        return Command::Index(index);
    }
    Command::Query(line.to_string())
}

/// Run the interactive loop until `q`, end of input, or two consecutive empty
/// lines.
pub async fn run(session: &mut Session, render: &RenderOptions, debug: bool) -> Result<()> {
    let stdin = io::stdin();
    let mut empty_in_a_row = 0u32;

    loop {
        print!("quackr (? for help) ");
        io::stdout().flush().ok();

        let mut raw = String::new();
        if stdin.lock().read_line(&mut raw)? == 0 {
            return Ok(()); // end of input stream
        }
        let line = normalize(&raw);
        if line.is_empty() {
            empty_in_a_row += 1;
            if empty_in_a_row >= 2 {
                return Ok(());
            }
            continue;
        }
        empty_in_a_row = 0;

        let command = parse_command(&line);
        if command == Command::Quit {
            return Ok(());
        }
        match dispatch(session, render, command).await {
            Ok(()) => {}
            Err(e) => match e.downcast_ref::<SearchError>() {
                Some(known) => eprintln!("{known}"),
                None if debug => return Err(e),
                None => {
                    tracing::error!(error = %e, "unexpected error; continuing");
                    eprintln!("Error: {e}");
                }
            },
        }
    }
}

async fn dispatch(session: &mut Session, render: &RenderOptions, command: Command) -> Result<()> {
    match command {
        Command::First => {
            session.first().await?;
            output::render_window(session, render);
        }
        Command::Next => {
            session.next().await?;
            output::render_window(session, render);
        }
        Command::Previous => {
            session.previous().await?;
            output::render_window(session, render);
        }
        Command::Query(text) => {
            let opened_bang = session.new_query(&text).await?;
            if !opened_bang {
                output::render_window(session, render);
            }
        }
        Command::Open(tokens, gui) => {
            let tokens: Vec<&str> = tokens.iter().map(String::as_str).collect();
            for message in session.open_selection(&tokens, gui) {
                eprintln!("{message}");
            }
        }
        Command::Copy(index) => session.copy_url(index)?,
        Command::ToggleExpand => {
            session.toggle_url_expansion();
            output::render_window(session, render);
        }
        Command::Help => output::print_help(),
        Command::Index(index) => session.open_index(index)?,
        Command::Quit | Command::Blank => {}
    }
    Ok(())
}
