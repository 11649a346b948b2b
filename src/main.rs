use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

mod error;
mod fetcher;
mod models;
mod opener;
mod output;
mod parser;
mod query;
mod repl;
mod session;

use fetcher::Transport;
use models::TimeFilter;
use opener::Opener;
use output::RenderOptions;
use session::{Session, SessionOptions};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum TimeArg {
    Any,
    Day,
    Week,
    Month,
    Year,
}

impl From<TimeArg> for TimeFilter {
    fn from(t: TimeArg) -> Self {
        match t {
            TimeArg::Any => TimeFilter::Any,
            TimeArg::Day => TimeFilter::Day,
            TimeArg::Week => TimeFilter::Week,
            TimeArg::Month => TimeFilter::Month,
            TimeArg::Year => TimeFilter::Year,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "quackr", version, about = "DuckDuckGo from the terminal")]
struct Cli {
    /// Search keywords
    keywords: Vec<String>,

    /// Results per page: 1-25, or 0 to show everything fetched
    #[arg(short = 'n', long = "num", default_value_t = 10, value_parser = clap::value_parser!(u8).range(0..=25))]
    num: u8,

    /// Region code, e.g. us-en, de-de
    #[arg(short = 'r', long = "reg", default_value = "us-en")]
    region: String,

    /// Limit results by time
    #[arg(short = 't', long = "time", value_enum, default_value = "any")]
    time: TimeArg,

    /// Disable safe search
    #[arg(long = "unsafe", default_value_t = false)]
    unsafe_search: bool,

    /// Restrict results to a site (repeatable)
    #[arg(short = 'w', long = "site")]
    sites: Vec<String>,

    /// Show complete URLs instead of domains only
    #[arg(short = 'x', long = "expand", default_value_t = false)]
    expand: bool,

    /// Disable colors
    #[arg(short = 'C', long = "nocolor", default_value_t = false)]
    nocolor: bool,

    /// Print the first page as JSON and exit
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Non-interactive: fetch one page, print, exit
    #[arg(long = "np", default_value_t = false)]
    noprompt: bool,

    /// Open results with this command instead of the default browser
    #[arg(long = "url-handler")]
    url_handler: Option<String>,

    /// Prefer a GUI browser over $BROWSER
    #[arg(long = "gb", default_value_t = false)]
    gui_browser: bool,

    /// Proxy URL, e.g. http://127.0.0.1:8118
    #[arg(long)]
    proxy: Option<String>,

    /// HTTP timeout in seconds
    #[arg(long, default_value_t = 15)]
    timeout: u64,

    /// Verbose logging; unexpected interactive errors become fatal
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if cli.nocolor || !atty::is(atty::Stream::Stdout) {
        colored::control::set_override(false);
    }

    // Coarse cancellation: interrupt prints a message and terminates; all
    // state lives in process memory, nothing to clean up.
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted.");
            std::process::exit(130);
        }
    });

    let transport = Transport::new(cli.timeout, cli.proxy.as_deref())?;
    let opener = Opener {
        url_handler: cli.url_handler.clone(),
        prefer_gui: cli.gui_browser,
        show_output: cli.debug,
    };
    let opts = SessionOptions {
        page_size: cli.num as usize,
        region: cli.region.clone(),
        sites: cli.sites.clone(),
        duration: cli.time.into(),
        unsafe_search: cli.unsafe_search,
        expand_urls: cli.expand,
    };
    let mut session = Session::new(transport, opener, opts);
    let render = RenderOptions { json: cli.json };
    let single_shot = cli.noprompt || cli.json;

    if !cli.keywords.is_empty() {
        let query = cli.keywords.join(" ");
        match session.new_query(&query).await {
            Ok(true) => return Ok(()), // bang, handed to the opener
            Ok(false) => {
                if session.visible().is_empty() {
                    eprintln!("No results.");
                } else {
                    output::render_window(&session, &render);
                }
            }
            // recoverable by taxonomy; single-shot still exits 0
            Err(e) => eprintln!("{e}"),
        }
        if single_shot {
            return Ok(());
        }
    } else if single_shot {
        anyhow::bail!("keywords are required with --np/--json");
    }

    repl::run(&mut session, &render, cli.debug).await
}
