use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{self, CommandReport};
use crate::logging;

#[derive(Debug, Parser)]
#[command(
    name = "noaa-index",
    version,
    about = "Catalog decoded NOAA APT passes from a remote share and track upcoming passes"
)]
struct Cli {
    /// Print the command report as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one crawl over every configured site.
    Scan,
    /// Run one forecast refresh.
    Forecast {
        /// Drop stored forecasts before reloading them.
        #[arg(long)]
        clear: bool,
    },
    /// Run both pipelines once, or on their timers until signalled.
    Watch {
        #[arg(long)]
        once: bool,
        #[arg(long)]
        daemon: bool,
    },
    /// List cataloged passes, newest last.
    Passes {
        #[arg(long)]
        site: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List forecast passes ordered by start time.
    Upcoming {
        #[arg(long)]
        site: Option<String>,
    },
    /// Show resolved paths, configuration and store sizes.
    Status,
    /// Inspect the daemon lock.
    Health,
    /// Stop the running daemon.
    Stop,
}

fn render_text(report: &CommandReport) -> String {
    let mut out = format!(
        "{}: {}\n",
        report.command,
        if report.ok { "ok" } else { "failed" }
    );
    for detail in &report.details {
        out.push_str(&format!("  {detail}\n"));
    }
    for issue in &report.issues {
        out.push_str(&format!("  issue: {issue}\n"));
    }
    out
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init();

    let report = match cli.command {
        Command::Scan => commands::scan::run()?,
        Command::Forecast { clear } => commands::forecast::run(clear)?,
        Command::Watch { once, daemon } => {
            commands::watch::run(&commands::watch::WatchOptions { once, daemon })?
        }
        Command::Passes { site, limit } => {
            commands::passes::run(&commands::passes::PassesOptions { site, limit })?
        }
        Command::Upcoming { site } => commands::upcoming::run(site.as_deref())?,
        Command::Status => commands::status::run()?,
        Command::Health => commands::health::run()?,
        Command::Stop => commands::stop::run()?,
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_text(&report));
    }

    if !report.ok {
        std::process::exit(2);
    }
    Ok(())
}
