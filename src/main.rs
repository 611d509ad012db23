mod cfr_alerts;
mod cfr_controllers;
mod cfr_fetch;
mod cfr_models;
mod cfr_parser;
mod cfr_signals;
mod cfr_snapshot;
mod cfr_views;

use anyhow::Context;
use clap::Parser;
use cfr_controllers::{CFRControllers, SystemClock};
use cfr_fetch::{FilePageFetcher, HttpPageFetcher, PageFetcher};
use cfr_models::{ITINERARY_DEFAULT, MonitorConfig, ROUTE_URL_DEFAULT, TIMEZONE_DEFAULT, TripSelection};
use cfr_views::CFRViews;
use std::path::PathBuf;
use std::time::Duration;

/// Alert ahead of a train's actual (delay-adjusted) departure time.
#[derive(Parser, Debug)]
#[command(name = "cfr-alert", version)]
struct Args {
    /// Route page listing the itinerary cards
    #[arg(long, default_value = ROUTE_URL_DEFAULT)]
    url: String,

    /// Itinerary card to track: a number (13 -> li-itinerary-13) or a full card id
    #[arg(long, default_value = ITINERARY_DEFAULT)]
    itinerary: String,

    /// Track the first card showing live status instead of --itinerary
    #[arg(long)]
    auto: bool,

    /// IANA timezone of the schedule
    #[arg(long, default_value = TIMEZONE_DEFAULT)]
    tz: String,

    /// Seconds between polls
    #[arg(long, default_value_t = 120)]
    interval: u64,

    /// Minutes before departure for the first alert
    #[arg(long, default_value_t = 30)]
    notify_at: u32,

    /// Seconds between reminder beeps once alerted
    #[arg(long, default_value_t = 10)]
    alarm_gap: u32,

    /// Read the page from a saved file instead of fetching --url
    #[arg(long)]
    html_file: Option<PathBuf>,

    /// No beeps
    #[arg(long)]
    silent: bool,

    /// Print a single snapshot as JSON and exit
    #[arg(long)]
    once: bool,
}

impl Args {
    fn selection(&self) -> TripSelection {
        if self.auto {
            TripSelection::Auto
        } else {
            TripSelection::from_itinerary(&self.itinerary)
        }
    }
}

fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\n{}", "═".repeat(70));
        eprintln!("❌ MONITOR PANIC");
        eprintln!("{}", "═".repeat(70));
        eprintln!("{}", panic_info);
        eprintln!("{}", "═".repeat(70));
    }));

    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    // The only fatal configuration error
    let timezone = MonitorConfig::parse_timezone(&args.tz)?;

    let config = MonitorConfig {
        url: args.url.clone(),
        selection: args.selection(),
        timezone,
        interval: Duration::from_secs(args.interval),
        notify_at_minutes: i64::from(args.notify_at),
        alarm_gap_secs: i64::from(args.alarm_gap),
    };

    let fetcher: Box<dyn PageFetcher> = match &args.html_file {
        Some(path) => Box::new(FilePageFetcher::new(path)),
        None => Box::new(HttpPageFetcher::new()?),
    };

    if args.once {
        let signals = cfr_signals::compose(true);
        let monitor = CFRControllers::new(config, fetcher, signals, Box::new(SystemClock));
        let (snapshot, _) = monitor.observe()?;
        let json = serde_json::to_string_pretty(&snapshot).context("Failed to serialize snapshot")?;
        println!("{}", json);
        return Ok(());
    }

    CFRViews::show_welcome(&config);
    let signals = cfr_signals::compose(args.silent);
    let mut monitor = CFRControllers::new(config, fetcher, signals, Box::new(SystemClock));
    let last = monitor.run();
    log::info!(
        "Done: {} departing {}",
        last.source_id.as_deref().unwrap_or("?"),
        last.actual_departure
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_default()
    );

    Ok(())
}
