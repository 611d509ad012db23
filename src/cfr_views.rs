// Views for the CFR departure alert: every human-readable line and
// notification text the monitor produces.

use crate::cfr_models::{MonitorConfig, Snapshot};
use chrono::DateTime;
use chrono_tz::Tz;

pub const START_TITLE: &str = "CFR Alert started";
pub const START_ERROR_TITLE: &str = "Start error";
pub const ARRIVAL_TITLE: &str = "Train is departing now";

pub struct CFRViews;

impl CFRViews {
    /// Startup banner
    pub fn show_welcome(config: &MonitorConfig) {
        println!("\n{}", "═".repeat(70));
        println!("  🚆 CFR DEPARTURE ALERT");
        println!("{}", "═".repeat(70));
        println!("  🌐 Page:      {}", config.url);
        println!("  🎫 Itinerary: {}", config.selection.describe());
        println!("  🕐 Timezone:  {}", config.timezone.name());
        println!(
            "  ⏱️  Polling every {}s | alert {} min ahead | beep every {}s",
            config.interval.as_secs(),
            config.notify_at_minutes,
            config.alarm_gap_secs
        );
        println!("{}", "═".repeat(70));
    }

    /// `1h 05m`-style remaining time, plain minutes under an hour
    pub fn format_left(remaining_minutes: i64) -> String {
        if remaining_minutes >= 60 {
            format!("{}h {}m", remaining_minutes / 60, remaining_minutes % 60)
        } else {
            format!("{}m", remaining_minutes)
        }
    }

    fn hhmm(time: Option<DateTime<Tz>>) -> String {
        time.map(|t| t.format("%H:%M").to_string())
            .unwrap_or_else(|| "--:--".to_string())
    }

    fn card(snapshot: &Snapshot) -> &str {
        snapshot.source_id.as_deref().unwrap_or("?")
    }

    pub fn status_line(now: &DateTime<Tz>, snapshot: &Snapshot, remaining_minutes: i64) -> String {
        format!(
            "[{}] card={} delay={}m depart={} left≈{}",
            now.format("%H:%M:%S"),
            Self::card(snapshot),
            snapshot.delay_minutes,
            Self::hhmm(snapshot.actual_departure),
            Self::format_left(remaining_minutes)
        )
    }

    pub fn not_found_line(now: &DateTime<Tz>, note: &str) -> String {
        format!("[{}] not found: {}", now.format("%H:%M:%S"), note)
    }

    pub fn start_message(snapshot: &Snapshot, remaining_minutes: i64) -> String {
        format!(
            "{} | dep_sched {} | delay {}m | depart {} | ~{}m",
            Self::card(snapshot),
            Self::hhmm(snapshot.scheduled_departure),
            snapshot.delay_minutes,
            Self::hhmm(snapshot.actual_departure),
            remaining_minutes
        )
    }

    pub fn start_line(snapshot: &Snapshot, remaining_minutes: i64) -> String {
        format!(
            "[START] card={} dep_sched={} delay={}m depart={} left≈{}m",
            Self::card(snapshot),
            Self::hhmm(snapshot.scheduled_departure),
            snapshot.delay_minutes,
            Self::hhmm(snapshot.actual_departure),
            remaining_minutes
        )
    }

    pub fn start_retry_message() -> &'static str {
        "Card not parsed; will retry."
    }

    pub fn threshold_title(threshold_minutes: i64) -> String {
        format!("{} min until train departs", threshold_minutes)
    }

    pub fn threshold_message(snapshot: &Snapshot) -> String {
        format!(
            "{} depart {} (delay {}m)",
            Self::card(snapshot),
            Self::hhmm(snapshot.actual_departure),
            snapshot.delay_minutes
        )
    }

    pub fn arrival_message(snapshot: &Snapshot) -> String {
        format!("{} {}", Self::card(snapshot), Self::hhmm(snapshot.actual_departure))
    }
}
