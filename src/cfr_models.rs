// Data model for the CFR departure alert monitor
// Source page: https://mersultrenurilor.infofer.ro/ (itinerary search results)
//
// Every poll produces one immutable `Snapshot` from the itinerary cards found
// on the page. Failures inside the core are downgraded to not-found snapshots;
// only fetch/notify failures and startup misconfiguration surface as errors.

use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub const ROUTE_URL_DEFAULT: &str =
    "https://mersultrenurilor.infofer.ro/ro-RO/Rute-trenuri/Videle/Bucuresti-(toate-statiile)";
pub const ITINERARY_DEFAULT: &str = "13";
pub const TIMEZONE_DEFAULT: &str = "Europe/Bucharest";

/// DOM id prefix of the itinerary cards on the route page
pub const RECORD_ID_PREFIX: &str = "li-itinerary-";

// ============================================================================
// Data Structures
// ============================================================================

/// One itinerary card, flattened once per fetch and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripRecord {
    id: String,
    full_text: String,
    annotated_subspans: Vec<String>,
}

impl TripRecord {
    pub fn new(id: impl Into<String>, full_text: impl Into<String>, annotated_subspans: Vec<String>) -> Self {
        TripRecord {
            id: id.into(),
            full_text: full_text.into(),
            annotated_subspans,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whitespace-normalized text of the whole card
    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    /// Text of the muted (live status) spans, in document order
    pub fn annotated_subspans(&self) -> &[String] {
        &self.annotated_subspans
    }

    pub fn has_annotation(&self) -> bool {
        !self.annotated_subspans.is_empty()
    }
}

/// How the tracked card is chosen among the page's itinerary cards
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TripSelection {
    /// Exact record id, e.g. `li-itinerary-13`
    Explicit(String),
    /// First card carrying any live status annotation
    Auto,
}

impl TripSelection {
    /// Numeric itinerary values expand to the card id; anything else is taken verbatim.
    pub fn from_itinerary(value: &str) -> Self {
        let value = value.trim();
        if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
            TripSelection::Explicit(format!("{}{}", RECORD_ID_PREFIX, value))
        } else {
            TripSelection::Explicit(value.to_string())
        }
    }

    pub fn describe(&self) -> String {
        match self {
            TripSelection::Explicit(id) => id.clone(),
            TripSelection::Auto => "auto".to_string(),
        }
    }
}

/// One observation of the tracked trip.
///
/// When `found` is true both departure times are present and
/// `actual_departure >= scheduled_departure`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub found: bool,
    pub scheduled_departure: Option<DateTime<Tz>>,
    pub delay_minutes: u64,
    pub actual_departure: Option<DateTime<Tz>>,
    pub source_id: Option<String>,
    pub note: String,
}

impl Snapshot {
    pub fn not_found(note: impl Into<String>, source_id: Option<String>) -> Self {
        Snapshot {
            found: false,
            scheduled_departure: None,
            delay_minutes: 0,
            actual_departure: None,
            source_id,
            note: note.into(),
        }
    }

    /// The departure time the alerts are measured against, only for found snapshots
    pub fn target(&self) -> Option<DateTime<Tz>> {
        if self.found { self.actual_departure } else { None }
    }
}

/// Runtime configuration of one monitor instance
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub url: String,
    pub selection: TripSelection,
    pub timezone: Tz,
    pub interval: Duration,
    /// Minutes before actual departure at which the threshold alert fires
    pub notify_at_minutes: i64,
    /// Seconds between repeat beeps once armed
    pub alarm_gap_secs: i64,
}

impl MonitorConfig {
    pub fn parse_timezone(name: &str) -> Result<Tz> {
        name.parse::<Tz>()
            .map_err(|_| CFRError::UnknownTimezone(name.to_string()))
    }
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug, Error)]
pub enum CFRError {
    #[error("malformed time '{0}'")]
    MalformedTime(String),
    #[error("no dep time")]
    NoDepartureTime,
    #[error("delay out of range: {0} min")]
    DelayOutOfRange(String),
    #[error("{id} not found; have: {}", .available.join(", "))]
    RecordNotFound { id: String, available: Vec<String> },
    #[error("no card with delay; have: {}", .available.join(", "))]
    NoAnnotatedRecord { available: Vec<String> },
    #[error("Fetch error: {0}")]
    Fetch(String),
    #[error("Notification error: {0}")]
    Notify(String),
    #[error("Sound error: {0}")]
    Sound(String),
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),
}

pub type Result<T> = std::result::Result<T, CFRError>;
