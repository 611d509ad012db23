// Parsing of the itinerary page: card extraction, card selection, status text
// and wall-clock time resolution.
//
// The page is loosely structured. Live status (delay) is shown in gray,
// stopwatch-styled spans inside each card; the static schedule is plain text.

use crate::cfr_models::{CFRError, RECORD_ID_PREFIX, Result, TripRecord, TripSelection};
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

lazy_static! {
    static ref HHMM: Regex = Regex::new(r"^(\d{1,2}):(\d{2})$").expect("valid HH:MM pattern");
    static ref DEPARTURE_MARKER: Regex = Regex::new(
        r"(?i)(?:plecare\s*(?:la)?|depart(?:ure|s)?\s*(?:at)?)\s*([0-2]?\d:[0-5]\d)"
    )
    .expect("valid departure marker pattern");
    static ref BARE_TIME: Regex =
        Regex::new(r"\b([0-2]?\d:[0-5]\d)\b").expect("valid bare time pattern");
    static ref MINUTES: Regex = Regex::new(r"(?i)(\d+)\s*min").expect("valid minutes pattern");
    static ref TRAILING_DELAY: Regex = Regex::new(
        r"(?i)(\d+)\s*min\s*(?:intarziere|întârziere|delay)"
    )
    .expect("valid trailing delay pattern");
    static ref CARD: Selector =
        Selector::parse(&format!(r#"li[id^="{}"]"#, RECORD_ID_PREFIX)).expect("valid card selector");
    static ref SPAN: Selector = Selector::parse("span").expect("valid span selector");
}

/// Lowercased keywords marking a muted span as a delay annotation
const DELAY_KEYWORDS: [&str; 6] = [
    "intarziere",
    "întârziere",
    "pleaca cu",
    "pleacă cu",
    "delay",
    "departs with",
];

/// Class fragment of the muted, live-status spans
const MUTED_CLASS: &str = "color-gray";

/// Departure time and delay read from one card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusText {
    pub departure_hhmm: String,
    pub delay_minutes: u64,
}

pub struct CFRParser;

impl CFRParser {
    // ========================================================================
    // Time Resolver
    // ========================================================================

    /// Today's timestamp in `tz` at `hhmm`, never rolled over to another day.
    pub fn resolve_today(hhmm: &str, tz: &Tz) -> Result<DateTime<Tz>> {
        Self::resolve_on(hhmm, &Utc::now().with_timezone(tz))
    }

    /// Same as [`resolve_today`](Self::resolve_today) with "today" taken from `now`.
    pub fn resolve_on(hhmm: &str, now: &DateTime<Tz>) -> Result<DateTime<Tz>> {
        let malformed = || CFRError::MalformedTime(hhmm.to_string());

        let caps = HHMM.captures(hhmm.trim()).ok_or_else(malformed)?;
        let hour: u32 = caps[1].parse().map_err(|_| malformed())?;
        let minute: u32 = caps[2].parse().map_err(|_| malformed())?;
        if hour > 23 || minute > 59 {
            return Err(malformed());
        }

        let naive = now
            .date_naive()
            .and_hms_opt(hour, minute, 0)
            .ok_or_else(malformed)?;

        // Ambiguous local times (DST fall-back) take the earlier instant;
        // times inside a DST gap do not exist.
        now.timezone()
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(malformed)
    }

    // ========================================================================
    // Status Text Parser
    // ========================================================================

    /// Departure time and delay of one card.
    ///
    /// The delay is looked up in muted spans first and only then in the whole
    /// card text; no delay marker at all means on time.
    pub fn parse_status(record: &TripRecord) -> Result<StatusText> {
        let text = record.full_text();

        let departure = DEPARTURE_MARKER
            .captures(text)
            .or_else(|| BARE_TIME.captures(text))
            .map(|caps| caps[1].to_string())
            .ok_or(CFRError::NoDepartureTime)?;

        let delay_minutes = match Self::delay_from_subspans(record.annotated_subspans())? {
            Some(minutes) => minutes,
            None => Self::delay_from_text(text)?.unwrap_or(0),
        };

        Ok(StatusText {
            departure_hhmm: departure,
            delay_minutes,
        })
    }

    /// First non-zero delay among the muted spans naming a delay
    fn delay_from_subspans(subspans: &[String]) -> Result<Option<u64>> {
        for span in subspans {
            let lower = span.to_lowercase();
            if !DELAY_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
                continue;
            }
            if let Some(minutes) = Self::first_number(&MINUTES, span)? {
                if minutes > 0 {
                    return Ok(Some(minutes));
                }
            }
        }
        Ok(None)
    }

    fn delay_from_text(text: &str) -> Result<Option<u64>> {
        Self::first_number(&TRAILING_DELAY, text)
    }

    fn first_number(pattern: &Regex, text: &str) -> Result<Option<u64>> {
        match pattern.captures(text) {
            Some(caps) => caps[1]
                .parse::<u64>()
                .map(Some)
                .map_err(|_| CFRError::DelayOutOfRange(caps[1].to_string())),
            None => Ok(None),
        }
    }

    // ========================================================================
    // Trip Selector
    // ========================================================================

    pub fn select<'a>(records: &'a [TripRecord], selection: &TripSelection) -> Result<&'a TripRecord> {
        match selection {
            TripSelection::Explicit(id) => records
                .iter()
                .find(|r| r.id() == id)
                .ok_or_else(|| CFRError::RecordNotFound {
                    id: id.clone(),
                    available: Self::record_ids(records),
                }),
            TripSelection::Auto => records
                .iter()
                .find(|r| r.has_annotation())
                .ok_or_else(|| CFRError::NoAnnotatedRecord {
                    available: Self::record_ids(records),
                }),
        }
    }

    pub fn record_ids(records: &[TripRecord]) -> Vec<String> {
        records.iter().map(|r| r.id().to_string()).collect()
    }

    // ========================================================================
    // Markup extraction
    // ========================================================================

    /// Itinerary cards of a rendered route page, in page order
    pub fn extract_records(markup: &str) -> Vec<TripRecord> {
        let document = Html::parse_document(markup);

        document
            .select(&CARD)
            .filter_map(|card| {
                let id = card.value().attr("id")?;
                let subspans = card
                    .select(&SPAN)
                    .filter(|span| Self::is_muted(span))
                    .map(|span| Self::flatten_text(&span))
                    .collect();
                Some(TripRecord::new(id, Self::flatten_text(&card), subspans))
            })
            .collect()
    }

    fn is_muted(element: &ElementRef) -> bool {
        element
            .value()
            .classes()
            .any(|class| class.to_lowercase().contains(MUTED_CLASS))
    }

    /// Text nodes trimmed and joined by single spaces
    fn flatten_text(element: &ElementRef) -> String {
        element
            .text()
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
