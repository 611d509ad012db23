// Snapshot builder: selected card + parsed status + resolved time -> one observation

use crate::cfr_models::{CFRError, Result, Snapshot, TripRecord, TripSelection};
use crate::cfr_parser::CFRParser;
use chrono::{DateTime, Duration};
use chrono_tz::Tz;

impl Snapshot {
    /// Parse a rendered page and build the observation for `now`.
    pub fn from_markup(markup: &str, selection: &TripSelection, now: DateTime<Tz>) -> Self {
        let records = CFRParser::extract_records(markup);
        Self::build(&records, selection, now)
    }

    /// Selector and parser failures become a not-found snapshot carrying the
    /// failure message as its note.
    pub fn build(records: &[TripRecord], selection: &TripSelection, now: DateTime<Tz>) -> Self {
        let record = match CFRParser::select(records, selection) {
            Ok(record) => record,
            Err(e) => return Snapshot::not_found(e.to_string(), None),
        };

        match Self::observe(record, now) {
            Ok(snapshot) => snapshot,
            Err(e) => Snapshot::not_found(e.to_string(), Some(record.id().to_string())),
        }
    }

    fn observe(record: &TripRecord, now: DateTime<Tz>) -> Result<Self> {
        let status = CFRParser::parse_status(record)?;
        let scheduled = CFRParser::resolve_on(&status.departure_hhmm, &now)?;

        let delayed = i64::try_from(status.delay_minutes)
            .ok()
            .and_then(Duration::try_minutes)
            .and_then(|delay| scheduled.checked_add_signed(delay))
            .ok_or_else(|| CFRError::DelayOutOfRange(status.delay_minutes.to_string()))?;

        // Today-only: a departure already in the past is reported as "now"
        let actual = delayed.max(now);

        Ok(Snapshot {
            found: true,
            scheduled_departure: Some(scheduled),
            delay_minutes: status.delay_minutes,
            actual_departure: Some(actual),
            source_id: Some(record.id().to_string()),
            note: "departure".to_string(),
        })
    }
}
