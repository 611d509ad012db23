// Alert state machine: decides per poll whether to fire the threshold alert,
// a repeat beep, or the terminal arrival alert.

use crate::cfr_models::Snapshot;
use chrono::{DateTime, Duration};
use chrono_tz::Tz;

/// Target drift that counts as a new ETA and re-arms the threshold alert
const RETARGET_TOLERANCE_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertEvent {
    /// First alert inside the threshold window for the current target
    Threshold,
    /// Single reminder beep while armed
    Repeat,
    /// Departure reached; the monitor stops after this
    Arrival,
}

#[derive(Debug, Clone, Copy)]
pub struct AlertPolicy {
    pub threshold_minutes: i64,
    pub repeat_gap: Duration,
}

impl AlertPolicy {
    pub fn new(threshold_minutes: i64, repeat_gap_secs: i64) -> Self {
        AlertPolicy {
            threshold_minutes,
            repeat_gap: Duration::seconds(repeat_gap_secs),
        }
    }
}

/// Process-lifetime alert memory, only touched by the poll loop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertState {
    pub last_target: Option<DateTime<Tz>>,
    pub armed: bool,
    pub last_repeat: Option<DateTime<Tz>>,
}

/// Whole minutes until `target`, floored (half a minute late is -1).
pub fn remaining_minutes(target: DateTime<Tz>, now: DateTime<Tz>) -> i64 {
    (target - now).num_milliseconds().div_euclid(60_000)
}

impl AlertState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one snapshot. Not-found snapshots leave the state untouched so a
    /// transient lookup failure never cancels an armed alert.
    pub fn evaluate(&mut self, snapshot: &Snapshot, now: DateTime<Tz>, policy: &AlertPolicy) -> Vec<AlertEvent> {
        let mut events = Vec::new();

        let Some(target) = snapshot.target() else {
            return events;
        };

        let remaining = remaining_minutes(target, now);

        let retargeted = match self.last_target {
            None => true,
            Some(last) => (target - last).num_seconds().abs() >= RETARGET_TOLERANCE_SECS,
        };
        if retargeted {
            self.last_target = Some(target);
            self.armed = false;
        }

        if remaining > 0 && remaining <= policy.threshold_minutes {
            if !self.armed {
                self.armed = true;
                // Repeat gap is measured from the threshold alert
                self.last_repeat = Some(now);
                events.push(AlertEvent::Threshold);
            } else if self.repeat_due(now, policy) {
                self.last_repeat = Some(now);
                events.push(AlertEvent::Repeat);
            }
        } else {
            self.armed = false;
        }

        if remaining <= 0 {
            events.push(AlertEvent::Arrival);
        }

        events
    }

    fn repeat_due(&self, now: DateTime<Tz>, policy: &AlertPolicy) -> bool {
        match self.last_repeat {
            None => true,
            Some(last) => now - last >= policy.repeat_gap,
        }
    }
}
