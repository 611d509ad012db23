// Controllers for the CFR departure alert: the fixed-interval poll loop that
// drives snapshot building, the alert state machine and the alert side effects.

use crate::cfr_alerts::{AlertEvent, AlertPolicy, AlertState, remaining_minutes};
use crate::cfr_fetch::PageFetcher;
use crate::cfr_models::{MonitorConfig, Result, Snapshot};
use crate::cfr_signals::Signals;
use crate::cfr_views::{self, CFRViews};
use anyhow::Context;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

/// Wall clock and sleeping, swappable for tests
pub trait Clock {
    fn now(&self, tz: &Tz) -> DateTime<Tz>;
    fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self, tz: &Tz) -> DateTime<Tz> {
        Utc::now().with_timezone(tz)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub struct CFRControllers {
    config: MonitorConfig,
    policy: AlertPolicy,
    fetcher: Box<dyn PageFetcher>,
    signals: Signals,
    clock: Box<dyn Clock>,
    state: AlertState,
}

impl CFRControllers {
    const BEEP_SPACING: Duration = Duration::from_millis(250);
    const THRESHOLD_BEEPS: usize = 3;
    const ARRIVAL_BEEPS: usize = 2;

    pub fn new(
        config: MonitorConfig,
        fetcher: Box<dyn PageFetcher>,
        signals: Signals,
        clock: Box<dyn Clock>,
    ) -> Self {
        let policy = AlertPolicy::new(config.notify_at_minutes, config.alarm_gap_secs);
        CFRControllers {
            config,
            policy,
            fetcher,
            signals,
            clock,
            state: AlertState::new(),
        }
    }

    /// Fetch the page and build a snapshot; the returned time is the "now"
    /// the snapshot was clamped against.
    pub fn observe(&self) -> Result<(Snapshot, DateTime<Tz>)> {
        let markup = self.fetcher.fetch(&self.config.url)?;
        let now = self.clock.now(&self.config.timezone);
        Ok((Snapshot::from_markup(&markup, &self.config.selection, now), now))
    }

    /// Poll until the arrival alert fires and return the final snapshot.
    pub fn run(&mut self) -> Snapshot {
        log::info!(
            "Monitoring departure time | itinerary={}",
            self.config.selection.describe()
        );

        self.announce_start();

        loop {
            // A panicking cycle is logged and skipped like any failed one
            match panic::catch_unwind(AssertUnwindSafe(|| self.poll_once())) {
                Ok(Ok(Some(arrival))) => {
                    log::info!("Arrival alert fired, monitor stopping");
                    return arrival;
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => log::error!("[ERR] {:#}", e),
                Err(payload) => log::error!("[ERR] poll cycle panicked: {}", Self::panic_message(&*payload)),
            }
            self.clock.sleep(self.config.interval);
        }
    }

    fn panic_message(payload: &(dyn Any + Send)) -> &str {
        if let Some(message) = payload.downcast_ref::<&str>() {
            *message
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.as_str()
        } else {
            "unknown panic"
        }
    }

    /// Advisory startup notification, leaves the alert state alone
    fn announce_start(&self) {
        match self.observe() {
            Ok((snapshot, now)) => match snapshot.target() {
                Some(target) => {
                    let left = remaining_minutes(target, now);
                    self.alert(cfr_views::START_TITLE, &CFRViews::start_message(&snapshot, left));
                    log::info!("{}", CFRViews::start_line(&snapshot, left));
                }
                None => {
                    self.alert(cfr_views::START_TITLE, CFRViews::start_retry_message());
                    log::info!("[START] {}", snapshot.note);
                }
            },
            Err(e) => self.alert(cfr_views::START_ERROR_TITLE, &e.to_string()),
        }
    }

    /// One cycle: observe, log, decide, act. `Some` once the trip departs.
    fn poll_once(&mut self) -> anyhow::Result<Option<Snapshot>> {
        let (snapshot, now) = self.observe().context("Failed to observe trip")?;

        match snapshot.target() {
            Some(target) => log::info!(
                "{}",
                CFRViews::status_line(&now, &snapshot, remaining_minutes(target, now))
            ),
            None => log::info!("{}", CFRViews::not_found_line(&now, &snapshot.note)),
        }

        let mut arrived = false;
        for event in self.state.evaluate(&snapshot, now, &self.policy) {
            match event {
                AlertEvent::Threshold => {
                    self.alert(
                        &CFRViews::threshold_title(self.config.notify_at_minutes),
                        &CFRViews::threshold_message(&snapshot),
                    );
                    self.beep_burst(Self::THRESHOLD_BEEPS);
                }
                AlertEvent::Repeat => self.beep(),
                AlertEvent::Arrival => {
                    self.alert(cfr_views::ARRIVAL_TITLE, &CFRViews::arrival_message(&snapshot));
                    self.beep_burst(Self::ARRIVAL_BEEPS);
                    arrived = true;
                }
            }
        }

        Ok(arrived.then_some(snapshot))
    }

    fn alert(&self, title: &str, message: &str) {
        if let Err(e) = self.signals.notifier.notify(title, message) {
            log::warn!("[NOTIFY] {}: {} ({})", title, message, e);
        }
    }

    fn beep(&self) {
        if let Err(e) = self.signals.sound.beep() {
            log::debug!("Beep failed: {}", e);
        }
    }

    fn beep_burst(&self, count: usize) {
        for _ in 0..count {
            self.beep();
            self.clock.sleep(Self::BEEP_SPACING);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfr_models::{CFRError, TripSelection};
    use crate::cfr_signals::{Notifier, SoundSignal};
    use chrono::TimeZone;
    use chrono_tz::Europe::Bucharest;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    const PAGE: &str = r#"<ul>
        <li id="li-itinerary-12">Plecare la 08:10</li>
        <li id="li-itinerary-13">IR 1581 Plecare la 10:00 Videle
            <span class="color-gray">întârziere 5 min</span></li>
    </ul>"#;

    struct FakeClock(Cell<DateTime<Utc>>);

    impl Clock for FakeClock {
        fn now(&self, tz: &Tz) -> DateTime<Tz> {
            self.0.get().with_timezone(tz)
        }

        fn sleep(&self, duration: Duration) {
            self.0.set(self.0.get() + chrono::Duration::from_std(duration).unwrap());
        }
    }

    /// Replays scripted responses, then keeps serving the last page
    struct ScriptedFetcher {
        script: RefCell<VecDeque<Result<String>>>,
        calls: Rc<Cell<usize>>,
        panic_on_call: Option<usize>,
    }

    impl PageFetcher for ScriptedFetcher {
        fn fetch(&self, _url: &str) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            if self.panic_on_call == Some(self.calls.get()) {
                panic!("tree builder overflow");
            }
            self.script
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok(PAGE.to_string()))
        }
    }

    #[derive(Clone, Default)]
    struct Journal(Rc<RefCell<Vec<String>>>);

    impl Notifier for Journal {
        fn notify(&self, title: &str, message: &str) -> Result<()> {
            self.0.borrow_mut().push(format!("{}|{}", title, message));
            Ok(())
        }
    }

    impl SoundSignal for Journal {
        fn beep(&self) -> Result<()> {
            self.0.borrow_mut().push("beep".into());
            Ok(())
        }
    }

    fn controller(script: Vec<Result<String>>, start: DateTime<Tz>) -> (CFRControllers, Journal, Rc<Cell<usize>>) {
        controller_panicking_on(script, start, None)
    }

    fn controller_panicking_on(
        script: Vec<Result<String>>,
        start: DateTime<Tz>,
        panic_on_call: Option<usize>,
    ) -> (CFRControllers, Journal, Rc<Cell<usize>>) {
        let journal = Journal::default();
        let calls = Rc::new(Cell::new(0));
        let config = MonitorConfig {
            url: "http://localhost/route".into(),
            selection: TripSelection::from_itinerary("13"),
            timezone: Bucharest,
            interval: Duration::from_secs(20 * 60),
            notify_at_minutes: 30,
            alarm_gap_secs: 3600,
        };
        let fetcher = ScriptedFetcher {
            script: RefCell::new(script.into()),
            calls: calls.clone(),
            panic_on_call,
        };
        let signals = Signals {
            notifier: Box::new(journal.clone()),
            sound: Box::new(journal.clone()),
        };
        let clock = FakeClock(Cell::new(start.with_timezone(&Utc)));
        (
            CFRControllers::new(config, Box::new(fetcher), signals, Box::new(clock)),
            journal,
            calls,
        )
    }

    fn nine_am() -> DateTime<Tz> {
        Bucharest.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()
    }

    #[test]
    fn runs_until_arrival_surviving_a_failed_fetch() {
        let script = vec![
            Ok(PAGE.to_string()),
            Err(CFRError::Fetch("timeout".into())),
        ];
        let (mut monitor, journal, calls) = controller(script, nine_am());

        let last = monitor.run();

        // start, 09:00 (error), 09:20, 09:40, 10:00, 10:20
        assert_eq!(calls.get(), 6);
        assert_eq!(last.source_id.as_deref(), Some("li-itinerary-13"));
        assert_eq!(
            *journal.0.borrow(),
            vec![
                "CFR Alert started|li-itinerary-13 | dep_sched 10:00 | delay 5m | depart 10:05 | ~65m",
                "30 min until train departs|li-itinerary-13 depart 10:05 (delay 5m)",
                "beep",
                "beep",
                "beep",
                "Train is departing now|li-itinerary-13 10:20",
                "beep",
                "beep",
            ]
        );
    }

    #[test]
    fn panicking_cycle_is_skipped_and_monitor_reaches_arrival() {
        // Second fetch is the first poll cycle
        let (mut monitor, journal, calls) = controller_panicking_on(vec![], nine_am(), Some(2));

        let last = monitor.run();

        // start, 09:00 (panic), 09:20, 09:40, 10:00, 10:20
        assert_eq!(calls.get(), 6);
        assert_eq!(last.source_id.as_deref(), Some("li-itinerary-13"));
        let journal = journal.0.borrow();
        assert_eq!(journal.iter().filter(|e| e.starts_with("30 min until")).count(), 1);
        assert_eq!(journal.last().map(String::as_str), Some("beep"));
        assert!(journal.iter().any(|e| e.starts_with("Train is departing now|")));
    }

    #[test]
    fn panic_payload_text_is_recovered() {
        fn payload_of(f: impl FnOnce() + panic::UnwindSafe) -> Box<dyn Any + Send> {
            panic::catch_unwind(f).unwrap_err()
        }

        let payload = payload_of(|| panic!("bad markup {}", 7));
        assert_eq!(CFRControllers::panic_message(&*payload), "bad markup 7");
        let payload = payload_of(|| panic!("static text"));
        assert_eq!(CFRControllers::panic_message(&*payload), "static text");
    }

    #[test]
    fn start_notice_does_not_touch_alert_state() {
        let (monitor, journal, _) = controller(vec![], nine_am());
        monitor.announce_start();
        assert_eq!(monitor.state, AlertState::new());
        assert_eq!(journal.0.borrow().len(), 1);
    }

    #[test]
    fn start_notice_falls_back_when_card_missing() {
        let script = vec![Ok("<ul><li id=\"li-itinerary-1\">Anulat</li></ul>".to_string())];
        let (monitor, journal, _) = controller(script, nine_am());
        monitor.announce_start();
        assert_eq!(*journal.0.borrow(), vec!["CFR Alert started|Card not parsed; will retry."]);
    }

    #[test]
    fn start_notice_reports_fetch_error() {
        let script = vec![Err(CFRError::Fetch("connection refused".into()))];
        let (monitor, journal, _) = controller(script, nine_am());
        monitor.announce_start();
        assert_eq!(
            *journal.0.borrow(),
            vec!["Start error|Fetch error: connection refused"]
        );
    }

    #[test]
    fn failed_cycle_is_an_error_not_a_crash() {
        let script = vec![Err(CFRError::Fetch("HTTP 503".into()))];
        let (mut monitor, journal, _) = controller(script, nine_am());
        let err = monitor.poll_once().unwrap_err();
        assert!(format!("{:#}", err).contains("HTTP 503"));
        assert!(journal.0.borrow().is_empty());
        assert_eq!(monitor.state, AlertState::new());
    }

    #[test]
    fn lookup_failure_keeps_armed_alert() {
        let twenty_to_ten = Bucharest.with_ymd_and_hms(2025, 6, 2, 9, 40, 0).unwrap();
        let script = vec![
            Ok(PAGE.to_string()),
            Ok("<ul></ul>".to_string()),
        ];
        let (mut monitor, _, _) = controller(script, twenty_to_ten);

        assert_eq!(monitor.poll_once().unwrap(), None);
        assert!(monitor.state.armed);
        let armed = monitor.state.clone();

        assert_eq!(monitor.poll_once().unwrap(), None);
        assert_eq!(monitor.state, armed);
    }
}
