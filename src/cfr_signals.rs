// Alert side effects: desktop notifications and audible beeps.
//
// Both are capabilities chosen once at startup; the poll loop only sees the
// traits and never looks for a backend itself.

use crate::cfr_models::{CFRError, Result};
use rodio::source::{SineWave, Source};
use rodio::{OutputStream, OutputStreamHandle, Sink};
use std::io::{self, Write};
use std::time::Duration;

const NOTIFY_TIMEOUT_MS: u32 = 6000;
const BEEP_FREQUENCY_HZ: f32 = 1200.0;
const BEEP_LENGTH: Duration = Duration::from_millis(500);

pub trait Notifier {
    fn notify(&self, title: &str, message: &str) -> Result<()>;
}

pub trait SoundSignal {
    fn beep(&self) -> Result<()>;
}

// ============================================================================
// Notifiers
// ============================================================================

/// Native desktop notification (libnotify / macOS / Windows toast)
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, message: &str) -> Result<()> {
        notify_rust::Notification::new()
            .appname("cfr-alert")
            .summary(title)
            .body(message)
            .timeout(notify_rust::Timeout::Milliseconds(NOTIFY_TIMEOUT_MS))
            .show()
            .map(|_| ())
            .map_err(|e| CFRError::Notify(e.to_string()))
    }
}

/// Writes the notification to the terminal with a bell
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    pub fn format(title: &str, message: &str) -> String {
        format!("[NOTIFY] {}: {}", title, message)
    }
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, title: &str, message: &str) -> Result<()> {
        let line = Self::format(title, message);
        log::warn!("{}", line);
        let mut out = io::stdout();
        writeln!(out, "\x07{}", line)
            .and_then(|_| out.flush())
            .map_err(|e| CFRError::Notify(e.to_string()))
    }
}

/// Tries `primary` and hands the same title/message to `fallback` on error
pub struct FallbackNotifier {
    primary: Box<dyn Notifier>,
    fallback: Box<dyn Notifier>,
}

impl FallbackNotifier {
    pub fn new(primary: Box<dyn Notifier>, fallback: Box<dyn Notifier>) -> Self {
        FallbackNotifier { primary, fallback }
    }
}

impl Notifier for FallbackNotifier {
    fn notify(&self, title: &str, message: &str) -> Result<()> {
        match self.primary.notify(title, message) {
            Ok(()) => Ok(()),
            Err(e) => {
                log::debug!("Desktop notification failed ({}), using console", e);
                self.fallback.notify(title, message)
            }
        }
    }
}

// ============================================================================
// Sound
// ============================================================================

/// Short sine tone on the default audio output
pub struct RodioBeeper {
    // Dropping the stream silences the handle
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

impl RodioBeeper {
    pub fn try_new() -> Result<Self> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| CFRError::Sound(format!("Failed to create audio output stream: {}", e)))?;
        Ok(RodioBeeper {
            _stream: stream,
            handle,
        })
    }
}

impl SoundSignal for RodioBeeper {
    fn beep(&self) -> Result<()> {
        let sink = Sink::try_new(&self.handle)
            .map_err(|e| CFRError::Sound(format!("Failed to create audio sink: {}", e)))?;
        sink.append(
            SineWave::new(BEEP_FREQUENCY_HZ)
                .take_duration(BEEP_LENGTH)
                .amplify(0.3),
        );
        sink.sleep_until_end();
        Ok(())
    }
}

/// Terminal bell
pub struct BellBeeper;

impl SoundSignal for BellBeeper {
    fn beep(&self) -> Result<()> {
        let mut out = io::stdout();
        out.write_all(b"\x07")
            .and_then(|_| out.flush())
            .map_err(|e| CFRError::Sound(e.to_string()))
    }
}

pub struct SilentBeeper;

impl SoundSignal for SilentBeeper {
    fn beep(&self) -> Result<()> {
        Ok(())
    }
}

/// Tries `primary`, rings `fallback` when it fails
pub struct FallbackSound {
    primary: Box<dyn SoundSignal>,
    fallback: Box<dyn SoundSignal>,
}

impl FallbackSound {
    pub fn new(primary: Box<dyn SoundSignal>, fallback: Box<dyn SoundSignal>) -> Self {
        FallbackSound { primary, fallback }
    }
}

impl SoundSignal for FallbackSound {
    fn beep(&self) -> Result<()> {
        self.primary.beep().or_else(|_| self.fallback.beep())
    }
}

// ============================================================================
// Composition
// ============================================================================

pub struct Signals {
    pub notifier: Box<dyn Notifier>,
    pub sound: Box<dyn SoundSignal>,
}

/// Desktop notifications with console fallback; rodio audio when an output
/// device opens, the terminal bell otherwise.
pub fn compose(silent: bool) -> Signals {
    let notifier = Box::new(FallbackNotifier::new(
        Box::new(DesktopNotifier),
        Box::new(ConsoleNotifier),
    ));

    let sound: Box<dyn SoundSignal> = if silent {
        Box::new(SilentBeeper)
    } else {
        match RodioBeeper::try_new() {
            Ok(beeper) => {
                log::debug!("Audio output available, using tone beeps");
                Box::new(FallbackSound::new(Box::new(beeper), Box::new(BellBeeper)))
            }
            Err(e) => {
                log::info!("{}; falling back to terminal bell", e);
                Box::new(BellBeeper)
            }
        }
    };

    Signals { notifier, sound }
}
