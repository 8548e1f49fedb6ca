//! Physical buttons
//!
//! GPIO pins are polled and every rising edge becomes one [`ButtonEvent`]
//! on a channel. Holding a button down does not repeat. The scheduler only
//! sees the channel.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_HELP_PIN: u8 = 22;
pub const DEFAULT_STATUS_PIN: u8 = 23;

/// One press: which pin, and when the edge was seen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub pin: u8,
    pub at: Instant,
}

impl ButtonEvent {
    pub fn new(pin: u8) -> Self {
        Self {
            pin,
            at: Instant::now(),
        }
    }

    /// Whether the press is recent enough to still act on
    pub fn is_fresh(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.at) <= window
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    Help,
    NetworkStatus,
}

/// Pin assignment of the two front-panel buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonMap {
    pub help_pin: u8,
    pub status_pin: u8,
}

impl ButtonMap {
    pub fn action(&self, pin: u8) -> Option<ButtonAction> {
        if pin == self.help_pin {
            Some(ButtonAction::Help)
        } else if pin == self.status_pin {
            Some(ButtonAction::NetworkStatus)
        } else {
            None
        }
    }

    pub fn pins(&self) -> Vec<u8> {
        vec![self.help_pin, self.status_pin]
    }
}

impl Default for ButtonMap {
    fn default() -> Self {
        Self {
            help_pin: DEFAULT_HELP_PIN,
            status_pin: DEFAULT_STATUS_PIN,
        }
    }
}

/// Level source for input pins
pub trait PinReader: Send + Sync + 'static {
    fn is_high(&self, pin: u8) -> io::Result<bool>;
}

/// Pins exported through the sysfs GPIO interface
#[derive(Debug, Clone)]
pub struct SysfsGpio {
    root: PathBuf,
}

impl SysfsGpio {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn value_path(&self, pin: u8) -> PathBuf {
        self.root.join(format!("gpio{}", pin)).join("value")
    }
}

impl Default for SysfsGpio {
    fn default() -> Self {
        Self::new("/sys/class/gpio")
    }
}

impl PinReader for SysfsGpio {
    fn is_high(&self, pin: u8) -> io::Result<bool> {
        let value = std::fs::read_to_string(self.value_path(pin))?;
        Ok(value.trim() == "1")
    }
}

/// Edge detector turning pin levels into press events
pub struct ButtonMonitor<R> {
    reader: R,
    pins: Vec<u8>,
    interval: Duration,
    events: mpsc::Sender<ButtonEvent>,
}

impl<R: PinReader> ButtonMonitor<R> {
    pub fn new(reader: R, pins: Vec<u8>, events: mpsc::Sender<ButtonEvent>) -> Self {
        Self {
            reader,
            pins,
            interval: POLL_INTERVAL,
            events,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(pins = ?self.pins, "Button monitor started");

        // A button held at startup is not a press
        let mut levels: Vec<bool> = self.pins.iter().map(|&pin| self.level(pin)).collect();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            for (pin, was_high) in self.pins.iter().copied().zip(levels.iter_mut()) {
                let high = self.level(pin);
                if high && !*was_high {
                    debug!(pin, "Button pressed");
                    if let Err(e) = self.events.try_send(ButtonEvent::new(pin)) {
                        warn!(pin, error = %e, "Dropping button press");
                    }
                }
                *was_high = high;
            }
        }

        info!("Button monitor stopped");
    }

    fn level(&self, pin: u8) -> bool {
        match self.reader.is_high(pin) {
            Ok(high) => high,
            Err(e) => {
                debug!(pin, error = %e, "Cannot read pin");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct FakePins(Arc<Mutex<HashMap<u8, bool>>>);

    impl FakePins {
        fn set(&self, pin: u8, high: bool) {
            self.0.lock().insert(pin, high);
        }
    }

    impl PinReader for FakePins {
        fn is_high(&self, pin: u8) -> io::Result<bool> {
            Ok(self.0.lock().get(&pin).copied().unwrap_or(false))
        }
    }

    #[test]
    fn test_button_map() {
        let map = ButtonMap::default();
        assert_eq!(map.action(22), Some(ButtonAction::Help));
        assert_eq!(map.action(23), Some(ButtonAction::NetworkStatus));
        assert_eq!(map.action(4), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_freshness() {
        let event = ButtonEvent::new(22);
        tokio::time::advance(Duration::from_millis(400)).await;
        assert!(event.is_fresh(Instant::now(), Duration::from_millis(500)));
        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(!event.is_fresh(Instant::now(), Duration::from_millis(500)));
    }

    #[test]
    fn test_sysfs_reader() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("gpio22")).unwrap();
        std::fs::write(dir.path().join("gpio22/value"), "1\n").unwrap();
        std::fs::create_dir(dir.path().join("gpio23")).unwrap();
        std::fs::write(dir.path().join("gpio23/value"), "0\n").unwrap();

        let gpio = SysfsGpio::new(dir.path());
        assert!(gpio.is_high(22).unwrap());
        assert!(!gpio.is_high(23).unwrap());
        assert!(gpio.is_high(5).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_event_per_press() {
        let pins = FakePins::default();
        let (tx, mut rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let monitor = ButtonMonitor::new(pins.clone(), vec![22, 23], tx);
        let handle = tokio::spawn(monitor.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(60)).await;
        pins.set(22, true);
        // Held for several polls
        tokio::time::sleep(Duration::from_millis(300)).await;
        pins.set(22, false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        pins.set(23, true);
        tokio::time::sleep(Duration::from_millis(100)).await;

        shutdown.cancel();
        handle.await.unwrap();

        let pressed: Vec<u8> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.pin)
            .collect();
        assert_eq!(pressed, vec![22, 23]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_held_at_startup_is_ignored() {
        let pins = FakePins::default();
        pins.set(22, true);
        let (tx, mut rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(ButtonMonitor::new(pins, vec![22], tx).run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.cancel();
        handle.await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
