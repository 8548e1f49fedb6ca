//! Print scheduler
//!
//! The only code that talks to the printer. Spool wake-ups, button presses
//! and a periodic retry tick are merged into one loop, so two jobs can
//! never interleave their bytes on paper:
//!
//! ```text
//! spool_rx ──┐
//! button_rx ─┼──► select! ──► render ──► printer
//! retry tick ┘
//! ```
//!
//! A spool wake-up drains the whole queue, oldest entry first. Button
//! presses are served between entries, never during one, and only if they
//! are still fresh when their turn comes.

use fax_printer::{PrintError, PrintResult, Printer};
use shared::FaxEnvelope;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::cue::{AttentionCue, CueWindow};
use super::renderer::{RenderJob, RenderPass, Renderer};
use crate::buttons::{ButtonAction, ButtonEvent, ButtonMap};
use crate::clock::LocalClock;
use crate::netinfo::NetworkInspector;
use crate::spool::{EntryId, Spool, SpoolError};

/// Presses older than this when dequeued are dropped
pub const BUTTON_FRESHNESS: Duration = Duration::from_millis(500);
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    Rendering,
    Draining,
}

/// When a spool entry is deleted relative to printing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Delete after a complete print; a crash in between prints twice
    #[default]
    AtLeastOnce,
    /// Delete before printing; a failed print is lost
    AtMostOnce,
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "at-least-once" => Ok(DeliveryMode::AtLeastOnce),
            "at-most-once" => Ok(DeliveryMode::AtMostOnce),
            other => Err(format!("unknown delivery mode: {}", other)),
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::AtLeastOnce => write!(f, "at-least-once"),
            DeliveryMode::AtMostOnce => write!(f, "at-most-once"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub delivery_mode: DeliveryMode,
    pub retry_interval: Duration,
    pub button_freshness: Duration,
    pub buttons: ButtonMap,
    pub cue_window: CueWindow,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            delivery_mode: DeliveryMode::default(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            button_freshness: BUTTON_FRESHNESS,
            buttons: ButtonMap::default(),
            cue_window: CueWindow::default(),
        }
    }
}

/// What happened to one spool entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryOutcome {
    Printed,
    /// Gone from the queue without a complete print
    Dropped,
    /// Still queued; stop draining until the next trigger
    Retry,
}

pub struct Scheduler<P, C> {
    spool: Arc<Spool>,
    printer: P,
    renderer: Renderer,
    cue: C,
    clock: Arc<LocalClock>,
    network: Arc<NetworkInspector>,
    config: SchedulerConfig,
    shutdown: CancellationToken,
    state: SchedulerState,
}

impl<P: Printer, C: AttentionCue> Scheduler<P, C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        spool: Arc<Spool>,
        printer: P,
        renderer: Renderer,
        cue: C,
        clock: Arc<LocalClock>,
        network: Arc<NetworkInspector>,
        config: SchedulerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            spool,
            printer,
            renderer,
            cue,
            clock,
            network,
            config,
            shutdown,
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Serve events until shutdown
    ///
    /// Entries left by a previous run are printed before the first event
    /// is taken. Cancellation never interrupts a render: the loop stops at
    /// the next job boundary.
    pub async fn run(
        mut self,
        mut spool_rx: mpsc::Receiver<()>,
        mut button_rx: mpsc::Receiver<ButtonEvent>,
    ) -> SchedulerState {
        info!(
            delivery_mode = %self.config.delivery_mode,
            retry_secs = self.config.retry_interval.as_secs(),
            "Scheduler started"
        );

        let recovered = self.drain_spool().await;
        if recovered > 0 {
            info!(count = recovered, "Printed faxes left from previous run");
        }

        let period = self.config.retry_interval;
        let mut retry = tokio::time::interval_at(Instant::now() + period, period);
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(()) = spool_rx.recv() => {
                    // One drain covers every queued wake-up
                    while spool_rx.try_recv().is_ok() {}
                    self.drain_spool().await;
                }
                Some(event) = button_rx.recv() => {
                    self.handle_button(event).await;
                }
                _ = retry.tick() => {
                    self.drain_spool().await;
                }
            }
        }

        self.state = SchedulerState::Draining;
        info!("Scheduler stopped");
        self.state
    }

    /// Print pending entries oldest first until the queue is empty, a
    /// print fails, or shutdown is requested; returns the number printed
    async fn drain_spool(&mut self) -> usize {
        let mut printed = 0;

        while !self.shutdown.is_cancelled() {
            let id = match self.spool.oldest().await {
                Ok(Some(id)) => id,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Cannot list spool");
                    break;
                }
            };

            self.state = SchedulerState::Rendering;
            let outcome = self.process_entry(id).await;
            self.state = SchedulerState::Idle;

            match outcome {
                EntryOutcome::Printed => printed += 1,
                EntryOutcome::Dropped => {}
                EntryOutcome::Retry => {
                    info!(entry = %id, "Fax stays queued for retry");
                    break;
                }
            }
        }

        printed
    }

    async fn process_entry(&mut self, id: EntryId) -> EntryOutcome {
        let payload = match self.spool.read(id).await {
            Ok(payload) => payload,
            Err(SpoolError::NotFound(_)) => return EntryOutcome::Dropped,
            Err(e) => {
                error!(entry = %id, error = %e, "Cannot read spool entry");
                return EntryOutcome::Retry;
            }
        };

        let envelope = match FaxEnvelope::from_bytes(&payload).and_then(|env| {
            env.validate()?;
            Ok(env)
        }) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(entry = %id, error = %e, "Undecodable fax payload");
                return self.reject(id).await;
            }
        };

        info!(
            entry = %id,
            sender = %envelope.sender,
            timestamp = %envelope.timestamp,
            message_len = envelope.message.len(),
            picture_len = envelope.picture.len(),
            "New fax"
        );

        let passes = match self.render_fax(envelope.clone()) {
            Ok(passes) => passes,
            Err(e) => {
                warn!(entry = %id, error = %e, "Fax cannot be rendered");
                return self.reject(id).await;
            }
        };

        if !self.printer.is_online().await {
            return EntryOutcome::Retry;
        }

        if self.config.delivery_mode == DeliveryMode::AtMostOnce
            && let Err(e) = self.spool.remove(id).await
        {
            error!(entry = %id, error = %e, "Cannot remove spool entry before printing");
            return EntryOutcome::Retry;
        }

        if !envelope.message.is_empty() && self.config.cue_window.contains(self.clock.hour()) {
            self.cue.play().await;
        }

        if let Err(e) = self.emit(&passes).await {
            error!(entry = %id, error = %e, "Fax print failed");
            return match self.config.delivery_mode {
                DeliveryMode::AtLeastOnce => EntryOutcome::Retry,
                DeliveryMode::AtMostOnce => {
                    warn!(entry = %id, "Fax lost");
                    EntryOutcome::Dropped
                }
            };
        }

        if self.config.delivery_mode == DeliveryMode::AtLeastOnce
            && let Err(e) = self.spool.remove(id).await
        {
            error!(entry = %id, error = %e, "Fax printed but still spooled, it will print again");
            return EntryOutcome::Retry;
        }

        info!(entry = %id, "Fax printed");
        EntryOutcome::Printed
    }

    /// Full render, or text only when the picture cannot be printed
    fn render_fax(&self, envelope: FaxEnvelope) -> PrintResult<Vec<RenderPass>> {
        let job = RenderJob::Fax(envelope);
        match self.renderer.render(&job) {
            Err(e @ (PrintError::ImageDecode(_) | PrintError::UnsupportedImage { .. })) => {
                let RenderJob::Fax(envelope) = job else {
                    return Err(e);
                };
                if envelope.message.is_empty() {
                    return Err(e);
                }
                warn!(error = %e, "Skipping unprintable picture");
                Ok(self.renderer.fax_text_only(&envelope))
            }
            other => other,
        }
    }

    async fn reject(&self, id: EntryId) -> EntryOutcome {
        match self.spool.quarantine(id).await {
            Ok(_) => EntryOutcome::Dropped,
            Err(e) => {
                error!(entry = %id, error = %e, "Cannot quarantine spool entry");
                EntryOutcome::Retry
            }
        }
    }

    async fn handle_button(&mut self, event: ButtonEvent) {
        let age = event.at.elapsed();
        if !event.is_fresh(Instant::now(), self.config.button_freshness) {
            debug!(pin = event.pin, age_ms = age.as_millis() as u64, "Discarding stale button press");
            return;
        }
        let Some(action) = self.config.buttons.action(event.pin) else {
            debug!(pin = event.pin, "Press on unmapped pin");
            return;
        };

        info!(action = ?action, "Button pressed");
        if !self.printer.is_online().await {
            warn!(action = ?action, "Printer offline, ignoring button press");
            return;
        }
        let network = self.network.snapshot();
        let job = match action {
            ButtonAction::Help => RenderJob::Help { network },
            ButtonAction::NetworkStatus => RenderJob::NetworkStatus { network },
        };

        self.state = SchedulerState::Rendering;
        let result = match self.renderer.render(&job) {
            Ok(passes) => self.emit(&passes).await,
            Err(e) => Err(e),
        };
        self.state = SchedulerState::Idle;

        if let Err(e) = result {
            error!(job = job.kind(), error = %e, "Print failed");
        }
    }

    async fn emit(&self, passes: &[RenderPass]) -> PrintResult<()> {
        for pass in passes {
            self.printer.print(&pass.data, pass.feed_past_cutter).await?;
        }
        Ok(())
    }
}
