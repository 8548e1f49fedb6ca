//! Attention cue played before a fax prints

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Sound or signal announcing an incoming fax
#[allow(async_fn_in_trait)]
pub trait AttentionCue {
    /// Start the cue and return when printing may begin
    async fn play(&self);
}

/// No cue configured
impl<C: AttentionCue> AttentionCue for Option<C> {
    async fn play(&self) {
        if let Some(cue) = self {
            cue.play().await;
        }
    }
}

/// Runs an external player in the background, then waits a lead time so
/// the sound is heard before the paper moves
#[derive(Debug, Clone)]
pub struct CommandCue {
    program: String,
    args: Vec<String>,
    lead: Duration,
}

impl CommandCue {
    /// Build from a command line such as `play modem.ogg`
    pub fn parse(command_line: &str, lead: Duration) -> Option<Self> {
        let mut words = command_line.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
            lead,
        })
    }
}

impl AttentionCue for CommandCue {
    async fn play(&self) {
        let spawned = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(mut child) => {
                debug!(program = %self.program, "Attention cue started");
                // Reap in the background; the cue outlives the lead time
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
                tokio::time::sleep(self.lead).await;
            }
            Err(e) => warn!(program = %self.program, error = %e, "Cannot play attention cue"),
        }
    }
}

/// Local hours during which the cue may play, both ends inclusive
///
/// A window whose start is after its end wraps around midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CueWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl CueWindow {
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            (self.start_hour..=self.end_hour).contains(&hour)
        } else {
            hour >= self.start_hour || hour <= self.end_hour
        }
    }
}

impl Default for CueWindow {
    fn default() -> Self {
        Self::new(9, 20)
    }
}
