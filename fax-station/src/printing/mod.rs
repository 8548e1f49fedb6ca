//! Fax printing
//!
//! - [`Renderer`]: faxes and button pages to ESC/POS passes
//! - [`Scheduler`]: the single consumer that owns the printer
//! - [`AttentionCue`]: optional sound before a fax prints

pub mod cue;
pub mod renderer;
pub mod scheduler;

pub use cue::{AttentionCue, CommandCue, CueWindow};
pub use renderer::{RenderJob, RenderPass, Renderer};
pub use scheduler::{
    BUTTON_FRESHNESS, DEFAULT_RETRY_INTERVAL, DeliveryMode, Scheduler, SchedulerConfig,
    SchedulerState,
};
