//! Core: configuration, errors, background tasks, station wiring
//!
//! - [`Config`] - environment configuration
//! - [`Station`] - starts everything and waits for shutdown
//! - [`BackgroundTasks`] - registry for the event-source tasks
//! - [`StationError`] - startup errors

pub mod config;
pub mod error;
pub mod station;
pub mod tasks;

pub use config::{Config, ConfigError};
pub use error::{Result, StationError};
pub use station::Station;
pub use tasks::{BackgroundTasks, TaskKind};
