//! Fax Station - receives faxes over MQTT and prints them
//!
//! # Architecture
//!
//! ```text
//! broker ──► transport ──► spool (disk) ──► scheduler ──► renderer ──► printer
//!                                              ▲
//!                              buttons ────────┘
//! ```
//!
//! A fax is acknowledged to the broker only once it is on disk, and removed
//! from disk only once it is on paper. The scheduler is the single consumer
//! of both the spool and the button events, so print jobs never interleave.
//!
//! # Modules
//!
//! ```text
//! fax-station/src/
//! ├── core/          # config, errors, background tasks, station
//! ├── spool/         # crash-safe on-disk queue
//! ├── transport/     # MQTT client, backoff
//! ├── printing/      # renderer, scheduler, attention cue
//! ├── buttons.rs     # GPIO edge detection
//! ├── clock.rs       # local time for quiet hours
//! ├── netinfo.rs     # interface addresses for status pages
//! └── utils/         # logging
//! ```

pub mod buttons;
pub mod clock;
pub mod core;
pub mod netinfo;
pub mod printing;
pub mod spool;
pub mod transport;
pub mod utils;

pub use core::{Config, Result, Station, StationError};
pub use spool::{EntryId, Spool, SpoolError};
pub use utils::logger::{init_logger, init_logger_with_file};
