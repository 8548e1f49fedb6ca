//! Shared types for the fax station
//!
//! Types that cross the process boundary: the envelope published by the
//! confirming sender, carried by the broker, and stored verbatim in the
//! spool until it is printed.

pub mod envelope;

// Re-exports
pub use envelope::{EnvelopeError, EnvelopeResult, FAX_TOPIC, FaxEnvelope};
pub use serde::{Deserialize, Serialize};
