use thiserror::Error;

use crate::core::config::ConfigError;
use crate::spool::SpoolError;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum StationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Spool error: {0}")]
    Spool(#[from] SpoolError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Station-level Result alias
pub type Result<T> = std::result::Result<T, StationError>;
