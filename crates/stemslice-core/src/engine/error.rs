use thiserror::Error;

use super::config::ConfigError;
use crate::core::grid::GridError;
use crate::core::io::sink::SinkError;
use crate::core::scan::ScanError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Invalid simulation grid: {source}")]
    Grid {
        #[from]
        source: GridError,
    },

    #[error("Invalid scan: {source}")]
    Scan {
        #[from]
        source: ScanError,
    },

    #[error("Output sink failed: {source}")]
    Sink {
        #[from]
        source: SinkError,
    },

    #[error("Potential has shape {found:?} but the simulation expects {expected:?}")]
    DimensionMismatch {
        expected: [usize; 3],
        found: [usize; 3],
    },

    #[error("Output '{0}' is enabled but no sink was provided for it")]
    MissingSink(&'static str),

    #[error("Failed to build worker thread pool: {0}")]
    ThreadPool(String),

    #[error("Transform planner lock was poisoned by a panicking worker")]
    PlanLockPoisoned,

    #[error("Internal logic error: {0}")]
    Internal(String),
}
