use crate::core::grid::FourierGrid;
use ndarray::{Array2, ArrayView2};
use num_complex::Complex64;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error while writing '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Sink rejected dataset '{name}': {reason}")]
    Rejected { name: String, reason: String },
}

/// One exported diffraction pattern, stored x-major (`pattern[[x, y]]`).
#[derive(Debug, Clone, PartialEq)]
pub enum DiffractionPattern {
    Intensity(Array2<f64>),
    Wave(Array2<Complex64>),
}

impl DiffractionPattern {
    pub fn dim(&self) -> (usize, usize) {
        match self {
            Self::Intensity(a) => a.dim(),
            Self::Wave(a) => a.dim(),
        }
    }

    pub fn is_wave(&self) -> bool {
        matches!(self, Self::Wave(_))
    }
}

/// A single write request into a 4D diffraction dataset.
#[derive(Debug)]
pub struct DatacubeRecord<'a> {
    pub pattern: &'a DiffractionPattern,
    /// Scratch buffer of the same shape as `pattern`, owned by the calling
    /// worker, available to the sink for running-average bookkeeping.
    pub running_average: &'a mut DiffractionPattern,
    /// Extent of the write: `[1, 1, a, b]`.
    pub dims: [usize; 4],
    /// Position of the write: `[x_probe, y_probe, 0, 0]`.
    pub offset: [usize; 4],
    pub num_configurations: usize,
    pub name: &'a str,
}

/// Destination for per-probe diffraction patterns.
///
/// Implementations are shared by every worker thread and must tolerate
/// concurrent calls. The engine calls [`DatacubeSink::write_datacube`] exactly
/// once per (probe, recorded depth).
pub trait DatacubeSink: Send + Sync {
    /// Persists one diffraction pattern.
    ///
    /// # Arguments
    ///
    /// * `record` - The pattern with its placement in the output dataset.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] if the pattern cannot be stored. The error aborts
    /// the run.
    fn write_datacube(&self, record: DatacubeRecord<'_>) -> Result<(), SinkError>;
}

/// Destination for the initial probe snapshot.
pub trait ProbeSink: Send + Sync {
    /// Persists the normalized reciprocal-space initial probe.
    ///
    /// # Arguments
    ///
    /// * `probe` - The probe, indexed `[[y, x]]` in FFT ordering.
    /// * `grid` - The reciprocal grid the probe is sampled on.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] if the snapshot cannot be stored.
    fn save_probe(
        &self,
        probe: ArrayView2<'_, Complex64>,
        grid: &FourierGrid,
    ) -> Result<(), SinkError>;
}
