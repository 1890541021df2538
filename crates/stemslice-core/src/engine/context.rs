use super::config::{FrozenPhononTag, SimulationConfig};
use super::layers::OutputLayers;
use super::output::OutputVolume;
use super::progress::ProbeProgress;
use crate::core::detector::DetectorBins;
use crate::core::grid::FourierGrid;
use crate::core::io::sink::DatacubeSink;
use crate::core::scan::ScanPositions;
use ndarray::{Array2, Array3};
use num_complex::Complex64;

/// Read-only fields every probe is propagated through.
#[derive(Clone, Copy)]
pub struct PropagationInputs<'a> {
    pub grid: &'a FourierGrid,
    /// Normalized initial probe in reciprocal space.
    pub probe: &'a Array2<Complex64>,
    /// Propagator with the `1/N` transform normalization folded in.
    pub propagator: &'a Array2<Complex64>,
    pub transmission: &'a Array3<Complex64>,
}

/// Everything a worker needs for one configuration. All references are
/// shared between workers; the output volumes are the only mutated state.
#[derive(Clone, Copy)]
pub struct SimulationContext<'a> {
    pub config: &'a SimulationConfig,
    pub tag: &'a FrozenPhononTag,
    pub inputs: PropagationInputs<'a>,
    pub wavelength: f64,
    pub scan: &'a ScanPositions,
    pub detector: &'a DetectorBins,
    pub layers: &'a OutputLayers,
    pub output: &'a OutputVolume,
    pub dpc: Option<&'a OutputVolume>,
    pub datacube_sink: Option<&'a dyn DatacubeSink>,
    pub progress: &'a ProbeProgress<'a>,
}
