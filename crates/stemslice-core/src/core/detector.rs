use super::grid::FourierGrid;
use super::scan::vec_from_range;
use ndarray::Array2;

/// Annular virtual detector: uniform rings of width `step` rad starting at the
/// optical axis, covering scattering angles up to the band limit.
#[derive(Debug, Clone)]
pub struct DetectorBins {
    step: f64,
    angles_mrad: Vec<f64>,
    bin_index: Array2<usize>,
}

impl DetectorBins {
    pub fn new(grid: &FourierGrid, wavelength: f64, step: f64) -> Self {
        let alpha_max = grid.q_max() * wavelength;
        let angles_mrad = vec_from_range(
            step * 1000.0 / 2.0,
            step * 1000.0,
            (alpha_max - step / 2.0) * 1000.0,
        );
        let bin_index = grid.q1().mapv(|q| bin_for_angle(wavelength * q, step));
        Self {
            step,
            angles_mrad,
            bin_index,
        }
    }

    pub fn num_bins(&self) -> usize {
        self.angles_mrad.len()
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    /// Centre angle of every bin in mrad.
    pub fn angles_mrad(&self) -> &[f64] {
        &self.angles_mrad
    }

    /// Zero-based bin of every reciprocal-space pixel. Values `>= num_bins()`
    /// fall outside the detector.
    pub fn bin_index(&self) -> &Array2<usize> {
        &self.bin_index
    }
}

/// Zero-based detector bin for scattering angle `alpha`:
/// `round((alpha + step/2) / step) - 1`, halves rounded away from zero.
#[inline]
pub fn bin_for_angle(alpha: f64, step: f64) -> usize {
    let ring = ((alpha + step / 2.0) / step).round();
    (ring as usize).saturating_sub(1)
}
