use crate::core::grid::FourierGrid;
use ndarray::Array2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Beam tilt in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeTilt {
    pub x: f64,
    pub y: f64,
}

/// Free-space Fresnel propagator for one slice of thickness `slice_thickness` Å:
///
/// `exp(-iπλ·t·q² + i2π·t·(qx·tanθx + qy·tanθy))` inside the band limit, zero
/// outside it.
pub fn build_propagator(
    grid: &FourierGrid,
    wavelength: f64,
    slice_thickness: f64,
    tilt: ProbeTilt,
) -> Array2<Complex64> {
    let (tan_x, tan_y) = (tilt.x.tan(), tilt.y.tan());
    let (qx, qy) = (grid.qx(), grid.qy());
    Array2::from_shape_fn(grid.shape(), |(y, x)| {
        if !grid.mask()[[y, x]] {
            return Complex64::new(0.0, 0.0);
        }
        let phase = -PI * wavelength * slice_thickness * grid.q2()[[y, x]]
            + 2.0 * PI * slice_thickness * (qx[x] * tan_x + qy[y] * tan_y);
        Complex64::from_polar(1.0, phase)
    })
}

/// Propagator with the inverse-transform normalization `1/N` folded in, so an
/// unnormalized forward/inverse transform pair needs no separate rescale.
pub fn scaled_propagator(propagator: &Array2<Complex64>) -> Array2<Complex64> {
    let scale = 1.0 / propagator.len() as f64;
    propagator.mapv(|p| p * scale)
}
