use super::multislice::{contiguous, multiply, place_probe};
use crate::core::toroidal::{fftshift2, quarter_shift};
use crate::engine::context::PropagationInputs;
use crate::engine::error::EngineError;
use crate::engine::planner::TransformPlanner;
use ndarray::{Array2, Array3, Axis};
use num_complex::Complex64;

/// Propagates one probe placed at `(xp, yp)` Å through every slice.
///
/// Returns `(real_space, k_space)`. `k_space` is the non-aliased quarter of
/// the reciprocal-space exit wave, fft-shifted so the zero frequency sits at
/// `[[0, 0]]`; `real_space` is its unnormalized inverse transform.
pub fn propagate_single_probe(
    inputs: PropagationInputs<'_>,
    planner: &TransformPlanner,
    xp: f64,
    yp: f64,
) -> Result<(Array2<Complex64>, Array2<Complex64>), EngineError> {
    let (ny, nx) = inputs.grid.shape();
    let mut fft = planner.plan_batch(ny, nx, 1)?;
    let mut fields = Array3::zeros((1, ny, nx));
    place_probe(
        fields.index_axis_mut(Axis(0), 0),
        inputs.probe,
        inputs.grid,
        xp,
        yp,
    );

    for transmission in inputs.transmission.outer_iter() {
        fft.inverse(contiguous(&mut fields)?, 1);
        multiply(fields.index_axis_mut(Axis(0), 0), transmission);
        fft.forward(contiguous(&mut fields)?, 1);
        multiply(fields.index_axis_mut(Axis(0), 0), inputs.propagator.view());
    }
    planner.release(fft)?;

    let k_space = fftshift2(quarter_shift(fields.index_axis(Axis(0), 0)).view());
    let (sy, sx) = k_space.dim();
    let mut small = planner.plan_batch(sy, sx, 1)?;
    let mut real_space = k_space.clone();
    let buffer = real_space
        .as_slice_mut()
        .ok_or_else(|| EngineError::Internal("probe crop is not contiguous".into()))?;
    small.inverse(buffer, 1);
    planner.release(small)?;

    Ok((real_space, k_space))
}
