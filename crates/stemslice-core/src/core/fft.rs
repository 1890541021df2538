//! Batched, unnormalized 2D FFTs over probe-major stacks of fields.
//!
//! A batch buffer holds `batch` fields of `ny x nx` pixels laid out back to
//! back (`[probe][y][x]`, row-major). Rows are transformed with a single plan
//! invocation over the whole active prefix of the buffer; columns are
//! transformed by transposing each field into a scratch stack, running one
//! invocation over all columns, and transposing back. Every field is
//! transformed independently, so a field's result does not depend on the
//! batch it travels in.

use num_complex::Complex64;
use rustfft::{Fft, FftDirection, FftPlanner};
use std::sync::Arc;

pub struct BatchFft2 {
    ny: usize,
    nx: usize,
    batch: usize,
    row_forward: Arc<dyn Fft<f64>>,
    row_inverse: Arc<dyn Fft<f64>>,
    col_forward: Arc<dyn Fft<f64>>,
    col_inverse: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex64>,
    transposed: Vec<Complex64>,
}

impl BatchFft2 {
    /// Plans transforms for up to `batch` fields of `ny x nx` pixels.
    pub fn new(planner: &mut FftPlanner<f64>, ny: usize, nx: usize, batch: usize) -> Self {
        let row_forward = planner.plan_fft(nx, FftDirection::Forward);
        let row_inverse = planner.plan_fft(nx, FftDirection::Inverse);
        let col_forward = planner.plan_fft(ny, FftDirection::Forward);
        let col_inverse = planner.plan_fft(ny, FftDirection::Inverse);

        let scratch_len = [&row_forward, &row_inverse, &col_forward, &col_inverse]
            .iter()
            .map(|plan| plan.get_inplace_scratch_len())
            .max()
            .unwrap_or(0);

        Self {
            ny,
            nx,
            batch,
            row_forward,
            row_inverse,
            col_forward,
            col_inverse,
            scratch: vec![Complex64::new(0.0, 0.0); scratch_len],
            transposed: vec![Complex64::new(0.0, 0.0); ny * nx * batch],
        }
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    /// Unnormalized forward transform of the first `active` fields of `data`.
    pub fn forward(&mut self, data: &mut [Complex64], active: usize) {
        self.transform(data, active, FftDirection::Forward);
    }

    /// Unnormalized inverse transform of the first `active` fields of `data`.
    pub fn inverse(&mut self, data: &mut [Complex64], active: usize) {
        self.transform(data, active, FftDirection::Inverse);
    }

    fn transform(&mut self, data: &mut [Complex64], active: usize, direction: FftDirection) {
        assert!(
            active <= self.batch,
            "BatchFft2: {active} fields exceed planned batch of {}",
            self.batch
        );
        let (ny, nx) = (self.ny, self.nx);
        let len = active * ny * nx;
        if len == 0 {
            return;
        }
        let data = &mut data[..len];

        let (row, col) = match direction {
            FftDirection::Forward => (&self.row_forward, &self.col_forward),
            FftDirection::Inverse => (&self.row_inverse, &self.col_inverse),
        };

        row.process_with_scratch(data, &mut self.scratch);

        let transposed = &mut self.transposed[..len];
        for (field, field_t) in data
            .chunks_exact(ny * nx)
            .zip(transposed.chunks_exact_mut(ny * nx))
        {
            for y in 0..ny {
                for x in 0..nx {
                    field_t[x * ny + y] = field[y * nx + x];
                }
            }
        }

        col.process_with_scratch(transposed, &mut self.scratch);

        for (field, field_t) in data
            .chunks_exact_mut(ny * nx)
            .zip(transposed.chunks_exact(ny * nx))
        {
            for y in 0..ny {
                for x in 0..nx {
                    field[y * nx + x] = field_t[x * ny + y];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn field(ny: usize, nx: usize, seed: f64) -> Vec<Complex64> {
        (0..ny * nx)
            .map(|i| {
                let t = i as f64 + seed;
                Complex64::new((0.37 * t).sin(), (1.3 * t).cos() * 0.5)
            })
            .collect()
    }

    fn naive_dft2(input: &[Complex64], ny: usize, nx: usize) -> Vec<Complex64> {
        let mut out = vec![Complex64::new(0.0, 0.0); ny * nx];
        for ky in 0..ny {
            for kx in 0..nx {
                let mut acc = Complex64::new(0.0, 0.0);
                for y in 0..ny {
                    for x in 0..nx {
                        let phase = -2.0 * PI
                            * ((ky * y) as f64 / ny as f64 + (kx * x) as f64 / nx as f64);
                        acc += input[y * nx + x] * Complex64::from_polar(1.0, phase);
                    }
                }
                out[ky * nx + kx] = acc;
            }
        }
        out
    }

    #[test]
    fn forward_matches_direct_dft() {
        let (ny, nx) = (4, 6);
        let mut planner = FftPlanner::new();
        let mut fft = BatchFft2::new(&mut planner, ny, nx, 1);
        let input = field(ny, nx, 0.0);
        let mut data = input.clone();
        fft.forward(&mut data, 1);
        let expected = naive_dft2(&input, ny, nx);
        for (a, b) in data.iter().zip(expected.iter()) {
            assert!((a - b).norm() < 1e-9);
        }
    }

    #[test]
    fn forward_then_inverse_round_trips_with_normalization() {
        let (ny, nx) = (8, 16);
        let mut planner = FftPlanner::new();
        let mut fft = BatchFft2::new(&mut planner, ny, nx, 2);
        let original: Vec<_> = field(ny, nx, 1.0)
            .into_iter()
            .chain(field(ny, nx, 9.0))
            .collect();
        let mut data = original.clone();
        fft.forward(&mut data, 2);
        fft.inverse(&mut data, 2);
        let scale = 1.0 / (ny * nx) as f64;
        for (a, b) in data.iter().zip(original.iter()) {
            assert!((a * scale - b).norm() < 1e-12);
        }
    }

    #[test]
    fn batched_fields_match_individual_transforms() {
        let (ny, nx) = (8, 8);
        let mut planner = FftPlanner::new();
        let mut batched = BatchFft2::new(&mut planner, ny, nx, 3);
        let mut single = BatchFft2::new(&mut planner, ny, nx, 1);

        let fields: Vec<_> = (0..3).map(|i| field(ny, nx, i as f64 * 5.0)).collect();
        let mut stack: Vec<_> = fields.iter().flatten().copied().collect();
        batched.forward(&mut stack, 3);

        for (i, f) in fields.iter().enumerate() {
            let mut alone = f.clone();
            single.forward(&mut alone, 1);
            for (a, b) in stack[i * ny * nx..(i + 1) * ny * nx].iter().zip(alone.iter()) {
                assert!((a - b).norm() < 1e-12);
            }
        }
    }

    #[test]
    fn partial_batches_leave_inactive_fields_untouched() {
        let (ny, nx) = (4, 4);
        let mut planner = FftPlanner::new();
        let mut fft = BatchFft2::new(&mut planner, ny, nx, 2);
        let tail = field(ny, nx, 3.0);
        let mut data: Vec<_> = field(ny, nx, 0.0).into_iter().chain(tail.clone()).collect();
        fft.forward(&mut data, 1);
        assert_eq!(&data[ny * nx..], tail.as_slice());
    }
}
