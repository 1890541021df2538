use super::toroidal::quarter_window;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum GridError {
    #[error("Grid must have at least one pixel along each axis (got {ny}x{nx})")]
    Degenerate { ny: usize, nx: usize },

    #[error("Grid dimensions must be even for the quarter-shift layout (got {ny}x{nx})")]
    OddDimension { ny: usize, nx: usize },

    #[error("Potential must contain at least one slice")]
    NoSlices,
}

/// Real-space sampling of the potential grid in Å per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelSize {
    pub x: f64,
    pub y: f64,
}

impl PixelSize {
    pub fn uniform(size: f64) -> Self {
        Self { x: size, y: size }
    }
}

/// Reciprocal-space coordinates of a periodic `ny x nx` simulation cell.
///
/// All 2D arrays are indexed `[[y, x]]` in the unshifted FFT ordering, so the
/// zero frequency sits at `[[0, 0]]`.
#[derive(Debug, Clone)]
pub struct FourierGrid {
    ny: usize,
    nx: usize,
    pixel_size: PixelSize,
    qx: Array1<f64>,
    qy: Array1<f64>,
    qxa: Array2<f64>,
    qya: Array2<f64>,
    q2: Array2<f64>,
    q1: Array2<f64>,
    q_max: f64,
    mask: Array2<bool>,
}

impl FourierGrid {
    pub fn new(ny: usize, nx: usize, pixel_size: PixelSize) -> Result<Self, GridError> {
        if ny == 0 || nx == 0 {
            return Err(GridError::Degenerate { ny, nx });
        }
        if ny % 2 != 0 || nx % 2 != 0 {
            return Err(GridError::OddDimension { ny, nx });
        }

        let qx = fourier_coords(nx, pixel_size.x);
        let qy = fourier_coords(ny, pixel_size.y);

        let qxa = Array2::from_shape_fn((ny, nx), |(_, x)| qx[x]);
        let qya = Array2::from_shape_fn((ny, nx), |(y, _)| qy[y]);
        let q2 = Array2::from_shape_fn((ny, nx), |(y, x)| qx[x] * qx[x] + qy[y] * qy[y]);
        let q1 = q2.mapv(f64::sqrt);

        let dpx = 1.0 / (nx as f64 * pixel_size.x);
        let dpy = 1.0 / (ny as f64 * pixel_size.y);
        let q_max = (dpx * (nx / 2) as f64).min(dpy * (ny / 2) as f64) / 2.0;

        let mut mask = Array2::from_elem((ny, nx), false);
        for (_, [sy, sx]) in quarter_window(ny, nx) {
            mask[[sy, sx]] = q1[[sy, sx]] <= q_max;
        }

        Ok(Self {
            ny,
            nx,
            pixel_size,
            qx,
            qy,
            qxa,
            qya,
            q2,
            q1,
            q_max,
            mask,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.ny, self.nx)
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn pixel_size(&self) -> PixelSize {
        self.pixel_size
    }

    /// Real-space extent of the cell as `(y, x)` in Å.
    pub fn cell_extent(&self) -> (f64, f64) {
        (
            self.ny as f64 * self.pixel_size.y,
            self.nx as f64 * self.pixel_size.x,
        )
    }

    pub fn qx(&self) -> &Array1<f64> {
        &self.qx
    }

    pub fn qy(&self) -> &Array1<f64> {
        &self.qy
    }

    pub fn qxa(&self) -> &Array2<f64> {
        &self.qxa
    }

    pub fn qya(&self) -> &Array2<f64> {
        &self.qya
    }

    pub fn q2(&self) -> &Array2<f64> {
        &self.q2
    }

    pub fn q1(&self) -> &Array2<f64> {
        &self.q1
    }

    /// Anti-aliasing band limit in 1/Å.
    pub fn q_max(&self) -> f64 {
        self.q_max
    }

    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    /// Reciprocal pixel spacing `(dqy, dqx)`.
    pub fn dq(&self) -> (f64, f64) {
        (
            1.0 / (self.ny as f64 * self.pixel_size.y),
            1.0 / (self.nx as f64 * self.pixel_size.x),
        )
    }

    /// Azimuth `atan2(qy, qx)` of every pixel.
    pub fn q_theta(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.ny, self.nx), |(y, x)| self.qy[y].atan2(self.qx[x]))
    }
}

/// Spatial frequencies of an `n`-point transform in FFT ordering: non-negative
/// frequencies first, then the negative half.
pub fn fourier_coords(n: usize, pixel_size: f64) -> Array1<f64> {
    let dp = 1.0 / (n as f64 * pixel_size);
    let nc = n / 2;
    let mut coords = Array1::zeros(n);
    for i in 0..n {
        coords[(nc + i) % n] = (i as f64 - nc as f64) * dp;
    }
    coords
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn fourier_coords_follow_fft_ordering() {
        let q = fourier_coords(8, 0.5);
        let dp = 1.0 / 4.0;
        let expected = [0.0, 1.0, 2.0, 3.0, -4.0, -3.0, -2.0, -1.0];
        for (value, e) in q.iter().zip(expected) {
            assert!(close(*value, e * dp), "{value} != {}", e * dp);
        }
    }

    #[test]
    fn new_rejects_degenerate_and_odd_grids() {
        assert_eq!(
            FourierGrid::new(0, 8, PixelSize::uniform(0.1)).unwrap_err(),
            GridError::Degenerate { ny: 0, nx: 8 }
        );
        assert_eq!(
            FourierGrid::new(8, 7, PixelSize::uniform(0.1)).unwrap_err(),
            GridError::OddDimension { ny: 8, nx: 7 }
        );
    }

    #[test]
    fn meshgrid_arrays_are_consistent() {
        let grid = FourierGrid::new(8, 16, PixelSize { x: 0.2, y: 0.3 }).unwrap();
        assert_eq!(grid.shape(), (8, 16));
        for y in 0..8 {
            for x in 0..16 {
                let qx = grid.qx()[x];
                let qy = grid.qy()[y];
                assert!(close(grid.qxa()[[y, x]], qx));
                assert!(close(grid.qya()[[y, x]], qy));
                assert!(close(grid.q2()[[y, x]], qx * qx + qy * qy));
                assert!(close(grid.q1()[[y, x]], (qx * qx + qy * qy).sqrt()));
            }
        }
    }

    #[test]
    fn band_limit_is_half_the_nyquist_frequency_of_the_coarser_axis() {
        let grid = FourierGrid::new(16, 32, PixelSize { x: 0.1, y: 0.2 }).unwrap();
        let nyquist_x: f64 = 1.0 / (2.0 * 0.1);
        let nyquist_y: f64 = 1.0 / (2.0 * 0.2);
        assert!(close(grid.q_max(), nyquist_x.min(nyquist_y) / 2.0));
    }

    #[test]
    fn mask_is_zero_outside_band_limit_and_contains_origin() {
        let grid = FourierGrid::new(32, 32, PixelSize::uniform(0.1)).unwrap();
        assert!(grid.mask()[[0, 0]]);
        for ((y, x), &inside) in grid.mask().indexed_iter() {
            if grid.q1()[[y, x]] > grid.q_max() {
                assert!(!inside, "pixel ({y}, {x}) beyond band limit is unmasked");
            }
        }
        // The highest frequencies (near the Nyquist row/column) are always excluded.
        assert!(!grid.mask()[[16, 0]]);
        assert!(!grid.mask()[[0, 16]]);
    }

    #[test]
    fn mask_is_symmetric_under_frequency_negation_within_window() {
        let grid = FourierGrid::new(16, 16, PixelSize::uniform(0.25)).unwrap();
        // (1, 1) and (-1, -1) both lie well inside the disk.
        assert!(grid.mask()[[1, 1]]);
        assert!(grid.mask()[[15, 15]]);
    }
}
