use ndarray::Array4;
use std::sync::atomic::{AtomicU64, Ordering};

/// Accumulate-only 4D volume shared by all workers.
///
/// Cells hold `f64` bit patterns. Each `(layer, y, x)` row is written by the
/// single probe that owns that output cell, so concurrent workers never touch
/// the same cell; the atomics only make the sharing expressible without locks.
#[derive(Debug)]
pub struct OutputVolume {
    shape: [usize; 4],
    cells: Vec<AtomicU64>,
}

impl OutputVolume {
    /// Zero-filled volume of shape `[layers, ny, nx, channels]`.
    pub fn new(shape: [usize; 4]) -> Self {
        let len = shape.iter().product();
        let cells = (0..len).map(|_| AtomicU64::new(0.0f64.to_bits())).collect();
        Self { shape, cells }
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn channels(&self) -> usize {
        self.shape[3]
    }

    /// Adds `values` element-wise to the channel row at `(layer, y, x)`.
    pub fn add_row(&self, layer: usize, y: usize, x: usize, values: &[f64]) {
        let [layers, ny, nx, channels] = self.shape;
        debug_assert!(layer < layers && y < ny && x < nx);
        debug_assert_eq!(values.len(), channels);
        let start = ((layer * ny + y) * nx + x) * channels;
        for (cell, &value) in self.cells[start..start + channels].iter().zip(values) {
            if value != 0.0 {
                add_f64(cell, value);
            }
        }
    }

    pub fn get(&self, index: [usize; 4]) -> f64 {
        let [_, ny, nx, channels] = self.shape;
        let flat = ((index[0] * ny + index[1]) * nx + index[2]) * channels + index[3];
        f64::from_bits(self.cells[flat].load(Ordering::Relaxed))
    }

    /// Copies the current contents into an owned array.
    pub fn to_array(&self) -> Array4<f64> {
        let [a, b, c, d] = self.shape;
        Array4::from_shape_fn((a, b, c, d), |(l, y, x, ch)| self.get([l, y, x, ch]))
    }

    pub fn into_array(self) -> Array4<f64> {
        self.to_array()
    }
}

#[inline]
fn add_f64(cell: &AtomicU64, value: f64) {
    let _ = cell.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
        Some((f64::from_bits(bits) + value).to_bits())
    });
}
