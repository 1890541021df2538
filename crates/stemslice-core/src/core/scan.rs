use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ScanError {
    #[error("Scan pattern produced no probe positions")]
    NoPositions,

    #[error("Arbitrary probe lists differ in length ({x_len} x-coordinates, {y_len} y-coordinates)")]
    MismatchedCoordinates { x_len: usize, y_len: usize },
}

/// Spacing between raster positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum ProbeStep {
    /// Fixed step in Å along each axis.
    Fixed { x: f64, y: f64 },
    /// Step chosen from the probe-forming aperture so the scan samples the
    /// probe at the Nyquist rate.
    Nyquist,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum ScanPattern {
    /// Rectangular raster. Window bounds are fractions of the cell extent.
    Raster {
        window_x: [f64; 2],
        window_y: [f64; 2],
        step: ProbeStep,
    },
    /// Explicit positions in Å; probe `i` is placed at `(x[i], y[i])`.
    Arbitrary { x: Vec<f64>, y: Vec<f64> },
}

#[derive(Debug, Clone, PartialEq)]
enum Layout {
    Raster { xp: Vec<f64>, yp: Vec<f64> },
    Arbitrary { x: Vec<f64>, y: Vec<f64> },
}

/// Resolved probe positions and their mapping onto output cells.
///
/// Raster probes are numbered row-major: probe `i` sits at
/// `(xp[i % nx], yp[i / nx])` and writes output cell `(i / nx, i % nx)`.
/// Arbitrary probes write output cell `(0, i)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPositions {
    layout: Layout,
}

impl ScanPositions {
    /// Resolves a scan pattern against a cell of extent `(y, x)` Å.
    ///
    /// `aperture_cutoff` is the probe-forming cutoff `semiangle / λ` in 1/Å,
    /// used only for Nyquist sampling.
    pub fn build(
        pattern: &ScanPattern,
        cell_extent: (f64, f64),
        aperture_cutoff: f64,
    ) -> Result<Self, ScanError> {
        let layout = match pattern {
            ScanPattern::Arbitrary { x, y } => {
                if x.len() != y.len() {
                    return Err(ScanError::MismatchedCoordinates {
                        x_len: x.len(),
                        y_len: y.len(),
                    });
                }
                if x.is_empty() {
                    return Err(ScanError::NoPositions);
                }
                Layout::Arbitrary {
                    x: x.clone(),
                    y: y.clone(),
                }
            }
            ScanPattern::Raster {
                window_x,
                window_y,
                step,
            } => {
                let (extent_y, extent_x) = cell_extent;
                let (step_x, step_y) = match *step {
                    ProbeStep::Fixed { x, y } => (x, y),
                    ProbeStep::Nyquist => (
                        extent_x / nyquist_probes(aperture_cutoff, extent_x) as f64,
                        extent_y / nyquist_probes(aperture_cutoff, extent_y) as f64,
                    ),
                };
                let xp = vec_from_range(window_x[0] * extent_x, step_x, window_x[1] * extent_x);
                let yp = vec_from_range(window_y[0] * extent_y, step_y, window_y[1] * extent_y);
                Layout::Raster { xp, yp }
            }
        };

        let positions = Self { layout };
        if positions.num_probes() == 0 {
            return Err(ScanError::NoPositions);
        }
        Ok(positions)
    }

    pub fn num_probes(&self) -> usize {
        match &self.layout {
            Layout::Raster { xp, yp } => xp.len() * yp.len(),
            Layout::Arbitrary { x, .. } => x.len(),
        }
    }

    /// Output image shape `(ny_probes, nx_probes)`.
    pub fn shape(&self) -> (usize, usize) {
        match &self.layout {
            Layout::Raster { xp, yp } => (yp.len(), xp.len()),
            Layout::Arbitrary { x, .. } => (1, x.len()),
        }
    }

    pub fn is_arbitrary(&self) -> bool {
        matches!(self.layout, Layout::Arbitrary { .. })
    }

    /// Position `(x, y)` in Å of probe `index`.
    pub fn position(&self, index: usize) -> (f64, f64) {
        match &self.layout {
            Layout::Raster { xp, yp } => (xp[index % xp.len()], yp[index / xp.len()]),
            Layout::Arbitrary { x, y } => (x[index], y[index]),
        }
    }

    /// Output cell `(y, x)` written by probe `index`.
    pub fn cell(&self, index: usize) -> (usize, usize) {
        match &self.layout {
            Layout::Raster { xp, .. } => (index / xp.len(), index % xp.len()),
            Layout::Arbitrary { .. } => (0, index),
        }
    }
}

/// `start, start + step, ...` up to and including `stop`; never empty.
pub fn vec_from_range(start: f64, step: f64, stop: f64) -> Vec<f64> {
    if !(step > 0.0) || stop < start {
        return vec![start];
    }
    let count = ((stop - start) / step + 1e-9).floor() as usize + 1;
    (0..count).map(|i| start + i as f64 * step).collect()
}

/// Number of probe positions needed to sample a probe with cutoff
/// `aperture_cutoff` (1/Å) at the Nyquist rate over `extent` Å.
pub fn nyquist_probes(aperture_cutoff: f64, extent: f64) -> usize {
    ((4.0 * aperture_cutoff * extent).ceil() as usize).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_from_range_includes_stop_and_is_never_empty() {
        assert_eq!(vec_from_range(0.0, 1.0, 3.0), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(vec_from_range(0.0, 1.0, 2.5), vec![0.0, 1.0, 2.0]);
        assert_eq!(vec_from_range(2.0, 1.0, 1.0), vec![2.0]);
        assert_eq!(vec_from_range(0.5, 0.0, 1.0), vec![0.5]);
    }

    #[test]
    fn raster_positions_are_row_major() {
        let pattern = ScanPattern::Raster {
            window_x: [0.0, 0.5],
            window_y: [0.0, 0.25],
            step: ProbeStep::Fixed { x: 1.0, y: 1.0 },
        };
        let scan = ScanPositions::build(&pattern, (8.0, 8.0), 1.0).unwrap();
        assert_eq!(scan.shape(), (3, 5));
        assert_eq!(scan.num_probes(), 15);
        assert_eq!(scan.position(0), (0.0, 0.0));
        assert_eq!(scan.position(6), (1.0, 1.0));
        assert_eq!(scan.cell(6), (1, 1));
        assert_eq!(scan.cell(14), (2, 4));
        assert!(!scan.is_arbitrary());
    }

    #[test]
    fn arbitrary_positions_map_to_a_single_row() {
        let pattern = ScanPattern::Arbitrary {
            x: vec![1.0, 2.0, 3.0],
            y: vec![4.0, 5.0, 6.0],
        };
        let scan = ScanPositions::build(&pattern, (8.0, 8.0), 1.0).unwrap();
        assert_eq!(scan.shape(), (1, 3));
        assert_eq!(scan.position(2), (3.0, 6.0));
        assert_eq!(scan.cell(2), (0, 2));
        assert!(scan.is_arbitrary());
    }

    #[test]
    fn arbitrary_positions_reject_empty_and_mismatched_lists() {
        let empty = ScanPattern::Arbitrary {
            x: vec![],
            y: vec![],
        };
        assert_eq!(
            ScanPositions::build(&empty, (8.0, 8.0), 1.0).unwrap_err(),
            ScanError::NoPositions
        );

        let mismatched = ScanPattern::Arbitrary {
            x: vec![1.0],
            y: vec![],
        };
        assert_eq!(
            ScanPositions::build(&mismatched, (8.0, 8.0), 1.0).unwrap_err(),
            ScanError::MismatchedCoordinates { x_len: 1, y_len: 0 }
        );
    }

    #[test]
    fn nyquist_step_divides_cell_evenly() {
        let pattern = ScanPattern::Raster {
            window_x: [0.0, 1.0],
            window_y: [0.0, 1.0],
            step: ProbeStep::Nyquist,
        };
        // ceil(4 * 0.5 * 10) = 20 probes per 10 Å -> 0.5 Å step.
        let scan = ScanPositions::build(&pattern, (10.0, 10.0), 0.5).unwrap();
        assert_eq!(scan.position(1), (0.5, 0.0));
        assert_eq!(scan.shape(), (21, 21));
        assert_eq!(nyquist_probes(0.5, 10.0), 20);
    }
}
