use crate::core::grid::FourierGrid;
use crate::core::io::sink::{DatacubeRecord, DiffractionPattern, SinkError};
use crate::core::toroidal::quarter_shift_transposed;
use crate::engine::config::DiffractionOptions;
use crate::engine::context::SimulationContext;
use ndarray::{Array2, ArrayView2, Zip, s};
use num_complex::Complex64;
use std::ops::Range;

const DATACUBE_PREFIX: &str = "4DSTEM_simulation/data/datacubes/CBED_array_depth";

/// Per-worker reducer from reciprocal-space exit waves to the shared outputs.
///
/// Owns the scratch buffers it needs, so one accumulator must not be shared
/// between threads.
pub struct OutputAccumulator<'a> {
    context: SimulationContext<'a>,
    intensity: Array2<f64>,
    bins: Vec<f64>,
    crop: Option<[Range<usize>; 2]>,
    running_average: Option<DiffractionPattern>,
}

impl<'a> OutputAccumulator<'a> {
    pub fn new(context: SimulationContext<'a>) -> Self {
        let grid = context.inputs.grid;
        let crop = context
            .config
            .outputs
            .diffraction
            .as_ref()
            .and_then(|d| d.crop_max_angle)
            .map(|angle| crop_window(grid, angle / context.wavelength));
        Self {
            context,
            intensity: Array2::zeros(grid.shape()),
            bins: vec![0.0; context.detector.num_bins()],
            crop,
            running_average: None,
        }
    }

    /// Records one probe's reciprocal-space wave after an emitting slice.
    pub fn record(
        &mut self,
        layer: usize,
        probe: usize,
        field: ArrayView2<'_, Complex64>,
    ) -> Result<(), SinkError> {
        let context = self.context;
        let (cell_y, cell_x) = context.scan.cell(probe);

        Zip::from(&mut self.intensity)
            .and(&field)
            .for_each(|i, psi| *i = psi.norm_sqr());

        let bins = &mut self.bins;
        let num_bins = bins.len();
        bins.fill(0.0);
        Zip::from(&self.intensity)
            .and(context.detector.bin_index())
            .for_each(|&intensity, &bin| {
                if bin < num_bins {
                    bins[bin] += intensity;
                }
            });
        context.output.add_row(layer, cell_y, cell_x, bins.as_slice());

        if let Some(dpc) = context.dpc {
            let com = centre_of_mass(self.intensity.view(), context.inputs.grid);
            dpc.add_row(layer, cell_y, cell_x, &com);
        }

        if let Some(options) = &context.config.outputs.diffraction {
            self.export_pattern(layer, (cell_y, cell_x), field, options)?;
        }
        Ok(())
    }

    fn export_pattern(
        &mut self,
        layer: usize,
        (cell_y, cell_x): (usize, usize),
        field: ArrayView2<'_, Complex64>,
        options: &DiffractionOptions,
    ) -> Result<(), SinkError> {
        let context = self.context;
        let Some(sink) = context.datacube_sink else {
            return Ok(());
        };

        let pattern = if options.complex_wave {
            DiffractionPattern::Wave(crop(quarter_shift_transposed(field), &self.crop))
        } else {
            DiffractionPattern::Intensity(crop(
                quarter_shift_transposed(self.intensity.view()),
                &self.crop,
            ))
        };

        let tag = context.tag;
        let mut name = format!("{DATACUBE_PREFIX}{layer:04}{}", tag.tag);
        if options.complex_wave {
            name.push_str(&format!("_fp{:04}", tag.configuration_index));
        }

        let (a, b) = pattern.dim();
        let running_average = self
            .running_average
            .get_or_insert_with(|| zeroed_like(&pattern));

        sink.write_datacube(DatacubeRecord {
            pattern: &pattern,
            running_average,
            dims: [1, 1, a, b],
            offset: [cell_x, cell_y, 0, 0],
            num_configurations: tag.num_configurations,
            name: &name,
        })
    }
}

/// Intensity-weighted mean spatial frequency `(qx, qy)`; zero for a field
/// without intensity.
pub fn centre_of_mass(intensity: ArrayView2<'_, f64>, grid: &FourierGrid) -> [f64; 2] {
    let mut total = 0.0;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    Zip::from(&intensity)
        .and(grid.qxa())
        .and(grid.qya())
        .for_each(|&i, &qx, &qy| {
            total += i;
            sum_x += qx * i;
            sum_y += qy * i;
        });
    if total > 0.0 {
        [sum_x / total, sum_y / total]
    } else {
        [0.0, 0.0]
    }
}

/// Index ranges `[x, y]` of the quarter-shifted, x-major pattern that keep
/// spatial frequencies up to `q_cutoff` along each axis.
fn crop_window(grid: &FourierGrid, q_cutoff: f64) -> [Range<usize>; 2] {
    let (dqy, dqx) = grid.dq();
    [
        centred_range(grid.nx() / 2, dqx, q_cutoff),
        centred_range(grid.ny() / 2, dqy, q_cutoff),
    ]
}

/// Window of a quarter-shifted axis of length `len` (zero frequency at
/// `len / 2`) spanning `|q| <= q_cutoff`.
fn centred_range(len: usize, spacing: f64, q_cutoff: f64) -> Range<usize> {
    let centre = len / 2;
    let half_width = (q_cutoff / spacing).floor() as usize;
    centre.saturating_sub(half_width)..(centre + half_width + 1).min(len)
}

fn crop<T: Clone>(pattern: Array2<T>, window: &Option<[Range<usize>; 2]>) -> Array2<T> {
    match window {
        Some([x, y]) => pattern.slice(s![x.clone(), y.clone()]).to_owned(),
        None => pattern,
    }
}

fn zeroed_like(pattern: &DiffractionPattern) -> DiffractionPattern {
    match pattern {
        DiffractionPattern::Intensity(a) => DiffractionPattern::Intensity(Array2::zeros(a.raw_dim())),
        DiffractionPattern::Wave(a) => DiffractionPattern::Wave(Array2::zeros(a.raw_dim())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::PixelSize;

    #[test]
    fn centre_of_mass_of_a_single_spot_is_its_frequency() {
        let grid = FourierGrid::new(8, 8, PixelSize::uniform(0.5)).unwrap();
        let mut intensity = Array2::zeros((8, 8));
        intensity[[2, 1]] = 3.0;
        let [cx, cy] = centre_of_mass(intensity.view(), &grid);
        assert!((cx - grid.qx()[1]).abs() < 1e-12);
        assert!((cy - grid.qy()[2]).abs() < 1e-12);
    }

    #[test]
    fn centre_of_mass_of_symmetric_spots_is_zero() {
        let grid = FourierGrid::new(8, 8, PixelSize::uniform(0.5)).unwrap();
        let mut intensity = Array2::zeros((8, 8));
        intensity[[0, 1]] = 1.0;
        intensity[[0, 7]] = 1.0;
        intensity[[3, 0]] = 2.0;
        intensity[[5, 0]] = 2.0;
        let [cx, cy] = centre_of_mass(intensity.view(), &grid);
        assert!(cx.abs() < 1e-12);
        assert!(cy.abs() < 1e-12);
    }

    #[test]
    fn centre_of_mass_of_an_empty_field_is_the_origin() {
        let grid = FourierGrid::new(8, 8, PixelSize::uniform(0.5)).unwrap();
        let intensity = Array2::zeros((8, 8));
        assert_eq!(centre_of_mass(intensity.view(), &grid), [0.0, 0.0]);
    }

    #[test]
    fn centred_range_is_symmetric_and_clamped() {
        assert_eq!(centred_range(16, 1.0, 2.5), 6..11);
        assert_eq!(centred_range(16, 1.0, 0.0), 8..9);
        assert_eq!(centred_range(16, 1.0, 100.0), 0..16);
    }

    #[test]
    fn crop_window_keeps_the_zero_frequency() {
        let grid = FourierGrid::new(32, 16, PixelSize::uniform(0.25)).unwrap();
        let (dqy, dqx) = grid.dq();
        let [x, y] = crop_window(&grid, 2.0 * dqx.max(dqy));
        assert!(x.contains(&(grid.nx() / 4)));
        assert!(y.contains(&(grid.ny() / 4)));

        let pattern = Array2::from_shape_fn((8, 16), |(x, y)| (x * 100 + y) as i32);
        let cropped = crop(pattern, &Some([x.clone(), y.clone()]));
        assert_eq!(cropped.dim(), (x.len(), y.len()));
        assert_eq!(cropped[[0, 0]], (x.start * 100 + y.start) as i32);
    }
}
