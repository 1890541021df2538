use crate::core::detector::DetectorBins;
use crate::core::grid::{FourierGrid, GridError};
use crate::core::io::sink::{DatacubeSink, ProbeSink};
use crate::core::optics::probe::build_initial_probe;
use crate::core::optics::propagator::{build_propagator, scaled_propagator};
use crate::core::optics::transmission::build_transmission;
use crate::core::scan::ScanPositions;
use crate::engine::config::{FrozenPhononTag, SimulationConfig};
use crate::engine::context::{PropagationInputs, SimulationContext};
use crate::engine::dispatcher::WorkDispatcher;
use crate::engine::error::EngineError;
use crate::engine::layers::OutputLayers;
use crate::engine::output::OutputVolume;
use crate::engine::planner::TransformPlanner;
use crate::engine::progress::{ProbeProgress, Progress, ProgressReporter};
use crate::engine::tasks::multislice::run_worker;
use crate::engine::tasks::single_probe::propagate_single_probe;
use ndarray::{Array2, Array3, Array4, ArrayView3};
use num_complex::Complex64;
use std::sync::atomic::AtomicBool;
use tracing::{debug, info, instrument, warn};

/// External collaborators that persist optional outputs.
#[derive(Default, Clone, Copy)]
pub struct Sinks<'a> {
    pub datacube: Option<&'a dyn DatacubeSink>,
    pub probe: Option<&'a dyn ProbeSink>,
}

#[derive(Debug, Clone)]
pub struct MultisliceResult {
    /// Detector image volume `[layer, y_probe, x_probe, bin]`, summed over
    /// every configuration that was run.
    pub output: Array4<f64>,
    /// Centre-of-mass volume `[layer, y_probe, x_probe, (qx, qy)]`.
    pub dpc: Option<Array4<f64>>,
    /// Depth of every recorded layer in Å.
    pub depths: Vec<f64>,
    /// Centre angle of every detector bin in mrad.
    pub detector_angles_mrad: Vec<f64>,
    /// Output image shape `(ny_probes, nx_probes)`.
    pub scan_shape: (usize, usize),
}

/// Launch-wide state: built once, then shared by every configuration.
pub struct MultisliceSetup {
    config: SimulationConfig,
    wavelength: f64,
    sigma: f64,
    num_planes: usize,
    grid: FourierGrid,
    scan: ScanPositions,
    detector: DetectorBins,
    layers: OutputLayers,
    probe: Array2<Complex64>,
    propagator: Array2<Complex64>,
    output: OutputVolume,
    dpc: Option<OutputVolume>,
    planner: TransformPlanner,
}

/// Builds coordinates, scan, detector, probe and propagator for potentials of
/// shape `[slices, ny, nx]`, and allocates the output volumes.
///
/// # Errors
///
/// Fails on a degenerate or odd grid, a potential without slices, or a scan
/// that yields no probe positions. Nothing is propagated.
#[instrument(skip_all, name = "multislice_prepare")]
pub fn prepare(
    config: SimulationConfig,
    potential_shape: [usize; 3],
) -> Result<MultisliceSetup, EngineError> {
    let [num_planes, ny, nx] = potential_shape;
    if num_planes == 0 {
        return Err(GridError::NoSlices.into());
    }
    let grid = FourierGrid::new(ny, nx, config.pixel_size)?;
    let wavelength = config.wavelength();
    let sigma = config.sigma();
    info!(
        ny,
        nx,
        q_max = grid.q_max(),
        wavelength,
        "Built reciprocal-space grid."
    );

    let scan = ScanPositions::build(&config.scan, grid.cell_extent(), config.aperture_cutoff())?;
    let (scan_ny, scan_nx) = scan.shape();
    info!(
        num_probes = scan.num_probes(),
        scan_ny,
        scan_nx,
        arbitrary = scan.is_arbitrary(),
        "Resolved scan positions."
    );

    let detector = DetectorBins::new(&grid, wavelength, config.detector_angle_step);
    info!(
        num_bins = detector.num_bins(),
        step = detector.step(),
        "Built virtual detector."
    );

    let layers = OutputLayers::new(
        num_planes,
        config.slices_per_output,
        config.z_start_plane,
        config.slice_thickness,
    );
    let depth_step = config.slices_per_output.unwrap_or(num_planes) as f64 * config.slice_thickness;
    info!(
        num_layers = layers.num_layers(),
        first_depth = layers.depths().first().copied().unwrap_or_default(),
        depth_step,
        "Planned output layers."
    );
    if config.z_start_plane > num_planes {
        warn!(
            z_start_plane = config.z_start_plane,
            num_planes, "Start plane lies beyond the sample; only the exit surface is recorded."
        );
    }

    let probe = build_initial_probe(
        &grid,
        wavelength,
        config.probe_semiangle,
        &config.aberrations,
    );
    let propagator = scaled_propagator(&build_propagator(
        &grid,
        wavelength,
        config.slice_thickness,
        config.probe_tilt,
    ));

    let output = OutputVolume::new([layers.num_layers(), scan_ny, scan_nx, detector.num_bins()]);
    let dpc = config
        .outputs
        .save_dpc_com
        .then(|| OutputVolume::new([layers.num_layers(), scan_ny, scan_nx, 2]));

    Ok(MultisliceSetup {
        config,
        wavelength,
        sigma,
        num_planes,
        grid,
        scan,
        detector,
        layers,
        probe,
        propagator,
        output,
        dpc,
        planner: TransformPlanner::new(),
    })
}

impl MultisliceSetup {
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn grid(&self) -> &FourierGrid {
        &self.grid
    }

    pub fn scan(&self) -> &ScanPositions {
        &self.scan
    }

    pub fn detector(&self) -> &DetectorBins {
        &self.detector
    }

    pub fn layers(&self) -> &OutputLayers {
        &self.layers
    }

    /// Normalized initial probe in reciprocal space.
    pub fn probe(&self) -> &Array2<Complex64> {
        &self.probe
    }

    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Shape `[slices, ny, nx]` every potential must have.
    pub fn potential_shape(&self) -> [usize; 3] {
        [self.num_planes, self.grid.ny(), self.grid.nx()]
    }

    /// Probes per worker request for this launch.
    pub fn batch_size(&self) -> usize {
        batch_size(
            self.config.batch_size_target,
            self.scan.num_probes(),
            self.config.num_threads,
        )
    }

    /// Propagates every probe through one sample configuration and adds the
    /// results to the output volumes.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DimensionMismatch`] or
    /// [`EngineError::MissingSink`] before any work starts, and the first
    /// worker failure otherwise. A failed configuration leaves the volumes
    /// partially accumulated.
    #[instrument(skip_all, name = "multislice_configuration", fields(configuration = tag.configuration_index))]
    pub fn run_configuration(
        &self,
        potential: ArrayView3<'_, f64>,
        tag: &FrozenPhononTag,
        sinks: Sinks<'_>,
        reporter: &ProgressReporter,
    ) -> Result<(), EngineError> {
        self.check_potential(potential)?;
        let outputs = &self.config.outputs;
        if outputs.diffraction.is_some() && sinks.datacube.is_none() {
            return Err(EngineError::MissingSink("diffraction patterns"));
        }
        let save_probe = outputs.save_probe && tag.configuration_index == 0;
        if save_probe && sinks.probe.is_none() {
            return Err(EngineError::MissingSink("probe snapshot"));
        }

        reporter.report(Progress::PhaseStart {
            name: "Transmission",
        });
        let transmission = build_transmission(potential, self.sigma);
        reporter.report(Progress::PhaseFinish);

        if let (true, Some(sink)) = (save_probe, sinks.probe) {
            sink.save_probe(self.probe.view(), &self.grid)?;
            debug!("Saved initial probe snapshot.");
        }

        let num_probes = self.scan.num_probes();
        let threads = self.config.num_threads;
        let batch = self.batch_size();
        info!(
            num_probes,
            threads, batch, "Launching multislice workers."
        );

        reporter.report(Progress::PhaseStart { name: "Multislice" });
        reporter.report(Progress::TaskStart {
            total: num_probes as u64,
        });

        let progress = ProbeProgress::new(reporter, num_probes);
        let context = SimulationContext {
            config: &self.config,
            tag,
            inputs: self.inputs(&transmission),
            wavelength: self.wavelength,
            scan: &self.scan,
            detector: &self.detector,
            layers: &self.layers,
            output: &self.output,
            dpc: self.dpc.as_ref(),
            datacube_sink: sinks.datacube,
            progress: &progress,
        };
        let dispatcher = WorkDispatcher::new(num_probes);
        let processed = run_workers(context, &dispatcher, &self.planner, batch, threads)?;

        reporter.report(Progress::TaskFinish);
        reporter.report(Progress::PhaseFinish);

        if processed != num_probes {
            return Err(EngineError::Internal(format!(
                "workers processed {processed} of {num_probes} probes"
            )));
        }
        info!(
            configuration = tag.configuration_index,
            "Configuration complete."
        );
        Ok(())
    }

    /// Propagates a single probe at `(xp, yp)` Å through `potential` without
    /// touching the output volumes. See [`single_probe`].
    pub fn single_probe(
        &self,
        potential: ArrayView3<'_, f64>,
        xp: f64,
        yp: f64,
    ) -> Result<(Array2<Complex64>, Array2<Complex64>), EngineError> {
        self.check_potential(potential)?;
        let transmission = build_transmission(potential, self.sigma);
        propagate_single_probe(self.inputs(&transmission), &self.planner, xp, yp)
    }

    /// Consumes the setup and returns the accumulated volumes.
    pub fn finish(self) -> MultisliceResult {
        MultisliceResult {
            output: self.output.into_array(),
            dpc: self.dpc.map(OutputVolume::into_array),
            depths: self.layers.depths().to_vec(),
            detector_angles_mrad: self.detector.angles_mrad().to_vec(),
            scan_shape: self.scan.shape(),
        }
    }

    fn inputs<'a>(&'a self, transmission: &'a Array3<Complex64>) -> PropagationInputs<'a> {
        PropagationInputs {
            grid: &self.grid,
            probe: &self.probe,
            propagator: &self.propagator,
            transmission,
        }
    }

    fn check_potential(&self, potential: ArrayView3<'_, f64>) -> Result<(), EngineError> {
        let (nz, ny, nx) = potential.dim();
        let found = [nz, ny, nx];
        let expected = self.potential_shape();
        if found != expected {
            return Err(EngineError::DimensionMismatch { expected, found });
        }
        Ok(())
    }
}

/// Runs one configuration end to end and returns the output volumes.
#[instrument(skip_all, name = "multislice_workflow")]
pub fn run(
    config: &SimulationConfig,
    potential: ArrayView3<'_, f64>,
    sinks: Sinks<'_>,
    reporter: &ProgressReporter,
) -> Result<MultisliceResult, EngineError> {
    let (nz, ny, nx) = potential.dim();
    let setup = prepare(config.clone(), [nz, ny, nx])?;
    setup.run_configuration(potential, &config.frozen_phonon, sinks, reporter)?;
    let result = setup.finish();
    info!(
        num_layers = result.depths.len(),
        "Multislice simulation finished."
    );
    Ok(result)
}

/// Propagates one probe at `(xp, yp)` Å through `potential`.
///
/// Returns `(real_space, k_space)`: the non-aliased quarter of the
/// reciprocal-space exit wave with its zero frequency moved to `[[0, 0]]`, and
/// the unnormalized inverse transform of that quarter.
pub fn single_probe(
    config: &SimulationConfig,
    potential: ArrayView3<'_, f64>,
    xp: f64,
    yp: f64,
) -> Result<(Array2<Complex64>, Array2<Complex64>), EngineError> {
    let (nz, ny, nx) = potential.dim();
    prepare(config.clone(), [nz, ny, nx])?.single_probe(potential, xp, yp)
}

/// `min(target, max(1, probes / threads))`: keeps every thread busy when the
/// probe count is small.
pub fn batch_size(target: usize, num_probes: usize, threads: usize) -> usize {
    target.min((num_probes / threads.max(1)).max(1)).max(1)
}

fn run_workers(
    context: SimulationContext<'_>,
    dispatcher: &WorkDispatcher,
    planner: &TransformPlanner,
    batch: usize,
    threads: usize,
) -> Result<usize, EngineError> {
    let abort = AtomicBool::new(false);
    let work = || run_worker(context, dispatcher, planner, batch, &abort);

    #[cfg(feature = "parallel")]
    let results: Vec<Result<usize, EngineError>> = {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| EngineError::ThreadPool(e.to_string()))?;
        pool.broadcast(|_| work())
    };

    #[cfg(not(feature = "parallel"))]
    let results: Vec<Result<usize, EngineError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads).map(|_| scope.spawn(&work)).collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
            })
            .collect()
    });

    let mut processed = 0;
    let mut first_error = None;
    for result in results {
        match result {
            Ok(count) => processed += count,
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(processed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_never_starves_threads() {
        assert_eq!(batch_size(8, 1000, 4), 8);
        assert_eq!(batch_size(8, 12, 4), 3);
        assert_eq!(batch_size(8, 2, 4), 1);
        assert_eq!(batch_size(1, 1000, 1), 1);
        assert_eq!(batch_size(64, 64, 1), 64);
    }
}
