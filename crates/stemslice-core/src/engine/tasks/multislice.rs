use super::accumulate::OutputAccumulator;
use crate::core::fft::BatchFft2;
use crate::core::grid::FourierGrid;
use crate::engine::context::SimulationContext;
use crate::engine::dispatcher::WorkDispatcher;
use crate::engine::error::EngineError;
use crate::engine::planner::TransformPlanner;
use ndarray::{Array2, Array3, ArrayView2, ArrayViewMut2, Zip};
use num_complex::Complex64;
use std::f64::consts::PI;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, instrument};

/// Propagates batches of probes through every slice of the sample.
///
/// The probe-major buffer stays in reciprocal space between slices. One slice
/// step is: inverse transform, multiply by the transmission layer, forward
/// transform, multiply by the scaled propagator.
pub struct BatchPropagator<'a> {
    context: SimulationContext<'a>,
    fft: BatchFft2,
    fields: Array3<Complex64>,
    accumulator: OutputAccumulator<'a>,
}

impl<'a> BatchPropagator<'a> {
    pub fn new(
        context: SimulationContext<'a>,
        planner: &TransformPlanner,
        batch: usize,
    ) -> Result<Self, EngineError> {
        let (ny, nx) = context.inputs.grid.shape();
        let fft = planner.plan_batch(ny, nx, batch)?;
        Ok(Self {
            context,
            fft,
            fields: Array3::zeros((batch, ny, nx)),
            accumulator: OutputAccumulator::new(context),
        })
    }

    pub fn batch(&self) -> usize {
        self.fft.batch()
    }

    /// Propagates every probe in `probes`, split into batches of at most
    /// [`BatchPropagator::batch`] probes.
    pub fn propagate(&mut self, probes: Range<usize>) -> Result<(), EngineError> {
        let batch = self.batch();
        let mut start = probes.start;
        while start < probes.end {
            let stop = (start + batch).min(probes.end);
            self.propagate_batch(start..stop)?;
            start = stop;
        }
        Ok(())
    }

    fn propagate_batch(&mut self, probes: Range<usize>) -> Result<(), EngineError> {
        let context = self.context;
        let inputs = context.inputs;
        let active = probes.len();

        for (field, index) in self.fields.outer_iter_mut().zip(probes.clone()) {
            let (xp, yp) = context.scan.position(index);
            place_probe(field, inputs.probe, inputs.grid, xp, yp);
        }

        for (slice, transmission) in inputs.transmission.outer_iter().enumerate() {
            self.fft.inverse(contiguous(&mut self.fields)?, active);
            for field in self.fields.outer_iter_mut().take(active) {
                multiply(field, transmission);
            }
            self.fft.forward(contiguous(&mut self.fields)?, active);
            for field in self.fields.outer_iter_mut().take(active) {
                multiply(field, inputs.propagator.view());
            }

            if let Some(layer) = context.layers.layer_after(slice + 1) {
                for (field, index) in self.fields.outer_iter().zip(probes.clone()) {
                    self.accumulator.record(layer, index, field)?;
                }
            }
        }
        Ok(())
    }

    pub fn release(self, planner: &TransformPlanner) -> Result<(), EngineError> {
        planner.release(self.fft)
    }
}

/// Worker loop: claims probe ranges until the dispatcher is drained or
/// another worker has failed. Returns the number of probes processed.
#[instrument(skip_all, name = "multislice_worker")]
pub fn run_worker(
    context: SimulationContext<'_>,
    dispatcher: &WorkDispatcher,
    planner: &TransformPlanner,
    batch: usize,
    abort: &AtomicBool,
) -> Result<usize, EngineError> {
    let mut propagator = match BatchPropagator::new(context, planner, batch) {
        Ok(propagator) => propagator,
        Err(e) => {
            abort.store(true, Ordering::Relaxed);
            return Err(e);
        }
    };

    let mut processed = 0;
    let outcome = loop {
        if abort.load(Ordering::Relaxed) {
            break Ok(());
        }
        let Some(range) = dispatcher.get_work(batch) else {
            break Ok(());
        };
        let claimed = range.len();
        if let Err(e) = propagator.propagate(range) {
            abort.store(true, Ordering::Relaxed);
            break Err(e);
        }
        processed += claimed;
        context.progress.advance(claimed);
    };

    let released = propagator.release(planner);
    debug!(processed, "Worker finished.");
    settle(outcome, released, abort).map(|()| processed)
}

/// Combines a worker's propagation outcome with the release of its plan,
/// keeping the earlier error. A failed release also stops the other workers.
fn settle(
    outcome: Result<(), EngineError>,
    released: Result<(), EngineError>,
    abort: &AtomicBool,
) -> Result<(), EngineError> {
    if released.is_err() {
        abort.store(true, Ordering::Relaxed);
    }
    outcome.and(released)
}

/// Copies the initial probe into `field`, shifted to `(xp, yp)` Å by the
/// phase ramp `exp(-2πi(qx·xp + qy·yp))`.
pub(crate) fn place_probe(
    field: ArrayViewMut2<'_, Complex64>,
    probe: &Array2<Complex64>,
    grid: &FourierGrid,
    xp: f64,
    yp: f64,
) {
    Zip::from(field)
        .and(probe)
        .and(grid.qxa())
        .and(grid.qya())
        .for_each(|psi, &p0, &qx, &qy| {
            *psi = p0 * Complex64::from_polar(1.0, -2.0 * PI * (qx * xp + qy * yp));
        });
}

#[inline]
pub(crate) fn multiply(field: ArrayViewMut2<'_, Complex64>, factor: ArrayView2<'_, Complex64>) {
    Zip::from(field).and(factor).for_each(|psi, &f| *psi *= f);
}

pub(crate) fn contiguous(fields: &mut Array3<Complex64>) -> Result<&mut [Complex64], EngineError> {
    fields
        .as_slice_mut()
        .ok_or_else(|| EngineError::Internal("probe buffer is not contiguous".into()))
}
