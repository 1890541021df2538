use super::error::EngineError;
use crate::core::fft::BatchFft2;
use rustfft::FftPlanner;
use std::sync::Mutex;

/// Serializes creation and release of transform plans across workers.
///
/// Executing a planned [`BatchFft2`] needs no lock. The planner itself is not
/// shareable between threads, so each plan is built by a short-lived planner
/// while this lock is held.
#[derive(Debug, Default)]
pub struct TransformPlanner {
    gate: Mutex<()>,
}

impl TransformPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan_batch(&self, ny: usize, nx: usize, batch: usize) -> Result<BatchFft2, EngineError> {
        let _guard = self.gate.lock().map_err(|_| EngineError::PlanLockPoisoned)?;
        let mut planner = FftPlanner::new();
        Ok(BatchFft2::new(&mut planner, ny, nx, batch))
    }

    pub fn release(&self, plan: BatchFft2) -> Result<(), EngineError> {
        let _guard = self.gate.lock().map_err(|_| EngineError::PlanLockPoisoned)?;
        drop(plan);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;
    use std::thread;

    #[test]
    fn plans_created_concurrently_produce_identical_transforms() {
        let planner = TransformPlanner::new();
        let results: Vec<Vec<Complex64>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        let mut fft = planner.plan_batch(8, 8, 2).unwrap();
                        let mut data: Vec<_> = (0..128)
                            .map(|i| Complex64::new(i as f64, -(i as f64) / 3.0))
                            .collect();
                        fft.forward(&mut data, 2);
                        planner.release(fft).unwrap();
                        data
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for other in &results[1..] {
            assert_eq!(other, &results[0]);
        }
    }
}
