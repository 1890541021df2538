use ndarray::{Array3, ArrayView3};
use num_complex::Complex64;

/// Converts a projected potential (slice × y × x, V·Å) into the phase
/// transmission stack `exp(iσV)`.
pub fn build_transmission(potential: ArrayView3<'_, f64>, sigma: f64) -> Array3<Complex64> {
    potential.mapv(|v| Complex64::from_polar(1.0, sigma * v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_potential_transmits_fully() {
        let potential = Array3::<f64>::zeros((3, 4, 4));
        let transmission = build_transmission(potential.view(), 0.001);
        assert!(
            transmission
                .iter()
                .all(|t| *t == Complex64::new(1.0, 0.0))
        );
    }

    #[test]
    fn transmission_is_a_pure_phase() {
        let potential = Array3::from_shape_fn((2, 4, 6), |(z, y, x)| (z + y * x) as f64 * 10.0);
        let sigma = 7.3e-4;
        let transmission = build_transmission(potential.view(), sigma);
        assert_eq!(transmission.dim(), (2, 4, 6));
        for (t, v) in transmission.iter().zip(potential.iter()) {
            assert!((t.norm() - 1.0).abs() < 1e-12);
            assert!((t.arg() - (sigma * v).sin().atan2((sigma * v).cos())).abs() < 1e-12);
        }
    }
}
