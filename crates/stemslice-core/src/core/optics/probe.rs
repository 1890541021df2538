use super::aberration::{Aberration, aberration_phase};
use crate::core::grid::FourierGrid;
use ndarray::{Array2, Zip};
use num_complex::Complex64;

/// Builds the reciprocal-space initial probe: a soft-edged aperture of
/// half-angle `semiangle` (rad), multiplied by `exp(-iχ)` and normalized so
/// that `Σ|ψ|² = 1`.
///
/// The aperture edge is a linear ramp one pixel-diagonal wide; the zero
/// frequency always transmits fully.
pub fn build_initial_probe(
    grid: &FourierGrid,
    wavelength: f64,
    semiangle: f64,
    aberrations: &[Aberration],
) -> Array2<Complex64> {
    let aperture = aperture(grid, semiangle / wavelength);
    let chi = aberration_phase(grid.q1(), &grid.q_theta(), wavelength, aberrations);

    let mut psi = Array2::zeros(grid.q1().raw_dim());
    Zip::from(&mut psi)
        .and(&aperture)
        .and(&chi)
        .for_each(|psi, &a, &chi| {
            *psi = Complex64::new(a, 0.0) * Complex64::new(0.0, -chi).exp();
        });

    normalize(&mut psi);
    psi
}

fn aperture(grid: &FourierGrid, q_cutoff: f64) -> Array2<f64> {
    let (dqy, dqx) = grid.dq();
    let mut aperture = Array2::zeros(grid.q1().raw_dim());
    Zip::from(&mut aperture)
        .and(grid.q1())
        .and(grid.q2())
        .and(grid.qxa())
        .and(grid.qya())
        .for_each(|a, &q1, &q2, &qx, &qy| {
            let edge_width = (dqx * dqx * qx * qx + dqy * dqy * qy * qy).sqrt();
            if edge_width > 0.0 {
                *a = ((q_cutoff * q1 - q2) / edge_width + 0.5).clamp(0.0, 1.0);
            }
        });
    aperture[[0, 0]] = 1.0;
    aperture
}

/// Scales `field` to unit total intensity.
pub fn normalize(field: &mut Array2<Complex64>) {
    let norm = field.iter().map(Complex64::norm_sqr).sum::<f64>().sqrt();
    if norm > 0.0 {
        field.mapv_inplace(|v| v / norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::PixelSize;

    fn energy(field: &Array2<Complex64>) -> f64 {
        field.iter().map(Complex64::norm_sqr).sum()
    }

    #[test]
    fn probe_has_unit_energy() {
        let grid = FourierGrid::new(32, 32, PixelSize::uniform(0.2)).unwrap();
        let probe = build_initial_probe(&grid, 0.025, 0.02, &[Aberration::defocus(50.0)]);
        assert!((energy(&probe) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn aperture_is_full_inside_and_empty_outside() {
        let grid = FourierGrid::new(64, 64, PixelSize::uniform(0.1)).unwrap();
        let wavelength = 0.025;
        let semiangle = 0.02;
        let q_cutoff = semiangle / wavelength;
        let (dqy, _) = grid.dq();
        let probe = build_initial_probe(&grid, wavelength, semiangle, &[]);

        let inside = probe[[0, 0]].norm();
        for ((y, x), value) in probe.indexed_iter() {
            let q = grid.q1()[[y, x]];
            if q < q_cutoff - 2.0 * dqy {
                assert!((value.norm() - inside).abs() < 1e-12);
            } else if q > q_cutoff + 2.0 * dqy {
                assert_eq!(value.norm(), 0.0);
            }
        }
    }

    #[test]
    fn zero_semiangle_gives_a_plane_wave() {
        let grid = FourierGrid::new(16, 16, PixelSize::uniform(0.25)).unwrap();
        let probe = build_initial_probe(&grid, 0.025, 0.0, &[]);
        assert!((probe[[0, 0]].re - 1.0).abs() < 1e-15);
        assert_eq!(
            probe.iter().filter(|v| v.norm_sqr() > 0.0).count(),
            1,
            "only the zero frequency should carry amplitude"
        );
    }

    #[test]
    fn aberrations_change_phase_but_not_magnitude() {
        let grid = FourierGrid::new(32, 32, PixelSize::uniform(0.2)).unwrap();
        let plain = build_initial_probe(&grid, 0.025, 0.02, &[]);
        let aberrated =
            build_initial_probe(&grid, 0.025, 0.02, &[Aberration::spherical(1.0e4)]);
        for (a, b) in plain.iter().zip(aberrated.iter()) {
            assert!((a.norm() - b.norm()).abs() < 1e-12);
        }
    }

    #[test]
    fn normalize_leaves_zero_field_untouched() {
        let mut field = Array2::<Complex64>::zeros((4, 4));
        normalize(&mut field);
        assert!(field.iter().all(|v| *v == Complex64::new(0.0, 0.0)));
    }
}
