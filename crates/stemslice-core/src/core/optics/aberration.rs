use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// One term of the polar aberration expansion.
///
/// Contributes `(2π/λ) · magnitude · α^m / m · cos(n (φ − angle))` to the
/// phase error, where `α = λq` is the scattering angle and `φ` the azimuth.
/// Defocus is `m = 2, n = 0`; spherical aberration is `m = 4, n = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Aberration {
    pub m: u32,
    pub n: u32,
    /// Coefficient in Å.
    pub magnitude: f64,
    /// Orientation in degrees.
    #[serde(default)]
    pub angle: f64,
}

impl Aberration {
    pub fn defocus(magnitude: f64) -> Self {
        Self {
            m: 2,
            n: 0,
            magnitude,
            angle: 0.0,
        }
    }

    pub fn spherical(magnitude: f64) -> Self {
        Self {
            m: 4,
            n: 0,
            magnitude,
            angle: 0.0,
        }
    }

    fn phase(&self, alpha: f64, azimuth: f64, wavelength: f64) -> f64 {
        if self.m == 0 {
            return 0.0;
        }
        let orientation = self.angle.to_radians();
        2.0 * PI / wavelength * self.magnitude * alpha.powi(self.m as i32) / self.m as f64
            * (self.n as f64 * (azimuth - orientation)).cos()
    }
}

/// Evaluates the aberration function χ on every pixel of a `q`/azimuth grid.
pub fn aberration_phase(
    q1: &Array2<f64>,
    q_theta: &Array2<f64>,
    wavelength: f64,
    aberrations: &[Aberration],
) -> Array2<f64> {
    let mut chi = Array2::zeros(q1.raw_dim());
    Zip::from(&mut chi)
        .and(q1)
        .and(q_theta)
        .for_each(|chi, &q, &theta| {
            let alpha = wavelength * q;
            *chi = aberrations
                .iter()
                .map(|ab| ab.phase(alpha, theta, wavelength))
                .sum();
        });
    chi
}
