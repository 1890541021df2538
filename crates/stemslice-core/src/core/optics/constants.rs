use std::f64::consts::PI;

pub const ELECTRON_MASS_KG: f64 = 9.109383e-31;
pub const ELEMENTARY_CHARGE_C: f64 = 1.602177e-19;
pub const SPEED_OF_LIGHT_M_S: f64 = 299_792_458.0;
pub const PLANCK_J_S: f64 = 6.62607e-34;

/// Relativistic electron wavelength in Å for an accelerating voltage in volts.
pub fn electron_wavelength(beam_energy_ev: f64) -> f64 {
    let m = ELECTRON_MASS_KG;
    let e = ELEMENTARY_CHARGE_C;
    let c = SPEED_OF_LIGHT_M_S;
    PLANCK_J_S / (2.0 * m * e * beam_energy_ev).sqrt()
        / (1.0 + e * beam_energy_ev / (2.0 * m * c * c)).sqrt()
        * 1e10
}

/// Interaction parameter σ in rad/(V·Å), relating projected potential to phase.
pub fn interaction_parameter(beam_energy_ev: f64) -> f64 {
    let m = ELECTRON_MASS_KG;
    let e = ELEMENTARY_CHARGE_C;
    let c = SPEED_OF_LIGHT_M_S;
    let rest_energy = m * c * c;
    let kinetic = e * beam_energy_ev;
    (2.0 * PI / electron_wavelength(beam_energy_ev) / beam_energy_ev) * (rest_energy + kinetic)
        / (2.0 * rest_energy + kinetic)
}
