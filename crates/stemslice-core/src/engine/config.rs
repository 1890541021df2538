use crate::core::grid::PixelSize;
use crate::core::optics::aberration::Aberration;
use crate::core::optics::constants::{electron_wavelength, interaction_parameter};
use crate::core::optics::propagator::ProbeTilt;
use crate::core::scan::{ProbeStep, ScanPattern};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Parameter '{name}' must be positive (got {value})")]
    NotPositive { name: &'static str, value: f64 },

    #[error("Parameter '{0}' must be at least 1")]
    Zero(&'static str),

    #[error("Invalid scan pattern: {0}")]
    InvalidScan(String),
}

/// Export of per-probe diffraction patterns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DiffractionOptions {
    /// Export the complex exit wave instead of its intensity.
    #[serde(default)]
    pub complex_wave: bool,
    /// Keep only scattering angles up to this value (rad) along each axis.
    #[serde(default)]
    pub crop_max_angle: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputOptions {
    pub save_dpc_com: bool,
    pub save_probe: bool,
    pub diffraction: Option<DiffractionOptions>,
}

/// Bookkeeping for one frozen-phonon configuration of a multi-configuration run.
#[derive(Debug, Clone, PartialEq)]
pub struct FrozenPhononTag {
    pub num_configurations: usize,
    pub configuration_index: usize,
    /// Suffix appended to exported dataset identifiers.
    pub tag: String,
}

impl Default for FrozenPhononTag {
    fn default() -> Self {
        Self {
            num_configurations: 1,
            configuration_index: 0,
            tag: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub pixel_size: PixelSize,
    pub slice_thickness: f64,
    /// Accelerating voltage in volts.
    pub beam_energy: f64,
    pub probe_tilt: ProbeTilt,
    pub probe_semiangle: f64,
    pub aberrations: Vec<Aberration>,
    pub detector_angle_step: f64,
    pub scan: ScanPattern,
    /// Physical slices per recorded depth layer. `None` records the exit
    /// surface only.
    pub slices_per_output: Option<usize>,
    /// First slice (1-based) at or after which layers are recorded.
    pub z_start_plane: usize,
    pub batch_size_target: usize,
    pub num_threads: usize,
    pub outputs: OutputOptions,
    pub frozen_phonon: FrozenPhononTag,
}

impl SimulationConfig {
    /// Electron wavelength λ in Å.
    pub fn wavelength(&self) -> f64 {
        electron_wavelength(self.beam_energy)
    }

    /// Interaction parameter σ in rad/(V·Å).
    pub fn sigma(&self) -> f64 {
        interaction_parameter(self.beam_energy)
    }

    /// Probe-forming aperture cutoff `semiangle / λ` in 1/Å.
    pub fn aperture_cutoff(&self) -> f64 {
        self.probe_semiangle / self.wavelength()
    }
}

#[derive(Default)]
pub struct SimulationConfigBuilder {
    pixel_size: Option<PixelSize>,
    slice_thickness: Option<f64>,
    beam_energy: Option<f64>,
    probe_tilt: Option<ProbeTilt>,
    probe_semiangle: Option<f64>,
    aberrations: Vec<Aberration>,
    detector_angle_step: Option<f64>,
    scan: Option<ScanPattern>,
    slices_per_output: Option<usize>,
    z_start_plane: Option<usize>,
    batch_size_target: Option<usize>,
    num_threads: Option<usize>,
    outputs: OutputOptions,
    frozen_phonon: FrozenPhononTag,
}

impl SimulationConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pixel_size(mut self, size: PixelSize) -> Self {
        self.pixel_size = Some(size);
        self
    }
    pub fn slice_thickness(mut self, thickness: f64) -> Self {
        self.slice_thickness = Some(thickness);
        self
    }
    pub fn beam_energy(mut self, volts: f64) -> Self {
        self.beam_energy = Some(volts);
        self
    }
    pub fn probe_tilt(mut self, tilt: ProbeTilt) -> Self {
        self.probe_tilt = Some(tilt);
        self
    }
    pub fn probe_semiangle(mut self, semiangle: f64) -> Self {
        self.probe_semiangle = Some(semiangle);
        self
    }
    pub fn aberrations(mut self, aberrations: Vec<Aberration>) -> Self {
        self.aberrations = aberrations;
        self
    }
    pub fn detector_angle_step(mut self, step: f64) -> Self {
        self.detector_angle_step = Some(step);
        self
    }
    pub fn scan(mut self, scan: ScanPattern) -> Self {
        self.scan = Some(scan);
        self
    }
    pub fn slices_per_output(mut self, slices: Option<usize>) -> Self {
        self.slices_per_output = slices;
        self
    }
    pub fn z_start_plane(mut self, plane: usize) -> Self {
        self.z_start_plane = Some(plane);
        self
    }
    pub fn batch_size_target(mut self, batch: usize) -> Self {
        self.batch_size_target = Some(batch);
        self
    }
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads);
        self
    }
    pub fn outputs(mut self, outputs: OutputOptions) -> Self {
        self.outputs = outputs;
        self
    }
    pub fn frozen_phonon(mut self, tag: FrozenPhononTag) -> Self {
        self.frozen_phonon = tag;
        self
    }

    pub fn build(self) -> Result<SimulationConfig, ConfigError> {
        let pixel_size = self
            .pixel_size
            .ok_or(ConfigError::MissingParameter("pixel_size"))?;
        let slice_thickness = self
            .slice_thickness
            .ok_or(ConfigError::MissingParameter("slice_thickness"))?;
        let beam_energy = self
            .beam_energy
            .ok_or(ConfigError::MissingParameter("beam_energy"))?;
        let probe_semiangle = self
            .probe_semiangle
            .ok_or(ConfigError::MissingParameter("probe_semiangle"))?;
        let detector_angle_step = self
            .detector_angle_step
            .ok_or(ConfigError::MissingParameter("detector_angle_step"))?;
        let scan = self.scan.ok_or(ConfigError::MissingParameter("scan"))?;

        ensure_positive("pixel_size.x", pixel_size.x)?;
        ensure_positive("pixel_size.y", pixel_size.y)?;
        ensure_positive("slice_thickness", slice_thickness)?;
        ensure_positive("beam_energy", beam_energy)?;
        ensure_positive("detector_angle_step", detector_angle_step)?;
        if !(probe_semiangle >= 0.0) {
            return Err(ConfigError::NotPositive {
                name: "probe_semiangle",
                value: probe_semiangle,
            });
        }
        validate_scan(&scan)?;

        if self.slices_per_output == Some(0) {
            return Err(ConfigError::Zero("slices_per_output"));
        }

        let batch_size_target = self.batch_size_target.unwrap_or(1);
        if batch_size_target == 0 {
            return Err(ConfigError::Zero("batch_size_target"));
        }
        let num_threads = self.num_threads.unwrap_or_else(default_thread_count);
        if num_threads == 0 {
            return Err(ConfigError::Zero("num_threads"));
        }
        if self.frozen_phonon.num_configurations == 0 {
            return Err(ConfigError::Zero("num_configurations"));
        }
        if let Some(angle) = self
            .outputs
            .diffraction
            .as_ref()
            .and_then(|d| d.crop_max_angle)
        {
            ensure_positive("crop_max_angle", angle)?;
        }

        Ok(SimulationConfig {
            pixel_size,
            slice_thickness,
            beam_energy,
            probe_tilt: self.probe_tilt.unwrap_or_default(),
            probe_semiangle,
            aberrations: self.aberrations,
            detector_angle_step,
            scan,
            slices_per_output: self.slices_per_output,
            z_start_plane: self.z_start_plane.unwrap_or(0),
            batch_size_target,
            num_threads,
            outputs: self.outputs,
            frozen_phonon: self.frozen_phonon,
        })
    }
}

fn ensure_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

fn validate_scan(scan: &ScanPattern) -> Result<(), ConfigError> {
    match scan {
        ScanPattern::Raster {
            window_x,
            window_y,
            step,
        } => {
            for (axis, window) in [("x", window_x), ("y", window_y)] {
                if !(window[0] >= 0.0 && window[1] >= window[0]) {
                    return Err(ConfigError::InvalidScan(format!(
                        "window along {axis} must satisfy 0 <= start <= stop (got {window:?})"
                    )));
                }
            }
            if let ProbeStep::Fixed { x, y } = *step {
                ensure_positive("scan.step.x", x)?;
                ensure_positive("scan.step.y", y)?;
            }
            Ok(())
        }
        ScanPattern::Arbitrary { x, y } => {
            if x.len() != y.len() {
                return Err(ConfigError::InvalidScan(format!(
                    "{} x-coordinates but {} y-coordinates",
                    x.len(),
                    y.len()
                )));
            }
            if x.is_empty() {
                return Err(ConfigError::InvalidScan("no probe positions".into()));
            }
            Ok(())
        }
    }
}

fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> SimulationConfigBuilder {
        SimulationConfigBuilder::new()
            .pixel_size(PixelSize::uniform(0.1))
            .slice_thickness(2.0)
            .beam_energy(80e3)
            .probe_semiangle(0.02)
            .detector_angle_step(0.001)
            .scan(ScanPattern::Raster {
                window_x: [0.0, 1.0],
                window_y: [0.0, 1.0],
                step: ProbeStep::Nyquist,
            })
    }

    #[test]
    fn build_fills_defaults() {
        let config = minimal().build().unwrap();
        assert_eq!(config.batch_size_target, 1);
        assert_eq!(config.z_start_plane, 0);
        assert!(config.num_threads >= 1);
        assert_eq!(config.slices_per_output, None);
        assert_eq!(config.probe_tilt, ProbeTilt::default());
        assert_eq!(config.frozen_phonon, FrozenPhononTag::default());
        assert!(config.aberrations.is_empty());
    }

    #[test]
    fn build_reports_first_missing_parameter() {
        let err = SimulationConfigBuilder::new()
            .slice_thickness(1.0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("pixel_size"));

        let err = SimulationConfigBuilder::new()
            .pixel_size(PixelSize::uniform(0.1))
            .slice_thickness(1.0)
            .beam_energy(1e5)
            .probe_semiangle(0.01)
            .detector_angle_step(0.001)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("scan"));
    }

    #[test]
    fn build_rejects_non_positive_physical_values() {
        let err = minimal().slice_thickness(0.0).build().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::NotPositive {
                name: "slice_thickness",
                ..
            }
        ));
        let err = minimal()
            .pixel_size(PixelSize { x: 0.1, y: -1.0 })
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::NotPositive {
                name: "pixel_size.y",
                ..
            }
        ));
    }

    #[test]
    fn build_rejects_zero_counts() {
        assert_eq!(
            minimal().num_threads(0).build().unwrap_err(),
            ConfigError::Zero("num_threads")
        );
        assert_eq!(
            minimal().batch_size_target(0).build().unwrap_err(),
            ConfigError::Zero("batch_size_target")
        );
        assert_eq!(
            minimal().slices_per_output(Some(0)).build().unwrap_err(),
            ConfigError::Zero("slices_per_output")
        );
    }

    #[test]
    fn build_rejects_inconsistent_scans() {
        let err = minimal()
            .scan(ScanPattern::Arbitrary {
                x: vec![0.0, 1.0],
                y: vec![0.0],
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidScan(_)));

        let err = minimal()
            .scan(ScanPattern::Raster {
                window_x: [0.5, 0.2],
                window_y: [0.0, 1.0],
                step: ProbeStep::Nyquist,
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidScan(_)));
    }

    #[test]
    fn derived_optics_follow_beam_energy() {
        let config = minimal().beam_energy(300e3).build().unwrap();
        assert!((config.wavelength() - 0.019687).abs() < 1e-5);
        assert!((config.aperture_cutoff() - 0.02 / config.wavelength()).abs() < 1e-12);
        assert!(config.sigma() > 0.0);
    }
}
