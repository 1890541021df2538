mod defaults;

use crate::error::{CliError, Result};
use crate::utils::parser::{self, ParseError};
use defaults::DefaultsConfig;
use serde::Deserialize;
use std::path::Path;
use stemslice::core::grid::PixelSize;
use stemslice::core::optics::aberration::Aberration;
use stemslice::core::optics::propagator::ProbeTilt;
use stemslice::core::scan::{ProbeStep, ScanPattern};
use stemslice::engine::config::{
    DiffractionOptions, FrozenPhononTag, OutputOptions, SimulationConfig,
    SimulationConfigBuilder,
};
use tracing::debug;

/// Command-line values layered on top of the config file.
#[derive(Debug, Default, Clone, Copy)]
pub struct CliOverrides<'a> {
    pub batch_size: Option<usize>,
    pub slices_per_output: Option<usize>,
    pub no_dpc: bool,
    pub threads: Option<usize>,
    pub num_configurations: Option<usize>,
    pub set_values: &'a [String],
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialGridConfig {
    pixel_size: Option<f64>,
    pixel_size_y: Option<f64>,
    slice_thickness: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialBeamConfig {
    energy: Option<f64>,
    semiangle: Option<f64>,
    tilt_x: Option<f64>,
    tilt_y: Option<f64>,
    aberrations: Option<Vec<Aberration>>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", tag = "type")]
enum PartialScanConfig {
    #[serde(rename_all = "kebab-case")]
    Raster {
        window_x: Option<[f64; 2]>,
        window_y: Option<[f64; 2]>,
        step: Option<ProbeStep>,
    },
    Arbitrary {
        x: Vec<f64>,
        y: Vec<f64>,
    },
}

impl PartialScanConfig {
    fn resolve(self, defaults: &DefaultsConfig) -> ScanPattern {
        match self {
            PartialScanConfig::Raster {
                window_x,
                window_y,
                step,
            } => ScanPattern::Raster {
                window_x: window_x.unwrap_or(defaults.scan_window),
                window_y: window_y.unwrap_or(defaults.scan_window),
                step: step.unwrap_or(ProbeStep::Nyquist),
            },
            PartialScanConfig::Arbitrary { x, y } => ScanPattern::Arbitrary { x, y },
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialDetectorConfig {
    angle_step: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialOutputConfig {
    slices_per_output: Option<usize>,
    z_start_plane: Option<usize>,
    save_dpc_com: Option<bool>,
    save_probe: Option<bool>,
    diffraction: Option<DiffractionOptions>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialPerformanceConfig {
    batch_size: Option<usize>,
    threads: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PartialSimulationConfig {
    grid: Option<PartialGridConfig>,
    beam: Option<PartialBeamConfig>,
    scan: Option<PartialScanConfig>,
    detector: Option<PartialDetectorConfig>,
    output: Option<PartialOutputConfig>,
    performance: Option<PartialPerformanceConfig>,
}

impl PartialSimulationConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    pub fn merge_with_cli(mut self, overrides: &CliOverrides<'_>) -> Result<SimulationConfig> {
        self.apply_set_values(overrides.set_values)?;

        let defaults = DefaultsConfig::default();
        let grid = self.grid.take().unwrap_or_default();
        let beam = self.beam.take().unwrap_or_default();
        let detector = self.detector.take().unwrap_or_default();
        let output = self.output.take().unwrap_or_default();
        let performance = self.performance.take().unwrap_or_default();

        let pixel_x = grid
            .pixel_size
            .ok_or_else(|| CliError::Config("`grid.pixel-size` is required.".to_string()))?;
        let pixel_size = PixelSize {
            x: pixel_x,
            y: grid.pixel_size_y.unwrap_or(pixel_x),
        };

        let scan = match self.scan.take() {
            Some(partial) => partial.resolve(&defaults),
            None => defaults.scan(),
        };

        let outputs = OutputOptions {
            save_dpc_com: !overrides.no_dpc
                && output.save_dpc_com.unwrap_or(defaults.save_dpc_com),
            save_probe: output.save_probe.unwrap_or(defaults.save_probe),
            diffraction: output.diffraction,
        };

        let mut builder = SimulationConfigBuilder::new()
            .pixel_size(pixel_size)
            .slice_thickness(grid.slice_thickness.unwrap_or(defaults.slice_thickness))
            .beam_energy(beam.energy.unwrap_or(defaults.beam_energy))
            .probe_semiangle(beam.semiangle.unwrap_or(defaults.probe_semiangle))
            .probe_tilt(ProbeTilt {
                x: beam.tilt_x.unwrap_or(0.0),
                y: beam.tilt_y.unwrap_or(0.0),
            })
            .aberrations(beam.aberrations.unwrap_or_default())
            .detector_angle_step(detector.angle_step.unwrap_or(defaults.detector_angle_step))
            .scan(scan)
            .slices_per_output(overrides.slices_per_output.or(output.slices_per_output))
            .z_start_plane(output.z_start_plane.unwrap_or(defaults.z_start_plane))
            .batch_size_target(
                overrides
                    .batch_size
                    .or(performance.batch_size)
                    .unwrap_or(defaults.batch_size),
            )
            .outputs(outputs);

        if let Some(threads) = overrides.threads.or(performance.threads) {
            builder = builder.num_threads(threads);
        }
        if let Some(count) = overrides.num_configurations {
            builder = builder.frozen_phonon(FrozenPhononTag {
                num_configurations: count,
                ..FrozenPhononTag::default()
            });
        }

        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let (key, value) = parser::parse_key_value(kv_pair).map_err(config_error)?;
            let float = || parser::parse_value::<f64>(key, value).map_err(config_error);
            let integer = || parser::parse_value::<usize>(key, value).map_err(config_error);
            let flag = || parser::parse_value::<bool>(key, value).map_err(config_error);

            match key {
                "grid.pixel-size" => self.grid_mut().pixel_size = Some(float()?),
                "grid.pixel-size-y" => self.grid_mut().pixel_size_y = Some(float()?),
                "grid.slice-thickness" => self.grid_mut().slice_thickness = Some(float()?),
                "beam.energy" => self.beam_mut().energy = Some(float()?),
                "beam.semiangle" => self.beam_mut().semiangle = Some(float()?),
                "beam.tilt-x" => self.beam_mut().tilt_x = Some(float()?),
                "beam.tilt-y" => self.beam_mut().tilt_y = Some(float()?),
                "detector.angle-step" => {
                    self.detector
                        .get_or_insert_with(Default::default)
                        .angle_step = Some(float()?)
                }
                "output.slices-per-output" => {
                    self.output_mut().slices_per_output = Some(integer()?)
                }
                "output.z-start-plane" => self.output_mut().z_start_plane = Some(integer()?),
                "output.save-dpc-com" => self.output_mut().save_dpc_com = Some(flag()?),
                "output.save-probe" => self.output_mut().save_probe = Some(flag()?),
                "performance.batch-size" => self.performance_mut().batch_size = Some(integer()?),
                "performance.threads" => self.performance_mut().threads = Some(integer()?),
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }

    fn grid_mut(&mut self) -> &mut PartialGridConfig {
        self.grid.get_or_insert_with(Default::default)
    }

    fn beam_mut(&mut self) -> &mut PartialBeamConfig {
        self.beam.get_or_insert_with(Default::default)
    }

    fn output_mut(&mut self) -> &mut PartialOutputConfig {
        self.output.get_or_insert_with(Default::default)
    }

    fn performance_mut(&mut self) -> &mut PartialPerformanceConfig {
        self.performance.get_or_insert_with(Default::default)
    }
}

fn config_error(e: ParseError) -> CliError {
    CliError::Config(e.to_string())
}
