use stemslice::core::scan::{ProbeStep, ScanPattern};

/// Values used for anything neither the config file nor the command line sets.
#[derive(Debug, Clone)]
pub struct DefaultsConfig {
    pub slice_thickness: f64,
    pub beam_energy: f64,
    pub probe_semiangle: f64,
    pub detector_angle_step: f64,
    pub z_start_plane: usize,
    pub batch_size: usize,
    pub save_dpc_com: bool,
    pub save_probe: bool,
    pub scan_window: [f64; 2],
}

impl DefaultsConfig {
    /// Full-cell raster at Nyquist sampling.
    pub fn scan(&self) -> ScanPattern {
        ScanPattern::Raster {
            window_x: self.scan_window,
            window_y: self.scan_window,
            step: ProbeStep::Nyquist,
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            slice_thickness: 2.0,
            beam_energy: 80e3,
            probe_semiangle: 0.02,
            detector_angle_step: 0.001,
            z_start_plane: 0,
            batch_size: 1,
            save_dpc_com: false,
            save_probe: false,
            scan_window: [0.0, 1.0],
        }
    }
}
