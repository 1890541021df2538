use crate::cli::SimulateArgs;
use crate::config::{CliOverrides, PartialSimulationConfig};
use crate::error::{CliError, Result};
use crate::output::{DatacubeCollector, ProbeCollector, write_array, write_table};
use crate::utils::progress::CliProgressHandler;
use ndarray::Array3;
use ndarray_npy::read_npy;
use std::path::Path;
use std::time::Instant;
use stemslice::engine::config::FrozenPhononTag;
use stemslice::engine::progress::ProgressReporter;
use stemslice::workflows::multislice::{self, MultisliceResult, Sinks};
use tracing::{debug, info};

pub fn run(args: SimulateArgs, threads: Option<usize>) -> Result<()> {
    let start_time = Instant::now();
    let num_configurations = args.potentials.len();
    if num_configurations == 0 {
        return Err(CliError::Argument(
            "At least one potential file is required.".to_string(),
        ));
    }

    let overrides = CliOverrides {
        batch_size: args.batch_size,
        slices_per_output: args.slices_per_output,
        no_dpc: args.no_dpc,
        threads,
        num_configurations: Some(num_configurations),
        set_values: &args.set_values,
    };
    let config = PartialSimulationConfig::from_file(&args.config)?.merge_with_cli(&overrides)?;
    debug!("Final simulation config: {:#?}", config);
    std::fs::create_dir_all(&args.output)?;

    let first = load_potential(&args.potentials[0])?;
    let (nz, ny, nx) = first.dim();
    let setup = multislice::prepare(config, [nz, ny, nx])?;
    let mut pending = Some(first);
    info!(
        num_probes = setup.scan().num_probes(),
        num_layers = setup.layers().num_layers(),
        num_configurations,
        "Simulation prepared."
    );

    let (scan_ny, scan_nx) = setup.scan().shape();
    let datacubes = DatacubeCollector::new(scan_nx, scan_ny);
    let probe = ProbeCollector::default();
    let sinks = Sinks {
        datacube: Some(&datacubes),
        probe: Some(&probe),
    };

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    for (index, path) in args.potentials.iter().enumerate() {
        let potential = match pending.take() {
            Some(potential) => potential,
            None => load_potential(path)?,
        };
        progress_handler.begin_configuration(index, num_configurations);
        info!(
            configuration = index + 1,
            num_configurations,
            path = %path.display(),
            "Propagating configuration."
        );
        let tag = FrozenPhononTag {
            num_configurations,
            configuration_index: index,
            tag: String::new(),
        };
        setup.run_configuration(potential.view(), &tag, sinks, &reporter)?;
    }

    let mut result = setup.finish();
    average_configurations(&mut result, num_configurations);
    write_results(&args.output, &result, &datacubes, probe)?;

    info!(
        elapsed_s = start_time.elapsed().as_secs_f64(),
        output = %args.output.display(),
        "Simulation results written."
    );
    Ok(())
}

fn load_potential(path: &Path) -> Result<Array3<f64>> {
    let potential: Array3<f64> = read_npy(path).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    debug!(shape = ?potential.dim(), "Loaded potential from {:?}", path);
    Ok(potential)
}

fn average_configurations(result: &mut MultisliceResult, num_configurations: usize) {
    if num_configurations <= 1 {
        return;
    }
    let scale = num_configurations as f64;
    result.output /= scale;
    if let Some(dpc) = result.dpc.as_mut() {
        *dpc /= scale;
    }
}

fn write_results(
    dir: &Path,
    result: &MultisliceResult,
    datacubes: &DatacubeCollector,
    probe: ProbeCollector,
) -> Result<()> {
    write_array(&dir.join("output.npy"), &result.output)?;
    if let Some(dpc) = &result.dpc {
        write_array(&dir.join("dpc_com.npy"), dpc)?;
    }
    if let Some(probe) = probe.into_probe() {
        write_array(&dir.join("probe.npy"), &probe)?;
    }
    if !datacubes.is_empty() {
        debug!(names = ?datacubes.dataset_names(), "Collected diffraction datasets.");
        let written = datacubes.write_npz(&dir.join("datacubes.npz"))?;
        info!(datasets = written, "Wrote diffraction datacubes.");
    }
    write_table(
        &dir.join("detector_angles.csv"),
        ["bin", "angle_mrad"],
        &result.detector_angles_mrad,
    )?;
    write_table(
        &dir.join("depths.csv"),
        ["layer", "depth_angstrom"],
        &result.depths,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;
    use ndarray_npy::write_npy;
    use tempfile::tempdir;

    fn args(dir: &Path, potentials: Vec<std::path::PathBuf>) -> SimulateArgs {
        SimulateArgs {
            config: dir.join("config.toml"),
            potentials,
            output: dir.join("out"),
            batch_size: Some(2),
            slices_per_output: Some(1),
            no_dpc: false,
            set_values: vec![],
        }
    }

    const CONFIG: &str = r#"
[grid]
pixel-size = 0.2
slice-thickness = 2.0

[beam]
energy = 80000.0
semiangle = 0.02

[scan]
type = "raster"
step = { type = "fixed", x = 3.2, y = 3.2 }

[detector]
angle-step = 0.005

[output]
save-dpc-com = true
save-probe = true

[output.diffraction]
"#;

    #[test]
    fn vacuum_run_writes_every_product() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), CONFIG).unwrap();
        let potentials: Vec<_> = (0..2)
            .map(|i| {
                let path = dir.path().join(format!("fp{i}.npy"));
                write_npy(&path, &Array3::<f64>::zeros((2, 16, 16))).unwrap();
                path
            })
            .collect();

        run(args(dir.path(), potentials), Some(1)).unwrap();

        let out = dir.path().join("out");
        for file in [
            "output.npy",
            "dpc_com.npy",
            "probe.npy",
            "datacubes.npz",
            "detector_angles.csv",
            "depths.csv",
        ] {
            assert!(out.join(file).exists(), "{file} missing");
        }

        let output: Array4<f64> = read_npy(out.join("output.npy")).unwrap();
        assert_eq!(output.shape()[0], 2);
        for layer in 0..2 {
            for y in 0..output.shape()[1] {
                for x in 0..output.shape()[2] {
                    let energy = output.slice(ndarray::s![layer, y, x, ..]).sum();
                    assert!((energy - 1.0).abs() < 1e-9, "energy {energy}");
                }
            }
        }

        let depths = std::fs::read_to_string(out.join("depths.csv")).unwrap();
        assert_eq!(depths, "layer,depth_angstrom\n0,2.000000\n1,4.000000\n");
    }

    #[test]
    fn unreadable_potential_is_a_parse_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), CONFIG).unwrap();
        let bogus = dir.path().join("bogus.npy");
        std::fs::write(&bogus, "not an array").unwrap();

        let result = run(args(dir.path(), vec![bogus]), Some(1));
        assert!(matches!(result, Err(CliError::FileParsing { .. })));
    }
}
