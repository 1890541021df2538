use crate::cli::PlanArgs;
use crate::config::{CliOverrides, PartialSimulationConfig};
use crate::error::Result;
use std::fmt::Write;
use stemslice::workflows::multislice::{self, MultisliceSetup};
use tracing::info;

pub fn run(args: PlanArgs, threads: Option<usize>) -> Result<()> {
    let overrides = CliOverrides {
        threads,
        set_values: &args.set_values,
        ..CliOverrides::default()
    };
    let config = PartialSimulationConfig::from_file(&args.config)?.merge_with_cli(&overrides)?;
    let setup = multislice::prepare(config, args.shape)?;
    info!("Launch plan resolved.");
    print!("{}", summarize(&setup));
    Ok(())
}

pub fn summarize(setup: &MultisliceSetup) -> String {
    let (ny, nx) = setup.grid().shape();
    let (scan_ny, scan_nx) = setup.scan().shape();
    let detector = setup.detector();
    let depths = setup.layers().depths();
    let config = setup.config();

    let mut summary = String::new();
    let _ = writeln!(
        summary,
        "Grid         : {ny} x {nx} pixels, {} slices, q_max = {:.4} 1/Å",
        setup.potential_shape()[0],
        setup.grid().q_max()
    );
    let _ = writeln!(summary, "Wavelength   : {:.5} Å", setup.wavelength());
    let _ = writeln!(
        summary,
        "Scan         : {scan_ny} x {scan_nx} ({} probes)",
        setup.scan().num_probes()
    );
    let _ = writeln!(
        summary,
        "Detector     : {} bins of {:.2} mrad",
        detector.num_bins(),
        detector.step() * 1e3
    );
    match (depths.first(), depths.last()) {
        (Some(first), Some(last)) => {
            let _ = writeln!(
                summary,
                "Depth layers : {} ({first:.2} Å to {last:.2} Å)",
                depths.len()
            );
        }
        _ => {
            let _ = writeln!(summary, "Depth layers : none");
        }
    }
    let _ = writeln!(
        summary,
        "Workers      : {} threads, {} probes per batch",
        config.num_threads,
        setup.batch_size()
    );
    summary
}
