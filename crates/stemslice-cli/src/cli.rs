use crate::utils::parser::parse_shape;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu, William A. Goddard III, Victor Wai Tak Kam",
    version,
    about = "stemslice CLI - Depth-resolved multislice STEM simulation from precomputed projected potentials.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of worker threads used for probe propagation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Propagate the probe through one or more potential volumes and write the detector output.
    Simulate(SimulateArgs),
    /// Resolve grid, scan, detector and depth bookkeeping for a potential shape without propagating.
    Plan(PlanArgs),
}

/// Arguments for the `simulate` subcommand.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Path to the simulation configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Projected potential volume(s) as `.npy` arrays of shape (slices, ny, nx).
    /// Several files are treated as frozen-phonon configurations and averaged.
    #[arg(short, long = "potential", required = true, num_args(1..), value_name = "PATH")]
    pub potentials: Vec<PathBuf>,

    /// Directory that receives the output arrays and tables.
    #[arg(short, long, required = true, value_name = "DIR")]
    pub output: PathBuf,

    /// Override the number of probes propagated together per batch.
    #[arg(short, long, value_name = "INT")]
    pub batch_size: Option<usize>,

    /// Override the number of slices between recorded depths.
    #[arg(long, value_name = "INT")]
    pub slices_per_output: Option<usize>,

    /// Disable the centre-of-mass (DPC) output, even if it is enabled in the config file.
    #[arg(long)]
    pub no_dpc: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S beam.energy=200000
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `plan` subcommand.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Path to the simulation configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Potential shape as `NZ,NY,NX`.
    #[arg(long, required = true, value_name = "NZ,NY,NX", value_parser = parse_shape)]
    pub shape: [usize; 3],

    /// Set a specific configuration value, overriding the config file.
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn simulate_accepts_multiple_potentials_and_overrides() {
        let cli = Cli::try_parse_from([
            "stemslice",
            "-vv",
            "simulate",
            "-c",
            "run.toml",
            "-p",
            "fp0.npy",
            "fp1.npy",
            "-o",
            "out",
            "--no-dpc",
            "-S",
            "beam.energy=200000",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        let Commands::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.potentials.len(), 2);
        assert!(args.no_dpc);
        assert_eq!(args.set_values, vec!["beam.energy=200000".to_string()]);
    }

    #[test]
    fn plan_parses_shape_triplet() {
        let cli =
            Cli::try_parse_from(["stemslice", "plan", "-c", "run.toml", "--shape", "40,256,256"])
                .unwrap();
        let Commands::Plan(args) = cli.command else {
            panic!("expected plan");
        };
        assert_eq!(args.shape, [40, 256, 256]);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from([
            "stemslice",
            "-q",
            "-v",
            "plan",
            "-c",
            "run.toml",
            "--shape",
            "1,8,8",
        ]);
        assert!(result.is_err());
    }
}
