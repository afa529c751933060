use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum, ValueHint};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kcmc", author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info", global = true)]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Solve a K-coverage M-connectivity instance and print the result record as JSON
    Solve(SolveArgs),
    /// Topology statistics, sink reachability and parse diagnostics of an instance
    Inspect {
        #[command(flatten)]
        input: InstanceArgs,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,
    },
    /// Print the single-sink serialization of an instance
    Reduce {
        #[command(flatten)]
        input: InstanceArgs,
        /// Virtual sinks created per original sink
        #[arg(long, default_value_t = 1)]
        max_m: u32,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
        /// Write output to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

/// Where an instance comes from and how strictly it is read.
#[derive(Args, Debug, Clone)]
pub struct InstanceArgs {
    /// Serialized instance or bare key (`-` reads stdin, `@path` reads a file)
    pub instance: String,

    /// Accept declared counts that disagree with the edges
    #[arg(long, value_enum, value_delimiter = ',')]
    pub loose: Vec<LooseField>,

    /// Topology regenerator used for key-only instances
    /// (default: ~/.kcmc/bin/instance_regenerator, then PATH)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub regenerator: Option<PathBuf>,

    /// Kill an external tool after this many seconds
    #[arg(long)]
    pub tool_timeout: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct SolveArgs {
    #[command(flatten)]
    pub input: InstanceArgs,

    /// Minimum number of installed sensors covering each POI
    #[arg(short, long, default_value_t = 1)]
    pub k: u32,

    /// Number of sensor-disjoint paths from each POI to the sink
    #[arg(short, long, default_value_t = 1)]
    pub m: u32,

    /// ILP formulation (single-flow, multi-flow, or none to stop after preprocessing)
    #[arg(long, default_value = "multi-flow")]
    pub formulation: String,

    /// Heuristic pre-solver restricting the candidate sensors (none skips it)
    #[arg(long, default_value = "none")]
    pub heuristic: String,

    /// Heuristic pre-solver executable
    /// (default: ~/.kcmc/bin/optimizer, then PATH)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub optimizer: Option<PathBuf>,

    /// MIP backend
    #[arg(long, default_value = "microlp")]
    pub solver: String,

    /// Solver time limit in seconds
    #[arg(long, default_value_t = 3600.0)]
    pub time_limit: f64,

    /// Solver threads ("auto" = all cores)
    #[arg(long, default_value = "1")]
    pub threads: String,

    /// Model flow variables as binaries instead of continuous values
    #[arg(long)]
    pub y_binary: bool,

    /// Virtual sinks per sink when reducing a multi-sink instance (default: M)
    #[arg(long)]
    pub max_m: Option<u32>,

    /// Pretty-print the JSON record
    #[arg(long)]
    pub pretty: bool,

    /// Write the record to a file instead of stdout
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub out: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LooseField {
    Pois,
    Sensors,
    Sinks,
    All,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        build_cli_command().debug_assert();
    }

    #[test]
    fn solve_flags_parse() {
        let cli = Cli::try_parse_from([
            "kcmc",
            "solve",
            "KCMC;1 1 1;10 5 5;1;END",
            "-k",
            "2",
            "-m",
            "2",
            "--formulation",
            "single-flow",
            "--loose",
            "pois,sinks",
            "--y-binary",
        ])
        .unwrap();
        let Some(Commands::Solve(args)) = cli.command else {
            panic!("expected solve");
        };
        assert_eq!((args.k, args.m), (2, 2));
        assert_eq!(args.formulation, "single-flow");
        assert_eq!(args.input.loose, vec![LooseField::Pois, LooseField::Sinks]);
        assert!(args.y_binary);
        assert_eq!(args.threads, "1");
    }
}
