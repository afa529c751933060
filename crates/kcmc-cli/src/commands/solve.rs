use std::fs;
use std::io::{self, Write};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use kcmc_algo::{
    run_experiment, Collaborators, ExperimentConfig, ExperimentRecord, Formulation,
    MipSolverKind, NO_HEURISTIC,
};
use kcmc_core::{HeuristicPreprocessor, TopologySource};
use kcmc_external::PreprocessorProcess;
use tracing::info;

use super::util::{loose_acceptance, read_instance, regenerator, resolve_threads, tool_timeout};
use kcmc_cli::cli::SolveArgs;

pub fn handle(args: &SolveArgs) -> Result<()> {
    let config = experiment_config(args)?;

    let topology = regenerator(&args.input)?;
    let preprocessor = if config.heuristic.eq_ignore_ascii_case(NO_HEURISTIC) {
        None
    } else {
        let located = PreprocessorProcess::locate(args.optimizer.as_deref())
            .context("locating heuristic pre-solver")?;
        Some(match tool_timeout(&args.input) {
            Some(timeout) => located.with_timeout(timeout),
            None => located,
        })
    };
    let collaborators = Collaborators {
        topology: topology.as_ref().map(|t| t as &dyn TopologySource),
        preprocessor: preprocessor
            .as_ref()
            .map(|p| p as &dyn HeuristicPreprocessor),
    };

    info!(
        k = config.k,
        m = config.m,
        formulation = %args.formulation,
        solver = %config.solver,
        "running experiment"
    );
    let record = run_experiment(&config, &collaborators).context("running experiment")?;
    write_record(&record, args)
}

fn experiment_config(args: &SolveArgs) -> Result<ExperimentConfig> {
    let raw = read_instance(&args.input.instance)?;
    let mut config = ExperimentConfig::new(raw.trim(), args.k, args.m);
    config.heuristic = args.heuristic.clone();
    config.formulation = parse_formulation(&args.formulation)?;
    config.solver = args.solver.parse::<MipSolverKind>()?;
    config.time_limit = time_limit(args.time_limit)?;
    config.threads = resolve_threads(&args.threads);
    config.y_binary = args.y_binary;
    config.max_m = args.max_m;
    config.loose = loose_acceptance(&args.input.loose);
    Ok(config)
}

fn parse_formulation(name: &str) -> Result<Option<Formulation>> {
    if name.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    name.parse::<Formulation>().map(Some)
}

fn time_limit(seconds: f64) -> Result<Duration> {
    if seconds < 0.0 {
        bail!("time limit must not be negative, got {seconds}");
    }
    Duration::try_from_secs_f64(seconds).map_err(|err| anyhow!("invalid time limit: {err}"))
}

fn write_record(record: &ExperimentRecord, args: &SolveArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(record)?
    } else {
        serde_json::to_string(record)?
    };
    match &args.out {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, format!("{json}\n"))
                .with_context(|| format!("writing record to {}", path.display()))?;
            info!(path = %path.display(), "wrote result record");
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }
    Ok(())
}
