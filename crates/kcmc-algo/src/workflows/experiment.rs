//! One KCMC experiment: parse, filter, reduce, encode, solve, record.

use crate::ilp::{
    encode, solve, EncodeParams, EncodedModel, Formulation, MipOutcome, MipSolverKind,
    SolveParams, SolveStatus,
};
use kcmc_core::{
    HeuristicPreprocessor, Instance, InstanceParser, KcmcError, KcmcResult, LooseAcceptance,
    TopologySource,
};
use serde::Serialize;
use std::borrow::Cow;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Heuristic name that skips preprocessing.
pub const NO_HEURISTIC: &str = "none";

/// External services an experiment may need. Either may be absent when the
/// configuration does not call for it.
#[derive(Default, Clone, Copy)]
pub struct Collaborators<'a> {
    pub topology: Option<&'a dyn TopologySource>,
    pub preprocessor: Option<&'a dyn HeuristicPreprocessor>,
}

#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    pub instance_key: String,
    pub k: u32,
    pub m: u32,
    /// Heuristic method used to filter sensors, or [`NO_HEURISTIC`]
    pub heuristic: String,
    /// `None` stops after preprocessing
    pub formulation: Option<Formulation>,
    pub time_limit: Duration,
    pub threads: u32,
    pub y_binary: bool,
    /// Virtual sinks per sink when reducing; defaults to `m`
    pub max_m: Option<u32>,
    pub solver: MipSolverKind,
    pub loose: LooseAcceptance,
}

impl ExperimentConfig {
    pub fn new(instance_key: impl Into<String>, k: u32, m: u32) -> Self {
        let solve = SolveParams::default();
        Self {
            instance_key: instance_key.into(),
            k,
            m,
            heuristic: NO_HEURISTIC.to_string(),
            formulation: Some(Formulation::MultiFlow),
            time_limit: solve.time_limit,
            threads: solve.threads,
            y_binary: false,
            max_m: None,
            solver: solve.solver,
            loose: LooseAcceptance::strict(),
        }
    }

    fn solve_params(&self) -> SolveParams {
        SolveParams {
            time_limit: self.time_limit,
            threads: self.threads,
            solver: self.solver,
        }
    }
}

/// Flat result record, one per experiment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentRecord {
    // setup
    pub instance_key: String,
    pub k: u32,
    pub m: u32,
    pub heuristic: String,
    pub model: String,
    pub solver: String,
    pub time_limit: f64,
    pub threads: u32,
    pub y_binary: bool,
    pub max_m: u32,

    // instance
    pub pois: u32,
    pub sensors: u32,
    pub sinks: u32,
    pub seed: i64,

    // heuristic
    pub heuristic_objective_value: u32,
    pub heuristic_solution: String,
    pub heuristic_time: f64,

    // ilp
    pub ilp_status: String,
    pub ilp_objective_value: Option<f64>,
    pub ilp_solution: Option<String>,
    pub ilp_time: Option<f64>,
    pub ilp_variables: Option<usize>,
    pub ilp_binary_variables: Option<usize>,
    pub ilp_constraints: Option<usize>,
    pub ilp_node_count: Option<u64>,
    pub ilp_iteration_count: Option<u64>,
    pub ilp_mip_gap: Option<f64>,

    // setup timings (seconds)
    pub setup_model_time: Option<f64>,
    pub setup_x_time: Option<f64>,
    pub setup_y_time: Option<f64>,
    pub setup_objective_time: Option<f64>,
    pub setup_constraints_time: Option<f64>,
}

impl ExperimentRecord {
    fn new(config: &ExperimentConfig, instance: &Instance) -> Self {
        let key = instance.key();
        Self {
            instance_key: key.to_string(),
            k: config.k,
            m: config.m,
            heuristic: config.heuristic.to_ascii_lowercase(),
            model: config
                .formulation
                .map_or_else(|| NO_HEURISTIC.to_string(), |f| f.to_string()),
            solver: config.solver.to_string(),
            time_limit: config.time_limit.as_secs_f64(),
            threads: config.threads,
            y_binary: config.y_binary,
            max_m: config.max_m.unwrap_or(config.m),
            pois: key.num_pois,
            sensors: key.num_sensors,
            sinks: key.num_sinks,
            seed: key.random_seed,
            heuristic_objective_value: key.num_sensors,
            heuristic_solution: "1".repeat(key.num_sensors as usize),
            heuristic_time: 0.0,
            ilp_status: "none".to_string(),
            ilp_objective_value: None,
            ilp_solution: None,
            ilp_time: None,
            ilp_variables: None,
            ilp_binary_variables: None,
            ilp_constraints: None,
            ilp_node_count: None,
            ilp_iteration_count: None,
            ilp_mip_gap: None,
            setup_model_time: None,
            setup_x_time: None,
            setup_y_time: None,
            setup_objective_time: None,
            setup_constraints_time: None,
        }
    }

    fn record_model(&mut self, encoded: &EncodedModel) {
        let size = encoded.model().size();
        let timings = encoded.timings();
        self.ilp_variables = Some(size.variables);
        self.ilp_binary_variables = Some(size.binary_variables);
        self.ilp_constraints = Some(size.constraints);
        self.setup_model_time = Some(timings.model.as_secs_f64());
        self.setup_x_time = Some(timings.x_variables.as_secs_f64());
        self.setup_y_time = Some(timings.y_variables.as_secs_f64());
        self.setup_objective_time = Some(timings.objective.as_secs_f64());
        self.setup_constraints_time = Some(timings.constraints.as_secs_f64());
    }

    fn record_outcome(&mut self, encoded: &EncodedModel, outcome: &MipOutcome) {
        self.ilp_status = outcome.status.to_string();
        self.ilp_time = Some(outcome.diagnostics.solve_time.as_secs_f64());
        self.ilp_node_count = outcome.diagnostics.node_count;
        self.ilp_iteration_count = outcome.diagnostics.iteration_count;
        self.ilp_mip_gap = outcome.diagnostics.mip_gap;
        if let Some(deployment) = encoded.decode(outcome) {
            self.ilp_objective_value = Some(deployment.objective_value() as f64);
            self.ilp_solution = Some(deployment.solution_bitstring());
        }
    }
}

/// Runs one experiment end to end.
///
/// Encoding preconditions that already prove infeasibility (no sink arc left
/// after filtering) are recorded as `INFEASIBLE`; every other error is
/// returned.
pub fn run_experiment(
    config: &ExperimentConfig,
    collaborators: &Collaborators<'_>,
) -> KcmcResult<ExperimentRecord> {
    let mut parser = InstanceParser::new().loose(config.loose);
    if let Some(topology) = collaborators.topology {
        parser = parser.topology_source(topology);
    }
    let instance = parser.parse(&config.instance_key)?;
    let mut record = ExperimentRecord::new(config, &instance);

    let instance = if config.heuristic.eq_ignore_ascii_case(NO_HEURISTIC) {
        instance
    } else {
        let preprocessor = collaborators.preprocessor.ok_or_else(|| {
            KcmcError::Config(format!(
                "heuristic '{}' requested but no preprocessor is configured",
                config.heuristic
            ))
        })?;
        let (filtered, result) =
            instance.preprocess(preprocessor, config.k, config.m, &config.heuristic)?;
        record.heuristic_objective_value = result.num_used_sensors;
        record.heuristic_solution = result.solution.clone();
        record.heuristic_time = result.runtime_us as f64 / 1e6;
        info!(
            method = %result.method,
            used = result.num_used_sensors,
            "filtered instance with heuristic solution"
        );
        filtered
    };

    let Some(formulation) = config.formulation else {
        return Ok(record);
    };

    let reduced: Cow<'_, Instance> = instance.to_single_sink(record.max_m)?;
    let params = EncodeParams {
        k: config.k,
        m: config.m,
        y_binary: config.y_binary,
    };
    let encoded = match encode(&reduced, formulation, &params) {
        Ok(encoded) => encoded,
        Err(err) if err.proves_infeasible() => {
            warn!(error = %err, "instance infeasible by construction");
            record.ilp_status = SolveStatus::Infeasible.to_string();
            return Ok(record);
        }
        Err(err) => return Err(err.into()),
    };
    record.record_model(&encoded);

    let start = Instant::now();
    let outcome = solve(encoded.model(), &config.solve_params())?;
    record.record_outcome(&encoded, &outcome);
    info!(
        status = %record.ilp_status,
        objective = ?record.ilp_objective_value,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "experiment finished"
    );
    Ok(record)
}
