//! MIP backends behind `good_lp`.
//!
//! A [`MipModel`] is translated into a `good_lp` problem and solved by the
//! selected backend on the calling thread. The pure-Rust `microlp` backend is
//! always compiled in; HiGHS is available with the `solver-highs` feature.
//! Both enforce the time limit themselves, so a solve never outlives it.

use super::encoder::as_secs;
use super::model::{ConstraintSense, LinearExpr, MipModel, VarId, VarKind};
use anyhow::anyhow;
use good_lp::solvers::microlp::microlp as microlp_solver;
use good_lp::{
    constraint, variable, variables, Constraint, Expression, ProblemVariables, ResolutionError,
    Solution, SolutionStatus, SolverModel, Variable, WithTimeLimit,
};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

#[cfg(feature = "solver-highs")]
use good_lp::solvers::highs::highs as highs_solver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MipSolverKind {
    #[default]
    Microlp,
    #[cfg(feature = "solver-highs")]
    Highs,
}

impl MipSolverKind {
    pub fn available() -> &'static [&'static str] {
        AVAILABLE_MIP_SOLVERS
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MipSolverKind::Microlp => "microlp",
            #[cfg(feature = "solver-highs")]
            MipSolverKind::Highs => "highs",
        }
    }
}

const AVAILABLE_MIP_SOLVERS: &[&str] = &[
    "microlp",
    #[cfg(feature = "solver-highs")]
    "highs",
];

fn unknown_solver_error(label: &str) -> anyhow::Error {
    anyhow!(
        "unknown mip solver '{}'; supported values: {}",
        label,
        MipSolverKind::available().join(", ")
    )
}

impl FromStr for MipSolverKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.to_ascii_lowercase();
        match normalized.as_str() {
            "microlp" => Ok(MipSolverKind::Microlp),
            "highs" => {
                #[cfg(feature = "solver-highs")]
                {
                    Ok(MipSolverKind::Highs)
                }
                #[cfg(not(feature = "solver-highs"))]
                {
                    Err(unknown_solver_error(&normalized))
                }
            }
            other => Err(unknown_solver_error(other)),
        }
    }
}

impl fmt::Display for MipSolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource limits handed to the backend.
#[derive(Debug, Clone)]
pub struct SolveParams {
    /// Wall-clock budget, enforced inside the backend
    pub time_limit: Duration,
    /// Passed through to backends that support parallelism
    pub threads: u32,
    pub solver: MipSolverKind,
}

impl Default for SolveParams {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(3600),
            threads: 1,
            solver: MipSolverKind::default(),
        }
    }
}

/// Terminal state of a solve. None of these is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SolveStatus {
    #[serde(rename = "OPTIMAL")]
    Optimal,
    /// Also covers unbounded models, which cannot occur for a minimisation
    /// over non-negative variables
    #[serde(rename = "INFEASIBLE")]
    Infeasible,
    /// Time limit hit. The outcome carries an incumbent only when the backend
    /// found a feasible assignment before stopping; microlp often has none
    /// when the limit expires during the root relaxation.
    #[serde(rename = "LIMIT")]
    LimitReached,
}

impl SolveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolveStatus::Optimal => "OPTIMAL",
            SolveStatus::Infeasible => "INFEASIBLE",
            SolveStatus::LimitReached => "LIMIT",
        }
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolveDiagnostics {
    pub backend: &'static str,
    #[serde(serialize_with = "as_secs")]
    pub solve_time: Duration,
    pub node_count: Option<u64>,
    pub iteration_count: Option<u64>,
    pub mip_gap: Option<f64>,
}

impl SolveDiagnostics {
    fn new(backend: MipSolverKind, solve_time: Duration) -> Self {
        Self {
            backend: backend.as_str(),
            solve_time,
            node_count: None,
            iteration_count: None,
            mip_gap: None,
        }
    }
}

/// What came back from the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct MipOutcome {
    pub status: SolveStatus,
    pub objective: Option<f64>,
    /// Indexed by [`VarId::index`]; `None` when no incumbent exists
    pub values: Option<Vec<f64>>,
    pub diagnostics: SolveDiagnostics,
}

impl MipOutcome {
    fn without_incumbent(status: SolveStatus, diagnostics: SolveDiagnostics) -> Self {
        Self {
            status,
            objective: None,
            values: None,
            diagnostics,
        }
    }

    pub fn has_incumbent(&self) -> bool {
        self.values.is_some()
    }

    pub fn value(&self, var: VarId) -> Option<f64> {
        self.values
            .as_ref()
            .and_then(|values| values.get(var.index()).copied())
    }
}

/// Backend failures. Infeasibility and limits are outcomes, not errors.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("{backend} failed: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },
}

/// Backend result before it is turned into an outcome.
enum Resolution {
    Solved {
        values: Vec<f64>,
        status: SolutionStatus,
    },
    Infeasible,
    Failed(String),
}

impl From<ResolutionError> for Resolution {
    fn from(err: ResolutionError) -> Self {
        match err {
            ResolutionError::Infeasible | ResolutionError::Unbounded => Resolution::Infeasible,
            other => Resolution::Failed(other.to_string()),
        }
    }
}

/// Solves `model` to optimality or until the time limit.
///
/// Constant rows that can never hold short-circuit to `Infeasible` without
/// calling the backend. The call blocks until the backend returns, which is
/// at most `time_limit` after it starts.
pub fn solve(model: &MipModel, params: &SolveParams) -> Result<MipOutcome, SolveError> {
    let start = Instant::now();
    let backend = params.solver;

    let violated = model.violated_constants();
    if let Some(first) = violated.first() {
        info!(
            model = %model.name,
            violated = violated.len(),
            first = %first,
            "model infeasible by construction, skipping solver"
        );
        return Ok(MipOutcome::without_incumbent(
            SolveStatus::Infeasible,
            SolveDiagnostics::new(backend, start.elapsed()),
        ));
    }
    if params.time_limit.is_zero() {
        return Ok(MipOutcome::without_incumbent(
            SolveStatus::LimitReached,
            SolveDiagnostics::new(backend, start.elapsed()),
        ));
    }
    if params.threads > 1 && backend == MipSolverKind::Microlp {
        warn!(
            threads = params.threads,
            "microlp is single-threaded, ignoring thread count"
        );
    }

    info!(
        model = %model.name,
        backend = %backend,
        variables = model.num_variables(),
        constraints = model.num_constraints(),
        time_limit_s = params.time_limit.as_secs_f64(),
        "solving"
    );

    let resolution = run_backend(model, params);
    let solve_time = start.elapsed();
    let mut diagnostics = SolveDiagnostics::new(backend, solve_time);

    let outcome = match resolution {
        Resolution::Infeasible => {
            MipOutcome::without_incumbent(SolveStatus::Infeasible, diagnostics)
        }
        // backends report an expired limit without incumbent as a failure
        Resolution::Failed(_) if solve_time >= params.time_limit => {
            warn!(backend = %backend, "time limit reached without an incumbent");
            MipOutcome::without_incumbent(SolveStatus::LimitReached, diagnostics)
        }
        Resolution::Failed(message) => {
            return Err(SolveError::Backend {
                backend: backend.as_str(),
                message,
            });
        }
        Resolution::Solved { values, status } => {
            let status = match status {
                SolutionStatus::Optimal => {
                    diagnostics.mip_gap = Some(0.0);
                    SolveStatus::Optimal
                }
                SolutionStatus::TimeLimit | SolutionStatus::GapLimit => SolveStatus::LimitReached,
            };
            MipOutcome {
                status,
                objective: Some(model.objective.evaluate(&values)),
                values: Some(values),
                diagnostics,
            }
        }
    };

    info!(
        status = %outcome.status,
        objective = ?outcome.objective,
        elapsed_ms = solve_time.as_millis() as u64,
        "solve finished"
    );
    Ok(outcome)
}

struct Translated {
    vars: ProblemVariables,
    handles: Vec<Variable>,
    objective: Expression,
    constraints: Vec<Constraint>,
}

fn translate(model: &MipModel) -> Translated {
    let mut vars = variables!();
    let handles: Vec<Variable> = model
        .variables
        .iter()
        .map(|spec| {
            let definition = match spec.kind {
                VarKind::Binary => variable().binary(),
                VarKind::Continuous => {
                    let definition = variable().min(spec.lower);
                    match spec.upper {
                        Some(upper) => definition.max(upper),
                        None => definition,
                    }
                }
            };
            vars.add(definition.name(spec.name.clone()))
        })
        .collect();

    let objective = expression(&model.objective, &handles);
    let constraints = model
        .constraints
        .iter()
        .filter(|c| !c.is_constant())
        .map(|c| {
            let lhs = expression(&c.expr, &handles);
            let rhs = c.rhs;
            match c.sense {
                ConstraintSense::LessEq => constraint!(lhs <= rhs),
                ConstraintSense::GreaterEq => constraint!(lhs >= rhs),
                ConstraintSense::Equal => constraint!(lhs == rhs),
            }
        })
        .collect();

    Translated {
        vars,
        handles,
        objective,
        constraints,
    }
}

fn expression(expr: &LinearExpr, handles: &[Variable]) -> Expression {
    let mut out = Expression::from(expr.constant_term());
    for (var, coef) in expr.terms() {
        if coef != 0.0 {
            out += coef * handles[var.index()];
        }
    }
    out
}

fn add_constraints<M>(mut problem: M, constraints: Vec<Constraint>) -> M
where
    M: SolverModel,
{
    for constraint in constraints {
        problem = problem.with(constraint);
    }
    problem
}

fn run_backend(model: &MipModel, params: &SolveParams) -> Resolution {
    let Translated {
        vars,
        handles,
        objective,
        constraints,
    } = translate(model);
    let problem = vars.minimise(objective);

    let time_limit = params.time_limit.as_secs_f64();
    match params.solver {
        MipSolverKind::Microlp => {
            let problem = problem.using(microlp_solver).with_time_limit(time_limit);
            resolve(add_constraints(problem, constraints), &handles)
        }
        #[cfg(feature = "solver-highs")]
        MipSolverKind::Highs => {
            let problem = problem
                .using(highs_solver)
                .with_time_limit(time_limit)
                .set_option("threads", params.threads as i32);
            resolve(add_constraints(problem, constraints), &handles)
        }
    }
}

fn resolve<M>(problem: M, handles: &[Variable]) -> Resolution
where
    M: SolverModel<Error = ResolutionError>,
{
    match problem.solve() {
        Ok(solution) => Resolution::Solved {
            values: handles.iter().map(|v| solution.value(*v)).collect(),
            status: solution.status(),
        },
        Err(err) => err.into(),
    }
}
