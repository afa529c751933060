//! # kcmc-algo: ILP models for K-Coverage M-Connectivity sensor placement
//!
//! This crate turns a [`kcmc_core::Instance`] into a minimum-sensor Integer
//! Linear Program, solves it through `good_lp` and maps the assignment back
//! onto sensors.
//!
//! ## Formulations
//!
//! | Formulation | Commodity | Disjoint paths |
//! |-------------|-----------|----------------|
//! | [`Formulation::SingleFlow`] | one aggregate commodity of M units per POI | not enforced |
//! | [`Formulation::MultiFlow`] | M unit layers per POI | enforced by disjunction rows |
//!
//! Both are produced by [`encode`] into a solver-independent [`MipModel`],
//! solved by [`solve`] and read back with [`EncodedModel::decode`].
//!
//! ## Backends
//!
//! | Backend | Feature | Time limit | Threads |
//! |---------|---------|------------|---------|
//! | `microlp` | always | native | ignored |
//! | `highs` | `solver-highs` | native | native |
//!
//! ## Example
//!
//! ```
//! use kcmc_algo::{encode, solve, EncodeParams, Formulation, SolveParams, SolveStatus};
//! use kcmc_core::Instance;
//!
//! let instance =
//!     Instance::parse("KCMC;1 3 1;10 5 5;42;PI 0 0;PI 0 1;II 0 1;II 1 2;IS 2 0;END")?;
//! let encoded = encode(&instance, Formulation::SingleFlow, &EncodeParams::default())?;
//! let outcome = solve(encoded.model(), &SolveParams::default())?;
//! assert_eq!(outcome.status, SolveStatus::Optimal);
//!
//! let deployment = encoded.decode(&outcome).expect("optimal outcome has an incumbent");
//! assert_eq!(deployment.solution_bitstring(), "011");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod ilp;
pub mod workflows;

pub use ilp::{
    encode, solve, CommodityShape, ConstraintFamily, Deployment, EncodeError, EncodeParams,
    EncodedModel, Formulation, MipModel, MipOutcome, MipSolverKind, SolveDiagnostics, SolveError,
    SolveParams, SolveStatus,
};
pub use workflows::{
    run_experiment, Collaborators, ExperimentConfig, ExperimentRecord, NO_HEURISTIC,
};
