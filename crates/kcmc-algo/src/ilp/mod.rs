//! K-Coverage M-Connectivity (KCMC) sensor placement as an ILP
//!
//! This module encodes the minimum-sensor KCMC problem as a Mixed-Integer
//! Linear Program and solves it through `good_lp`.
//!
//! ## Problem Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  K-COVERAGE M-CONNECTIVITY (KCMC)                                        │
//! │  ────────────────────────────────                                        │
//! │                                                                          │
//! │  Given:                                                                  │
//! │    • POIs, candidate sensors and one sink                               │
//! │    • Coverage edges (POI ── sensor)                                     │
//! │    • Communication edges (sensor ── sensor, sensor ── sink)             │
//! │                                                                          │
//! │  Decide:                                                                 │
//! │    • Which sensors to install (binary decisions)                        │
//! │    • How each POI routes its paths to the sink (flows)                  │
//! │                                                                          │
//! │  Minimize:                                                               │
//! │    Number of installed sensors                                          │
//! │                                                                          │
//! │  Subject to:                                                             │
//! │    • Every POI covered by at least K installed sensors                  │
//! │    • Every POI reaches the sink over M paths of installed sensors       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Formulations
//!
//! Both formulations share coverage, projection and the objective. They
//! differ in the commodity carried per POI:
//!
//! ```text
//! single-flow (aggregate)                  multi-flow (layered, l = 0..M-1)
//!
//! minimize  Σ_i x_i                        minimize  Σ_{i,l} x_{i,l}
//!
//! Σ_{i∈C(p)} x_i ≥ K            ∀p         Σ_{i∈C(p)} Σ_l x_{i,l} ≥ K      ∀p
//! out(p) − in(p) = M            ∀p         out(p) − in(p) = 1              ∀p,l
//! out(i) − in(i) = 0            ∀p,i       out(i) − in(i) = 0              ∀p,l,i
//! in(s) = M                     ∀p         in(s) = 1                       ∀p,l
//! Σ_j y_(i,j),p ≤ x_i           ∀p,i       Σ_j y_(i,j),p,l ≤ x_{i,l}       ∀p,l,i
//!                                          Σ_l x_{i,l} ≤ 1                 ∀i
//! ```
//!
//! `C(p)` is the set of sensors covering `p`; flows run on POI→sensor,
//! sensor→sensor (both directions) and sensor→sink arcs.
//!
//! The single-flow model guarantees M units of flow capacity, not M
//! sensor-disjoint paths. The disjunction rows of the multi-flow model force
//! the layers apart, which makes its optimum an upper bound on the
//! single-flow optimum for the same `(K, M)`.
//!
//! ## Multi-sink instances
//!
//! Flow models need exactly one sink. Reduce first with
//! [`Instance::to_single_sink`](kcmc_core::Instance::to_single_sink), using a
//! multiplicity of at least M; the virtual sinks it creates are routed and
//! projected like sensors but are left out of the objective.

mod encoder;
mod model;
mod solution;
mod solver;

pub use encoder::{
    encode, CommodityShape, EncodeError, EncodeParams, EncodedModel,
    EncodingTimings, Formulation, InstallVar,
};
pub use model::{
    ConstraintFamily, ConstraintSense, LinearConstraint, LinearExpr, MipModel, ModelSize, VarId,
    VarKind, VariableSpec, FEASIBILITY_TOLERANCE,
};
pub use solution::Deployment;
pub use solver::{
    solve, MipOutcome, MipSolverKind, SolveDiagnostics, SolveError, SolveParams, SolveStatus,
};

use kcmc_core::KcmcError;

impl From<EncodeError> for KcmcError {
    fn from(err: EncodeError) -> Self {
        KcmcError::Encoding(Box::new(err))
    }
}

impl From<SolveError> for KcmcError {
    fn from(err: SolveError) -> Self {
        KcmcError::Solver(Box::new(err))
    }
}
