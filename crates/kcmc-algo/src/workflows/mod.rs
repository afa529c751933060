//! High-level workflow facades for KCMC experiments.
//!
//! These facades chain parsing, preprocessing, reduction, encoding and
//! solving into a single call that yields one result record.

pub mod experiment;

pub use experiment::{
    run_experiment, Collaborators, ExperimentConfig, ExperimentRecord, NO_HEURISTIC,
};
