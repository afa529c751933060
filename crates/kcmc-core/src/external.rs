//! Seams for the external collaborators of the instance model.
//!
//! The topology generator and the heuristic pre-solvers live outside this
//! crate (see `kcmc-external` for the subprocess adapters). Both are consumed
//! as single blocking round-trips with no partial results.

use crate::error::{PreprocessingError, TopologyRegenerationError};
use crate::instance::InstanceKey;
use crate::SensorId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Rebuilds the full serialization of an instance from its key.
pub trait TopologySource {
    fn regenerate(&self, key: &InstanceKey) -> Result<String, TopologyRegenerationError>;
}

impl<F> TopologySource for F
where
    F: Fn(&InstanceKey) -> Result<String, TopologyRegenerationError>,
{
    fn regenerate(&self, key: &InstanceKey) -> Result<String, TopologyRegenerationError> {
        self(key)
    }
}

/// Runs every heuristic pre-solver it knows for `(key, k, m)`.
pub trait HeuristicPreprocessor {
    fn preprocess(
        &self,
        key: &InstanceKey,
        k: u32,
        m: u32,
    ) -> Result<PreprocessingReport, PreprocessingError>;
}

/// Outcome of one heuristic method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicResult {
    /// Lower-case method name with any `_<paths>` suffix removed
    pub method: String,
    pub num_paths: Option<u32>,
    pub runtime_us: u64,
    pub valid: bool,
    pub num_used_sensors: u32,
    pub compression_rate: f64,
    /// One character per sensor id: `1` active, `0` inactive
    pub solution: String,
}

impl HeuristicResult {
    pub fn active_sensors(&self) -> BTreeSet<SensorId> {
        self.positions_of('1')
    }

    pub fn inactive_sensors(&self) -> BTreeSet<SensorId> {
        self.positions_of('0')
    }

    fn positions_of(&self, flag: char) -> BTreeSet<SensorId> {
        self.solution
            .chars()
            .enumerate()
            .filter(|(_, c)| *c == flag)
            .map(|(i, _)| SensorId::new(i as u32))
            .collect()
    }
}

/// All heuristic results for one `(key, k, m)`, keyed by method name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingReport {
    results: BTreeMap<String, HeuristicResult>,
}

impl PreprocessingReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later results for the same method replace earlier ones.
    pub fn insert(&mut self, result: HeuristicResult) {
        self.results.insert(result.method.clone(), result);
    }

    pub fn methods(&self) -> Vec<String> {
        self.results.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Looks up `method` case-insensitively; an invalid result is an error.
    pub fn select(&self, method: &str) -> Result<&HeuristicResult, PreprocessingError> {
        let method = method.to_ascii_lowercase();
        let result =
            self.results
                .get(&method)
                .ok_or_else(|| PreprocessingError::UnknownMethod {
                    method: method.clone(),
                    available: self.methods(),
                })?;
        if !result.valid {
            return Err(PreprocessingError::InvalidResult { method });
        }
        Ok(result)
    }
}

impl FromIterator<HeuristicResult> for PreprocessingReport {
    fn from_iter<T: IntoIterator<Item = HeuristicResult>>(iter: T) -> Self {
        let mut report = Self::new();
        for result in iter {
            report.insert(result);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(method: &str, valid: bool, solution: &str) -> HeuristicResult {
        HeuristicResult {
            method: method.to_string(),
            num_paths: None,
            runtime_us: 120,
            valid,
            num_used_sensors: solution.chars().filter(|c| *c == '1').count() as u32,
            compression_rate: 0.5,
            solution: solution.to_string(),
        }
    }

    #[test]
    fn bitstring_decodes_to_sensor_sets() {
        let r = result("kcov-dinic", true, "1010");
        let active: Vec<u32> = r.active_sensors().iter().map(|s| s.value()).collect();
        let inactive: Vec<u32> = r.inactive_sensors().iter().map(|s| s.value()).collect();
        assert_eq!(active, vec![0, 2]);
        assert_eq!(inactive, vec![1, 3]);
    }

    #[test]
    fn select_is_case_insensitive() {
        let report: PreprocessingReport = [result("kcov-dinic", true, "11")].into_iter().collect();
        assert_eq!(report.select("KCOV-DINIC").unwrap().solution, "11");
    }

    #[test]
    fn unknown_and_invalid_methods_fail() {
        let report: PreprocessingReport = [
            result("kcov-dinic", true, "11"),
            result("flood-dinic", false, "10"),
        ]
        .into_iter()
        .collect();

        match report.select("best-dinic") {
            Err(PreprocessingError::UnknownMethod { available, .. }) => {
                assert_eq!(available, vec!["flood-dinic", "kcov-dinic"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            report.select("flood-dinic"),
            Err(PreprocessingError::InvalidResult {
                method: "flood-dinic".into()
            })
        );
    }
}
