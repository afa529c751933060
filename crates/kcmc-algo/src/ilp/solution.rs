//! Reading solver assignments back onto the instance.

use super::encoder::{EncodedModel, Formulation};
use super::solver::MipOutcome;
use kcmc_core::{Instance, PoiId, SensorId, SinkId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Binary values above this count as 1.
const INSTALLED_THRESHOLD: f64 = 0.5;
/// Flow below this is solver noise.
const FLOW_EPSILON: f64 = 1e-6;

/// Sensors selected by a solution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deployment {
    pub formulation: Formulation,
    /// Installed real sensors (virtual sinks excluded)
    pub installed: BTreeSet<SensorId>,
    /// Layers each installed node belongs to, including virtual sinks that
    /// carry flow; always layer 0 for the single-flow formulation
    pub layers: BTreeMap<SensorId, BTreeSet<u32>>,
    /// Virtual sinks carrying flow, per original sink of a reduced instance
    pub sink_usage: BTreeMap<SinkId, u32>,
    /// Length of [`solution_bitstring`](Self::solution_bitstring)
    pub num_sensors: u32,
}

impl Deployment {
    pub fn objective_value(&self) -> usize {
        self.installed.len()
    }

    /// `1` for every installed real sensor id, `0` otherwise.
    pub fn solution_bitstring(&self) -> String {
        (0..self.num_sensors)
            .map(|i| {
                if self.installed.contains(&SensorId::new(i)) {
                    '1'
                } else {
                    '0'
                }
            })
            .collect()
    }

    /// POIs covered by fewer than `k` installed sensors, with their count.
    pub fn coverage_deficits(&self, instance: &Instance, k: u32) -> Vec<(PoiId, u32)> {
        (0..instance.num_pois())
            .map(PoiId::new)
            .filter_map(|p| {
                let covered = instance
                    .covering_sensors(p)
                    .iter()
                    .filter(|i| self.installed.contains(i))
                    .count() as u32;
                (covered < k).then_some((p, covered))
            })
            .collect()
    }

    /// Nodes installed in more than one layer.
    pub fn layer_conflicts(&self) -> Vec<SensorId> {
        self.layers
            .iter()
            .filter(|(_, layers)| layers.len() > 1)
            .map(|(sensor, _)| *sensor)
            .collect()
    }
}

impl EncodedModel {
    /// Projects the incumbent of `outcome` onto sensors. `None` without one.
    ///
    /// Virtual sinks cost nothing, so the solver may switch them on without
    /// routing through them; only those that deliver flow are reported.
    pub fn decode(&self, outcome: &MipOutcome) -> Option<Deployment> {
        let mut delivering = BTreeSet::new();
        for (sensor, var) in &self.sink_arcs {
            if outcome.value(*var)? > FLOW_EPSILON {
                delivering.insert(*sensor);
            }
        }

        let mut installed = BTreeSet::new();
        let mut layers: BTreeMap<SensorId, BTreeSet<u32>> = BTreeMap::new();
        let mut sink_usage = BTreeMap::new();

        for x in &self.install {
            if outcome.value(x.var)? <= INSTALLED_THRESHOLD {
                continue;
            }
            match self.expansion.as_ref().and_then(|e| e.origin_of(x.sensor)) {
                Some(sink) => {
                    if !delivering.contains(&x.sensor) {
                        continue;
                    }
                    *sink_usage.entry(sink).or_insert(0) += 1;
                }
                None => {
                    installed.insert(x.sensor);
                }
            }
            layers.entry(x.sensor).or_default().insert(x.layer);
        }

        Some(Deployment {
            formulation: self.formulation,
            installed,
            layers,
            sink_usage,
            num_sensors: self.original_sensors,
        })
    }

    /// Number of POIs the model was built for.
    pub fn num_pois(&self) -> u32 {
        self.num_pois
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ilp::{encode, EncodeParams, SolveDiagnostics, SolveStatus};
    use std::time::Duration;

    const CHAIN: &str = "KCMC;1 3 1;10 5 5;42;PI 0 0;PI 0 1;II 0 1;II 1 2;IS 2 0;END";

    fn outcome(values: Option<Vec<f64>>) -> MipOutcome {
        MipOutcome {
            status: SolveStatus::Optimal,
            objective: None,
            values,
            diagnostics: SolveDiagnostics {
                backend: "test",
                solve_time: Duration::ZERO,
                node_count: None,
                iteration_count: None,
                mip_gap: None,
            },
        }
    }

    #[test]
    fn decode_without_incumbent_is_none() {
        let instance = Instance::parse(CHAIN).unwrap();
        let encoded = encode(&instance, Formulation::SingleFlow, &EncodeParams::default()).unwrap();
        assert!(encoded.decode(&outcome(None)).is_none());
    }

    #[test]
    fn decode_reads_layers_and_bitstring() {
        let instance = Instance::parse(CHAIN).unwrap();
        let params = EncodeParams {
            k: 2,
            m: 2,
            y_binary: false,
        };
        let encoded = encode(&instance, Formulation::MultiFlow, &params).unwrap();
        let mut values = vec![0.0; encoded.model().num_variables()];
        // hand-picked assignment, not a feasible one
        for (sensor, layer) in [(0, 0), (1, 1), (2, 0), (2, 1)] {
            let var = encoded.install_var(SensorId::new(sensor), layer).unwrap();
            values[var.index()] = 1.0;
        }
        let deployment = encoded.decode(&outcome(Some(values))).unwrap();

        assert_eq!(deployment.solution_bitstring(), "111");
        assert_eq!(deployment.objective_value(), 3);
        assert_eq!(deployment.layer_conflicts(), vec![SensorId::new(2)]);
        assert!(deployment.coverage_deficits(&instance, 2).is_empty());
        assert_eq!(
            deployment.coverage_deficits(&instance, 3),
            vec![(PoiId::new(0), 2)]
        );
    }
}
