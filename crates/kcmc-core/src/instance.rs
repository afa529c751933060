//! The [`Instance`] graph and its derived views.

use crate::error::PreprocessingError;
use crate::external::{HeuristicPreprocessor, HeuristicResult};
use crate::reduction::SinkExpansion;
use crate::{PoiId, SensorId, SinkId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

static NO_SENSORS: BTreeSet<SensorId> = BTreeSet::new();
static NO_POIS: BTreeSet<PoiId> = BTreeSet::new();
static NO_SINKS: BTreeSet<SinkId> = BTreeSet::new();

/// Identity and geometry of an instance: everything the topology generator
/// needs to rebuild the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceKey {
    pub num_pois: u32,
    pub num_sensors: u32,
    pub num_sinks: u32,
    pub area_side: u32,
    pub coverage_radius: u32,
    pub communication_radius: u32,
    pub random_seed: i64,
}

/// Renders the preamble-only form, which doubles as a regeneration request.
impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "KCMC;{} {} {};{} {} {};{};END",
            self.num_pois,
            self.num_sensors,
            self.num_sinks,
            self.area_side,
            self.coverage_radius,
            self.communication_radius,
            self.random_seed
        )
    }
}

/// One KCMC problem instance.
///
/// Adjacency is stored sparsely as ordered sets keyed by typed id, so every
/// derived graph is deterministic and memory follows the edges rather than
/// the declared counts. Only ids with at least one edge have an entry. Edges
/// touching an inactive sensor are never stored. Instances are immutable once
/// built; filtering and reduction return new, independently owned instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub(crate) key: InstanceKey,
    pub(crate) inactive: BTreeSet<SensorId>,
    pub(crate) poi_sensor: Adjacency<PoiId, SensorId>,
    pub(crate) sensor_poi: Adjacency<SensorId, PoiId>,
    pub(crate) sensor_sensor: Adjacency<SensorId, SensorId>,
    pub(crate) sensor_sink: Adjacency<SensorId, SinkId>,
    pub(crate) sink_sensor: Adjacency<SinkId, SensorId>,
    pub(crate) expansion: Option<SinkExpansion>,
}

pub(crate) type Adjacency<From, To> = BTreeMap<From, BTreeSet<To>>;

impl Instance {
    /// Edge-less instance; `inactive` ids outside the sensor space are dropped.
    pub(crate) fn empty(key: InstanceKey, inactive: BTreeSet<SensorId>) -> Self {
        let inactive = inactive
            .into_iter()
            .filter(|id| id.value() < key.num_sensors)
            .collect();
        Self {
            key,
            inactive,
            poi_sensor: BTreeMap::new(),
            sensor_poi: BTreeMap::new(),
            sensor_sensor: BTreeMap::new(),
            sensor_sink: BTreeMap::new(),
            sink_sensor: BTreeMap::new(),
            expansion: None,
        }
    }

    // Insertion helpers assume ids were range-checked by the caller. Each
    // returns false when the edge is filtered out or already present.

    pub(crate) fn insert_coverage(&mut self, poi: PoiId, sensor: SensorId) -> bool {
        if !self.is_active(sensor) {
            return false;
        }
        self.sensor_poi.entry(sensor).or_default().insert(poi);
        self.poi_sensor.entry(poi).or_default().insert(sensor)
    }

    pub(crate) fn insert_communication(&mut self, a: SensorId, b: SensorId) -> bool {
        if !self.is_active(a) || !self.is_active(b) {
            return false;
        }
        self.sensor_sensor.entry(b).or_default().insert(a);
        self.sensor_sensor.entry(a).or_default().insert(b)
    }

    pub(crate) fn insert_sink_edge(&mut self, sensor: SensorId, sink: SinkId) -> bool {
        if !self.is_active(sensor) {
            return false;
        }
        self.sink_sensor.entry(sink).or_default().insert(sensor);
        self.sensor_sink.entry(sensor).or_default().insert(sink)
    }

    pub fn key(&self) -> &InstanceKey {
        &self.key
    }

    pub fn num_pois(&self) -> u32 {
        self.key.num_pois
    }

    pub fn num_sensors(&self) -> u32 {
        self.key.num_sensors
    }

    pub fn num_sinks(&self) -> u32 {
        self.key.num_sinks
    }

    pub fn random_seed(&self) -> i64 {
        self.key.random_seed
    }

    pub fn is_single_sink(&self) -> bool {
        self.key.num_sinks == 1
    }

    /// Present when this instance was produced by [`Instance::to_single_sink`].
    pub fn expansion(&self) -> Option<&SinkExpansion> {
        self.expansion.as_ref()
    }

    pub fn inactive_sensors(&self) -> &BTreeSet<SensorId> {
        &self.inactive
    }

    /// Complement of [`inactive_sensors`](Self::inactive_sensors) over the declared sensor space.
    pub fn active_sensors(&self) -> BTreeSet<SensorId> {
        (0..self.key.num_sensors)
            .map(SensorId::new)
            .filter(|id| !self.inactive.contains(id))
            .collect()
    }

    pub fn num_active_sensors(&self) -> u32 {
        self.key.num_sensors - self.inactive.len() as u32
    }

    pub fn is_active(&self, sensor: SensorId) -> bool {
        sensor.value() < self.key.num_sensors && !self.inactive.contains(&sensor)
    }

    /// POIs with at least one coverage edge.
    pub fn pois(&self) -> Vec<PoiId> {
        self.poi_sensor.keys().copied().collect()
    }

    /// Sensors with at least one edge of any kind, ascending.
    pub fn sensors(&self) -> Vec<SensorId> {
        let mut sensors: BTreeSet<SensorId> = self.sensor_poi.keys().copied().collect();
        sensors.extend(self.sensor_sensor.keys());
        sensors.extend(self.sensor_sink.keys());
        sensors.into_iter().collect()
    }

    /// Sinks with at least one sensor attached.
    pub fn sinks(&self) -> Vec<SinkId> {
        self.sink_sensor.keys().copied().collect()
    }

    /// Number of covering sensors per POI.
    pub fn poi_degree(&self) -> BTreeMap<PoiId, usize> {
        degree_map(&self.poi_sensor)
    }

    /// Number of communication neighbours per sensor.
    pub fn sensor_degree(&self) -> BTreeMap<SensorId, usize> {
        degree_map(&self.sensor_sensor)
    }

    pub fn sink_degree(&self) -> BTreeMap<SinkId, usize> {
        degree_map(&self.sink_sensor)
    }

    /// Undirected edge count over all three relations.
    pub fn edge_count(&self) -> usize {
        let coverage: usize = self.poi_sensor.values().map(BTreeSet::len).sum();
        let communication: usize = self.sensor_sensor.values().map(BTreeSet::len).sum();
        let sink: usize = self.sink_sensor.values().map(BTreeSet::len).sum();
        coverage + communication / 2 + sink
    }

    pub fn covering_sensors(&self, poi: PoiId) -> &BTreeSet<SensorId> {
        self.poi_sensor.get(&poi).unwrap_or(&NO_SENSORS)
    }

    pub fn covered_pois(&self, sensor: SensorId) -> &BTreeSet<PoiId> {
        self.sensor_poi.get(&sensor).unwrap_or(&NO_POIS)
    }

    pub fn communication_neighbors(&self, sensor: SensorId) -> &BTreeSet<SensorId> {
        self.sensor_sensor.get(&sensor).unwrap_or(&NO_SENSORS)
    }

    pub fn sink_links(&self, sensor: SensorId) -> &BTreeSet<SinkId> {
        self.sensor_sink.get(&sensor).unwrap_or(&NO_SINKS)
    }

    pub fn sink_neighbors(&self, sink: SinkId) -> &BTreeSet<SensorId> {
        self.sink_sensor.get(&sink).unwrap_or(&NO_SENSORS)
    }

    /// Sensor → POIs it covers.
    pub fn coverage_graph(&self) -> BTreeMap<SensorId, BTreeSet<PoiId>> {
        self.sensor_poi.clone()
    }

    /// POI → sensors covering it.
    pub fn inverse_coverage_graph(&self) -> BTreeMap<PoiId, BTreeSet<SensorId>> {
        self.poi_sensor.clone()
    }

    /// Sensor → communication neighbours.
    pub fn communication_graph(&self) -> BTreeMap<SensorId, BTreeSet<SensorId>> {
        self.sensor_sensor.clone()
    }

    pub fn poi_edges(&self) -> Vec<(PoiId, SensorId)> {
        flatten(&self.poi_sensor)
    }

    /// Communication edges in both directions.
    pub fn sensor_edges(&self) -> Vec<(SensorId, SensorId)> {
        flatten(&self.sensor_sensor)
    }

    pub fn sink_edges(&self) -> Vec<(SensorId, SinkId)> {
        flatten(&self.sensor_sink)
    }

    /// Restricts the instance to `active`.
    ///
    /// The new inactive set is the union of the current one and every sensor
    /// not in `active`, so applying the same set twice is a no-op.
    pub fn with_active_sensors(&self, active: &BTreeSet<SensorId>) -> Instance {
        let inactive: BTreeSet<SensorId> = (0..self.key.num_sensors)
            .map(SensorId::new)
            .filter(|id| self.inactive.contains(id) || !active.contains(id))
            .collect();

        let mut filtered = Instance::empty(self.key, inactive);
        filtered.expansion = self.expansion.clone();
        for (poi, sensor) in self.poi_edges() {
            filtered.insert_coverage(poi, sensor);
        }
        for (a, b) in self.sensor_edges() {
            if a < b {
                filtered.insert_communication(a, b);
            }
        }
        for (sensor, sink) in self.sink_edges() {
            filtered.insert_sink_edge(sensor, sink);
        }
        tracing::debug!(
            inactive = filtered.inactive.len(),
            edges = filtered.edge_count(),
            "filtered instance to active sensors"
        );
        filtered
    }

    /// Runs a heuristic pre-solver and restricts the instance to the sensors it keeps.
    ///
    /// Sensors whose bitstring position is `0` become inactive; positions past
    /// the end of the bitstring stay as they are.
    pub fn preprocess(
        &self,
        preprocessor: &dyn HeuristicPreprocessor,
        k: u32,
        m: u32,
        method: &str,
    ) -> Result<(Instance, HeuristicResult), PreprocessingError> {
        let report = preprocessor.preprocess(&self.key, k, m)?;
        let result = report.select(method)?.clone();
        let dropped = result.inactive_sensors();
        let active: BTreeSet<SensorId> = self
            .active_sensors()
            .into_iter()
            .filter(|id| !dropped.contains(id))
            .collect();
        tracing::info!(
            method = %result.method,
            kept = active.len(),
            "applied heuristic preprocessing"
        );
        Ok((self.with_active_sensors(&active), result))
    }
}

fn degree_map<Id: Ord + Copy, T>(adjacency: &Adjacency<Id, T>) -> BTreeMap<Id, usize> {
    adjacency.iter().map(|(id, set)| (*id, set.len())).collect()
}

fn flatten<Id: Copy, T: Copy>(adjacency: &Adjacency<Id, T>) -> Vec<(Id, T)> {
    adjacency
        .iter()
        .flat_map(|(from, set)| set.iter().map(move |to| (*from, *to)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAIN: &str = "KCMC;1 3 1;10 5 5;42;PI 0 0;PI 0 1;II 0 1;II 1 2;IS 2 0;END";

    fn sensors(ids: &[u32]) -> BTreeSet<SensorId> {
        ids.iter().copied().map(SensorId::new).collect()
    }

    #[test]
    fn key_renders_as_regeneration_request() {
        let instance = Instance::parse(CHAIN).unwrap();
        assert_eq!(instance.key().to_string(), "KCMC;1 3 1;10 5 5;42;END");
    }

    #[test]
    fn derived_graphs_match_edges() {
        let instance = Instance::parse(CHAIN).unwrap();

        let inverse = instance.inverse_coverage_graph();
        assert_eq!(inverse[&PoiId::new(0)], sensors(&[0, 1]));

        let coverage = instance.coverage_graph();
        assert_eq!(coverage.len(), 2);
        assert!(coverage[&SensorId::new(1)].contains(&PoiId::new(0)));

        let communication = instance.communication_graph();
        assert_eq!(communication[&SensorId::new(1)], sensors(&[0, 2]));
        assert_eq!(communication[&SensorId::new(2)], sensors(&[1]));

        assert_eq!(instance.poi_edges().len(), 2);
        assert_eq!(instance.sensor_edges().len(), 4);
        assert_eq!(
            instance.sink_edges(),
            vec![(SensorId::new(2), SinkId::new(0))]
        );
        assert_eq!(instance.edge_count(), 5);
    }

    #[test]
    fn degrees_skip_isolated_ids() {
        let instance = Instance::parse(CHAIN).unwrap();
        assert_eq!(instance.poi_degree()[&PoiId::new(0)], 2);
        assert_eq!(instance.sensor_degree()[&SensorId::new(1)], 2);
        assert_eq!(instance.sink_degree()[&SinkId::new(0)], 1);
        assert_eq!(instance.sensors(), vec![0, 1, 2].into_iter().map(SensorId::new).collect::<Vec<_>>());
    }

    #[test]
    fn filtering_drops_edges_of_inactive_sensors() {
        let instance = Instance::parse(CHAIN).unwrap();
        let filtered = instance.with_active_sensors(&sensors(&[1, 2]));

        assert_eq!(filtered.inactive_sensors(), &sensors(&[0]));
        assert_eq!(filtered.covering_sensors(PoiId::new(0)), &sensors(&[1]));
        assert_eq!(filtered.communication_neighbors(SensorId::new(1)), &sensors(&[2]));
        assert!(filtered.communication_neighbors(SensorId::new(0)).is_empty());
        // source instance is untouched
        assert_eq!(instance.covering_sensors(PoiId::new(0)).len(), 2);
    }

    #[test]
    fn filtering_is_idempotent() {
        let instance = Instance::parse(CHAIN).unwrap();
        let active = sensors(&[0, 2]);
        let once = instance.with_active_sensors(&active);
        let twice = once.with_active_sensors(&active);
        assert_eq!(once, twice);
    }

    #[test]
    fn filtering_never_reactivates_sensors() {
        let instance = Instance::parse(CHAIN).unwrap();
        let narrowed = instance.with_active_sensors(&sensors(&[1, 2]));
        let widened = narrowed.with_active_sensors(&sensors(&[0, 1, 2]));
        assert!(!widened.is_active(SensorId::new(0)));
        assert_eq!(narrowed, widened);
    }

    #[test]
    fn lookups_outside_the_id_space_are_empty() {
        let instance = Instance::parse(CHAIN).unwrap();
        assert!(instance.covering_sensors(PoiId::new(99)).is_empty());
        assert!(instance.sink_neighbors(SinkId::new(5)).is_empty());
        assert!(!instance.is_active(SensorId::new(3)));
    }
}
