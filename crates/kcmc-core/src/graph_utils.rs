use crate::{Instance, NodeId, PoiId, SensorId, SinkId};
use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Edge relation carried by a topology graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Coverage,
    Communication,
    Sink,
}

/// Undirected petgraph view of an instance (declared POIs and sinks, active sensors).
#[derive(Debug)]
pub struct TopologyGraph {
    pub graph: UnGraph<NodeId, LinkKind>,
    index: HashMap<NodeId, NodeIndex>,
}

impl TopologyGraph {
    pub fn node(&self, id: NodeId) -> Option<NodeIndex> {
        self.index.get(&id).copied()
    }
}

/// Builds the undirected topology graph used by the statistics below.
pub fn topology_graph(instance: &Instance) -> TopologyGraph {
    let mut graph = UnGraph::new_undirected();
    let mut index = HashMap::new();
    let nodes = (0..instance.num_pois())
        .map(|p| NodeId::from(PoiId::new(p)))
        .chain(instance.active_sensors().into_iter().map(NodeId::from))
        .chain((0..instance.num_sinks()).map(|s| NodeId::from(SinkId::new(s))));
    for node in nodes {
        index.insert(node, graph.add_node(node));
    }

    let mut link = |a: NodeId, b: NodeId, kind: LinkKind| {
        if let (Some(&a), Some(&b)) = (index.get(&a), index.get(&b)) {
            graph.add_edge(a, b, kind);
        }
    };
    for (poi, sensor) in instance.poi_edges() {
        link(poi.into(), sensor.into(), LinkKind::Coverage);
    }
    for (a, b) in instance.sensor_edges() {
        if a < b {
            link(a.into(), b.into(), LinkKind::Communication);
        }
    }
    for (sensor, sink) in instance.sink_edges() {
        link(sensor.into(), sink.into(), LinkKind::Sink);
    }

    TopologyGraph { graph, index }
}

/// Summary statistics reported by `kcmc inspect`.
#[derive(Debug, Clone, Serialize)]
pub struct TopologyStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub connected_components: usize,
    pub min_degree: usize,
    pub avg_degree: f64,
    pub max_degree: usize,
    /// Coverage edges over all POI × active-sensor pairs
    pub coverage_density: f64,
    /// Communication edges over all active-sensor pairs
    pub communication_density: f64,
}

/// Calculates node/edge counts, degree spread, components and edge densities.
pub fn topology_stats(instance: &Instance) -> TopologyStats {
    let topology = topology_graph(instance);
    let graph = &topology.graph;
    let node_count = graph.node_count();
    let degrees: Vec<usize> = graph
        .node_indices()
        .map(|node| graph.neighbors(node).count())
        .collect();
    let avg_degree = if node_count == 0 {
        0.0
    } else {
        degrees.iter().sum::<usize>() as f64 / node_count as f64
    };

    let mut coverage_edges = 0usize;
    let mut communication_edges = 0usize;
    for weight in graph.edge_weights() {
        match weight {
            LinkKind::Coverage => coverage_edges += 1,
            LinkKind::Communication => communication_edges += 1,
            LinkKind::Sink => {}
        }
    }
    let sensors = instance.num_active_sensors() as f64;
    let poi_pairs = instance.num_pois() as f64 * sensors;
    let sensor_pairs = sensors * (sensors - 1.0) / 2.0;

    TopologyStats {
        node_count,
        edge_count: graph.edge_count(),
        connected_components: connected_components(graph),
        min_degree: degrees.iter().copied().min().unwrap_or(0),
        avg_degree,
        max_degree: degrees.iter().copied().max().unwrap_or(0),
        coverage_density: ratio(coverage_edges as f64, poi_pairs),
        communication_density: ratio(communication_edges as f64, sensor_pairs),
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Degree-frequency profile: for each node kind, how many nodes have each degree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegreeProfile {
    pub counts: (u32, u32, u32),
    pub pois: BTreeMap<usize, usize>,
    pub sensors: BTreeMap<usize, usize>,
    pub sinks: BTreeMap<usize, usize>,
}

impl DegreeProfile {
    /// Cheap screen for duplicated instances: differing counts or degree
    /// frequencies rule out an isomorphism; equal profiles only allow one.
    pub fn may_be_isomorphic(&self, other: &DegreeProfile) -> bool {
        self == other
    }
}

pub fn degree_profile(instance: &Instance) -> DegreeProfile {
    fn frequencies<K>(degrees: BTreeMap<K, usize>) -> BTreeMap<usize, usize> {
        let mut out = BTreeMap::new();
        for degree in degrees.into_values() {
            *out.entry(degree).or_insert(0) += 1;
        }
        out
    }
    DegreeProfile {
        counts: (
            instance.num_pois(),
            instance.num_sensors(),
            instance.num_sinks(),
        ),
        pois: frequencies(instance.poi_degree()),
        sensors: frequencies(instance.sensor_degree()),
        sinks: frequencies(instance.sink_degree()),
    }
}

/// Which sensors can relay to a sink and which POIs are cut off from every sink.
#[derive(Debug, Clone, Serialize)]
pub struct SinkReachability {
    pub reachable_sensors: BTreeSet<SensorId>,
    pub unreachable_sensors: Vec<SensorId>,
    /// POIs none of whose covering sensors reach a sink
    pub stranded_pois: Vec<PoiId>,
}

impl SinkReachability {
    pub fn is_fully_connected(&self) -> bool {
        self.stranded_pois.is_empty()
    }
}

/// Breadth-first search from every sink over sink and communication links only.
pub fn sink_reachability(instance: &Instance) -> SinkReachability {
    let topology = topology_graph(instance);
    let graph = &topology.graph;
    let mut visited = BTreeSet::new();
    let mut queue: VecDeque<NodeIndex> = (0..instance.num_sinks())
        .filter_map(|s| topology.node(SinkId::new(s).into()))
        .collect();

    while let Some(node) = queue.pop_front() {
        if !visited.insert(node) {
            continue;
        }
        for neighbor in graph.neighbors(node) {
            if matches!(graph[neighbor], NodeId::Sensor(_)) && !visited.contains(&neighbor) {
                queue.push_back(neighbor);
            }
        }
    }

    let reachable_sensors: BTreeSet<SensorId> = visited
        .iter()
        .filter_map(|node| graph[*node].as_sensor())
        .collect();
    let unreachable_sensors = instance
        .sensors()
        .into_iter()
        .filter(|s| !reachable_sensors.contains(s))
        .collect();
    let stranded_pois = (0..instance.num_pois())
        .map(PoiId::new)
        .filter(|p| {
            !instance
                .covering_sensors(*p)
                .iter()
                .any(|s| reachable_sensors.contains(s))
        })
        .collect();

    SinkReachability {
        reachable_sensors,
        unreachable_sensors,
        stranded_pois,
    }
}
