//! # kcmc-core: Sensor Network Instance Model
//!
//! Provides the data structures for K-Coverage M-Connectivity (KCMC) wireless
//! sensor network design instances.
//!
//! ## Design Philosophy
//!
//! An instance is a **multipartite graph** over three disjoint id spaces:
//! - **POIs** (points of interest) that must be covered by `K` installed sensors
//! - **Sensors**, the candidate nodes that cover POIs and relay traffic
//! - **Sinks**, where every communication path terminates
//!
//! Adjacency is kept as index-based sets, one per id, so that every derived
//! graph is deterministic and cheap to rebuild:
//! - coverage edges (POI ↔ sensor)
//! - communication edges (sensor ↔ sensor, symmetric, no self-loops)
//! - sink edges (sensor ↔ sink)
//!
//! ## Quick Start
//!
//! ```rust
//! use kcmc_core::{Instance, PoiId, SensorId};
//!
//! let instance =
//!     Instance::parse("KCMC;1 3 1;10 5 5;42;PI 0 0;PI 0 1;II 0 1;II 1 2;IS 2 0;END")?;
//!
//! assert!(instance.is_single_sink());
//! let covering = &instance.inverse_coverage_graph()[&PoiId::new(0)];
//! assert!(covering.contains(&SensorId::new(0)));
//! # Ok::<(), kcmc_core::InstanceError>(())
//! ```
//!
//! ## ID System
//!
//! Every node is addressed by a `u32` newtype:
//! - [`PoiId`] rendered as `p3`
//! - [`SensorId`] rendered as `i12`
//! - [`SinkId`] rendered as `s0`
//!
//! The rendered form is presentation only; [`NodeId`] is the tagged identity
//! used wherever nodes of different kinds share a collection.
//!
//! ## Modules
//!
//! - [`instance`] - The [`Instance`] graph, accessors and active-sensor filtering
//! - [`format`] - The `KCMC;...;END` serialized format
//! - [`reduction`] - Multi-sink to single-sink expansion
//! - [`external`] - Collaborator seams (topology regeneration, heuristics)
//! - [`graph_utils`] - Topological statistics over a petgraph view
//! - [`diagnostics`] - Warnings collected while parsing

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod diagnostics;
pub mod error;
pub mod external;
pub mod format;
pub mod graph_utils;
pub mod instance;
pub mod reduction;

pub use diagnostics::{DiagnosticIssue, Diagnostics, IssueKind, Severity};
pub use error::{
    FormatError, InstanceError, KcmcError, KcmcResult, PreprocessingError, ReductionError,
    StageError, TopologyRegenerationError,
};
pub use external::{HeuristicPreprocessor, HeuristicResult, PreprocessingReport, TopologySource};
pub use format::{InstanceParser, LooseAcceptance};
pub use graph_utils::*;
pub use instance::{Instance, InstanceKey};
pub use reduction::SinkExpansion;

// Newtype wrappers for IDs for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoiId(u32);
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorId(u32);
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SinkId(u32);

impl PoiId {
    #[inline]
    pub fn new(value: u32) -> Self {
        PoiId(value)
    }
    #[inline]
    pub fn value(&self) -> u32 {
        self.0
    }
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl SensorId {
    #[inline]
    pub fn new(value: u32) -> Self {
        SensorId(value)
    }
    #[inline]
    pub fn value(&self) -> u32 {
        self.0
    }
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl SinkId {
    #[inline]
    pub fn new(value: u32) -> Self {
        SinkId(value)
    }
    #[inline]
    pub fn value(&self) -> u32 {
        self.0
    }
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PoiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// The three disjoint id spaces of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Poi,
    Sensor,
    Sink,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Poi => write!(f, "POI"),
            NodeKind::Sensor => write!(f, "sensor"),
            NodeKind::Sink => write!(f, "sink"),
        }
    }
}

/// Tagged node identity, used where nodes of different kinds share a collection
/// (flow arcs, petgraph node weights).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeId {
    Poi(PoiId),
    Sensor(SensorId),
    Sink(SinkId),
}

impl NodeId {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeId::Poi(_) => NodeKind::Poi,
            NodeId::Sensor(_) => NodeKind::Sensor,
            NodeId::Sink(_) => NodeKind::Sink,
        }
    }

    pub fn as_sensor(&self) -> Option<SensorId> {
        match self {
            NodeId::Sensor(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<PoiId> for NodeId {
    fn from(id: PoiId) -> Self {
        NodeId::Poi(id)
    }
}

impl From<SensorId> for NodeId {
    fn from(id: SensorId) -> Self {
        NodeId::Sensor(id)
    }
}

impl From<SinkId> for NodeId {
    fn from(id: SinkId) -> Self {
        NodeId::Sink(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Poi(id) => id.fmt(f),
            NodeId::Sensor(id) => id.fmt(f),
            NodeId::Sink(id) => id.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_render_with_kind_prefix() {
        assert_eq!(NodeId::from(PoiId::new(3)).to_string(), "p3");
        assert_eq!(NodeId::from(SensorId::new(12)).to_string(), "i12");
        assert_eq!(NodeId::from(SinkId::new(0)).to_string(), "s0");
    }

    #[test]
    fn node_ids_of_different_kinds_never_collide() {
        let poi = NodeId::from(PoiId::new(1));
        let sensor = NodeId::from(SensorId::new(1));
        assert_ne!(poi, sensor);
        assert_eq!(sensor.as_sensor(), Some(SensorId::new(1)));
        assert_eq!(poi.as_sensor(), None);
        assert_eq!(poi.kind(), NodeKind::Poi);
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&SensorId::new(7)).unwrap();
        assert_eq!(json, "7");
    }
}
