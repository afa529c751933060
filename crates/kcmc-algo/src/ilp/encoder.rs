//! Single builder for both flow formulations.
//!
//! The formulations differ only in commodity granularity. An aggregate
//! commodity ships `m` units per POI through one copy of the network; a
//! layered commodity ships one unit through each of `m` copies, and the
//! disjunction rows keep those copies sensor-disjoint.

use super::model::{ConstraintFamily, ConstraintSense, LinearExpr, MipModel, VarId, VariableSpec};
use kcmc_core::{Instance, NodeId, PoiId, SensorId, SinkExpansion, SinkId};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// How the `m` required paths are modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommodityShape {
    /// One commodity of magnitude `m` per POI
    Aggregate,
    /// `m` unit commodities per POI, one per layer
    Layered,
}

impl CommodityShape {
    pub fn layers(&self, m: u32) -> u32 {
        match self {
            CommodityShape::Aggregate => 1,
            CommodityShape::Layered => m,
        }
    }

    pub fn magnitude(&self, m: u32) -> f64 {
        match self {
            CommodityShape::Aggregate => m as f64,
            CommodityShape::Layered => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Formulation {
    SingleFlow,
    MultiFlow,
}

impl Formulation {
    pub fn shape(&self) -> CommodityShape {
        match self {
            Formulation::SingleFlow => CommodityShape::Aggregate,
            Formulation::MultiFlow => CommodityShape::Layered,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Formulation::SingleFlow => "single-flow",
            Formulation::MultiFlow => "multi-flow",
        }
    }

    pub fn available() -> &'static [&'static str] {
        &["single-flow", "multi-flow"]
    }
}

impl fmt::Display for Formulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Formulation {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().replace('_', "-").as_str() {
            "single-flow" | "single" => Ok(Formulation::SingleFlow),
            "multi-flow" | "multi" => Ok(Formulation::MultiFlow),
            other => Err(anyhow::anyhow!(
                "unknown formulation '{}'; supported values: {}",
                other,
                Formulation::available().join(", ")
            )),
        }
    }
}

impl Serialize for Formulation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Coverage level, path count and flow variable domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncodeParams {
    pub k: u32,
    pub m: u32,
    /// Binary flow variables instead of continuous non-negative ones
    pub y_binary: bool,
}

impl Default for EncodeParams {
    fn default() -> Self {
        Self {
            k: 1,
            m: 1,
            y_binary: false,
        }
    }
}

/// Preconditions that reject an encoding before any variable is created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("M must be at least 1")]
    ZeroPaths,

    #[error("K ({k}) must be at least M ({m})")]
    CoverageBelowPaths { k: u32, m: u32 },

    #[error("flow formulations need exactly one sink, instance has {sinks}; reduce it first")]
    NotSingleSink { sinks: u32 },

    #[error("instance declares no POIs")]
    NoPois,

    #[error("no active sensor links to the sink")]
    SinkUnreachable,

    #[error("instance was reduced with {multiplicity} virtual sinks per sink but M is {m}")]
    InsufficientMultiplicity { multiplicity: u32, m: u32 },
}

impl EncodeError {
    /// Rejections that already prove the instance infeasible for these
    /// parameters, as opposed to caller mistakes.
    pub fn proves_infeasible(&self) -> bool {
        matches!(self, EncodeError::SinkUnreachable)
    }
}

/// Wall-clock spent in each construction phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EncodingTimings {
    #[serde(serialize_with = "as_secs")]
    pub model: Duration,
    #[serde(serialize_with = "as_secs")]
    pub x_variables: Duration,
    #[serde(serialize_with = "as_secs")]
    pub y_variables: Duration,
    #[serde(serialize_with = "as_secs")]
    pub objective: Duration,
    #[serde(serialize_with = "as_secs")]
    pub constraints: Duration,
}

pub(crate) fn as_secs<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

/// An installation decision variable `x_{i,l}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallVar {
    pub sensor: SensorId,
    pub layer: u32,
    pub var: VarId,
}

/// Encoded model plus the bookkeeping needed to read a solution back.
#[derive(Debug, Clone)]
pub struct EncodedModel {
    pub(crate) formulation: Formulation,
    pub(crate) params: EncodeParams,
    pub(crate) model: MipModel,
    pub(crate) install: Vec<InstallVar>,
    /// Flow variables on sensor→sink arcs, across every commodity
    pub(crate) sink_arcs: Vec<(SensorId, VarId)>,
    pub(crate) num_pois: u32,
    /// Size of the sensor id space before any sink reduction
    pub(crate) original_sensors: u32,
    pub(crate) expansion: Option<SinkExpansion>,
    pub(crate) timings: EncodingTimings,
}

impl EncodedModel {
    pub fn model(&self) -> &MipModel {
        &self.model
    }

    pub fn formulation(&self) -> Formulation {
        self.formulation
    }

    pub fn params(&self) -> &EncodeParams {
        &self.params
    }

    pub fn timings(&self) -> &EncodingTimings {
        &self.timings
    }

    pub fn install_vars(&self) -> &[InstallVar] {
        &self.install
    }

    pub fn install_var(&self, sensor: SensorId, layer: u32) -> Option<VarId> {
        self.install
            .iter()
            .find(|x| x.sensor == sensor && x.layer == layer)
            .map(|x| x.var)
    }

    /// Virtual sinks are modelled as sensors but are not real hardware.
    pub fn is_virtual(&self, sensor: SensorId) -> bool {
        self.expansion
            .as_ref()
            .is_some_and(|expansion| expansion.is_virtual(sensor))
    }
}

#[derive(Debug, Clone, Copy)]
enum Arc {
    Source(PoiId, SensorId),
    Relay(SensorId, SensorId),
    Sink(SensorId, SinkId),
}

impl Arc {
    fn endpoints(&self) -> (NodeId, NodeId) {
        match *self {
            Arc::Source(p, i) => (p.into(), i.into()),
            Arc::Relay(i, j) => (i.into(), j.into()),
            Arc::Sink(i, s) => (i.into(), s.into()),
        }
    }
}

fn check_preconditions(instance: &Instance, params: &EncodeParams) -> Result<(), EncodeError> {
    let EncodeParams { k, m, .. } = *params;
    if m == 0 {
        return Err(EncodeError::ZeroPaths);
    }
    if k < m {
        return Err(EncodeError::CoverageBelowPaths { k, m });
    }
    if !instance.is_single_sink() {
        return Err(EncodeError::NotSingleSink {
            sinks: instance.num_sinks(),
        });
    }
    if instance.num_pois() == 0 {
        return Err(EncodeError::NoPois);
    }
    if let Some(expansion) = instance.expansion() {
        if expansion.multiplicity() < m {
            return Err(EncodeError::InsufficientMultiplicity {
                multiplicity: expansion.multiplicity(),
                m,
            });
        }
    }
    if instance.sink_edges().is_empty() {
        return Err(EncodeError::SinkUnreachable);
    }
    Ok(())
}

/// Builds the minimum-sensor model for `(k, m)` on a single-sink instance.
///
/// Index sets: every declared POI, every active sensor with at least one
/// edge, and sink 0. POIs without covering sensors stay in the model and make
/// it infeasible through constant rows.
pub fn encode(
    instance: &Instance,
    formulation: Formulation,
    params: &EncodeParams,
) -> Result<EncodedModel, EncodeError> {
    check_preconditions(instance, params)?;
    let start = Instant::now();
    let shape = formulation.shape();
    let layers = shape.layers(params.m);
    let magnitude = shape.magnitude(params.m);
    let layered = shape == CommodityShape::Layered;
    let expansion = instance.expansion().cloned();
    let is_virtual =
        |i: SensorId| expansion.as_ref().is_some_and(|expansion| expansion.is_virtual(i));

    let pois: Vec<PoiId> = (0..instance.num_pois()).map(PoiId::new).collect();
    let sensors = instance.sensors();
    let sink = SinkId::new(0);
    let mut model = MipModel::new(format!(
        "kcmc_{}_k{}_m{}",
        formulation.as_str().replace('-', "_"),
        params.k,
        params.m
    ));
    let mut timings = EncodingTimings::default();

    // x_{i,l}
    let phase = Instant::now();
    let mut install = Vec::with_capacity(sensors.len() * layers as usize);
    let mut x: BTreeMap<(SensorId, u32), VarId> = BTreeMap::new();
    for &i in &sensors {
        for l in 0..layers {
            let name = if layered {
                format!("x[{i},l{l}]")
            } else {
                format!("x[{i}]")
            };
            let var = model.add_variable(VariableSpec::binary(name));
            x.insert((i, l), var);
            install.push(InstallVar {
                sensor: i,
                layer: l,
                var,
            });
        }
    }
    timings.x_variables = phase.elapsed();
    let x_of = |i: SensorId, l: u32| x.get(&(i, l)).copied();

    // Arcs shared by every commodity; source arcs depend on the POI.
    let mut shared_arcs = Vec::new();
    for &i in &sensors {
        for &j in instance.communication_neighbors(i) {
            shared_arcs.push(Arc::Relay(i, j));
        }
        if instance.sink_links(i).contains(&sink) {
            shared_arcs.push(Arc::Sink(i, sink));
        }
    }

    // y_{(u,v),p,l}
    let phase = Instant::now();
    let mut flows: Vec<(PoiId, u32, Vec<(Arc, VarId)>)> = Vec::new();
    let mut sink_arcs = Vec::new();
    for &p in &pois {
        let source_arcs = instance
            .covering_sensors(p)
            .iter()
            .map(|&i| Arc::Source(p, i));
        let arcs: Vec<Arc> = source_arcs.chain(shared_arcs.iter().copied()).collect();
        for l in 0..layers {
            let vars = arcs
                .iter()
                .map(|arc| {
                    let (u, v) = arc.endpoints();
                    let name = if layered {
                        format!("y[{u}>{v},{p},l{l}]")
                    } else {
                        format!("y[{u}>{v},{p}]")
                    };
                    let spec = if params.y_binary {
                        VariableSpec::binary(name)
                    } else {
                        VariableSpec::non_negative(name)
                    };
                    let var = model.add_variable(spec);
                    if let Arc::Sink(i, _) = arc {
                        sink_arcs.push((*i, var));
                    }
                    (*arc, var)
                })
                .collect();
            flows.push((p, l, vars));
        }
    }
    timings.y_variables = phase.elapsed();

    let phase = Instant::now();
    let objective = LinearExpr::sum(
        install
            .iter()
            .filter(|x| !is_virtual(x.sensor))
            .map(|x| x.var),
    );
    model.set_objective(objective);
    timings.objective = phase.elapsed();

    let phase = Instant::now();
    for &p in &pois {
        let covered = LinearExpr::sum(
            instance
                .covering_sensors(p)
                .iter()
                .flat_map(|&i| (0..layers).filter_map(move |l| x_of(i, l))),
        );
        model.add_constraint(
            ConstraintFamily::Coverage,
            format!("coverage[{p}]"),
            covered,
            ConstraintSense::GreaterEq,
            params.k as f64,
        );
    }

    if layered {
        for &i in &sensors {
            let layers_of_i = LinearExpr::sum((0..layers).filter_map(|l| x_of(i, l)));
            model.add_constraint(
                ConstraintFamily::Disjunction,
                format!("disjunction[{i}]"),
                layers_of_i,
                ConstraintSense::LessEq,
                1.0,
            );
        }
    }

    for (p, l, arcs) in &flows {
        let suffix = if layered {
            format!("{p},l{l}")
        } else {
            p.to_string()
        };
        let mut source = LinearExpr::new();
        let mut sink_in = LinearExpr::new();
        let mut net_out: BTreeMap<SensorId, LinearExpr> =
            sensors.iter().map(|&i| (i, LinearExpr::new())).collect();
        let mut out_of: BTreeMap<SensorId, LinearExpr> = BTreeMap::new();

        for &(arc, var) in arcs {
            match arc {
                Arc::Source(_, i) => {
                    source.add_term(var, 1.0);
                    net_out.entry(i).or_default().add_term(var, -1.0);
                }
                Arc::Relay(i, j) => {
                    net_out.entry(i).or_default().add_term(var, 1.0);
                    net_out.entry(j).or_default().add_term(var, -1.0);
                    out_of.entry(i).or_default().add_term(var, 1.0);
                }
                Arc::Sink(i, _) => {
                    sink_in.add_term(var, 1.0);
                    net_out.entry(i).or_default().add_term(var, 1.0);
                    out_of.entry(i).or_default().add_term(var, 1.0);
                }
            }
        }

        model.add_constraint(
            ConstraintFamily::FlowSource,
            format!("flow_source[{suffix}]"),
            source,
            ConstraintSense::Equal,
            magnitude,
        );
        for (i, expr) in net_out {
            model.add_constraint(
                ConstraintFamily::FlowSensor,
                format!("flow_sensor[{i},{suffix}]"),
                expr,
                ConstraintSense::Equal,
                0.0,
            );
        }
        model.add_constraint(
            ConstraintFamily::FlowSink,
            format!("flow_sink[{suffix}]"),
            sink_in,
            ConstraintSense::Equal,
            magnitude,
        );
        for &i in &sensors {
            let Some(x_il) = x_of(i, *l) else {
                continue;
            };
            let bound = out_of.remove(&i).unwrap_or_default().with_term(x_il, -1.0);
            model.add_constraint(
                ConstraintFamily::Projection,
                format!("projection[{i},{suffix}]"),
                bound,
                ConstraintSense::LessEq,
                0.0,
            );
        }
    }
    timings.constraints = phase.elapsed();
    timings.model = start.elapsed();

    let size = model.size();
    debug!(
        formulation = %formulation,
        k = params.k,
        m = params.m,
        pois = pois.len(),
        sensors = sensors.len(),
        variables = size.variables,
        binary_variables = size.binary_variables,
        constraints = size.constraints,
        elapsed_ms = timings.model.as_millis() as u64,
        "encoded ILP"
    );

    let original_sensors = expansion
        .as_ref()
        .map_or(instance.num_sensors(), |e| e.original_sensors());
    Ok(EncodedModel {
        formulation,
        params: *params,
        model,
        install,
        sink_arcs,
        num_pois: instance.num_pois(),
        original_sensors,
        expansion,
        timings,
    })
}
