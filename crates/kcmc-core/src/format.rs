//! The `KCMC;...;END` serialized instance format.
//!
//! ```text
//! KCMC;<P> <I> <S>;<AREA> <COV_R> <COMM_R>;<SEED>;
//!   PI <poi> <sensor> ...
//!   II <sensor> <sensor> ...
//!   IS <sensor> <sink> ...
//! ;END
//! ```
//!
//! Tokens are matched case-insensitively. A tag may share its section with the
//! first edge (`PI 0 0`) or stand alone (`PI;0 0;0 1`), and tag sections may
//! repeat and interleave. The legacy tags `PS`/`SS`/`SK` are upgraded when the
//! string contains a standalone `;SK;` section.
//!
//! A string without any edge records is a regeneration request: the parser
//! asks its [`TopologySource`] once for the expanded form and parses that.

use crate::diagnostics::{Diagnostics, IssueKind};
use crate::error::{FormatError, InstanceError, TopologyRegenerationError};
use crate::external::TopologySource;
use crate::instance::{Instance, InstanceKey};
use crate::{NodeKind, PoiId, SensorId, SinkId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};

/// Which declared counts may disagree with the ids that actually carry edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LooseAcceptance {
    pub pois: bool,
    pub sensors: bool,
    pub sinks: bool,
}

impl LooseAcceptance {
    pub fn strict() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            pois: true,
            sensors: true,
            sinks: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Coverage,
    Communication,
    Sink,
}

impl Tag {
    fn from_word(word: &str) -> Option<Self> {
        match word {
            "PI" => Some(Tag::Coverage),
            "II" => Some(Tag::Communication),
            "IS" => Some(Tag::Sink),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct EdgeRecord {
    tag: Tag,
    alpha: u32,
    beta: u32,
}

#[derive(Debug)]
struct RawInstance {
    key: InstanceKey,
    records: Vec<EdgeRecord>,
    legacy: bool,
}

/// Builder for parsing serialized instances.
///
/// ```rust
/// use kcmc_core::{InstanceParser, LooseAcceptance, SensorId};
/// use std::collections::BTreeSet;
///
/// let active: BTreeSet<_> = [1, 2].into_iter().map(SensorId::new).collect();
/// let instance = InstanceParser::new()
///     .loose(LooseAcceptance::all())
///     .active_sensors(active)
///     .parse("KCMC;1 3 1;10 5 5;42;PI 0 0;PI 0 1;II 0 1;II 1 2;IS 2 0;END")?;
/// assert!(!instance.is_active(SensorId::new(0)));
/// # Ok::<(), kcmc_core::InstanceError>(())
/// ```
#[derive(Default)]
pub struct InstanceParser<'a> {
    loose: LooseAcceptance,
    active: Option<BTreeSet<SensorId>>,
    inactive: BTreeSet<SensorId>,
    topology: Option<&'a dyn TopologySource>,
}

impl<'a> InstanceParser<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loose(mut self, loose: LooseAcceptance) -> Self {
        self.loose = loose;
        self
    }

    /// Keep only these sensors; every other declared sensor becomes inactive.
    pub fn active_sensors(mut self, active: BTreeSet<SensorId>) -> Self {
        self.active = Some(active);
        self
    }

    /// Mark these sensors inactive, on top of any active-set restriction.
    pub fn inactive_sensors(mut self, inactive: BTreeSet<SensorId>) -> Self {
        self.inactive = inactive;
        self
    }

    /// Collaborator used when the string carries no edges.
    pub fn topology_source(mut self, source: &'a dyn TopologySource) -> Self {
        self.topology = Some(source);
        self
    }

    pub fn parse(&self, raw: &str) -> Result<Instance, InstanceError> {
        self.parse_with_diagnostics(raw).map(|(instance, _)| instance)
    }

    /// Parses `raw`, returning the warnings that loose acceptance downgraded.
    pub fn parse_with_diagnostics(
        &self,
        raw: &str,
    ) -> Result<(Instance, Diagnostics), InstanceError> {
        let mut diagnostics = Diagnostics::new();
        let mut parsed = tokenize(raw)?;
        if parsed.records.is_empty() {
            parsed = self.regenerate(&parsed.key)?;
            diagnostics.warn(IssueKind::Regeneration, "edges obtained from the topology source");
        }
        if parsed.legacy {
            diagnostics.warn(IssueKind::Format, "legacy PS/SS/SK tags upgraded to PI/II/IS");
        }

        let inactive = self.resolve_inactive(&parsed.key);
        let instance = build(&parsed, inactive, self.loose, &mut diagnostics)?;
        debug!(
            key = %instance.key(),
            edges = instance.edge_count(),
            inactive = instance.inactive_sensors().len(),
            "parsed instance"
        );
        Ok((instance, diagnostics))
    }

    fn resolve_inactive(&self, key: &InstanceKey) -> BTreeSet<SensorId> {
        let mut inactive = self.inactive.clone();
        if let Some(active) = &self.active {
            inactive.extend(
                (0..key.num_sensors)
                    .map(SensorId::new)
                    .filter(|id| !active.contains(id)),
            );
        }
        inactive
    }

    /// One regeneration round; never recurses.
    fn regenerate(&self, key: &InstanceKey) -> Result<RawInstance, InstanceError> {
        let request = key.to_string();
        let source = self
            .topology
            .ok_or_else(|| TopologyRegenerationError::NotConfigured {
                key: request.clone(),
            })?;

        info!(key = %request, "instance carries no edges, regenerating topology");
        let expanded = source.regenerate(key)?;
        let parsed = tokenize(&expanded)?;
        if parsed.key != *key {
            return Err(TopologyRegenerationError::KeyMismatch {
                expected: request,
                found: parsed.key.to_string(),
            }
            .into());
        }
        if parsed.records.is_empty() {
            return Err(TopologyRegenerationError::EmptyTopology { key: request }.into());
        }
        Ok(parsed)
    }
}

impl Instance {
    /// Strict parse with no filter and no topology source.
    pub fn parse(raw: &str) -> Result<Instance, InstanceError> {
        InstanceParser::new().parse(raw)
    }

    /// Canonical modern-format serialization, accepted back by [`Instance::parse`].
    ///
    /// Only stored (active) edges are written; communication edges appear once
    /// with the lower id first.
    pub fn serialize(&self) -> String {
        let key = self.key();
        let mut sections = vec![
            "KCMC".to_string(),
            format!("{} {} {}", key.num_pois, key.num_sensors, key.num_sinks),
            format!(
                "{} {} {}",
                key.area_side, key.coverage_radius, key.communication_radius
            ),
            key.random_seed.to_string(),
        ];

        let coverage = self.poi_edges();
        if !coverage.is_empty() {
            sections.push("PI".to_string());
            sections.extend(
                coverage
                    .iter()
                    .map(|(poi, sensor)| format!("{} {}", poi.value(), sensor.value())),
            );
        }
        let communication: Vec<_> = self
            .sensor_edges()
            .into_iter()
            .filter(|(a, b)| a < b)
            .collect();
        if !communication.is_empty() {
            sections.push("II".to_string());
            sections.extend(
                communication
                    .iter()
                    .map(|(a, b)| format!("{} {}", a.value(), b.value())),
            );
        }
        let sink = self.sink_edges();
        if !sink.is_empty() {
            sections.push("IS".to_string());
            sections.extend(
                sink.iter()
                    .map(|(sensor, sink)| format!("{} {}", sensor.value(), sink.value())),
            );
        }
        sections.push("END".to_string());
        sections.join(";")
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

fn tokenize(raw: &str) -> Result<RawInstance, FormatError> {
    let mut text = raw.trim().to_ascii_uppercase();
    let legacy = text.split(';').any(|section| section.trim() == "SK");
    if legacy {
        text = text
            .replace("PS", "PI")
            .replace("SS", "II")
            .replace("SK", "IS");
    }

    let sections: Vec<&str> = text.split(';').map(str::trim).collect();
    if sections.len() < 2 || sections[0] != "KCMC" {
        return Err(FormatError::MissingHeader);
    }
    if sections[sections.len() - 1] != "END" {
        return Err(FormatError::MissingTerminator);
    }
    if sections.len() < 5 {
        return Err(FormatError::InvalidPreamble {
            field: "preamble",
            token: text.clone(),
        });
    }
    let key = parse_preamble(&sections[1..4])?;

    let mut records = Vec::new();
    let mut tag = None;
    for (offset, section) in sections[4..sections.len() - 1].iter().enumerate() {
        let position = offset + 4;
        for line in section.lines() {
            let mut words: Vec<&str> = line.split_whitespace().collect();
            let Some(first) = words.first().copied() else {
                continue;
            };
            if let Some(next) = Tag::from_word(first) {
                tag = Some(next);
                words.remove(0);
                if words.is_empty() {
                    continue;
                }
            } else if first.starts_with(|c: char| c.is_ascii_alphabetic()) {
                return Err(FormatError::UnknownToken {
                    position,
                    token: first.to_string(),
                });
            }

            let Some(current) = tag else {
                return Err(FormatError::UnknownToken {
                    position,
                    token: line.trim().to_string(),
                });
            };
            let malformed = || FormatError::MalformedEdge {
                position,
                token: line.trim().to_string(),
            };
            let [alpha, beta] = words.as_slice() else {
                return Err(malformed());
            };
            records.push(EdgeRecord {
                tag: current,
                alpha: alpha.parse().map_err(|_| malformed())?,
                beta: beta.parse().map_err(|_| malformed())?,
            });
        }
    }

    Ok(RawInstance {
        key,
        records,
        legacy,
    })
}

fn parse_preamble(sections: &[&str]) -> Result<InstanceKey, FormatError> {
    let counts = preamble_fields(sections[0], ["num_pois", "num_sensors", "num_sinks"], false)?;
    let geometry = preamble_fields(
        sections[1],
        ["area_side", "coverage_radius", "communication_radius"],
        true,
    )?;
    let random_seed = sections[2]
        .parse::<i64>()
        .map_err(|_| FormatError::InvalidPreamble {
            field: "random_seed",
            token: sections[2].to_string(),
        })?;

    Ok(InstanceKey {
        num_pois: counts[0],
        num_sensors: counts[1],
        num_sinks: counts[2],
        area_side: geometry[0],
        coverage_radius: geometry[1],
        communication_radius: geometry[2],
        random_seed,
    })
}

fn preamble_fields(
    section: &str,
    names: [&'static str; 3],
    positive: bool,
) -> Result<[u32; 3], FormatError> {
    let words: Vec<&str> = section.split_whitespace().collect();
    if words.len() != 3 {
        return Err(FormatError::InvalidPreamble {
            field: names[0],
            token: section.to_string(),
        });
    }
    let mut values = [0u32; 3];
    for ((value, word), field) in values.iter_mut().zip(&words).zip(names) {
        *value = word
            .parse()
            .ok()
            .filter(|v| !positive || *v > 0)
            .ok_or_else(|| FormatError::InvalidPreamble {
                field,
                token: word.to_string(),
            })?;
    }
    Ok(values)
}

fn check_range(kind: NodeKind, id: u32, limit: u32) -> Result<(), FormatError> {
    if id < limit {
        Ok(())
    } else {
        Err(FormatError::OutOfRange { kind, id, limit })
    }
}

/// Validates every record, then inserts the ones the filter admits.
fn build(
    raw: &RawInstance,
    inactive: BTreeSet<SensorId>,
    loose: LooseAcceptance,
    diagnostics: &mut Diagnostics,
) -> Result<Instance, FormatError> {
    let key = raw.key;
    for record in &raw.records {
        match record.tag {
            Tag::Coverage => {
                check_range(NodeKind::Poi, record.alpha, key.num_pois)?;
                check_range(NodeKind::Sensor, record.beta, key.num_sensors)?;
            }
            Tag::Communication => {
                if record.alpha == record.beta {
                    return Err(FormatError::SelfLoop {
                        sensor: record.alpha,
                    });
                }
                check_range(NodeKind::Sensor, record.alpha, key.num_sensors)?;
                check_range(NodeKind::Sensor, record.beta, key.num_sensors)?;
            }
            Tag::Sink => {
                check_range(NodeKind::Sensor, record.alpha, key.num_sensors)?;
                check_range(NodeKind::Sink, record.beta, key.num_sinks)?;
            }
        }
    }

    let mut instance = Instance::empty(key, inactive);
    let mut duplicates = 0usize;
    for record in &raw.records {
        let (alpha, beta) = (record.alpha, record.beta);
        let admitted = match record.tag {
            Tag::Coverage => (
                instance.is_active(SensorId::new(beta)),
                instance.insert_coverage(PoiId::new(alpha), SensorId::new(beta)),
            ),
            Tag::Communication => (
                instance.is_active(SensorId::new(alpha)) && instance.is_active(SensorId::new(beta)),
                instance.insert_communication(SensorId::new(alpha), SensorId::new(beta)),
            ),
            Tag::Sink => (
                instance.is_active(SensorId::new(alpha)),
                instance.insert_sink_edge(SensorId::new(alpha), SinkId::new(beta)),
            ),
        };
        if let (true, false) = admitted {
            duplicates += 1;
        }
    }
    if duplicates > 0 {
        diagnostics.warn(
            IssueKind::Format,
            format!("{duplicates} duplicate edge records ignored"),
        );
    }

    let active_declared = instance.num_active_sensors();
    check_count(
        NodeKind::Poi,
        key.num_pois,
        instance.pois().len() as u32,
        loose.pois,
        diagnostics,
    )?;
    check_count(
        NodeKind::Sink,
        key.num_sinks,
        instance.sinks().len() as u32,
        loose.sinks,
        diagnostics,
    )?;
    check_count(
        NodeKind::Sensor,
        active_declared,
        instance.sensors().len() as u32,
        loose.sensors,
        diagnostics,
    )?;
    Ok(instance)
}

fn check_count(
    kind: NodeKind,
    declared: u32,
    found: u32,
    loose: bool,
    diagnostics: &mut Diagnostics,
) -> Result<(), FormatError> {
    if declared == found {
        return Ok(());
    }
    if !loose {
        return Err(FormatError::CountMismatch {
            kind,
            declared,
            found,
        });
    }
    let message = format!("declared {declared} {kind}s but {found} carry edges");
    warn!("{message}");
    diagnostics.warn_about(IssueKind::Count, message, &kind.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAIN: &str = "KCMC;1 3 1;10 5 5;42;PI 0 0;PI 0 1;II 0 1;II 1 2;IS 2 0;END";

    #[test]
    fn parses_inline_tags() {
        let instance = Instance::parse(CHAIN).unwrap();
        assert_eq!(instance.num_pois(), 1);
        assert_eq!(instance.num_sensors(), 3);
        assert_eq!(instance.random_seed(), 42);
        assert_eq!(instance.key().coverage_radius, 5);
        assert_eq!(instance.edge_count(), 5);
    }

    #[test]
    fn standalone_and_inline_tags_are_equivalent() {
        let standalone = "kcmc;1 3 1;10 5 5;42;pi;0 0;0 1;ii;0 1;1 2;is;2 0;end";
        assert_eq!(
            Instance::parse(standalone).unwrap(),
            Instance::parse(CHAIN).unwrap()
        );
    }

    #[test]
    fn newline_separated_pairs_share_a_section() {
        let raw = "KCMC;1 3 1;10 5 5;42;\n  PI 0 0\n  0 1;II 0 1\n 1 2;IS 2 0\n;END";
        assert_eq!(
            Instance::parse(raw).unwrap(),
            Instance::parse(CHAIN).unwrap()
        );
    }

    #[test]
    fn legacy_tags_are_upgraded() {
        let legacy = "KCMC;1 3 1;10 5 5;42;PS;0 0;0 1;SS;0 1;1 2;SK;2 0;END";
        let (instance, diagnostics) = InstanceParser::new()
            .parse_with_diagnostics(legacy)
            .unwrap();
        assert_eq!(instance, Instance::parse(CHAIN).unwrap());
        assert_eq!(diagnostics.issues.len(), 1);
        assert_eq!(diagnostics.issues[0].kind, IssueKind::Format);
    }

    #[test]
    fn missing_markers_are_format_errors() {
        let missing_end = "KCMC;1 3 1;10 5 5;42;PI 0 0;PI 0 1;II 0 1;II 1 2;IS 2 0";
        assert_eq!(
            Instance::parse(missing_end),
            Err(InstanceError::Format(FormatError::MissingTerminator))
        );
        assert_eq!(
            Instance::parse("1 3 1;10 5 5;42;END"),
            Err(InstanceError::Format(FormatError::MissingHeader))
        );
    }

    #[test]
    fn preamble_must_be_integral_and_positive() {
        let err = Instance::parse("KCMC;1 x 1;10 5 5;42;PI 0 0;END").unwrap_err();
        assert!(matches!(
            err,
            InstanceError::Format(FormatError::InvalidPreamble { field: "num_sensors", .. })
        ));
        let err = Instance::parse("KCMC;1 3 1;10 0 5;42;PI 0 0;END").unwrap_err();
        assert!(matches!(
            err,
            InstanceError::Format(FormatError::InvalidPreamble { field: "coverage_radius", .. })
        ));
        let err = Instance::parse("KCMC;1 3 1;10 5 5;seed;PI 0 0;END").unwrap_err();
        assert!(matches!(
            err,
            InstanceError::Format(FormatError::InvalidPreamble { field: "random_seed", .. })
        ));
    }

    #[test]
    fn negative_seed_is_accepted() {
        let raw = "KCMC;1 1 1;10 5 5;-7;PI 0 0;IS 0 0;END";
        assert_eq!(Instance::parse(raw).unwrap().random_seed(), -7);
    }

    #[test]
    fn self_loop_is_rejected() {
        let raw = "KCMC;1 2 1;10 5 5;1;PI 0 0;II 1 1;IS 0 0;END";
        assert_eq!(
            Instance::parse(raw),
            Err(InstanceError::Format(FormatError::SelfLoop { sensor: 1 }))
        );
    }

    #[test]
    fn out_of_range_ids_are_rejected_even_when_filtered() {
        let raw = "KCMC;1 3 1;10 5 5;42;PI 0 0;PI 0 1;II 0 7;IS 2 0;END";
        let active = [0, 2].into_iter().map(SensorId::new).collect();
        let err = InstanceParser::new()
            .loose(LooseAcceptance::all())
            .active_sensors(active)
            .parse(raw)
            .unwrap_err();
        assert_eq!(
            err,
            InstanceError::Format(FormatError::OutOfRange {
                kind: NodeKind::Sensor,
                id: 7,
                limit: 3
            })
        );
    }

    #[test]
    fn data_before_any_tag_is_rejected() {
        let err = Instance::parse("KCMC;1 3 1;10 5 5;42;0 0;END").unwrap_err();
        assert!(matches!(
            err,
            InstanceError::Format(FormatError::UnknownToken { position: 4, .. })
        ));
        let err = Instance::parse("KCMC;1 3 1;10 5 5;42;XX 0 0;END").unwrap_err();
        assert!(matches!(
            err,
            InstanceError::Format(FormatError::UnknownToken { .. })
        ));
    }

    #[test]
    fn edges_need_exactly_two_integers() {
        let err = Instance::parse("KCMC;1 3 1;10 5 5;42;PI 0 0 1;END").unwrap_err();
        assert!(matches!(
            err,
            InstanceError::Format(FormatError::MalformedEdge { .. })
        ));
        let err = Instance::parse("KCMC;1 3 1;10 5 5;42;PI 0 -1;END").unwrap_err();
        assert!(matches!(
            err,
            InstanceError::Format(FormatError::MalformedEdge { .. })
        ));
    }

    #[test]
    fn count_mismatch_is_strict_by_default() {
        // sensor 2 has no edges
        let raw = "KCMC;1 3 1;10 5 5;42;PI 0 0;PI 0 1;II 0 1;IS 1 0;END";
        assert_eq!(
            Instance::parse(raw),
            Err(InstanceError::Format(FormatError::CountMismatch {
                kind: NodeKind::Sensor,
                declared: 3,
                found: 2
            }))
        );

        let (instance, diagnostics) = InstanceParser::new()
            .loose(LooseAcceptance {
                sensors: true,
                ..LooseAcceptance::strict()
            })
            .parse_with_diagnostics(raw)
            .unwrap();
        assert_eq!(instance.sensors().len(), 2);
        assert_eq!(diagnostics.warning_count(), 1);
    }

    #[test]
    fn filtered_sensors_do_not_count_as_missing() {
        let active = [1, 2].into_iter().map(SensorId::new).collect();
        let instance = InstanceParser::new()
            .active_sensors(active)
            .parse(CHAIN)
            .unwrap();
        assert_eq!(instance.sensors().len(), 2);
        assert_eq!(instance.inactive_sensors().len(), 1);
    }

    #[test]
    fn filtering_every_sink_neighbour_needs_loose_sinks() {
        let active = [0, 1].into_iter().map(SensorId::new).collect();
        let err = InstanceParser::new()
            .active_sensors(active)
            .parse(CHAIN)
            .unwrap_err();
        assert!(matches!(
            err,
            InstanceError::Format(FormatError::CountMismatch {
                kind: NodeKind::Sink,
                ..
            })
        ));
    }

    #[test]
    fn serialization_round_trips() {
        let instance = Instance::parse(CHAIN).unwrap();
        let text = instance.serialize();
        assert_eq!(text, "KCMC;1 3 1;10 5 5;42;PI;0 0;0 1;II;0 1;1 2;IS;2 0;END");
        assert_eq!(Instance::parse(&text).unwrap(), instance);
        assert_eq!(instance.to_string(), text);
    }

    #[test]
    fn preamble_only_without_source_is_a_regeneration_error() {
        let err = Instance::parse("KCMC;1 3 1;10 5 5;42;END").unwrap_err();
        assert!(matches!(
            err,
            InstanceError::Regeneration(TopologyRegenerationError::NotConfigured { .. })
        ));
    }

    #[test]
    fn preamble_only_is_regenerated_once() {
        let calls = std::cell::Cell::new(0);
        let source = |key: &InstanceKey| -> Result<String, TopologyRegenerationError> {
            calls.set(calls.get() + 1);
            assert_eq!(key.to_string(), "KCMC;1 3 1;10 5 5;42;END");
            Ok(CHAIN.to_string())
        };
        let active = [1, 2].into_iter().map(SensorId::new).collect();
        let instance = InstanceParser::new()
            .topology_source(&source)
            .active_sensors(active)
            .parse(" kcmc;1 3 1; 10 5 5; 42; end ")
            .unwrap();
        assert_eq!(calls.get(), 1);
        assert!(!instance.is_active(SensorId::new(0)));
        assert_eq!(instance.covering_sensors(PoiId::new(0)).len(), 1);
    }

    #[test]
    fn regeneration_rejects_empty_and_mismatched_output() {
        let empty =
            |key: &InstanceKey| -> Result<String, TopologyRegenerationError> { Ok(key.to_string()) };
        let err = InstanceParser::new()
            .topology_source(&empty)
            .parse("KCMC;1 3 1;10 5 5;42;END")
            .unwrap_err();
        assert!(matches!(
            err,
            InstanceError::Regeneration(TopologyRegenerationError::EmptyTopology { .. })
        ));

        let other = |_: &InstanceKey| -> Result<String, TopologyRegenerationError> {
            Ok(CHAIN.replace(";42;", ";43;"))
        };
        let err = InstanceParser::new()
            .topology_source(&other)
            .parse("KCMC;1 3 1;10 5 5;42;END")
            .unwrap_err();
        assert!(matches!(
            err,
            InstanceError::Regeneration(TopologyRegenerationError::KeyMismatch { .. })
        ));
    }

    #[test]
    fn generator_failures_propagate() {
        let failing = |key: &InstanceKey| -> Result<String, TopologyRegenerationError> {
            Err(TopologyRegenerationError::Generator {
                key: key.to_string(),
                message: "exit status 2".into(),
            })
        };
        let err = InstanceParser::new()
            .topology_source(&failing)
            .parse("KCMC;1 3 1;10 5 5;42;END")
            .unwrap_err();
        assert!(err.to_string().contains("exit status 2"));
    }
}
