//! Multi-sink to single-sink reduction.
//!
//! Each original sink `s` is replaced by `max_m` virtual sinks: sensor-like
//! nodes linked to exactly the sensors that reached `s`, each with a single
//! sink edge into the one remaining logical sink (`s0`).
//!
//! ```text
//!   i2 ── s0          i2 ── v4 ──┐
//!   i3 ── s1    ⇒     i2 ── v5 ──┤
//!                     i3 ── v6 ──┼── s0
//!                     i3 ── v7 ──┘
//! ```
//!
//! Virtual sensor ids are `num_sensors + s * max_m + c` for copy `c` of sink
//! `s`, so the original sensor id space is preserved.

use crate::error::ReductionError;
use crate::instance::{Instance, InstanceKey};
use crate::{SensorId, SinkId};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::ops::Range;

/// Bookkeeping that maps virtual sinks back to the sinks they replace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkExpansion {
    original_sensors: u32,
    original_sinks: u32,
    multiplicity: u32,
}

impl SinkExpansion {
    pub fn original_sensors(&self) -> u32 {
        self.original_sensors
    }

    pub fn original_sinks(&self) -> u32 {
        self.original_sinks
    }

    /// Virtual sinks generated per original sink (`max_m`).
    pub fn multiplicity(&self) -> u32 {
        self.multiplicity
    }

    pub fn is_virtual(&self, sensor: SensorId) -> bool {
        sensor.value() >= self.original_sensors
            && sensor.value() < self.original_sensors + self.original_sinks * self.multiplicity
    }

    /// Original sink a virtual sensor stands in for.
    pub fn origin_of(&self, sensor: SensorId) -> Option<SinkId> {
        self.is_virtual(sensor)
            .then(|| SinkId::new((sensor.value() - self.original_sensors) / self.multiplicity))
    }

    pub fn virtual_sinks_of(&self, sink: SinkId) -> impl Iterator<Item = SensorId> {
        self.id_range(sink).map(SensorId::new)
    }

    fn id_range(&self, sink: SinkId) -> Range<u32> {
        if sink.value() >= self.original_sinks {
            return 0..0;
        }
        let start = self.original_sensors + sink.value() * self.multiplicity;
        start..start + self.multiplicity
    }
}

impl Instance {
    /// Collapses a multi-sink instance into a single-sink one.
    ///
    /// Returns `self` unchanged when there is already exactly one sink.
    /// Otherwise every sensor adjacent to sink `s` becomes adjacent to each of
    /// the `max_m` virtual sinks of `s` and to no other virtual sink; the
    /// original sink edges are dropped. `max_m` caps the number of sensor-disjoint
    /// paths that may end at the same original sink, which the encoder checks
    /// against the requested `M`.
    pub fn to_single_sink(&self, max_m: u32) -> Result<Cow<'_, Instance>, ReductionError> {
        if self.is_single_sink() {
            return Ok(Cow::Borrowed(self));
        }
        if self.num_sinks() == 0 {
            return Err(ReductionError::NoSinks);
        }
        if max_m == 0 {
            return Err(ReductionError::ZeroMultiplicity);
        }

        let original_sensors = self.num_sensors();
        let original_sinks = self.num_sinks();
        let num_sensors = original_sinks
            .checked_mul(max_m)
            .and_then(|n| n.checked_add(original_sensors))
            .ok_or(ReductionError::IdOverflow {
                num_sensors: original_sensors,
                num_sinks: original_sinks,
                max_m,
            })?;

        let key = InstanceKey {
            num_sensors,
            num_sinks: 1,
            ..*self.key()
        };
        let mut reduced = Instance::empty(key, self.inactive_sensors().clone());
        let expansion = SinkExpansion {
            original_sensors,
            original_sinks,
            multiplicity: max_m,
        };

        for (poi, sensor) in self.poi_edges() {
            reduced.insert_coverage(poi, sensor);
        }
        for (a, b) in self.sensor_edges() {
            if a < b {
                reduced.insert_communication(a, b);
            }
        }
        let logical_sink = SinkId::new(0);
        for sink in (0..original_sinks).map(SinkId::new) {
            for virtual_sink in expansion.virtual_sinks_of(sink) {
                reduced.insert_sink_edge(virtual_sink, logical_sink);
                for sensor in self.sink_neighbors(sink) {
                    reduced.insert_communication(*sensor, virtual_sink);
                }
            }
        }

        tracing::debug!(
            sinks = original_sinks,
            max_m,
            virtual_sinks = original_sinks * max_m,
            "reduced instance to a single sink"
        );
        reduced.expansion = Some(expansion);
        Ok(Cow::Owned(reduced))
    }
}
