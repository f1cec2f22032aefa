//! The metric record shared by both sides of the pipeline.
//!
//! On the wire a metric is the two-optional-field JSON shape
//! (`value` for gauges, `delta` for counters); in code the payload is the
//! tagged [`MetricValue`] so that the "exactly one of value/delta, selected
//! by kind" invariant is checked once at the boundary and never again.

use crate::proto;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Gauge => write!(f, "gauge"),
            MetricKind::Counter => write!(f, "counter"),
        }
    }
}

impl std::str::FromStr for MetricKind {
    type Err = InvalidMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            _ => Err(InvalidMetric::UnknownKind(s.to_string())),
        }
    }
}

/// The typed payload of a validated metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Gauge(v) => write!(f, "{v}"),
            MetricValue::Counter(d) => write!(f, "{d}"),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidMetric {
    #[error("metric id is required")]
    MissingId,
    #[error("unknown metric kind: {0}")]
    UnknownKind(String),
    #[error("value is required for gauge")]
    MissingValue,
    #[error("delta is required for counter")]
    MissingDelta,
    #[error("exactly one of value/delta must be set")]
    AmbiguousPayload,
}

/// A metric record in its wire shape.
///
/// `delta` is present iff `kind` is counter, `value` iff gauge; [`Metric::payload`]
/// enforces this. `hash` carries an optional HMAC-SHA256 signature of the
/// serialized body and is never interpreted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
            hash: None,
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
            hash: None,
        }
    }

    /// Validates the record and returns its typed payload.
    pub fn payload(&self) -> Result<MetricValue, InvalidMetric> {
        if self.id.is_empty() {
            return Err(InvalidMetric::MissingId);
        }
        match self.kind {
            MetricKind::Gauge => match (self.value, self.delta) {
                (Some(v), None) => Ok(MetricValue::Gauge(v)),
                (None, _) => Err(InvalidMetric::MissingValue),
                (Some(_), Some(_)) => Err(InvalidMetric::AmbiguousPayload),
            },
            MetricKind::Counter => match (self.delta, self.value) {
                (Some(d), None) => Ok(MetricValue::Counter(d)),
                (None, _) => Err(InvalidMetric::MissingDelta),
                (Some(_), Some(_)) => Err(InvalidMetric::AmbiguousPayload),
            },
        }
    }

    /// Replaces the payload with the given value, keeping id and kind.
    pub fn set_payload(&mut self, value: MetricValue) {
        match value {
            MetricValue::Gauge(v) => {
                self.value = Some(v);
                self.delta = None;
            }
            MetricValue::Counter(d) => {
                self.delta = Some(d);
                self.value = None;
            }
        }
    }

    pub fn to_proto(&self) -> proto::Metric {
        let kind = match self.kind {
            MetricKind::Gauge => proto::MetricKind::Gauge,
            MetricKind::Counter => proto::MetricKind::Counter,
        };
        proto::Metric {
            id: self.id.clone(),
            kind: kind as i32,
            value: self.value.unwrap_or_default(),
            delta: self.delta.unwrap_or_default(),
        }
    }

    pub fn from_proto(m: &proto::Metric) -> Result<Self, InvalidMetric> {
        if m.id.is_empty() {
            return Err(InvalidMetric::MissingId);
        }
        match proto::MetricKind::try_from(m.kind) {
            Ok(proto::MetricKind::Gauge) => Ok(Metric::gauge(m.id.clone(), m.value)),
            Ok(proto::MetricKind::Counter) => Ok(Metric::counter(m.id.clone(), m.delta)),
            _ => Err(InvalidMetric::UnknownKind(m.kind.to_string())),
        }
    }
}
