//! Attribute identifiers, their static per-target tables, and the value type
//! requests carry.
//!
//! Every attribute the crate understands is enumerated here. A request names an
//! [`AttributeId`]; the manager resolves it against the target's table before the
//! instrument is touched, so unknown names and read-only writes are rejected
//! uniformly across drivers. Values travel as [`AttributeValue`] and are coerced
//! to the table's declared kind on the way in.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Target;

/// Identifier for every attribute exposed by the managed instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeId {
    /// Identity string reported by the instrument.
    InstrumentName,
    /// Scope digitizer rate in samples per second.
    AnalogSampleRate,
    /// Whether the scope's trigger condition has been satisfied.
    Triggered,
    /// Number of points in one capture.
    RecordLength,
    /// Generator drive frequency in Hz.
    Frequency,
    /// Generator drive amplitude in volts.
    Amplitude,
    /// Generator output on/off state.
    State,
    /// Active instrument channel.
    Channel,
}

impl AttributeId {
    /// Wire name used in logs, errors, and configuration.
    pub fn name(&self) -> &'static str {
        match self {
            AttributeId::InstrumentName => "instrument_name",
            AttributeId::AnalogSampleRate => "analog_sample_rate",
            AttributeId::Triggered => "triggered",
            AttributeId::RecordLength => "record_length",
            AttributeId::Frequency => "frequency",
            AttributeId::Amplitude => "amplitude",
            AttributeId::State => "state",
            AttributeId::Channel => "channel",
        }
    }

    /// Resolves a wire name back to its identifier.
    pub fn from_name(name: &str) -> Option<AttributeId> {
        match name {
            "instrument_name" => Some(AttributeId::InstrumentName),
            "analog_sample_rate" => Some(AttributeId::AnalogSampleRate),
            "triggered" => Some(AttributeId::Triggered),
            "record_length" => Some(AttributeId::RecordLength),
            "frequency" => Some(AttributeId::Frequency),
            "amplitude" => Some(AttributeId::Amplitude),
            "state" => Some(AttributeId::State),
            "channel" => Some(AttributeId::Channel),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Named method an instrument can be asked to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodId {
    /// Computes the capture time axis from the scope's current record settings.
    FetchXData,
}

impl MethodId {
    pub fn name(&self) -> &'static str {
        match self {
            MethodId::FetchXData => "fetch_x_data",
        }
    }

    pub fn from_name(name: &str) -> Option<MethodId> {
        match name {
            "fetch_x_data" => Some(MethodId::FetchXData),
            _ => None,
        }
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Value kind an attribute carries on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Float,
    Int,
    Bool,
    Text,
}

impl AttributeKind {
    pub fn name(&self) -> &'static str {
        match self {
            AttributeKind::Float => "float",
            AttributeKind::Int => "int",
            AttributeKind::Bool => "bool",
            AttributeKind::Text => "text",
        }
    }
}

/// Access allowed for one attribute on one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeAccess {
    ReadOnly,
    ReadWrite,
}

/// One row of a per-target attribute table.
#[derive(Debug, Clone, Copy)]
pub struct AttributeSpec {
    pub id: AttributeId,
    pub kind: AttributeKind,
    pub access: AttributeAccess,
}

const SCOPE_ATTRIBUTES: &[AttributeSpec] = &[
    AttributeSpec {
        id: AttributeId::InstrumentName,
        kind: AttributeKind::Text,
        access: AttributeAccess::ReadOnly,
    },
    AttributeSpec {
        id: AttributeId::AnalogSampleRate,
        kind: AttributeKind::Float,
        access: AttributeAccess::ReadOnly,
    },
    AttributeSpec {
        id: AttributeId::Triggered,
        kind: AttributeKind::Bool,
        access: AttributeAccess::ReadOnly,
    },
    AttributeSpec {
        id: AttributeId::RecordLength,
        kind: AttributeKind::Int,
        access: AttributeAccess::ReadOnly,
    },
    AttributeSpec {
        id: AttributeId::Channel,
        kind: AttributeKind::Int,
        access: AttributeAccess::ReadWrite,
    },
];

const GENERATOR_ATTRIBUTES: &[AttributeSpec] = &[
    AttributeSpec {
        id: AttributeId::InstrumentName,
        kind: AttributeKind::Text,
        access: AttributeAccess::ReadOnly,
    },
    AttributeSpec {
        id: AttributeId::Frequency,
        kind: AttributeKind::Float,
        access: AttributeAccess::ReadWrite,
    },
    AttributeSpec {
        id: AttributeId::Amplitude,
        kind: AttributeKind::Float,
        access: AttributeAccess::ReadWrite,
    },
    AttributeSpec {
        id: AttributeId::State,
        kind: AttributeKind::Bool,
        access: AttributeAccess::ReadWrite,
    },
    AttributeSpec {
        id: AttributeId::Channel,
        kind: AttributeKind::Int,
        access: AttributeAccess::ReadWrite,
    },
];

/// Table of attributes one target understands.
pub fn attribute_table(target: Target) -> &'static [AttributeSpec] {
    match target {
        Target::Scope => SCOPE_ATTRIBUTES,
        Target::Generator => GENERATOR_ATTRIBUTES,
    }
}

/// Looks up an attribute readable on `target`.
pub fn lookup_readable(target: Target, id: AttributeId) -> Option<&'static AttributeSpec> {
    attribute_table(target).iter().find(|spec| spec.id == id)
}

/// Looks up an attribute writable on `target`. Read-only rows are invisible here,
/// so writing them reports the same fault as an unknown name.
pub fn lookup_writable(target: Target, id: AttributeId) -> Option<&'static AttributeSpec> {
    attribute_table(target)
        .iter()
        .find(|spec| spec.id == id && spec.access == AttributeAccess::ReadWrite)
}

/// Methods one target understands.
pub fn method_table(target: Target) -> &'static [MethodId] {
    match target {
        Target::Scope => &[MethodId::FetchXData],
        Target::Generator => &[],
    }
}

/// Value type for instrument attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    String(String),
    FloatArray(Vec<f64>),
}

impl AttributeValue {
    /// Interprets the value as a float, accepting ints and parseable strings.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(f) => Some(*f),
            AttributeValue::Int(i) => Some(*i as f64),
            AttributeValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Interprets the value as an integer. Floats are truncated.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(i) => Some(*i),
            AttributeValue::Float(f) => Some(*f as i64),
            AttributeValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Interprets the value as a boolean. Integers follow the usual zero/non-zero
    /// convention so SCPI-style `0`/`1` replies coerce cleanly.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            AttributeValue::Int(i) => Some(*i != 0),
            AttributeValue::String(s) => match s.trim() {
                "0" => Some(false),
                "1" => Some(true),
                other => other.parse().ok(),
            },
            _ => None,
        }
    }

    /// Interprets the value as text.
    pub fn as_string(&self) -> Option<String> {
        match self {
            AttributeValue::String(s) => Some(s.clone()),
            AttributeValue::Float(f) => Some(f.to_string()),
            AttributeValue::Int(i) => Some(i.to_string()),
            AttributeValue::Bool(b) => Some(b.to_string()),
            AttributeValue::FloatArray(_) => None,
        }
    }

    /// Borrows the sample vector when the value is an array.
    pub fn as_float_array(&self) -> Option<&[f64]> {
        match self {
            AttributeValue::FloatArray(a) => Some(a),
            _ => None,
        }
    }

    /// Coerces this value to the kind an attribute's table row requires.
    pub fn coerce_to(&self, kind: AttributeKind) -> Option<AttributeValue> {
        match kind {
            AttributeKind::Float => self.as_f64().map(AttributeValue::Float),
            AttributeKind::Int => self.as_i64().map(AttributeValue::Int),
            AttributeKind::Bool => self.as_bool().map(AttributeValue::Bool),
            AttributeKind::Text => self.as_string().map(AttributeValue::String),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Bool(v) => write!(f, "{}", v),
            AttributeValue::String(v) => write!(f, "{}", v),
            AttributeValue::FloatArray(v) => write!(f, "[{} samples]", v.len()),
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

impl From<Vec<f64>> for AttributeValue {
    fn from(v: Vec<f64>) -> Self {
        AttributeValue::FloatArray(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_coerces_to_float() {
        let value = AttributeValue::String("1.5".to_string());
        assert_eq!(value.coerce_to(AttributeKind::Float), Some(AttributeValue::Float(1.5)));
    }

    #[test]
    fn test_int_coerces_to_bool() {
        assert_eq!(AttributeValue::Int(1).as_bool(), Some(true));
        assert_eq!(AttributeValue::Int(0).as_bool(), Some(false));
        assert_eq!(AttributeValue::String("1".into()).as_bool(), Some(true));
    }

    #[test]
    fn test_array_does_not_coerce_to_scalar() {
        let value = AttributeValue::FloatArray(vec![1.0, 2.0]);
        assert_eq!(value.coerce_to(AttributeKind::Float), None);
        assert_eq!(value.coerce_to(AttributeKind::Text), None);
    }

    #[test]
    fn test_unparseable_string_fails_coercion() {
        let value = AttributeValue::String("fast".to_string());
        assert_eq!(value.coerce_to(AttributeKind::Float), None);
    }

    #[test]
    fn test_scope_table_rejects_generator_attributes() {
        assert!(lookup_readable(Target::Scope, AttributeId::Triggered).is_some());
        assert!(lookup_readable(Target::Scope, AttributeId::Frequency).is_none());
        assert!(lookup_readable(Target::Generator, AttributeId::Frequency).is_some());
    }

    #[test]
    fn test_read_only_rows_are_not_writable() {
        assert!(lookup_writable(Target::Scope, AttributeId::RecordLength).is_none());
        assert!(lookup_writable(Target::Scope, AttributeId::Channel).is_some());
        assert!(lookup_writable(Target::Generator, AttributeId::Amplitude).is_some());
    }

    #[test]
    fn test_wire_names_round_trip() {
        for table in [attribute_table(Target::Scope), attribute_table(Target::Generator)] {
            for spec in table {
                assert_eq!(AttributeId::from_name(spec.id.name()), Some(spec.id));
            }
        }
        assert_eq!(AttributeId::from_name("gain"), None);
    }
}
