//! Core data structures shared by probes, the sampler, and the orchestrator.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scalar value produced by a probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FingerprintValue {
    Flag(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

// Floats compare by bit pattern so that repeated samples (including NaN)
// collapse into a single distinct value when they are byte-identical.
impl PartialEq for FingerprintValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Flag(a), Self::Flag(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for FingerprintValue {}

impl Hash for FingerprintValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Flag(value) => value.hash(state),
            Self::Integer(value) => value.hash(state),
            Self::Float(value) => value.to_bits().hash(state),
            Self::Text(value) => value.hash(state),
        }
    }
}

impl fmt::Display for FingerprintValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<bool> for FingerprintValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<i64> for FingerprintValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u32> for FingerprintValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i32> for FingerprintValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FingerprintValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for FingerprintValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FingerprintValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Reason a probe could not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ProbeFault {
    #[error("unsupported")]
    Unsupported,
    #[error("permission denied")]
    PermissionDenied,
    #[error("timed out")]
    Timeout,
    #[error("failed: {0}")]
    Failed(String),
    #[error("empty")]
    Empty,
}

impl ProbeFault {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    /// Stable label used for metrics and log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unsupported => "unsupported",
            Self::PermissionDenied => "permission_denied",
            Self::Timeout => "timeout",
            Self::Failed(_) => "failed",
            Self::Empty => "empty",
        }
    }
}

/// Tagged outcome of one probe: either a value or the fault that replaced it.
///
/// Values serialize as bare JSON scalars, faults as `{"status": ...}` objects,
/// so the receiving service can tell them apart without string sniffing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reading {
    Value(FingerprintValue),
    Fault(ProbeFault),
}

impl Reading {
    pub fn value(value: impl Into<FingerprintValue>) -> Self {
        Self::Value(value.into())
    }

    pub fn fault(fault: ProbeFault) -> Self {
        Self::Fault(fault)
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    pub fn as_value(&self) -> Option<&FingerprintValue> {
        match self {
            Self::Value(value) => Some(value),
            Self::Fault(_) => None,
        }
    }

    pub fn as_fault(&self) -> Option<&ProbeFault> {
        match self {
            Self::Value(_) => None,
            Self::Fault(fault) => Some(fault),
        }
    }

    /// Label for metrics: `"value"` or the fault kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Fault(fault) => fault.kind(),
        }
    }
}

impl<T: Into<FingerprintValue>> From<Result<T, ProbeFault>> for Reading {
    fn from(result: Result<T, ProbeFault>) -> Self {
        match result {
            Ok(value) => Self::Value(value.into()),
            Err(fault) => Self::Fault(fault),
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => value.fmt(f),
            Self::Fault(fault) => write!(f, "<{fault}>"),
        }
    }
}

/// Execution class of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    /// Runs to completion synchronously during the first phase.
    Immediate,
    /// Suspends at least once; bounded by a timeout guard.
    Suspending,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn values_serialize_as_bare_scalars() {
        assert_eq!(serde_json::to_value(Reading::value(24_i64)).unwrap(), json!(24));
        assert_eq!(serde_json::to_value(Reading::value(true)).unwrap(), json!(true));
        assert_eq!(
            serde_json::to_value(Reading::value("1920x1080")).unwrap(),
            json!("1920x1080")
        );
    }

    #[test]
    fn faults_serialize_as_status_objects() {
        assert_eq!(
            serde_json::to_value(Reading::fault(ProbeFault::Timeout)).unwrap(),
            json!({"status": "timeout"})
        );
        assert_eq!(
            serde_json::to_value(Reading::fault(ProbeFault::failed("boom"))).unwrap(),
            json!({"status": "failed", "reason": "boom"})
        );
    }

    #[test]
    fn fault_objects_deserialize_back_into_faults() {
        let reading: Reading =
            serde_json::from_value(json!({"status": "permission_denied"})).unwrap();
        assert_eq!(reading, Reading::fault(ProbeFault::PermissionDenied));

        let reading: Reading = serde_json::from_value(json!(3)).unwrap();
        assert_eq!(reading, Reading::value(3_i64));
    }

    #[test]
    fn nan_floats_are_equal_to_themselves() {
        let a = FingerprintValue::Float(f64::NAN);
        assert_eq!(a.clone(), a);
        assert_ne!(FingerprintValue::Float(1.0), FingerprintValue::Integer(1));
    }
}
