use crate::distribution::Distribution;
use crate::utils::f64::F64;

/// The value stored in a single cell.
///
/// A metric's cells are all expected to carry the same variant, fixed at the metric's
/// declaration; this type itself does not enforce that, callers (`Metric`) do.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(F64),
    Str(String),
    Dist(Distribution),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(v.value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_distribution(&self) -> Option<&Distribution> {
        match self {
            Value::Dist(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_distribution_mut(&mut self) -> Option<&mut Distribution> {
        match self {
            Value::Dist(v) => Some(v),
            _ => None,
        }
    }

    /// True if `other` carries the same variant as `self`, irrespective of the value it holds.
    pub fn same_variant(&self, other: &Value) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Resets the value to its variant's zero value in place. For a distribution this clears
    /// the recorded samples but keeps the bucketer.
    pub fn reset(&mut self) {
        match self {
            Value::Bool(v) => *v = false,
            Value::Int(v) => *v = 0,
            Value::Float(v) => *v = F64::from(0.0),
            Value::Str(v) => v.clear(),
            Value::Dist(v) => v.clear(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(F64::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Distribution> for Value {
    fn from(v: Distribution) -> Self {
        Value::Dist(v)
    }
}
