//! Numeric value union used by the median.
//!
//! Promotion rules:
//!
//! - Int64 values stay Int64 when a single value is selected.
//! - The mean of two values is always Float64.
//! - If any value taking part in a computation is Float64, every value is
//!   promoted to Float64 first.

use std::cmp::Ordering;
use std::fmt;

use keyagg_error::{AggError, ErrorKind, Result};
use serde::{Serialize, Serializer};

use crate::accumulator::FromRecordValue;
use crate::scalar::ScalarValue;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericValue {
    Int64(i64),
    Float64(f64),
}

impl NumericValue {
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float64(_))
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Int64(v) => *v as f64,
            Self::Float64(v) => *v,
        }
    }

    /// Promote to Float64. No-op for values that are already Float64.
    pub fn promote_to_float(self) -> Self {
        Self::Float64(self.as_f64())
    }

    /// Total ordering over numeric values.
    ///
    /// Two Int64 values compare exactly. Anything involving a Float64
    /// compares the promoted values with `f64::total_cmp`, so NaN sorts after
    /// every other value.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int64(a), Self::Int64(b)) => a.cmp(b),
            (a, b) => a.as_f64().total_cmp(&b.as_f64()),
        }
    }

    /// Arithmetic mean of two values. Always Float64.
    pub fn midpoint(a: Self, b: Self) -> Self {
        match (a, b) {
            // Sum in i128 so the addition can't overflow.
            (Self::Int64(a), Self::Int64(b)) => Self::Float64((a as i128 + b as i128) as f64 / 2.0),
            (a, b) => Self::Float64((a.as_f64() + b.as_f64()) / 2.0),
        }
    }
}

impl fmt::Display for NumericValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v:?}"),
        }
    }
}

impl Serialize for NumericValue {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Int64(v) => serializer.serialize_i64(*v),
            Self::Float64(v) => serializer.serialize_f64(*v),
        }
    }
}

impl From<i64> for NumericValue {
    fn from(value: i64) -> Self {
        NumericValue::Int64(value)
    }
}

impl From<f64> for NumericValue {
    fn from(value: f64) -> Self {
        NumericValue::Float64(value)
    }
}

impl FromRecordValue<ScalarValue> for NumericValue {
    fn from_record_value(value: &ScalarValue) -> Result<Self> {
        match value {
            ScalarValue::Int64(v) => Ok(NumericValue::Int64(*v)),
            ScalarValue::Float64(v) => Ok(NumericValue::Float64(*v)),
            other => Err(AggError::new("Record value is not numeric")
                .with_kind(ErrorKind::ValueType)
                .with_field("datatype", other.datatype())
                .with_field("value", other)),
        }
    }
}

impl FromRecordValue<i64> for NumericValue {
    fn from_record_value(value: &i64) -> Result<Self> {
        Ok(NumericValue::Int64(*value))
    }
}

impl FromRecordValue<f64> for NumericValue {
    fn from_record_value(value: &f64) -> Result<Self> {
        Ok(NumericValue::Float64(*value))
    }
}
