use std::fmt;

use keyagg_error::{AggError, ErrorKind, Result};

/// Type identifier for a scalar value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataTypeId {
    Null,
    Boolean,
    Int64,
    Float64,
    Utf8,
}

impl fmt::Display for DataTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Null => "Null",
            Self::Boolean => "Boolean",
            Self::Int64 => "Int64",
            Self::Float64 => "Float64",
            Self::Utf8 => "Utf8",
        };
        write!(f, "{s}")
    }
}

/// A single dynamically typed value.
///
/// This is what raw text input decodes into before an accumulator converts it
/// to its own statically typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

impl ScalarValue {
    pub fn datatype(&self) -> DataTypeId {
        match self {
            Self::Null => DataTypeId::Null,
            Self::Boolean(_) => DataTypeId::Boolean,
            Self::Int64(_) => DataTypeId::Int64,
            Self::Float64(_) => DataTypeId::Float64,
            Self::Utf8(_) => DataTypeId::Utf8,
        }
    }

    /// Parse a string, inferring the most specific type.
    ///
    /// Tries integer, then float, then boolean. An empty string or `null`
    /// (any case) is Null. Everything else is kept as a string.
    pub fn parse_inferred(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("null") {
            return Self::Null;
        }
        if let Ok(v) = s.parse::<i64>() {
            return Self::Int64(v);
        }
        if let Ok(v) = s.parse::<f64>() {
            return Self::Float64(v);
        }
        match s {
            "true" | "TRUE" | "True" => Self::Boolean(true),
            "false" | "FALSE" | "False" => Self::Boolean(false),
            _ => Self::Utf8(s.to_string()),
        }
    }

    pub fn try_as_i64(&self) -> Result<i64> {
        match self {
            Self::Int64(v) => Ok(*v),
            other => Err(unexpected_type(DataTypeId::Int64, other)),
        }
    }

    pub fn try_as_usize(&self) -> Result<usize> {
        let v = self.try_as_i64()?;
        usize::try_from(v).map_err(|_| {
            AggError::new("Value cannot be represented as an unsigned integer")
                .with_kind(ErrorKind::InvalidArgument)
                .with_field("value", v)
        })
    }

    /// Get the value as a float, widening integers.
    pub fn try_as_f64(&self) -> Result<f64> {
        match self {
            Self::Float64(v) => Ok(*v),
            Self::Int64(v) => Ok(*v as f64),
            other => Err(unexpected_type(DataTypeId::Float64, other)),
        }
    }
}

fn unexpected_type(expected: DataTypeId, got: &ScalarValue) -> AggError {
    AggError::new("Unexpected scalar type")
        .with_kind(ErrorKind::InvalidArgument)
        .with_field("expected", expected)
        .with_field("got", got.datatype())
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v:?}"),
            Self::Utf8(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int64(value)
    }
}

impl From<usize> for ScalarValue {
    fn from(value: usize) -> Self {
        ScalarValue::Int64(value as i64)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float64(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Utf8(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Utf8(value)
    }
}
