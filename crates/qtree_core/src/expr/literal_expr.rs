use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::DataType;

/// A constant value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    /// Untyped NULL.
    Null,
    Boolean(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Decimal {
        value: i128,
        precision: u32,
        scale: u32,
    },
    Float64(f64),
    Utf8(String),
    /// Days since the epoch.
    Date(i32),
}

impl ScalarValue {
    pub fn datatype(&self) -> DataType {
        let datatype = match self {
            Self::Null => return DataType::unknown(),
            Self::Boolean(_) => DataType::boolean(),
            Self::Int16(_) => DataType::smallint(),
            Self::Int32(_) => DataType::integer(),
            Self::Int64(_) => DataType::bigint(),
            Self::Decimal {
                precision, scale, ..
            } => DataType::decimal(*precision, *scale),
            Self::Float64(_) => DataType::double(),
            Self::Utf8(s) => DataType::char(s.chars().count() as u32),
            Self::Date(_) => DataType::date(),
        };
        datatype.with_nullable(false)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(v) => write!(f, "{}", if *v { "TRUE" } else { "FALSE" }),
            Self::Int16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Decimal { value, scale, .. } => {
                if *scale == 0 {
                    return write!(f, "{value}");
                }
                let pow = 10_i128.pow(*scale);
                let sign = if *value < 0 { "-" } else { "" };
                let abs = value.abs();
                write!(
                    f,
                    "{sign}{}.{:0width$}",
                    abs / pow,
                    abs % pow,
                    width = *scale as usize
                )
            }
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "'{v}'"),
            Self::Date(v) => write!(f, "DATE({v})"),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(value)
    }
}

impl From<i16> for ScalarValue {
    fn from(value: i16) -> Self {
        ScalarValue::Int16(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Int32(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int64(value)
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

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralExpr {
    pub literal: ScalarValue,
}

impl LiteralExpr {
    pub fn datatype(&self) -> DataType {
        self.literal.datatype()
    }
}

impl fmt::Display for LiteralExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.literal)
    }
}

/// A `?` parameter.
///
/// The type starts out unknown and is inferred from the context the parameter
/// is used in.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterExpr {
    pub index: usize,
    pub datatype: DataType,
}

impl fmt::Display for ParameterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.index)
    }
}
