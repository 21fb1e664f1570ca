use std::fmt;

use crate::types::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowFunction {
    RowNumber,
    Rank,
    DenseRank,
}

impl WindowFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ROW_NUMBER" => Some(Self::RowNumber),
            "RANK" => Some(Self::Rank),
            "DENSE_RANK" => Some(Self::DenseRank),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RowNumber => "ROW_NUMBER",
            Self::Rank => "RANK",
            Self::DenseRank => "DENSE_RANK",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowExpr {
    pub function: WindowFunction,
    pub datatype: DataType,
}

impl WindowExpr {
    pub fn new(function: WindowFunction) -> Self {
        WindowExpr {
            function,
            datatype: DataType::bigint().with_nullable(false),
        }
    }
}

impl fmt::Display for WindowExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}() OVER ()", self.function.as_str())
    }
}
