use std::fmt;

use super::Expression;
use crate::types::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConjunctionOperator {
    And,
    Or,
}

impl ConjunctionOperator {
    /// De Morgan dual.
    pub const fn dual(self) -> Self {
        match self {
            Self::And => Self::Or,
            Self::Or => Self::And,
        }
    }
}

impl fmt::Display for ConjunctionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
        }
    }
}

/// N-ary AND/OR.
#[derive(Debug, Clone, PartialEq)]
pub struct ConjunctionExpr {
    pub op: ConjunctionOperator,
    pub expressions: Vec<Expression>,
}

impl ConjunctionExpr {
    pub fn datatype(&self) -> DataType {
        let nullable = self.expressions.iter().any(|e| e.datatype().nullable);
        DataType::boolean().with_nullable(nullable)
    }
}

impl fmt::Display for ConjunctionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (idx, expr) in self.expressions.iter().enumerate() {
            if idx > 0 {
                write!(f, " {} ", self.op)?;
            }
            write!(f, "{expr}")?;
        }
        write!(f, ")")
    }
}
