use std::fmt;

use super::Expression;
use crate::types::DataType;

#[derive(Debug, Clone, PartialEq)]
pub struct NotExpr {
    pub expr: Box<Expression>,
}

impl NotExpr {
    pub fn datatype(&self) -> DataType {
        DataType::boolean().with_nullable(self.expr.datatype().nullable)
    }
}

impl fmt::Display for NotExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NOT {}", self.expr)
    }
}

/// `expr IS [NOT] NULL`
#[derive(Debug, Clone, PartialEq)]
pub struct IsNullExpr {
    pub expr: Box<Expression>,
    pub negated: bool,
}

impl IsNullExpr {
    pub fn datatype(&self) -> DataType {
        DataType::boolean().with_nullable(false)
    }
}

impl fmt::Display for IsNullExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "{} IS NOT NULL", self.expr)
        } else {
            write!(f, "{} IS NULL", self.expr)
        }
    }
}
