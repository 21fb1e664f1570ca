use std::fmt;

use super::Expression;
use crate::types::DataType;

/// Call to a catalog function.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarFunctionExpr {
    pub schema: String,
    pub name: String,
    pub inputs: Vec<Expression>,
    /// Returns the same result for the same inputs within a statement.
    pub deterministic: bool,
    pub datatype: DataType,
}

impl fmt::Display for ScalarFunctionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (idx, input) in self.inputs.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{input}")?;
        }
        write!(f, ")")
    }
}
