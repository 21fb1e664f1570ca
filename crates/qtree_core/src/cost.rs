use std::fmt::Debug;

use qtree_error::Result;

/// Estimated cost of producing rows from a from-table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub cost: f64,
    pub rows: f64,
    /// Whether the source can be opened more than once, e.g. as the inner side
    /// of a nested loop join.
    pub supports_multiple_instantiation: bool,
}

impl CostEstimate {
    pub const fn zero() -> Self {
        CostEstimate {
            cost: 0.0,
            rows: 0.0,
            supports_multiple_instantiation: true,
        }
    }
}

/// Access path handed to the estimator.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessPath<'a> {
    TableScan {
        schema: &'a str,
        table: &'a str,
        /// Number of restrictions pushed into the scan.
        restrictions: usize,
    },
    TableFunction {
        schema: &'a str,
        name: &'a str,
    },
}

/// External cost model.
///
/// Only consulted for estimates, the search over access paths happens
/// elsewhere.
pub trait CostEstimator: Debug {
    fn estimate(&self, path: &AccessPath<'_>, outer_rows: f64) -> Result<CostEstimate>;
}

/// Estimator returning the same row count for every path.
#[derive(Debug, Clone, Copy)]
pub struct FixedCostEstimator {
    pub rows: f64,
    pub cost_per_row: f64,
}

impl Default for FixedCostEstimator {
    fn default() -> Self {
        FixedCostEstimator {
            rows: 1000.0,
            cost_per_row: 1.0,
        }
    }
}

impl CostEstimator for FixedCostEstimator {
    fn estimate(&self, path: &AccessPath<'_>, outer_rows: f64) -> Result<CostEstimate> {
        let outer_rows = outer_rows.max(1.0);
        match path {
            AccessPath::TableScan { restrictions, .. } => {
                // Each restriction filters out half of the rows.
                let rows = self.rows / 2_f64.powi(*restrictions as i32);
                Ok(CostEstimate {
                    cost: self.rows * self.cost_per_row * outer_rows,
                    rows,
                    supports_multiple_instantiation: true,
                })
            }
            AccessPath::TableFunction { .. } => Ok(CostEstimate {
                cost: self.rows * self.cost_per_row * outer_rows,
                rows: self.rows,
                supports_multiple_instantiation: false,
            }),
        }
    }
}
