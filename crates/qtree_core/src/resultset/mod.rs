//! Query blocks and the relational nodes wrapping them.

pub mod order_by;
pub mod project_restrict;
pub mod row;
pub mod select;
pub mod setop;

use project_restrict::ProjectRestrictNode;
use qtree_error::Result;
use row::RowResultSet;
use select::SelectNode;
use setop::SetOpNode;

use crate::cost::{CostEstimate, CostEstimator};
use crate::expr::Expression;
use crate::rcl::{ColumnArena, ResultColumnList};

#[derive(Debug, Clone, PartialEq)]
pub enum ResultSetNode {
    Select(Box<SelectNode>),
    /// Single row `VALUES` constructor.
    Row(RowResultSet),
    SetOp(Box<SetOpNode>),
    /// Projection and filter over a child, introduced by preprocessing.
    ProjectRestrict(Box<ProjectRestrictNode>),
}

impl ResultSetNode {
    pub fn result_columns(&self) -> &ResultColumnList {
        match self {
            Self::Select(select) => &select.result_columns,
            Self::Row(row) => &row.result_columns,
            Self::SetOp(setop) => &setop.result_columns,
            Self::ProjectRestrict(prn) => &prn.result_columns,
        }
    }

    pub fn result_columns_mut(&mut self) -> &mut ResultColumnList {
        match self {
            Self::Select(select) => &mut select.result_columns,
            Self::Row(row) => &mut row.result_columns,
            Self::SetOp(setop) => &mut setop.result_columns,
            Self::ProjectRestrict(prn) => &mut prn.result_columns,
        }
    }

    pub fn level(&self) -> usize {
        match self {
            Self::Select(select) => select.level,
            Self::Row(row) => row.level,
            Self::SetOp(setop) => setop.level,
            Self::ProjectRestrict(prn) => prn.level,
        }
    }

    pub fn as_select(&self) -> Option<&SelectNode> {
        match self {
            Self::Select(select) => Some(select),
            _ => None,
        }
    }

    pub fn as_select_mut(&mut self) -> Option<&mut SelectNode> {
        match self {
            Self::Select(select) => Some(select),
            _ => None,
        }
    }

    /// Adjust nesting levels after the block at `level` was merged into its
    /// parent.
    pub fn decrement_level(&mut self, arena: &mut ColumnArena, level: usize) {
        decrement_rcl_level(arena, self.result_columns(), level);
        match self {
            Self::Select(select) => select.decrement_level(arena, level),
            Self::Row(row) => {
                if row.level >= level && row.level > 0 {
                    row.level -= 1;
                }
            }
            Self::SetOp(setop) => {
                setop.left.decrement_level(arena, level);
                setop.right.decrement_level(arena, level);
                if setop.level >= level && setop.level > 0 {
                    setop.level -= 1;
                }
            }
            Self::ProjectRestrict(prn) => {
                prn.child.decrement_level(arena, level);
                prn.restriction.decrement_level(arena, level);
                if prn.level >= level && prn.level > 0 {
                    prn.level -= 1;
                }
            }
        }
    }

    /// Visit every expression in this node and below, including nested
    /// subquery blocks.
    pub fn walk_expressions<F>(&self, arena: &ColumnArena, f: &mut F)
    where
        F: FnMut(&Expression),
    {
        self.walk_expressions_limited(arena, None, f)
    }

    /// Like `walk_expressions`, only visiting the first `limit` columns of
    /// this node's result list.
    pub fn walk_expressions_limited<F>(&self, arena: &ColumnArena, limit: Option<usize>, f: &mut F)
    where
        F: FnMut(&Expression),
    {
        let limit = limit.unwrap_or(usize::MAX);
        for rc in self.result_columns().iter().take(limit) {
            arena[rc].expression.walk_deep(arena, f);
        }

        match self {
            Self::Select(select) => select.walk_clauses(arena, f),
            Self::Row(_) => (),
            Self::SetOp(setop) => {
                setop.left.walk_expressions(arena, f);
                setop.right.walk_expressions(arena, f);
            }
            Self::ProjectRestrict(prn) => {
                prn.child.walk_expressions(arena, f);
                prn.restriction.walk_expressions(arena, f);
            }
        }
    }

    /// Whether this node is known to never produce more than one row.
    pub fn returns_at_most_one_row(&self) -> bool {
        match self {
            Self::Row(_) => true,
            Self::Select(select) => {
                (select.has_aggregates && select.group_by.is_empty())
                    || select.from_list.is_empty()
            }
            Self::SetOp(_) => false,
            Self::ProjectRestrict(prn) => prn.child.returns_at_most_one_row(),
        }
    }

    pub fn estimate_cost(
        &self,
        estimator: &dyn CostEstimator,
        outer_rows: f64,
    ) -> Result<CostEstimate> {
        match self {
            Self::Select(select) => {
                let mut estimate = select.from_list.estimate_cost(estimator, outer_rows)?;
                if self.returns_at_most_one_row() {
                    estimate.rows = estimate.rows.min(1.0);
                }
                Ok(estimate)
            }
            Self::Row(_) => Ok(CostEstimate {
                rows: 1.0,
                ..CostEstimate::zero()
            }),
            Self::SetOp(setop) => {
                let left = setop.left.estimate_cost(estimator, outer_rows)?;
                let right = setop.right.estimate_cost(estimator, outer_rows)?;
                Ok(CostEstimate {
                    cost: left.cost + right.cost,
                    rows: left.rows + right.rows,
                    supports_multiple_instantiation: left.supports_multiple_instantiation
                        && right.supports_multiple_instantiation,
                })
            }
            Self::ProjectRestrict(prn) => prn.child.estimate_cost(estimator, outer_rows),
        }
    }
}

fn decrement_rcl_level(arena: &mut ColumnArena, rcl: &ResultColumnList, level: usize) {
    for rc in rcl.iter() {
        arena.with_expression_mut(rc, |expr, arena| expr.decrement_level(arena, level));
    }
}
