//! Logical rewrites applied to a bound query before optimization.
//!
//! Each query block is preprocessed once, innermost first: WHERE clauses are
//! normalized into conjuncts, subqueries are flattened into their parent
//! block where that is safe, aggregates are hoisted into a dedicated column
//! list and single table predicates are pushed towards the tables they
//! reference.

mod pushdown;
mod select;
mod subquery;
mod unique;

use indexmap::IndexMap;
use qtree_error::Result;

use crate::binder::bind_context::BindOutput;
use crate::catalog::Catalog;
use crate::config::CompileConfig;
use crate::expr::Expression;
use crate::expr::subquery_expr::SubqueryOutcome;
use crate::from::FromTable;
use crate::predicate::PredicateList;
use crate::rcl::RcRef;
use crate::resultset::ResultSetNode;
use crate::table_map::TableNumber;

/// Tables and predicates pulled out of flattened subqueries, merged into the
/// enclosing block once its WHERE clause has been rewritten.
#[derive(Debug, Default)]
pub(crate) struct FlattenTarget {
    pub tables: Vec<FromTable>,
    pub predicates: PredicateList,
}

/// State shared by the preprocessing of every block in a statement.
#[derive(Debug)]
pub struct PreprocessContext<'a> {
    catalog: &'a dyn Catalog,
    config: &'a CompileConfig,
    output: BindOutput,
    outcomes: IndexMap<usize, SubqueryOutcome>,
}

impl<'a> PreprocessContext<'a> {
    pub fn new(catalog: &'a dyn Catalog, config: &'a CompileConfig, output: BindOutput) -> Self {
        PreprocessContext {
            catalog,
            config,
            output,
            outcomes: IndexMap::new(),
        }
    }

    /// Preprocess the statement's root result set and everything below it.
    pub fn preprocess_result_set(&mut self, node: &mut ResultSetNode) -> Result<()> {
        self.preprocess_node(node)?;
        node.result_columns()
            .check_virtual_column_ids(&self.output.arena)?;
        Ok(())
    }

    /// Hand back the bind output along with what happened to each subquery.
    pub fn finish(self) -> (BindOutput, IndexMap<usize, SubqueryOutcome>) {
        (self.output, self.outcomes)
    }

    pub(crate) fn preprocess_node(&mut self, node: &mut ResultSetNode) -> Result<()> {
        match node {
            ResultSetNode::Select(select) => self.preprocess_select(select),
            ResultSetNode::Row(row) => {
                let columns: Vec<_> = row.result_columns.iter().collect();
                for rc in columns {
                    self.rewrite_column_expression(rc)?;
                }
                Ok(())
            }
            ResultSetNode::SetOp(setop) => {
                self.preprocess_node(&mut setop.left)?;
                self.preprocess_node(&mut setop.right)
            }
            ResultSetNode::ProjectRestrict(prn) => self.preprocess_node(&mut prn.child),
        }
    }

    /// Preprocess every subquery in an expression that isn't a candidate for
    /// flattening.
    pub(crate) fn preprocess_expression(&mut self, mut expr: Expression) -> Result<Expression> {
        expr.for_each_child_mut(&mut |child| {
            let taken = std::mem::replace(child, Expression::null());
            *child = self.preprocess_expression(taken)?;
            Ok(())
        })?;

        match expr {
            Expression::Subquery(subquery) if !subquery.is_preprocessed() => {
                self.preprocess_subquery(subquery, None, None)
            }
            other => Ok(other),
        }
    }

    /// Preprocess the subqueries in a result column's expression.
    pub(crate) fn rewrite_column_expression(&mut self, rc: RcRef) -> Result<()> {
        let expr = self.output.arena.take_expression(rc);
        let expr = self.preprocess_expression(expr)?;
        self.output.arena.put_expression(rc, expr);
        Ok(())
    }

    fn next_table_number(&mut self) -> TableNumber {
        let table_number = TableNumber(self.output.next_table_number);
        self.output.next_table_number += 1;
        table_number
    }

    fn record_outcome(&mut self, subquery_number: usize, outcome: SubqueryOutcome) {
        tracing::debug!(subquery = subquery_number, ?outcome, "preprocessed subquery");
        self.outcomes.insert(subquery_number, outcome);
    }
}
