use qtree_error::{DbError, Result, SqlState};

use crate::cost::{CostEstimate, CostEstimator};
use crate::expr::Expression;
use crate::expr::column_expr::VirtualColumnExpr;
use crate::predicate::PredicateList;
use crate::rcl::{ColumnArena, ResultColumn, ResultColumnList};
use crate::resultset::ResultSetNode;
use crate::table_map::TableNumber;

/// A derived table, `(SELECT ...) AS alias`.
#[derive(Debug, Clone, PartialEq)]
pub struct FromSubquery {
    pub table_number: TableNumber,
    pub correlation_name: String,
    pub level: usize,
    pub subquery: ResultSetNode,
    /// One virtual column per visible column of the subquery.
    pub result_columns: ResultColumnList,
    /// Predicates evaluated against the derived rows. They reference the
    /// columns of this table, not the columns inside the subquery.
    pub restriction: PredicateList,
}

impl FromSubquery {
    /// Wrap a bound query block, optionally renaming its columns.
    pub fn new(
        arena: &mut ColumnArena,
        subquery: ResultSetNode,
        correlation_name: String,
        column_names: Option<&[String]>,
        table_number: TableNumber,
        level: usize,
    ) -> Result<Self> {
        let visible: Vec<_> = subquery.result_columns().visible_columns(arena).collect();
        let columns = visible
            .into_iter()
            .map(|source| {
                let column = &arena[source];
                let rc = ResultColumn::new(
                    column.name.clone(),
                    Expression::VirtualColumn(VirtualColumnExpr {
                        source_table: None,
                        source,
                        datatype: column.datatype,
                        correlated: false,
                    }),
                );
                arena.push(rc)
            })
            .collect();

        let result_columns = ResultColumnList::from_columns(arena, columns);
        if let Some(names) = column_names {
            result_columns.set_column_names(arena, names)?;
        }

        Ok(FromSubquery {
            table_number,
            correlation_name,
            level,
            subquery,
            result_columns,
            restriction: PredicateList::new(),
        })
    }

    pub fn check_updatable(&self) -> Result<()> {
        Err(DbError::new(format!(
            "Derived table '{}' is not updatable",
            self.correlation_name
        ))
        .with_sql_state(SqlState::NotUpdatable))
    }

    pub fn decrement_level(&mut self, arena: &mut ColumnArena, level: usize) {
        self.subquery.decrement_level(arena, level);
        self.restriction.decrement_level(arena, level);
        if self.level >= level && self.level > 0 {
            self.level -= 1;
        }
    }

    pub fn estimate_cost(
        &self,
        estimator: &dyn CostEstimator,
        outer_rows: f64,
    ) -> Result<CostEstimate> {
        self.subquery.estimate_cost(estimator, outer_rows)
    }
}
