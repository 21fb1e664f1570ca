use qtree_error::{DbError, Result, SqlState};

use crate::catalog::RoutineDescriptor;
use crate::cost::{AccessPath, CostEstimate, CostEstimator};
use crate::expr::Expression;
use crate::expr::column_expr::BaseColumnExpr;
use crate::predicate::PredicateList;
use crate::rcl::{ColumnArena, ResultColumn, ResultColumnList};
use crate::table_map::{TableMap, TableNumber};

/// A table function invocation in a FROM list.
#[derive(Debug, Clone, PartialEq)]
pub struct FromVti {
    pub table_number: TableNumber,
    pub schema: String,
    pub name: String,
    pub correlation_name: String,
    pub level: usize,
    pub args: Vec<Expression>,
    pub deterministic: bool,
    pub result_columns: ResultColumnList,
    pub restriction: PredicateList,
    /// Tables referenced by the arguments.
    pub dependency_map: TableMap,
}

impl FromVti {
    /// Create a from-table for `routine`. Arguments must already be bound.
    pub fn new(
        arena: &mut ColumnArena,
        routine: &RoutineDescriptor,
        args: Vec<Expression>,
        correlation_name: String,
        table_number: TableNumber,
        level: usize,
    ) -> Self {
        let columns = routine
            .columns
            .iter()
            .map(|col| {
                let mut rc = ResultColumn::new(
                    col.name.clone(),
                    Expression::BaseColumn(BaseColumnExpr {
                        table_number,
                        position: col.position,
                        name: col.name.clone(),
                        datatype: col.datatype,
                    }),
                );
                rc.source_column = Some(col.clone());
                arena.push(rc)
            })
            .collect();

        let mut dependency_map = TableMap::new();
        for arg in &args {
            arg.categorize(arena, &mut dependency_map);
        }
        dependency_map.clear(table_number);

        FromVti {
            table_number,
            schema: routine.schema.clone(),
            name: routine.name.clone(),
            correlation_name,
            level,
            args,
            deterministic: routine.deterministic,
            result_columns: ResultColumnList::from_columns(arena, columns),
            restriction: PredicateList::new(),
            dependency_map,
        }
    }

    pub fn check_updatable(&self) -> Result<()> {
        Err(DbError::new(format!(
            "Table function '{}.{}' is not updatable",
            self.schema, self.name
        ))
        .with_sql_state(SqlState::NotUpdatable))
    }

    pub fn estimate_cost(
        &self,
        estimator: &dyn CostEstimator,
        outer_rows: f64,
    ) -> Result<CostEstimate> {
        let mut estimate = estimator.estimate(
            &AccessPath::TableFunction {
                schema: &self.schema,
                name: &self.name,
            },
            outer_rows,
        )?;
        // Arguments reading other tables mean a new invocation per outer row.
        if !self.dependency_map.is_empty() {
            estimate.supports_multiple_instantiation = false;
        }
        Ok(estimate)
    }
}
