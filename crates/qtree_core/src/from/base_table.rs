use qtree_error::{DbError, Result, SqlState};

use crate::catalog::{TableDescriptor, TableKind};
use crate::cost::{AccessPath, CostEstimate, CostEstimator};
use crate::expr::Expression;
use crate::expr::column_expr::BaseColumnExpr;
use crate::predicate::PredicateList;
use crate::rcl::{ColumnArena, ResultColumn, ResultColumnList};
use crate::table_map::{TableMap, TableNumber};

/// Join semantics of a table merged in from a flattened EXISTS or NOT EXISTS
/// subquery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistsMarking {
    #[default]
    None,
    /// Outer row qualifies if at least one row of this table matches.
    Exists,
    /// Outer row qualifies if no row of this table matches.
    NotExists,
}

/// A stored table or view read by the query.
#[derive(Debug, Clone, PartialEq)]
pub struct FromBaseTable {
    pub table_number: TableNumber,
    pub schema: String,
    pub name: String,
    pub correlation_name: Option<String>,
    pub kind: TableKind,
    pub level: usize,
    pub result_columns: ResultColumnList,
    /// Single table predicates pushed into the scan.
    pub restriction: PredicateList,
    pub exists: ExistsMarking,
    /// Outer tables an EXISTS table has to be joined after.
    pub dependency_map: TableMap,
    /// 1-based positions of the columns read from storage, computed once
    /// unreferenced columns are removed.
    pub read_column_map: Option<Vec<usize>>,
}

impl FromBaseTable {
    /// Create a from-table exposing every column of `table`.
    pub fn new(
        arena: &mut ColumnArena,
        table: &TableDescriptor,
        correlation_name: Option<String>,
        table_number: TableNumber,
        level: usize,
    ) -> Self {
        let columns = table
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

        FromBaseTable {
            table_number,
            schema: table.schema.clone(),
            name: table.name.clone(),
            correlation_name,
            kind: table.kind,
            level,
            result_columns: ResultColumnList::from_columns(arena, columns),
            restriction: PredicateList::new(),
            exists: ExistsMarking::None,
            dependency_map: TableMap::new(),
            read_column_map: None,
        }
    }

    pub fn exposed_name(&self) -> &str {
        self.correlation_name.as_deref().unwrap_or(&self.name)
    }

    pub fn is_exists_table(&self) -> bool {
        self.exists != ExistsMarking::None
    }

    /// Error unless rows of this table may be updated or deleted.
    pub fn check_updatable(&self) -> Result<()> {
        match self.kind {
            TableKind::Base => Ok(()),
            TableKind::View => Err(DbError::new(format!(
                "View '{}' is not updatable",
                self.name
            ))
            .with_sql_state(SqlState::NotUpdatable)),
            TableKind::System => Err(DbError::new(format!(
                "System table '{}.{}' is not updatable",
                self.schema, self.name
            ))
            .with_sql_state(SqlState::NotUpdatable)),
        }
    }

    /// Drop unreferenced columns and record which table columns are read.
    ///
    /// Positioned updates read every column.
    pub fn compute_read_column_map(
        &mut self,
        arena: &mut ColumnArena,
        positioned_update: bool,
    ) -> &[usize] {
        self.result_columns.compact_columns(arena, positioned_update);
        let positions = self
            .result_columns
            .iter()
            .filter_map(|rc| arena[rc].column_position())
            .collect();
        self.read_column_map.insert(positions)
    }

    pub fn estimate_cost(
        &self,
        estimator: &dyn CostEstimator,
        outer_rows: f64,
    ) -> Result<CostEstimate> {
        estimator.estimate(
            &AccessPath::TableScan {
                schema: &self.schema,
                table: &self.name,
                restrictions: self.restriction.len(),
            },
            outer_rows,
        )
    }
}
