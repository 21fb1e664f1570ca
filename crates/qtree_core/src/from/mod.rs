//! Sources of rows in a FROM list.

pub mod base_table;
pub mod from_list;
pub mod join;
pub mod subquery_table;
pub mod vti;

use base_table::FromBaseTable;
use join::JoinNode;
use qtree_error::Result;
use subquery_table::FromSubquery;
use vti::FromVti;

use crate::cost::{CostEstimate, CostEstimator};
use crate::expr::Expression;
use crate::predicate::PredicateList;
use crate::rcl::{ColumnArena, ResultColumnList};
use crate::table_map::{TableMap, TableNumber};

#[derive(Debug, Clone, PartialEq)]
pub enum FromTable {
    Base(FromBaseTable),
    Join(Box<JoinNode>),
    Vti(FromVti),
    Subquery(Box<FromSubquery>),
}

impl FromTable {
    pub fn table_number(&self) -> TableNumber {
        match self {
            Self::Base(table) => table.table_number,
            Self::Join(join) => join.table_number,
            Self::Vti(vti) => vti.table_number,
            Self::Subquery(subquery) => subquery.table_number,
        }
    }

    pub fn result_columns(&self) -> &ResultColumnList {
        match self {
            Self::Base(table) => &table.result_columns,
            Self::Join(join) => &join.result_columns,
            Self::Vti(vti) => &vti.result_columns,
            Self::Subquery(subquery) => &subquery.result_columns,
        }
    }

    pub fn result_columns_mut(&mut self) -> &mut ResultColumnList {
        match self {
            Self::Base(table) => &mut table.result_columns,
            Self::Join(join) => &mut join.result_columns,
            Self::Vti(vti) => &mut vti.result_columns,
            Self::Subquery(subquery) => &mut subquery.result_columns,
        }
    }

    /// Name the table is referenced by in the query, joins have none.
    pub fn exposed_name(&self) -> Option<&str> {
        match self {
            Self::Base(table) => Some(table.exposed_name()),
            Self::Join(_) => None,
            Self::Vti(vti) => Some(&vti.correlation_name),
            Self::Subquery(subquery) => Some(&subquery.correlation_name),
        }
    }

    pub fn level(&self) -> usize {
        match self {
            Self::Base(table) => table.level,
            Self::Join(join) => join.level,
            Self::Vti(vti) => vti.level,
            Self::Subquery(subquery) => subquery.level,
        }
    }

    /// Set the nesting level of this table and every table below it.
    pub fn set_level(&mut self, level: usize) {
        match self {
            Self::Base(table) => table.level = level,
            Self::Join(join) => {
                join.level = level;
                join.left.set_level(level);
                join.right.set_level(level);
            }
            Self::Vti(vti) => vti.level = level,
            Self::Subquery(subquery) => subquery.level = level,
        }
    }

    /// Leaf tables at or below this node.
    pub fn referenced_tables(&self) -> TableMap {
        match self {
            Self::Join(join) => {
                let mut tables = join.left.referenced_tables();
                tables.or(&join.right.referenced_tables());
                tables
            }
            other => TableMap::with_table(other.table_number()),
        }
    }

    /// Tables that have to be joined before this one because expressions in
    /// it reference them. Never includes this table.
    pub fn dependency_map(&self) -> TableMap {
        let mut tables = match self {
            Self::Base(table) => table.dependency_map.clone(),
            Self::Join(join) => {
                let mut tables = join.left.dependency_map();
                tables.or(&join.right.dependency_map());
                tables.subtract(&self.referenced_tables());
                tables
            }
            Self::Vti(vti) => vti.dependency_map.clone(),
            Self::Subquery(_) => TableMap::new(),
        };
        tables.clear(self.table_number());
        tables
    }

    /// Whether this table may be placed after `assigned_tables` in a join
    /// order.
    ///
    /// `correlation_map` holds the tables of outer query blocks, which are
    /// always available.
    pub fn legal_join_order(&self, assigned_tables: &TableMap, correlation_map: &TableMap) -> bool {
        let mut available = assigned_tables.clone();
        available.or(correlation_map);
        available.contains_all(&self.dependency_map())
    }

    /// Whether a pushable predicate referencing `tables` can be evaluated
    /// inside this table without changing the result.
    pub fn can_accept(&self, tables: &TableMap) -> bool {
        match self {
            Self::Join(join) => join.can_accept(tables),
            other => {
                !tables.is_empty()
                    && TableMap::with_table(other.table_number()).contains_all(tables)
            }
        }
    }

    /// Move every predicate this table can evaluate out of `predicates`.
    pub fn push_expressions(
        &mut self,
        arena: &ColumnArena,
        predicates: &mut PredicateList,
    ) -> Result<()> {
        match self {
            Self::Join(join) => return join.push_expressions(arena, predicates),
            Self::Base(table) => {
                let mut pushed = take_single_table(predicates, table.table_number);
                table.restriction.append(&mut pushed);
            }
            Self::Vti(vti) => {
                let mut pushed = take_single_table(predicates, vti.table_number);
                vti.restriction.append(&mut pushed);
            }
            Self::Subquery(subquery) => {
                let mut pushed = take_single_table(predicates, subquery.table_number);
                subquery.restriction.append(&mut pushed);
            }
        }
        Ok(())
    }

    pub fn decrement_level(&mut self, arena: &mut ColumnArena, level: usize) {
        match self {
            Self::Base(table) => {
                table.restriction.decrement_level(arena, level);
                if table.level >= level && table.level > 0 {
                    table.level -= 1;
                }
            }
            Self::Join(join) => join.decrement_level(arena, level),
            Self::Vti(vti) => {
                for arg in &mut vti.args {
                    arg.decrement_level(arena, level);
                }
                vti.restriction.decrement_level(arena, level);
                if vti.level >= level && vti.level > 0 {
                    vti.level -= 1;
                }
            }
            Self::Subquery(subquery) => subquery.decrement_level(arena, level),
        }
    }

    /// Visit every expression held by this table and the tables below it.
    pub fn walk_expressions<F>(&self, arena: &ColumnArena, f: &mut F)
    where
        F: FnMut(&Expression),
    {
        match self {
            Self::Base(table) => table.restriction.walk_expressions(arena, f),
            Self::Join(join) => {
                join.left.walk_expressions(arena, f);
                join.right.walk_expressions(arena, f);
                if let Some(clause) = &join.join_clause {
                    clause.walk_deep(arena, f);
                }
                join.join_predicates.walk_expressions(arena, f);
            }
            Self::Vti(vti) => {
                for arg in &vti.args {
                    arg.walk_deep(arena, f);
                }
                vti.restriction.walk_expressions(arena, f);
            }
            Self::Subquery(subquery) => {
                subquery.subquery.walk_expressions(arena, f);
                subquery.restriction.walk_expressions(arena, f);
            }
        }
    }

    pub fn estimate_cost(
        &self,
        estimator: &dyn CostEstimator,
        outer_rows: f64,
    ) -> Result<CostEstimate> {
        match self {
            Self::Base(table) => table.estimate_cost(estimator, outer_rows),
            Self::Join(join) => join.estimate_cost(estimator, outer_rows),
            Self::Vti(vti) => vti.estimate_cost(estimator, outer_rows),
            Self::Subquery(subquery) => subquery.estimate_cost(estimator, outer_rows),
        }
    }

    /// Drop unreferenced columns from this table and the tables below it.
    pub fn project_columns(&mut self, arena: &mut ColumnArena) {
        match self {
            Self::Base(table) => {
                table.compute_read_column_map(arena, false);
            }
            Self::Join(join) => {
                join.left.project_columns(arena);
                join.right.project_columns(arena);
                join.result_columns.do_projection(arena);
            }
            Self::Vti(vti) => {
                vti.result_columns.compact_columns(arena, false);
            }
            Self::Subquery(subquery) => {
                subquery.result_columns.do_projection(arena);
            }
        }
    }

    pub fn as_base_table(&self) -> Option<&FromBaseTable> {
        match self {
            Self::Base(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_base_table_mut(&mut self) -> Option<&mut FromBaseTable> {
        match self {
            Self::Base(table) => Some(table),
            _ => None,
        }
    }
}

fn take_single_table(predicates: &mut PredicateList, table: TableNumber) -> PredicateList {
    let tables = TableMap::with_table(table);
    let pushed = predicates.extract_if(|p| {
        p.pushable && !p.referenced_tables.is_empty() && tables.contains_all(&p.referenced_tables)
    });
    if !pushed.is_empty() {
        tracing::debug!(%table, count = pushed.len(), "pushed predicates into table");
    }
    pushed
}
