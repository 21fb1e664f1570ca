use qtree_error::Result;

use super::FromTable;
use super::base_table::FromBaseTable;
use crate::cost::{CostEstimate, CostEstimator};
use crate::expr::Expression;
use crate::predicate::PredicateList;
use crate::rcl::ColumnArena;
use crate::table_map::TableMap;

/// Top level entries of a FROM clause, implicitly cross joined.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FromList {
    pub tables: Vec<FromTable>,
}

impl FromList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, table: FromTable) {
        self.tables.push(table);
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FromTable> {
        self.tables.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FromTable> {
        self.tables.iter_mut()
    }

    pub fn referenced_tables(&self) -> TableMap {
        let mut tables = TableMap::new();
        for table in &self.tables {
            tables.or(&table.referenced_tables());
        }
        tables
    }

    /// The only entry if this list is a single base table.
    pub fn single_base_table(&self) -> Option<&FromBaseTable> {
        match self.tables.as_slice() {
            [FromTable::Base(table)] => Some(table),
            _ => None,
        }
    }

    pub fn single_base_table_mut(&mut self) -> Option<&mut FromBaseTable> {
        match self.tables.as_mut_slice() {
            [FromTable::Base(table)] => Some(table),
            _ => None,
        }
    }

    pub fn set_level(&mut self, level: usize) {
        for table in &mut self.tables {
            table.set_level(level);
        }
    }

    pub fn decrement_level(&mut self, arena: &mut ColumnArena, level: usize) {
        for table in &mut self.tables {
            table.decrement_level(arena, level);
        }
    }

    pub fn walk_expressions<F>(&self, arena: &ColumnArena, f: &mut F)
    where
        F: FnMut(&Expression),
    {
        for table in &self.tables {
            table.walk_expressions(arena, f);
        }
    }

    /// Offer every predicate to each entry in turn.
    ///
    /// Predicates no entry accepts stay in `predicates`.
    pub fn push_predicates(
        &mut self,
        arena: &ColumnArena,
        predicates: &mut PredicateList,
    ) -> Result<()> {
        for table in &mut self.tables {
            if predicates.is_empty() {
                break;
            }
            let mut accepted =
                predicates.extract_if(|p| p.pushable && table.can_accept(&p.referenced_tables));
            if accepted.is_empty() {
                continue;
            }
            table.push_expressions(arena, &mut accepted)?;
            // Joins may keep predicates they can't route further down, those
            // go back to the block.
            predicates.append(&mut accepted);
        }
        Ok(())
    }

    /// Tables every entry of `self` must follow in a join order, excluding
    /// the tables of this list.
    pub fn dependency_map(&self) -> TableMap {
        let mut tables = TableMap::new();
        for table in &self.tables {
            tables.or(&table.dependency_map());
        }
        tables.subtract(&self.referenced_tables());
        tables
    }

    /// Cost of joining every entry in list order.
    pub fn estimate_cost(
        &self,
        estimator: &dyn CostEstimator,
        outer_rows: f64,
    ) -> Result<CostEstimate> {
        let mut total = CostEstimate {
            cost: 0.0,
            rows: 1.0,
            supports_multiple_instantiation: true,
        };
        for table in &self.tables {
            let estimate = table.estimate_cost(estimator, outer_rows.max(1.0) * total.rows)?;
            total.cost += estimate.cost;
            total.rows *= estimate.rows;
            total.supports_multiple_instantiation &= estimate.supports_multiple_instantiation;
        }
        Ok(total)
    }

    pub fn project_columns(&mut self, arena: &mut ColumnArena) {
        for table in &mut self.tables {
            table.project_columns(arena);
        }
    }
}
