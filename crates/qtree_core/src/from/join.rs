use qtree_error::{DbError, Result};

use super::FromTable;
use crate::cost::{CostEstimate, CostEstimator};
use crate::expr::Expression;
use crate::predicate::PredicateList;
use crate::rcl::{ColumnArena, RcRef, ResultColumnList};
use crate::table_map::{TableMap, TableNumber};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    RightOuter,
}

impl JoinKind {
    pub const fn is_outer(&self) -> bool {
        matches!(self, Self::LeftOuter | Self::RightOuter)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode {
    pub table_number: TableNumber,
    pub level: usize,
    pub kind: JoinKind,
    pub left: FromTable,
    pub right: FromTable,
    /// Left columns followed by right columns, each a virtual column reading
    /// the child.
    pub result_columns: ResultColumnList,
    /// Bound ON clause, including the equalities generated for USING.
    /// Replaced by `join_predicates` during preprocessing.
    pub join_clause: Option<Expression>,
    pub join_predicates: PredicateList,
    /// Column names of a USING clause or NATURAL join.
    pub using_columns: Vec<String>,
}

impl JoinNode {
    /// Create a join over two bound tables.
    ///
    /// The result columns have to exist before the join clause is bound
    /// since references in the clause resolve against them.
    pub fn new(
        arena: &mut ColumnArena,
        table_number: TableNumber,
        level: usize,
        kind: JoinKind,
        left: FromTable,
        right: FromTable,
    ) -> Result<Self> {
        let left_columns = Self::thread_columns(arena, &left, kind == JoinKind::RightOuter)?;
        let right_columns = Self::thread_columns(arena, &right, kind == JoinKind::LeftOuter)?;

        let columns = left_columns.iter().chain(right_columns.iter()).collect();
        let result_columns = ResultColumnList::from_columns(arena, columns);

        Ok(JoinNode {
            table_number,
            level,
            kind,
            left,
            right,
            result_columns,
            join_clause: None,
            join_predicates: PredicateList::new(),
            using_columns: Vec::new(),
        })
    }

    /// Copy the columns of `child`, pointing each copy back at the original.
    fn thread_columns(
        arena: &mut ColumnArena,
        child: &FromTable,
        nullable: bool,
    ) -> Result<ResultColumnList> {
        let copy = child.result_columns().copy_list_and_objects(arena);
        copy.gen_virtual_column_nodes(
            arena,
            Some(child.table_number()),
            child.result_columns(),
            false,
        )?;
        for rc in copy.iter() {
            arena[rc].referenced = false;
        }
        if nullable {
            copy.set_nullability(arena, true);
        }
        Ok(copy)
    }

    /// Side whose rows are always preserved by an outer join. For inner
    /// joins this is the left side.
    pub fn logical_left(&self) -> &FromTable {
        match self.kind {
            JoinKind::RightOuter => &self.right,
            _ => &self.left,
        }
    }

    pub fn logical_right(&self) -> &FromTable {
        match self.kind {
            JoinKind::RightOuter => &self.left,
            _ => &self.right,
        }
    }

    pub fn logical_right_mut(&mut self) -> &mut FromTable {
        match self.kind {
            JoinKind::RightOuter => &mut self.left,
            _ => &mut self.right,
        }
    }

    /// Column of this join reading `child_rc` from either side.
    pub fn map_child_column(&self, child_rc: RcRef) -> Option<RcRef> {
        if let Some(pos) = self.left.result_columns().position(child_rc) {
            return self.result_columns.get(pos);
        }
        let pos = self.right.result_columns().position(child_rc)?;
        self.result_columns.get(self.left.result_columns().len() + pos)
    }

    pub fn can_accept(&self, tables: &TableMap) -> bool {
        match self.kind {
            JoinKind::Inner => {
                let mut all = self.left.referenced_tables();
                all.or(&self.right.referenced_tables());
                !tables.is_empty() && all.contains_all(tables)
            }
            // Filtering the inner side of an outer join would turn filtered
            // rows into null extended rows.
            JoinKind::LeftOuter | JoinKind::RightOuter => self.logical_left().can_accept(tables),
        }
    }

    /// Route predicates to the side that can evaluate them, or keep them at
    /// this join when they need both sides.
    ///
    /// Predicates are remapped to the child's columns when they move down a
    /// side.
    pub fn push_expressions(
        &mut self,
        arena: &ColumnArena,
        predicates: &mut PredicateList,
    ) -> Result<()> {
        let routed = predicates.extract_if(|p| p.pushable && self.can_accept(&p.referenced_tables));

        let mut left_list = PredicateList::new();
        let mut right_list = PredicateList::new();
        let mut join_list = PredicateList::new();

        let left_is_inner = self.kind == JoinKind::RightOuter;
        let right_is_inner = self.kind == JoinKind::LeftOuter;

        for predicate in routed {
            if !left_is_inner && self.left.can_accept(&predicate.referenced_tables) {
                left_list.push(predicate);
            } else if !right_is_inner && self.right.can_accept(&predicate.referenced_tables) {
                right_list.push(predicate);
            } else {
                join_list.push(predicate);
            }
        }

        tracing::debug!(
            join = %self.table_number,
            left = left_list.len(),
            right = right_list.len(),
            join_predicates = join_list.len(),
            "routed predicates",
        );

        Self::push_to_child(arena, &mut self.left, left_list)?;
        Self::push_to_child(arena, &mut self.right, right_list)?;
        self.join_predicates.append(&mut join_list);

        Ok(())
    }

    /// Push a routed list into a child. The child has to take every
    /// predicate.
    pub(crate) fn push_to_child(
        arena: &ColumnArena,
        child: &mut FromTable,
        mut predicates: PredicateList,
    ) -> Result<()> {
        if predicates.is_empty() {
            return Ok(());
        }
        predicates.remap_columns(arena);
        child.push_expressions(arena, &mut predicates)?;
        if !predicates.is_empty() {
            return Err(DbError::internal("Predicates left over after pushing into join child")
                .with_field("table", child.table_number())
                .with_field("remaining", predicates.len()));
        }
        Ok(())
    }

    pub fn decrement_level(&mut self, arena: &mut ColumnArena, level: usize) {
        self.left.decrement_level(arena, level);
        self.right.decrement_level(arena, level);
        if let Some(clause) = &mut self.join_clause {
            clause.decrement_level(arena, level);
        }
        self.join_predicates.decrement_level(arena, level);
        if self.level >= level && self.level > 0 {
            self.level -= 1;
        }
    }

    pub fn estimate_cost(
        &self,
        estimator: &dyn CostEstimator,
        outer_rows: f64,
    ) -> Result<CostEstimate> {
        let left = self.left.estimate_cost(estimator, outer_rows)?;
        let right = self
            .right
            .estimate_cost(estimator, outer_rows.max(1.0) * left.rows)?;

        let rows = match self.kind {
            JoinKind::Inner => left.rows * right.rows,
            JoinKind::LeftOuter => (left.rows * right.rows).max(left.rows),
            JoinKind::RightOuter => (left.rows * right.rows).max(right.rows),
        };

        Ok(CostEstimate {
            cost: left.cost + right.cost,
            rows,
            supports_multiple_instantiation: left.supports_multiple_instantiation
                && right.supports_multiple_instantiation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TableDescriptor;
    use crate::cost::FixedCostEstimator;
    use crate::expr::column_expr::ColumnExpr;
    use crate::expr::comparison_expr::ComparisonOperator;
    use crate::expr::{compare, lit};
    use crate::from::base_table::FromBaseTable;
    use crate::predicate::Predicate;
    use crate::types::DataType;

    fn table(arena: &mut ColumnArena, name: &str, number: usize) -> FromTable {
        let desc = TableDescriptor::new("APP", name)
            .with_column("C", DataType::integer().with_nullable(false))
            .with_column("X", DataType::integer());
        FromTable::Base(FromBaseTable::new(arena, &desc, None, TableNumber(number), 0))
    }

    fn join(arena: &mut ColumnArena, kind: JoinKind) -> JoinNode {
        let left = table(arena, "T1", 0);
        let right = table(arena, "T2", 1);
        JoinNode::new(arena, TableNumber(2), 0, kind, left, right).unwrap()
    }

    fn column_ref(arena: &ColumnArena, join: &JoinNode, idx: usize, table: usize) -> Expression {
        let rc = join.result_columns.get(idx).unwrap();
        Expression::Column(ColumnExpr::new(
            arena[rc].name.clone(),
            Some(TableNumber(table)),
            rc,
            0,
            0,
            arena[rc].datatype,
        ))
    }

    fn predicate(arena: &ColumnArena, expr: Expression) -> Predicate {
        let mut p = Predicate::new(expr);
        p.categorize(arena);
        p
    }

    #[test]
    fn result_columns_concatenated() {
        let mut arena = ColumnArena::new();
        let join = join(&mut arena, JoinKind::Inner);
        assert_eq!(4, join.result_columns.len());
        join.result_columns.check_virtual_column_ids(&arena).unwrap();
        assert_eq!(
            vec!["C", "X", "C", "X"],
            join.result_columns.column_names(&arena)
        );
    }

    #[test]
    fn outer_join_inner_side_nullable() {
        let mut arena = ColumnArena::new();
        let left = join(&mut arena, JoinKind::LeftOuter);
        let c_left = left.result_columns.get(0).unwrap();
        let c_right = left.result_columns.get(2).unwrap();
        assert!(!arena[c_left].datatype.nullable);
        assert!(arena[c_right].datatype.nullable);

        let right = join(&mut arena, JoinKind::RightOuter);
        let c_left = right.result_columns.get(0).unwrap();
        let c_right = right.result_columns.get(2).unwrap();
        assert!(arena[c_left].datatype.nullable);
        assert!(!arena[c_right].datatype.nullable);
    }

    #[test]
    fn map_child_columns() {
        let mut arena = ColumnArena::new();
        let join = join(&mut arena, JoinKind::Inner);
        let right_x = join.right.result_columns().get(1).unwrap();
        assert_eq!(join.result_columns.get(3), join.map_child_column(right_x));
    }

    #[test]
    fn push_routes_left_right_and_join() {
        let mut arena = ColumnArena::new();
        let mut join = join(&mut arena, JoinKind::Inner);

        let t1_c = column_ref(&arena, &join, 0, 0);
        let t2_c = column_ref(&arena, &join, 2, 1);
        let mut predicates: PredicateList = [
            predicate(&arena, compare(t1_c.clone(), ComparisonOperator::Eq, lit(1))),
            predicate(&arena, compare(t2_c.clone(), ComparisonOperator::Gt, lit(4))),
            predicate(&arena, compare(t1_c, ComparisonOperator::Eq, t2_c)),
        ]
        .into_iter()
        .collect();

        join.push_expressions(&arena, &mut predicates).unwrap();

        assert!(predicates.is_empty());
        assert_eq!(1, join.join_predicates.len());
        let FromTable::Base(left) = &join.left else {
            panic!("expected base table")
        };
        let FromTable::Base(right) = &join.right else {
            panic!("expected base table")
        };
        assert_eq!(1, left.restriction.len());
        assert_eq!(1, right.restriction.len());

        // Pushed predicate now reads the base table column.
        let Expression::Comparison(cmp) = &left.restriction.get(0).unwrap().expr else {
            panic!("expected comparison")
        };
        let Expression::Column(col) = cmp.left.as_ref() else {
            panic!("expected column")
        };
        assert_eq!(left.result_columns.get(0), Some(col.source));
    }

    #[test]
    fn outer_join_keeps_inner_side_predicates_out() {
        let mut arena = ColumnArena::new();
        let mut join = join(&mut arena, JoinKind::LeftOuter);

        let t1_c = column_ref(&arena, &join, 0, 0);
        let t2_c = column_ref(&arena, &join, 2, 1);
        let mut predicates: PredicateList = [
            predicate(&arena, compare(t1_c, ComparisonOperator::Eq, lit(1))),
            predicate(&arena, compare(t2_c, ComparisonOperator::Gt, lit(4))),
        ]
        .into_iter()
        .collect();

        join.push_expressions(&arena, &mut predicates).unwrap();

        // Only the predicate on the preserved side moves.
        assert_eq!(1, predicates.len());
        assert!(join.join_predicates.is_empty());
    }

    #[test]
    fn legal_join_order_uses_dependencies() {
        let mut arena = ColumnArena::new();
        let mut join = join(&mut arena, JoinKind::Inner);
        if let FromTable::Base(right) = &mut join.right {
            right.dependency_map.set(TableNumber(7));
        }
        let join = FromTable::Join(Box::new(join));

        assert_eq!(vec![TableNumber(7)], join.dependency_map().iter().collect::<Vec<_>>());
        assert!(!join.legal_join_order(&TableMap::new(), &TableMap::new()));
        assert!(join.legal_join_order(&TableMap::new(), &TableMap::with_table(TableNumber(7))));
    }

    #[test]
    fn join_cost_multiplies_rows() {
        let mut arena = ColumnArena::new();
        let join = join(&mut arena, JoinKind::Inner);
        let est = FixedCostEstimator {
            rows: 10.0,
            cost_per_row: 1.0,
        };
        let cost = join.estimate_cost(&est, 1.0).unwrap();
        assert_eq!(100.0, cost.rows);
        assert_eq!(10.0 + 100.0, cost.cost);
    }
}
