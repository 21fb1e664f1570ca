//! Uniqueness checks deciding if a subquery can be merged into its parent as
//! a plain join.

use std::collections::{BTreeSet, HashMap};

use qtree_error::{OptionExt, Result};

use crate::catalog::Catalog;
use crate::expr::Expression;
use crate::expr::comparison_expr::{ComparisonExpr, ComparisonOperator};
use crate::from::FromTable;
use crate::rcl::ColumnArena;
use crate::resultset::select::SelectNode;
use crate::table_map::{TableMap, TableNumber};

/// Whether every row of the outer block matches at most one row of
/// `select`.
///
/// Holds when each table in the from list has a unique key whose columns are
/// all fixed by equality predicates, against constants, outer references or
/// columns of tables already known to be fixed. `first_column_bound` is set
/// for IN and `= ANY` subqueries whose left operand fixes the first select
/// list column.
pub(crate) fn returns_at_most_single_row(
    catalog: &dyn Catalog,
    arena: &ColumnArena,
    select: &SelectNode,
    first_column_bound: bool,
) -> Result<bool> {
    let mut inner = TableMap::new();
    // Tables whose key columns are all fixed. Tables merged in from EXISTS
    // subqueries contribute at most one match per row to begin with.
    let mut known = TableMap::new();
    let mut keys: HashMap<TableNumber, Vec<Vec<usize>>> = HashMap::new();
    for table in select.from_list.iter() {
        let FromTable::Base(base) = table else {
            return Ok(false);
        };
        let descriptor = catalog
            .get_table(&base.schema, &base.name)?
            .required("table of a bound from list")?;
        keys.insert(
            base.table_number,
            descriptor.unique_keys().map(|key| key.to_vec()).collect(),
        );
        inner.set(base.table_number);
        if base.is_exists_table() {
            known.set(base.table_number);
        }
    }

    let mut equalities = Vec::new();
    for predicate in select.where_predicates.iter() {
        collect_equality(&predicate.expr, &mut equalities);
    }
    for table in select.from_list.iter() {
        if let FromTable::Base(base) = table {
            for predicate in base.restriction.iter() {
                collect_equality(&predicate.expr, &mut equalities);
            }
        }
    }

    let mut bound: HashMap<TableNumber, BTreeSet<usize>> = HashMap::new();
    if let Some(first) = select.result_columns.first().filter(|_| first_column_bound) {
        if let Some((table, position)) = base_column(arena, &arena[first].expression) {
            bound.entry(table).or_default().insert(position);
        }
    }

    // Each newly fixed table can fix columns of others through join
    // predicates, so repeat until stable.
    loop {
        let mut changed = false;
        for cmp in &equalities {
            for (column, other) in [(&cmp.left, &cmp.right), (&cmp.right, &cmp.left)] {
                let Some((table, position)) = base_column(arena, column) else {
                    continue;
                };
                if !inner.contains(table) || !is_fixed(arena, other, &inner, &known) {
                    continue;
                }
                changed |= bound.entry(table).or_default().insert(position);
            }
        }

        for (table, table_keys) in &keys {
            if known.contains(*table) {
                continue;
            }
            let Some(columns) = bound.get(table) else {
                continue;
            };
            if table_keys
                .iter()
                .any(|key| key.iter().all(|position| columns.contains(position)))
            {
                known.set(*table);
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    Ok(known.contains_all(&inner))
}

fn collect_equality<'a>(expr: &'a Expression, equalities: &mut Vec<&'a ComparisonExpr>) {
    if let Expression::Comparison(cmp) = expr {
        if cmp.op == ComparisonOperator::Eq {
            equalities.push(cmp);
        }
    }
}

/// Table number and position of a reference to a stored column.
fn base_column(arena: &ColumnArena, expr: &Expression) -> Option<(TableNumber, usize)> {
    let Expression::Column(col) = expr else {
        return None;
    };
    match &arena[col.source].expression {
        Expression::BaseColumn(base) => Some((base.table_number, base.position)),
        _ => None,
    }
}

/// Whether `expr` has a single value for a given outer row once the `known`
/// tables are fixed.
fn is_fixed(arena: &ColumnArena, expr: &Expression, inner: &TableMap, known: &TableMap) -> bool {
    if expr.contains_subquery() {
        return false;
    }
    let mut tables = expr.referenced_tables(arena);
    tables.and(inner);
    known.contains_all(&tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{self, Expr, FromItem, Select, SelectItem};
    use crate::binder::compile::bind_query;
    use crate::config::CompileConfig;
    use crate::predicate::PredicateList;
    use crate::resultset::ResultSetNode;
    use crate::testutil;

    /// Bind a single block and split its WHERE clause without preprocessing.
    fn bound_select(from: Vec<FromItem>, selection: Option<Expr>) -> (SelectNode, ColumnArena) {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let query = ast::Query::select(Select {
            projections: vec![SelectItem::Wildcard],
            from,
            selection,
            ..Default::default()
        });
        let compiled = bind_query(&catalog, &config, &query).unwrap();
        let ResultSetNode::Select(mut select) = compiled.root else {
            panic!("expected select")
        };
        if let Some(clause) = select.where_clause.take() {
            select.where_predicates = PredicateList::from_conjuncts(clause);
            select.where_predicates.categorize(&compiled.arena);
        }
        (*select, compiled.arena)
    }

    #[test]
    fn key_bound_by_constant() {
        let catalog = testutil::catalog();
        let (select, arena) = bound_select(
            vec![FromItem::table("T1")],
            Some(Expr::eq(Expr::column("C"), Expr::literal(4))),
        );
        assert!(returns_at_most_single_row(&catalog, &arena, &select, false).unwrap());
    }

    #[test]
    fn non_key_column_not_unique() {
        let catalog = testutil::catalog();
        let (select, arena) = bound_select(
            vec![FromItem::table("T1")],
            Some(Expr::eq(Expr::column("A"), Expr::literal(4))),
        );
        assert!(!returns_at_most_single_row(&catalog, &arena, &select, false).unwrap());
    }

    #[test]
    fn no_unique_key() {
        let catalog = testutil::catalog();
        let (select, arena) = bound_select(
            vec![FromItem::table("T2")],
            Some(Expr::eq(Expr::column("C"), Expr::literal(4))),
        );
        assert!(!returns_at_most_single_row(&catalog, &arena, &select, false).unwrap());
    }

    #[test]
    fn additional_equality_binds_first_column() {
        let catalog = testutil::catalog();
        let (select, arena) = bound_select(vec![FromItem::table("T1")], None);
        assert!(!returns_at_most_single_row(&catalog, &arena, &select, false).unwrap());
        assert!(returns_at_most_single_row(&catalog, &arena, &select, true).unwrap());
    }

    #[test]
    fn transitively_fixed_tables() {
        let catalog = testutil::catalog();
        // T1 is fixed by the constant, the second T1 through the join.
        let (select, arena) = bound_select(
            vec![FromItem::aliased_table("T1", "X"), FromItem::aliased_table("T1", "Y")],
            Some(Expr::And(vec![
                Expr::eq(Expr::qualified_column("X", "C"), Expr::literal(1)),
                Expr::eq(Expr::qualified_column("Y", "C"), Expr::qualified_column("X", "A")),
            ])),
        );
        assert!(returns_at_most_single_row(&catalog, &arena, &select, false).unwrap());
    }
}
