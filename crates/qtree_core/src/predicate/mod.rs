//! Predicates of a WHERE or ON clause after normalization.

pub mod cnf;

use std::fmt;

use crate::expr::{self, Expression};
use crate::rcl::ColumnArena;
use crate::table_map::{TableMap, TableNumber};

/// A single top level conjunct.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub expr: Expression,
    /// Every table the expression references, including tables referenced
    /// through correlated subqueries.
    pub referenced_tables: TableMap,
    /// Can be evaluated at the tables it references.
    pub pushable: bool,
}

impl Predicate {
    /// Create an uncategorized predicate.
    pub fn new(expr: Expression) -> Self {
        Predicate {
            expr,
            referenced_tables: TableMap::new(),
            pushable: false,
        }
    }

    pub fn categorize(&mut self, arena: &ColumnArena) {
        let mut tables = TableMap::new();
        self.pushable = self.expr.categorize(arena, &mut tables);
        self.referenced_tables = tables;
    }

    pub fn references(&self, table: TableNumber) -> bool {
        self.referenced_tables.contains(table)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.expr, self.referenced_tables)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredicateList {
    predicates: Vec<Predicate>,
}

impl PredicateList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from the top level conjuncts of `expr`.
    pub fn from_conjuncts(expr: Expression) -> Self {
        PredicateList {
            predicates: cnf::split_conjuncts(expr)
                .into_iter()
                .filter(|conjunct| !conjunct.is_literal_bool(true))
                .map(Predicate::new)
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Predicate> {
        self.predicates.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Predicate> {
        self.predicates.iter_mut()
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    /// Move every predicate of `other` to the end of this list.
    pub fn append(&mut self, other: &mut PredicateList) {
        self.predicates.append(&mut other.predicates);
    }

    pub fn get(&self, idx: usize) -> Option<&Predicate> {
        self.predicates.get(idx)
    }

    pub fn remove(&mut self, idx: usize) -> Predicate {
        self.predicates.remove(idx)
    }

    pub fn categorize(&mut self, arena: &ColumnArena) {
        for predicate in &mut self.predicates {
            predicate.categorize(arena);
        }
    }

    pub fn all_pushable(&self) -> bool {
        self.predicates.iter().all(|p| p.pushable)
    }

    /// Whether every predicate references `table`.
    pub fn all_reference(&self, table: TableNumber) -> bool {
        self.predicates.iter().all(|p| p.references(table))
    }

    pub fn referenced_tables(&self) -> TableMap {
        let mut tables = TableMap::new();
        for predicate in &self.predicates {
            tables.or(&predicate.referenced_tables);
        }
        tables
    }

    /// Remove and return every predicate matching `f`, keeping the order of
    /// both lists.
    pub fn extract_if<F>(&mut self, mut f: F) -> PredicateList
    where
        F: FnMut(&Predicate) -> bool,
    {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.predicates)
            .into_iter()
            .partition(|p| f(p));
        self.predicates = kept;
        PredicateList { predicates: taken }
    }

    /// Remove pushable predicates whose tables are all in `tables`.
    pub fn take_pushable_matching(&mut self, tables: &TableMap) -> PredicateList {
        self.extract_if(|p| p.pushable && tables.contains_all(&p.referenced_tables))
    }

    pub fn remap_columns(&mut self, arena: &ColumnArena) {
        for predicate in &mut self.predicates {
            predicate.expr.remap_columns(arena);
        }
    }

    pub fn unremap_columns(&mut self) {
        for predicate in &mut self.predicates {
            predicate.expr.unremap_columns();
        }
    }

    pub fn decrement_level(&mut self, arena: &mut ColumnArena, level: usize) {
        for predicate in &mut self.predicates {
            predicate.expr.decrement_level(arena, level);
        }
    }

    pub fn walk_expressions<F>(&self, arena: &ColumnArena, f: &mut F)
    where
        F: FnMut(&Expression),
    {
        for predicate in &self.predicates {
            predicate.expr.walk_deep(arena, f);
        }
    }

    /// AND all predicates back together.
    pub fn to_expression(&self) -> Option<Expression> {
        if self.predicates.is_empty() {
            return None;
        }
        Some(expr::and(self.predicates.iter().map(|p| p.expr.clone())))
    }

    pub fn into_expressions(self) -> Vec<Expression> {
        self.predicates.into_iter().map(|p| p.expr).collect()
    }
}

impl FromIterator<Predicate> for PredicateList {
    fn from_iter<T: IntoIterator<Item = Predicate>>(iter: T) -> Self {
        PredicateList {
            predicates: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for PredicateList {
    type Item = Predicate;
    type IntoIter = std::vec::IntoIter<Predicate>;

    fn into_iter(self) -> Self::IntoIter {
        self.predicates.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::column_expr::BaseColumnExpr;
    use crate::expr::comparison_expr::ComparisonOperator;
    use crate::expr::{and, compare, lit};
    use crate::types::DataType;

    fn col(table: usize, name: &str) -> Expression {
        Expression::BaseColumn(BaseColumnExpr {
            table_number: TableNumber(table),
            position: 1,
            name: name.to_string(),
            datatype: DataType::integer(),
        })
    }

    fn sample() -> PredicateList {
        let arena = ColumnArena::new();
        let mut list = PredicateList::from_conjuncts(and([
            compare(col(0, "A"), ComparisonOperator::Eq, lit(1)),
            compare(col(0, "A"), ComparisonOperator::Eq, col(1, "B")),
            compare(col(1, "B"), ComparisonOperator::Gt, lit(4)),
        ]));
        list.categorize(&arena);
        list
    }

    #[test]
    fn conjuncts_split() {
        let list = sample();
        assert_eq!(3, list.len());
        assert!(list.all_pushable());
        assert!(!list.all_reference(TableNumber(0)));
        assert_eq!(
            vec![TableNumber(0), TableNumber(1)],
            list.referenced_tables().iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn true_conjuncts_dropped() {
        let list = PredicateList::from_conjuncts(and([lit(true), lit(5)]));
        assert_eq!(1, list.len());
    }

    #[test]
    fn take_matching_keeps_order() {
        let mut list = sample();
        let taken = list.take_pushable_matching(&TableMap::with_table(TableNumber(1)));
        assert_eq!(1, taken.len());
        assert_eq!(2, list.len());
        assert!(list.get(0).unwrap().references(TableNumber(0)));
        assert!(list.get(1).unwrap().references(TableNumber(1)));
    }
}
