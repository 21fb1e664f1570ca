//! Bound expressions.

pub mod aggregate_expr;
pub mod arith_expr;
pub mod column_expr;
pub mod comparison_expr;
pub mod conjunction_expr;
pub mod literal_expr;
pub mod negate_expr;
pub mod scalar_function_expr;
pub mod subquery_expr;
pub mod window_expr;

use std::fmt;

use aggregate_expr::AggregateExpr;
use arith_expr::ArithExpr;
use column_expr::{BaseColumnExpr, ColumnExpr, VirtualColumnExpr};
use comparison_expr::{ComparisonExpr, ComparisonOperator};
use conjunction_expr::{ConjunctionExpr, ConjunctionOperator};
use literal_expr::{LiteralExpr, ParameterExpr, ScalarValue};
use negate_expr::{IsNullExpr, NotExpr};
use qtree_error::Result;
use scalar_function_expr::ScalarFunctionExpr;
use subquery_expr::SubqueryExpr;
use window_expr::WindowExpr;

use crate::rcl::ColumnArena;
use crate::table_map::TableMap;
use crate::types::DataType;

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Column(ColumnExpr),
    VirtualColumn(VirtualColumnExpr),
    BaseColumn(BaseColumnExpr),
    Literal(LiteralExpr),
    Parameter(ParameterExpr),
    Comparison(ComparisonExpr),
    Conjunction(ConjunctionExpr),
    Not(NotExpr),
    IsNull(IsNullExpr),
    Arith(ArithExpr),
    ScalarFunction(ScalarFunctionExpr),
    Aggregate(AggregateExpr),
    Window(WindowExpr),
    Subquery(SubqueryExpr),
}

impl Expression {
    pub fn null() -> Self {
        lit(ScalarValue::Null)
    }

    pub fn datatype(&self) -> DataType {
        match self {
            Self::Column(col) => col.datatype,
            Self::VirtualColumn(vcol) => vcol.datatype,
            Self::BaseColumn(col) => col.datatype,
            Self::Literal(lit) => lit.datatype(),
            Self::Parameter(param) => param.datatype,
            Self::Comparison(cmp) => cmp.datatype(),
            Self::Conjunction(conj) => conj.datatype(),
            Self::Not(not) => not.datatype(),
            Self::IsNull(is_null) => is_null.datatype(),
            Self::Arith(arith) => arith.datatype,
            Self::ScalarFunction(func) => func.datatype,
            Self::Aggregate(agg) => agg.datatype,
            Self::Window(window) => window.datatype,
            Self::Subquery(subquery) => subquery.datatype,
        }
    }

    /// Visit direct children.
    ///
    /// The query block of a subquery is not a child, its left operand is.
    pub fn for_each_child<F>(&self, f: &mut F) -> Result<()>
    where
        F: FnMut(&Expression) -> Result<()>,
    {
        for child in self.children() {
            f(child)?;
        }
        Ok(())
    }

    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Self::Column(_)
            | Self::VirtualColumn(_)
            | Self::BaseColumn(_)
            | Self::Literal(_)
            | Self::Parameter(_)
            | Self::Window(_) => Vec::new(),
            Self::Comparison(cmp) => vec![&*cmp.left, &*cmp.right],
            Self::Conjunction(conj) => conj.expressions.iter().collect(),
            Self::Not(not) => vec![&*not.expr],
            Self::IsNull(is_null) => vec![&*is_null.expr],
            Self::Arith(arith) => vec![&*arith.left, &*arith.right],
            Self::ScalarFunction(func) => func.inputs.iter().collect(),
            Self::Aggregate(agg) => agg.operand.iter().map(|operand| &**operand).collect(),
            Self::Subquery(subquery) => subquery.left_operand.iter().map(|left| &**left).collect(),
        }
    }

    pub fn for_each_child_mut<F>(&mut self, f: &mut F) -> Result<()>
    where
        F: FnMut(&mut Expression) -> Result<()>,
    {
        for child in self.children_mut() {
            f(child)?;
        }
        Ok(())
    }

    /// Direct children of this expression, not descending into subquery
    /// blocks.
    pub fn children_mut(&mut self) -> Vec<&mut Expression> {
        match self {
            Self::Column(_)
            | Self::VirtualColumn(_)
            | Self::BaseColumn(_)
            | Self::Literal(_)
            | Self::Parameter(_)
            | Self::Window(_) => Vec::new(),
            Self::Comparison(cmp) => vec![&mut *cmp.left, &mut *cmp.right],
            Self::Conjunction(conj) => conj.expressions.iter_mut().collect(),
            Self::Not(not) => vec![&mut *not.expr],
            Self::IsNull(is_null) => vec![&mut *is_null.expr],
            Self::Arith(arith) => vec![&mut *arith.left, &mut *arith.right],
            Self::ScalarFunction(func) => func.inputs.iter_mut().collect(),
            Self::Aggregate(agg) => agg.operand.iter_mut().map(|operand| &mut **operand).collect(),
            Self::Subquery(subquery) => subquery.left_operand.iter_mut().map(|left| &mut **left).collect(),
        }
    }

    /// Check if this expression or any expression below it matches `pred`.
    ///
    /// Does not descend into subquery blocks.
    pub fn contains<F>(&self, pred: &F) -> bool
    where
        F: Fn(&Expression) -> bool,
    {
        if pred(self) {
            return true;
        }
        self.children().into_iter().any(|child| child.contains(pred))
    }

    pub fn contains_subquery(&self) -> bool {
        self.contains(&|expr| matches!(expr, Expression::Subquery(_)))
    }

    pub fn contains_aggregate(&self) -> bool {
        self.contains(&|expr| matches!(expr, Expression::Aggregate(_)))
    }

    pub fn contains_window(&self) -> bool {
        self.contains(&|expr| matches!(expr, Expression::Window(_)))
    }

    /// Visit this expression and everything below it, including the
    /// expressions of nested subquery blocks.
    pub fn walk_deep<F>(&self, arena: &ColumnArena, f: &mut F)
    where
        F: FnMut(&Expression),
    {
        f(self);
        if let Self::Subquery(subquery) = self {
            subquery.result_set.walk_expressions(arena, f);
        }
        for child in self.children() {
            child.walk_deep(arena, f);
        }
    }

    /// Add every table this expression references to `tables`, returning if
    /// the expression can be pushed to the tables it references.
    pub fn categorize(&self, arena: &ColumnArena, tables: &mut TableMap) -> bool {
        match self {
            Self::Column(col) => col.categorize(arena, tables),
            Self::VirtualColumn(vcol) => {
                if let Some(table) = vcol.source_table {
                    tables.set(table);
                }
                true
            }
            Self::BaseColumn(col) => {
                tables.set(col.table_number);
                true
            }
            Self::Literal(_) | Self::Parameter(_) => true,
            Self::Subquery(subquery) => subquery.categorize(arena, tables),
            Self::Window(_) => false,
            Self::Aggregate(_) | Self::ScalarFunction(_) => {
                // Still need to visit the children for the table map.
                for child in self.children() {
                    child.categorize(arena, tables);
                }
                false
            }
            _ => {
                let mut pushable = true;
                for child in self.children() {
                    pushable &= child.categorize(arena, tables);
                }
                pushable
            }
        }
    }

    pub fn referenced_tables(&self, arena: &ColumnArena) -> TableMap {
        let mut tables = TableMap::new();
        self.categorize(arena, &mut tables);
        tables
    }

    /// Adjust nesting levels after the block at `level` was merged into its
    /// parent.
    pub fn decrement_level(&mut self, arena: &mut ColumnArena, level: usize) {
        match self {
            Self::Column(col) => col.decrement_level(level),
            Self::Subquery(subquery) => subquery.decrement_level(arena, level),
            Self::Aggregate(agg) => {
                if let Some(generated) = &mut agg.generated {
                    generated.column.decrement_level(level);
                }
                if let Some(operand) = &mut agg.operand {
                    operand.decrement_level(arena, level);
                }
            }
            other => {
                for child in other.children_mut() {
                    child.decrement_level(arena, level);
                }
            }
        }
    }

    /// Remap every column reference one layer down.
    pub fn remap_columns(&mut self, arena: &ColumnArena) {
        if let Self::Column(col) = self {
            col.remap(arena);
            return;
        }
        for child in self.children_mut() {
            child.remap_columns(arena);
        }
    }

    pub fn unremap_columns(&mut self) {
        if let Self::Column(col) = self {
            col.unremap();
            return;
        }
        for child in self.children_mut() {
            child.unremap_columns();
        }
    }

    /// Set the nesting level of every column reference outside of subquery
    /// blocks.
    pub fn set_nesting_level(&mut self, level: usize) {
        if let Self::Column(col) = self {
            col.nesting_level = level;
            return;
        }
        for child in self.children_mut() {
            child.set_nesting_level(level);
        }
    }

    pub fn is_literal_bool(&self, value: bool) -> bool {
        matches!(self, Self::Literal(LiteralExpr { literal: ScalarValue::Boolean(v) }) if *v == value)
    }

    /// Constant, column or parameter. Used when deciding if an IN operand can
    /// take part in a uniqueness check.
    pub fn is_simple_operand(&self) -> bool {
        matches!(
            self,
            Self::Literal(_) | Self::Column(_) | Self::Parameter(_)
        )
    }

    pub fn as_subquery(&self) -> Option<&SubqueryExpr> {
        match self {
            Self::Subquery(subquery) => Some(subquery),
            _ => None,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(inner) => inner.fmt(f),
            Self::VirtualColumn(inner) => inner.fmt(f),
            Self::BaseColumn(inner) => inner.fmt(f),
            Self::Literal(inner) => inner.fmt(f),
            Self::Parameter(inner) => inner.fmt(f),
            Self::Comparison(inner) => inner.fmt(f),
            Self::Conjunction(inner) => inner.fmt(f),
            Self::Not(inner) => inner.fmt(f),
            Self::IsNull(inner) => inner.fmt(f),
            Self::Arith(inner) => inner.fmt(f),
            Self::ScalarFunction(inner) => inner.fmt(f),
            Self::Aggregate(inner) => inner.fmt(f),
            Self::Window(inner) => inner.fmt(f),
            Self::Subquery(inner) => inner.fmt(f),
        }
    }
}

pub fn lit(value: impl Into<ScalarValue>) -> Expression {
    Expression::Literal(LiteralExpr {
        literal: value.into(),
    })
}

pub fn compare(left: Expression, op: ComparisonOperator, right: Expression) -> Expression {
    Expression::Comparison(ComparisonExpr {
        left: Box::new(left),
        right: Box::new(right),
        op,
    })
}

/// AND together expressions, flattening nested ANDs.
///
/// A single expression is returned as is.
pub fn and(exprs: impl IntoIterator<Item = Expression>) -> Expression {
    conjunction(ConjunctionOperator::And, exprs)
}

/// OR together expressions, flattening nested ORs.
pub fn or(exprs: impl IntoIterator<Item = Expression>) -> Expression {
    conjunction(ConjunctionOperator::Or, exprs)
}

fn conjunction(op: ConjunctionOperator, exprs: impl IntoIterator<Item = Expression>) -> Expression {
    let mut flattened = Vec::new();
    for expr in exprs {
        match expr {
            Expression::Conjunction(conj) if conj.op == op => {
                flattened.extend(conj.expressions)
            }
            other => flattened.push(other),
        }
    }

    match flattened.len() {
        // Empty AND is true, empty OR is false.
        0 => lit(op == ConjunctionOperator::And),
        1 => flattened.pop().unwrap_or_else(Expression::null),
        _ => Expression::Conjunction(ConjunctionExpr {
            op,
            expressions: flattened,
        }),
    }
}

pub fn not(expr: Expression) -> Expression {
    Expression::Not(NotExpr {
        expr: Box::new(expr),
    })
}

pub fn is_null(expr: Expression) -> Expression {
    Expression::IsNull(IsNullExpr {
        expr: Box::new(expr),
        negated: false,
    })
}

pub fn is_not_null(expr: Expression) -> Expression {
    Expression::IsNull(IsNullExpr {
        expr: Box::new(expr),
        negated: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table_map::TableNumber;

    fn base(table: usize, name: &str) -> Expression {
        Expression::BaseColumn(BaseColumnExpr {
            table_number: TableNumber(table),
            position: 1,
            name: name.to_string(),
            datatype: DataType::integer(),
        })
    }

    #[test]
    fn and_flattens_nested() {
        let expr = and([and([lit(true), lit(false)]), lit(true)]);
        let Expression::Conjunction(conj) = expr else {
            panic!("expected conjunction")
        };
        assert_eq!(3, conj.expressions.len());
    }

    #[test]
    fn single_and_is_unwrapped() {
        assert_eq!(lit(1), and([lit(1)]));
        assert_eq!(lit(true), and([]));
        assert_eq!(lit(false), or([]));
    }

    #[test]
    fn children_are_direct_operands() {
        let mut expr = and([
            compare(base(0, "A"), ComparisonOperator::Eq, base(1, "B")),
            is_null(base(2, "C")),
            lit(true),
        ]);
        assert_eq!(3, expr.children().len());
        assert!(lit(1).children().is_empty());

        for child in expr.children_mut() {
            if let Expression::Comparison(cmp) = child {
                *cmp.right = lit(4);
            }
        }
        let tables = expr.referenced_tables(&ColumnArena::new());
        assert!(tables.contains(TableNumber(0)));
        assert!(!tables.contains(TableNumber(1)));
        assert!(tables.contains(TableNumber(2)));
    }

    #[test]
    fn categorize_collects_tables() {
        let arena = ColumnArena::new();
        let expr = and([
            compare(base(0, "A"), ComparisonOperator::Eq, base(2, "B")),
            is_null(base(5, "C")),
        ]);

        let mut tables = TableMap::new();
        assert!(expr.categorize(&arena, &mut tables));
        assert_eq!(
            vec![TableNumber(0), TableNumber(2), TableNumber(5)],
            tables.iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn function_call_not_pushable() {
        let arena = ColumnArena::new();
        let expr = Expression::ScalarFunction(ScalarFunctionExpr {
            schema: "APP".to_string(),
            name: "F".to_string(),
            inputs: vec![base(1, "A")],
            deterministic: true,
            datatype: DataType::integer(),
        });

        let mut tables = TableMap::new();
        assert!(!expr.categorize(&arena, &mut tables));
        assert!(tables.contains(TableNumber(1)));
    }

    #[test]
    fn contains_stops_at_nothing_for_plain_trees() {
        let expr = not(compare(base(0, "A"), ComparisonOperator::Lt, lit(4)));
        assert!(expr.contains(&|e| matches!(e, Expression::BaseColumn(_))));
        assert!(!expr.contains_aggregate());
        assert!(!expr.contains_subquery());
    }
}
