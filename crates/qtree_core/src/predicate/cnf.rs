//! Normalization of boolean clauses into an AND of conjuncts.
//!
//! NOTs are pushed down to comparisons and subqueries, nested ANDs are
//! flattened and subqueries that end up directly under the top level AND are
//! marked as such since only those are candidates for flattening. ORs are
//! kept as is, they are not distributed over ANDs.

use crate::expr::comparison_expr::ComparisonOperator;
use crate::expr::conjunction_expr::{ConjunctionExpr, ConjunctionOperator};
use crate::expr::literal_expr::{LiteralExpr, ScalarValue};
use crate::expr::{Expression, compare, lit};

/// Remove NOT nodes by inverting what's beneath them.
///
/// ANDs and ORs are swapped, comparisons negated, IS NULL flipped and
/// quantified subqueries switched to their negated type. Any other boolean
/// expression `e` under a NOT becomes `e = FALSE`.
pub fn eliminate_nots(expr: Expression, under_not: bool) -> Expression {
    match expr {
        Expression::Not(not) => eliminate_nots(*not.expr, !under_not),
        Expression::Conjunction(conj) => {
            let op = if under_not { conj.op.dual() } else { conj.op };
            Expression::Conjunction(ConjunctionExpr {
                op,
                expressions: conj
                    .expressions
                    .into_iter()
                    .map(|child| eliminate_nots(child, under_not))
                    .collect(),
            })
        }
        other if !under_not => other,
        Expression::Comparison(mut cmp) => {
            cmp.op = cmp.op.negate();
            Expression::Comparison(cmp)
        }
        Expression::IsNull(mut is_null) => {
            is_null.negated = !is_null.negated;
            Expression::IsNull(is_null)
        }
        Expression::Literal(LiteralExpr {
            literal: ScalarValue::Boolean(value),
        }) => lit(!value),
        Expression::Literal(literal) if literal.literal.is_null() => Expression::Literal(literal),
        Expression::Subquery(mut subquery) => match subquery.subquery_type.negate() {
            Some(negated) => {
                subquery.subquery_type = negated;
                Expression::Subquery(subquery)
            }
            None => compare(Expression::Subquery(subquery), ComparisonOperator::Eq, lit(false)),
        },
        other => compare(other, ComparisonOperator::Eq, lit(false)),
    }
}

/// Split an expression into its top level AND conjuncts.
pub fn split_conjuncts(expr: Expression) -> Vec<Expression> {
    let mut out = Vec::new();
    split_inner(expr, &mut out);
    out
}

fn split_inner(expr: Expression, out: &mut Vec<Expression>) {
    match expr {
        Expression::Conjunction(conj) if conj.op == ConjunctionOperator::And => {
            for child in conj.expressions {
                split_inner(child, out);
            }
        }
        other => out.push(other),
    }
}

/// Put expression subqueries on the right side of comparisons and mark
/// subqueries that sit directly under the top level AND.
pub fn mark_top_and(conjuncts: &mut [Expression]) {
    for conjunct in conjuncts {
        match conjunct {
            Expression::Subquery(subquery) => subquery.under_top_and = true,
            Expression::Comparison(cmp) => {
                let left_is_subquery =
                    matches!(cmp.left.as_ref(), Expression::Subquery(s) if s.subquery_type.is_expression());
                let right_is_subquery = matches!(cmp.right.as_ref(), Expression::Subquery(_));
                if left_is_subquery && !right_is_subquery {
                    std::mem::swap(&mut cmp.left, &mut cmp.right);
                    cmp.op = cmp.op.flip();
                }
                if let Expression::Subquery(subquery) = cmp.right.as_mut() {
                    if subquery.subquery_type.is_expression() {
                        subquery.under_top_and = true;
                    }
                }
            }
            _ => (),
        }
    }
}

/// Normalize a clause into conjuncts ready to be turned into predicates.
pub fn normalize(expr: Expression) -> Vec<Expression> {
    let expr = eliminate_nots(expr, false);
    let mut conjuncts = split_conjuncts(expr);
    mark_top_and(&mut conjuncts);
    conjuncts
}
