use std::fmt;

use qtree_error::{DbError, Result};

use super::Expression;
use super::comparison_expr::ComparisonOperator;
use crate::rcl::ColumnArena;
use crate::resultset::ResultSetNode;
use crate::resultset::order_by::OrderByList;
use crate::table_map::TableMap;
use crate::types::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubqueryType {
    /// Scalar subquery used as a value.
    Expression,
    Exists,
    NotExists,
    In,
    NotIn,
    EqAny,
    NeAny,
    GtAny,
    GeAny,
    LtAny,
    LeAny,
    EqAll,
    NeAll,
    GtAll,
    GeAll,
    LtAll,
    LeAll,
}

impl SubqueryType {
    pub const fn any(op: ComparisonOperator) -> Self {
        match op {
            ComparisonOperator::Eq => Self::EqAny,
            ComparisonOperator::NotEq => Self::NeAny,
            ComparisonOperator::Gt => Self::GtAny,
            ComparisonOperator::GtEq => Self::GeAny,
            ComparisonOperator::Lt => Self::LtAny,
            ComparisonOperator::LtEq => Self::LeAny,
        }
    }

    pub const fn all(op: ComparisonOperator) -> Self {
        match op {
            ComparisonOperator::Eq => Self::EqAll,
            ComparisonOperator::NotEq => Self::NeAll,
            ComparisonOperator::Gt => Self::GtAll,
            ComparisonOperator::GtEq => Self::GeAll,
            ComparisonOperator::Lt => Self::LtAll,
            ComparisonOperator::LtEq => Self::LeAll,
        }
    }

    pub const fn is_expression(&self) -> bool {
        matches!(self, Self::Expression)
    }

    pub const fn is_exists(&self) -> bool {
        matches!(self, Self::Exists)
    }

    pub const fn is_not_exists(&self) -> bool {
        matches!(self, Self::NotExists)
    }

    pub const fn is_in(&self) -> bool {
        matches!(self, Self::In)
    }

    pub const fn is_not_in(&self) -> bool {
        matches!(self, Self::NotIn)
    }

    pub const fn is_any(&self) -> bool {
        matches!(
            self,
            Self::EqAny | Self::NeAny | Self::GtAny | Self::GeAny | Self::LtAny | Self::LeAny
        )
    }

    pub const fn is_all(&self) -> bool {
        matches!(
            self,
            Self::EqAll | Self::NeAll | Self::GtAll | Self::GeAll | Self::LtAll | Self::LeAll
        )
    }

    /// Subquery types that compare a left operand against the subquery.
    pub const fn has_left_operand(&self) -> bool {
        self.is_in() || self.is_not_in() || self.is_any() || self.is_all()
    }

    /// Type produced by applying NOT.
    ///
    /// Returns None for expression subqueries, which need to be compared
    /// against FALSE instead.
    pub const fn negate(&self) -> Option<Self> {
        Some(match self {
            Self::Expression => return None,
            Self::Exists => Self::NotExists,
            Self::NotExists => Self::Exists,
            Self::In | Self::EqAny => Self::NotIn,
            Self::NotIn => Self::In,
            Self::NeAny => Self::EqAll,
            Self::GeAny => Self::LtAll,
            Self::GtAny => Self::LeAll,
            Self::LeAny => Self::GtAll,
            Self::LtAny => Self::GeAll,
            Self::EqAll => Self::NeAny,
            Self::NeAll => Self::EqAny,
            Self::GeAll => Self::LtAny,
            Self::GtAll => Self::LeAny,
            Self::LeAll => Self::GtAny,
            Self::LtAll => Self::GeAny,
        })
    }

    /// Operator used when comparing the left operand against the subquery
    /// column in a join condition or pushed predicate.
    ///
    /// ALL and NOT IN types produce the operator whose match disqualifies the
    /// outer row.
    pub const fn join_operator(&self) -> Option<ComparisonOperator> {
        Some(match self {
            Self::In | Self::EqAny | Self::NotIn | Self::NeAll => ComparisonOperator::Eq,
            Self::NeAny | Self::EqAll => ComparisonOperator::NotEq,
            Self::LeAny | Self::GtAll => ComparisonOperator::LtEq,
            Self::LtAny | Self::GeAll => ComparisonOperator::Lt,
            Self::GeAny | Self::LtAll => ComparisonOperator::GtEq,
            Self::GtAny | Self::LeAll => ComparisonOperator::Gt,
            Self::Expression | Self::Exists | Self::NotExists => return None,
        })
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Expression => "EXPRESSION",
            Self::Exists => "EXISTS",
            Self::NotExists => "NOT EXISTS",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::EqAny => "= ANY",
            Self::NeAny => "<> ANY",
            Self::GtAny => "> ANY",
            Self::GeAny => ">= ANY",
            Self::LtAny => "< ANY",
            Self::LeAny => "<= ANY",
            Self::EqAll => "= ALL",
            Self::NeAll => "<> ALL",
            Self::GtAll => "> ALL",
            Self::GeAll => ">= ALL",
            Self::LtAll => "< ALL",
            Self::LeAll => "<= ALL",
        }
    }
}

/// How preprocessing disposed of a subquery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubqueryOutcome {
    /// Kept as a subquery wrapped in an IS [NOT] NULL test.
    NotFlattened,
    /// Merged into the outer block as an inner join, or collapsed into a
    /// plain comparison for single row subqueries.
    FlattenedToJoin,
    /// Merged into the outer block with its table marked as an EXISTS or NOT
    /// EXISTS table.
    FlattenedToExistsJoin,
    /// Kept as a scalar expression subquery.
    RetainedAsScalar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubqueryState {
    Unbound,
    Bound,
    Preprocessed(SubqueryOutcome),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubqueryExpr {
    /// Unique number within the statement.
    pub subquery_number: usize,
    pub subquery_type: SubqueryType,
    pub left_operand: Option<Box<Expression>>,
    pub result_set: Box<ResultSetNode>,
    pub order_by: Option<OrderByList>,
    pub offset: Option<u64>,
    pub fetch: Option<u64>,
    /// Nesting level of the subquery's own query block.
    pub level: usize,
    /// Directly under the top level AND of a WHERE clause.
    pub under_top_and: bool,
    pub in_having: bool,
    pub in_where: bool,
    /// Expression subquery that had a DISTINCT removed, needs a runtime
    /// single value check.
    pub distinct_expression: bool,
    /// The comparison against the left operand was pushed into the subquery.
    pub pushed_new_predicate: bool,
    /// Evaluated once and cached.
    pub materialized: bool,
    pub have_order_by: bool,
    pub datatype: DataType,
    state: SubqueryState,
    correlated: Option<bool>,
    invariant: Option<bool>,
}

impl SubqueryExpr {
    pub fn new(
        subquery_number: usize,
        subquery_type: SubqueryType,
        left_operand: Option<Expression>,
        result_set: ResultSetNode,
        level: usize,
    ) -> Self {
        SubqueryExpr {
            subquery_number,
            subquery_type,
            left_operand: left_operand.map(Box::new),
            result_set: Box::new(result_set),
            order_by: None,
            offset: None,
            fetch: None,
            level,
            under_top_and: false,
            in_having: false,
            in_where: false,
            distinct_expression: false,
            pushed_new_predicate: false,
            materialized: false,
            have_order_by: false,
            datatype: DataType::boolean(),
            state: SubqueryState::Unbound,
            correlated: None,
            invariant: None,
        }
    }

    pub fn state(&self) -> SubqueryState {
        self.state
    }

    pub fn is_preprocessed(&self) -> bool {
        matches!(self.state, SubqueryState::Preprocessed(_))
    }

    pub fn mark_bound(&mut self, datatype: DataType) -> Result<()> {
        if self.state != SubqueryState::Unbound {
            return Err(DbError::internal(format!(
                "Subquery {} bound twice",
                self.subquery_number
            )));
        }
        self.datatype = datatype;
        self.state = SubqueryState::Bound;
        Ok(())
    }

    pub fn mark_preprocessed(&mut self, outcome: SubqueryOutcome) -> Result<()> {
        if self.state != SubqueryState::Bound {
            return Err(DbError::internal(format!(
                "Subquery {} preprocessed from state {:?}",
                self.subquery_number, self.state
            )));
        }
        self.state = SubqueryState::Preprocessed(outcome);
        Ok(())
    }

    /// Whether any column reference inside the subquery resolves to a table
    /// outside of it. Computed once.
    ///
    /// When the comparison was pushed into the subquery only the original
    /// query and its first column are examined, the pushed predicate always
    /// references the outer operand.
    pub fn has_correlated_columns(&mut self, arena: &ColumnArena) -> bool {
        if let Some(correlated) = self.correlated {
            return correlated;
        }

        let level = self.level;
        let mut correlated = false;
        let mut check = |expr: &Expression| {
            if let Expression::Column(col) = expr {
                if col.source_level < level {
                    correlated = true;
                }
            }
        };

        match (self.pushed_new_predicate, self.result_set.as_ref()) {
            (true, ResultSetNode::ProjectRestrict(prn)) => {
                prn.child.walk_expressions_limited(arena, Some(1), &mut check)
            }
            _ => self.result_set.walk_expressions(arena, &mut check),
        }

        self.correlated = Some(correlated);
        correlated
    }

    /// Whether the subquery produces the same result for every outer row it
    /// is evaluated for. Computed once.
    pub fn is_invariant(&mut self, arena: &ColumnArena) -> bool {
        if let Some(invariant) = self.invariant {
            return invariant;
        }

        let mut invariant = true;
        self.result_set.walk_expressions(arena, &mut |expr| {
            if let Expression::ScalarFunction(func) = expr {
                if !func.deterministic {
                    invariant = false;
                }
            }
        });

        self.invariant = Some(invariant);
        invariant
    }

    /// Drop cached correlation and variance results.
    pub fn clear_caches(&mut self) {
        self.correlated = None;
        self.invariant = None;
    }

    pub fn is_materializable(&mut self, arena: &ColumnArena) -> bool {
        self.subquery_type.is_expression()
            && !self.has_correlated_columns(arena)
            && self.is_invariant(arena)
    }

    /// Table numbers of tables outside the subquery referenced from inside
    /// it.
    pub fn correlated_tables(&self, arena: &ColumnArena) -> TableMap {
        let level = self.level;
        let mut tables = TableMap::new();
        self.result_set.walk_expressions(arena, &mut |expr| {
            if let Expression::Column(col) = expr {
                if col.source_level < level {
                    if let Some(table) = col.table_number {
                        tables.set(table);
                    }
                }
            }
        });
        tables
    }

    pub fn categorize(&self, arena: &ColumnArena, tables: &mut TableMap) -> bool {
        let mut pushable = self.materialized;
        if let Some(left) = &self.left_operand {
            pushable &= left.categorize(arena, tables);
        }
        tables.or(&self.correlated_tables(arena));
        pushable
    }

    pub fn decrement_level(&mut self, arena: &mut ColumnArena, level: usize) {
        if let Some(left) = &mut self.left_operand {
            left.decrement_level(arena, level);
        }
        self.result_set.decrement_level(arena, level);
        if self.level >= level && self.level > 0 {
            self.level -= 1;
        }
        self.correlated = None;
    }
}

impl fmt::Display for SubqueryExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.left_operand, self.subquery_type) {
            (Some(left), typ) => write!(f, "{left} {} (SUBQUERY {})", typ.as_str(), self.subquery_number),
            (None, SubqueryType::Expression) => write!(f, "(SUBQUERY {})", self.subquery_number),
            (None, typ) => write!(f, "{} (SUBQUERY {})", typ.as_str(), self.subquery_number),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(SubqueryType::In, SubqueryType::NotIn)]
    #[case(SubqueryType::EqAny, SubqueryType::NotIn)]
    #[case(SubqueryType::Exists, SubqueryType::NotExists)]
    #[case(SubqueryType::NotExists, SubqueryType::Exists)]
    #[case(SubqueryType::NeAny, SubqueryType::EqAll)]
    #[case(SubqueryType::GtAny, SubqueryType::LeAll)]
    #[case(SubqueryType::LtAll, SubqueryType::GeAny)]
    #[case(SubqueryType::NeAll, SubqueryType::EqAny)]
    fn negate_types(#[case] input: SubqueryType, #[case] expected: SubqueryType) {
        assert_eq!(Some(expected), input.negate());
    }

    #[test]
    fn expression_subquery_not_negatable() {
        assert_eq!(None, SubqueryType::Expression.negate());
    }

    #[rstest]
    #[case(SubqueryType::In, ComparisonOperator::Eq)]
    #[case(SubqueryType::NotIn, ComparisonOperator::Eq)]
    #[case(SubqueryType::NeAll, ComparisonOperator::Eq)]
    #[case(SubqueryType::EqAll, ComparisonOperator::NotEq)]
    #[case(SubqueryType::GtAll, ComparisonOperator::LtEq)]
    #[case(SubqueryType::GeAll, ComparisonOperator::Lt)]
    #[case(SubqueryType::LtAll, ComparisonOperator::GtEq)]
    #[case(SubqueryType::LeAll, ComparisonOperator::Gt)]
    #[case(SubqueryType::GtAny, ComparisonOperator::Gt)]
    #[case(SubqueryType::LeAny, ComparisonOperator::LtEq)]
    fn join_operators(#[case] input: SubqueryType, #[case] expected: ComparisonOperator) {
        assert_eq!(Some(expected), input.join_operator());
    }

    #[test]
    fn any_round_trips_operator() {
        use ComparisonOperator::*;
        for op in [Eq, NotEq, Lt, LtEq, Gt, GtEq] {
            assert_eq!(Some(op), SubqueryType::any(op).join_operator());
            assert_eq!(Some(op.negate()), SubqueryType::all(op).join_operator());
        }
    }
}
