use qtree_error::{DbError, OptionExt, Result};

use super::{FlattenTarget, PreprocessContext, unique};
use crate::expr::comparison_expr::ComparisonOperator;
use crate::expr::subquery_expr::{SubqueryExpr, SubqueryOutcome, SubqueryType};
use crate::expr::{Expression, compare, is_not_null, is_null, lit, or};
use crate::from::FromTable;
use crate::from::base_table::ExistsMarking;
use crate::predicate::Predicate;
use crate::rcl::{RcRef, ResultColumnList};
use crate::resultset::ResultSetNode;
use crate::resultset::project_restrict::ProjectRestrictNode;
use crate::resultset::select::SelectNode;
use crate::table_map::TableMap;
use crate::types::DataType;

/// Left side and operator of the comparison an expression subquery is the
/// right side of.
type ParentComparison = (Expression, ComparisonOperator);

/// A subquery that stays in place, along with its parent comparison.
type Declined = (SubqueryExpr, Option<ParentComparison>);

/// How a subquery is merged into its parent block.
enum FlattenKind {
    /// Single row subquery collapsed into a comparison.
    Row,
    Join,
    ExistsJoin { not_exists: bool },
}

impl PreprocessContext<'_> {
    /// Preprocess a subquery and decide what replaces it in the parent
    /// expression.
    ///
    /// `parent` is set when the subquery is the right side of a comparison
    /// under the top level AND, in which case the whole comparison is
    /// returned. Flattening only happens when `target` is given.
    pub(crate) fn preprocess_subquery(
        &mut self,
        mut subquery: SubqueryExpr,
        mut parent: Option<ParentComparison>,
        target: Option<&mut FlattenTarget>,
    ) -> Result<Expression> {
        subquery.have_order_by |= subquery.order_by.is_some();
        self.preprocess_node(&mut subquery.result_set)?;

        if let ResultSetNode::Select(select) = subquery.result_set.as_mut() {
            if select.distinct {
                select.distinct = false;
                // Expression subqueries still have to produce a single
                // distinct value at runtime.
                if subquery.subquery_type.is_expression() {
                    subquery.distinct_expression = true;
                }
            }
        }

        // c IN (SELECT MAX(x) FROM t) becomes c = (SELECT MAX(x) FROM t),
        // which may then be flattened as a comparison.
        let typ = subquery.subquery_type;
        if (typ.is_in() || typ.is_any())
            && self.config.enable_in_to_expression_rewrite
            && subquery.result_set.returns_at_most_one_row()
            && !subquery.has_correlated_columns(&self.output.arena)
        {
            if let (Some(left), Some(op)) = (subquery.left_operand.take(), typ.join_operator()) {
                let first = first_column(&subquery)?;
                subquery.datatype = self.output.arena[first].datatype.with_nullable(true);
                subquery.subquery_type = SubqueryType::Expression;
                subquery.clear_caches();
                parent = Some((*left, op));
                tracing::trace!(
                    subquery = subquery.subquery_number,
                    "rewrote single row subquery to a comparison",
                );
            }
        }

        let flattenable = self.config.enable_subquery_flattening
            && subquery.under_top_and
            && !subquery.in_having
            && !subquery.have_order_by
            && subquery.offset.is_none()
            && subquery.fetch.is_none();

        let (subquery, parent) = match target {
            Some(target) if flattenable => match self.flatten(subquery, parent, target)? {
                Ok(expr) => return Ok(expr),
                Err(declined) => declined,
            },
            _ => (subquery, parent),
        };

        self.retain_subquery(subquery, parent)
    }

    /// Try to merge the subquery into the parent block, handing it back if
    /// it can't be.
    fn flatten(
        &mut self,
        subquery: SubqueryExpr,
        parent: Option<ParentComparison>,
        target: &mut FlattenTarget,
    ) -> Result<std::result::Result<Expression, Declined>> {
        let typ = subquery.subquery_type;
        let kind = match subquery.result_set.as_ref() {
            ResultSetNode::Row(_) if parent.is_some() || typ.is_exists() || typ.is_not_exists() => {
                Some(FlattenKind::Row)
            }
            ResultSetNode::Select(select) => {
                self.select_flattening(&subquery, select, parent.as_ref())?
            }
            _ => None,
        };

        let expr = match kind {
            Some(FlattenKind::Row) => self.flatten_row(subquery, parent)?,
            Some(FlattenKind::Join) => self.flatten_to_join(subquery, parent, target)?,
            Some(FlattenKind::ExistsJoin { not_exists }) => {
                self.flatten_to_exists_join(subquery, not_exists, target)?
            }
            None => return Ok(Err((subquery, parent))),
        };
        Ok(Ok(expr))
    }

    /// Replace a single row subquery with the comparison against its only
    /// value.
    fn flatten_row(
        &mut self,
        subquery: SubqueryExpr,
        parent: Option<ParentComparison>,
    ) -> Result<Expression> {
        let expr = match parent {
            Some((left, op)) => {
                let first = first_column(&subquery)?;
                let mut right = self.output.arena[first].expression.clone();
                right.decrement_level(&mut self.output.arena, subquery.level);
                compare(left, op, right)
            }
            // A row always exists.
            None => lit(subquery.subquery_type.is_exists()),
        };
        self.record_outcome(subquery.subquery_number, SubqueryOutcome::FlattenedToJoin);
        Ok(expr)
    }

    /// Decide how, if at all, a select subquery can be merged into its
    /// parent block.
    fn select_flattening(
        &self,
        subquery: &SubqueryExpr,
        select: &SelectNode,
        parent: Option<&ParentComparison>,
    ) -> Result<Option<FlattenKind>> {
        let typ = subquery.subquery_type;
        let arena = &self.output.arena;

        let left = subquery.left_operand.as_deref();
        let right = select
            .result_columns
            .visible_columns(arena)
            .next()
            .map(|rc| &arena[rc].expression);

        // NOT IN and ALL only become NOT EXISTS joins when neither side can
        // be NULL.
        let not_exists = typ.is_not_exists()
            || ((typ.is_not_in() || typ.is_all())
                && matches!((left, right), (Some(l), Some(r))
                    if !l.datatype().nullable && !r.datatype().nullable));

        // A quantified subquery in a WHERE clause is kept whole when its own
        // WHERE clause had subqueries.
        let nested_where_subqueries = subquery.in_where
            && (typ.is_exists() || typ.is_any() || typ.is_in())
            && select.original_where_had_subqueries;

        if select.has_windows
            || select.is_grouped()
            || nested_where_subqueries
            || !(typ.is_in() || typ.is_any() || typ.is_exists() || not_exists || parent.is_some())
        {
            return Ok(None);
        }

        let first_column_bound = (typ.is_in() || typ == SubqueryType::EqAny)
            && left.is_some_and(Expression::is_simple_operand);
        if !not_exists
            && unique::returns_at_most_single_row(self.catalog, arena, select, first_column_bound)?
        {
            return Ok(Some(FlattenKind::Join));
        }

        if !self.config.enable_exists_join_flattening
            || !(typ.is_in() || typ.is_any() || typ.is_exists() || not_exists)
            || !left.is_none_or(|l| l.categorize(arena, &mut TableMap::new()))
            || !select.where_predicates.all_pushable()
        {
            return Ok(None);
        }

        let Some(base) = select.from_list.single_base_table() else {
            return Ok(None);
        };
        if not_exists {
            // Anti join predicates may only filter the subquery's table,
            // never the outer rows.
            let right_references_table = match (left, right) {
                (Some(_), Some(r)) => r.referenced_tables(arena).contains(base.table_number),
                _ => true,
            };
            if !select.where_predicates.all_reference(base.table_number) || !right_references_table {
                return Ok(None);
            }
        }

        Ok(Some(FlattenKind::ExistsJoin { not_exists }))
    }

    /// Move the subquery's tables and predicates into the parent block,
    /// returning the join condition.
    fn flatten_to_join(
        &mut self,
        subquery: SubqueryExpr,
        parent: Option<ParentComparison>,
        target: &mut FlattenTarget,
    ) -> Result<Expression> {
        let SubqueryExpr {
            subquery_number,
            subquery_type,
            left_operand,
            result_set,
            level,
            ..
        } = subquery;

        let mut result_set = *result_set;
        result_set.decrement_level(&mut self.output.arena, level);
        let ResultSetNode::Select(select) = result_set else {
            return Err(DbError::internal("Flattening a subquery that isn't a select"));
        };
        let SelectNode {
            result_columns,
            from_list,
            mut where_predicates,
            ..
        } = *select;

        let condition = match (parent, left_operand) {
            (Some((left, op)), _) => compare(left, op, first_column_expression(self, &result_columns)?),
            (None, Some(left)) => {
                let op = subquery_type
                    .join_operator()
                    .required("join operator of a quantified subquery")?;
                compare(*left, op, first_column_expression(self, &result_columns)?)
            }
            (None, None) => lit(true),
        };

        tracing::debug!(
            subquery = subquery_number,
            tables = from_list.len(),
            predicates = where_predicates.len(),
            "flattened subquery into join",
        );

        target.tables.extend(from_list.tables);
        target.predicates.append(&mut where_predicates);
        self.record_outcome(subquery_number, SubqueryOutcome::FlattenedToJoin);
        Ok(condition)
    }

    /// Merge the subquery's only table into the parent block as an EXISTS or
    /// NOT EXISTS table holding every predicate of the subquery.
    fn flatten_to_exists_join(
        &mut self,
        subquery: SubqueryExpr,
        not_exists: bool,
        target: &mut FlattenTarget,
    ) -> Result<Expression> {
        let SubqueryExpr {
            subquery_number,
            subquery_type,
            left_operand,
            result_set,
            level,
            ..
        } = subquery;

        let mut result_set = *result_set;
        result_set.decrement_level(&mut self.output.arena, level);
        let ResultSetNode::Select(select) = result_set else {
            return Err(DbError::internal("Flattening a subquery that isn't a select"));
        };
        let SelectNode {
            result_columns,
            mut from_list,
            mut where_predicates,
            ..
        } = *select;

        let Some(FromTable::Base(mut table)) = from_list.tables.pop() else {
            return Err(DbError::internal("EXISTS join without a single base table"));
        };

        if let Some(left) = left_operand {
            let op = subquery_type
                .join_operator()
                .required("join operator of a quantified subquery")?;
            let right = first_column_expression(self, &result_columns)?;
            where_predicates.push(Predicate::new(compare(*left, op, right)));
        }
        where_predicates.categorize(&self.output.arena);

        table.exists = if not_exists {
            ExistsMarking::NotExists
        } else {
            ExistsMarking::Exists
        };
        table.restriction.append(&mut where_predicates);
        let mut dependencies = table.restriction.referenced_tables();
        dependencies.clear(table.table_number);
        table.dependency_map.or(&dependencies);

        tracing::debug!(
            subquery = subquery_number,
            table = %table.table_number,
            not_exists,
            "flattened subquery into exists join",
        );

        target.tables.push(FromTable::Base(table));
        self.record_outcome(subquery_number, SubqueryOutcome::FlattenedToExistsJoin);
        Ok(lit(true))
    }

    /// Keep the subquery, rewriting quantified and EXISTS forms into a
    /// boolean test over a subquery producing at most one row per outer row.
    fn retain_subquery(
        &mut self,
        mut subquery: SubqueryExpr,
        parent: Option<ParentComparison>,
    ) -> Result<Expression> {
        let typ = subquery.subquery_type;

        let outcome = if let Some(left) = subquery.left_operand.take() {
            // left op (SELECT x ...) becomes
            // (SELECT TRUE ... WHERE left op x) IS [NOT] NULL
            let child = *subquery.result_set;
            let mut prn = ProjectRestrictNode::new(&mut self.output.arena, child);
            let first = prn
                .result_columns
                .first()
                .required("first column of a quantified subquery")?;
            let right = self.output.arena[first].expression.clone();
            let op = typ
                .join_operator()
                .required("join operator of a quantified subquery")?;

            let mut left = *left;
            left.set_nesting_level(subquery.level);
            let left_nullable = left.datatype().nullable;
            let right_nullable = right.datatype().nullable;

            let mut condition = compare(left.clone(), op, right.clone());
            if typ.is_not_in() || typ.is_all() {
                // Any NULL on either side disqualifies the outer row.
                let mut terms = Vec::new();
                if right_nullable {
                    terms.push(is_null(right));
                }
                if left_nullable {
                    terms.push(is_null(left));
                }
                terms.push(condition);
                condition = or(terms);
            }

            let mut predicate = Predicate::new(condition);
            predicate.categorize(&self.output.arena);
            prn.restriction.push(predicate);

            self.output.arena.put_expression(first, lit(true));
            self.output.arena[first].datatype = DataType::boolean();

            subquery.result_set = Box::new(ResultSetNode::ProjectRestrict(Box::new(prn)));
            subquery.pushed_new_predicate = true;
            subquery.datatype = DataType::boolean().with_nullable(true);
            subquery.clear_caches();
            SubqueryOutcome::NotFlattened
        } else if typ.is_exists() || typ.is_not_exists() {
            subquery.subquery_type = SubqueryType::Exists;
            subquery.datatype = DataType::boolean().with_nullable(true);
            SubqueryOutcome::NotFlattened
        } else {
            subquery.materialized = self.config.enable_subquery_materialization
                && subquery.is_materializable(&self.output.arena);
            if subquery.materialized {
                if let Some(select) = subquery.result_set.as_select_mut() {
                    select.from_list.set_level(0);
                }
            }
            SubqueryOutcome::RetainedAsScalar
        };

        subquery.is_invariant(&self.output.arena);
        subquery.has_correlated_columns(&self.output.arena);
        subquery.mark_preprocessed(outcome)?;
        self.record_outcome(subquery.subquery_number, outcome);

        let expr = Expression::Subquery(subquery);
        Ok(match outcome {
            SubqueryOutcome::NotFlattened if typ.is_in() || typ.is_any() || typ.is_exists() => {
                is_not_null(expr)
            }
            SubqueryOutcome::NotFlattened => is_null(expr),
            _ => match parent {
                Some((left, op)) => compare(left, op, expr),
                None => expr,
            },
        })
    }
}

fn first_column(subquery: &SubqueryExpr) -> Result<RcRef> {
    subquery
        .result_set
        .result_columns()
        .first()
        .required("first column of a subquery")
}

/// Expression of the first column of a flattened select list.
fn first_column_expression(
    ctx: &PreprocessContext<'_>,
    columns: &ResultColumnList,
) -> Result<Expression> {
    let first = columns
        .visible_columns(&ctx.output.arena)
        .next()
        .required("first column of a flattened subquery")?;
    Ok(ctx.output.arena[first].expression.clone())
}
