use qtree_error::{DbError, Result, SqlState};

use super::bind_context::{BindContext, BindScopeRef};
use super::expr_binder::{ExpressionBinder, GROUP_BY_CLAUSE, HAVING_CLAUSE, WHERE_CLAUSE};
use super::from_binder::FromBinder;
use crate::ast;
use crate::expr::Expression;
use crate::rcl::{ColumnArena, RcRef, ResultColumn, ResultColumnList};
use crate::resultset::ResultSetNode;
use crate::resultset::order_by::OrderByList;
use crate::resultset::row::RowResultSet;
use crate::resultset::select::SelectNode;
use crate::resultset::setop::SetOpNode;

/// A bound query expression.
///
/// ORDER BY, OFFSET and FETCH apply to the whole query and are kept apart
/// from the result set they order.
#[derive(Debug)]
pub struct BoundQuery {
    pub result_set: ResultSetNode,
    pub order_by: Option<OrderByList>,
    pub offset: Option<u64>,
    pub fetch: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
pub struct QueryBinder {
    pub current: BindScopeRef,
}

impl QueryBinder {
    pub fn new(current: BindScopeRef) -> Self {
        QueryBinder { current }
    }

    pub fn bind(&self, ctx: &mut BindContext, query: &ast::Query) -> Result<BoundQuery> {
        let mut result_set = self.bind_body(ctx, self.current, &query.body)?;

        let order_by = if query.order_by.is_empty() {
            None
        } else {
            Some(self.bind_order_by(ctx, &mut result_set, &query.order_by)?)
        };

        Ok(BoundQuery {
            result_set,
            order_by,
            offset: query.offset,
            fetch: query.fetch,
        })
    }

    fn bind_body(
        &self,
        ctx: &mut BindContext,
        scope: BindScopeRef,
        body: &ast::QueryBody,
    ) -> Result<ResultSetNode> {
        match body {
            ast::QueryBody::Select(select) => self.bind_select(ctx, scope, select),
            ast::QueryBody::Values(row) => self.bind_values(ctx, scope, row),
            ast::QueryBody::SetOp {
                left,
                right,
                op,
                all,
            } => {
                // Sides see the enclosing blocks but not each other.
                let left_scope = ctx.new_sibling_scope(scope)?;
                let left = self.bind_body(ctx, left_scope, left)?;
                let right_scope = ctx.new_sibling_scope(scope)?;
                let right = self.bind_body(ctx, right_scope, right)?;

                let level = ctx.scope_level(scope)?;
                let table_number = ctx.next_table_number();
                let setop = SetOpNode::new(
                    &mut ctx.arena,
                    &mut ctx.names,
                    *op,
                    *all,
                    left,
                    right,
                    table_number,
                    level,
                )?;
                Ok(ResultSetNode::SetOp(Box::new(setop)))
            }
        }
    }

    fn bind_values(
        &self,
        ctx: &mut BindContext,
        scope: BindScopeRef,
        row: &[ast::Expr],
    ) -> Result<ResultSetNode> {
        let exprs = {
            let mut guard = ctx.restrict(|r| {
                r.allow_aggregates = false;
                r.allow_windows = false;
                r.clause = "VALUES clause";
            });
            let binder = ExpressionBinder::new(scope);
            row.iter()
                .map(|expr| binder.bind_expression(&mut guard, expr))
                .collect::<Result<Vec<_>>>()?
        };

        let level = ctx.scope_level(scope)?;
        let row = RowResultSet::new(&mut ctx.arena, exprs, level);
        row.result_columns.name_columns(&mut ctx.arena, &mut ctx.names);
        Ok(ResultSetNode::Row(row))
    }

    fn bind_select(
        &self,
        ctx: &mut BindContext,
        scope: BindScopeRef,
        select: &ast::Select,
    ) -> Result<ResultSetNode> {
        let level = ctx.scope_level(scope)?;
        let from_list = FromBinder::new(scope).bind_from_list(ctx, &select.from)?;
        let binder = ExpressionBinder::new(scope);

        let mut columns = Vec::with_capacity(select.projections.len());
        for item in &select.projections {
            match item {
                ast::SelectItem::Wildcard => {
                    let star = ctx.star_columns(scope)?.to_vec();
                    if star.is_empty() {
                        return Err(DbError::new("SELECT * requires a FROM clause"));
                    }
                    for (table_ref, col_idx) in star {
                        columns.push(star_column(ctx, binder, table_ref, col_idx)?);
                    }
                }
                ast::SelectItem::QualifiedWildcard(name) => {
                    let matching: Vec<_> = ctx
                        .iter_tables(scope)?
                        .filter(|t| t.alias.as_ref().is_some_and(|alias| alias.matches(name)))
                        .map(|t| (t.reference, t.columns.len()))
                        .collect();
                    let (table_ref, count) = match matching.as_slice() {
                        [single] => *single,
                        [] => {
                            return Err(DbError::new(format!(
                                "Table '{}' of '{}.*' not found in FROM list",
                                name.name, name.name
                            ))
                            .with_sql_state(SqlState::TableNotFound));
                        }
                        _ => {
                            return Err(DbError::new(format!(
                                "Ambiguous table name '{}' in '{}.*'",
                                name.name, name.name
                            ))
                            .with_sql_state(SqlState::AmbiguousColumnName));
                        }
                    };
                    for col_idx in 0..count {
                        columns.push(star_column(ctx, binder, table_ref, col_idx)?);
                    }
                }
                ast::SelectItem::Expr { expr, alias } => {
                    let bound = binder.bind_expression(ctx, expr)?;
                    let name = match (alias, expr) {
                        (Some(alias), _) => alias.clone(),
                        (None, ast::Expr::Column { column, .. }) => column.clone(),
                        _ => String::new(),
                    };
                    columns.push(ctx.arena.push(ResultColumn::new(name, bound)));
                }
            }
        }

        let result_columns = ResultColumnList::from_columns(&mut ctx.arena, columns);
        let mut node = SelectNode::new(level, result_columns, from_list);
        node.distinct = select.distinct;

        if let Some(selection) = &select.selection {
            let mut guard = ctx.restrict(|r| {
                r.allow_aggregates = false;
                r.allow_windows = false;
                r.clause = WHERE_CLAUSE;
            });
            let clause = binder.bind_boolean_clause(&mut guard, selection, WHERE_CLAUSE)?;
            node.original_where_had_subqueries = clause.contains_subquery();
            node.where_clause = Some(clause);
        }

        for expr in &select.group_by {
            let bound = {
                let mut guard = ctx.restrict(|r| {
                    r.allow_aggregates = false;
                    r.allow_windows = false;
                    r.allow_subqueries = false;
                    r.clause = GROUP_BY_CLAUSE;
                });
                binder.bind_expression(&mut guard, expr)?
            };
            check_orderable(&bound, "GROUP BY")?;

            let existing = node
                .result_columns
                .iter()
                .find(|&rc| ctx.arena[rc].expression == bound);
            let rc = match existing {
                Some(rc) => rc,
                None => {
                    let mut column = ResultColumn::new("", bound);
                    column.generated = true;
                    let rc = ctx.arena.push(column);
                    node.result_columns.add_result_column(&mut ctx.arena, rc);
                    rc
                }
            };
            if !node.group_by.contains(&rc) {
                node.group_by.push(rc);
            }
        }

        if let Some(having) = &select.having {
            let mut guard = ctx.restrict(|r| {
                r.allow_windows = false;
                r.clause = HAVING_CLAUSE;
            });
            node.having = Some(binder.bind_boolean_clause(&mut guard, having, HAVING_CLAUSE)?);
        }

        node.has_aggregates = node
            .result_columns
            .iter()
            .any(|rc| ctx.arena[rc].expression.contains_aggregate())
            || node.having.as_ref().is_some_and(|h| h.contains_aggregate());
        node.has_windows = node
            .result_columns
            .iter()
            .any(|rc| ctx.arena[rc].expression.contains_window());

        if node.is_grouped() {
            let grouping: Vec<Expression> = node
                .group_by
                .iter()
                .map(|&rc| ctx.arena[rc].expression.clone())
                .collect();
            for rc in node.result_columns.iter() {
                check_grouped(&ctx.arena[rc].expression, &grouping, level, "SELECT list")?;
            }
            if let Some(having) = &node.having {
                check_grouped(having, &grouping, level, HAVING_CLAUSE)?;
            }
        }

        if node.distinct {
            for rc in node.result_columns.visible_columns(&ctx.arena) {
                check_orderable(&ctx.arena[rc].expression, "SELECT DISTINCT")?;
            }
        }

        node.result_columns.name_columns(&mut ctx.arena, &mut ctx.names);

        tracing::trace!(
            level,
            columns = node.result_columns.len(),
            tables = node.from_list.len(),
            "bound select",
        );

        Ok(ResultSetNode::Select(Box::new(node)))
    }

    /// Bind ORDER BY against the result of the query.
    ///
    /// Positions and unqualified names refer to the select list. Other
    /// expressions of a SELECT not found in its select list are pulled up
    /// into it as hidden columns.
    fn bind_order_by(
        &self,
        ctx: &mut BindContext,
        result_set: &mut ResultSetNode,
        items: &[ast::OrderByExpr],
    ) -> Result<OrderByList> {
        let mut list = OrderByList::new();

        for item in items {
            let rcl = result_set.result_columns();
            let rc = match &item.target {
                ast::OrderByTarget::Position(pos) => {
                    let visible: Vec<_> = rcl.visible_columns(&ctx.arena).collect();
                    match pos.checked_sub(1).and_then(|idx| visible.get(idx)) {
                        Some(&rc) => rc,
                        None => {
                            return Err(DbError::new(format!(
                                "ORDER BY position {pos} is out of range, select list has {} columns",
                                visible.len()
                            )));
                        }
                    }
                }
                ast::OrderByTarget::Expr(expr) => {
                    let by_name = match expr {
                        ast::Expr::Column {
                            table: None,
                            column,
                        } => rcl.find_by_name(&ctx.arena, column),
                        _ => None,
                    };
                    match by_name {
                        Some(rc) => rc,
                        None => self.bind_order_by_expression(ctx, result_set, expr)?,
                    }
                }
            };

            check_orderable(&ctx.arena[rc].expression, "ORDER BY")?;
            list.push(rc, item.ascending);
        }

        Ok(list)
    }

    fn bind_order_by_expression(
        &self,
        ctx: &mut BindContext,
        result_set: &mut ResultSetNode,
        expr: &ast::Expr,
    ) -> Result<RcRef> {
        let Some(select) = result_set.as_select_mut() else {
            return Err(DbError::new(
                "ORDER BY of a set operation or VALUES must name a result column",
            ));
        };

        let bound = {
            let mut guard = ctx.restrict(|r| {
                r.allow_aggregates = select.is_grouped();
                r.allow_windows = false;
                r.clause = "ORDER BY clause";
            });
            ExpressionBinder::new(self.current).bind_expression(&mut guard, expr)?
        };

        if let Some(rc) = select
            .result_columns
            .visible_columns(&ctx.arena)
            .find(|&rc| ctx.arena[rc].expression == bound)
        {
            return Ok(rc);
        }

        if select.distinct {
            return Err(DbError::new(
                "ORDER BY expressions of SELECT DISTINCT must appear in the select list",
            ));
        }
        if select.is_grouped() {
            let grouping: Vec<Expression> = select
                .group_by
                .iter()
                .map(|&rc| ctx.arena[rc].expression.clone())
                .collect();
            check_grouped(&bound, &grouping, select.level, "ORDER BY clause")?;
        }

        let rc = ctx.arena.push(ResultColumn::new("", bound));
        select.result_columns.add_order_by_column(&mut ctx.arena, rc);
        select.result_columns.name_columns(&mut ctx.arena, &mut ctx.names);
        tracing::trace!(%rc, "pulled ORDER BY expression into select list");
        Ok(rc)
    }
}

fn star_column(
    ctx: &mut BindContext,
    binder: ExpressionBinder,
    table_ref: super::bind_context::ScopeTableRef,
    col_idx: usize,
) -> Result<RcRef> {
    let expr = binder.bind_scope_column(ctx, table_ref, col_idx)?;
    let name = match &expr {
        Expression::Column(col) => col.name.clone(),
        _ => String::new(),
    };
    Ok(ctx.arena.push(ResultColumn::new(name, expr)))
}

/// Error if a visible column still has no type. Untyped NULLs and parameters
/// can't be typed from their context in a select list.
pub(crate) fn check_typed_columns(arena: &ColumnArena, rcl: &ResultColumnList, what: &str) -> Result<()> {
    for rc in rcl.visible_columns(arena) {
        if arena[rc].datatype.is_unknown() {
            return Err(DbError::new(format!(
                "Untyped NULL or parameter not allowed in {what}, column '{}'",
                arena[rc].name
            ))
            .with_sql_state(SqlState::UntypedNull));
        }
    }
    Ok(())
}

fn check_orderable(expr: &Expression, what: &str) -> Result<()> {
    let datatype = expr.datatype();
    if !datatype.is_unknown() && !datatype.id.is_orderable() {
        return Err(DbError::new(format!("Values of type {datatype} can't be used in {what}"))
            .with_sql_state(SqlState::DistinctNotOrderable));
    }
    Ok(())
}

/// Check that `expr` only reads grouping expressions, aggregates and columns
/// of outer blocks.
fn check_grouped(expr: &Expression, grouping: &[Expression], level: usize, clause: &str) -> Result<()> {
    if grouping.contains(expr) {
        return Ok(());
    }
    match expr {
        Expression::Aggregate(_) | Expression::Literal(_) | Expression::Parameter(_) => Ok(()),
        Expression::Column(col) if col.source_level < level => Ok(()),
        Expression::Column(col) => Err(DbError::new(format!(
            "Column '{}' in {clause} must appear in GROUP BY or be used in an aggregate",
            col.name
        ))),
        other => other.for_each_child(&mut |child| check_grouped(child, grouping, level, clause)),
    }
}
