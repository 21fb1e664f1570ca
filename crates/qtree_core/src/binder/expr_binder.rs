use qtree_error::{DbError, OptionExt, Result, SqlState};

use super::bind_context::{BindContext, BindScopeRef, Restrictions, ScopeTableRef};
use super::query_binder::{BoundQuery, QueryBinder, check_typed_columns};
use crate::ast;
use crate::catalog::RoutineNamespace;
use crate::catalog::dependency::Provider;
use crate::expr::aggregate_expr::{AggregateExpr, AggregateKind};
use crate::expr::arith_expr::ArithExpr;
use crate::expr::column_expr::ColumnExpr;
use crate::expr::literal_expr::ParameterExpr;
use crate::expr::scalar_function_expr::ScalarFunctionExpr;
use crate::expr::subquery_expr::{SubqueryExpr, SubqueryType};
use crate::expr::window_expr::{WindowExpr, WindowFunction};
use crate::expr::{self, Expression, lit};
use crate::rcl::{ResultColumn, ResultColumnList};
use crate::resultset::ResultSetNode;
use crate::types::DataType;

pub const WHERE_CLAUSE: &str = "WHERE clause";
pub const HAVING_CLAUSE: &str = "HAVING clause";
pub const ON_CLAUSE: &str = "ON clause";
pub const GROUP_BY_CLAUSE: &str = "GROUP BY clause";

/// Binds ast expressions against a scope.
///
/// What may appear in the expression (aggregates, windows, subqueries) is
/// governed by the context's current restrictions.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionBinder {
    pub current: BindScopeRef,
}

impl ExpressionBinder {
    pub fn new(current: BindScopeRef) -> Self {
        ExpressionBinder { current }
    }

    /// Bind a WHERE, ON or HAVING condition, which has to be boolean.
    pub fn bind_boolean_clause(
        &self,
        ctx: &mut BindContext,
        expr: &ast::Expr,
        clause: &'static str,
    ) -> Result<Expression> {
        let mut bound = self.bind_expression(ctx, expr)?;
        infer_parameter(&mut bound, DataType::boolean());
        check_boolean(&bound, clause)?;
        Ok(bound)
    }

    pub fn bind_expression(&self, ctx: &mut BindContext, expr: &ast::Expr) -> Result<Expression> {
        match expr {
            ast::Expr::Column { table, column } => {
                let resolved = ctx.resolve_column(self.current, table.as_ref(), column)?;
                let level = ctx.scope_level(self.current)?;
                let mut col = ColumnExpr::new(
                    resolved.name,
                    Some(resolved.table_number),
                    resolved.rc,
                    level,
                    resolved.source_level,
                    resolved.datatype,
                );
                col.table_name = resolved.table_name;
                Ok(Expression::Column(col))
            }
            ast::Expr::Literal(value) => Ok(lit(value.clone())),
            ast::Expr::Parameter(index) => Ok(Expression::Parameter(ParameterExpr {
                index: *index,
                datatype: DataType::unknown(),
            })),
            ast::Expr::Comparison { left, op, right } => {
                let mut left = self.bind_expression(ctx, left)?;
                let mut right = self.bind_expression(ctx, right)?;
                unify_operands(&mut left, &mut right, "comparison")?;
                let (lt, rt) = (left.datatype(), right.datatype());
                if !lt.is_unknown() && !rt.is_unknown() && !lt.union_compatible(&rt) {
                    return Err(DbError::new(format!("Cannot compare {lt} with {rt}")));
                }
                Ok(expr::compare(left, *op, right))
            }
            ast::Expr::And(exprs) => {
                let exprs = self.bind_boolean_operands(ctx, exprs, "AND")?;
                Ok(expr::and(exprs))
            }
            ast::Expr::Or(exprs) => {
                let exprs = self.bind_boolean_operands(ctx, exprs, "OR")?;
                Ok(expr::or(exprs))
            }
            ast::Expr::Not(inner) => {
                let mut inner = self.bind_expression(ctx, inner)?;
                infer_parameter(&mut inner, DataType::boolean());
                check_boolean(&inner, "NOT")?;
                Ok(expr::not(inner))
            }
            ast::Expr::IsNull { expr: inner, negated } => {
                let inner = self.bind_expression(ctx, inner)?;
                if matches!(inner, Expression::Parameter(_)) {
                    return Err(untyped("IS NULL"));
                }
                Ok(if *negated {
                    expr::is_not_null(inner)
                } else {
                    expr::is_null(inner)
                })
            }
            ast::Expr::Arith { left, op, right } => {
                let mut left = self.bind_expression(ctx, left)?;
                let mut right = self.bind_expression(ctx, right)?;
                unify_operands(&mut left, &mut right, "arithmetic")?;
                for operand in [&left, &right] {
                    let datatype = operand.datatype();
                    if !datatype.is_unknown() && !datatype.id.is_numeric() {
                        return Err(DbError::new(format!(
                            "Arithmetic operator '{op}' not supported for {datatype}"
                        )));
                    }
                }
                let datatype = left.datatype().dominant_type(&right.datatype());
                Ok(Expression::Arith(ArithExpr {
                    left: Box::new(left),
                    right: Box::new(right),
                    op: *op,
                    datatype,
                }))
            }
            ast::Expr::Function { name, args } => self.bind_function(ctx, name, args),
            ast::Expr::Aggregate {
                name,
                arg,
                distinct,
            } => self.bind_aggregate(ctx, name, arg.as_deref(), *distinct),
            ast::Expr::Window { name } => {
                let restrictions = ctx.restrictions();
                if !restrictions.allow_windows {
                    return Err(DbError::new(format!(
                        "Window functions are not allowed in {}",
                        restrictions.clause
                    )));
                }
                let function = WindowFunction::from_name(name).ok_or_else(|| {
                    DbError::new(format!("Unknown window function '{name}'"))
                        .with_sql_state(SqlState::RoutineNotFound)
                })?;
                Ok(Expression::Window(WindowExpr::new(function)))
            }
            ast::Expr::Subquery { kind, query } => self.bind_subquery(ctx, kind, query),
        }
    }

    /// Reference a column of a table in scope, used when expanding `*` and
    /// USING columns.
    pub fn bind_scope_column(
        &self,
        ctx: &mut BindContext,
        table_ref: ScopeTableRef,
        col_idx: usize,
    ) -> Result<Expression> {
        let level = ctx.scope_level(self.current)?;
        let table = ctx.get_table(table_ref)?;
        let column = table
            .columns
            .get(col_idx)
            .required("column index in scope table")?;
        let (name, rc, table_number) = (column.name.clone(), column.rc, table.table_number);
        let table_name = table.alias.as_ref().map(|alias| alias.table.clone());

        ctx.arena.mark_referenced(rc);
        let mut col = ColumnExpr::new(
            name,
            Some(table_number),
            rc,
            level,
            level,
            ctx.arena[rc].datatype,
        );
        col.table_name = table_name;
        Ok(Expression::Column(col))
    }

    fn bind_boolean_operands(
        &self,
        ctx: &mut BindContext,
        exprs: &[ast::Expr],
        operator: &'static str,
    ) -> Result<Vec<Expression>> {
        exprs
            .iter()
            .map(|expr| {
                let mut bound = self.bind_expression(ctx, expr)?;
                infer_parameter(&mut bound, DataType::boolean());
                check_boolean(&bound, operator)?;
                Ok(bound)
            })
            .collect()
    }

    fn bind_function(
        &self,
        ctx: &mut BindContext,
        name: &ast::ObjectName,
        args: &[ast::Expr],
    ) -> Result<Expression> {
        let catalog = ctx.catalog;
        let schema = name
            .schema
            .clone()
            .unwrap_or_else(|| ctx.config.default_schema.clone());

        let routine = catalog
            .get_routine(&schema, &name.name, RoutineNamespace::Function)?
            .ok_or_else(|| {
                DbError::new(format!("No function matches '{schema}.{}'", name.name))
                    .with_sql_state(SqlState::RoutineNotFound)
            })?;
        ctx.register_dependency(Provider::Routine {
            schema: routine.schema.clone(),
            name: routine.name.clone(),
        });

        let inputs = args
            .iter()
            .map(|arg| self.bind_expression(ctx, arg))
            .collect::<Result<Vec<_>>>()?;

        Ok(Expression::ScalarFunction(ScalarFunctionExpr {
            schema: routine.schema.clone(),
            name: routine.name.clone(),
            inputs,
            deterministic: routine.deterministic,
            datatype: routine.return_type.with_nullable(true),
        }))
    }

    fn bind_aggregate(
        &self,
        ctx: &mut BindContext,
        name: &ast::ObjectName,
        arg: Option<&ast::Expr>,
        distinct: bool,
    ) -> Result<Expression> {
        let restrictions = ctx.restrictions();
        if !restrictions.allow_aggregates {
            return Err(DbError::new(format!(
                "Aggregate '{}' not allowed in {}",
                name.name, restrictions.clause
            ))
            .with_sql_state(SqlState::AggregateNotAllowed));
        }

        let builtin = match name.schema {
            None => AggregateKind::builtin(&name.name),
            Some(_) => None,
        };

        let (kind, schema, user_type) = match builtin {
            Some(kind) => (kind, None, None),
            None => {
                let catalog = ctx.catalog;
                let schema = name
                    .schema
                    .clone()
                    .unwrap_or_else(|| ctx.config.default_schema.clone());
                let routine = catalog
                    .get_routine(&schema, &name.name, RoutineNamespace::Aggregate)?
                    .ok_or_else(|| {
                        DbError::new(format!("No aggregate matches '{schema}.{}'", name.name))
                            .with_sql_state(SqlState::RoutineNotFound)
                    })?;
                if distinct && !routine.allows_distinct {
                    return Err(DbError::new(format!(
                        "DISTINCT not allowed for aggregate '{schema}.{}'",
                        name.name
                    ))
                    .with_sql_state(SqlState::DistinctNotAllowed));
                }
                ctx.register_dependency(Provider::Routine {
                    schema: routine.schema.clone(),
                    name: routine.name.clone(),
                });
                (AggregateKind::User, Some(schema), Some(routine.return_type))
            }
        };

        let operand = match arg {
            Some(arg) => {
                let mut guard = ctx.restrict(|r| {
                    r.allow_aggregates = true;
                    r.allow_windows = true;
                    r.allow_subqueries = false;
                    r.in_aggregate = true;
                    r.clause = "aggregate";
                });
                Some(self.bind_expression(&mut guard, arg)?)
            }
            None if kind == AggregateKind::Count => None,
            None => {
                return Err(DbError::new(format!(
                    "Aggregate '{}' requires an argument",
                    name.name
                )));
            }
        };

        if let Some(operand) = &operand {
            if operand.contains_aggregate() {
                return Err(DbError::new(format!(
                    "Aggregate '{}' contains another aggregate",
                    name.name
                ))
                .with_sql_state(SqlState::NestedAggregate));
            }
            if operand.contains_window() {
                return Err(DbError::new(format!(
                    "Aggregate '{}' contains a window function",
                    name.name
                ))
                .with_sql_state(SqlState::WindowInAggregate));
            }
        }

        let operand_type = operand.as_ref().map(|operand| operand.datatype());
        if let Some(datatype) = operand_type {
            if datatype.is_unknown() {
                return Err(untyped("aggregate argument"));
            }
            if distinct && !datatype.id.is_orderable() {
                return Err(DbError::new(format!(
                    "DISTINCT aggregate '{}' over unorderable type {datatype}",
                    name.name
                ))
                .with_sql_state(SqlState::DistinctNotOrderable));
            }
        }

        let datatype = match (kind, operand_type) {
            (AggregateKind::Count, _) => DataType::bigint().with_nullable(false),
            (AggregateKind::Sum | AggregateKind::Avg, Some(datatype)) => {
                if !datatype.id.is_numeric() {
                    return Err(DbError::new(format!(
                        "Aggregate '{}' requires a numeric argument, got {datatype}",
                        name.name
                    )));
                }
                datatype.with_nullable(true)
            }
            (AggregateKind::Min | AggregateKind::Max, Some(datatype)) => {
                if !datatype.id.is_orderable() {
                    return Err(DbError::new(format!(
                        "Aggregate '{}' requires an orderable argument, got {datatype}",
                        name.name
                    )));
                }
                datatype.with_nullable(true)
            }
            (AggregateKind::User, _) => user_type
                .required("user aggregate return type")?
                .with_nullable(true),
            (_, None) => return Err(DbError::internal("Missing aggregate operand")),
        };

        let mut operand = operand;
        if kind == AggregateKind::Count
            && !distinct
            && ctx.config.enable_count_star_rewrite
            && matches!(&operand, Some(Expression::Column(col)) if !col.datatype.nullable)
        {
            tracing::debug!("rewrote COUNT of non-nullable column to COUNT(*)");
            operand = None;
        }

        Ok(Expression::Aggregate(AggregateExpr {
            kind,
            name: name.name.clone(),
            schema,
            operand: operand.map(Box::new),
            distinct,
            datatype,
            generated: None,
        }))
    }

    fn bind_subquery(
        &self,
        ctx: &mut BindContext,
        kind: &ast::SubqueryKind,
        query: &ast::Query,
    ) -> Result<Expression> {
        let restrictions = ctx.restrictions();
        if !restrictions.allow_subqueries {
            return Err(DbError::new(format!(
                "Subqueries are not allowed in {}",
                restrictions.clause
            ))
            .with_sql_state(SqlState::SubqueryNotAllowed));
        }

        let (subquery_type, mut left) = match kind {
            ast::SubqueryKind::Scalar => (SubqueryType::Expression, None),
            ast::SubqueryKind::Exists { negated: false } => (SubqueryType::Exists, None),
            ast::SubqueryKind::Exists { negated: true } => (SubqueryType::NotExists, None),
            ast::SubqueryKind::In { expr, negated } => {
                let typ = if *negated {
                    SubqueryType::NotIn
                } else {
                    SubqueryType::In
                };
                (typ, Some(self.bind_expression(ctx, expr)?))
            }
            ast::SubqueryKind::Quantified {
                expr,
                op,
                quantifier,
            } => {
                let typ = match quantifier {
                    ast::Quantifier::Any => SubqueryType::any(*op),
                    ast::Quantifier::All => SubqueryType::all(*op),
                };
                (typ, Some(self.bind_expression(ctx, expr)?))
            }
        };

        let child = ctx.new_child_scope(self.current)?;
        let level = ctx.scope_level(child)?;
        let BoundQuery {
            mut result_set,
            mut order_by,
            offset,
            fetch,
        } = {
            let mut guard = ctx.restrict(|r| *r = Restrictions::default());
            QueryBinder::new(child).bind(&mut guard, query)?
        };

        let datatype = if subquery_type.is_exists() || subquery_type.is_not_exists() {
            reduce_exists_select_list(ctx, &mut result_set)?;
            if offset.is_none() && fetch.is_none() {
                order_by = None;
            }
            DataType::boolean().with_nullable(false)
        } else {
            let rcl = result_set.result_columns();
            let visible = rcl.visible_size(&ctx.arena);
            if visible != 1 {
                return Err(DbError::new(format!(
                    "Subquery must return exactly one column, got {visible}"
                ))
                .with_sql_state(SqlState::ColumnCountMismatch));
            }
            check_typed_columns(&ctx.arena, rcl, "subquery select list")?;
            let column_type = rcl
                .visible_columns(&ctx.arena)
                .next()
                .map(|rc| ctx.arena[rc].datatype)
                .required("subquery column")?;

            if let Some(left) = &mut left {
                let left_type = left.datatype();
                infer_parameter(left, column_type);
                if !left_type.is_unknown() && !left_type.union_compatible(&column_type) {
                    return Err(DbError::new(format!(
                        "Cannot compare {left_type} with {column_type}"
                    )));
                }
            }

            match subquery_type {
                SubqueryType::Expression => column_type.with_nullable(true),
                _ => DataType::boolean(),
            }
        };

        let number = ctx.next_subquery_number();
        let mut subquery = SubqueryExpr::new(number, subquery_type, left, result_set, level);
        subquery.have_order_by = order_by.is_some();
        subquery.order_by = order_by;
        subquery.offset = offset;
        subquery.fetch = fetch;
        subquery.in_where = restrictions.clause == WHERE_CLAUSE;
        subquery.in_having = restrictions.clause == HAVING_CLAUSE;
        subquery.mark_bound(datatype)?;

        tracing::trace!(number, typ = subquery_type.as_str(), level, "bound subquery");

        Ok(Expression::Subquery(subquery))
    }
}

/// Replace the select list of an EXISTS subquery with a single TRUE column.
///
/// Grouped or DISTINCT blocks keep their columns as generated columns since
/// they still decide which rows exist.
fn reduce_exists_select_list(ctx: &mut BindContext, result_set: &mut ResultSetNode) -> Result<()> {
    let Some(select) = result_set.as_select_mut() else {
        return Ok(());
    };

    let mut column = ResultColumn::new("", lit(true));
    column.name_generated = true;
    column.referenced = true;
    let rc = ctx.arena.push(column);

    if select.is_grouped() || select.distinct {
        for existing in select.result_columns.iter() {
            ctx.arena[existing].generated = true;
        }
        select.result_columns.insert(&mut ctx.arena, 0, rc);
    } else {
        select.result_columns = ResultColumnList::from_columns(&mut ctx.arena, vec![rc]);
    }
    select.result_columns.name_columns(&mut ctx.arena, &mut ctx.names);
    Ok(())
}

/// Give an untyped parameter the type of the context it is used in.
pub(crate) fn infer_parameter(expr: &mut Expression, datatype: DataType) {
    if let Expression::Parameter(param) = expr {
        if param.datatype.is_unknown() {
            param.datatype = datatype.with_nullable(true);
        }
    }
}

/// Infer parameter types of a binary operation from the other operand.
fn unify_operands(left: &mut Expression, right: &mut Expression, what: &str) -> Result<()> {
    let (lt, rt) = (left.datatype(), right.datatype());
    match (lt.is_unknown(), rt.is_unknown()) {
        (true, true) => Err(untyped(what)),
        (true, false) => {
            infer_parameter(left, rt);
            Ok(())
        }
        (false, true) => {
            infer_parameter(right, lt);
            Ok(())
        }
        (false, false) => Ok(()),
    }
}

fn check_boolean(expr: &Expression, clause: &str) -> Result<()> {
    let datatype = expr.datatype();
    if datatype.is_unknown() {
        return Err(untyped(clause));
    }
    if !datatype.is_boolean() {
        return Err(DbError::new(format!(
            "{clause} must be a boolean expression, got {datatype}"
        ))
        .with_sql_state(SqlState::NonBooleanClause));
    }
    Ok(())
}

pub(crate) fn untyped(what: &str) -> DbError {
    DbError::new(format!("Untyped NULL or parameter not allowed in {what}"))
        .with_sql_state(SqlState::UntypedNull)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use crate::binder::bind_context::{ScopeColumn, TableAlias};
    use crate::config::CompileConfig;
    use crate::expr::comparison_expr::ComparisonOperator;
    use crate::expr::literal_expr::ScalarValue;
    use crate::table_map::TableNumber;
    use crate::testutil;

    /// Scope with T1(C INTEGER NOT NULL, A INTEGER).
    fn scope_with_t1(ctx: &mut BindContext) -> BindScopeRef {
        let root = ctx.root_scope_ref();
        let c = ctx.arena.push(ResultColumn::new(
            "C",
            Expression::Parameter(ParameterExpr {
                index: 99,
                datatype: DataType::integer().with_nullable(false),
            }),
        ));
        let a = ctx.arena.push(ResultColumn::new(
            "A",
            Expression::Parameter(ParameterExpr {
                index: 98,
                datatype: DataType::integer(),
            }),
        ));
        let columns = vec![
            ScopeColumn {
                name: "C".to_string(),
                rc: c,
            },
            ScopeColumn {
                name: "A".to_string(),
                rc: a,
            },
        ];
        let alias = Some(TableAlias {
            schema: Some("APP".to_string()),
            table: "T1".to_string(),
        });
        ctx.push_table(root, alias, TableNumber(0), columns).unwrap();
        root
    }

    fn count(arg: Option<Expr>, distinct: bool) -> Expr {
        Expr::Aggregate {
            name: ast::ObjectName::new("COUNT"),
            arg: arg.map(Box::new),
            distinct,
        }
    }

    #[test]
    fn parameter_takes_type_of_other_operand() {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let mut ctx = BindContext::new(&catalog, &config);
        let scope = scope_with_t1(&mut ctx);

        let expr = Expr::eq(Expr::Parameter(0), Expr::column("A"));
        let bound = ExpressionBinder::new(scope)
            .bind_expression(&mut ctx, &expr)
            .unwrap();
        let Expression::Comparison(cmp) = bound else {
            panic!("expected comparison")
        };
        assert_eq!(DataType::integer(), cmp.left.datatype());
    }

    #[test]
    fn two_parameters_untyped() {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let mut ctx = BindContext::new(&catalog, &config);
        let scope = scope_with_t1(&mut ctx);

        let expr = Expr::eq(Expr::Parameter(0), Expr::Parameter(1));
        let err = ExpressionBinder::new(scope)
            .bind_expression(&mut ctx, &expr)
            .unwrap_err();
        assert_eq!(Some(SqlState::UntypedNull), err.sql_state());
    }

    #[test]
    fn where_clause_must_be_boolean() {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let mut ctx = BindContext::new(&catalog, &config);
        let scope = scope_with_t1(&mut ctx);

        let err = ExpressionBinder::new(scope)
            .bind_boolean_clause(&mut ctx, &Expr::column("A"), WHERE_CLAUSE)
            .unwrap_err();
        assert_eq!(Some(SqlState::NonBooleanClause), err.sql_state());

        let bound = ExpressionBinder::new(scope)
            .bind_boolean_clause(&mut ctx, &Expr::Parameter(0), WHERE_CLAUSE)
            .unwrap();
        assert!(bound.datatype().is_boolean());
    }

    #[test]
    fn count_of_non_nullable_column_is_count_star() {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let mut ctx = BindContext::new(&catalog, &config);
        let scope = scope_with_t1(&mut ctx);
        let binder = ExpressionBinder::new(scope);

        let bound = binder
            .bind_expression(&mut ctx, &count(Some(Expr::column("C")), false))
            .unwrap();
        let Expression::Aggregate(agg) = bound else {
            panic!("expected aggregate")
        };
        assert!(agg.is_count_star());
        assert!(!agg.datatype.nullable);

        // Nullable column keeps its operand.
        let bound = binder
            .bind_expression(&mut ctx, &count(Some(Expr::column("A")), false))
            .unwrap();
        let Expression::Aggregate(agg) = bound else {
            panic!("expected aggregate")
        };
        assert!(!agg.is_count_star());
    }

    #[test]
    fn nested_aggregate_rejected() {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let mut ctx = BindContext::new(&catalog, &config);
        let scope = scope_with_t1(&mut ctx);

        let expr = Expr::Aggregate {
            name: ast::ObjectName::new("SUM"),
            arg: Some(Box::new(count(None, false))),
            distinct: false,
        };
        let err = ExpressionBinder::new(scope)
            .bind_expression(&mut ctx, &expr)
            .unwrap_err();
        assert_eq!(Some(SqlState::NestedAggregate), err.sql_state());
    }

    #[test]
    fn window_in_aggregate_rejected() {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let mut ctx = BindContext::new(&catalog, &config);
        let scope = scope_with_t1(&mut ctx);

        let expr = Expr::Aggregate {
            name: ast::ObjectName::new("MAX"),
            arg: Some(Box::new(Expr::Window {
                name: "ROW_NUMBER".to_string(),
            })),
            distinct: false,
        };
        let err = ExpressionBinder::new(scope)
            .bind_expression(&mut ctx, &expr)
            .unwrap_err();
        assert_eq!(Some(SqlState::WindowInAggregate), err.sql_state());
    }

    #[test]
    fn aggregate_not_allowed_in_where() {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let mut ctx = BindContext::new(&catalog, &config);
        let scope = scope_with_t1(&mut ctx);

        let mut guard = ctx.restrict(|r| {
            r.allow_aggregates = false;
            r.clause = WHERE_CLAUSE;
        });
        let err = ExpressionBinder::new(scope)
            .bind_expression(&mut guard, &count(None, false))
            .unwrap_err();
        assert_eq!(Some(SqlState::AggregateNotAllowed), err.sql_state());
        assert!(err.get_msg().contains(WHERE_CLAUSE));
    }

    #[test]
    fn user_aggregate_distinct_checked() {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let mut ctx = BindContext::new(&catalog, &config);
        let scope = scope_with_t1(&mut ctx);
        let binder = ExpressionBinder::new(scope);

        let agg = |name: &str| Expr::Aggregate {
            name: ast::ObjectName::new(name),
            arg: Some(Box::new(Expr::column("A"))),
            distinct: true,
        };

        let bound = binder.bind_expression(&mut ctx, &agg("MEDIAN")).unwrap();
        let Expression::Aggregate(bound) = bound else {
            panic!("expected aggregate")
        };
        assert_eq!(AggregateKind::User, bound.kind);

        let err = binder.bind_expression(&mut ctx, &agg("MODE")).unwrap_err();
        assert_eq!(Some(SqlState::DistinctNotAllowed), err.sql_state());

        let err = binder.bind_expression(&mut ctx, &agg("NOPE")).unwrap_err();
        assert_eq!(Some(SqlState::RoutineNotFound), err.sql_state());
    }

    #[test]
    fn not_over_comparison_kept_for_normalization() {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let mut ctx = BindContext::new(&catalog, &config);
        let scope = scope_with_t1(&mut ctx);

        let expr = Expr::Not(Box::new(Expr::compare(
            Expr::column("A"),
            ComparisonOperator::Lt,
            Expr::Literal(ScalarValue::Int32(4)),
        )));
        let bound = ExpressionBinder::new(scope)
            .bind_expression(&mut ctx, &expr)
            .unwrap();
        assert!(matches!(bound, Expression::Not(_)));
        assert!(bound.datatype().is_boolean());
    }

    #[test]
    fn unknown_function() {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let mut ctx = BindContext::new(&catalog, &config);
        let scope = scope_with_t1(&mut ctx);

        let expr = Expr::Function {
            name: ast::ObjectName::new("NO_SUCH_FN"),
            args: Vec::new(),
        };
        let err = ExpressionBinder::new(scope)
            .bind_expression(&mut ctx, &expr)
            .unwrap_err();
        assert_eq!(Some(SqlState::RoutineNotFound), err.sql_state());
    }
}
