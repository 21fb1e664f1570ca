use qtree_error::{DbError, OptionExt, Result, SqlState, not_implemented};

use super::bind_context::{BindContext, BindScopeRef, Restrictions, ScopeColumn, ScopeTableRef, TableAlias, UsingColumn};
use super::expr_binder::{ExpressionBinder, ON_CLAUSE};
use super::find_similar;
use super::query_binder::{BoundQuery, QueryBinder, check_typed_columns};
use crate::ast;
use crate::catalog::RoutineNamespace;
use crate::catalog::dependency::Provider;
use crate::expr::comparison_expr::ComparisonOperator;
use crate::expr::{self, Expression};
use crate::from::FromTable;
use crate::from::base_table::FromBaseTable;
use crate::from::from_list::FromList;
use crate::from::join::{JoinKind, JoinNode};
use crate::from::subquery_table::FromSubquery;
use crate::from::vti::FromVti;
use crate::rcl::{ColumnArena, ResultColumnList};

/// Binds the FROM clause of a query block.
///
/// Every top level entry gets bound in its own scope so that entries can't
/// see each other, then its tables are appended to `current`.
#[derive(Debug, Clone, Copy)]
pub struct FromBinder {
    pub current: BindScopeRef,
}

impl FromBinder {
    pub fn new(current: BindScopeRef) -> Self {
        FromBinder { current }
    }

    pub fn bind_from_list(&self, ctx: &mut BindContext, items: &[ast::FromItem]) -> Result<FromList> {
        let mut list = FromList::new();
        for item in items {
            let scope = ctx.new_sibling_scope(self.current)?;
            let table = self.bind_item(ctx, scope, item)?;
            ctx.append_context(self.current, scope)?;
            list.push(table);
        }
        Ok(list)
    }

    fn bind_item(&self, ctx: &mut BindContext, scope: BindScopeRef, item: &ast::FromItem) -> Result<FromTable> {
        match item {
            ast::FromItem::Table { name, alias } => self.bind_table(ctx, scope, name, alias.as_deref()),
            ast::FromItem::Function { name, args, alias } => self.bind_vti(ctx, scope, name, args, alias),
            ast::FromItem::Derived { query, alias, columns } => {
                self.bind_derived(ctx, scope, query, alias, columns)
            }
            ast::FromItem::Join {
                left,
                right,
                kind,
                constraint,
            } => self.bind_join(ctx, scope, left, right, *kind, constraint),
        }
    }

    fn bind_table(
        &self,
        ctx: &mut BindContext,
        scope: BindScopeRef,
        name: &ast::ObjectName,
        alias: Option<&str>,
    ) -> Result<FromTable> {
        let catalog = ctx.catalog;
        let schema = name
            .schema
            .clone()
            .unwrap_or_else(|| ctx.config.default_schema.clone());

        let desc = match catalog.get_table(&schema, &name.name)? {
            Some(desc) => desc,
            None => {
                let names = catalog.list_table_names(&schema)?;
                let msg = match find_similar(names.iter().map(|n| n.as_str()), &name.name) {
                    Some(similar) => format!(
                        "Missing table '{schema}.{}', did you mean '{similar}'?",
                        name.name
                    ),
                    None => format!("Missing table '{schema}.{}'", name.name),
                };
                return Err(DbError::new(msg).with_sql_state(SqlState::TableNotFound));
            }
        };

        ctx.register_dependency(Provider::Table {
            schema: desc.schema.clone(),
            name: desc.name.clone(),
        });

        let level = ctx.scope_level(scope)?;
        let table_number = ctx.next_table_number();
        let table = FromBaseTable::new(
            &mut ctx.arena,
            desc,
            alias.map(|a| a.to_string()),
            table_number,
            level,
        );

        let exposed = match alias {
            Some(alias) => TableAlias {
                schema: None,
                table: alias.to_string(),
            },
            None => TableAlias {
                schema: Some(desc.schema.clone()),
                table: desc.name.clone(),
            },
        };
        let columns = scope_columns(&ctx.arena, &table.result_columns);
        ctx.push_table(scope, Some(exposed), table_number, columns)?;

        tracing::trace!(table = %table.name, %table_number, level, "bound base table");

        Ok(FromTable::Base(table))
    }

    fn bind_vti(
        &self,
        ctx: &mut BindContext,
        scope: BindScopeRef,
        name: &ast::ObjectName,
        args: &[ast::Expr],
        alias: &str,
    ) -> Result<FromTable> {
        let catalog = ctx.catalog;
        let schema = name
            .schema
            .clone()
            .unwrap_or_else(|| ctx.config.default_schema.clone());

        let routine = catalog
            .get_routine(&schema, &name.name, RoutineNamespace::TableFunction)?
            .ok_or_else(|| {
                DbError::new(format!("No table function matches '{schema}.{}'", name.name))
                    .with_sql_state(SqlState::RoutineNotFound)
            })?;
        ctx.register_dependency(Provider::Routine {
            schema: routine.schema.clone(),
            name: routine.name.clone(),
        });

        // Arguments may reference earlier entries of the same FROM list.
        let args = {
            let mut guard = ctx.restrict(|r| {
                r.allow_aggregates = false;
                r.allow_windows = false;
                r.allow_subqueries = false;
                r.clause = "table function arguments";
            });
            let binder = ExpressionBinder::new(self.current);
            args.iter()
                .map(|arg| binder.bind_expression(&mut guard, arg))
                .collect::<Result<Vec<_>>>()?
        };

        let level = ctx.scope_level(scope)?;
        let table_number = ctx.next_table_number();
        let vti = FromVti::new(
            &mut ctx.arena,
            routine,
            args,
            alias.to_string(),
            table_number,
            level,
        );

        let columns = scope_columns(&ctx.arena, &vti.result_columns);
        let exposed = TableAlias {
            schema: None,
            table: alias.to_string(),
        };
        ctx.push_table(scope, Some(exposed), table_number, columns)?;

        Ok(FromTable::Vti(vti))
    }

    fn bind_derived(
        &self,
        ctx: &mut BindContext,
        scope: BindScopeRef,
        query: &ast::Query,
        alias: &str,
        columns: &[String],
    ) -> Result<FromTable> {
        // The derived query sees enclosing blocks, not its siblings.
        let parent = ctx.get_parent_ref(self.current)?;
        let level = ctx.scope_level(scope)?;
        let query_scope = ctx.new_scope(parent, level + 1);

        let BoundQuery {
            result_set,
            order_by,
            offset,
            fetch,
        } = {
            let mut guard = ctx.restrict(|r| *r = Restrictions::default());
            QueryBinder::new(query_scope).bind(&mut guard, query)?
        };

        if offset.is_some() || fetch.is_some() {
            not_implemented!("OFFSET/FETCH in derived table '{alias}'");
        }
        if order_by.is_some() {
            tracing::debug!(alias, "dropped ORDER BY of derived table");
        }
        check_typed_columns(&ctx.arena, result_set.result_columns(), "derived table")?;

        let table_number = ctx.next_table_number();
        let names = (!columns.is_empty()).then_some(columns);
        let derived = FromSubquery::new(
            &mut ctx.arena,
            result_set,
            alias.to_string(),
            names,
            table_number,
            level,
        )?;

        let columns = scope_columns(&ctx.arena, &derived.result_columns);
        let exposed = TableAlias {
            schema: None,
            table: alias.to_string(),
        };
        ctx.push_table(scope, Some(exposed), table_number, columns)?;

        Ok(FromTable::Subquery(Box::new(derived)))
    }

    fn bind_join(
        &self,
        ctx: &mut BindContext,
        scope: BindScopeRef,
        left: &ast::FromItem,
        right: &ast::FromItem,
        kind: ast::JoinKind,
        constraint: &ast::JoinConstraint,
    ) -> Result<FromTable> {
        let kind = match kind {
            ast::JoinKind::Inner | ast::JoinKind::Cross => JoinKind::Inner,
            ast::JoinKind::Left => JoinKind::LeftOuter,
            ast::JoinKind::Right => JoinKind::RightOuter,
            ast::JoinKind::Full => not_implemented!("FULL OUTER JOIN"),
        };

        let left_scope = ctx.new_sibling_scope(scope)?;
        let left = self.bind_item(ctx, left_scope, left)?;
        let right_scope = ctx.new_sibling_scope(scope)?;
        let right = self.bind_item(ctx, right_scope, right)?;

        let level = ctx.scope_level(scope)?;
        let table_number = ctx.next_table_number();
        let mut join = JoinNode::new(&mut ctx.arena, table_number, level, kind, left, right)?;

        // References in the join clause and above resolve to the join's
        // columns.
        ctx.remap_scope_columns(left_scope, |rc| join.map_child_column(rc))?;
        ctx.remap_scope_columns(right_scope, |rc| join.map_child_column(rc))?;

        ctx.append_context(scope, left_scope)?;
        ctx.append_context(scope, right_scope)?;

        match constraint {
            ast::JoinConstraint::On(expr) => {
                let mut guard = ctx.restrict(|r| {
                    r.allow_aggregates = false;
                    r.allow_windows = false;
                    r.allow_subqueries = false;
                    r.clause = ON_CLAUSE;
                });
                let clause =
                    ExpressionBinder::new(scope).bind_boolean_clause(&mut guard, expr, ON_CLAUSE)?;
                join.join_clause = Some(clause);
            }
            ast::JoinConstraint::Using(columns) => {
                self.bind_using(ctx, &mut join, scope, left_scope, right_scope, columns)?;
            }
            ast::JoinConstraint::Natural => {
                let columns = natural_join_columns(ctx, left_scope, right_scope)?;
                if columns.is_empty() {
                    tracing::debug!(join = %table_number, "natural join without common columns");
                } else {
                    self.bind_using(ctx, &mut join, scope, left_scope, right_scope, &columns)?;
                }
            }
            ast::JoinConstraint::None => {
                if kind.is_outer() {
                    return Err(DbError::new("Outer join requires an ON or USING clause"));
                }
            }
        }

        tracing::trace!(join = %table_number, ?kind, level, "bound join");

        Ok(FromTable::Join(Box::new(join)))
    }

    /// Desugar a USING column list into equalities between the two sides and
    /// record which side's column unqualified references pick.
    ///
    /// `SELECT *` over the join lists the join columns first, then the
    /// remaining columns of the left side, then the right side.
    fn bind_using(
        &self,
        ctx: &mut BindContext,
        join: &mut JoinNode,
        scope: BindScopeRef,
        left_scope: BindScopeRef,
        right_scope: BindScopeRef,
        columns: &[String],
    ) -> Result<()> {
        let mut equalities = Vec::with_capacity(columns.len());
        let mut using_columns = Vec::with_capacity(columns.len());
        let mut targets = Vec::with_capacity(columns.len());
        let mut all_merged: Vec<(ScopeTableRef, usize)> = Vec::new();

        for (idx, name) in columns.iter().enumerate() {
            if columns[..idx].contains(name) {
                return Err(DbError::new(format!(
                    "Column '{name}' appears more than once in USING clause"
                ))
                .with_sql_state(SqlState::DuplicateColumnName));
            }

            let left_col = using_side_column(ctx, left_scope, name, "left")?;
            let right_col = using_side_column(ctx, right_scope, name, "right")?;

            let left_expr = ExpressionBinder::new(left_scope).bind_scope_column(ctx, left_col.0, left_col.1)?;
            let right_expr =
                ExpressionBinder::new(right_scope).bind_scope_column(ctx, right_col.0, right_col.1)?;
            let (lt, rt) = (left_expr.datatype(), right_expr.datatype());
            if !lt.union_compatible(&rt) {
                return Err(DbError::new(format!(
                    "USING column '{name}' has incomparable types {lt} and {rt}"
                )));
            }
            equalities.push(expr::compare(left_expr, ComparisonOperator::Eq, right_expr));

            let target = match join.kind {
                JoinKind::RightOuter => right_col,
                _ => left_col,
            };
            if join.kind == JoinKind::RightOuter {
                let rc = ctx
                    .get_table(target.0)?
                    .columns
                    .get(target.1)
                    .required("USING column in scope table")?
                    .rc;
                ctx.arena[rc].right_outer_join_using = true;
            }

            let mut merged = ctx.merged_columns(left_scope, left_col.0, left_col.1)?;
            merged.extend(ctx.merged_columns(right_scope, right_col.0, right_col.1)?);
            all_merged.extend(merged.iter().copied());

            targets.push(target);
            using_columns.push(UsingColumn {
                column: name.clone(),
                table_ref: target.0,
                col_idx: target.1,
                merged,
            });
        }

        let mut star = targets;
        for side in [left_scope, right_scope] {
            star.extend(
                ctx.star_columns(side)?
                    .iter()
                    .filter(|col| !all_merged.contains(col)),
            );
        }
        ctx.set_star_columns(scope, star)?;
        for using in using_columns {
            ctx.append_using_column(scope, using)?;
        }

        let clause: Expression = expr::and(equalities);
        join.join_clause = Some(clause);
        join.using_columns = columns.to_vec();

        Ok(())
    }
}

fn scope_columns(arena: &ColumnArena, rcl: &ResultColumnList) -> Vec<ScopeColumn> {
    rcl.iter()
        .map(|rc| ScopeColumn {
            name: arena[rc].name.clone(),
            rc,
        })
        .collect()
}

fn using_side_column(
    ctx: &BindContext,
    scope: BindScopeRef,
    name: &str,
    side: &str,
) -> Result<(ScopeTableRef, usize)> {
    ctx.find_table_for_column(scope, None, name)?.ok_or_else(|| {
        DbError::new(format!("USING column '{name}' not found on {side} side of join"))
            .with_sql_state(SqlState::ColumnNotFound)
    })
}

/// Column names `SELECT *` lists on both sides, in left side order.
fn natural_join_columns(
    ctx: &BindContext,
    left_scope: BindScopeRef,
    right_scope: BindScopeRef,
) -> Result<Vec<String>> {
    let names = |scope: BindScopeRef| -> Result<Vec<String>> {
        ctx.star_columns(scope)?
            .iter()
            .map(|(table_ref, idx)| {
                let table = ctx.get_table(*table_ref)?;
                let col = table.columns.get(*idx).required("star column")?;
                Ok(col.name.clone())
            })
            .collect()
    };

    let left = names(left_scope)?;
    let right = names(right_scope)?;

    let mut common: Vec<String> = Vec::new();
    for name in left {
        if right.contains(&name) && !common.contains(&name) {
            common.push(name);
        }
    }
    Ok(common)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileConfig;
    use crate::testutil;

    fn star_names(ctx: &BindContext, scope: BindScopeRef) -> Vec<String> {
        ctx.star_columns(scope)
            .unwrap()
            .iter()
            .map(|(t, idx)| ctx.get_table(*t).unwrap().columns[*idx].name.clone())
            .collect()
    }

    fn join(left: ast::FromItem, right: ast::FromItem, kind: ast::JoinKind, constraint: ast::JoinConstraint) -> ast::FromItem {
        ast::FromItem::Join {
            left: Box::new(left),
            right: Box::new(right),
            kind,
            constraint,
        }
    }

    fn using(columns: &[&str]) -> ast::JoinConstraint {
        ast::JoinConstraint::Using(columns.iter().map(|c| c.to_string()).collect())
    }

    #[test]
    fn using_star_order() {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let mut ctx = BindContext::new(&catalog, &config);
        let root = ctx.root_scope_ref();

        let item = join(
            ast::FromItem::table("T1"),
            ast::FromItem::table("T2"),
            ast::JoinKind::Inner,
            using(&["C"]),
        );
        let list = FromBinder::new(root).bind_from_list(&mut ctx, &[item]).unwrap();

        assert_eq!(vec!["C", "A", "B"], star_names(&ctx, root));
        let FromTable::Join(join) = &list.tables[0] else {
            panic!("expected join")
        };
        assert!(join.join_clause.is_some());
        assert_eq!(vec!["C".to_string()], join.using_columns);

        // Unqualified C is no longer ambiguous.
        let resolved = ctx.resolve_column(root, None, "C").unwrap();
        assert_eq!(crate::table_map::TableNumber(0), resolved.table_number);
    }

    #[test]
    fn nested_using_merges_all_sides() {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let mut ctx = BindContext::new(&catalog, &config);
        let root = ctx.root_scope_ref();

        let inner = join(
            ast::FromItem::table("T1"),
            ast::FromItem::table("T2"),
            ast::JoinKind::Inner,
            using(&["C"]),
        );
        let item = join(inner, ast::FromItem::table("T3"), ast::JoinKind::Inner, using(&["C"]));
        FromBinder::new(root).bind_from_list(&mut ctx, &[item]).unwrap();

        assert_eq!(vec!["C", "A", "B", "D"], star_names(&ctx, root));
        ctx.resolve_column(root, None, "C").unwrap();
    }

    #[test]
    fn using_then_comma_table_is_ambiguous() {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let mut ctx = BindContext::new(&catalog, &config);
        let root = ctx.root_scope_ref();

        let item = join(
            ast::FromItem::table("T1"),
            ast::FromItem::table("T2"),
            ast::JoinKind::Inner,
            using(&["C"]),
        );
        FromBinder::new(root)
            .bind_from_list(&mut ctx, &[item, ast::FromItem::table("T3")])
            .unwrap();

        let err = ctx.resolve_column(root, None, "C").unwrap_err();
        assert_eq!(Some(SqlState::AmbiguousColumnName), err.sql_state());
    }

    #[test]
    fn natural_join_uses_common_columns() {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let mut ctx = BindContext::new(&catalog, &config);
        let root = ctx.root_scope_ref();

        let item = join(
            ast::FromItem::table("T1"),
            ast::FromItem::table("T2"),
            ast::JoinKind::Inner,
            ast::JoinConstraint::Natural,
        );
        let list = FromBinder::new(root).bind_from_list(&mut ctx, &[item]).unwrap();
        let FromTable::Join(join) = &list.tables[0] else {
            panic!("expected join")
        };
        assert_eq!(vec!["C".to_string()], join.using_columns);
        assert_eq!(vec!["C", "A", "B"], star_names(&ctx, root));
    }

    #[test]
    fn right_join_using_marks_column() {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let mut ctx = BindContext::new(&catalog, &config);
        let root = ctx.root_scope_ref();

        let item = join(
            ast::FromItem::table("T1"),
            ast::FromItem::table("T2"),
            ast::JoinKind::Right,
            using(&["C"]),
        );
        let list = FromBinder::new(root).bind_from_list(&mut ctx, &[item]).unwrap();
        let FromTable::Join(join) = &list.tables[0] else {
            panic!("expected join")
        };

        // Unqualified C reads the right side, T2.C is the third join column.
        let resolved = ctx.resolve_column(root, None, "C").unwrap();
        assert_eq!(join.result_columns.get(2), Some(resolved.rc));
        assert!(ctx.arena[resolved.rc].right_outer_join_using);
        let mapping = join.result_columns.map_source_columns(&ctx.arena);
        assert_eq!(None, mapping.map[2]);
    }

    #[test]
    fn duplicate_using_column() {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let mut ctx = BindContext::new(&catalog, &config);
        let root = ctx.root_scope_ref();

        let item = join(
            ast::FromItem::table("T1"),
            ast::FromItem::table("T2"),
            ast::JoinKind::Inner,
            using(&["C", "C"]),
        );
        let err = FromBinder::new(root)
            .bind_from_list(&mut ctx, &[item])
            .unwrap_err();
        assert_eq!(Some(SqlState::DuplicateColumnName), err.sql_state());
    }

    #[test]
    fn full_outer_join_not_implemented() {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let mut ctx = BindContext::new(&catalog, &config);
        let root = ctx.root_scope_ref();

        let item = join(
            ast::FromItem::table("T1"),
            ast::FromItem::table("T2"),
            ast::JoinKind::Full,
            using(&["C"]),
        );
        let err = FromBinder::new(root)
            .bind_from_list(&mut ctx, &[item])
            .unwrap_err();
        assert_eq!(Some(SqlState::NotImplemented), err.sql_state());
    }

    #[test]
    fn on_clause_rejects_subquery() {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let mut ctx = BindContext::new(&catalog, &config);
        let root = ctx.root_scope_ref();

        let subquery = ast::Expr::Subquery {
            kind: ast::SubqueryKind::Exists { negated: false },
            query: Box::new(testutil::select_star("T3")),
        };
        let item = join(
            ast::FromItem::table("T1"),
            ast::FromItem::table("T2"),
            ast::JoinKind::Inner,
            ast::JoinConstraint::On(subquery),
        );
        let err = FromBinder::new(root)
            .bind_from_list(&mut ctx, &[item])
            .unwrap_err();
        assert_eq!(Some(SqlState::SubqueryNotAllowed), err.sql_state());
    }

    #[test]
    fn missing_table_suggests_similar() {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let mut ctx = BindContext::new(&catalog, &config);
        let root = ctx.root_scope_ref();

        let err = FromBinder::new(root)
            .bind_from_list(&mut ctx, &[ast::FromItem::table("ORDRES")])
            .unwrap_err();
        assert_eq!(Some(SqlState::TableNotFound), err.sql_state());
        assert!(err.get_msg().contains("did you mean 'ORDERS'"));
    }

    #[test]
    fn same_table_twice_needs_alias() {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let mut ctx = BindContext::new(&catalog, &config);
        let root = ctx.root_scope_ref();

        let err = FromBinder::new(root)
            .bind_from_list(&mut ctx, &[ast::FromItem::table("T1"), ast::FromItem::table("T1")])
            .unwrap_err();
        assert_eq!(Some(SqlState::DuplicateTableName), err.sql_state());

        let mut ctx = BindContext::new(&catalog, &config);
        let root = ctx.root_scope_ref();
        FromBinder::new(root)
            .bind_from_list(
                &mut ctx,
                &[ast::FromItem::table("T1"), ast::FromItem::aliased_table("T1", "X")],
            )
            .unwrap();
    }

    #[test]
    fn derived_table_column_list() {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let mut ctx = BindContext::new(&catalog, &config);
        let root = ctx.root_scope_ref();

        let derived = |columns: &[&str]| ast::FromItem::Derived {
            query: Box::new(testutil::select_star("T1")),
            alias: "D".to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        };

        let list = FromBinder::new(root)
            .bind_from_list(&mut ctx, &[derived(&["X", "Y"])])
            .unwrap();
        assert_eq!(
            vec!["X", "Y"],
            list.tables[0].result_columns().column_names(&ctx.arena)
        );
        let FromTable::Subquery(table) = &list.tables[0] else {
            panic!("expected derived table")
        };
        assert_eq!(0, table.level);
        assert_eq!(1, table.subquery.level());
        ctx.resolve_column(root, Some(&ast::ObjectName::new("D")), "Y").unwrap();

        let mut ctx = BindContext::new(&catalog, &config);
        let root = ctx.root_scope_ref();
        let err = FromBinder::new(root)
            .bind_from_list(&mut ctx, &[derived(&["X"])])
            .unwrap_err();
        assert_eq!(Some(SqlState::ColumnCountMismatch), err.sql_state());
    }

    #[test]
    fn table_function_arguments_see_earlier_tables() {
        let catalog = testutil::catalog();
        let config = CompileConfig::default();
        let mut ctx = BindContext::new(&catalog, &config);
        let root = ctx.root_scope_ref();

        let vti = ast::FromItem::Function {
            name: ast::ObjectName::new("RANGE_TF"),
            args: vec![ast::Expr::qualified_column("T1", "A")],
            alias: "R".to_string(),
        };
        let list = FromBinder::new(root)
            .bind_from_list(&mut ctx, &[ast::FromItem::table("T1"), vti])
            .unwrap();

        let deps: Vec<_> = list.tables[1].dependency_map().iter().collect();
        assert_eq!(vec![list.tables[0].table_number()], deps);
        assert!(ctx.dependencies.depends_on(&Provider::Routine {
            schema: "APP".to_string(),
            name: "RANGE_TF".to_string(),
        }));
    }
}
