use indexmap::IndexMap;
use qtree_error::Result;

use super::bind_context::{BindContext, BindOutput};
use super::query_binder::{BoundQuery, QueryBinder, check_typed_columns};
use crate::ast;
use crate::catalog::Catalog;
use crate::catalog::dependency::DependencyList;
use crate::config::CompileConfig;
use crate::expr::subquery_expr::SubqueryOutcome;
use crate::preprocess::PreprocessContext;
use crate::rcl::ColumnArena;
use crate::resultset::ResultSetNode;
use crate::resultset::order_by::OrderByList;

/// A bound, and unless created with `bind_query`, preprocessed query.
#[derive(Debug)]
pub struct CompiledQuery {
    pub root: ResultSetNode,
    pub arena: ColumnArena,
    pub order_by: Option<OrderByList>,
    pub offset: Option<u64>,
    pub fetch: Option<u64>,
    /// Catalog objects the query was compiled against.
    pub dependencies: DependencyList,
    /// What preprocessing did with each subquery, keyed by subquery number.
    pub subquery_outcomes: IndexMap<usize, SubqueryOutcome>,
}

/// Bind a query without preprocessing it.
pub fn bind_query(
    catalog: &dyn Catalog,
    config: &CompileConfig,
    query: &ast::Query,
) -> Result<CompiledQuery> {
    let (bound, output) = bind_statement(catalog, config, query)?;
    Ok(CompiledQuery {
        root: bound.result_set,
        arena: output.arena,
        order_by: bound.order_by,
        offset: bound.offset,
        fetch: bound.fetch,
        dependencies: output.dependencies,
        subquery_outcomes: IndexMap::new(),
    })
}

/// Bind and preprocess a query.
pub fn compile_query(
    catalog: &dyn Catalog,
    config: &CompileConfig,
    query: &ast::Query,
) -> Result<CompiledQuery> {
    let (bound, output) = bind_statement(catalog, config, query)?;
    let BoundQuery {
        mut result_set,
        order_by,
        offset,
        fetch,
    } = bound;

    let mut preprocess = PreprocessContext::new(catalog, config, output);
    preprocess.preprocess_result_set(&mut result_set)?;
    let (output, subquery_outcomes) = preprocess.finish();

    tracing::debug!(
        columns = output.arena.len(),
        tables = output.next_table_number,
        subqueries = subquery_outcomes.len(),
        "compiled query",
    );

    Ok(CompiledQuery {
        root: result_set,
        arena: output.arena,
        order_by,
        offset,
        fetch,
        dependencies: output.dependencies,
        subquery_outcomes,
    })
}

fn bind_statement(
    catalog: &dyn Catalog,
    config: &CompileConfig,
    query: &ast::Query,
) -> Result<(BoundQuery, BindOutput)> {
    let mut ctx = BindContext::new(catalog, config);
    let root = ctx.root_scope_ref();
    let bound = QueryBinder::new(root).bind(&mut ctx, query)?;
    check_typed_columns(&ctx.arena, bound.result_set.result_columns(), "select list")?;
    Ok((bound, ctx.into_output()))
}
