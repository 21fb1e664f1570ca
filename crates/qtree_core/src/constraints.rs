//! Binding of stored table expressions.
//!
//! Check constraints and generation clauses are kept in the catalog as SQL
//! text. Before a table is modified the text is re-parsed and bound against
//! a scope holding only the target table, and everything the bound
//! expressions consult is registered as a dependency of the constraint or
//! column they belong to.

use qtree_error::{DbError, Result, SqlState};

use crate::binder::bind_context::{BindContext, RestrictionGuard, ScopeColumn, TableAlias};
use crate::binder::expr_binder::ExpressionBinder;
use crate::catalog::dependency::{Dependent, DependencyList, DependencySink, Provider};
use crate::catalog::{Catalog, TableDescriptor};
use crate::config::CompileConfig;
use crate::expr::Expression;
use crate::from::base_table::FromBaseTable;
use crate::parser::{FragmentParser, extract_expression};
use crate::rcl::ColumnArena;

const CHECK_CONSTRAINT: &str = "CHECK constraint";
const GENERATION_CLAUSE: &str = "generation clause";

#[derive(Debug)]
pub struct BoundCheckConstraint {
    pub name: String,
    pub expr: Expression,
}

#[derive(Debug)]
pub struct BoundGenerationClause {
    pub column: String,
    /// 1-based position of the generated column.
    pub position: usize,
    pub expr: Expression,
}

/// Stored expressions of one table bound against that table.
#[derive(Debug)]
pub struct BoundTableExpressions {
    /// The target table, whose result columns the bound expressions
    /// reference.
    pub table: FromBaseTable,
    pub arena: ColumnArena,
    pub checks: Vec<BoundCheckConstraint>,
    pub generated: Vec<BoundGenerationClause>,
    pub dependencies: DependencyList,
}

#[derive(Debug)]
pub struct ConstraintBinder<'a> {
    catalog: &'a dyn Catalog,
    config: &'a CompileConfig,
    parser: &'a dyn FragmentParser,
}

impl<'a> ConstraintBinder<'a> {
    pub fn new(
        catalog: &'a dyn Catalog,
        config: &'a CompileConfig,
        parser: &'a dyn FragmentParser,
    ) -> Self {
        ConstraintBinder {
            catalog,
            config,
            parser,
        }
    }

    /// Bind every check constraint and generation clause of `table`.
    pub fn bind_table(&self, table: &TableDescriptor) -> Result<BoundTableExpressions> {
        let mut ctx = BindContext::new(self.catalog, self.config);
        let scope = ctx.root_scope_ref();
        let table_number = ctx.next_table_number();
        let base = FromBaseTable::new(&mut ctx.arena, table, None, table_number, 0);
        let columns = base
            .result_columns
            .iter()
            .map(|rc| ScopeColumn {
                name: ctx.arena[rc].name.clone(),
                rc,
            })
            .collect();
        ctx.push_table(
            scope,
            Some(TableAlias {
                schema: Some(table.schema.clone()),
                table: table.name.clone(),
            }),
            table_number,
            columns,
        )?;

        let binder = ExpressionBinder::new(scope);
        let mut dependencies = DependencyList::new();

        let mut checks = Vec::with_capacity(table.check_constraints.len());
        for constraint in &table.check_constraints {
            let ast = extract_expression(self.parser.parse_fragment(&constraint.text)?)?;
            let expr = {
                let mut guard = restrict_stored(&mut ctx, CHECK_CONSTRAINT);
                binder.bind_boolean_clause(&mut guard, &ast, CHECK_CONSTRAINT)?
            };

            let dependent = Dependent::CheckConstraint {
                table: table.name.clone(),
                name: constraint.name.clone(),
            };
            dependencies.register(
                dependent.clone(),
                Provider::CheckConstraint {
                    table: table.name.clone(),
                    name: constraint.name.clone(),
                },
            );
            move_dependencies(&mut ctx, &mut dependencies, &dependent);

            tracing::trace!(table = %table.name, constraint = %constraint.name, "bound check constraint");
            checks.push(BoundCheckConstraint {
                name: constraint.name.clone(),
                expr,
            });
        }

        let mut generated = Vec::new();
        for column in &table.columns {
            let Some(text) = &column.generation_clause else {
                continue;
            };
            let ast = extract_expression(self.parser.parse_fragment(text)?)?;
            let expr = {
                let mut guard = restrict_stored(&mut ctx, GENERATION_CLAUSE);
                binder.bind_expression(&mut guard, &ast)?
            };

            check_generated_references(&ctx.arena, table, &column.name, &expr)?;
            let datatype = expr.datatype();
            if !column.datatype.id.storable(datatype.id) {
                return Err(DbError::new(format!(
                    "Generation clause of column '{}' has type {datatype}, which cannot be stored as {}",
                    column.name, column.datatype,
                ))
                .with_sql_state(SqlState::NotStorable));
            }

            let dependent = Dependent::GeneratedColumn {
                table: table.name.clone(),
                column: column.name.clone(),
            };
            dependencies.register(
                dependent.clone(),
                Provider::Table {
                    schema: table.schema.clone(),
                    name: table.name.clone(),
                },
            );
            move_dependencies(&mut ctx, &mut dependencies, &dependent);

            generated.push(BoundGenerationClause {
                column: column.name.clone(),
                position: column.position,
                expr,
            });
        }

        Ok(BoundTableExpressions {
            table: base,
            arena: ctx.arena,
            checks,
            generated,
            dependencies,
        })
    }
}

fn restrict_stored<'b, 'a>(
    ctx: &'b mut BindContext<'a>,
    clause: &'static str,
) -> RestrictionGuard<'b, 'a> {
    ctx.restrict(|r| {
        r.allow_aggregates = false;
        r.allow_windows = false;
        r.allow_subqueries = false;
        r.clause = clause;
    })
}

/// Re-register what the binder recorded for the statement against the
/// stored expression that was just bound.
fn move_dependencies(ctx: &mut BindContext, dependencies: &mut DependencyList, dependent: &Dependent) {
    let recorded = std::mem::take(&mut ctx.dependencies);
    for (_, provider) in recorded.iter() {
        dependencies.register(dependent.clone(), provider.clone());
    }
}

fn check_generated_references(
    arena: &ColumnArena,
    table: &TableDescriptor,
    column: &str,
    expr: &Expression,
) -> Result<()> {
    let mut referenced = None;
    expr.walk_deep(arena, &mut |e| {
        if let Expression::Column(col) = e {
            let generated = table
                .column_by_name(&col.name)
                .is_some_and(|desc| desc.generation_clause.is_some());
            if generated && referenced.is_none() {
                referenced = Some(col.name.clone());
            }
        }
    });

    match referenced {
        Some(other) => Err(DbError::new(format!(
            "Generation clause of column '{column}' references generated column '{other}'"
        ))
        .with_sql_state(SqlState::GeneratedColumnReference)),
        None => Ok(()),
    }
}
