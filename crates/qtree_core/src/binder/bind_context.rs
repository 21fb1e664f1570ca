use std::fmt;
use std::ops::{Deref, DerefMut};

use qtree_error::{DbError, OptionExt, Result, SqlState};

use super::find_similar;
use crate::ast::ObjectName;
use crate::catalog::Catalog;
use crate::catalog::dependency::{DependencyList, DependencySink, Dependent, Provider};
use crate::config::CompileConfig;
use crate::rcl::{ColumnArena, GeneratedNames, RcRef};
use crate::table_map::TableNumber;
use crate::types::DataType;

/// Reference to a bind scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindScopeRef {
    pub context_idx: usize,
}

/// Reference to a table in the bind context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeTableRef {
    pub table_idx: usize,
}

impl fmt::Display for ScopeTableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.table_idx)
    }
}

/// Name a table is exposed by in a FROM list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableAlias {
    pub schema: Option<String>,
    pub table: String,
}

impl TableAlias {
    /// Whether a qualifier written in the query refers to this table.
    ///
    /// A correlation name can't be schema qualified.
    pub fn matches(&self, qualifier: &ObjectName) -> bool {
        if self.table != qualifier.name {
            return false;
        }
        match (&self.schema, &qualifier.schema) {
            (Some(a), Some(b)) => a == b,
            (None, Some(_)) => false,
            _ => true,
        }
    }

    /// Whether two tables in the same FROM list would be indistinguishable.
    pub fn conflicts(&self, other: &TableAlias) -> bool {
        if self.table != other.table {
            return false;
        }
        match (&self.schema, &other.schema) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl fmt::Display for TableAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(schema) = &self.schema {
            write!(f, "{schema}.")?;
        }
        write!(f, "{}", self.table)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopeColumn {
    pub name: String,
    /// Column of the top level FROM list entry providing this column.
    pub rc: RcRef,
}

/// A table visible to column references.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeTable {
    pub reference: ScopeTableRef,
    pub alias: Option<TableAlias>,
    /// Number of the leaf from-table.
    pub table_number: TableNumber,
    pub columns: Vec<ScopeColumn>,
}

/// Join column of a USING clause or NATURAL join.
#[derive(Debug, Clone, PartialEq)]
pub struct UsingColumn {
    pub column: String,
    /// Table an unqualified reference to the column resolves to.
    pub table_ref: ScopeTableRef,
    pub col_idx: usize,
    /// Every table column merged into this one, from both sides of the
    /// join and any join nested below it.
    pub merged: Vec<(ScopeTableRef, usize)>,
}

#[derive(Debug, Default)]
struct BindScope {
    parent: Option<BindScopeRef>,
    /// Nesting level of the query block this scope belongs to.
    level: usize,
    using_columns: Vec<UsingColumn>,
    tables: Vec<ScopeTableRef>,
    /// Columns `SELECT *` expands to, in output order.
    star_columns: Vec<(ScopeTableRef, usize)>,
}

/// Parts of a finished bind context handed to preprocessing.
#[derive(Debug)]
pub struct BindOutput {
    pub arena: ColumnArena,
    pub names: GeneratedNames,
    pub dependencies: DependencyList,
    pub next_table_number: usize,
    pub next_subquery_number: usize,
}

/// A column reference resolved against a scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedColumn {
    pub name: String,
    pub table_number: TableNumber,
    pub table_name: Option<String>,
    pub rc: RcRef,
    pub datatype: DataType,
    /// Level of the query block the column was found in.
    pub source_level: usize,
}

/// What may appear in the clause currently being bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Restrictions {
    pub allow_aggregates: bool,
    pub allow_windows: bool,
    pub allow_subqueries: bool,
    /// Binding the operand of an aggregate.
    pub in_aggregate: bool,
    /// Clause name used in error messages.
    pub clause: &'static str,
}

impl Default for Restrictions {
    fn default() -> Self {
        Restrictions {
            allow_aggregates: true,
            allow_windows: true,
            allow_subqueries: true,
            in_aggregate: false,
            clause: "SELECT list",
        }
    }
}

/// State shared by all binders of a single statement.
#[derive(Debug)]
pub struct BindContext<'a> {
    pub arena: ColumnArena,
    pub names: GeneratedNames,
    pub dependencies: DependencyList,
    pub config: &'a CompileConfig,
    pub catalog: &'a dyn Catalog,
    scopes: Vec<BindScope>,
    tables: Vec<ScopeTable>,
    next_table_number: usize,
    next_subquery_number: usize,
    restrictions: Restrictions,
}

impl<'a> BindContext<'a> {
    pub fn new(catalog: &'a dyn Catalog, config: &'a CompileConfig) -> Self {
        BindContext {
            arena: ColumnArena::new(),
            names: GeneratedNames::new(config.max_generated_name_length),
            dependencies: DependencyList::new(),
            config,
            catalog,
            scopes: vec![BindScope::default()],
            tables: Vec::new(),
            next_table_number: 0,
            next_subquery_number: 0,
            restrictions: Restrictions::default(),
        }
    }

    pub fn root_scope_ref(&self) -> BindScopeRef {
        BindScopeRef { context_idx: 0 }
    }

    /// Create a scope for a nested query block. Columns of `current` and its
    /// parents stay visible.
    pub fn new_child_scope(&mut self, current: BindScopeRef) -> Result<BindScopeRef> {
        let level = self.scope_level(current)? + 1;
        Ok(self.new_scope(Some(current), level))
    }

    /// Create a scope with an explicit parent and level.
    ///
    /// Used for the sides of joins and set operations, which must not see
    /// each other, and for derived tables, which only see enclosing blocks.
    pub fn new_scope(&mut self, parent: Option<BindScopeRef>, level: usize) -> BindScopeRef {
        let idx = self.scopes.len();
        self.scopes.push(BindScope {
            parent,
            level,
            using_columns: Vec::new(),
            tables: Vec::new(),
            star_columns: Vec::new(),
        });
        BindScopeRef { context_idx: idx }
    }

    /// Create a scope at the same level and with the same parent as
    /// `current`.
    pub fn new_sibling_scope(&mut self, current: BindScopeRef) -> Result<BindScopeRef> {
        let scope = self.get_scope(current)?;
        let (parent, level) = (scope.parent, scope.level);
        Ok(self.new_scope(parent, level))
    }

    pub fn scope_level(&self, scope: BindScopeRef) -> Result<usize> {
        Ok(self.get_scope(scope)?.level)
    }

    pub fn get_parent_ref(&self, scope: BindScopeRef) -> Result<Option<BindScopeRef>> {
        Ok(self.get_scope(scope)?.parent)
    }

    pub fn next_table_number(&mut self) -> TableNumber {
        let number = TableNumber(self.next_table_number);
        self.next_table_number += 1;
        number
    }

    /// Number of table numbers handed out so far.
    pub fn table_count(&self) -> usize {
        self.next_table_number
    }

    pub fn next_subquery_number(&mut self) -> usize {
        let number = self.next_subquery_number;
        self.next_subquery_number += 1;
        number
    }

    pub fn into_output(self) -> BindOutput {
        BindOutput {
            arena: self.arena,
            names: self.names,
            dependencies: self.dependencies,
            next_table_number: self.next_table_number,
            next_subquery_number: self.next_subquery_number,
        }
    }

    pub fn register_dependency(&mut self, provider: Provider) {
        self.dependencies.register(Dependent::Statement, provider);
    }

    pub fn restrictions(&self) -> Restrictions {
        self.restrictions
    }

    /// Tighten the restrictions until the returned guard is dropped.
    pub fn restrict<'b, F>(&'b mut self, f: F) -> RestrictionGuard<'b, 'a>
    where
        F: FnOnce(&mut Restrictions),
    {
        let saved = self.restrictions;
        f(&mut self.restrictions);
        RestrictionGuard { ctx: self, saved }
    }

    /// Add a table to a scope.
    ///
    /// Errors if the scope already has a table exposed under the same name.
    pub fn push_table(
        &mut self,
        scope: BindScopeRef,
        alias: Option<TableAlias>,
        table_number: TableNumber,
        columns: Vec<ScopeColumn>,
    ) -> Result<ScopeTableRef> {
        if let Some(alias) = &alias {
            for have in self.iter_tables(scope)?.filter_map(|t| t.alias.as_ref()) {
                if have.conflicts(alias) {
                    return Err(duplicate_table(alias));
                }
            }
        }

        let reference = ScopeTableRef {
            table_idx: self.tables.len(),
        };
        let star = (0..columns.len()).map(|idx| (reference, idx));
        let scope = self.get_scope_mut(scope)?;
        scope.tables.push(reference);
        scope.star_columns.extend(star);
        self.tables.push(ScopeTable {
            reference,
            alias,
            table_number,
            columns,
        });

        Ok(reference)
    }

    /// Append the tables and USING columns of `other` to `current`.
    ///
    /// Errors on duplicate table names.
    pub fn append_context(&mut self, current: BindScopeRef, other: BindScopeRef) -> Result<()> {
        for right in self.iter_tables(other)?.filter_map(|t| t.alias.as_ref()) {
            for left in self.iter_tables(current)?.filter_map(|t| t.alias.as_ref()) {
                if left.conflicts(right) {
                    return Err(duplicate_table(right));
                }
            }
        }

        let (mut tables, mut using, mut star) = {
            let other = self.get_scope(other)?;
            (
                other.tables.clone(),
                other.using_columns.clone(),
                other.star_columns.clone(),
            )
        };

        let current = self.get_scope_mut(current)?;
        current.tables.append(&mut tables);
        current.using_columns.append(&mut using);
        current.star_columns.append(&mut star);

        Ok(())
    }

    pub fn append_using_column(&mut self, current: BindScopeRef, col: UsingColumn) -> Result<()> {
        self.get_scope_mut(current)?.using_columns.push(col);
        Ok(())
    }

    pub fn get_using_columns(&self, current: BindScopeRef) -> Result<&[UsingColumn]> {
        Ok(&self.get_scope(current)?.using_columns)
    }

    /// Table columns that resolve to the same value as `(table_ref, col_idx)`
    /// through USING joins, including the column itself.
    pub fn merged_columns(
        &self,
        current: BindScopeRef,
        table_ref: ScopeTableRef,
        col_idx: usize,
    ) -> Result<Vec<(ScopeTableRef, usize)>> {
        let using = self
            .get_using_columns(current)?
            .iter()
            .rev()
            .find(|using| using.merged.contains(&(table_ref, col_idx)));
        Ok(match using {
            Some(using) => using.merged.clone(),
            None => vec![(table_ref, col_idx)],
        })
    }

    pub fn star_columns(&self, current: BindScopeRef) -> Result<&[(ScopeTableRef, usize)]> {
        Ok(&self.get_scope(current)?.star_columns)
    }

    pub fn set_star_columns(
        &mut self,
        current: BindScopeRef,
        columns: Vec<(ScopeTableRef, usize)>,
    ) -> Result<()> {
        self.get_scope_mut(current)?.star_columns = columns;
        Ok(())
    }

    pub fn get_table(&self, table_ref: ScopeTableRef) -> Result<&ScopeTable> {
        self.tables
            .get(table_ref.table_idx)
            .ok_or_else(|| DbError::internal("Missing table in bind context"))
    }

    pub fn get_table_mut(&mut self, table_ref: ScopeTableRef) -> Result<&mut ScopeTable> {
        self.tables
            .get_mut(table_ref.table_idx)
            .ok_or_else(|| DbError::internal("Missing table in bind context"))
    }

    /// Iterate tables in the given scope, not including parent scopes.
    pub fn iter_tables(&self, current: BindScopeRef) -> Result<impl Iterator<Item = &ScopeTable>> {
        let scope = self.get_scope(current)?;
        Ok(scope
            .tables
            .iter()
            .map(|table| &self.tables[table.table_idx]))
    }

    /// Point the columns of every table in `scope` at new result columns.
    ///
    /// Called when the tables of a scope get wrapped in a join. Columns
    /// `map` returns None for are left alone.
    pub fn remap_scope_columns<F>(&mut self, scope: BindScopeRef, map: F) -> Result<()>
    where
        F: Fn(RcRef) -> Option<RcRef>,
    {
        let refs = self.get_scope(scope)?.tables.clone();
        for table_ref in refs {
            let table = self.get_table_mut(table_ref)?;
            for column in &mut table.columns {
                if let Some(rc) = map(column.rc) {
                    column.rc = rc;
                }
            }
        }
        Ok(())
    }

    /// Find the table in `current` providing `column`.
    ///
    /// Unqualified references to a USING join column resolve to the column
    /// the outermost join picked, the merged table columns don't make the
    /// reference ambiguous. Outer scopes are not searched.
    pub fn find_table_for_column(
        &self,
        current: BindScopeRef,
        qualifier: Option<&ObjectName>,
        column: &str,
    ) -> Result<Option<(ScopeTableRef, usize)>> {
        let using_columns = self.get_using_columns(current)?;
        let mut found: Option<(ScopeTableRef, usize)> = None;

        for table in self.iter_tables(current)? {
            match (&table.alias, qualifier) {
                (Some(alias), Some(qualifier)) => {
                    if !alias.matches(qualifier) {
                        continue;
                    }
                }
                (None, Some(_)) => continue,
                _ => (),
            }

            for (col_idx, col) in table.columns.iter().enumerate() {
                if col.name != column {
                    continue;
                }
                let mut candidate = (table.reference, col_idx);
                if qualifier.is_none() {
                    let using = using_columns
                        .iter()
                        .rev()
                        .find(|using| using.merged.contains(&candidate));
                    if let Some(using) = using {
                        candidate = (using.table_ref, using.col_idx);
                    }
                }
                match found {
                    Some(have) if have != candidate => {
                        return Err(DbError::new(format!("Ambiguous column name '{column}'"))
                            .with_sql_state(SqlState::AmbiguousColumnName));
                    }
                    _ => found = Some(candidate),
                }
            }
        }

        Ok(found)
    }

    /// Resolve a column reference starting at `current` and walking out to
    /// enclosing query blocks.
    ///
    /// The result column found is marked referenced.
    pub fn resolve_column(
        &mut self,
        current: BindScopeRef,
        qualifier: Option<&ObjectName>,
        column: &str,
    ) -> Result<ResolvedColumn> {
        let mut scope_ref = Some(current);
        while let Some(scope) = scope_ref {
            if let Some((table_ref, col_idx)) = self.find_table_for_column(scope, qualifier, column)? {
                let source_level = self.scope_level(scope)?;
                let table = self.get_table(table_ref)?;
                let col = table
                    .columns
                    .get(col_idx)
                    .required("column index in scope table")?;

                let resolved = ResolvedColumn {
                    name: col.name.clone(),
                    table_number: table.table_number,
                    table_name: table.alias.as_ref().map(|alias| alias.table.clone()),
                    rc: col.rc,
                    datatype: self.arena[col.rc].datatype,
                    source_level,
                };
                self.arena.mark_referenced(resolved.rc);
                tracing::trace!(column, rc = %resolved.rc, level = source_level, "resolved column");
                return Ok(resolved);
            }
            scope_ref = self.get_scope(scope)?.parent;
        }

        Err(self.column_not_found(current, qualifier, column))
    }

    fn column_not_found(
        &self,
        current: BindScopeRef,
        qualifier: Option<&ObjectName>,
        column: &str,
    ) -> DbError {
        let mut candidates = Vec::new();
        let mut scope_ref = Some(current);
        while let Some(scope) = scope_ref {
            if let Ok(tables) = self.iter_tables(scope) {
                for table in tables {
                    let visible = match (&table.alias, qualifier) {
                        (Some(alias), Some(qualifier)) => alias.matches(qualifier),
                        (None, Some(_)) => false,
                        _ => true,
                    };
                    if visible {
                        candidates.extend(table.columns.iter().map(|c| c.name.as_str()));
                    }
                }
            }
            scope_ref = self.get_scope(scope).ok().and_then(|s| s.parent);
        }

        let display = match qualifier {
            Some(qualifier) => format!("{}.{column}", qualifier.name),
            None => column.to_string(),
        };

        let msg = match find_similar(candidates, column) {
            Some(similar) => format!("Missing column '{display}', did you mean '{similar}'?"),
            None => format!("Missing column '{display}'"),
        };

        DbError::new(msg).with_sql_state(SqlState::ColumnNotFound)
    }

    /// Columns of every table in `current`, in table order.
    pub fn columns_in_scope(&self, current: BindScopeRef) -> Result<Vec<(String, RcRef)>> {
        let mut columns = Vec::new();
        for table in self.iter_tables(current)? {
            for col in &table.columns {
                columns.push((col.name.clone(), col.rc));
            }
        }
        Ok(columns)
    }

    fn get_scope(&self, scope: BindScopeRef) -> Result<&BindScope> {
        self.scopes
            .get(scope.context_idx)
            .ok_or_else(|| DbError::internal("Missing bind scope"))
    }

    fn get_scope_mut(&mut self, scope: BindScopeRef) -> Result<&mut BindScope> {
        self.scopes
            .get_mut(scope.context_idx)
            .ok_or_else(|| DbError::internal("Missing bind scope"))
    }
}

fn duplicate_table(alias: &TableAlias) -> DbError {
    DbError::new(format!("Duplicate table name: {alias}"))
        .with_sql_state(SqlState::DuplicateTableName)
}

/// Restores the previous restrictions when dropped.
#[derive(Debug)]
pub struct RestrictionGuard<'b, 'a> {
    ctx: &'b mut BindContext<'a>,
    saved: Restrictions,
}

impl<'a> Deref for RestrictionGuard<'_, 'a> {
    type Target = BindContext<'a>;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for RestrictionGuard<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for RestrictionGuard<'_, '_> {
    fn drop(&mut self) {
        self.ctx.restrictions = self.saved;
    }
}
