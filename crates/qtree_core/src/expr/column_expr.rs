use std::fmt;

use super::Expression;
use crate::rcl::{ColumnArena, RcRef};
use crate::table_map::{TableMap, TableNumber};
use crate::types::DataType;

#[derive(Debug, Clone, PartialEq)]
struct RemapEntry {
    source: RcRef,
    name: String,
    table_number: Option<TableNumber>,
}

/// A resolved column reference.
///
/// Points at the result column it was resolved against. Nesting levels track
/// correlation: the reference appears in the query block at `nesting_level`
/// and resolves to a table in the block at `source_level`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnExpr {
    /// Table number of the innermost from-table providing the column.
    pub table_number: Option<TableNumber>,
    pub name: String,
    /// Exposed name of the table the column was resolved against.
    pub table_name: Option<String>,
    pub source: RcRef,
    pub nesting_level: usize,
    pub source_level: usize,
    pub datatype: DataType,
    /// Reference generated when hoisting an aggregate.
    pub replaces_aggregate: bool,
    remaps: Vec<RemapEntry>,
}

impl ColumnExpr {
    pub fn new(
        name: impl Into<String>,
        table_number: Option<TableNumber>,
        source: RcRef,
        nesting_level: usize,
        source_level: usize,
        datatype: DataType,
    ) -> Self {
        ColumnExpr {
            table_number,
            name: name.into(),
            table_name: None,
            source,
            nesting_level,
            source_level,
            datatype,
            replaces_aggregate: false,
            remaps: Vec::new(),
        }
    }

    pub fn is_correlated(&self) -> bool {
        self.source_level < self.nesting_level
    }

    /// Virtual column id of the source column.
    pub fn column_number(&self, arena: &ColumnArena) -> usize {
        arena[self.source].virtual_column_id
    }

    /// Point this reference at the column underneath its current source.
    ///
    /// Only done if the source is a plain column or virtual column, otherwise
    /// the reference is left alone. Every call must be paired with
    /// `unremap`.
    pub fn remap(&mut self, arena: &ColumnArena) {
        self.remaps.push(RemapEntry {
            source: self.source,
            name: self.name.clone(),
            table_number: self.table_number,
        });

        let new_source = match &arena[self.source].expression {
            Expression::VirtualColumn(vcol) => vcol.source,
            Expression::Column(col) => col.source,
            _ => return,
        };

        self.source = new_source;
        self.name = arena[new_source].name.clone();
        if let Expression::Column(col) = &arena[new_source].expression {
            self.table_number = col.table_number;
        }
    }

    pub fn unremap(&mut self) {
        if let Some(entry) = self.remaps.pop() {
            self.source = entry.source;
            self.name = entry.name;
            self.table_number = entry.table_number;
        }
    }

    pub fn remap_depth(&self) -> usize {
        self.remaps.len()
    }

    /// Adjust levels when the block at `level` is merged into its parent.
    pub fn decrement_level(&mut self, level: usize) {
        if self.source_level >= level && self.source_level > 0 {
            self.source_level -= 1;
        }
        if self.nesting_level >= level && self.nesting_level > 0 {
            self.nesting_level -= 1;
        }
    }

    /// Record the referenced table, returning if the reference can be pushed.
    pub fn categorize(&self, arena: &ColumnArena, tables: &mut TableMap) -> bool {
        if let Some(table) = self.table_number {
            tables.set(table);
        }

        if self.replaces_aggregate {
            return false;
        }

        matches!(
            arena[self.source].expression,
            Expression::Column(_)
                | Expression::VirtualColumn(_)
                | Expression::BaseColumn(_)
                | Expression::Literal(_)
        )
    }
}

impl fmt::Display for ColumnExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table_name {
            Some(table) => write!(f, "{table}.{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Back reference to a column of a child result set.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualColumnExpr {
    /// Table number of the child, if it has one.
    pub source_table: Option<TableNumber>,
    pub source: RcRef,
    pub datatype: DataType,
    pub correlated: bool,
}

impl VirtualColumnExpr {
    pub fn column_id(&self, arena: &ColumnArena) -> usize {
        arena[self.source].virtual_column_id
    }
}

impl fmt::Display for VirtualColumnExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.source)
    }
}

/// A column read directly from a stored table.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseColumnExpr {
    pub table_number: TableNumber,
    /// 1-based position in the table.
    pub position: usize,
    pub name: String,
    pub datatype: DataType,
}

impl fmt::Display for BaseColumnExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table_number, self.name)
    }
}
