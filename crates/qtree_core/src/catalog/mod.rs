//! Metadata lookup consumed by the binder.

pub mod dependency;
pub mod memory;

use std::fmt::Debug;

use qtree_error::{DbError, Result, SqlState};

use crate::types::DataType;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// 1-based position of the column in the table.
    pub position: usize,
    pub datatype: DataType,
    /// Text of the generation clause for a generated column.
    pub generation_clause: Option<String>,
    pub default: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, position: usize, datatype: DataType) -> Self {
        ColumnDescriptor {
            name: name.into(),
            position,
            datatype,
            generation_clause: None,
            default: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Base,
    View,
    System,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckConstraintDescriptor {
    pub name: String,
    /// Constraint text, re-parsed when binding a modification of the table.
    pub text: String,
    /// 1-based positions of the columns the constraint references.
    pub referenced_columns: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDescriptor {
    pub name: String,
    /// 1-based column positions making up the index key.
    pub columns: Vec<usize>,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerDescriptor {
    pub name: String,
    /// 1-based positions of columns whose update fires the trigger. Empty
    /// means every column.
    pub update_columns: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    pub schema: String,
    pub name: String,
    pub kind: TableKind,
    pub columns: Vec<ColumnDescriptor>,
    pub check_constraints: Vec<CheckConstraintDescriptor>,
    pub indexes: Vec<IndexDescriptor>,
    pub triggers: Vec<TriggerDescriptor>,
}

impl TableDescriptor {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        TableDescriptor {
            schema: schema.into(),
            name: name.into(),
            kind: TableKind::Base,
            columns: Vec::new(),
            check_constraints: Vec::new(),
            indexes: Vec::new(),
            triggers: Vec::new(),
        }
    }

    /// Append a column, assigning the next position.
    pub fn with_column(mut self, name: impl Into<String>, datatype: DataType) -> Self {
        let position = self.columns.len() + 1;
        self.columns
            .push(ColumnDescriptor::new(name, position, datatype));
        self
    }

    /// Add a unique index over the named columns.
    pub fn with_unique_key(mut self, columns: &[&str]) -> Result<Self> {
        let positions = columns
            .iter()
            .map(|name| {
                self.column_by_name(name).map(|c| c.position).ok_or_else(|| {
                    DbError::new(format!(
                        "Column '{name}' is not in table '{}.{}'",
                        self.schema, self.name
                    ))
                    .with_sql_state(SqlState::ColumnNotFound)
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let name = format!("{}_UK{}", self.name, self.indexes.len() + 1);
        self.indexes.push(IndexDescriptor {
            name,
            columns: positions,
            unique: true,
        });
        Ok(self)
    }

    pub fn with_kind(mut self, kind: TableKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn column_by_name(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_by_position(&self, position: usize) -> Option<&ColumnDescriptor> {
        position
            .checked_sub(1)
            .and_then(|idx| self.columns.get(idx))
    }

    /// Column position sets of every unique key.
    pub fn unique_keys(&self) -> impl Iterator<Item = &[usize]> {
        self.indexes
            .iter()
            .filter(|idx| idx.unique)
            .map(|idx| idx.columns.as_slice())
    }

    pub fn is_updatable(&self) -> bool {
        self.kind == TableKind::Base
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutineNamespace {
    Function,
    TableFunction,
    Aggregate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutineDescriptor {
    pub schema: String,
    pub name: String,
    pub namespace: RoutineNamespace,
    pub return_type: DataType,
    /// Returns the same output for the same input within a statement.
    pub deterministic: bool,
    /// Output columns for table functions.
    pub columns: Vec<ColumnDescriptor>,
    /// Aggregates only: whether DISTINCT may be applied.
    pub allows_distinct: bool,
}

impl RoutineDescriptor {
    pub fn function(schema: &str, name: &str, return_type: DataType) -> Self {
        RoutineDescriptor {
            schema: schema.to_string(),
            name: name.to_string(),
            namespace: RoutineNamespace::Function,
            return_type,
            deterministic: true,
            columns: Vec::new(),
            allows_distinct: false,
        }
    }

    pub fn aggregate(schema: &str, name: &str, return_type: DataType, allows_distinct: bool) -> Self {
        RoutineDescriptor {
            namespace: RoutineNamespace::Aggregate,
            allows_distinct,
            ..Self::function(schema, name, return_type)
        }
    }

    pub fn table_function(schema: &str, name: &str, columns: Vec<ColumnDescriptor>) -> Self {
        RoutineDescriptor {
            namespace: RoutineNamespace::TableFunction,
            columns,
            ..Self::function(schema, name, DataType::unknown())
        }
    }

    pub fn with_deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }
}

/// Narrow metadata interface.
///
/// Lookups are synchronous and treated as cheap. Names are expected to be
/// normalized by the caller.
pub trait Catalog: Debug {
    fn get_table(&self, schema: &str, name: &str) -> Result<Option<&TableDescriptor>>;

    fn get_routine(
        &self,
        schema: &str,
        name: &str,
        namespace: RoutineNamespace,
    ) -> Result<Option<&RoutineDescriptor>>;

    /// Names of all tables in a schema, used for "did you mean" hints.
    fn list_table_names(&self, schema: &str) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_key_positions() {
        let table = TableDescriptor::new("APP", "T")
            .with_column("A", DataType::integer())
            .with_column("B", DataType::integer())
            .with_unique_key(&["B", "A"])
            .unwrap();
        let keys: Vec<&[usize]> = table.unique_keys().collect();
        assert_eq!(vec![&[2_usize, 1][..]], keys);
    }

    #[test]
    fn unique_key_unknown_column() {
        let err = TableDescriptor::new("APP", "T")
            .with_column("A", DataType::integer())
            .with_unique_key(&["MISSING"])
            .unwrap_err();
        assert_eq!(Some(SqlState::ColumnNotFound), err.sql_state());
    }
}
