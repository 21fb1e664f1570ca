//! Result columns and the arena they live in.
//!
//! Every `ResultColumn` in a statement is stored once in a `ColumnArena` and
//! owned by exactly one `ResultColumnList`. Column references and virtual
//! columns point at result columns through `RcRef` handles.

pub mod result_column_list;

use std::fmt;
use std::ops::{Index, IndexMut};

pub use result_column_list::{ColumnMapping, ResultColumnList};

use crate::catalog::ColumnDescriptor;
use crate::config::DEFAULT_MAX_GENERATED_NAME_LENGTH;
use crate::expr::Expression;
use crate::types::DataType;

/// Reference to a result column in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RcRef {
    pub rc_idx: usize,
}

impl fmt::Display for RcRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.rc_idx)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultColumn {
    pub name: String,
    /// Name was synthesized rather than written by the user.
    pub name_generated: bool,
    /// 1-based position within the owning list.
    pub virtual_column_id: usize,
    pub expression: Expression,
    pub datatype: DataType,
    /// Catalog column for columns read from a stored table.
    pub source_column: Option<ColumnDescriptor>,
    pub referenced: bool,
    /// Target of an UPDATE.
    pub updated: bool,
    /// Join column of a right outer join with USING, the value is a coalesce
    /// of both sides.
    pub right_outer_join_using: bool,
    /// Added by the compiler for grouping or aggregation, not visible to the
    /// user.
    pub generated: bool,
    /// Pulled up from ORDER BY, not visible to the user.
    pub generated_for_order_by: bool,
}

impl ResultColumn {
    pub fn new(name: impl Into<String>, expression: Expression) -> Self {
        let datatype = expression.datatype();
        ResultColumn {
            name: name.into(),
            name_generated: false,
            virtual_column_id: 0,
            expression,
            datatype,
            source_column: None,
            referenced: false,
            updated: false,
            right_outer_join_using: false,
            generated: false,
            generated_for_order_by: false,
        }
    }

    /// 1-based position of the underlying table column, if any.
    pub fn column_position(&self) -> Option<usize> {
        self.source_column.as_ref().map(|col| col.position)
    }

    pub fn is_streamable(&self) -> bool {
        self.datatype.id.is_streamable()
    }

    /// Copy of this column for another list, sharing the expression.
    pub fn shallow_copy(&self) -> Self {
        ResultColumn {
            virtual_column_id: 0,
            ..self.clone()
        }
    }
}

impl fmt::Display for ResultColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) = {}",
            self.name, self.virtual_column_id, self.expression
        )
    }
}

/// Storage for every result column of a statement.
#[derive(Debug, Default)]
pub struct ColumnArena {
    columns: Vec<ResultColumn>,
}

impl ColumnArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: ResultColumn) -> RcRef {
        let rc_idx = self.columns.len();
        self.columns.push(column);
        RcRef { rc_idx }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Move the expression out of a column so it can be rewritten with
    /// mutable access to the arena.
    ///
    /// Must be followed by `put_expression`.
    pub fn take_expression(&mut self, rc: RcRef) -> Expression {
        std::mem::replace(&mut self[rc].expression, Expression::null())
    }

    pub fn put_expression(&mut self, rc: RcRef, expr: Expression) {
        self[rc].expression = expr;
    }

    /// Apply `f` to the expression of `rc`.
    pub fn with_expression_mut<F, T>(&mut self, rc: RcRef, f: F) -> T
    where
        F: FnOnce(&mut Expression, &mut ColumnArena) -> T,
    {
        let mut expr = self.take_expression(rc);
        let out = f(&mut expr, self);
        self.put_expression(rc, expr);
        out
    }

    /// Mark a column referenced along with every column it is threaded from.
    pub fn mark_referenced(&mut self, rc: RcRef) {
        let mut current = Some(rc);
        while let Some(rc) = current {
            let column = &mut self[rc];
            column.referenced = true;
            current = match &column.expression {
                Expression::VirtualColumn(vcol) => Some(vcol.source),
                Expression::Column(col) => Some(col.source),
                _ => None,
            };
        }
    }
}

impl Index<RcRef> for ColumnArena {
    type Output = ResultColumn;

    fn index(&self, index: RcRef) -> &Self::Output {
        &self.columns[index.rc_idx]
    }
}

impl IndexMut<RcRef> for ColumnArena {
    fn index_mut(&mut self, index: RcRef) -> &mut Self::Output {
        &mut self.columns[index.rc_idx]
    }
}

/// Generator for names of unnamed columns, unique per statement.
#[derive(Debug, Clone)]
pub struct GeneratedNames {
    next: usize,
    max_length: usize,
}

impl Default for GeneratedNames {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_GENERATED_NAME_LENGTH)
    }
}

impl GeneratedNames {
    pub fn new(max_length: usize) -> Self {
        GeneratedNames {
            next: 1,
            max_length,
        }
    }

    pub fn next_name(&mut self) -> String {
        let name = format!("SQLCol{}", self.next);
        self.next += 1;
        if name.len() > self.max_length {
            // Keep the counter, it's what makes the name unique.
            return name[name.len() - self.max_length..].to_string();
        }
        name
    }
}
