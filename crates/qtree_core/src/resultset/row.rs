use crate::expr::Expression;
use crate::rcl::{ColumnArena, ResultColumn, ResultColumnList};

/// A single row table constructor, `VALUES (e1, e2, ...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RowResultSet {
    pub level: usize,
    pub result_columns: ResultColumnList,
}

impl RowResultSet {
    /// Create a row from bound expressions. Columns are left unnamed.
    pub fn new(arena: &mut ColumnArena, exprs: Vec<Expression>, level: usize) -> Self {
        let columns = exprs
            .into_iter()
            .map(|expr| arena.push(ResultColumn::new("", expr)))
            .collect();
        RowResultSet {
            level,
            result_columns: ResultColumnList::from_columns(arena, columns),
        }
    }

    /// Expressions of the row, in order.
    pub fn expressions<'a>(&'a self, arena: &'a ColumnArena) -> impl Iterator<Item = &'a Expression> + 'a {
        self.result_columns.iter().map(|rc| &arena[rc].expression)
    }
}
