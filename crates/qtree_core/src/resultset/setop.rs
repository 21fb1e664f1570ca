use qtree_error::Result;

use crate::ast::SetOperation;
use crate::rcl::{ColumnArena, GeneratedNames, ResultColumnList};
use crate::resultset::ResultSetNode;
use crate::table_map::TableNumber;

#[derive(Debug, Clone, PartialEq)]
pub struct SetOpNode {
    pub op: SetOperation,
    pub all: bool,
    pub left: ResultSetNode,
    pub right: ResultSetNode,
    pub table_number: TableNumber,
    pub level: usize,
    /// Columns referencing the left side, typed with the dominant type of
    /// both sides.
    pub result_columns: ResultColumnList,
}

impl SetOpNode {
    /// Combine two bound query blocks, reconciling their column types.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        arena: &mut ColumnArena,
        names: &mut GeneratedNames,
        op: SetOperation,
        all: bool,
        left: ResultSetNode,
        right: ResultSetNode,
        table_number: TableNumber,
        level: usize,
    ) -> Result<Self> {
        let visible: Vec<_> = left.result_columns().visible_columns(arena).collect();
        let copies = visible
            .into_iter()
            .map(|rc| {
                let mut copy = arena[rc].shallow_copy();
                copy.referenced = false;
                arena.push(copy)
            })
            .collect();
        let result_columns = ResultColumnList::from_columns(arena, copies);

        result_columns.set_union_result_expression(
            arena,
            left.result_columns(),
            right.result_columns(),
            table_number,
            level,
            op_name(op),
            names,
        )?;

        Ok(SetOpNode {
            op,
            all,
            left,
            right,
            table_number,
            level,
            result_columns,
        })
    }
}

pub const fn op_name(op: SetOperation) -> &'static str {
    match op {
        SetOperation::Union => "UNION",
        SetOperation::Intersect => "INTERSECT",
        SetOperation::Except => "EXCEPT",
    }
}
