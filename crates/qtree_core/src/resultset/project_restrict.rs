use crate::expr::Expression;
use crate::expr::column_expr::VirtualColumnExpr;
use crate::predicate::PredicateList;
use crate::rcl::{ColumnArena, ResultColumn, ResultColumnList};
use crate::resultset::ResultSetNode;

/// Filters the rows of a child and passes its columns through.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRestrictNode {
    pub child: ResultSetNode,
    pub result_columns: ResultColumnList,
    /// Evaluated against the child's columns.
    pub restriction: PredicateList,
    pub level: usize,
}

impl ProjectRestrictNode {
    /// Wrap `child`, exposing each of its visible columns.
    pub fn new(arena: &mut ColumnArena, child: ResultSetNode) -> Self {
        let visible: Vec<_> = child.result_columns().visible_columns(arena).collect();
        let columns = visible
            .into_iter()
            .map(|source| {
                let column = &arena[source];
                let mut rc = ResultColumn::new(
                    column.name.clone(),
                    Expression::VirtualColumn(VirtualColumnExpr {
                        source_table: None,
                        source,
                        datatype: column.datatype,
                        correlated: false,
                    }),
                );
                rc.name_generated = column.name_generated;
                rc.referenced = true;
                arena.push(rc)
            })
            .collect();

        let level = child.level();
        ProjectRestrictNode {
            child,
            result_columns: ResultColumnList::from_columns(arena, columns),
            restriction: PredicateList::new(),
            level,
        }
    }
}
