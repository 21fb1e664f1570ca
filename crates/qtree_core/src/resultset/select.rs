use crate::expr::Expression;
use crate::from::from_list::FromList;
use crate::predicate::PredicateList;
use crate::rcl::{ColumnArena, RcRef, ResultColumnList};
use crate::table_map::TableNumber;

/// Columns computing the aggregates of a query block.
///
/// Aggregates in the select list and HAVING clause are replaced with
/// references to these columns during preprocessing.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateBlock {
    pub table_number: TableNumber,
    pub result_columns: ResultColumnList,
}

/// A SELECT query block.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectNode {
    /// Nesting level, 0 for the outermost block.
    pub level: usize,
    pub result_columns: ResultColumnList,
    pub from_list: FromList,
    /// Bound WHERE clause. Moved into `where_predicates` when the block is
    /// preprocessed.
    pub where_clause: Option<Expression>,
    pub where_predicates: PredicateList,
    /// Grouping columns, each a column of `result_columns`.
    pub group_by: Vec<RcRef>,
    pub having: Option<Expression>,
    pub distinct: bool,
    pub has_aggregates: bool,
    pub has_windows: bool,
    pub aggregate: Option<AggregateBlock>,
    /// WHERE clause contained a subquery when bound. Quantified subqueries
    /// in such a block are never flattened into the block's parent.
    pub original_where_had_subqueries: bool,
    pub preprocessed: bool,
}

impl SelectNode {
    pub fn new(level: usize, result_columns: ResultColumnList, from_list: FromList) -> Self {
        SelectNode {
            level,
            result_columns,
            from_list,
            where_clause: None,
            where_predicates: PredicateList::new(),
            group_by: Vec::new(),
            having: None,
            distinct: false,
            has_aggregates: false,
            has_windows: false,
            aggregate: None,
            original_where_had_subqueries: false,
            preprocessed: false,
        }
    }

    /// Adjust levels of everything but the result columns.
    pub(crate) fn decrement_level(&mut self, arena: &mut ColumnArena, level: usize) {
        self.from_list.decrement_level(arena, level);
        if let Some(clause) = &mut self.where_clause {
            clause.decrement_level(arena, level);
        }
        self.where_predicates.decrement_level(arena, level);
        if let Some(having) = &mut self.having {
            having.decrement_level(arena, level);
        }
        if let Some(aggregate) = &self.aggregate {
            for rc in aggregate.result_columns.iter() {
                arena.with_expression_mut(rc, |expr, arena| expr.decrement_level(arena, level));
            }
        }
        if self.level >= level && self.level > 0 {
            self.level -= 1;
        }
    }

    /// Visit the expressions of every clause except the select list.
    pub(crate) fn walk_clauses<F>(&self, arena: &ColumnArena, f: &mut F)
    where
        F: FnMut(&Expression),
    {
        if let Some(clause) = &self.where_clause {
            clause.walk_deep(arena, f);
        }
        self.where_predicates.walk_expressions(arena, f);
        self.from_list.walk_expressions(arena, f);
        if let Some(having) = &self.having {
            having.walk_deep(arena, f);
        }
        if let Some(aggregate) = &self.aggregate {
            for rc in aggregate.result_columns.iter() {
                arena[rc].expression.walk_deep(arena, f);
            }
        }
    }

    pub fn is_grouped(&self) -> bool {
        self.has_aggregates || !self.group_by.is_empty()
    }
}
