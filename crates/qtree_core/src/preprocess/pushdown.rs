use qtree_error::Result;

use super::PreprocessContext;
use crate::from::FromTable;
use crate::from::join::{JoinKind, JoinNode};
use crate::predicate::PredicateList;
use crate::rcl::ColumnArena;
use crate::resultset::select::SelectNode;

impl PreprocessContext<'_> {
    /// Move single table predicates of a block's WHERE and ON clauses into
    /// the tables they reference.
    pub(crate) fn push_block_predicates(&mut self, select: &mut SelectNode) -> Result<()> {
        if !self.config.enable_predicate_pushdown {
            return Ok(());
        }

        let arena = &self.output.arena;
        for table in select.from_list.iter_mut() {
            push_join_predicates(arena, table)?;
        }

        let before = select.where_predicates.len();
        select
            .from_list
            .push_predicates(arena, &mut select.where_predicates)?;

        tracing::trace!(
            level = select.level,
            pushed = before - select.where_predicates.len(),
            remaining = select.where_predicates.len(),
            "pushed block predicates",
        );

        Ok(())
    }
}

/// Push the ON predicates of every join at or below `table` into the join's
/// children, innermost joins first.
///
/// Only the null producing side of an outer join may be filtered by its ON
/// clause, predicates on the preserved side stay at the join.
fn push_join_predicates(arena: &ColumnArena, table: &mut FromTable) -> Result<()> {
    let FromTable::Join(join) = table else {
        return Ok(());
    };
    push_join_predicates(arena, &mut join.left)?;
    push_join_predicates(arena, &mut join.right)?;

    let mut left = PredicateList::new();
    let mut right = PredicateList::new();
    let mut kept = PredicateList::new();
    for predicate in std::mem::take(&mut join.join_predicates) {
        let tables = &predicate.referenced_tables;
        if !predicate.pushable {
            kept.push(predicate);
            continue;
        }
        match join.kind {
            JoinKind::Inner | JoinKind::RightOuter if join.left.can_accept(tables) => {
                left.push(predicate)
            }
            JoinKind::Inner | JoinKind::LeftOuter if join.right.can_accept(tables) => {
                right.push(predicate)
            }
            _ => kept.push(predicate),
        }
    }

    if !left.is_empty() || !right.is_empty() {
        tracing::debug!(
            join = %join.table_number,
            left = left.len(),
            right = right.len(),
            kept = kept.len(),
            "pushed join predicates",
        );
    }

    JoinNode::push_to_child(arena, &mut join.left, left)?;
    JoinNode::push_to_child(arena, &mut join.right, right)?;
    join.join_predicates = kept;
    Ok(())
}
