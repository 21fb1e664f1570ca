use std::collections::{HashMap, HashSet};

use qtree_error::{DbError, Result, SqlState};

use super::{ColumnArena, GeneratedNames, RcRef, ResultColumn};
use crate::expr::Expression;
use crate::expr::column_expr::{ColumnExpr, VirtualColumnExpr};
use crate::expr::literal_expr::{LiteralExpr, ScalarValue};
use crate::table_map::TableNumber;

/// Ordered list of result columns.
///
/// Virtual column ids of member columns always equal their 1-based position.
/// Every structural mutation renumbers the columns it shifted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultColumnList {
    columns: Vec<RcRef>,
    /// Number of trailing columns pulled up from ORDER BY.
    pub order_by_select: usize,
}

/// Positions of source columns for each column of a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    /// 1-based virtual column id of the source column, None if the column
    /// has to evaluate its own expression.
    pub map: Vec<Option<usize>>,
    /// Column aliases a streamable source column already read by an earlier
    /// column, the value needs to be cloned before the second read.
    pub clone_needed: Vec<bool>,
}

impl ResultColumnList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(arena: &mut ColumnArena, columns: Vec<RcRef>) -> Self {
        let rcl = ResultColumnList {
            columns,
            order_by_select: 0,
        };
        rcl.renumber(arena);
        rcl
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = RcRef> + ExactSizeIterator + '_ {
        self.columns.iter().copied()
    }

    pub fn as_slice(&self) -> &[RcRef] {
        &self.columns
    }

    /// Get a column by its 0-based index.
    pub fn get(&self, idx: usize) -> Option<RcRef> {
        self.columns.get(idx).copied()
    }

    /// Get a column by its 1-based virtual column id.
    pub fn get_by_vcid(&self, vcid: usize) -> Option<RcRef> {
        vcid.checked_sub(1).and_then(|idx| self.get(idx))
    }

    pub fn first(&self) -> Option<RcRef> {
        self.get(0)
    }

    pub fn position(&self, rc: RcRef) -> Option<usize> {
        self.columns.iter().position(|&c| c == rc)
    }

    pub fn add_result_column(&mut self, arena: &mut ColumnArena, rc: RcRef) {
        self.columns.push(rc);
        arena[rc].virtual_column_id = self.columns.len();
    }

    pub fn insert(&mut self, arena: &mut ColumnArena, idx: usize, rc: RcRef) {
        self.columns.insert(idx, rc);
        self.renumber_from(arena, idx);
    }

    pub fn remove(&mut self, arena: &mut ColumnArena, idx: usize) -> Option<RcRef> {
        if idx >= self.columns.len() {
            return None;
        }
        let rc = self.columns.remove(idx);
        self.renumber_from(arena, idx);
        Some(rc)
    }

    pub fn truncate(&mut self, len: usize) {
        self.columns.truncate(len);
    }

    fn renumber_from(&self, arena: &mut ColumnArena, start: usize) {
        for (idx, &rc) in self.columns.iter().enumerate().skip(start) {
            arena[rc].virtual_column_id = idx + 1;
        }
    }

    pub fn renumber(&self, arena: &mut ColumnArena) {
        self.renumber_from(arena, 0)
    }

    /// Assert every column's virtual column id matches its position.
    pub fn check_virtual_column_ids(&self, arena: &ColumnArena) -> Result<()> {
        for (idx, &rc) in self.columns.iter().enumerate() {
            let vcid = arena[rc].virtual_column_id;
            if vcid != idx + 1 {
                return Err(DbError::internal("Virtual column id out of sync")
                    .with_field("column", arena[rc].name.clone())
                    .with_field("expected", idx + 1)
                    .with_field("got", vcid));
            }
        }
        Ok(())
    }

    /// Number of generated columns, excluding ORDER BY pull-ups.
    pub fn generated_count(&self, arena: &ColumnArena) -> usize {
        self.iter()
            .filter(|&rc| arena[rc].generated && !arena[rc].generated_for_order_by)
            .count()
    }

    /// Number of columns visible to the user.
    pub fn visible_size(&self, arena: &ColumnArena) -> usize {
        self.len() - self.order_by_select - self.generated_count(arena)
    }

    pub fn visible_columns<'a>(&'a self, arena: &'a ColumnArena) -> impl Iterator<Item = RcRef> + 'a {
        self.iter()
            .filter(|&rc| !arena[rc].generated && !arena[rc].generated_for_order_by)
    }

    /// Append a column for an ORDER BY expression not in the select list.
    pub fn add_order_by_column(&mut self, arena: &mut ColumnArena, rc: RcRef) {
        arena[rc].generated_for_order_by = true;
        self.add_result_column(arena, rc);
        self.order_by_select += 1;
    }

    /// Remove the trailing ORDER BY pull-up columns.
    pub fn remove_order_by_columns(&mut self) -> Vec<RcRef> {
        let keep = self.columns.len() - self.order_by_select;
        self.order_by_select = 0;
        self.columns.split_off(keep)
    }

    /// Find the first non-pulled-up column with the given name.
    pub fn find_by_name(&self, arena: &ColumnArena, name: &str) -> Option<RcRef> {
        self.iter()
            .find(|&rc| arena[rc].name == name && !arena[rc].generated_for_order_by)
    }

    pub fn column_names(&self, arena: &ColumnArena) -> Vec<String> {
        self.iter().map(|rc| arena[rc].name.clone()).collect()
    }

    /// Give every unnamed column a generated name.
    pub fn name_columns(&self, arena: &mut ColumnArena, names: &mut GeneratedNames) {
        for rc in self.iter() {
            let column = &mut arena[rc];
            if column.name.is_empty() {
                column.name = names.next_name();
                column.name_generated = true;
            }
        }
    }

    /// Rename columns to a derived column list.
    pub fn set_column_names(&self, arena: &mut ColumnArena, names: &[String]) -> Result<()> {
        if names.len() != self.visible_size(arena) {
            return Err(DbError::new(format!(
                "Derived column list has {} columns, query produces {}",
                names.len(),
                self.visible_size(arena)
            ))
            .with_sql_state(SqlState::ColumnCountMismatch));
        }

        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name.as_str()) {
                return Err(DbError::new(format!(
                    "Duplicate column name '{name}' in derived column list"
                ))
                .with_sql_state(SqlState::DuplicateColumnName));
            }
        }

        for (rc, name) in self.iter().zip(names) {
            arena[rc].name = name.clone();
            arena[rc].name_generated = false;
        }

        Ok(())
    }

    /// Point each column of this list at the column in the same position of
    /// `source`.
    pub fn gen_virtual_column_nodes(
        &self,
        arena: &mut ColumnArena,
        source_table: Option<TableNumber>,
        source: &ResultColumnList,
        mark_referenced: bool,
    ) -> Result<()> {
        if source.len() < self.len() {
            return Err(DbError::internal("Source list shorter than target list")
                .with_field("source", source.len())
                .with_field("target", self.len()));
        }

        for (rc, source_rc) in self.iter().zip(source.iter()) {
            let datatype = arena[source_rc].datatype;
            arena[rc].expression = Expression::VirtualColumn(VirtualColumnExpr {
                source_table,
                source: source_rc,
                datatype,
                correlated: false,
            });
            if mark_referenced {
                arena[source_rc].referenced = true;
            }
        }

        Ok(())
    }

    /// Copy every column of this list into new arena slots.
    pub fn copy_list_and_objects(&self, arena: &mut ColumnArena) -> ResultColumnList {
        let columns = self
            .iter()
            .map(|rc| {
                let copy = arena[rc].shallow_copy();
                arena.push(copy)
            })
            .collect();

        let mut rcl = ResultColumnList::from_columns(arena, columns);
        rcl.order_by_select = self.order_by_select;
        rcl
    }

    /// Remove columns that are unreferenced and whose virtual column source
    /// is unreferenced too.
    ///
    /// Never leaves the list empty, a constant column is added if every
    /// column is removed. Returns the number of columns removed.
    pub fn do_projection(&mut self, arena: &mut ColumnArena) -> usize {
        let before = self.columns.len();
        self.columns.retain(|&rc| {
            let column = &arena[rc];
            match &column.expression {
                Expression::VirtualColumn(vcol) if !column.referenced => {
                    arena[vcol.source].referenced
                }
                _ => true,
            }
        });
        let removed = before - self.columns.len();
        self.renumber(arena);

        if self.columns.is_empty() {
            self.add_constant_column(arena);
        }

        if removed > 0 {
            tracing::debug!(removed, remaining = self.columns.len(), "projected out columns");
        }

        removed
    }

    /// Remove unreferenced columns of a table scan, returning the 1-based
    /// positions of the columns that remain.
    ///
    /// Positioned updates need every column in place so nothing is removed.
    /// At least one column is always kept.
    pub fn compact_columns(&mut self, arena: &mut ColumnArena, positioned_update: bool) -> Vec<usize> {
        if positioned_update {
            return (1..=self.columns.len()).collect();
        }

        let mut kept = Vec::new();
        let mut columns = Vec::new();
        for (idx, &rc) in self.columns.iter().enumerate() {
            if arena[rc].referenced {
                kept.push(idx + 1);
                columns.push(rc);
            }
        }

        if columns.is_empty() {
            if let Some(&rc) = self.columns.first() {
                kept.push(1);
                columns.push(rc);
            }
        }

        self.columns = columns;
        self.renumber(arena);
        kept
    }

    fn add_constant_column(&mut self, arena: &mut ColumnArena) {
        let mut rc = ResultColumn::new(
            "",
            Expression::Literal(LiteralExpr {
                literal: ScalarValue::Int32(1),
            }),
        );
        rc.name_generated = true;
        rc.referenced = true;
        let rc = arena.push(rc);
        self.add_result_column(arena, rc);
    }

    /// Set the expressions of this set operation result list, which holds
    /// copies of the columns of `left`.
    ///
    /// Each column becomes a reference to the matching column of `left` typed
    /// with the dominant type of both sides.
    #[allow(clippy::too_many_arguments)]
    pub fn set_union_result_expression(
        &self,
        arena: &mut ColumnArena,
        left: &ResultColumnList,
        right: &ResultColumnList,
        table_number: TableNumber,
        level: usize,
        operator: &str,
        names: &mut GeneratedNames,
    ) -> Result<()> {
        if left.visible_size(arena) != right.visible_size(arena) {
            return Err(DbError::new(format!(
                "Both sides of {operator} must have the same number of columns, got {} and {}",
                left.visible_size(arena),
                right.visible_size(arena)
            ))
            .with_sql_state(SqlState::ColumnCountMismatch));
        }

        for ((rc, left_rc), right_rc) in self.iter().zip(left.iter()).zip(right.iter()) {
            let left_type = arena[left_rc].datatype;
            let right_type = arena[right_rc].datatype;

            if !left_type.union_compatible(&right_type) {
                return Err(DbError::new(format!(
                    "Types {left_type} and {right_type} are not compatible for {operator}"
                ))
                .with_sql_state(SqlState::NotUnionCompatible)
                .with_field("column", arena[rc].virtual_column_id));
            }

            let datatype = left_type.dominant_type(&right_type);

            let right_column = &arena[right_rc];
            let (right_name, right_generated) =
                (right_column.name.clone(), right_column.name_generated);
            let column = &mut arena[rc];
            if !column.name_generated {
                if right_generated {
                    column.name = right_name;
                    column.name_generated = true;
                } else if column.name != right_name {
                    column.name = names.next_name();
                    column.name_generated = true;
                }
            }

            let col = ColumnExpr::new(
                column.name.clone(),
                Some(table_number),
                left_rc,
                level,
                level,
                datatype,
            );
            column.expression = Expression::Column(col);
            column.datatype = datatype;
        }

        Ok(())
    }

    /// Map each column to the virtual column id of the column it reads.
    pub fn map_source_columns(&self, arena: &ColumnArena) -> ColumnMapping {
        let mut map = Vec::with_capacity(self.len());
        let mut clone_needed = Vec::with_capacity(self.len());
        let mut seen_streamable = HashSet::new();

        for rc in self.iter() {
            let column = &arena[rc];
            let source = match &column.expression {
                _ if column.right_outer_join_using => None,
                Expression::VirtualColumn(vcol) => Some(vcol.source),
                Expression::Column(col) => Some(col.source),
                _ => None,
            };

            match source {
                Some(source) => {
                    let vcid = arena[source].virtual_column_id;
                    let needs_clone =
                        arena[source].is_streamable() && !seen_streamable.insert(source);
                    map.push(Some(vcid));
                    clone_needed.push(needs_clone);
                }
                None => {
                    map.push(None);
                    clone_needed.push(false);
                }
            }
        }

        ColumnMapping { map, clone_needed }
    }

    pub fn mark_all_unreferenced(&self, arena: &mut ColumnArena) {
        for rc in self.iter() {
            arena[rc].referenced = false;
        }
    }

    pub fn count_referenced_columns(&self, arena: &ColumnArena) -> usize {
        self.iter().filter(|&rc| arena[rc].referenced).count()
    }

    /// Whether this list just passes through every column of `child` in
    /// order.
    pub fn nop_projection(&self, arena: &ColumnArena, child: &ResultColumnList) -> bool {
        if self.len() != child.len() {
            return false;
        }

        self.iter().zip(child.iter()).all(|(rc, child_rc)| {
            matches!(&arena[rc].expression, Expression::VirtualColumn(vcol) if vcol.source == child_rc)
        })
    }

    /// Error if two columns share a name.
    pub fn verify_unique_names(&self, arena: &ColumnArena) -> Result<()> {
        let mut seen = HashSet::new();
        for rc in self.iter() {
            let name = &arena[rc].name;
            if !seen.insert(name.as_str()) {
                return Err(DbError::new(format!("Duplicate column name '{name}'"))
                    .with_sql_state(SqlState::DuplicateColumnName));
            }
        }
        Ok(())
    }

    /// Mark every column nullable, used for the inner side of outer joins.
    pub fn set_nullability(&self, arena: &mut ColumnArena, nullable: bool) {
        for rc in self.iter() {
            let column = &mut arena[rc];
            column.datatype = column.datatype.with_nullable(nullable);
            if let Expression::VirtualColumn(vcol) = &mut column.expression {
                vcol.datatype = vcol.datatype.with_nullable(nullable);
            }
        }
    }

    /// Columns matching each of `names`, in the order of `names`.
    pub fn get_join_columns(&self, arena: &ColumnArena, names: &[String]) -> Result<Vec<RcRef>> {
        let by_name: HashMap<&str, RcRef> = self
            .iter()
            .rev()
            .map(|rc| (arena[rc].name.as_str(), rc))
            .collect();

        names
            .iter()
            .map(|name| {
                by_name.get(name.as_str()).copied().ok_or_else(|| {
                    DbError::new(format!("Join column '{name}' not found"))
                        .with_sql_state(SqlState::ColumnNotFound)
                })
            })
            .collect()
    }

    /// Whether this list has `rc`, or a virtual column reading `rc`.
    pub fn provides(&self, arena: &ColumnArena, rc: RcRef) -> bool {
        self.iter().any(|c| {
            c == rc
                || matches!(&arena[c].expression, Expression::VirtualColumn(vcol) if vcol.source == rc)
        })
    }
}
