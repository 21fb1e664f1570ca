use std::fmt;

use qtree_error::Result;

use super::Expression;
use super::column_expr::{ColumnExpr, VirtualColumnExpr};
use crate::rcl::result_column_list::ResultColumnList;
use crate::rcl::{ColumnArena, GeneratedNames, RcRef, ResultColumn};
use crate::table_map::TableNumber;
use crate::types::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    /// Aggregate defined in the catalog.
    User,
}

impl AggregateKind {
    /// Builtin aggregate for an unqualified name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "COUNT" => Some(Self::Count),
            "SUM" => Some(Self::Sum),
            "AVG" => Some(Self::Avg),
            "MIN" => Some(Self::Min),
            "MAX" => Some(Self::Max),
            _ => None,
        }
    }
}

/// Column generated the first time an aggregate is hoisted.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAggregate {
    pub rc: RcRef,
    pub column: ColumnExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpr {
    pub kind: AggregateKind,
    pub name: String,
    /// Schema for user aggregates.
    pub schema: Option<String>,
    /// None for `COUNT(*)`.
    pub operand: Option<Box<Expression>>,
    pub distinct: bool,
    pub datatype: DataType,
    pub generated: Option<GeneratedAggregate>,
}

impl AggregateExpr {
    pub fn is_count_star(&self) -> bool {
        self.kind == AggregateKind::Count && self.operand.is_none()
    }

    /// Replace this aggregate with a reference to a generated column in
    /// `rcl`.
    ///
    /// The first call appends a new column holding the aggregate and caches a
    /// reference to it. Later calls return the cached reference, appending a
    /// column that threads the generated column into `rcl` if it does not
    /// already have one.
    pub fn replace_with_column_reference(
        &mut self,
        arena: &mut ColumnArena,
        rcl: &mut ResultColumnList,
        table_number: TableNumber,
        level: usize,
        names: &mut GeneratedNames,
    ) -> Result<Expression> {
        if let Some(generated) = &self.generated {
            if !rcl.provides(arena, generated.rc) {
                let mut rc = ResultColumn::new(
                    arena[generated.rc].name.clone(),
                    Expression::VirtualColumn(VirtualColumnExpr {
                        source_table: Some(table_number),
                        source: generated.rc,
                        datatype: self.datatype,
                        correlated: false,
                    }),
                );
                rc.name_generated = true;
                rc.generated = true;
                let rc = arena.push(rc);
                rcl.add_result_column(arena, rc);
            }
            return Ok(Expression::Column(generated.column.clone()));
        }

        let name = names.next_name();
        let mut stored = self.clone();
        stored.generated = None;

        let mut rc = ResultColumn::new(name.clone(), Expression::Aggregate(stored));
        rc.name_generated = true;
        rc.generated = true;
        let rc = arena.push(rc);
        rcl.add_result_column(arena, rc);

        let mut column = ColumnExpr::new(name, Some(table_number), rc, level, level, self.datatype);
        column.replaces_aggregate = true;

        tracing::trace!(aggregate = %self, column = %column.name, "hoisted aggregate");

        self.generated = Some(GeneratedAggregate {
            rc,
            column: column.clone(),
        });

        Ok(Expression::Column(column))
    }
}

impl fmt::Display for AggregateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        match &self.operand {
            Some(operand) => write!(f, "{operand}")?,
            None => write!(f, "*")?,
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::column_expr::BaseColumnExpr;

    fn sum_of_base(arena: &mut ColumnArena) -> AggregateExpr {
        let base = arena.push(ResultColumn::new(
            "A",
            Expression::BaseColumn(BaseColumnExpr {
                table_number: TableNumber(0),
                position: 1,
                name: "A".to_string(),
                datatype: DataType::integer(),
            }),
        ));
        AggregateExpr {
            kind: AggregateKind::Sum,
            name: "SUM".to_string(),
            schema: None,
            operand: Some(Box::new(Expression::Column(ColumnExpr::new(
                "A",
                Some(TableNumber(0)),
                base,
                0,
                0,
                DataType::integer(),
            )))),
            distinct: false,
            datatype: DataType::integer(),
            generated: None,
        }
    }

    #[test]
    fn replacement_is_idempotent() {
        let mut arena = ColumnArena::new();
        let mut names = GeneratedNames::default();
        let mut agg = sum_of_base(&mut arena);

        let mut first_rcl = ResultColumnList::new();
        let mut second_rcl = ResultColumnList::new();

        let a = agg
            .replace_with_column_reference(&mut arena, &mut first_rcl, TableNumber(3), 0, &mut names)
            .unwrap();
        let b = agg
            .replace_with_column_reference(&mut arena, &mut first_rcl, TableNumber(3), 0, &mut names)
            .unwrap();
        let c = agg
            .replace_with_column_reference(&mut arena, &mut second_rcl, TableNumber(3), 0, &mut names)
            .unwrap();
        let d = agg
            .replace_with_column_reference(&mut arena, &mut second_rcl, TableNumber(3), 0, &mut names)
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a, d);
        assert_eq!(1, first_rcl.len());
        assert_eq!(1, second_rcl.len());
        first_rcl.check_virtual_column_ids(&arena).unwrap();
        second_rcl.check_virtual_column_ids(&arena).unwrap();

        let Expression::Column(col) = a else {
            panic!("expected column")
        };
        assert!(col.replaces_aggregate);
        assert_eq!(Some(col.source), first_rcl.get(0));
    }
}
