use qtree_error::Result;

use super::{FlattenTarget, PreprocessContext};
use crate::expr::comparison_expr::ComparisonExpr;
use crate::expr::{Expression, subquery_expr::SubqueryExpr};
use crate::from::FromTable;
use crate::predicate::cnf;
use crate::predicate::{Predicate, PredicateList};
use crate::rcl::ResultColumnList;
use crate::resultset::select::{AggregateBlock, SelectNode};
use crate::table_map::TableNumber;

impl PreprocessContext<'_> {
    pub(crate) fn preprocess_select(&mut self, select: &mut SelectNode) -> Result<()> {
        if select.preprocessed {
            return Ok(());
        }
        select.preprocessed = true;

        for table in select.from_list.iter_mut() {
            self.preprocess_from_table(table)?;
        }

        let mut target = FlattenTarget::default();
        if let Some(clause) = select.where_clause.take() {
            let mut conjuncts = Vec::new();
            for conjunct in cnf::normalize(clause) {
                let rewritten = self.preprocess_conjunct(conjunct, &mut target)?;
                conjuncts.extend(cnf::split_conjuncts(rewritten));
            }
            select.where_predicates = conjuncts
                .into_iter()
                .filter(|conjunct| !conjunct.is_literal_bool(true))
                .map(Predicate::new)
                .collect();
        }

        if !target.tables.is_empty() {
            tracing::debug!(
                level = select.level,
                tables = target.tables.len(),
                predicates = target.predicates.len(),
                "merged flattened subqueries into block",
            );
        }
        select.from_list.tables.append(&mut target.tables);
        select.where_predicates.append(&mut target.predicates);

        // Aggregates are hoisted before the select list and HAVING subqueries
        // are rewritten since those may move expressions into the subquery.
        if select.has_aggregates {
            self.hoist_aggregates(select)?;
        }

        let columns: Vec<_> = select.result_columns.iter().collect();
        for rc in columns {
            self.rewrite_column_expression(rc)?;
        }
        if let Some(having) = select.having.take() {
            let having = cnf::eliminate_nots(having, false);
            select.having = Some(self.preprocess_expression(having)?);
        }

        select.where_predicates.categorize(&self.output.arena);
        self.push_block_predicates(select)?;
        select.from_list.project_columns(&mut self.output.arena);

        tracing::trace!(
            level = select.level,
            tables = select.from_list.len(),
            predicates = select.where_predicates.len(),
            "preprocessed select",
        );

        Ok(())
    }

    fn preprocess_from_table(&mut self, table: &mut FromTable) -> Result<()> {
        match table {
            FromTable::Base(_) | FromTable::Vti(_) => Ok(()),
            FromTable::Subquery(derived) => self.preprocess_node(&mut derived.subquery),
            FromTable::Join(join) => {
                self.preprocess_from_table(&mut join.left)?;
                self.preprocess_from_table(&mut join.right)?;
                if let Some(clause) = join.join_clause.take() {
                    let mut predicates: PredicateList = cnf::normalize(clause)
                        .into_iter()
                        .filter(|conjunct| !conjunct.is_literal_bool(true))
                        .map(Predicate::new)
                        .collect();
                    predicates.categorize(&self.output.arena);
                    join.join_predicates.append(&mut predicates);
                }
                Ok(())
            }
        }
    }

    /// Rewrite a single top level conjunct of a WHERE clause.
    ///
    /// Subqueries directly under the top level AND, or on the right side of a
    /// comparison that is, may be flattened into `target`.
    fn preprocess_conjunct(
        &mut self,
        conjunct: Expression,
        target: &mut FlattenTarget,
    ) -> Result<Expression> {
        match conjunct {
            Expression::Subquery(subquery) if subquery.under_top_and && !subquery.is_preprocessed() => {
                let subquery = self.preprocess_subquery_operand(subquery)?;
                self.preprocess_subquery(subquery, None, Some(target))
            }
            Expression::Comparison(cmp) if is_flattenable_comparison(&cmp) => {
                let ComparisonExpr { left, right, op } = cmp;
                let left = self.preprocess_expression(*left)?;
                match *right {
                    Expression::Subquery(subquery) => {
                        self.preprocess_subquery(subquery, Some((left, op)), Some(target))
                    }
                    other => Ok(Expression::Comparison(ComparisonExpr {
                        left: Box::new(left),
                        right: Box::new(other),
                        op,
                    })),
                }
            }
            other => self.preprocess_expression(other),
        }
    }

    fn preprocess_subquery_operand(&mut self, mut subquery: SubqueryExpr) -> Result<SubqueryExpr> {
        if let Some(left) = subquery.left_operand.take() {
            subquery.left_operand = Some(Box::new(self.preprocess_expression(*left)?));
        }
        Ok(subquery)
    }

    /// Replace every aggregate in the select list and HAVING clause with a
    /// reference to a column of the block's aggregate list.
    fn hoist_aggregates(&mut self, select: &mut SelectNode) -> Result<()> {
        let table_number = match &select.aggregate {
            Some(block) => block.table_number,
            None => self.next_table_number(),
        };
        let mut block_columns = select
            .aggregate
            .take()
            .map(|block| block.result_columns)
            .unwrap_or_default();

        let level = select.level;
        let columns: Vec<_> = select.result_columns.iter().collect();
        for rc in columns {
            let mut expr = self.output.arena.take_expression(rc);
            self.replace_aggregates(&mut expr, &mut block_columns, table_number, level)?;
            self.output.arena.put_expression(rc, expr);
        }
        if let Some(having) = &mut select.having {
            self.replace_aggregates(having, &mut block_columns, table_number, level)?;
        }

        tracing::debug!(
            %table_number,
            aggregates = block_columns.len(),
            "hoisted aggregates",
        );

        select.aggregate = Some(AggregateBlock {
            table_number,
            result_columns: block_columns,
        });
        Ok(())
    }

    fn replace_aggregates(
        &mut self,
        expr: &mut Expression,
        block_columns: &mut ResultColumnList,
        table_number: TableNumber,
        level: usize,
    ) -> Result<()> {
        if let Expression::Aggregate(agg) = expr {
            let output = &mut self.output;
            *expr = agg.replace_with_column_reference(
                &mut output.arena,
                block_columns,
                table_number,
                level,
                &mut output.names,
            )?;
            return Ok(());
        }
        expr.for_each_child_mut(&mut |child| {
            self.replace_aggregates(child, block_columns, table_number, level)
        })
    }
}

fn is_flattenable_comparison(cmp: &ComparisonExpr) -> bool {
    matches!(
        cmp.right.as_ref(),
        Expression::Subquery(subquery)
            if subquery.subquery_type.is_expression()
                && subquery.under_top_and
                && !subquery.is_preprocessed()
    )
}
