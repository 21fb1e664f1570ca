//! Fixture catalog and a naive row evaluator for compiled query trees.
//!
//! The evaluator runs a compiled tree against small in-memory tables by
//! nested loops. It understands the shapes preprocessing produces for
//! queries over base tables: flattened joins, EXISTS and NOT EXISTS tables,
//! retained subqueries and pushed restrictions.

#![allow(dead_code)]

use std::collections::HashMap;

use qtree_core::ast::{self, Expr, FromItem, Select, SelectItem, SetOperation};
use qtree_core::catalog::memory::MemoryCatalog;
use qtree_core::catalog::TableDescriptor;
use qtree_core::config::CompileConfig;
use qtree_core::expr::Expression;
use qtree_core::expr::arith_expr::ArithOperator;
use qtree_core::expr::comparison_expr::ComparisonOperator;
use qtree_core::expr::conjunction_expr::ConjunctionOperator;
use qtree_core::expr::literal_expr::ScalarValue;
use qtree_core::from::FromTable;
use qtree_core::from::base_table::{ExistsMarking, FromBaseTable};
use qtree_core::predicate::PredicateList;
use qtree_core::rcl::{ColumnArena, ResultColumnList};
use qtree_core::resultset::ResultSetNode;
use qtree_core::table_map::TableNumber;
use qtree_core::types::DataType;
use qtree_core::{CompiledQuery, compile_query};

pub type Row = Vec<ScalarValue>;

/// `OUTER_T(ID NOT NULL, X)` unique on ID, `INNER_T(ID NOT NULL, Y NOT NULL,
/// Z)` unique on ID, `DUPS(Y NOT NULL, Z)` without keys, and `EMPTY_T` shaped
/// like `INNER_T` but without rows.
pub fn catalog() -> MemoryCatalog {
    let not_null = DataType::integer().with_nullable(false);
    let mut catalog = MemoryCatalog::new();
    catalog
        .create_table(
            TableDescriptor::new("APP", "OUTER_T")
                .with_column("ID", not_null)
                .with_column("X", DataType::integer())
                .with_unique_key(&["ID"])
                .unwrap(),
        )
        .unwrap();
    catalog
        .create_table(
            TableDescriptor::new("APP", "INNER_T")
                .with_column("ID", not_null)
                .with_column("Y", not_null)
                .with_column("Z", DataType::integer())
                .with_unique_key(&["ID"])
                .unwrap(),
        )
        .unwrap();
    catalog
        .create_table(
            TableDescriptor::new("APP", "DUPS")
                .with_column("Y", not_null)
                .with_column("Z", DataType::integer()),
        )
        .unwrap();
    catalog
        .create_table(
            TableDescriptor::new("APP", "EMPTY_T")
                .with_column("ID", not_null)
                .with_column("Y", not_null)
                .with_column("Z", DataType::integer())
                .with_unique_key(&["ID"])
                .unwrap(),
        )
        .unwrap();
    catalog
}

fn int(v: i32) -> ScalarValue {
    ScalarValue::Int32(v)
}

fn opt(v: Option<i32>) -> ScalarValue {
    v.map(ScalarValue::Int32).unwrap_or(ScalarValue::Null)
}

/// Rows of the fixture tables, keyed by table name.
pub fn data() -> HashMap<String, Vec<Row>> {
    let mut data = HashMap::new();
    data.insert(
        "OUTER_T".to_string(),
        vec![
            vec![int(1), opt(Some(10))],
            vec![int(2), opt(Some(20))],
            vec![int(3), opt(None)],
            vec![int(4), opt(Some(40))],
        ],
    );
    data.insert(
        "INNER_T".to_string(),
        vec![
            vec![int(1), int(10), opt(Some(100))],
            vec![int(2), int(20), opt(None)],
            vec![int(5), int(50), opt(Some(500))],
        ],
    );
    data.insert(
        "DUPS".to_string(),
        vec![
            vec![int(10), opt(Some(1))],
            vec![int(10), opt(Some(2))],
            vec![int(40), opt(None)],
        ],
    );
    data.insert("EMPTY_T".to_string(), Vec::new());
    data
}

/// Configuration with every subquery rewrite turned off.
pub fn no_rewrites() -> CompileConfig {
    CompileConfig {
        enable_subquery_flattening: false,
        enable_exists_join_flattening: false,
        enable_subquery_materialization: false,
        enable_in_to_expression_rewrite: false,
        ..Default::default()
    }
}

pub fn compile(query: &ast::Query, config: &CompileConfig) -> CompiledQuery {
    logutil::init_test();
    let catalog = catalog();
    compile_query(&catalog, config, query).unwrap()
}

/// Compile and run `query`, returning its rows in a stable order.
pub fn run(query: &ast::Query, config: &CompileConfig) -> Vec<Row> {
    let compiled = compile(query, config);
    let data = data();
    let evaluator = Evaluator {
        arena: &compiled.arena,
        data: &data,
    };
    let mut rows = evaluator.rows(&compiled.root, &Env::new());
    rows.sort_by_key(|row| format!("{row:?}"));
    rows
}

pub fn select(projections: Vec<Expr>, from: &str, selection: Option<Expr>) -> ast::Query {
    ast::Query::select(Select {
        projections: projections
            .into_iter()
            .map(|expr| SelectItem::Expr { expr, alias: None })
            .collect(),
        from: vec![FromItem::table(from)],
        selection,
        ..Default::default()
    })
}

pub fn subquery(kind: ast::SubqueryKind, query: ast::Query) -> Expr {
    Expr::Subquery {
        kind,
        query: Box::new(query),
    }
}

type Env = HashMap<TableNumber, Row>;

struct Evaluator<'a> {
    arena: &'a ColumnArena,
    data: &'a HashMap<String, Vec<Row>>,
}

impl Evaluator<'_> {
    fn rows(&self, node: &ResultSetNode, outer: &Env) -> Vec<Row> {
        match node {
            ResultSetNode::SetOp(setop) => {
                let mut rows = self.rows(&setop.left, outer);
                let right = self.rows(&setop.right, outer);
                match setop.op {
                    SetOperation::Union => rows.extend(right),
                    SetOperation::Intersect => rows.retain(|row| right.contains(row)),
                    SetOperation::Except => rows.retain(|row| !right.contains(row)),
                }
                if !setop.all {
                    dedup(&mut rows);
                }
                rows
            }
            other => {
                let mut rows: Vec<Row> = self
                    .envs(other, outer)
                    .iter()
                    .map(|env| self.project(other.result_columns(), env))
                    .collect();
                if other.as_select().is_some_and(|select| select.distinct) {
                    dedup(&mut rows);
                }
                rows
            }
        }
    }

    fn project(&self, columns: &ResultColumnList, env: &Env) -> Row {
        columns
            .visible_columns(self.arena)
            .map(|rc| self.eval(&self.arena[rc].expression, env))
            .collect()
    }

    fn envs(&self, node: &ResultSetNode, outer: &Env) -> Vec<Env> {
        match node {
            ResultSetNode::Select(select) => {
                assert!(!select.has_aggregates, "aggregates not supported");
                let mut normal = Vec::new();
                let mut exists = Vec::new();
                for table in select.from_list.iter() {
                    match table {
                        FromTable::Base(base) if base.is_exists_table() => exists.push(base),
                        FromTable::Base(base) => normal.push(base),
                        other => panic!("unsupported from table: {other:?}"),
                    }
                }

                let mut envs = vec![outer.clone()];
                for base in &normal {
                    let mut next = Vec::new();
                    for env in &envs {
                        for row in &self.data[&base.name] {
                            let mut env = env.clone();
                            env.insert(base.table_number, row.clone());
                            next.push(env);
                        }
                    }
                    envs = next;
                }

                envs.into_iter()
                    .filter(|env| {
                        normal.iter().all(|base| self.passes(&base.restriction, env))
                            && select
                                .where_predicates
                                .iter()
                                .filter(|p| !exists.iter().any(|e| p.references(e.table_number)))
                                .all(|p| is_true(&self.eval(&p.expr, env)))
                            && select
                                .where_clause
                                .as_ref()
                                .is_none_or(|clause| is_true(&self.eval(clause, env)))
                            && exists
                                .iter()
                                .all(|table| self.exists_qualifies(table, &select.where_predicates, env))
                    })
                    .collect()
            }
            ResultSetNode::ProjectRestrict(prn) => self
                .envs(&prn.child, outer)
                .into_iter()
                .filter(|env| self.passes(&prn.restriction, env))
                .collect(),
            ResultSetNode::Row(_) => vec![outer.clone()],
            ResultSetNode::SetOp(_) => panic!("set operation rows have no table bindings"),
        }
    }

    /// Semi or anti join check for a table merged from an EXISTS style
    /// subquery.
    fn exists_qualifies(&self, table: &FromBaseTable, predicates: &PredicateList, env: &Env) -> bool {
        let found = self.data[&table.name].iter().any(|row| {
            let mut env = env.clone();
            env.insert(table.table_number, row.clone());
            self.passes(&table.restriction, &env)
                && predicates
                    .iter()
                    .filter(|p| p.references(table.table_number))
                    .all(|p| is_true(&self.eval(&p.expr, &env)))
        });
        match table.exists {
            ExistsMarking::Exists => found,
            ExistsMarking::NotExists => !found,
            ExistsMarking::None => unreachable!(),
        }
    }

    fn passes(&self, predicates: &PredicateList, env: &Env) -> bool {
        predicates.iter().all(|p| is_true(&self.eval(&p.expr, env)))
    }

    fn eval(&self, expr: &Expression, env: &Env) -> ScalarValue {
        match expr {
            Expression::Column(col) => self.eval(&self.arena[col.source].expression, env),
            Expression::VirtualColumn(col) => self.eval(&self.arena[col.source].expression, env),
            Expression::BaseColumn(col) => env
                .get(&col.table_number)
                .unwrap_or_else(|| panic!("no row bound for {}", col.table_number))[col.position - 1]
                .clone(),
            Expression::Literal(lit) => lit.literal.clone(),
            Expression::Comparison(cmp) => {
                let left = self.eval(&cmp.left, env);
                let right = self.eval(&cmp.right, env);
                compare(&left, cmp.op, &right)
            }
            Expression::Conjunction(conj) => {
                let values: Vec<_> = conj.expressions.iter().map(|e| self.eval(e, env)).collect();
                let (short, other) = match conj.op {
                    ConjunctionOperator::And => (false, true),
                    ConjunctionOperator::Or => (true, false),
                };
                if values.contains(&ScalarValue::Boolean(short)) {
                    ScalarValue::Boolean(short)
                } else if values.contains(&ScalarValue::Null) {
                    ScalarValue::Null
                } else {
                    ScalarValue::Boolean(other)
                }
            }
            Expression::Not(not) => match self.eval(&not.expr, env) {
                ScalarValue::Boolean(b) => ScalarValue::Boolean(!b),
                _ => ScalarValue::Null,
            },
            Expression::IsNull(is_null) => {
                let null = self.eval(&is_null.expr, env) == ScalarValue::Null;
                ScalarValue::Boolean(null != is_null.negated)
            }
            Expression::Arith(arith) => {
                let (ScalarValue::Int32(l), ScalarValue::Int32(r)) =
                    (self.eval(&arith.left, env), self.eval(&arith.right, env))
                else {
                    return ScalarValue::Null;
                };
                ScalarValue::Int32(match arith.op {
                    ArithOperator::Add => l + r,
                    ArithOperator::Sub => l - r,
                    ArithOperator::Mul => l * r,
                    ArithOperator::Div => l / r,
                })
            }
            Expression::Subquery(subquery) => {
                // Value of the first column of the first row, NULL when empty.
                match subquery.result_set.as_ref() {
                    ResultSetNode::SetOp(_) => self
                        .rows(&subquery.result_set, env)
                        .into_iter()
                        .next()
                        .map(|row| row[0].clone())
                        .unwrap_or(ScalarValue::Null),
                    node => {
                        let first = node.result_columns().first().unwrap();
                        self.envs(node, env)
                            .first()
                            .map(|env| self.eval(&self.arena[first].expression, env))
                            .unwrap_or(ScalarValue::Null)
                    }
                }
            }
            other => panic!("unsupported expression: {other:?}"),
        }
    }
}

fn is_true(value: &ScalarValue) -> bool {
    *value == ScalarValue::Boolean(true)
}

fn compare(left: &ScalarValue, op: ComparisonOperator, right: &ScalarValue) -> ScalarValue {
    let ordering = match (left, right) {
        (ScalarValue::Int32(l), ScalarValue::Int32(r)) => l.cmp(r),
        (ScalarValue::Boolean(l), ScalarValue::Boolean(r)) => l.cmp(r),
        (ScalarValue::Utf8(l), ScalarValue::Utf8(r)) => l.cmp(r),
        (ScalarValue::Null, _) | (_, ScalarValue::Null) => return ScalarValue::Null,
        other => panic!("unsupported comparison: {other:?}"),
    };
    ScalarValue::Boolean(match op {
        ComparisonOperator::Eq => ordering.is_eq(),
        ComparisonOperator::NotEq => ordering.is_ne(),
        ComparisonOperator::Lt => ordering.is_lt(),
        ComparisonOperator::LtEq => ordering.is_le(),
        ComparisonOperator::Gt => ordering.is_gt(),
        ComparisonOperator::GtEq => ordering.is_ge(),
    })
}

fn dedup(rows: &mut Vec<Row>) {
    let mut seen = Vec::new();
    rows.retain(|row| {
        if seen.contains(row) {
            false
        } else {
            seen.push(row.clone());
            true
        }
    });
}
