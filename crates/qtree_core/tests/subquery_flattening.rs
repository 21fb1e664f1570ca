mod common;

use common::{no_rewrites, run, select, subquery};
use qtree_core::ast::{Expr, Quantifier, SubqueryKind};
use qtree_core::config::CompileConfig;
use qtree_core::expr::comparison_expr::ComparisonOperator;
use qtree_core::expr::literal_expr::ScalarValue;
use qtree_core::expr::subquery_expr::SubqueryOutcome;
use rstest::rstest;

fn outer_ids(selection: Expr) -> qtree_core::ast::Query {
    select(vec![Expr::column("ID")], "OUTER_T", Some(selection))
}

fn in_subquery(left: &str, column: &str, table: &str, negated: bool) -> Expr {
    subquery(
        SubqueryKind::In {
            expr: Box::new(Expr::column(left)),
            negated,
        },
        select(vec![Expr::column(column)], table, None),
    )
}

fn quantified(op: ComparisonOperator, quantifier: Quantifier) -> Expr {
    subquery(
        SubqueryKind::Quantified {
            expr: Box::new(Expr::column("X")),
            op,
            quantifier,
        },
        select(vec![Expr::column("Y")], "DUPS", None),
    )
}

fn empty_exists(negated: bool) -> Expr {
    subquery(
        SubqueryKind::Exists { negated },
        select(
            vec![Expr::column("Z")],
            "EMPTY_T",
            Some(Expr::eq(
                Expr::qualified_column("EMPTY_T", "Y"),
                Expr::qualified_column("OUTER_T", "X"),
            )),
        ),
    )
}

fn empty_quantified(op: ComparisonOperator, quantifier: Quantifier) -> Expr {
    subquery(
        SubqueryKind::Quantified {
            expr: Box::new(Expr::column("X")),
            op,
            quantifier,
        },
        select(vec![Expr::column("Y")], "EMPTY_T", None),
    )
}

fn dups_matching_x(negated: bool) -> Expr {
    subquery(
        SubqueryKind::Exists { negated },
        select(
            vec![Expr::column("Z")],
            "DUPS",
            Some(Expr::eq(
                Expr::qualified_column("DUPS", "Y"),
                Expr::qualified_column("OUTER_T", "X"),
            )),
        ),
    )
}

fn ids(ids: &[i32]) -> Vec<Vec<ScalarValue>> {
    ids.iter().map(|id| vec![ScalarValue::Int32(*id)]).collect()
}

#[rstest]
#[case::in_non_unique(in_subquery("X", "Y", "INNER_T", false), &[1, 2])]
#[case::in_unique(in_subquery("ID", "ID", "INNER_T", false), &[1, 2])]
#[case::in_with_duplicates(in_subquery("X", "Y", "DUPS", false), &[1, 4])]
#[case::exists(dups_matching_x(false), &[1, 4])]
#[case::not_exists(dups_matching_x(true), &[2, 3])]
#[case::not_in_nullable_left(in_subquery("X", "Y", "DUPS", true), &[2])]
#[case::not_in_not_null(in_subquery("ID", "ID", "INNER_T", true), &[3, 4])]
#[case::not_in_nullable_right(in_subquery("ID", "Z", "INNER_T", true), &[])]
#[case::ge_all(quantified(ComparisonOperator::GtEq, Quantifier::All), &[4])]
#[case::lt_any(quantified(ComparisonOperator::Lt, Quantifier::Any), &[1, 2])]
#[case::correlated_scalar(
    Expr::eq(
        Expr::column("X"),
        subquery(
            SubqueryKind::Scalar,
            select(
                vec![Expr::column("Y")],
                "INNER_T",
                Some(Expr::eq(
                    Expr::qualified_column("INNER_T", "ID"),
                    Expr::qualified_column("OUTER_T", "ID"),
                )),
            ),
        ),
    ),
    &[1, 2],
)]
#[case::uncorrelated_exists(
    subquery(
        SubqueryKind::Exists { negated: false },
        select(
            vec![Expr::column("ID")],
            "INNER_T",
            Some(Expr::compare(Expr::column("Z"), ComparisonOperator::Gt, Expr::literal(150))),
        ),
    ),
    &[1, 2, 3, 4],
)]
#[case::under_or(
    Expr::Or(vec![
        Expr::eq(Expr::column("ID"), Expr::literal(4)),
        in_subquery("X", "Y", "DUPS", false),
    ]),
    &[1, 4],
)]
#[case::empty_in(in_subquery("ID", "ID", "EMPTY_T", false), &[])]
#[case::empty_in_non_unique(in_subquery("X", "Y", "EMPTY_T", false), &[])]
#[case::empty_not_in_nullable(in_subquery("X", "Z", "EMPTY_T", true), &[1, 2, 3, 4])]
#[case::empty_not_in_not_null(in_subquery("ID", "ID", "EMPTY_T", true), &[1, 2, 3, 4])]
#[case::empty_gt_all(empty_quantified(ComparisonOperator::Gt, Quantifier::All), &[1, 2, 3, 4])]
#[case::empty_eq_any(empty_quantified(ComparisonOperator::Eq, Quantifier::Any), &[])]
#[case::empty_exists(empty_exists(false), &[])]
#[case::empty_not_exists(empty_exists(true), &[1, 2, 3, 4])]
fn rewrites_preserve_rows(#[case] selection: Expr, #[case] expected: &[i32]) {
    let query = outer_ids(selection);
    assert_eq!(ids(expected), run(&query, &no_rewrites()));
    assert_eq!(ids(expected), run(&query, &CompileConfig::default()));
}

#[rstest]
#[case::unique_in(in_subquery("ID", "ID", "INNER_T", false), SubqueryOutcome::FlattenedToJoin)]
#[case::non_unique_in(in_subquery("X", "Y", "DUPS", false), SubqueryOutcome::FlattenedToExistsJoin)]
#[case::not_exists(dups_matching_x(true), SubqueryOutcome::FlattenedToExistsJoin)]
#[case::nullable_not_in(in_subquery("X", "Y", "DUPS", true), SubqueryOutcome::NotFlattened)]
fn subquery_outcomes(#[case] selection: Expr, #[case] expected: SubqueryOutcome) {
    let compiled = common::compile(&outer_ids(selection), &CompileConfig::default());
    let outcomes: Vec<_> = compiled.subquery_outcomes.values().copied().collect();
    assert_eq!(vec![expected], outcomes);
}

#[test]
fn not_in_null_semantics() {
    // X NOT IN (10, 10, 40): NULL X is unknown and never qualifies.
    let query = outer_ids(in_subquery("X", "Y", "DUPS", true));
    let rows = run(&query, &CompileConfig::default());
    assert_eq!(ids(&[2]), rows);

    // A NULL in the subquery makes NOT IN unknown for every row.
    let query = outer_ids(in_subquery("X", "Z", "DUPS", true));
    assert!(run(&query, &CompileConfig::default()).is_empty());
}

#[test]
fn flattened_tree_keeps_column_ids() {
    let query = outer_ids(Expr::And(vec![
        in_subquery("X", "Y", "DUPS", false),
        in_subquery("ID", "ID", "INNER_T", false),
    ]));
    let compiled = common::compile(&query, &CompileConfig::default());
    let select = compiled.root.as_select().unwrap();
    select
        .result_columns
        .check_virtual_column_ids(&compiled.arena)
        .unwrap();
    // Both subqueries merged into the outer block.
    assert_eq!(3, select.from_list.len());
}
