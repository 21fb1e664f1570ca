mod common;

use common::{compile, run, select};
use qtree_core::ast::{self, Expr, FromItem, JoinConstraint, JoinKind, Select, SelectItem};
use qtree_core::binder::bind_context::BindContext;
use qtree_core::binder::expr_binder::ExpressionBinder;
use qtree_core::binder::from_binder::FromBinder;
use qtree_core::catalog::dependency::Provider;
use qtree_core::compile_query;
use qtree_core::config::CompileConfig;
use qtree_core::expr::Expression;
use qtree_core::rcl::ResultColumnList;
use qtree_core::table_map::TableNumber;
use qtree_error::SqlState;
use rstest::rstest;

#[test]
fn using_join_star_order() {
    let query = ast::Query::select(Select {
        projections: vec![SelectItem::Wildcard],
        from: vec![FromItem::Join {
            left: Box::new(FromItem::table("OUTER_T")),
            right: Box::new(FromItem::table("INNER_T")),
            kind: JoinKind::Inner,
            constraint: JoinConstraint::Using(vec!["ID".to_string()]),
        }],
        ..Default::default()
    });
    let compiled = compile(&query, &CompileConfig::default());
    assert_eq!(
        vec!["ID", "X", "Y", "Z"],
        compiled.root.result_columns().column_names(&compiled.arena)
    );
}

#[test]
fn ambiguous_column_rejected() {
    let query = ast::Query::select(Select {
        projections: vec![SelectItem::Expr {
            expr: Expr::column("ID"),
            alias: None,
        }],
        from: vec![FromItem::table("OUTER_T"), FromItem::table("INNER_T")],
        ..Default::default()
    });
    let catalog = common::catalog();
    let err = compile_query(&catalog, &CompileConfig::default(), &query).unwrap_err();
    assert_eq!(Some(SqlState::AmbiguousColumnName), err.sql_state());
}

#[test]
fn order_by_columns_hidden_from_visible_size() {
    let mut query = select(vec![Expr::column("ID")], "OUTER_T", None);
    query.order_by = vec![ast::OrderByExpr {
        target: ast::OrderByTarget::Expr(Expr::column("X")),
        ascending: true,
    }];
    let compiled = compile(&query, &CompileConfig::default());
    let rcl = compiled.root.result_columns();
    assert_eq!(2, rcl.len());
    assert_eq!(1, rcl.visible_size(&compiled.arena));
    assert_eq!(1, compiled.order_by.unwrap().len());
    rcl.check_virtual_column_ids(&compiled.arena).unwrap();

    // Hidden columns are not part of the result.
    let rows = run(&query, &CompileConfig::default());
    assert!(rows.iter().all(|row| row.len() == 1));
}

#[test]
fn dependencies_cover_subquery_tables() {
    let query = select(
        vec![Expr::column("ID")],
        "OUTER_T",
        Some(common::subquery(
            ast::SubqueryKind::Exists { negated: false },
            select(vec![Expr::column("Y")], "DUPS", None),
        )),
    );
    let compiled = compile(&query, &CompileConfig::default());
    for name in ["OUTER_T", "DUPS"] {
        assert!(compiled.dependencies.depends_on(&Provider::Table {
            schema: "APP".to_string(),
            name: name.to_string(),
        }));
    }
}

fn union(left: ast::Query, right: ast::Query) -> ast::Query {
    ast::Query {
        body: ast::QueryBody::SetOp {
            left: Box::new(left.body),
            right: Box::new(right.body),
            op: ast::SetOperation::Union,
            all: false,
        },
        order_by: Vec::new(),
        offset: None,
        fetch: None,
    }
}

#[rstest]
#[case::outer_first(true)]
#[case::inner_first(false)]
fn union_naming_is_symmetric(#[case] outer_first: bool) {
    let outer = select(vec![Expr::column("ID"), Expr::column("X")], "OUTER_T", None);
    let inner = select(vec![Expr::column("ID"), Expr::column("Y")], "INNER_T", None);
    let query = if outer_first {
        union(outer, inner)
    } else {
        union(inner, outer)
    };

    let compiled = compile(&query, &CompileConfig::default());
    let rcl = compiled.root.result_columns();
    let second = rcl.get(1).unwrap();
    assert_eq!("ID", compiled.arena[rcl.get(0).unwrap()].name);
    assert!(compiled.arena[second].name_generated);
    assert!(compiled.arena[second].datatype.nullable);

    // (1, 10) and (2, 20) appear on both sides.
    assert_eq!(5, run(&query, &CompileConfig::default()).len());
}

#[test]
fn aggregate_hoisting_is_idempotent() {
    let catalog = common::catalog();
    let config = CompileConfig::default();
    let mut ctx = BindContext::new(&catalog, &config);
    let root = ctx.root_scope_ref();
    FromBinder::new(root)
        .bind_from_list(&mut ctx, &[FromItem::table("OUTER_T")])
        .unwrap();

    let max = Expr::Aggregate {
        name: ast::ObjectName::new("MAX"),
        arg: Some(Box::new(Expr::column("X"))),
        distinct: false,
    };
    let Expression::Aggregate(mut agg) = ExpressionBinder::new(root)
        .bind_expression(&mut ctx, &max)
        .unwrap()
    else {
        panic!("expected aggregate")
    };

    let mut first = ResultColumnList::new();
    let mut second = ResultColumnList::new();
    let table = TableNumber(10);
    let a = agg
        .replace_with_column_reference(&mut ctx.arena, &mut first, table, 0, &mut ctx.names)
        .unwrap();
    let b = agg
        .replace_with_column_reference(&mut ctx.arena, &mut first, table, 0, &mut ctx.names)
        .unwrap();
    let c = agg
        .replace_with_column_reference(&mut ctx.arena, &mut second, table, 0, &mut ctx.names)
        .unwrap();

    assert_eq!(a, b);
    assert_eq!(a, c);
    assert_eq!(1, first.len());
    assert_eq!(1, second.len());
    let Expression::VirtualColumn(threaded) = &ctx.arena[second.get(0).unwrap()].expression else {
        panic!("expected virtual column")
    };
    assert_eq!(first.get(0), Some(threaded.source));
}
