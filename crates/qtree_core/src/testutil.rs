//! Shared fixtures for unit tests.

use std::collections::HashMap;

use qtree_error::{DbError, Result};

use crate::ast::{self, Expr, FromItem, Select, SelectItem};
use crate::catalog::memory::MemoryCatalog;
use crate::catalog::{ColumnDescriptor, RoutineDescriptor, TableDescriptor, TableKind};
use crate::parser::FragmentParser;
use crate::types::DataType;

/// Catalog with the tables used throughout the unit tests.
///
/// - `T1(C INTEGER NOT NULL, A INTEGER)`, unique on C
/// - `T2(C INTEGER NOT NULL, B INTEGER)`
/// - `T3(C INTEGER, D VARCHAR(20))`
/// - `ORDERS(ID, CUSTOMER, AMOUNT)`, unique on ID
/// - `V1`, a view over T1
pub fn catalog() -> MemoryCatalog {
    let not_null = DataType::integer().with_nullable(false);
    let tables = [
        TableDescriptor::new("APP", "T1")
            .with_column("C", not_null)
            .with_column("A", DataType::integer())
            .with_unique_key(&["C"])
            .unwrap(),
        TableDescriptor::new("APP", "T2")
            .with_column("C", not_null)
            .with_column("B", DataType::integer()),
        TableDescriptor::new("APP", "T3")
            .with_column("C", DataType::integer())
            .with_column("D", DataType::varchar(20)),
        TableDescriptor::new("APP", "ORDERS")
            .with_column("ID", not_null)
            .with_column("CUSTOMER", DataType::varchar(40))
            .with_column("AMOUNT", DataType::decimal(10, 2))
            .with_unique_key(&["ID"])
            .unwrap(),
        TableDescriptor::new("APP", "V1")
            .with_column("C", not_null)
            .with_column("A", DataType::integer())
            .with_kind(TableKind::View),
    ];

    let routines = [
        RoutineDescriptor::function("APP", "ABS", DataType::integer()),
        RoutineDescriptor::function("APP", "RANDOM", DataType::integer()).with_deterministic(false),
        RoutineDescriptor::aggregate("APP", "MEDIAN", DataType::integer(), true),
        RoutineDescriptor::aggregate("APP", "MODE", DataType::integer(), false),
        RoutineDescriptor::table_function(
            "APP",
            "RANGE_TF",
            vec![ColumnDescriptor::new("N", 1, DataType::integer().with_nullable(false))],
        ),
    ];

    let mut catalog = MemoryCatalog::new();
    for table in tables {
        catalog.create_table(table).unwrap();
    }
    for routine in routines {
        catalog.create_routine(routine).unwrap();
    }
    catalog
}

/// `SELECT * FROM <table>`
pub fn select_star(table: &str) -> ast::Query {
    ast::Query::select(Select {
        projections: vec![SelectItem::Wildcard],
        from: vec![FromItem::table(table)],
        ..Default::default()
    })
}

/// Fragment parser returning canned expressions for known fragment text.
#[derive(Debug, Default)]
pub struct StubParser {
    fragments: HashMap<String, Expr>,
}

impl StubParser {
    pub fn with_fragment(mut self, text: &str, expr: Expr) -> Self {
        self.fragments.insert(text.to_string(), expr);
        self
    }
}

impl FragmentParser for StubParser {
    fn parse_fragment(&self, text: &str) -> Result<ast::Query> {
        let expr = self
            .fragments
            .get(text)
            .cloned()
            .ok_or_else(|| DbError::new(format!("Syntax error in '{text}'")))?;
        Ok(ast::Query::select(Select {
            projections: vec![SelectItem::Expr { expr, alias: None }],
            ..Default::default()
        }))
    }
}
