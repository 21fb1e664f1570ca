//! Parsed, unbound query tree.
//!
//! Produced by an external parser. Identifiers are expected to already be
//! normalized (upper-cased unless quoted).

use crate::expr::comparison_expr::ComparisonOperator;
use crate::expr::literal_expr::ScalarValue;
use crate::expr::arith_expr::ArithOperator;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectName {
    pub schema: Option<String>,
    pub name: String,
}

impl ObjectName {
    pub fn new(name: impl Into<String>) -> Self {
        ObjectName {
            schema: None,
            name: name.into(),
        }
    }

    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        ObjectName {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Any,
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubqueryKind {
    /// `(SELECT ...)` used as a value.
    Scalar,
    /// `[NOT] EXISTS (SELECT ...)`
    Exists { negated: bool },
    /// `expr [NOT] IN (SELECT ...)`
    In { expr: Box<Expr>, negated: bool },
    /// `expr op ANY|ALL (SELECT ...)`
    Quantified {
        expr: Box<Expr>,
        op: ComparisonOperator,
        quantifier: Quantifier,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Possibly qualified column reference.
    Column {
        table: Option<ObjectName>,
        column: String,
    },
    Literal(ScalarValue),
    /// `?` parameter, 0-based.
    Parameter(usize),
    Comparison {
        left: Box<Expr>,
        op: ComparisonOperator,
        right: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    Arith {
        left: Box<Expr>,
        op: ArithOperator,
        right: Box<Expr>,
    },
    Function {
        name: ObjectName,
        args: Vec<Expr>,
    },
    /// Aggregate call, `arg` is None for `COUNT(*)`.
    Aggregate {
        name: ObjectName,
        arg: Option<Box<Expr>>,
        distinct: bool,
    },
    /// Window function call, e.g. `ROW_NUMBER() OVER ()`.
    Window {
        name: String,
    },
    Subquery {
        kind: SubqueryKind,
        query: Box<Query>,
    },
}

impl Expr {
    pub fn column(name: &str) -> Self {
        Expr::Column {
            table: None,
            column: name.to_string(),
        }
    }

    pub fn qualified_column(table: &str, name: &str) -> Self {
        Expr::Column {
            table: Some(ObjectName::new(table)),
            column: name.to_string(),
        }
    }

    pub fn literal(value: impl Into<ScalarValue>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn compare(left: Expr, op: ComparisonOperator, right: Expr) -> Self {
        Expr::Comparison {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::compare(left, ComparisonOperator::Eq, right)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*`
    Wildcard,
    /// `t.*`
    QualifiedWildcard(ObjectName),
    Expr { expr: Expr, alias: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinConstraint {
    On(Expr),
    Using(Vec<String>),
    Natural,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FromItem {
    Table {
        name: ObjectName,
        alias: Option<String>,
    },
    Join {
        left: Box<FromItem>,
        right: Box<FromItem>,
        kind: JoinKind,
        constraint: JoinConstraint,
    },
    /// Table function invocation, `TABLE(f(args)) AS alias`.
    Function {
        name: ObjectName,
        args: Vec<Expr>,
        alias: String,
    },
    /// Derived table with optional derived column list.
    Derived {
        query: Box<Query>,
        alias: String,
        columns: Vec<String>,
    },
}

impl FromItem {
    pub fn table(name: &str) -> Self {
        FromItem::Table {
            name: ObjectName::new(name),
            alias: None,
        }
    }

    pub fn aliased_table(name: &str, alias: &str) -> Self {
        FromItem::Table {
            name: ObjectName::new(name),
            alias: Some(alias.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Select {
    pub distinct: bool,
    pub projections: Vec<SelectItem>,
    pub from: Vec<FromItem>,
    pub selection: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperation {
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryBody {
    Select(Box<Select>),
    /// Single row table constructor, `VALUES (a, b, c)`.
    Values(Vec<Expr>),
    SetOp {
        left: Box<QueryBody>,
        right: Box<QueryBody>,
        op: SetOperation,
        all: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderByTarget {
    /// `ORDER BY 2`, 1-based.
    Position(usize),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub target: OrderByTarget,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub body: QueryBody,
    pub order_by: Vec<OrderByExpr>,
    pub offset: Option<u64>,
    pub fetch: Option<u64>,
}

impl Query {
    pub fn select(select: Select) -> Self {
        Query {
            body: QueryBody::Select(Box::new(select)),
            order_by: Vec::new(),
            offset: None,
            fetch: None,
        }
    }

    pub fn values(row: Vec<Expr>) -> Self {
        Query {
            body: QueryBody::Values(row),
            order_by: Vec::new(),
            offset: None,
            fetch: None,
        }
    }
}
