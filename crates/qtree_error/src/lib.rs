//! Error type shared by every crate in the workspace.
//!
//! Every compile-time failure is a `DbError`. Errors that a user can cause
//! carry a `SqlState`, internal consistency failures use
//! `SqlState::InternalError`.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::borrow::Cow;
use std::error::Error;
use std::fmt;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

/// Return early with a "not implemented" error.
#[macro_export]
macro_rules! not_implemented {
    ($($arg:tt)+) => {{
        let msg = format!($($arg)+);
        return Err($crate::DbError::new(format!("Not yet implemented: {msg}"))
            .with_sql_state($crate::SqlState::NotImplemented));
    }};
}

/// SQL-state-style classification of compile errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlState {
    /// Column could not be resolved against any table in scope.
    ColumnNotFound,
    /// Table or view not found in the catalog.
    TableNotFound,
    /// Function, table function or aggregate not found in the catalog.
    RoutineNotFound,
    /// More than one table in scope exposes the column.
    AmbiguousColumnName,
    /// WHERE/ON/HAVING clause does not produce a boolean.
    NonBooleanClause,
    /// DISTINCT aggregate over a type that cannot be ordered.
    DistinctNotOrderable,
    /// Set operation branches have incompatible column types.
    NotUnionCompatible,
    /// NULL or parameter without a type in a context requiring one.
    UntypedNull,
    /// Aggregate directly nested inside another aggregate.
    NestedAggregate,
    /// Window function inside an aggregate.
    WindowInAggregate,
    /// Subquery used where the current restriction forbids it.
    SubqueryNotAllowed,
    /// Aggregate used where the current restriction forbids it.
    AggregateNotAllowed,
    /// DISTINCT on an aggregate that does not allow it.
    DistinctNotAllowed,
    /// Duplicate column name in a column list.
    DuplicateColumnName,
    /// Same exposed table name used twice in one FROM list.
    DuplicateTableName,
    /// Derived column list arity does not match the query.
    ColumnCountMismatch,
    /// Target of an update cannot be updated.
    NotUpdatable,
    /// Generation clause references another generated column.
    GeneratedColumnReference,
    /// Value of an expression cannot be stored in the target column.
    NotStorable,
    /// Feature not supported.
    NotImplemented,
    /// A compiler defect (bookkeeping mismatch).
    InternalError,
}

impl SqlState {
    /// The five character code for this state.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ColumnNotFound => "42X04",
            Self::TableNotFound => "42X05",
            Self::RoutineNotFound => "42Y03",
            Self::AmbiguousColumnName => "42X03",
            Self::NonBooleanClause => "42X19",
            Self::DistinctNotOrderable => "X0X67",
            Self::NotUnionCompatible => "42X61",
            Self::UntypedNull => "42X07",
            Self::NestedAggregate => "42Y33",
            Self::WindowInAggregate => "42Y34",
            Self::SubqueryNotAllowed => "42Y35",
            Self::AggregateNotAllowed => "42903",
            Self::DistinctNotAllowed => "42Y36",
            Self::DuplicateColumnName => "42X77",
            Self::DuplicateTableName => "42X09",
            Self::ColumnCountMismatch => "42X32",
            Self::NotUpdatable => "42Y90",
            Self::GeneratedColumnReference => "42XA4",
            Self::NotStorable => "42821",
            Self::NotImplemented => "0A000",
            Self::InternalError => "XJ001",
        }
    }
}

impl fmt::Display for SqlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug)]
pub struct DbError {
    inner: Box<DbErrorInner>,
}

struct DbErrorInner {
    msg: String,
    sql_state: Option<SqlState>,
    fields: Vec<(Cow<'static, str>, String)>,
    source: Option<Box<dyn Error + Send + Sync>>,
    backtrace: Backtrace,
}

impl fmt::Debug for DbErrorInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbErrorInner")
            .field("msg", &self.msg)
            .field("sql_state", &self.sql_state)
            .field("fields", &self.fields)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl DbError {
    pub fn new(msg: impl Into<String>) -> Self {
        DbError {
            inner: Box::new(DbErrorInner {
                msg: msg.into(),
                sql_state: None,
                fields: Vec::new(),
                source: None,
                backtrace: Backtrace::capture(),
            }),
        }
    }

    pub fn with_source(msg: impl Into<String>, source: Box<dyn Error + Send + Sync>) -> Self {
        let mut err = Self::new(msg);
        err.inner.source = Some(source);
        err
    }

    /// Create an error indicating a defect in the compiler itself.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(msg).with_sql_state(SqlState::InternalError)
    }

    pub fn with_sql_state(mut self, state: SqlState) -> Self {
        self.inner.sql_state = Some(state);
        self
    }

    pub fn with_field(mut self, key: impl Into<Cow<'static, str>>, value: impl fmt::Display) -> Self {
        self.inner.fields.push((key.into(), value.to_string()));
        self
    }

    pub fn with_fields<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Cow<'static, str>>,
        V: fmt::Display,
    {
        for (key, value) in fields {
            self.inner.fields.push((key.into(), value.to_string()));
        }
        self
    }

    pub fn get_msg(&self) -> &str {
        &self.inner.msg
    }

    pub fn sql_state(&self) -> Option<SqlState> {
        self.inner.sql_state
    }

    pub fn is_internal(&self) -> bool {
        self.inner.sql_state == Some(SqlState::InternalError)
    }

    pub fn get_field(&self, key: &str) -> Option<&str> {
        self.inner
            .fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.inner.backtrace
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(state) = &self.inner.sql_state {
            write!(f, "[{state}] ")?;
        }
        write!(f, "{}", self.inner.msg)?;

        for (key, value) in &self.inner.fields {
            write!(f, "\n  {key}: {value}")?;
        }

        if let Some(source) = &self.inner.source {
            write!(f, "\nError source: {source}")?;
        }

        if self.inner.backtrace.status() == BacktraceStatus::Captured {
            write!(f, "\nBacktrace: {}", self.inner.backtrace)?;
        }

        Ok(())
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<fmt::Error> for DbError {
    fn from(value: fmt::Error) -> Self {
        DbError::with_source("Format error", Box::new(value))
    }
}

/// Add context to an error result.
pub trait ResultExt<T, E> {
    fn context(self, msg: &'static str) -> Result<T>;

    fn context_fn<F>(self, f: F) -> Result<T>
    where
        F: Fn() -> String;
}

impl<T, E> ResultExt<T, E> for std::result::Result<T, E>
where
    E: Error + Send + Sync + 'static,
{
    fn context(self, msg: &'static str) -> Result<T> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(DbError::with_source(msg, Box::new(e))),
        }
    }

    fn context_fn<F>(self, f: F) -> Result<T>
    where
        F: Fn() -> String,
    {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(DbError::with_source(f(), Box::new(e))),
        }
    }
}

pub trait OptionExt<T> {
    /// Return an internal error if the option is None.
    fn required(self, msg: &'static str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required(self, msg: &'static str) -> Result<T> {
        match self {
            Some(v) => Ok(v),
            None => Err(DbError::internal(msg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_impl() -> Result<()> {
        not_implemented!("FULL OUTER JOIN on {}", "t1")
    }

    #[test]
    fn display_includes_state_and_fields() {
        let err = DbError::new("Column 'x' not found")
            .with_sql_state(SqlState::ColumnNotFound)
            .with_field("column", "x");

        let s = err.to_string();
        assert!(s.starts_with("[42X04] Column 'x' not found"));
        assert!(s.contains("column: x"));
        assert_eq!(Some("x"), err.get_field("column"));
    }

    #[test]
    fn not_implemented_macro_sets_state() {
        let err = not_impl().unwrap_err();
        assert_eq!(Some(SqlState::NotImplemented), err.sql_state());
        assert!(err.get_msg().contains("FULL OUTER JOIN on t1"));
    }

    #[test]
    fn required_is_internal() {
        let err = None::<i32>.required("missing cached node").unwrap_err();
        assert!(err.is_internal());
    }
}
