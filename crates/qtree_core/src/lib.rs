//! Binding and logical rewrite core of the query compiler.
//!
//! A parsed query (`ast`) is bound against a `Catalog` into a tree of
//! `ResultSetNode`s whose columns live in a shared `ColumnArena`. The
//! preprocess pass then normalizes predicates, flattens subqueries and pushes
//! predicates down towards the tables they reference.

pub mod ast;
pub mod binder;
pub mod catalog;
pub mod config;
pub mod constraints;
pub mod cost;
pub mod expr;
pub mod from;
pub mod parser;
pub mod predicate;
pub mod preprocess;
pub mod rcl;
pub mod resultset;
pub mod table_map;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use binder::compile::{CompiledQuery, compile_query};
