use std::fmt::Debug;

use qtree_error::{DbError, Result};

use crate::ast;

/// Parser collaborator used to re-parse stored SQL fragments such as check
/// constraints and generation clauses.
pub trait FragmentParser: Debug {
    /// Parse `text` as `SELECT <text>`, returning the whole query.
    fn parse_fragment(&self, text: &str) -> Result<ast::Query>;
}

/// Extract the single select-list expression from a parsed fragment.
pub fn extract_expression(query: ast::Query) -> Result<ast::Expr> {
    let select = match query.body {
        ast::QueryBody::Select(select) => select,
        other => {
            return Err(DbError::internal(format!(
                "Expected a SELECT fragment, got {other:?}"
            )));
        }
    };

    if !select.from.is_empty() || select.selection.is_some() {
        return Err(DbError::internal(
            "Fragment should not have a FROM or WHERE clause",
        ));
    }

    let mut projections = select.projections;
    if projections.len() != 1 {
        return Err(DbError::internal(format!(
            "Expected exactly one expression in fragment, got {}",
            projections.len()
        )));
    }

    match projections.pop() {
        Some(ast::SelectItem::Expr { expr, .. }) => Ok(expr),
        other => Err(DbError::internal(format!(
            "Expected an expression in fragment, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_single_expression() {
        let query = ast::Query::select(ast::Select {
            projections: vec![ast::SelectItem::Expr {
                expr: ast::Expr::column("A"),
                alias: None,
            }],
            ..Default::default()
        });
        assert_eq!(ast::Expr::column("A"), extract_expression(query).unwrap());
    }

    #[test]
    fn extract_rejects_wildcard() {
        let query = ast::Query::select(ast::Select {
            projections: vec![ast::SelectItem::Wildcard],
            ..Default::default()
        });
        extract_expression(query).unwrap_err();
    }
}
