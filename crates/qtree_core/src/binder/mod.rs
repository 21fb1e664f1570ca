//! Resolution of a parsed query against the catalog.
//!
//! Binding walks the `ast` top down, creating from-tables, result columns
//! and bound expressions in a single `BindContext` shared by the whole
//! statement.

pub mod bind_context;
pub mod compile;
pub mod expr_binder;
pub mod from_binder;
pub mod query_binder;

/// Pick the candidate most similar to `name`, if any is similar enough to
/// suggest.
pub(crate) fn find_similar<'a>(
    candidates: impl IntoIterator<Item = &'a str>,
    name: &str,
) -> Option<&'a str> {
    const SIMILARITY_THRESHOLD: f64 = 0.7;

    let mut best: Option<(&str, f64)> = None;
    for candidate in candidates {
        let score = strsim::jaro(candidate, name);
        if score > SIMILARITY_THRESHOLD && best.is_none_or(|(_, best)| score > best) {
            best = Some((candidate, score));
        }
    }
    best.map(|(candidate, _)| candidate)
}
