//! Unique-index coverage.
//!
//! An existing unique index covers a candidate new unique index when the
//! existing uniqueness guarantee already rules out duplicate keys for the
//! candidate, so the candidate can be built online without a duplicate-key
//! failure risk.

use larder::{Catalog, CatalogKind, NodeId};

fn string_field<'a>(catalog: &'a Catalog, node: NodeId, field: &str) -> &'a str {
    catalog.field(node, field).as_str().unwrap_or("")
}

fn column_names(catalog: &Catalog, index: NodeId) -> Vec<String> {
    catalog
        .collection(index, "columns")
        .map(|cref| {
            catalog
                .field(cref, "column")
                .as_ref_path()
                .map(|path| {
                    // Last `#name` segment of the referenced column path.
                    path.rsplit('#').next().expect("non-empty path").to_ascii_lowercase()
                })
                .unwrap_or_default()
        })
        .collect()
}

/// Whether `existing` covers `candidate`. Both must be Index nodes on the
/// same table of the same catalog; anything else is a caller bug and
/// panics rather than returning an answer.
pub fn index_covers(catalog: &Catalog, existing: NodeId, candidate: NodeId) -> bool {
    assert_eq!(catalog.kind(existing), CatalogKind::Index);
    assert_eq!(catalog.kind(candidate), CatalogKind::Index);
    let existing_table = catalog
        .ancestor_of_kind(existing, CatalogKind::Table)
        .expect("index lives under a table");
    let candidate_table = catalog
        .ancestor_of_kind(candidate, CatalogKind::Table)
        .expect("index lives under a table");
    assert_eq!(
        catalog.path(existing_table),
        catalog.path(candidate_table),
        "coverage is only defined between indexes on one table"
    );

    // Expression-based indexes only cover identical expressions; an
    // expression index and a plain column index never cover each other.
    let existing_exprs = string_field(catalog, existing, "expressionsjson");
    let candidate_exprs = string_field(catalog, candidate, "expressionsjson");
    if existing_exprs.is_empty() != candidate_exprs.is_empty() {
        return false;
    }
    if !existing_exprs.is_empty() && existing_exprs != candidate_exprs {
        return false;
    }

    // Same for partial-index predicates.
    let existing_pred = string_field(catalog, existing, "predicatejson");
    let candidate_pred = string_field(catalog, candidate, "predicatejson");
    if existing_pred.is_empty() != candidate_pred.is_empty() {
        return false;
    }
    if !existing_pred.is_empty() && existing_pred != candidate_pred {
        return false;
    }

    // Every column the existing index constrains must appear in the
    // candidate: the candidate's key is then at least as fine-grained.
    let candidate_cols = column_names(catalog, candidate);
    column_names(catalog, existing)
        .iter()
        .all(|col| candidate_cols.contains(col))
}
