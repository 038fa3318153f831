//! The live-update admissibility policy.
//!
//! Three decision tables, all pure functions over the two trees: add/drop
//! admissibility, modify admissibility, and the empty-table fallbacks for
//! each. A `None` return means allowed; `Some(message)` is an
//! unconditional rejection that the engine may still downgrade to a
//! data-state precondition via the matching fallback table.

use crate::coverage::index_covers;
use crate::result::EmptyTableRequirement;
use crate::widening::{check_column_shape_change, ColumnShape};
use larder::{Catalog, CatalogKind, NodeId, TableType};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeDirection {
    Addition,
    Deletion,
}

impl ChangeDirection {
    fn verb(self) -> &'static str {
        match self {
            ChangeDirection::Addition => "add",
            ChangeDirection::Deletion => "drop",
        }
    }
}

/// The Table node owning `node`: the node itself when it is a table, else
/// its nearest Table ancestor.
pub(crate) fn owning_table(catalog: &Catalog, node: NodeId) -> Option<NodeId> {
    if catalog.kind(node) == CatalogKind::Table {
        Some(node)
    } else {
        catalog.ancestor_of_kind(node, CatalogKind::Table)
    }
}

pub(crate) fn table_type(catalog: &Catalog, table: NodeId) -> TableType {
    TableType::from_field(
        catalog.field(table, "tableType").as_int().expect("tableType is Int"),
    )
}

/// Whether the chain starting at `start` (inclusive) contains one of the
/// given kinds. Used for ancestor grandfathering: a node nested under an
/// object that already passed its own check is safe by containment.
fn chain_contains(catalog: &Catalog, start: Option<NodeId>, kinds: &[CatalogKind]) -> bool {
    let mut current = start;
    while let Some(node) = current {
        if kinds.contains(&catalog.kind(node)) {
            return true;
        }
        current = catalog.parent(node);
    }
    false
}

fn string_field<'a>(catalog: &'a Catalog, node: NodeId, field: &str) -> &'a str {
    catalog.field(node, field).as_str().unwrap_or("")
}

fn bool_field(catalog: &Catalog, node: NodeId, field: &str) -> bool {
    catalog.field(node, field).as_bool().expect("declared Bool field holds Bool")
}

fn is_unique_index(catalog: &Catalog, index: NodeId) -> bool {
    bool_field(catalog, index, "unique") || bool_field(catalog, index, "assumeUnique")
}

/// Whether a column addition is structurally harmless: nullable, carries a
/// default, or belongs to a table with no persisted rows.
fn column_add_is_safe(catalog: &Catalog, column: NodeId, table: NodeId) -> bool {
    bool_field(catalog, column, "nullable")
        || !catalog.field(column, "defaultvalue").is_null()
        || table_type(catalog, table).is_stream()
}

/// Whether some other unique index on the new catalog's table already
/// covers the candidate.
fn unique_index_is_covered(catalog: &Catalog, candidate: NodeId) -> bool {
    let table = catalog
        .ancestor_of_kind(candidate, CatalogKind::Table)
        .expect("index lives under a table");
    catalog
        .collection(table, "indexes")
        .filter(|&other| other != candidate && is_unique_index(catalog, other))
        .any(|other| index_covers(catalog, other, candidate))
}

/// Add/drop admissibility. `node` lives in the tree the change comes from
/// (next for additions, prev for deletions); `scope` is the first node of
/// the next-side ancestor chain to consult for grandfathering (the node's
/// own parent for additions, the newly childless parent for deletions).
pub(crate) fn check_add_drop(
    catalog: &Catalog,
    node: NodeId,
    direction: ChangeDirection,
    scope_catalog: &Catalog,
    scope: Option<NodeId>,
) -> Option<String> {
    use CatalogKind::*;
    use ChangeDirection::*;

    if chain_contains(
        scope_catalog,
        scope,
        &[Procedure, Connector, Column, ConstraintRef],
    ) {
        return None;
    }

    let kind = catalog.kind(node);
    let name = catalog.name(node);
    match (kind, direction) {
        (
            User | Group | GroupRef | Procedure | Function | SnapshotSchedule | Constraint
            | ConstraintRef | Connector | Table,
            _,
        ) => None,

        (Column, Deletion) => None,
        (Column, Addition) => {
            let table = owning_table(catalog, node).expect("column lives under a table");
            if column_add_is_safe(catalog, node, table) {
                None
            } else {
                Some(format!(
                    "may not add NOT NULL column {name} to table {} without a default value",
                    catalog.name(table)
                ))
            }
        }

        (Index, Deletion) => None,
        (Index, Addition) => {
            if !string_field(catalog, node, "expressionsjson").is_empty() {
                Some(format!("may not dynamically add expression-based index {name}"))
            } else if is_unique_index(catalog, node) && !unique_index_is_covered(catalog, node) {
                Some(format!(
                    "may not dynamically add unique index {name}: no existing unique index covers it"
                ))
            } else {
                None
            }
        }

        (ColumnRef, _) => {
            let parent = catalog.parent(node).expect("column ref has a parent");
            if catalog.kind(parent) == Index && !is_unique_index(catalog, parent) {
                None
            } else {
                Some(format!(
                    "may not dynamically {} column reference {name} of {}",
                    direction.verb(),
                    catalog.name(parent)
                ))
            }
        }

        (MaterializedViewInfo | MaterializedViewHandlerInfo, Deletion) => None,
        (MaterializedViewInfo | MaterializedViewHandlerInfo, Addition) => {
            if bool_field(catalog, node, "issafewithnonemptysources") {
                None
            } else {
                Some(format!(
                    "may not create materialized view {name} over non-empty source tables"
                ))
            }
        }

        _ => {
            let parent_name = catalog
                .parent(node)
                .map(|p| catalog.name(p).to_owned())
                .unwrap_or_default();
            Some(format!(
                "may not dynamically {} {kind} {name} of {parent_name}",
                direction.verb()
            ))
        }
    }
}

fn require(tables: impl IntoIterator<Item = String>, message: String) -> EmptyTableRequirement {
    EmptyTableRequirement { tables: BTreeSet::from_iter(tables), message }
}

fn require_one(table: &str, message: String) -> Vec<EmptyTableRequirement> {
    vec![require([table.to_owned()], message)]
}

/// Empty-table fallbacks for rejected add/drops. An empty return means the
/// rejection stands unconditionally.
pub(crate) fn check_add_drop_if_table_empty(
    catalog: &Catalog,
    node: NodeId,
    direction: ChangeDirection,
) -> Vec<EmptyTableRequirement> {
    use CatalogKind::*;
    use ChangeDirection::*;

    let kind = catalog.kind(node);
    let name = catalog.name(node);
    match (kind, direction) {
        (Column, Addition) => {
            let table = owning_table(catalog, node).expect("column lives under a table");
            let table_name = catalog.name(table);
            require_one(
                table_name,
                format!(
                    "table {table_name} is not empty and no default value was specified for new column {name}"
                ),
            )
        }

        (Index, Addition) => {
            let table = owning_table(catalog, node).expect("index lives under a table");
            let table_name = catalog.name(table);
            let message = if !string_field(catalog, node, "expressionsjson").is_empty() {
                format!(
                    "unable to add expression-based index {name} unless table {table_name} is empty"
                )
            } else {
                format!("unable to add unique index {name} unless table {table_name} is empty")
            };
            require_one(table_name, message)
        }

        (ColumnRef, Deletion) => {
            let parent = catalog.parent(node).expect("column ref has a parent");
            if catalog.kind(parent) != Index || !is_unique_index(catalog, parent) {
                return Vec::new();
            }
            let table = owning_table(catalog, node).expect("index lives under a table");
            let table_name = catalog.name(table);
            require_one(
                table_name,
                format!(
                    "unable to remove column {name} from unique index {} unless table {table_name} is empty",
                    catalog.name(parent)
                ),
            )
        }

        (MaterializedViewInfo, Addition) => {
            // Single-source view: the source is the owning table.
            let source = owning_table(catalog, node).expect("view lives under its source table");
            let source_name = catalog.name(source);
            require_one(
                source_name,
                format!(
                    "unable to create materialized view {name} on source table {source_name} unless it is empty"
                ),
            )
        }

        (MaterializedViewHandlerInfo, Addition) => {
            // Multi-source view: every source table must be empty, so one
            // requirement entry per source.
            catalog
                .collection(node, "sourceTables")
                .filter_map(|table_ref| {
                    let path = catalog.field(table_ref, "table").as_ref_path()?;
                    let source = path.rsplit('#').next().expect("non-empty path").to_owned();
                    Some(require(
                        [source.clone()],
                        format!(
                            "unable to create materialized view {name} while source table {source} is not empty"
                        ),
                    ))
                })
                .collect()
        }

        _ => Vec::new(),
    }
}

/// Modify admissibility, per (kind, field).
pub(crate) fn check_modify(
    prev_catalog: &Catalog,
    next_catalog: &Catalog,
    prev_node: NodeId,
    next_node: NodeId,
    field: &str,
) -> Option<String> {
    use CatalogKind::*;

    if chain_contains(next_catalog, next_catalog.parent(next_node), &[Procedure, ColumnRef]) {
        return None;
    }

    let kind = next_catalog.kind(next_node);
    let name = next_catalog.name(next_node);
    match (kind, field) {
        (
            User | Group | GroupRef | Procedure | Statement | PlanFragment | ColumnRef
            | SnapshotSchedule | Function | Constraint | ConstraintRef | Connector
            | ConnectorTableInfo | ConnectorProperty,
            _,
        ) => None,

        (Cluster, "heartbeatTimeout" | "drProducerPort" | "drMasterHost") => None,
        (Cluster, "drRole") => {
            let from = string_field(prev_catalog, prev_node, "drRole").to_owned();
            let to = string_field(next_catalog, next_node, "drRole").to_owned();
            if from.eq_ignore_ascii_case("replica") && to.eq_ignore_ascii_case("master") {
                None
            } else {
                Some(format!("may not dynamically change DR role from {from} to {to}"))
            }
        }

        (Database, "schema" | "securityprovider" | "isActiveActiveDRed") => None,

        (Table, "estimatedtuplecount" | "signature" | "tuplelimit") => None,
        (Table, "materializer") => {
            Some(format!("may not change the materializer of table {name}"))
        }
        (Table, "isreplicated" | "partitioncolumn" | "isDRed" | "tableType") => {
            Some(format!("may not dynamically change {field} of table {name}"))
        }

        (Column, "defaultvalue" | "defaulttype") => None,
        (Column, "nullable") => {
            if bool_field(next_catalog, next_node, "nullable") {
                // Relaxing the constraint is always safe.
                None
            } else {
                Some(format!("may not change column {name} from nullable to non-nullable"))
            }
        }
        (Column, "type" | "size" | "inbytes") => check_column_shape_change(
            ColumnShape::of(prev_catalog, prev_node),
            ColumnShape::of(next_catalog, next_node),
        )
        .err()
        .map(|reason| format!("column {name}: {reason}")),
        (Column, "index") => {
            Some(format!("may not dynamically change the position of column {name}"))
        }

        (Index, "countable" | "type") => None,
        (Index, "unique" | "assumeUnique") => {
            if bool_field(prev_catalog, prev_node, field)
                && !bool_field(next_catalog, next_node, field)
            {
                // Dropping a uniqueness guarantee cannot fail on live data.
                None
            } else {
                Some(format!("may not dynamically make index {name} {field}"))
            }
        }
        (Index, "expressionsjson" | "predicatejson") => {
            Some(format!("may not dynamically change {field} of index {name}"))
        }

        (MaterializedViewInfo | MaterializedViewHandlerInfo, _) => {
            Some(format!("may not dynamically modify materialized view {name}"))
        }

        _ => Some(format!("may not dynamically modify field {field} of {kind} {name}")),
    }
}

/// Empty-table fallbacks for rejected modifications.
pub(crate) fn check_modify_if_table_empty(
    catalog: &Catalog,
    node: NodeId,
    field: &str,
) -> Vec<EmptyTableRequirement> {
    use CatalogKind::*;

    let kind = catalog.kind(node);
    let name = catalog.name(node);
    match (kind, field) {
        (Table, "isreplicated" | "partitioncolumn" | "isDRed" | "tableType") => require_one(
            name,
            format!("unable to change {field} of table {name} unless it is empty"),
        ),

        (Column, "type" | "size" | "inbytes" | "nullable" | "index") => {
            let table = owning_table(catalog, node).expect("column lives under a table");
            let table_name = catalog.name(table);
            require_one(
                table_name,
                format!(
                    "unable to modify column {name} of table {table_name} unless the table is empty"
                ),
            )
        }

        (Index, "unique" | "assumeUnique" | "expressionsjson" | "predicatejson") => {
            let table = owning_table(catalog, node).expect("index lives under a table");
            let table_name = catalog.name(table);
            require_one(
                table_name,
                format!(
                    "unable to modify index {name} of table {table_name} unless the table is empty"
                ),
            )
        }

        _ => Vec::new(),
    }
}

/// Whether the storage engine must see a change at this node (as opposed
/// to coordinator-only objects like users, groups, and procedures).
pub(crate) fn should_apply_to_engine(catalog: &Catalog, node: NodeId) -> bool {
    use CatalogKind::*;
    matches!(
        catalog.kind(node),
        Table
            | Column
            | Index
            | ColumnRef
            | Constraint
            | MaterializedViewInfo
            | MaterializedViewHandlerInfo
            | TableRef
    ) || catalog.ancestor_of_kind(node, Table).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder::FieldValue;

    fn db_fixture() -> (Catalog, NodeId) {
        let mut cat = Catalog::new();
        let cluster = cat.add_child(cat.root(), "clusters", "cluster").unwrap();
        let db = cat.add_child(cluster, "databases", "database").unwrap();
        (cat, db)
    }

    #[test]
    fn users_and_procedures_are_always_add_drop_safe() {
        let (mut cat, db) = db_fixture();
        let user = cat.add_child(db, "users", "alice").unwrap();
        let proc = cat.add_child(db, "procedures", "P1").unwrap();
        for (node, dir) in [
            (user, ChangeDirection::Addition),
            (user, ChangeDirection::Deletion),
            (proc, ChangeDirection::Addition),
            (proc, ChangeDirection::Deletion),
        ] {
            let scope = cat.parent(node);
            assert_eq!(check_add_drop(&cat, node, dir, &cat, scope), None);
        }
    }

    #[test]
    fn statement_under_procedure_is_grandfathered() {
        let (mut cat, db) = db_fixture();
        let proc = cat.add_child(db, "procedures", "P1").unwrap();
        let stmt = cat.add_child(proc, "statements", "S1").unwrap();
        assert_eq!(
            check_add_drop(&cat, stmt, ChangeDirection::Addition, &cat, cat.parent(stmt)),
            None
        );
    }

    #[test]
    fn not_null_column_add_without_default_needs_the_table_empty() {
        let (mut cat, db) = db_fixture();
        let t = cat.add_child(db, "tables", "T1").unwrap();
        let c = cat.add_child(t, "columns", "code").unwrap();
        // nullable defaults to false, defaultvalue to null
        let rejection =
            check_add_drop(&cat, c, ChangeDirection::Addition, &cat, cat.parent(c));
        assert!(rejection.is_some());
        let reqs = check_add_drop_if_table_empty(&cat, c, ChangeDirection::Addition);
        assert_eq!(reqs.len(), 1);
        assert!(reqs[0].tables.contains("T1"));
        assert!(reqs[0].message.contains("not empty"), "{}", reqs[0].message);
        assert!(reqs[0].message.contains("default value"), "{}", reqs[0].message);
    }

    #[test]
    fn nullable_or_defaulted_or_stream_column_adds_are_safe() {
        let (mut cat, db) = db_fixture();
        let t = cat.add_child(db, "tables", "T1").unwrap();
        let c = cat.add_child(t, "columns", "note").unwrap();
        cat.set_field(c, "nullable", FieldValue::Bool(true)).unwrap();
        assert_eq!(
            check_add_drop(&cat, c, ChangeDirection::Addition, &cat, cat.parent(c)),
            None
        );

        let d = cat.add_child(t, "columns", "tagged").unwrap();
        cat.set_field(d, "defaultvalue", FieldValue::String("x".into())).unwrap();
        assert_eq!(
            check_add_drop(&cat, d, ChangeDirection::Addition, &cat, cat.parent(d)),
            None
        );

        let stream = cat.add_child(db, "tables", "S1").unwrap();
        cat.set_field(stream, "tableType", FieldValue::Int(1)).unwrap();
        let e = cat.add_child(stream, "columns", "c").unwrap();
        assert_eq!(
            check_add_drop(&cat, e, ChangeDirection::Addition, &cat, cat.parent(e)),
            None
        );
    }

    #[test]
    fn dr_role_change_is_only_replica_to_master() {
        let (cat_a, _) = db_fixture();
        let (cat_b, _) = db_fixture();
        let a = cat_a.resolve("/clusters#cluster").unwrap();
        let b = cat_b.resolve("/clusters#cluster").unwrap();
        let mut cat_a = cat_a;
        let mut cat_b = cat_b;
        cat_a.set_field(a, "drRole", FieldValue::String("replica".into())).unwrap();
        cat_b.set_field(b, "drRole", FieldValue::String("master".into())).unwrap();
        assert_eq!(check_modify(&cat_a, &cat_b, a, b, "drRole"), None);
        let err = check_modify(&cat_b, &cat_a, b, a, "drRole").unwrap();
        assert!(err.contains("master") && err.contains("replica"), "{err}");
    }

    #[test]
    fn nullable_relaxation_is_safe_tightening_is_not() {
        let (mut prev, db) = db_fixture();
        let t = prev.add_child(db, "tables", "T1").unwrap();
        let c = prev.add_child(t, "columns", "C1").unwrap();
        let mut next = Catalog::from_commands(&prev.serialize()).unwrap();
        let nc = next.resolve(prev.path(c)).unwrap();
        next.set_field(nc, "nullable", FieldValue::Bool(true)).unwrap();
        assert_eq!(check_modify(&prev, &next, c, nc, "nullable"), None);
        let err = check_modify(&next, &prev, nc, c, "nullable").unwrap();
        assert!(err.contains("non-nullable"), "{err}");
        assert!(!check_modify_if_table_empty(&prev, c, "nullable").is_empty());
    }

    #[test]
    fn uniqueness_relaxation_is_safe_tightening_falls_back() {
        let (mut prev, db) = db_fixture();
        let t = prev.add_child(db, "tables", "T1").unwrap();
        let i = prev.add_child(t, "indexes", "IDX").unwrap();
        prev.set_field(i, "unique", FieldValue::Bool(true)).unwrap();
        let mut next = Catalog::from_commands(&prev.serialize()).unwrap();
        let ni = next.resolve(prev.path(i)).unwrap();
        next.set_field(ni, "unique", FieldValue::Bool(false)).unwrap();
        assert_eq!(check_modify(&prev, &next, i, ni, "unique"), None);
        assert!(check_modify(&next, &prev, ni, i, "unique").is_some());
        let reqs = check_modify_if_table_empty(&next, ni, "unique");
        assert!(reqs[0].tables.contains("T1"));
    }
}
