//! End-to-end diff scenarios against realistic schema pairs.

use larder::{Catalog, FieldValue, NodeId};
use larder_diff::diff;

const INTEGER: i64 = 5;
const VARCHAR: i64 = 9;

fn base() -> Catalog {
    let mut cat = Catalog::new();
    let cluster = cat.add_child(cat.root(), "clusters", "cluster").unwrap();
    cat.add_child(cluster, "databases", "database").unwrap();
    cat
}

fn database(cat: &Catalog) -> NodeId {
    cat.resolve("/clusters#cluster/databases#database").unwrap()
}

fn add_table(cat: &mut Catalog, name: &str) -> NodeId {
    let db = database(cat);
    cat.add_child(db, "tables", name).unwrap()
}

fn add_column(
    cat: &mut Catalog,
    table: NodeId,
    name: &str,
    ty: i64,
    size: i64,
    nullable: bool,
    default: Option<&str>,
) -> NodeId {
    let col = cat.add_child(table, "columns", name).unwrap();
    cat.set_field(col, "type", FieldValue::Int(ty)).unwrap();
    cat.set_field(col, "size", FieldValue::Int(size)).unwrap();
    cat.set_field(col, "nullable", FieldValue::Bool(nullable)).unwrap();
    if let Some(value) = default {
        cat.set_field(col, "defaultvalue", FieldValue::String(value.to_owned())).unwrap();
    }
    col
}

/// `T(id INT, name VARCHAR(10) NOT NULL DEFAULT 'x')`
fn orders_catalog() -> Catalog {
    let mut cat = base();
    let t = add_table(&mut cat, "ORDERS");
    add_column(&mut cat, t, "id", INTEGER, 4, false, Some("0"));
    add_column(&mut cat, t, "name", VARCHAR, 10, false, Some("x"));
    cat
}

fn clone_catalog(cat: &Catalog) -> Catalog {
    Catalog::from_commands(&cat.serialize()).unwrap()
}

#[test]
fn identity_diff_is_empty() {
    let prev = orders_catalog();
    let next = clone_catalog(&prev);
    let result = diff(&prev, &next);
    assert_eq!(result.command_text(), "");
    assert!(result.supported());
    assert!(result.errors().is_empty());
    assert!(result.tables_that_must_be_empty().is_empty());
    assert_eq!(result.side_effect_flags(), Default::default());
    assert!(result.changes().is_empty());
}

#[test]
fn diff_from_empty_round_trips_through_execute() {
    let target = orders_catalog();
    let result = diff(&Catalog::new(), &target);
    let rebuilt = Catalog::from_commands(result.command_text()).unwrap();
    assert_eq!(rebuilt.serialize(), target.serialize());
}

#[test]
fn nullable_column_add_is_safe() {
    let prev = orders_catalog();
    let mut next = clone_catalog(&prev);
    let t = next.resolve("/clusters#cluster/databases#database/tables#ORDERS").unwrap();
    add_column(&mut next, t, "note", VARCHAR, 20, true, None);

    let result = diff(&prev, &next);
    assert!(result.supported());
    assert!(result.tables_that_must_be_empty().is_empty());
    assert!(
        result.command_text().contains(
            "add /clusters#cluster/databases#database/tables#ORDERS/columns#note Column"
        ),
        "{}",
        result.command_text()
    );
    let flags = result.side_effect_flags();
    assert!(flags.requires_snapshot_isolation);
    assert!(flags.requires_engine_visible_apply);
    assert!(!flags.requires_new_export_generation);
}

#[test]
fn not_null_column_add_without_default_requires_empty_table() {
    let prev = orders_catalog();
    let mut next = clone_catalog(&prev);
    let t = next.resolve("/clusters#cluster/databases#database/tables#ORDERS").unwrap();
    add_column(&mut next, t, "code", INTEGER, 4, false, None);

    let result = diff(&prev, &next);
    assert!(result.supported());
    let requirements = result.tables_that_must_be_empty();
    assert_eq!(requirements.len(), 1);
    let (tables, message) = &requirements[0];
    assert_eq!(tables, "ORDERS");
    assert!(message.contains("not empty"), "{message}");
    assert!(message.contains("default value"), "{message}");
}

#[test]
fn varchar_narrowing_requires_empty_table() {
    let prev = orders_catalog();
    let mut next = clone_catalog(&prev);
    let c = next
        .resolve("/clusters#cluster/databases#database/tables#ORDERS/columns#name")
        .unwrap();
    next.set_field(c, "size", FieldValue::Int(5)).unwrap();

    let result = diff(&prev, &next);
    assert!(result.supported());
    let requirements = result.tables_that_must_be_empty();
    assert_eq!(requirements.len(), 1);
    assert_eq!(requirements[0].0, "ORDERS");
    // The set command is still recorded for audit.
    assert!(result.command_text().contains("size 5"), "{}", result.command_text());
}

#[test]
fn detection_is_symmetric_while_policy_is_not() {
    // A carries a unique index that B lacks.
    let mut a = orders_catalog();
    let t = a.resolve("/clusters#cluster/databases#database/tables#ORDERS").unwrap();
    let idx = a.add_child(t, "indexes", "IDX_ID").unwrap();
    a.set_field(idx, "unique", FieldValue::Bool(true)).unwrap();
    let cref = a.add_child(idx, "columns", "id").unwrap();
    a.set_field(
        cref,
        "column",
        FieldValue::Ref(
            "/clusters#cluster/databases#database/tables#ORDERS/columns#id".to_owned(),
        ),
    )
    .unwrap();
    let b = orders_catalog();

    let drop = diff(&a, &b);
    let re_add = diff(&b, &a);

    // Same delta detected on both sides, as a removal vs. an addition.
    let removed: Vec<&str> = drop.changes().removed().iter().map(|r| r.path.as_str()).collect();
    let added: Vec<&str> = re_add.changes().added().iter().map(|r| r.path.as_str()).collect();
    assert_eq!(removed, added);

    // Dropping the unique index is unconditionally fine; adding it back is
    // only possible while the table is empty (nothing covers it).
    assert!(drop.supported());
    assert!(drop.tables_that_must_be_empty().is_empty());
    assert!(re_add.supported());
    let requirements = re_add.tables_that_must_be_empty();
    assert_eq!(requirements.len(), 1);
    assert_eq!(requirements[0].0, "ORDERS");
}

#[test]
fn covered_unique_index_add_is_safe() {
    let mut prev = orders_catalog();
    let t = prev.resolve("/clusters#cluster/databases#database/tables#ORDERS").unwrap();
    let table_path = prev.path(t).to_owned();
    let add_unique_index = |cat: &mut Catalog, table: NodeId, name: &str, cols: &[&str]| {
        let idx = cat.add_child(table, "indexes", name).unwrap();
        cat.set_field(idx, "unique", FieldValue::Bool(true)).unwrap();
        for col in cols {
            let cref = cat.add_child(idx, "columns", col).unwrap();
            cat.set_field(
                cref,
                "column",
                FieldValue::Ref(format!("{table_path}/columns#{col}")),
            )
            .unwrap();
        }
    };
    add_unique_index(&mut prev, t, "IDX_ID", &["id"]);
    let mut next = clone_catalog(&prev);
    let nt = next.resolve(&table_path).unwrap();
    add_unique_index(&mut next, nt, "IDX_ID_NAME", &["id", "name"]);

    let result = diff(&prev, &next);
    assert!(result.supported());
    assert!(result.tables_that_must_be_empty().is_empty());
}

#[test]
fn materialized_view_columns_are_locked() {
    let mut prev = orders_catalog();
    let view = add_table(&mut prev, "ORDERS_BY_NAME");
    prev.set_field(
        view,
        "materializer",
        FieldValue::Ref("/clusters#cluster/databases#database/tables#ORDERS".to_owned()),
    )
    .unwrap();
    add_column(&mut prev, view, "name", VARCHAR, 10, true, None);
    let mut next = clone_catalog(&prev);
    let c = next
        .resolve("/clusters#cluster/databases#database/tables#ORDERS_BY_NAME/columns#name")
        .unwrap();
    next.set_field(c, "size", FieldValue::Int(20)).unwrap();

    let result = diff(&prev, &next);
    assert!(!result.supported());
    assert!(result.errors().contains("materialized view"), "{}", result.errors());
}

#[test]
fn rejected_changes_still_record_their_commands() {
    let mut prev = base();
    let mut next = base();
    let pc = prev.resolve("/clusters#cluster").unwrap();
    let nc = next.resolve("/clusters#cluster").unwrap();
    prev.set_field(pc, "drRole", FieldValue::String("master".into())).unwrap();
    next.set_field(nc, "drRole", FieldValue::String("replica".into())).unwrap();

    let result = diff(&prev, &next);
    assert!(!result.supported());
    assert!(result.errors().contains("master"), "{}", result.errors());
    assert!(
        result.command_text().contains("drRole \"replica\""),
        "{}",
        result.command_text()
    );
}

#[test]
fn user_changes_touch_no_table_flags() {
    let prev = base();
    let mut next = base();
    let db = database(&next);
    let user = next.add_child(db, "users", "alice").unwrap();
    next.set_field(user, "shadowPassword", FieldValue::String("hash".into())).unwrap();

    let result = diff(&prev, &next);
    assert!(result.supported());
    assert_eq!(result.side_effect_flags(), Default::default());
    assert_eq!(result.changes().added().len(), 1);
}

#[test]
fn stream_table_add_opens_a_new_export_generation() {
    let prev = base();
    let mut next = base();
    let stream = add_table(&mut next, "EVENTS");
    next.set_field(stream, "tableType", FieldValue::Int(1)).unwrap();
    add_column(&mut next, stream, "payload", VARCHAR, 64, true, None);

    let result = diff(&prev, &next);
    assert!(result.supported());
    let flags = result.side_effect_flags();
    assert!(flags.requires_new_export_generation);
    // Streams hold no persisted rows, so no snapshot interaction.
    assert!(!flags.requires_snapshot_isolation);
}

#[test]
fn unsafe_single_source_view_add_requires_the_source_empty() {
    let prev = orders_catalog();
    let mut next = clone_catalog(&prev);
    let dest = add_table(&mut next, "ORDERS_BY_NAME");
    add_column(&mut next, dest, "name", VARCHAR, 10, true, None);
    let dest_path = next.path(dest).to_owned();
    let src = next.resolve("/clusters#cluster/databases#database/tables#ORDERS").unwrap();
    let view = next.add_child(src, "views", "ORDERS_BY_NAME").unwrap();
    next.set_field(view, "dest", FieldValue::Ref(dest_path)).unwrap();
    // issafewithnonemptysources stays at its default, false.

    let result = diff(&prev, &next);
    assert!(result.supported());
    let requirements = result.tables_that_must_be_empty();
    assert_eq!(requirements.len(), 1);
    let (tables, message) = &requirements[0];
    assert_eq!(tables, "ORDERS");
    assert!(message.contains("source table"), "{message}");
    assert!(message.contains("empty"), "{message}");
}

#[test]
fn view_add_flagged_safe_with_nonempty_sources_needs_nothing() {
    let prev = orders_catalog();
    let mut next = clone_catalog(&prev);
    let dest = add_table(&mut next, "ORDERS_BY_NAME");
    let dest_path = next.path(dest).to_owned();
    let src = next.resolve("/clusters#cluster/databases#database/tables#ORDERS").unwrap();
    let view = next.add_child(src, "views", "ORDERS_BY_NAME").unwrap();
    next.set_field(view, "dest", FieldValue::Ref(dest_path)).unwrap();
    next.set_field(view, "issafewithnonemptysources", FieldValue::Bool(true)).unwrap();

    let result = diff(&prev, &next);
    assert!(result.supported());
    assert!(result.tables_that_must_be_empty().is_empty());
}

#[test]
fn multisource_view_table_add_requires_all_sources_empty() {
    let mut prev = base();
    for name in ["SRC1", "SRC2"] {
        let t = add_table(&mut prev, name);
        add_column(&mut prev, t, "id", INTEGER, 4, false, Some("0"));
    }
    let mut next = clone_catalog(&prev);
    // The whole view arrives as one new table subtree; its handler sources
    // the two pre-existing tables.
    let v = add_table(&mut next, "TOTALS");
    add_column(&mut next, v, "total", INTEGER, 4, true, None);
    let v_path = next.path(v).to_owned();
    let handler = next.add_child(v, "mvHandlerInfo", "TOTALS").unwrap();
    next.set_field(handler, "destTable", FieldValue::Ref(v_path)).unwrap();
    for name in ["SRC1", "SRC2"] {
        let tref = next.add_child(handler, "sourceTables", name).unwrap();
        next.set_field(
            tref,
            "table",
            FieldValue::Ref(format!("/clusters#cluster/databases#database/tables#{name}")),
        )
        .unwrap();
    }

    let result = diff(&prev, &next);
    assert!(result.supported());
    // One requirement per source: every source must be empty, so the
    // entries combine as a conjunction.
    let requirements = result.tables_that_must_be_empty();
    let labels: Vec<&str> = requirements.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(labels, vec!["SRC1", "SRC2"]);
    for (_, message) in &requirements {
        assert!(message.contains("source table"), "{message}");
    }
}

#[test]
fn report_buckets_changes_by_top_level_object() {
    let prev = orders_catalog();
    let mut next = clone_catalog(&prev);
    let db = database(&next);
    next.add_child(db, "procedures", "GetOrders").unwrap();
    let t = next.resolve("/clusters#cluster/databases#database/tables#ORDERS").unwrap();
    next.set_field(t, "tuplelimit", FieldValue::Int(1000)).unwrap();

    let result = diff(&prev, &next);
    let report = result.describe_changes(false);
    assert!(report.contains("Added procedures: GetOrders"), "{report}");
    assert!(report.contains("Modified tables: ORDERS (tuplelimit)"), "{report}");
}
