//! Cross-cluster (DR) catalog exchange and compatibility.
//!
//! Two halves: serializing a catalog down to its replication contract — the
//! DR-enabled tables and only the fields that define row identity — and
//! comparing a master's contract against a replica's. The comparison is
//! per-table: its outcome is the set of tables that can safely replicate
//! plus a message per table that cannot, never a whole-run failure.

use larder::{Catalog, CatalogKind, CommandWriter, FieldValue, NodeId};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Fields that are part of a table's replication contract. Everything else
/// (tuple-count estimates, row limits, local tuning) is per-cluster.
fn dr_fields(kind: CatalogKind) -> &'static [&'static str] {
    match kind {
        CatalogKind::Database => &["isActiveActiveDRed"],
        CatalogKind::Table => &["isreplicated", "partitioncolumn", "signature", "isDRed"],
        CatalogKind::Column => &["index", "type", "size", "nullable", "inbytes"],
        CatalogKind::Index => &["unique", "assumeUnique", "expressionsjson", "predicatejson"],
        CatalogKind::ColumnRef => &["index", "column"],
        _ => &[],
    }
}

fn is_dr_table(catalog: &Catalog, table: NodeId) -> bool {
    catalog.field(table, "isDRed").as_bool().unwrap_or(false)
        && catalog.field(table, "materializer").is_null()
}

fn bool_field(catalog: &Catalog, node: NodeId, field: &str) -> bool {
    catalog.field(node, field).as_bool().expect("declared Bool field holds Bool")
}

/// The one cluster/database spine of a catalog, whatever it is named.
/// Catalogs hold a single cluster with a single database.
fn single_database(catalog: &Catalog) -> Option<NodeId> {
    let cluster = catalog.collection(catalog.root(), "clusters").next()?;
    catalog.collection(cluster, "databases").next()
}

/// Serialize the DR-relevant subset of a catalog as a command log,
/// replayable by [`Catalog::execute`] on the receiving cluster.
pub fn serialize_catalog_commands_for_dr(catalog: &Catalog) -> String {
    let mut writer = CommandWriter::new();
    let Some(cluster) = catalog.collection(catalog.root(), "clusters").next() else {
        return writer.finish();
    };
    writer.add(catalog.path(cluster), CatalogKind::Cluster);
    let Some(database) = catalog.collection(cluster, "databases").next() else {
        return writer.finish();
    };
    serialize_dr_node(catalog, database, &mut writer);

    for table in catalog.collection(database, "tables") {
        if !is_dr_table(catalog, table) {
            continue;
        }
        serialize_dr_node(catalog, table, &mut writer);
        for column in catalog.collection(table, "columns") {
            serialize_dr_node(catalog, column, &mut writer);
        }
        // Non-unique indexes are per-cluster tuning, not part of the
        // replication contract.
        for index in catalog.collection(table, "indexes") {
            if !bool_field(catalog, index, "unique")
                && !bool_field(catalog, index, "assumeUnique")
            {
                continue;
            }
            serialize_dr_node(catalog, index, &mut writer);
            for column_ref in catalog.collection(index, "columns") {
                serialize_dr_node(catalog, column_ref, &mut writer);
            }
        }
    }
    writer.finish()
}

fn serialize_dr_node(catalog: &Catalog, node: NodeId, writer: &mut CommandWriter) {
    let kind = catalog.kind(node);
    let path = catalog.path(node);
    writer.add(path, kind);
    for field in dr_fields(kind) {
        writer.set(path, field, catalog.field(node, field));
    }
}

/// Outcome of a master/replica schema comparison.
#[derive(Debug, Default)]
pub struct DrCompatibility {
    replicable: BTreeSet<String>,
    incompatibilities: Vec<(String, String)>,
}

impl DrCompatibility {
    /// Tables that are present, DR-enabled, and structurally identical on
    /// both clusters.
    pub fn replicable_tables(&self) -> &BTreeSet<String> {
        &self.replicable
    }

    /// `(tableName, message)` for every table that cannot replicate.
    pub fn incompatibilities(&self) -> &[(String, String)] {
        &self.incompatibilities
    }

    fn fail(&mut self, table: &str, message: String) {
        debug!(table, %message, "DR incompatibility");
        self.replicable.remove(table);
        self.incompatibilities.push((table.to_owned(), message));
    }
}

/// Compare the master's DR contract against the replica's.
///
/// Both inputs are full catalogs; each is reduced to its DR subset first,
/// so local-only schema (non-DR tables, views, non-unique indexes) never
/// produces a mismatch.
pub fn compare_dr_catalogs(master: &Catalog, replica: &Catalog) -> DrCompatibility {
    let replica_full = replica;
    let master = filtered(master);
    let replica = filtered(replica);
    let mut out = DrCompatibility::default();

    let (Some(master_db), Some(replica_db)) =
        (single_database(&master), single_database(&replica))
    else {
        return out;
    };

    let master_tables = dr_tables(&master, master_db);
    let replica_tables = dr_tables(&replica, replica_db);

    // A DR mode mismatch poisons every table on both sides.
    if master.field(master_db, "isActiveActiveDRed")
        != replica.field(replica_db, "isActiveActiveDRed")
    {
        let mut names: BTreeSet<&String> = master_tables.keys().collect();
        names.extend(replica_tables.keys());
        for name in names {
            out.fail(name, "Incompatible DR modes between two clusters".to_owned());
        }
        return out;
    }

    for (name, &master_table) in &master_tables {
        let Some(&replica_table) = replica_tables.get(name) else {
            // Filtering removed the table, so ask the unfiltered replica
            // whether it exists at all or merely is not DR-enabled.
            let exists = single_database(replica_full)
                .and_then(|db| replica_full.child(db, "tables", name))
                .is_some();
            let message = if exists {
                format!(
                    "Table {name} has DR enabled on the master cluster but not on the replica"
                )
            } else {
                format!("Missing DR table {name} on replica cluster")
            };
            out.fail(name, message);
            continue;
        };
        out.replicable.insert(name.clone());
        compare_dr_tables(&master, &replica, master_table, replica_table, name, &mut out);
    }
    for name in replica_tables.keys() {
        if !master_tables.contains_key(name) {
            out.fail(name, format!("Missing DR table {name} on master cluster"));
        }
    }
    out
}

fn filtered(catalog: &Catalog) -> Catalog {
    let commands = serialize_catalog_commands_for_dr(catalog);
    Catalog::from_commands(&commands).expect("DR serialization must replay cleanly")
}

fn dr_tables(catalog: &Catalog, database: NodeId) -> BTreeMap<String, NodeId> {
    catalog
        .collection(database, "tables")
        .filter(|&t| catalog.field(t, "isDRed").as_bool().unwrap_or(false))
        .map(|t| (catalog.name(t).to_owned(), t))
        .collect()
}

/// Structural comparison of one DR table pair; every mismatch is reported
/// against the owning table.
fn compare_dr_tables(
    master: &Catalog,
    replica: &Catalog,
    master_node: NodeId,
    replica_node: NodeId,
    table: &str,
    out: &mut DrCompatibility,
) {
    let kind = master.kind(master_node);
    let name = master.name(master_node);
    for field in dr_fields(kind) {
        if !dr_field_values_match(master, replica, master_node, replica_node, field) {
            out.fail(
                table,
                format!("field {field} in schema object {kind}{{{name}}}"),
            );
        }
    }
    for collection in master.collections(master_node) {
        let master_children: BTreeMap<String, NodeId> = master
            .collection(master_node, collection.name)
            .map(|c| (master.name(c).to_ascii_lowercase(), c))
            .collect();
        let replica_children: BTreeMap<String, NodeId> = replica
            .collection(replica_node, collection.name)
            .map(|c| (replica.name(c).to_ascii_lowercase(), c))
            .collect();
        for (key, &master_child) in &master_children {
            match replica_children.get(key) {
                Some(&replica_child) => compare_dr_tables(
                    master,
                    replica,
                    master_child,
                    replica_child,
                    table,
                    out,
                ),
                None => out.fail(
                    table,
                    format!(
                        "Missing {}{{{}}} from Table{{{table}}} on replica",
                        master.kind(master_child),
                        master.name(master_child)
                    ),
                ),
            }
        }
        for (key, &replica_child) in &replica_children {
            if !master_children.contains_key(key) {
                out.fail(
                    table,
                    format!(
                        "Missing {}{{{}}} from Table{{{table}}} on master",
                        replica.kind(replica_child),
                        replica.name(replica_child)
                    ),
                );
            }
        }
    }
}

/// Reference fields compare by path; everything else by value.
fn dr_field_values_match(
    master: &Catalog,
    replica: &Catalog,
    master_node: NodeId,
    replica_node: NodeId,
    field: &str,
) -> bool {
    let a = master.field(master_node, field);
    let b = replica.field(replica_node, field);
    match (a, b) {
        (FieldValue::Ref(p), FieldValue::Ref(q)) => p == q,
        _ => a == b,
    }
}
