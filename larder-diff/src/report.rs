//! Bucketed change classification for human-readable summaries.

use larder::{Catalog, CatalogKind, NodeId};
use std::collections::BTreeSet;
use std::fmt::Write;

/// Top-level bucket a change is reported under: the database-level object
/// whose subtree the changed node lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiffClass {
    Table,
    Procedure,
    User,
    Group,
    Connector,
    Function,
    Schedule,
    Other,
}

impl DiffClass {
    fn plural(self) -> &'static str {
        match self {
            DiffClass::Table => "tables",
            DiffClass::Procedure => "procedures",
            DiffClass::User => "users",
            DiffClass::Group => "groups",
            DiffClass::Connector => "connectors",
            DiffClass::Function => "functions",
            DiffClass::Schedule => "snapshot schedules",
            DiffClass::Other => "other objects",
        }
    }

    /// Classify a node by itself or its nearest database-level ancestor.
    pub fn of(catalog: &Catalog, node: NodeId) -> DiffClass {
        let mut current = Some(node);
        while let Some(n) = current {
            match catalog.kind(n) {
                CatalogKind::Table => return DiffClass::Table,
                CatalogKind::Procedure => return DiffClass::Procedure,
                CatalogKind::User => return DiffClass::User,
                CatalogKind::Group => return DiffClass::Group,
                CatalogKind::Connector => return DiffClass::Connector,
                CatalogKind::Function => return DiffClass::Function,
                CatalogKind::SnapshotSchedule => return DiffClass::Schedule,
                _ => current = catalog.parent(n),
            }
        }
        DiffClass::Other
    }
}

/// One added or removed node, by copied identity (no tree references).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub class: DiffClass,
    pub kind: CatalogKind,
    pub name: String,
    pub path: String,
}

/// One modified node with the set of fields that changed on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifiedRecord {
    pub class: DiffClass,
    pub kind: CatalogKind,
    pub name: String,
    pub path: String,
    pub fields: BTreeSet<String>,
}

/// All recorded changes of one diff run.
#[derive(Debug, Default)]
pub struct ChangeSet {
    added: Vec<ChangeRecord>,
    removed: Vec<ChangeRecord>,
    modified: Vec<ModifiedRecord>,
}

impl ChangeSet {
    pub(crate) fn record_added(&mut self, catalog: &Catalog, node: NodeId) {
        self.added.push(record(catalog, node));
    }

    pub(crate) fn record_removed(&mut self, catalog: &Catalog, node: NodeId) {
        self.removed.push(record(catalog, node));
    }

    pub(crate) fn record_modified(&mut self, catalog: &Catalog, node: NodeId, field: &str) {
        let path = catalog.path(node);
        if let Some(existing) = self.modified.iter_mut().find(|m| m.path == path) {
            existing.fields.insert(field.to_owned());
            return;
        }
        self.modified.push(ModifiedRecord {
            class: DiffClass::of(catalog, node),
            kind: catalog.kind(node),
            name: catalog.name(node).to_owned(),
            path: path.to_owned(),
            fields: BTreeSet::from([field.to_owned()]),
        });
    }

    pub fn added(&self) -> &[ChangeRecord] {
        &self.added
    }

    pub fn removed(&self) -> &[ChangeRecord] {
        &self.removed
    }

    pub fn modified(&self) -> &[ModifiedRecord] {
        &self.modified
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    pub(crate) fn describe(&self, was_code_updated: bool) -> String {
        let mut out = String::new();
        if self.is_empty() && !was_code_updated {
            return "No schema changes detected.\n".to_owned();
        }
        let classes = [
            DiffClass::Table,
            DiffClass::Procedure,
            DiffClass::User,
            DiffClass::Group,
            DiffClass::Connector,
            DiffClass::Function,
            DiffClass::Schedule,
            DiffClass::Other,
        ];
        for class in classes {
            describe_names(&mut out, "Added", class, names(&self.added, class));
            describe_names(&mut out, "Removed", class, names(&self.removed, class));
            let modified: Vec<String> = self
                .modified
                .iter()
                .filter(|m| m.class == class)
                .map(|m| {
                    let fields: Vec<&str> = m.fields.iter().map(String::as_str).collect();
                    format!("{} ({})", m.name, fields.join(", "))
                })
                .collect();
            describe_names(&mut out, "Modified", class, modified);
        }
        if was_code_updated {
            out.push_str("Application code has been updated; procedures will be reloaded.\n");
        }
        out
    }
}

fn record(catalog: &Catalog, node: NodeId) -> ChangeRecord {
    ChangeRecord {
        class: DiffClass::of(catalog, node),
        kind: catalog.kind(node),
        name: catalog.name(node).to_owned(),
        path: catalog.path(node).to_owned(),
    }
}

fn names(records: &[ChangeRecord], class: DiffClass) -> Vec<String> {
    records
        .iter()
        .filter(|r| r.class == class)
        .map(|r| r.name.clone())
        .collect()
}

fn describe_names(out: &mut String, verb: &str, class: DiffClass, names: Vec<String>) {
    if names.is_empty() {
        return;
    }
    writeln!(out, "{verb} {}: {}", class.plural(), names.join(", ")).expect("string write");
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder::Catalog;

    #[test]
    fn classification_walks_up_to_the_database_level_object() {
        let mut cat = Catalog::new();
        let cluster = cat.add_child(cat.root(), "clusters", "cluster").unwrap();
        let db = cat.add_child(cluster, "databases", "database").unwrap();
        let t = cat.add_child(db, "tables", "T1").unwrap();
        let c = cat.add_child(t, "columns", "C1").unwrap();
        let p = cat.add_child(db, "procedures", "P1").unwrap();
        let s = cat.add_child(p, "statements", "S1").unwrap();
        assert_eq!(DiffClass::of(&cat, c), DiffClass::Table);
        assert_eq!(DiffClass::of(&cat, s), DiffClass::Procedure);
        assert_eq!(DiffClass::of(&cat, db), DiffClass::Other);
    }

    #[test]
    fn modifications_merge_per_node() {
        let mut cat = Catalog::new();
        let cluster = cat.add_child(cat.root(), "clusters", "cluster").unwrap();
        let db = cat.add_child(cluster, "databases", "database").unwrap();
        let t = cat.add_child(db, "tables", "T1").unwrap();
        let mut set = ChangeSet::default();
        set.record_modified(&cat, t, "signature");
        set.record_modified(&cat, t, "tuplelimit");
        assert_eq!(set.modified().len(), 1);
        let report = set.describe(false);
        assert!(report.contains("Modified tables: T1 (signature, tuplelimit)"), "{report}");
    }
}
