//! Memoizing path resolution.
//!
//! Reference fields hold path strings, resolved lazily when two references
//! are compared. Resolution recurses through the parent path, so ancestor
//! paths (`/clusters#cluster/databases#database/tables#T1`, ...) are looked
//! up over and over during a walk; the resolver memoizes those. Leaf paths
//! resolve once per run, so the cache is capped rather than unbounded.
//!
//! A resolver instance is scoped to one catalog for one diff run and must
//! not be shared across runs (the cache holds `NodeId`s into that arena).

use crate::catalog::{Catalog, split_path};
use indextree::NodeId;
use std::cell::RefCell;
use std::collections::HashMap;

/// Shallow ancestor paths dominate lookups; past this many entries the
/// cache stops growing and deeper paths resolve straight from the tree.
const CACHE_CAP: usize = 1024;

pub struct PathResolver<'a> {
    catalog: &'a Catalog,
    cache: RefCell<HashMap<String, NodeId>>,
}

impl<'a> PathResolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        PathResolver { catalog, cache: RefCell::new(HashMap::new()) }
    }

    /// Resolve a path to a node, or `None` when any segment is absent.
    pub fn resolve(&self, path: &str) -> Option<NodeId> {
        if path.is_empty() {
            return Some(self.catalog.root());
        }
        if let Some(&hit) = self.cache.borrow().get(path) {
            return Some(hit);
        }
        let (parent_path, collection, name) = split_path(path)?;
        let parent = self.resolve(parent_path)?;
        let node = self.catalog.child(parent, collection, name)?;
        let mut cache = self.cache.borrow_mut();
        if cache.len() < CACHE_CAP {
            cache.insert(path.to_owned(), node);
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_through_memoized_ancestors() {
        let mut cat = Catalog::new();
        let cluster = cat.add_child(cat.root(), "clusters", "cluster").unwrap();
        let db = cat.add_child(cluster, "databases", "database").unwrap();
        let t = cat.add_child(db, "tables", "T1").unwrap();
        let c1 = cat.add_child(t, "columns", "C1").unwrap();
        let c2 = cat.add_child(t, "columns", "C2").unwrap();

        let resolver = PathResolver::new(&cat);
        assert_eq!(resolver.resolve(cat.path(c1)), Some(c1));
        // Second lookup under the same (now cached) table path.
        assert_eq!(resolver.resolve(cat.path(c2)), Some(c2));
        assert_eq!(resolver.resolve("/clusters#cluster/databases#database/tables#T2"), None);
        assert_eq!(resolver.resolve(""), Some(cat.root()));
    }
}
