//! The catalog tree: an arena of typed, named nodes with ordered,
//! case-insensitive child collections.
//!
//! Nodes live in an `indextree::Arena`; each node carries its kind, its
//! display name, its declared field values, and one ordered name→node map
//! per declared child collection. Collection keys are lowercased names, so
//! lookup is case-insensitive and iteration order is lexicographic — that
//! order is what makes diff output byte-for-byte reproducible.

use crate::kind::{CatalogKind, CollectionSpec, FieldSpec};
use crate::value::FieldValue;
use indextree::{Arena, NodeId};
use std::collections::BTreeMap;
use thiserror::Error;

/// Per-node payload stored in the arena.
#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    kind: CatalogKind,
    name: String,
    /// Full path from the root, computed once at insertion. Paths are the
    /// stable cross-tree identity key: equal path means same logical entity.
    path: String,
    /// Parallel to `kind.fields()`.
    fields: Vec<FieldValue>,
    /// Parallel to `kind.collections()`; keys are lowercased child names.
    collections: Vec<BTreeMap<String, NodeId>>,
}

/// Structural mutation errors. These surface through `Catalog::execute`
/// wrapped with the offending command text.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{parent} has no child collection named {collection:?}")]
    UnknownCollection { parent: CatalogKind, collection: String },

    #[error("{collection:?} already contains a child named {name:?}")]
    DuplicateChild { collection: String, name: String },

    #[error("{collection:?} has no child named {name:?}")]
    NoSuchChild { collection: String, name: String },

    #[error("{kind} has no field named {field:?}")]
    UnknownField { kind: CatalogKind, field: String },

    #[error("field {field:?} of {kind} cannot hold {value}")]
    FieldTypeMismatch { kind: CatalogKind, field: String, value: FieldValue },

    #[error("no node at path {path:?}")]
    NoSuchPath { path: String },
}

/// Split a path into its parent path and final `collection#name` segment.
///
/// Returns `None` for the root path or a malformed segment.
pub(crate) fn split_path(path: &str) -> Option<(&str, &str, &str)> {
    let slash = path.rfind('/')?;
    let (parent, segment) = (&path[..slash], &path[slash + 1..]);
    let (collection, name) = segment.split_once('#')?;
    if collection.is_empty() || name.is_empty() {
        return None;
    }
    Some((parent, collection, name))
}

/// An in-memory schema catalog.
#[derive(Debug)]
pub struct Catalog {
    arena: Arena<NodeData>,
    root: NodeId,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// Create an empty catalog holding only the root node.
    pub fn new() -> Catalog {
        let mut arena = Arena::new();
        let root = arena.new_node(NodeData {
            kind: CatalogKind::Catalog,
            name: "catalog".to_owned(),
            path: String::new(),
            fields: Vec::new(),
            collections: vec![BTreeMap::new(); CatalogKind::Catalog.collections().len()],
        });
        Catalog { arena, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn data(&self, id: NodeId) -> &NodeData {
        self.arena.get(id).expect("node must exist").get()
    }

    fn data_mut(&mut self, id: NodeId) -> &mut NodeData {
        self.arena.get_mut(id).expect("node must exist").get_mut()
    }

    pub fn kind(&self, id: NodeId) -> CatalogKind {
        self.data(id).kind
    }

    /// Display name (case-preserving).
    pub fn name(&self, id: NodeId) -> &str {
        &self.data(id).name
    }

    pub fn path(&self, id: NodeId) -> &str {
        &self.data(id).path
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena.get(id).and_then(|n| n.parent())
    }

    /// The nearest ancestor (not counting the node itself) of the given kind.
    pub fn ancestor_of_kind(&self, id: NodeId, kind: CatalogKind) -> Option<NodeId> {
        let mut current = self.parent(id);
        while let Some(node) = current {
            if self.kind(node) == kind {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    /// Declared fields paired with this node's values, in declared order.
    pub fn fields(&self, id: NodeId) -> impl Iterator<Item = (&'static FieldSpec, &FieldValue)> {
        let data = self.data(id);
        data.kind.fields().iter().zip(data.fields.iter())
    }

    /// Value of a declared field. Panics on an undeclared field name: that
    /// is a schema-of-schema mismatch, a version-skew bug upstream.
    pub fn field(&self, id: NodeId, field: &str) -> &FieldValue {
        let data = self.data(id);
        let idx = data
            .kind
            .fields()
            .iter()
            .position(|f| f.name == field)
            .unwrap_or_else(|| panic!("{} has no field {field:?}", data.kind));
        &data.fields[idx]
    }

    /// Set a declared field, checking the value against the declared type.
    pub fn set_field(
        &mut self,
        id: NodeId,
        field: &str,
        value: FieldValue,
    ) -> Result<(), CatalogError> {
        let data = self.data(id);
        let kind = data.kind;
        let Some(idx) = kind.fields().iter().position(|f| f.name == field) else {
            return Err(CatalogError::UnknownField { kind, field: field.to_owned() });
        };
        if !value.fits(kind.fields()[idx].ty) {
            return Err(CatalogError::FieldTypeMismatch { kind, field: field.to_owned(), value });
        }
        self.data_mut(id).fields[idx] = value;
        Ok(())
    }

    /// Declared child collections of a node, in declared order.
    pub fn collections(&self, id: NodeId) -> &'static [CollectionSpec] {
        self.kind(id).collections()
    }

    /// Children of one named collection, in lexicographic (lowercased) name
    /// order. Panics on an undeclared collection name.
    pub fn collection(&self, id: NodeId, collection: &str) -> impl Iterator<Item = NodeId> + '_ {
        self.collection_map(id, collection)
            .unwrap_or_else(|| {
                panic!("{} has no collection {collection:?}", self.kind(id))
            })
            .values()
            .copied()
    }

    fn collection_index(&self, id: NodeId, collection: &str) -> Option<usize> {
        self.kind(id)
            .collections()
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(collection))
    }

    fn collection_map(&self, id: NodeId, collection: &str) -> Option<&BTreeMap<String, NodeId>> {
        let idx = self.collection_index(id, collection)?;
        Some(&self.data(id).collections[idx])
    }

    /// Look up a child by name, case-insensitively.
    pub fn child(&self, id: NodeId, collection: &str, name: &str) -> Option<NodeId> {
        self.collection_map(id, collection)?
            .get(&name.to_ascii_lowercase())
            .copied()
    }

    /// Create a child node with default field values.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        collection: &str,
        name: &str,
    ) -> Result<NodeId, CatalogError> {
        let parent_kind = self.kind(parent);
        let Some(idx) = self.collection_index(parent, collection) else {
            return Err(CatalogError::UnknownCollection {
                parent: parent_kind,
                collection: collection.to_owned(),
            });
        };
        let spec = parent_kind.collections()[idx];
        let key = name.to_ascii_lowercase();
        if self.data(parent).collections[idx].contains_key(&key) {
            return Err(CatalogError::DuplicateChild {
                collection: spec.name.to_owned(),
                name: name.to_owned(),
            });
        }
        let path = format!("{}/{}#{}", self.data(parent).path, spec.name, name);
        let child = self.arena.new_node(NodeData {
            kind: spec.child,
            name: name.to_owned(),
            path,
            fields: spec
                .child
                .fields()
                .iter()
                .map(|f| FieldValue::default_for(f.ty))
                .collect(),
            collections: vec![BTreeMap::new(); spec.child.collections().len()],
        });
        parent.append(child, &mut self.arena);
        self.data_mut(parent).collections[idx].insert(key, child);
        Ok(child)
    }

    /// Delete a child and its whole subtree.
    pub fn delete_child(
        &mut self,
        parent: NodeId,
        collection: &str,
        name: &str,
    ) -> Result<(), CatalogError> {
        let Some(idx) = self.collection_index(parent, collection) else {
            return Err(CatalogError::UnknownCollection {
                parent: self.kind(parent),
                collection: collection.to_owned(),
            });
        };
        let key = name.to_ascii_lowercase();
        let Some(child) = self.data_mut(parent).collections[idx].remove(&key) else {
            return Err(CatalogError::NoSuchChild {
                collection: collection.to_owned(),
                name: name.to_owned(),
            });
        };
        child.remove_subtree(&mut self.arena);
        Ok(())
    }

    /// Resolve a path to a node, walking segment by segment.
    ///
    /// This is the plain, unmemoized resolution used by command execution;
    /// the diff engine layers a memoizing [`crate::resolver::PathResolver`]
    /// on top for reference-field comparison.
    pub fn resolve(&self, path: &str) -> Option<NodeId> {
        if path.is_empty() {
            return Some(self.root);
        }
        let mut node = self.root;
        for segment in path.strip_prefix('/')?.split('/') {
            let (collection, name) = segment.split_once('#')?;
            node = self.child(node, collection, name)?;
        }
        Some(node)
    }

    /// Depth-first, canonical-order walk of every node below (and
    /// excluding) the root.
    pub fn walk(&self) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack: Vec<NodeId> = self.children_in_order(self.root);
        stack.reverse();
        core::iter::from_fn(move || {
            let next = stack.pop()?;
            let mut children = self.children_in_order(next);
            children.reverse();
            stack.extend(children);
            Some(next)
        })
    }

    /// Like [`Catalog::walk`] but scoped to one node and its descendants,
    /// starting with the node itself.
    pub fn walk_subtree(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack: Vec<NodeId> = vec![id];
        core::iter::from_fn(move || {
            let next = stack.pop()?;
            let mut children = self.children_in_order(next);
            children.reverse();
            stack.extend(children);
            Some(next)
        })
    }

    /// All children of a node across its collections, in walk order:
    /// declared collection order, then lexicographic name order.
    pub fn children_in_order(&self, id: NodeId) -> Vec<NodeId> {
        let data = self.data(id);
        data.collections
            .iter()
            .flat_map(|m| m.values().copied())
            .collect()
    }
}
