//! The lock-step diff walk.
//!
//! Both trees are walked in the same canonical order (declared field
//! order, declared collection order, lexicographic child-name order), so
//! the emitted command log is byte-for-byte reproducible. Every discovered
//! difference is recorded in the command log unconditionally and routed
//! through the admissibility policy, whose verdict lands in the result as
//! flags, preconditions, or error text rather than as control flow.

use crate::policy::{
    self, check_add_drop, check_add_drop_if_table_empty, check_modify,
    check_modify_if_table_empty, ChangeDirection,
};
use crate::result::{DiffBuild, DiffResult};
use larder::{Catalog, CatalogKind, FieldType, NodeId, PathResolver};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Immutable per-recursion state, copied down the call stack.
#[derive(Debug, Clone, Copy, Default)]
struct WalkContext {
    /// Set while inside a materialized view's subtree: the view's column
    /// shape is derived from its defining query, never edited live, so
    /// structural column changes are rejected outright.
    strict_matview: bool,
}

/// Compute the command log transforming `prev` into `next`, with an
/// admissibility verdict for every difference.
///
/// Both trees must share the schema-of-schema; a kind mismatch at a
/// matched path or an unresolvable reference field panics, since either
/// means a corrupt input rather than a schema difference.
pub fn diff(prev: &Catalog, next: &Catalog) -> DiffResult {
    let mut build = DiffBuild::new();
    let walk = Walk {
        prev,
        next,
        prev_refs: PathResolver::new(prev),
        next_refs: PathResolver::new(next),
    };
    walk.diff_recursively(prev.root(), next.root(), WalkContext::default(), &mut build);
    let result = build.freeze();
    debug!(
        supported = result.supported(),
        commands = result.command_text().lines().count(),
        "diff complete"
    );
    result
}

struct Walk<'a> {
    prev: &'a Catalog,
    next: &'a Catalog,
    prev_refs: PathResolver<'a>,
    next_refs: PathResolver<'a>,
}

impl Walk<'_> {
    fn diff_recursively(
        &self,
        prev_node: NodeId,
        next_node: NodeId,
        ctx: WalkContext,
        build: &mut DiffBuild,
    ) {
        let kind = self.prev.kind(prev_node);
        assert_eq!(
            kind,
            self.next.kind(next_node),
            "kind mismatch at {}",
            self.prev.path(prev_node)
        );
        trace!(path = self.prev.path(prev_node), %kind, "diffing node");

        let mut ctx = ctx;
        if kind == CatalogKind::Table
            && !self.prev.field(prev_node, "materializer").is_null()
        {
            ctx.strict_matview = true;
        }

        for (spec, prev_value) in self.prev.fields(prev_node) {
            if spec.runtime_only {
                continue;
            }
            let next_value = self.next.field(next_node, spec.name);
            let equal = if spec.ty == FieldType::Ref {
                // References compare by resolved path, not node identity;
                // resolution failure means a corrupt tree.
                let prev_path = prev_value.as_ref_path().map(|p| {
                    self.prev_refs.resolve(p).unwrap_or_else(|| {
                        panic!("dangling reference {p:?} in previous catalog")
                    });
                    p
                });
                let next_path = next_value.as_ref_path().map(|p| {
                    self.next_refs.resolve(p).unwrap_or_else(|| {
                        panic!("dangling reference {p:?} in next catalog")
                    });
                    p
                });
                prev_path == next_path
            } else {
                prev_value == next_value
            };
            if !equal {
                self.write_modification(prev_node, next_node, spec.name, ctx, build);
            }
        }

        for collection in self.prev.collections(prev_node) {
            let prev_children = children_by_key(self.prev, prev_node, collection.name);
            let next_children = children_by_key(self.next, next_node, collection.name);

            for (key, &prev_child) in &prev_children {
                match next_children.get(key) {
                    Some(&next_child) => {
                        self.diff_recursively(prev_child, next_child, ctx, build)
                    }
                    None => self.write_deletion(
                        prev_child,
                        next_node,
                        collection.name,
                        ctx,
                        build,
                    ),
                }
            }
            for (key, &next_child) in &next_children {
                if !prev_children.contains_key(key) {
                    self.write_addition(next_child, ctx, build);
                }
            }
        }
    }

    fn write_modification(
        &self,
        prev_node: NodeId,
        next_node: NodeId,
        field: &str,
        ctx: WalkContext,
        build: &mut DiffBuild,
    ) {
        let kind = self.next.kind(next_node);
        debug!(path = self.next.path(next_node), field, "field modified");

        if ctx.strict_matview && kind == CatalogKind::Column {
            build.reject(format!(
                "may not modify column {} of a materialized view",
                self.next.name(next_node)
            ));
        } else if let Some(message) =
            check_modify(self.prev, self.next, prev_node, next_node, field)
        {
            let requirements = check_modify_if_table_empty(self.next, next_node, field);
            if requirements.is_empty() {
                build.reject(message);
            } else {
                for requirement in requirements {
                    build.require_empty(requirement);
                }
            }
        }

        build.writer.set(
            self.next.path(next_node),
            field,
            self.next.field(next_node, field),
        );
        self.update_flags(self.next, next_node, build);
        if !(kind == CatalogKind::Database && field == "schema") {
            // The schema blob changes on every DDL; recording it would
            // drown the report.
            build.changes.record_modified(self.next, next_node, field);
        }
    }

    fn write_deletion(
        &self,
        prev_node: NodeId,
        next_parent: NodeId,
        collection: &str,
        ctx: WalkContext,
        build: &mut DiffBuild,
    ) {
        debug!(path = self.prev.path(prev_node), "node deleted");

        if ctx.strict_matview && self.prev.kind(prev_node) == CatalogKind::Column {
            build.reject(format!(
                "may not drop column {} of a materialized view",
                self.prev.name(prev_node)
            ));
        } else if let Some(message) = check_add_drop(
            self.prev,
            prev_node,
            ChangeDirection::Deletion,
            self.next,
            Some(next_parent),
        ) {
            let requirements =
                check_add_drop_if_table_empty(self.prev, prev_node, ChangeDirection::Deletion);
            if requirements.is_empty() {
                build.reject(message);
            } else {
                for requirement in requirements {
                    build.require_empty(requirement);
                }
            }
        }

        build.writer.delete(
            self.next.path(next_parent),
            collection,
            self.prev.name(prev_node),
        );
        self.update_flags(self.prev, prev_node, build);
        self.update_export_flag_for_table(self.prev, prev_node, build);
        build.changes.record_removed(self.prev, prev_node);
    }

    fn write_addition(&self, next_node: NodeId, ctx: WalkContext, build: &mut DiffBuild) {
        debug!(path = self.next.path(next_node), "node added");

        if ctx.strict_matview && self.next.kind(next_node) == CatalogKind::Column {
            build.reject(format!(
                "may not add column {} to a materialized view",
                self.next.name(next_node)
            ));
        } else {
            self.check_addition(next_node, build);
        }

        // An added parent implies its whole subtree, checked once on the
        // subtree root — except for multi-source views riding inside a new
        // table: their source tables pre-exist the addition and may hold
        // rows, so the view-add rules run on them as well. Views on the
        // new table itself need no check, the new table has no rows yet.
        if self.next.kind(next_node) == CatalogKind::Table {
            for handler in self.next.collection(next_node, "mvHandlerInfo") {
                self.check_addition(handler, build);
            }
        }

        self.next.serialize_subtree(next_node, &mut build.writer);
        self.update_flags(self.next, next_node, build);
        self.update_export_flag_for_table(self.next, next_node, build);
        build.changes.record_added(self.next, next_node);
    }

    /// Admissibility of one added node, with the empty-table downgrade.
    fn check_addition(&self, node: NodeId, build: &mut DiffBuild) {
        if let Some(message) = check_add_drop(
            self.next,
            node,
            ChangeDirection::Addition,
            self.next,
            self.next.parent(node),
        ) {
            let requirements =
                check_add_drop_if_table_empty(self.next, node, ChangeDirection::Addition);
            if requirements.is_empty() {
                build.reject(message);
            } else {
                for requirement in requirements {
                    build.require_empty(requirement);
                }
            }
        }
    }

    /// Raise the coarse flags a recorded change implies.
    fn update_flags(&self, catalog: &Catalog, node: NodeId, build: &mut DiffBuild) {
        if let Some(table) = policy::owning_table(catalog, node) {
            if !policy::table_type(catalog, table).is_stream() {
                build.flags.requires_snapshot_isolation = true;
            }
        }
        if policy::should_apply_to_engine(catalog, node) {
            build.flags.requires_engine_visible_apply = true;
        }
        if catalog.kind(node) == CatalogKind::Connector
            || catalog.ancestor_of_kind(node, CatalogKind::Connector).is_some()
        {
            build.flags.requires_new_export_generation = true;
        }
    }

    /// Adding or dropping a stream-backed table opens a new export
    /// generation.
    fn update_export_flag_for_table(
        &self,
        catalog: &Catalog,
        node: NodeId,
        build: &mut DiffBuild,
    ) {
        if catalog.kind(node) == CatalogKind::Table
            && policy::table_type(catalog, node).is_stream()
        {
            build.flags.requires_new_export_generation = true;
        }
    }
}

/// Children of one collection keyed by lowercased name; `BTreeMap` keeps
/// the canonical lexicographic order for both passes of the collection
/// diff.
fn children_by_key(
    catalog: &Catalog,
    parent: NodeId,
    collection: &str,
) -> BTreeMap<String, NodeId> {
    catalog
        .collection(parent, collection)
        .map(|child| (catalog.name(child).to_ascii_lowercase(), child))
        .collect()
}
