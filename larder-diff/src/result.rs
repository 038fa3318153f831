//! The outcome of one diff run.
//!
//! A [`DiffResult`] is built up during the walk through the crate-private
//! [`DiffBuild`] accumulator and frozen on return. It owns everything it
//! reports (paths, names, messages as strings), holding no references into
//! either input tree.

use crate::report::ChangeSet;
use larder::CommandWriter;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// What kind of care the apply side must take with an accepted command log.
/// Monotonic for the run: once a flag is raised it stays raised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideEffectFlags {
    /// Some change touches persisted rows of a table; applying it must not
    /// overlap a storage snapshot.
    pub requires_snapshot_isolation: bool,
    /// A stream-backed table or connector changed; downstream export
    /// consumers need a new generation boundary.
    pub requires_new_export_generation: bool,
    /// The storage engine must see this diff, not just the coordinator.
    pub requires_engine_visible_apply: bool,
}

/// "This change is possible iff at least one of `tables` is empty at
/// apply time."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyTableRequirement {
    pub tables: BTreeSet<String>,
    pub message: String,
}

impl EmptyTableRequirement {
    /// Display label for the table set: names joined with `+`.
    pub fn label(&self) -> String {
        self.tables.iter().map(String::as_str).collect::<Vec<_>>().join("+")
    }
}

/// Immutable result of `diff(prev, next)`.
#[derive(Debug)]
pub struct DiffResult {
    command_text: String,
    supported: bool,
    errors: String,
    requirements: BTreeMap<String, EmptyTableRequirement>,
    flags: SideEffectFlags,
    changes: ChangeSet,
}

impl DiffResult {
    /// The full command log, including commands for rejected changes
    /// (recorded for audit and comparison even when not applicable).
    pub fn command_text(&self) -> &str {
        &self.command_text
    }

    /// False iff at least one change was rejected unconditionally.
    pub fn supported(&self) -> bool {
        self.supported
    }

    /// Accumulated rejection messages, one per line.
    pub fn errors(&self) -> &str {
        &self.errors
    }

    /// Data-state preconditions: `(tableSetLabel, message)` pairs, where
    /// each change behind a pair is possible iff at least one table of the
    /// labelled set is empty.
    pub fn tables_that_must_be_empty(&self) -> Vec<(String, String)> {
        self.requirements
            .values()
            .map(|r| (r.label(), r.message.clone()))
            .collect()
    }

    pub fn side_effect_flags(&self) -> SideEffectFlags {
        self.flags
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    /// Human-readable per-kind summary of the diff.
    pub fn describe_changes(&self, was_code_updated: bool) -> String {
        self.changes.describe(was_code_updated)
    }
}

/// Mutable accumulator threaded through one walk.
#[derive(Default)]
pub(crate) struct DiffBuild {
    pub(crate) writer: CommandWriter,
    supported: bool,
    errors: String,
    requirements: BTreeMap<String, EmptyTableRequirement>,
    pub(crate) flags: SideEffectFlags,
    pub(crate) changes: ChangeSet,
}

impl DiffBuild {
    pub(crate) fn new() -> DiffBuild {
        DiffBuild { supported: true, ..Default::default() }
    }

    /// An unconditional rejection: flips `supported` and logs the message.
    pub(crate) fn reject(&mut self, message: String) {
        debug!(%message, "change rejected");
        self.supported = false;
        self.errors.push_str(&message);
        self.errors.push('\n');
    }

    /// A conditional rejection: merge the requirement by its table-set
    /// label, unioning tables and concatenating messages.
    pub(crate) fn require_empty(&mut self, requirement: EmptyTableRequirement) {
        debug!(tables = %requirement.label(), message = %requirement.message,
               "change requires empty table");
        let key = requirement.label();
        self.requirements
            .entry(key)
            .and_modify(|existing| {
                existing.tables.extend(requirement.tables.iter().cloned());
                existing.message.push('\n');
                existing.message.push_str(&requirement.message);
            })
            .or_insert(requirement);
    }

    pub(crate) fn freeze(self) -> DiffResult {
        DiffResult {
            command_text: self.writer.finish(),
            supported: self.supported,
            errors: self.errors,
            requirements: self.requirements,
            flags: self.flags,
            changes: self.changes,
        }
    }
}
