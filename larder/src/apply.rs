//! Replaying command logs against a live catalog.

use crate::catalog::{split_path, Catalog};
use crate::command::{Command, SetTarget};
use crate::value::FieldValue;
use indextree::NodeId;
use thiserror::Error;
use tracing::trace;

/// An execution failure always carries the full offending command line:
/// these logs travel between processes and clusters, and "which line broke"
/// is the first question every caller asks.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("invalid catalog command: {line:?}")]
    Malformed { line: String },

    #[error("failed to execute command {line:?}: {reason}")]
    Failed { line: String, reason: String },
}

impl Catalog {
    /// Build a catalog from scratch by executing a command log.
    pub fn from_commands(commands: &str) -> Result<Catalog, ExecuteError> {
        let mut catalog = Catalog::new();
        catalog.execute(commands)?;
        Ok(catalog)
    }

    /// Execute a command log against this catalog, one line at a time.
    /// Empty lines are skipped. Execution stops at the first failing
    /// command, leaving every previous command applied.
    pub fn execute(&mut self, commands: &str) -> Result<(), ExecuteError> {
        let mut prev: Option<NodeId> = None;
        for raw in commands.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            prev = self.execute_one(line, prev)?;
        }
        Ok(())
    }

    fn execute_one(
        &mut self,
        line: &str,
        prev: Option<NodeId>,
    ) -> Result<Option<NodeId>, ExecuteError> {
        let failed = |reason: String| ExecuteError::Failed { line: line.to_owned(), reason };
        let command = Command::parse(line)
            .map_err(|_| ExecuteError::Malformed { line: line.to_owned() })?;
        trace!(%command, "executing catalog command");
        match command {
            Command::Add { path, kind } => {
                let (parent_path, collection, name) = split_path(&path)
                    .ok_or_else(|| failed(format!("{path:?} is not a child path")))?;
                let parent = self
                    .resolve(parent_path)
                    .ok_or_else(|| failed(format!("no catalog node at {parent_path:?}")))?;
                let spec = self
                    .kind(parent)
                    .collection(collection)
                    .ok_or_else(|| {
                        failed(format!(
                            "{} has no collection named {collection:?}",
                            self.kind(parent)
                        ))
                    })?;
                if spec.child != kind {
                    return Err(failed(format!(
                        "collection {collection:?} holds {}, not {kind}",
                        spec.child
                    )));
                }
                let child = self
                    .add_child(parent, collection, name)
                    .map_err(|e| failed(e.to_string()))?;
                Ok(Some(child))
            }
            Command::Set { target, field, value } => {
                let node = match target {
                    SetTarget::Prev => prev
                        .ok_or_else(|| failed("$PREV with no preceding target".to_owned()))?,
                    SetTarget::Path(path) => self
                        .resolve(&path)
                        .ok_or_else(|| failed(format!("no catalog node at {path:?}")))?,
                };
                let spec = self.kind(node).field(&field).ok_or_else(|| {
                    failed(format!("{} has no field named {field:?}", self.kind(node)))
                })?;
                let value = FieldValue::parse(spec.ty, &value)
                    .map_err(|e| failed(e.to_string()))?;
                self.set_field(node, &field, value)
                    .map_err(|e| failed(e.to_string()))?;
                Ok(Some(node))
            }
            Command::Delete { parent_path, collection, name } => {
                let parent = self
                    .resolve(&parent_path)
                    .ok_or_else(|| failed(format!("no catalog node at {parent_path:?}")))?;
                self.delete_child(parent, &collection, &name)
                    .map_err(|e| failed(e.to_string()))?;
                Ok(None)
            }
        }
    }
}
