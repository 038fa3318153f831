//! The catalog command log: a line-oriented grammar of node creations,
//! field writes, and deletions.
//!
//! ```text
//! add <path> <kind>
//! set <path|$PREV> <field> <value>
//! delete <parentPath> <collectionName> <childName>
//! ```
//!
//! `$PREV` names the node targeted by the immediately preceding command
//! (including an `add`) — a pure size optimization; the parser accepts both
//! spellings symmetrically. This grammar is a persisted, transmitted format
//! (catalog exchange between clusters), so writer and parser must stay in
//! exact agreement.

use crate::catalog::Catalog;
use crate::kind::CatalogKind;
use crate::value::FieldValue;
use core::fmt;
use std::fmt::Write;
use thiserror::Error;

/// The literal token standing in for "same node as the previous command".
pub const PREV_TOKEN: &str = "$PREV";

/// Target of a `set` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetTarget {
    Path(String),
    Prev,
}

/// One parsed command line. Field values stay raw here: their declared type
/// is only known once the target node is resolved at execution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add { path: String, kind: CatalogKind },
    Set { target: SetTarget, field: String, value: String },
    Delete { parent_path: String, collection: String, name: String },
}

#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error("malformed command: {line:?}")]
    Malformed { line: String },

    #[error("unknown catalog object kind in command: {line:?}")]
    UnknownKind { line: String },
}

impl Command {
    /// Parse one non-empty command line.
    pub fn parse(line: &str) -> Result<Command, CommandParseError> {
        let malformed = || CommandParseError::Malformed { line: line.to_owned() };
        let (verb, rest) = line.split_once(' ').ok_or_else(malformed)?;
        match verb {
            "add" => {
                let (path, kind_token) = rest.rsplit_once(' ').ok_or_else(malformed)?;
                let kind = CatalogKind::parse(kind_token)
                    .ok_or(CommandParseError::UnknownKind { line: line.to_owned() })?;
                Ok(Command::Add { path: path.to_owned(), kind })
            }
            "set" => {
                let (target_token, rest) = rest.split_once(' ').ok_or_else(malformed)?;
                // The value is the remainder of the line: quoted strings
                // may contain spaces.
                let (field, value) = rest.split_once(' ').ok_or_else(malformed)?;
                let target = if target_token == PREV_TOKEN {
                    SetTarget::Prev
                } else {
                    SetTarget::Path(target_token.to_owned())
                };
                Ok(Command::Set {
                    target,
                    field: field.to_owned(),
                    value: value.to_owned(),
                })
            }
            "delete" => {
                let mut parts = rest.split(' ');
                match (parts.next(), parts.next(), parts.next(), parts.next()) {
                    (Some(parent), Some(collection), Some(name), None) => Ok(Command::Delete {
                        parent_path: parent.to_owned(),
                        collection: collection.to_owned(),
                        name: name.to_owned(),
                    }),
                    _ => Err(malformed()),
                }
            }
            _ => Err(malformed()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Add { path, kind } => write!(f, "add {path} {kind}"),
            Command::Set { target, field, value } => {
                let target = match target {
                    SetTarget::Prev => PREV_TOKEN,
                    SetTarget::Path(p) => p.as_str(),
                };
                write!(f, "set {target} {field} {value}")
            }
            Command::Delete { parent_path, collection, name } => {
                write!(f, "delete {parent_path} {collection} {name}")
            }
        }
    }
}

/// Append-only command buffer with `$PREV` compression.
#[derive(Default)]
pub struct CommandWriter {
    buf: String,
    /// Path of the node the previous command targeted, if any.
    prev_target: Option<String>,
}

impl CommandWriter {
    pub fn new() -> CommandWriter {
        CommandWriter::default()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn finish(self) -> String {
        self.buf
    }

    pub fn add(&mut self, path: &str, kind: CatalogKind) {
        writeln!(self.buf, "add {path} {kind}").expect("string write");
        self.prev_target = Some(path.to_owned());
    }

    pub fn set(&mut self, path: &str, field: &str, value: &FieldValue) {
        if self.prev_target.as_deref() == Some(path) {
            writeln!(self.buf, "set {PREV_TOKEN} {field} {value}").expect("string write");
        } else {
            writeln!(self.buf, "set {path} {field} {value}").expect("string write");
            self.prev_target = Some(path.to_owned());
        }
    }

    pub fn delete(&mut self, parent_path: &str, collection: &str, name: &str) {
        writeln!(self.buf, "delete {parent_path} {collection} {name}").expect("string write");
        self.prev_target = None;
    }
}

impl Catalog {
    /// Canonical full serialization: a command log that recreates this
    /// catalog when executed against an empty one. Node order is the
    /// canonical walk order, so two equal catalogs serialize identically —
    /// the equality test used throughout.
    pub fn serialize(&self) -> String {
        let mut writer = CommandWriter::new();
        for node in self.walk() {
            self.serialize_node(node, &mut writer);
        }
        writer.finish()
    }

    /// Serialize one node and all of its descendants, in canonical order.
    /// Used for whole-subtree additions in diff output.
    pub fn serialize_subtree(&self, id: indextree::NodeId, writer: &mut CommandWriter) {
        for node in self.walk_subtree(id) {
            self.serialize_node(node, writer);
        }
    }

    fn serialize_node(&self, node: indextree::NodeId, writer: &mut CommandWriter) {
        let path = self.path(node).to_owned();
        writer.add(&path, self.kind(node));
        for (spec, value) in self.fields(node) {
            if !spec.runtime_only {
                writer.set(&path, spec.name, value);
            }
        }
    }
}
