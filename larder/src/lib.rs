//! An in-memory, tree-shaped schema catalog with a line-oriented command
//! log as its wire and storage format.
//!
//! A [`Catalog`] is a typed tree: every node has a [`CatalogKind`] drawn
//! from a closed schema-of-schema, declared fields with typed values, and
//! named child collections with case-insensitive, lexicographically ordered
//! membership. Catalogs are built and updated exclusively by executing
//! command logs (see [`Command`]), and [`Catalog::serialize`] dumps a
//! catalog back to the canonical log that recreates it.
//!
//! The companion `larder-diff` crate computes admissibility-checked diffs
//! between two catalogs as command logs in this grammar.

mod apply;
mod catalog;
mod command;
mod kind;
mod resolver;
mod value;

pub use apply::ExecuteError;
pub use catalog::{Catalog, CatalogError};
pub use command::{Command, CommandParseError, CommandWriter, SetTarget, PREV_TOKEN};
pub use kind::{CatalogKind, CollectionSpec, FieldSpec, FieldType, TableType};
pub use resolver::PathResolver;
pub use value::{FieldValue, InvalidLiteral};

pub use indextree::NodeId;
