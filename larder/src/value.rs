//! Field values and their literal token grammar.
//!
//! Literal forms, shared by the command writer and parser:
//! - `null`
//! - bare integer or `true`/`false`
//! - `"double-quoted string"` — no escaping; catalog strings contain no
//!   quote characters by construction. That is an assumption of the source
//!   schema pipeline, not a guarantee of this grammar, so the writer
//!   debug-asserts it rather than silently corrupting the log.
//! - bare path string for reference fields

use crate::kind::FieldType;
use core::fmt;
use thiserror::Error;

/// The value of a declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Null,
    Int(i64),
    Bool(bool),
    String(String),
    /// A reference field's value: the referenced node's path.
    Ref(String),
}

/// A literal token that does not parse as the declared field type.
#[derive(Debug, Error)]
#[error("invalid {expected:?} literal: {token:?}")]
pub struct InvalidLiteral {
    pub expected: FieldType,
    pub token: String,
}

impl FieldValue {
    /// The value a freshly created node carries for a field of this type.
    pub fn default_for(ty: FieldType) -> FieldValue {
        match ty {
            FieldType::Int => FieldValue::Int(0),
            FieldType::Bool => FieldValue::Bool(false),
            FieldType::String | FieldType::Ref => FieldValue::Null,
        }
    }

    /// Whether this value can be stored in a field of the given type.
    pub fn fits(&self, ty: FieldType) -> bool {
        match (self, ty) {
            (FieldValue::Null, FieldType::String | FieldType::Ref) => true,
            (FieldValue::Int(_), FieldType::Int) => true,
            (FieldValue::Bool(_), FieldType::Bool) => true,
            (FieldValue::String(_), FieldType::String) => true,
            (FieldValue::Ref(_), FieldType::Ref) => true,
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// The referenced path, for non-null reference values.
    pub fn as_ref_path(&self) -> Option<&str> {
        match self {
            FieldValue::Ref(p) => Some(p),
            _ => None,
        }
    }

    /// Parse a literal token against the declared field type.
    ///
    /// The token is everything after the field name on a `set` line, so
    /// quoted strings may contain spaces.
    pub fn parse(ty: FieldType, token: &str) -> Result<FieldValue, InvalidLiteral> {
        if token == "null" {
            return match ty {
                FieldType::String | FieldType::Ref => Ok(FieldValue::Null),
                _ => Err(InvalidLiteral { expected: ty, token: token.to_owned() }),
            };
        }
        match ty {
            FieldType::Int => token
                .parse::<i64>()
                .map(FieldValue::Int)
                .map_err(|_| InvalidLiteral { expected: ty, token: token.to_owned() }),
            FieldType::Bool => match token {
                "true" => Ok(FieldValue::Bool(true)),
                "false" => Ok(FieldValue::Bool(false)),
                _ => Err(InvalidLiteral { expected: ty, token: token.to_owned() }),
            },
            FieldType::String => {
                if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
                    Ok(FieldValue::String(token[1..token.len() - 1].to_owned()))
                } else {
                    Err(InvalidLiteral { expected: ty, token: token.to_owned() })
                }
            }
            FieldType::Ref => {
                if token.starts_with('/') {
                    Ok(FieldValue::Ref(token.to_owned()))
                } else {
                    Err(InvalidLiteral { expected: ty, token: token.to_owned() })
                }
            }
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::String(s) => {
                debug_assert!(
                    !s.contains('"') && !s.contains('\n'),
                    "catalog strings must not contain quotes or newlines"
                );
                write!(f, "\"{s}\"")
            }
            FieldValue::Ref(p) => f.write_str(p),
        }
    }
}
