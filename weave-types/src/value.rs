//! Typed property values.
//!
//! A property's value is a closed tagged variant validated once, at the
//! entity mutation boundary, against the kind declared in the schema
//! registry. There is no dynamically-typed escape hatch: a mismatched
//! write is a `TypeMismatch` error at the boundary, never a latent defect.

use crate::EntityId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// Opaque handle to a binary payload kept in external blob storage.
///
/// The store never inspects blob contents; it only carries the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobHandle(Uuid);

impl BlobHandle {
    /// Creates a fresh handle.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a handle from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for BlobHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The value stored under one property of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PropValue {
    Int(i64),
    Str(String),
    Date(DateTime<Utc>),
    Double(f64),
    Bool(bool),
    Blob(BlobHandle),
    /// Ordered list of strings; duplicates allowed.
    StrList(Vec<String>),
    /// Resolved reference to another entity.
    Link(EntityId),
}

impl PropValue {
    /// Returns the kind tag of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Int(_) => ValueKind::Int,
            Self::Str(_) => ValueKind::Str,
            Self::Date(_) => ValueKind::Date,
            Self::Double(_) => ValueKind::Double,
            Self::Bool(_) => ValueKind::Bool,
            Self::Blob(_) => ValueKind::Blob,
            Self::StrList(_) => ValueKind::StrList,
            Self::Link(_) => ValueKind::Link,
        }
    }

    /// Total ordering used by sort specifications.
    ///
    /// Same-kind values compare naturally (`total_cmp` for doubles); values
    /// of different kinds compare by kind tag so mixed columns sort without
    /// panicking.
    #[must_use]
    pub fn cmp_for_sort(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Double(a), Self::Double(b)) => a.total_cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Blob(a), Self::Blob(b)) => a.as_uuid().cmp(&b.as_uuid()),
            (Self::StrList(a), Self::StrList(b)) => a.cmp(b),
            (Self::Link(a), Self::Link(b)) => a.cmp(b),
            (a, b) => a.kind().sort_rank().cmp(&b.kind().sort_rank()),
        }
    }

    /// Returns the inner string, if this is a `Str` value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the inner integer, if this is an `Int` value.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the inner bool, if this is a `Bool` value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the linked entity, if this is a `Link` value.
    #[must_use]
    pub fn as_link(&self) -> Option<EntityId> {
        match self {
            Self::Link(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<DateTime<Utc>> for PropValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Date(v)
    }
}

/// The declared data type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Int,
    Str,
    Date,
    Double,
    Bool,
    Blob,
    StrList,
    Link,
}

impl ValueKind {
    /// Stable rank used when ordering values of different kinds.
    #[must_use]
    pub(crate) fn sort_rank(self) -> u8 {
        match self {
            Self::Int => 0,
            Self::Str => 1,
            Self::Date => 2,
            Self::Double => 3,
            Self::Bool => 4,
            Self::Blob => 5,
            Self::StrList => 6,
            Self::Link => 7,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "int",
            Self::Str => "str",
            Self::Date => "date",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::Blob => "blob",
            Self::StrList => "str_list",
            Self::Link => "link",
        };
        f.write_str(name)
    }
}
