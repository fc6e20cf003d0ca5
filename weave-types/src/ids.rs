//! Identifier types used throughout the Weave core.
//!
//! Entity ids are small positive integers handed out by the store's
//! identity map; property ids are signed so that a directed link can be
//! addressed from either end (positive = "from", negated = "to").

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Unique identifier for an entity in the store.
///
/// Always positive for a live entity. A deleted entity reports
/// [`EntityId::DELETED`] from its `id()` accessor; the original id stays
/// available for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(i64);

impl EntityId {
    /// Sentinel id reported by entities after deletion.
    pub const DELETED: Self = Self(-1);

    /// Creates an entity id from a raw integer.
    #[must_use]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw integer value.
    #[must_use]
    pub const fn raw(&self) -> i64 {
        self.0
    }

    /// Returns true if this is a live (positive) id.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Unique identifier for a registered entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeId(u32);

impl TypeId {
    /// Creates a type id from a raw integer.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw integer value.
    #[must_use]
    pub const fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a registered property.
///
/// Property ids are nonzero. For a directed link property, the positive id
/// addresses the link from its source ("from" end) and [`PropId::reversed`]
/// addresses the same link from its target ("to" end). Undirected links use
/// the positive id from both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropId(i32);

impl PropId {
    /// Creates a property id from a raw integer.
    #[must_use]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// Returns the raw integer value.
    #[must_use]
    pub const fn raw(&self) -> i32 {
        self.0
    }

    /// Returns the id addressing the opposite end of a directed link.
    #[must_use]
    pub const fn reversed(&self) -> Self {
        Self(-self.0)
    }

    /// Returns true if this id addresses the "to" end of a directed link.
    #[must_use]
    pub const fn is_reverse(&self) -> bool {
        self.0 < 0
    }

    /// Returns the canonical (positive) form of this id, as registered.
    #[must_use]
    pub const fn canonical(&self) -> Self {
        if self.0 < 0 { Self(-self.0) } else { *self }
    }
}

impl fmt::Display for PropId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PropId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}
