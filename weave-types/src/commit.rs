//! Commit records and scheduler priority classes.
//!
//! Every unit of work the owner thread applies produces one [`Commit`]
//! record per affected entity. Live result sets consume these records to
//! maintain membership incrementally; they are the only mutation stream
//! the query engine observes.

use crate::{EntityId, PropId, TypeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What a committed unit of work did to one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitKind {
    /// The entity was created by this commit.
    Created,
    /// Existing properties or links changed.
    Updated,
    /// The entity was deleted by this commit.
    Deleted,
}

/// Record of one applied commit against one entity.
///
/// `changed_props` holds the canonical (positive) ids of every property or
/// link type touched inside the update bracket. For `Created` commits it
/// lists the initial properties; for `Deleted` commits it is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub entity: EntityId,
    pub type_id: TypeId,
    pub kind: CommitKind,
    pub changed_props: BTreeSet<PropId>,
}

impl Commit {
    /// Creates a commit record for a freshly created entity.
    #[must_use]
    pub fn created(entity: EntityId, type_id: TypeId, changed_props: BTreeSet<PropId>) -> Self {
        Self {
            entity,
            type_id,
            kind: CommitKind::Created,
            changed_props,
        }
    }

    /// Creates a commit record for an updated entity.
    #[must_use]
    pub fn updated(entity: EntityId, type_id: TypeId, changed_props: BTreeSet<PropId>) -> Self {
        Self {
            entity,
            type_id,
            kind: CommitKind::Updated,
            changed_props,
        }
    }

    /// Creates a commit record for a deleted entity.
    #[must_use]
    pub fn deleted(entity: EntityId, type_id: TypeId) -> Self {
        Self {
            entity,
            type_id,
            kind: CommitKind::Deleted,
            changed_props: BTreeSet::new(),
        }
    }

    /// Returns true if the given property (canonicalized) was touched.
    #[must_use]
    pub fn touches(&self, prop: PropId) -> bool {
        self.changed_props.contains(&prop.canonical())
    }
}

/// Priority class for asynchronously scheduled units of work.
///
/// The owner thread drains classes strictly in this order, FIFO within a
/// class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Immediate,
    Normal,
    Background,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}
