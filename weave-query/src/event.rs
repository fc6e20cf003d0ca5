//! Typed change notifications emitted by live result sets.

use std::collections::BTreeSet;
use weave_types::{EntityId, PropId};

/// A membership or property change observed by a live result set.
///
/// For one affected entity the relative firing order is: `Added`,
/// `Deleting` (before the entity leaves the list), `Changed`, and
/// `ChangedDeleting` (after the generic `Deleting`, when a property update
/// pushed the entity out of membership).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEvent {
    /// The entity entered the set.
    Added(EntityId),
    /// The entity is about to leave the set; it is still a member while
    /// this event fires.
    Deleting(EntityId),
    /// A property of a member changed and the entity stays a member.
    /// Subject to the property-watch filter.
    Changed {
        entity: EntityId,
        props: BTreeSet<PropId>,
    },
    /// A property update caused the entity to leave membership.
    ChangedDeleting(EntityId),
}

impl ListEvent {
    /// The entity this event concerns.
    #[must_use]
    pub fn entity(&self) -> EntityId {
        match self {
            Self::Added(id)
            | Self::Deleting(id)
            | Self::ChangedDeleting(id) => *id,
            Self::Changed { entity, .. } => *entity,
        }
    }
}

/// Token identifying one registered change listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }
}
