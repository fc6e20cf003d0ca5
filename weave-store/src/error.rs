//! Error types for the store.

use thiserror::Error;
use weave_types::{EntityId, PropId, ValueKind};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
///
/// Deliberate non-error outcomes — a deferred batch dropping a link
/// operation whose target died, or a whole unit of work aborting because
/// its own target died — are not represented here. They are logged and
/// swallowed, per the batch contract.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A link operation's target is the owning entity itself.
    #[error("entity {0} cannot link to itself")]
    SelfLink(EntityId),

    /// A direct mutation targeted an entity that is already deleted.
    #[error("entity {0} is deleted")]
    DeletedEntity(EntityId),

    /// No entity with this id exists in the store.
    #[error("entity not found: {0}")]
    MissingEntity(EntityId),

    /// The entity type is not registered.
    #[error("unknown entity type: {0}")]
    UnknownType(String),

    /// The property is not registered.
    #[error("unknown property: {0}")]
    UnknownProperty(String),

    /// A property name was registered twice with different kinds.
    #[error("property {name} already registered as {existing}")]
    PropertyConflict { name: String, existing: ValueKind },

    /// A value's kind does not match the registry declaration.
    #[error("type mismatch for property {prop}: expected {expected}, got {actual}")]
    TypeMismatch {
        prop: PropId,
        expected: ValueKind,
        actual: ValueKind,
    },

    /// A link operation was used on a scalar property.
    #[error("property {0} is not a link property")]
    NotALink(PropId),

    /// A scalar operation was used on a link property.
    #[error("property {0} is a link property; use link operations")]
    LinkProperty(PropId),

    /// Update-bracket misuse (closing an unopened batch, double open, …).
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    /// A committing mutation was attempted off the owner thread.
    #[error("mutation attempted off the owner thread")]
    NotOwnerThread,

    /// The owner thread is gone; no further work can be scheduled.
    #[error("scheduler is shut down")]
    SchedulerDown,

    /// The store backing this handle has been dropped.
    #[error("store has been closed")]
    StoreClosed,
}
