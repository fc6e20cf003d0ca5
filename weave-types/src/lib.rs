//! Core type definitions for Weave.
//!
//! This crate defines the fundamental, store-agnostic types used throughout
//! the core engine:
//! - Entity, type, and property identifiers
//! - The closed typed-value variant stored on entities
//! - Commit records describing applied units of work
//! - Scheduler priority classes
//!
//! Everything that consumes the store — query engine, panes, plugins —
//! speaks in these types. Domain-specific payload shapes belong to their
//! plugins, not here.

mod commit;
mod ids;
mod value;

pub use commit::{Commit, CommitKind, Priority};
pub use ids::{EntityId, PropId, TypeId};
pub use value::{BlobHandle, PropValue, ValueKind};
