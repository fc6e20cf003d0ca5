//! In-memory object-graph store for Weave.
//!
//! All committing mutations run on one dedicated owner thread per store;
//! reads are safe from any thread because entities are identity-mapped and
//! only ever change on that thread.
//!
//! # Components
//!
//! - **Registry**: entity types and property declarations (kind, link
//!   directedness), validated once at the mutation boundary
//! - **Scheduler**: the owner thread and its priority queue of units of
//!   work
//! - **Entity**: typed graph node with update brackets and reciprocal
//!   links
//! - **Store**: identity map, type index, commit-observer seam, fault
//!   channel
//! - **Proxy**: cross-thread write marshalling with batching
//!
//! # Example
//!
//! ```
//! use weave_store::{MutationProxy, Store, StoreConfig};
//! use weave_types::{Priority, PropValue, ValueKind};
//!
//! let store = Store::new(StoreConfig::default());
//! let note = store.registry().register_type("Note");
//! let title = store.registry().register_prop("Title", ValueKind::Str).unwrap();
//!
//! let proxy = MutationProxy::for_new(&store, note, Priority::Normal).unwrap();
//! proxy.begin_update().unwrap();
//! proxy.set_prop(title, PropValue::Str("hello".into())).unwrap();
//! let id = proxy.end_update().unwrap().unwrap();
//! assert!(store.contains(id));
//! ```

mod entity;
mod error;
mod proxy;
mod registry;
mod scheduler;
mod store;

pub use entity::Entity;
pub use error::{StoreError, StoreResult};
pub use proxy::MutationProxy;
pub use registry::{SchemaRegistry, DISPLAY_NAME};
pub use scheduler::{BackgroundFault, UnitOfWork};
pub use store::{CommitObserver, Store, StoreConfig};
