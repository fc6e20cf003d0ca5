//! Result-set engine for Weave.
//!
//! Queries over the store are represented as [`ResultSet`]s: lazily
//! instantiated predicates supporting boolean combination (union,
//! intersect, minus) with defined sort- and liveness-propagation rules.
//! Live sets subscribe to the store's commit stream, keep their membership
//! incrementally consistent, and emit typed [`ListEvent`]s; the
//! property-watch layer narrows `Changed` reporting to bound notification
//! volume on large sets.
//!
//! # Example
//!
//! ```
//! use weave_query::{ResultSet, SortSpec};
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
//!
//! let notes = ResultSet::of_type(&store, note, false).sorted_by(SortSpec::by(title));
//! assert_eq!(notes.ids(), vec![id]);
//! ```

mod event;
mod live;
mod predicate;
mod result_set;
mod sort;

pub use event::{ListEvent, ListenerId};
pub use predicate::Predicate;
pub use result_set::ResultSet;
pub use sort::{Comparator, Direction, SortKey, SortSpec};
