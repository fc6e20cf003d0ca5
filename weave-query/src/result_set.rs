//! Result sets: lazily instantiated, boolean-combinable query results.
//!
//! A result set is a cheap handle around a predicate. Resolving the
//! predicate to an id list ("instantiation") is deferred until an element
//! access forces it, and [`ResultSet::deinstantiate`] reverts to pure
//! predicate form to release the memory. Combinators build new sets with
//! defined sort- and liveness-propagation rules; a live set additionally
//! registers as a commit observer and keeps its materialized membership
//! incrementally consistent (see the `live` module).

use crate::event::{ListEvent, ListenerId};
use crate::predicate::Predicate;
use crate::sort::SortSpec;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::debug;
use weave_store::{Entity, Store};
use weave_types::{EntityId, PropId, PropValue, TypeId};

pub(crate) type ListenerFn = dyn Fn(&ListEvent) + Send + Sync;

pub(crate) struct Materialized {
    pub(crate) order: Vec<EntityId>,
    pub(crate) index: HashSet<EntityId>,
}

impl Materialized {
    fn new(order: Vec<EntityId>) -> Self {
        let index = order.iter().copied().collect();
        Self { order, index }
    }
}

pub(crate) struct SetInner {
    pub(crate) store: Store,
    pub(crate) predicate: Predicate,
    pub(crate) sort: Option<SortSpec>,
    pub(crate) live: bool,
    pub(crate) state: Mutex<Option<Materialized>>,
    /// `None` reports changes to any property; `Some` narrows reporting.
    pub(crate) watch: Mutex<Option<BTreeSet<PropId>>>,
    pub(crate) listeners: Mutex<Vec<(ListenerId, Arc<ListenerFn>)>>,
    next_listener: AtomicU64,
}

impl SetInner {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, Option<Materialized>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_materialized(&self) {
        let mut state = self.lock_state();
        if state.is_some() {
            return;
        }
        let mut ids = self.predicate.evaluate(&self.store);
        if let Some(spec) = &self.sort {
            ids.sort_by(|a, b| spec.compare(&self.store, *a, *b));
        }
        debug!(members = ids.len(), live = self.live, "result set instantiated");
        *state = Some(Materialized::new(ids));
    }
}

/// A (possibly unmaterialized) query result over the store.
#[derive(Clone)]
pub struct ResultSet {
    inner: Arc<SetInner>,
}

enum CombineKind {
    Union,
    Intersect,
}

impl ResultSet {
    fn with_parts(
        store: &Store,
        predicate: Predicate,
        sort: Option<SortSpec>,
        live: bool,
    ) -> Self {
        let inner = Arc::new(SetInner {
            store: store.clone(),
            predicate,
            sort,
            live,
            state: Mutex::new(None),
            watch: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        });
        if live {
            let weak: Weak<SetInner> = Arc::downgrade(&inner);
            store.add_observer(weak);
        }
        Self { inner }
    }

    // ── Constructors ─────────────────────────────────────────────

    /// All entities of one type.
    #[must_use]
    pub fn of_type(store: &Store, type_id: TypeId, live: bool) -> Self {
        Self::with_parts(store, Predicate::Type(type_id), None, live)
    }

    /// Entities carrying the property.
    #[must_use]
    pub fn with_prop(store: &Store, prop: PropId, live: bool) -> Self {
        Self::with_parts(store, Predicate::HasProp(prop), None, live)
    }

    /// Entities whose scalar property equals the value.
    #[must_use]
    pub fn prop_equals(store: &Store, prop: PropId, value: PropValue, live: bool) -> Self {
        Self::with_parts(store, Predicate::PropEquals(prop, value), None, live)
    }

    /// Entities linking to `target` under the property id.
    #[must_use]
    pub fn links_to(store: &Store, prop: PropId, target: EntityId, live: bool) -> Self {
        Self::with_parts(store, Predicate::LinksTo(prop, target), None, live)
    }

    /// A fixed, non-live id list (duplicates and dead ids are dropped at
    /// instantiation).
    #[must_use]
    pub fn from_ids(store: &Store, ids: Vec<EntityId>) -> Self {
        Self::with_parts(store, Predicate::Ids(ids), None, false)
    }

    /// The empty set.
    #[must_use]
    pub fn empty(store: &Store) -> Self {
        Self::with_parts(store, Predicate::Empty, None, false)
    }

    // ── Introspection ────────────────────────────────────────────

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.inner.live
    }

    #[must_use]
    pub fn predicate(&self) -> &Predicate {
        &self.inner.predicate
    }

    #[must_use]
    pub fn sort_spec(&self) -> Option<&SortSpec> {
        self.inner.sort.as_ref()
    }

    #[must_use]
    pub fn is_instantiated(&self) -> bool {
        self.inner.lock_state().is_some()
    }

    /// Returns true when two handles share one underlying set.
    #[must_use]
    pub fn same_set(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ── Element access (forces instantiation) ────────────────────

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.ensure_materialized();
        self.inner.lock_state().as_ref().map_or(0, |m| m.order.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The member at `index`, in set order.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<EntityId> {
        self.inner.ensure_materialized();
        self.inner
            .lock_state()
            .as_ref()
            .and_then(|m| m.order.get(index).copied())
    }

    /// Membership test.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.inner.ensure_materialized();
        self.inner
            .lock_state()
            .as_ref()
            .is_some_and(|m| m.index.contains(&id))
    }

    /// Snapshot of the member ids, in set order.
    #[must_use]
    pub fn ids(&self) -> Vec<EntityId> {
        self.inner.ensure_materialized();
        self.inner
            .lock_state()
            .as_ref()
            .map(|m| m.order.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the member entities, in set order.
    #[must_use]
    pub fn entities(&self) -> Vec<Arc<Entity>> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.inner.store.get(id))
            .collect()
    }

    /// Releases the materialized id list, reverting to pure predicate
    /// form. A live set suspends event emission until the next access
    /// re-materializes it.
    pub fn deinstantiate(&self) {
        *self.inner.lock_state() = None;
    }

    // ── Combinators ──────────────────────────────────────────────

    /// Set union. `None` is the identity element: the original handle is
    /// returned unchanged. With `allow_merge`, a union operand's branch
    /// list is folded instead of nesting a new wrapper.
    #[must_use]
    pub fn union(&self, other: Option<&ResultSet>, allow_merge: bool) -> ResultSet {
        self.combine(other, allow_merge, CombineKind::Union)
    }

    /// Set intersection. Propagation rules match [`ResultSet::union`].
    #[must_use]
    pub fn intersect(&self, other: Option<&ResultSet>, allow_merge: bool) -> ResultSet {
        self.combine(other, allow_merge, CombineKind::Intersect)
    }

    /// Set difference. The result's order is always unspecified; liveness
    /// propagates like the other combinators.
    #[must_use]
    pub fn minus(&self, other: Option<&ResultSet>) -> ResultSet {
        let Some(other) = other else {
            return self.clone();
        };
        Self::with_parts(
            &self.inner.store,
            Predicate::Minus(
                Box::new(self.inner.predicate.clone()),
                Box::new(other.inner.predicate.clone()),
            ),
            None,
            self.inner.live || other.inner.live,
        )
    }

    fn combine(
        &self,
        other: Option<&ResultSet>,
        allow_merge: bool,
        kind: CombineKind,
    ) -> ResultSet {
        let Some(other) = other else {
            return self.clone();
        };
        let predicate = merged_predicate(
            &kind,
            &self.inner.predicate,
            &other.inner.predicate,
            allow_merge,
        );
        let sort = propagated_sort(self.sort_spec(), other.sort_spec());
        let live = self.inner.live || other.inner.live;
        Self::with_parts(&self.inner.store, predicate, sort, live)
    }

    /// A re-sorted handle over the same predicate and liveness.
    #[must_use]
    pub fn sorted_by(&self, spec: SortSpec) -> ResultSet {
        Self::with_parts(
            &self.inner.store,
            self.inner.predicate.clone(),
            Some(spec),
            self.inner.live,
        )
    }

    // ── Notification ─────────────────────────────────────────────

    /// Registers a change listener, forcing instantiation so the live
    /// membership baseline exists. Listeners fire synchronously on the
    /// owner thread, in registration order.
    pub fn on_change(&self, listener: impl Fn(&ListEvent) + Send + Sync + 'static) -> ListenerId {
        self.inner.ensure_materialized();
        let id = ListenerId::new(
            self.inner
                .next_listener
                .fetch_add(1, AtomicOrdering::SeqCst),
        );
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(listener)));
        id
    }

    /// Removes a previously registered listener.
    pub fn remove_listener(&self, id: ListenerId) {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(lid, _)| *lid != id);
    }

    /// Narrows `Changed` reporting: the first call restricts it to `prop`
    /// alone, each further call adds one more property. Membership
    /// maintenance is unaffected.
    pub fn watch_prop(&self, prop: PropId) {
        let mut watch = self.inner.watch.lock().unwrap_or_else(|e| e.into_inner());
        watch
            .get_or_insert_with(BTreeSet::new)
            .insert(prop.canonical());
    }
}

fn merged_predicate(
    kind: &CombineKind,
    a: &Predicate,
    b: &Predicate,
    allow_merge: bool,
) -> Predicate {
    let mut branches = Vec::new();
    let mut push = |p: &Predicate| {
        if allow_merge {
            match (kind, p) {
                (CombineKind::Union, Predicate::Union(inner))
                | (CombineKind::Intersect, Predicate::Intersect(inner)) => {
                    branches.extend(inner.iter().cloned());
                    return;
                }
                _ => {}
            }
        }
        branches.push(p.clone());
    };
    push(a);
    push(b);
    match kind {
        CombineKind::Union => Predicate::Union(branches),
        CombineKind::Intersect => Predicate::Intersect(branches),
    }
}

/// The sort-propagation law: exactly one sorted operand wins; identical
/// specs survive; disagreement (or two unsorted operands) yields an
/// unsorted result.
fn propagated_sort(a: Option<&SortSpec>, b: Option<&SortSpec>) -> Option<SortSpec> {
    match (a, b) {
        (Some(spec), None) | (None, Some(spec)) => Some(spec.clone()),
        (Some(x), Some(y)) if x.agrees_with(y) => Some(x.clone()),
        _ => None,
    }
}

impl fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSet")
            .field("predicate", &self.inner.predicate)
            .field("live", &self.inner.live)
            .field("sorted", &self.inner.sort.is_some())
            .field("instantiated", &self.is_instantiated())
            .finish()
    }
}
