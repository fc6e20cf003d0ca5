//! The store: identity map, type index, and commit notification.
//!
//! A [`Store`] is a cheaply cloneable handle; all clones share one identity
//! map and one owner thread. Mutations reach the store only through
//! entities on the owner thread (usually via a
//! [`MutationProxy`](crate::MutationProxy)); every committed unit of work
//! produces [`Commit`] records that are pushed synchronously to registered
//! observers — the seam the live query engine plugs into.

use crate::entity::Entity;
use crate::error::{StoreError, StoreResult};
use crate::registry::SchemaRegistry;
use crate::scheduler::{BackgroundFault, OwnerScheduler, UnitOfWork};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info};
use weave_types::{Commit, CommitKind, EntityId, Priority, TypeId};

/// Configuration for a store instance.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Name used in logging.
    pub name: String,
    /// OS name of the owner thread.
    pub thread_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "weave".to_string(),
            thread_name: "weave-owner".to_string(),
        }
    }
}

/// Receives commit records, synchronously on the owner thread, in commit
/// order. Implemented by live result sets.
pub trait CommitObserver: Send + Sync {
    fn on_commit(&self, store: &Store, commit: &Commit);
}

pub(crate) struct StoreInner {
    config: StoreConfig,
    pub(crate) registry: SchemaRegistry,
    scheduler: OwnerScheduler,
    entities: RwLock<HashMap<EntityId, Arc<Entity>>>,
    by_type: RwLock<HashMap<TypeId, BTreeSet<EntityId>>>,
    /// Entities created inside a still-open unit of work. Invisible to
    /// lookups until their creating commit fires.
    pending: Mutex<HashMap<EntityId, Arc<Entity>>>,
    next_id: AtomicI64,
    observers: Mutex<Vec<Weak<dyn CommitObserver>>>,
    fault_rx: Mutex<Option<mpsc::UnboundedReceiver<BackgroundFault>>>,
}

impl StoreInner {
    pub(crate) fn is_owner_thread(&self) -> bool {
        self.scheduler.is_owner_thread()
    }

    pub(crate) fn get_entity(&self, id: EntityId) -> Option<Arc<Entity>> {
        self.entities
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    /// Applies commit bookkeeping (identity map, type index) and then fans
    /// the records out to observers, in order, on the owner thread.
    pub(crate) fn notify_commits(self: &Arc<Self>, commits: Vec<Commit>) {
        for commit in &commits {
            match commit.kind {
                CommitKind::Created => {
                    let entity = self
                        .pending
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&commit.entity);
                    if let Some(entity) = entity {
                        self.entities
                            .write()
                            .unwrap_or_else(|e| e.into_inner())
                            .insert(commit.entity, entity);
                        self.by_type
                            .write()
                            .unwrap_or_else(|e| e.into_inner())
                            .entry(commit.type_id)
                            .or_default()
                            .insert(commit.entity);
                        debug!(entity = %commit.entity, type_id = %commit.type_id, "entity committed");
                    }
                }
                CommitKind::Deleted => {
                    self.entities
                        .write()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&commit.entity);
                    if let Some(ids) = self
                        .by_type
                        .write()
                        .unwrap_or_else(|e| e.into_inner())
                        .get_mut(&commit.type_id)
                    {
                        ids.remove(&commit.entity);
                    }
                }
                CommitKind::Updated => {}
            }
        }

        let observers: Vec<Arc<dyn CommitObserver>> = {
            let mut list = self.observers.lock().unwrap_or_else(|e| e.into_inner());
            list.retain(|w| w.strong_count() > 0);
            list.iter().filter_map(Weak::upgrade).collect()
        };
        if observers.is_empty() {
            return;
        }
        let store = Store {
            inner: Arc::clone(self),
        };
        for commit in &commits {
            for observer in &observers {
                observer.on_commit(&store, commit);
            }
        }
    }
}

/// Handle to an in-memory object-graph store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Opens a store and spawns its owner thread.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        let (scheduler, fault_rx) = OwnerScheduler::spawn(&config.thread_name);
        info!(store = %config.name, "store opened");
        Self {
            inner: Arc::new(StoreInner {
                config,
                registry: SchemaRegistry::new(),
                scheduler,
                entities: RwLock::new(HashMap::new()),
                by_type: RwLock::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicI64::new(1),
                observers: Mutex::new(Vec::new()),
                fault_rx: Mutex::new(Some(fault_rx)),
            }),
        }
    }

    /// The store's configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// The schema registry backing this store.
    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.inner.registry
    }

    // ── Scheduling ───────────────────────────────────────────────

    /// Returns true when called from the owner thread.
    #[must_use]
    pub fn is_owner_thread(&self) -> bool {
        self.inner.is_owner_thread()
    }

    /// Schedules a unit of work at the given priority and returns
    /// immediately. Faults arrive on the fault channel.
    pub fn submit(&self, priority: Priority, label: impl Into<String>, action: UnitOfWork) {
        self.inner.scheduler.submit(priority, label, action);
    }

    /// Executes a unit of work on the owner thread, blocking the caller
    /// until it completes. A fault is returned to this caller.
    pub fn run_blocking(&self, label: impl Into<String>, action: UnitOfWork) -> StoreResult<()> {
        self.inner.scheduler.run_blocking(label, action)
    }

    /// Takes the receiver for faults raised inside submitted units of
    /// work. Can only be taken once.
    #[must_use]
    pub fn take_fault_receiver(&self) -> Option<mpsc::UnboundedReceiver<BackgroundFault>> {
        self.inner
            .fault_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    // ── Lookup (any thread) ──────────────────────────────────────

    /// Looks up a committed entity by id.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<Arc<Entity>> {
        self.inner.get_entity(id)
    }

    /// Returns true if a committed entity with this id exists.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.inner
            .entities
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&id)
    }

    /// Number of committed entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .entities
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of all committed entities, ascending.
    #[must_use]
    pub fn all_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .inner
            .entities
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Ids of all committed entities of one type, ascending.
    #[must_use]
    pub fn ids_of_type(&self, type_id: TypeId) -> Vec<EntityId> {
        self.inner
            .by_type
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&type_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    // ── Creation (owner thread) ──────────────────────────────────

    /// Allocates a new entity of the given type with its creating update
    /// frame open. The entity stays invisible to lookups until the frame
    /// commits.
    pub fn create_entity(&self, type_id: TypeId) -> StoreResult<Arc<Entity>> {
        if !self.is_owner_thread() {
            return Err(StoreError::NotOwnerThread);
        }
        if !self.inner.registry.has_type(type_id) {
            return Err(StoreError::UnknownType(type_id.to_string()));
        }
        let id = EntityId::from_raw(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let entity = Arc::new(Entity::new(id, type_id, Arc::downgrade(&self.inner)));
        entity.open_created_frame();
        self.inner
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::clone(&entity));
        Ok(entity)
    }

    // ── Observation ──────────────────────────────────────────────

    /// Registers a commit observer. Observers are held weakly; a dropped
    /// observer is pruned on the next commit.
    pub fn add_observer(&self, observer: Weak<dyn CommitObserver>) {
        self.inner
            .observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.config.name)
            .field("entities", &self.len())
            .finish()
    }
}
