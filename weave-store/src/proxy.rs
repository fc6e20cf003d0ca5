//! The mutation proxy: cross-thread write marshalling.
//!
//! A proxy is bound to exactly one target entity (or one not-yet-created
//! entity of a declared type) for its whole lifetime. Callers on any
//! thread queue operations; the proxy guarantees they are applied on the
//! owner thread, in call order, as one indivisible unit of work per
//! committed batch.
//!
//! Two commit flavors exist for every entry point: synchronous (blocks
//! until the owner thread has applied the unit, faults return to the
//! caller) and asynchronous (fire-and-forget at the proxy's priority,
//! faults go to the store's fault channel).
//!
//! Inside a deferred batch a best-effort policy applies: an operation
//! whose link target died before the batch ran is dropped silently, and a
//! unit whose own target died is abandoned silently. Both are deliberate
//! outcomes, not errors.

use crate::entity::Entity;
use crate::error::{StoreError, StoreResult};
use crate::store::Store;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};
use weave_types::{EntityId, Priority, PropId, PropValue, TypeId, ValueKind};

#[derive(Debug, Clone)]
enum PendingOp {
    SetProp(PropId, PropValue),
    DeleteProp(PropId),
    SetDisplayName(String),
    AddLink(PropId, EntityId),
    DeleteLink(PropId, EntityId),
    DeleteLinks(PropId),
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Existing(EntityId),
    New {
        type_id: TypeId,
        created: Option<EntityId>,
    },
}

impl Target {
    fn current_id(&self) -> Option<EntityId> {
        match self {
            Self::Existing(id) => Some(*id),
            Self::New { created, .. } => *created,
        }
    }
}

/// Marshals mutation requests from any thread onto the owner thread.
pub struct MutationProxy {
    store: Store,
    priority: Priority,
    target: Arc<Mutex<Target>>,
    pending: Mutex<Option<Vec<PendingOp>>>,
}

impl std::fmt::Debug for MutationProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationProxy")
            .field("priority", &self.priority)
            .field("target", &self.target)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl MutationProxy {
    /// Binds a proxy to an existing entity.
    pub fn for_entity(store: &Store, id: EntityId, priority: Priority) -> StoreResult<Self> {
        let entity = store.get(id).ok_or(StoreError::MissingEntity(id))?;
        if entity.is_deleted() {
            return Err(StoreError::DeletedEntity(id));
        }
        Ok(Self {
            store: store.clone(),
            priority,
            target: Arc::new(Mutex::new(Target::Existing(id))),
            pending: Mutex::new(None),
        })
    }

    /// Binds a proxy to a not-yet-existing entity of a declared type. The
    /// entity is created when the first unit of work commits.
    pub fn for_new(store: &Store, type_id: TypeId, priority: Priority) -> StoreResult<Self> {
        if !store.registry().has_type(type_id) {
            return Err(StoreError::UnknownType(type_id.to_string()));
        }
        Ok(Self {
            store: store.clone(),
            priority,
            target: Arc::new(Mutex::new(Target::New {
                type_id,
                created: None,
            })),
            pending: Mutex::new(None),
        })
    }

    /// The proxy's asynchronous commit priority.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// The target entity id; `None` for a new-entity proxy whose creating
    /// commit has not run yet.
    #[must_use]
    pub fn entity_id(&self) -> Option<EntityId> {
        self.lock_target().current_id()
    }

    fn lock_target(&self) -> MutexGuard<'_, Target> {
        self.target.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<Vec<PendingOp>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Batching ─────────────────────────────────────────────────

    /// Opens a batch. Until the batch is closed, operations are queued
    /// rather than applied.
    pub fn begin_update(&self) -> StoreResult<()> {
        let mut pending = self.lock_pending();
        if pending.is_some() {
            return Err(StoreError::Protocol("begin_update while a batch is open"));
        }
        *pending = Some(Vec::new());
        Ok(())
    }

    /// Closes the batch and applies it synchronously as one unit of work.
    ///
    /// Returns the target's id, or `None` when the unit was abandoned
    /// because the target entity had been deleted in the meantime.
    pub fn end_update(&self) -> StoreResult<Option<EntityId>> {
        let ops = self.take_batch()?;
        self.commit_sync(ops)
    }

    /// Closes the batch and schedules it at the proxy's priority. Faults
    /// are reported on the store's fault channel.
    pub fn end_update_async(&self) -> StoreResult<()> {
        let ops = self.take_batch()?;
        self.commit_async(ops);
        Ok(())
    }

    fn take_batch(&self) -> StoreResult<Vec<PendingOp>> {
        self.lock_pending()
            .take()
            .ok_or(StoreError::Protocol("end_update without begin_update"))
    }

    // ── Operations ───────────────────────────────────────────────

    /// Sets a scalar property.
    pub fn set_prop(&self, prop: PropId, value: PropValue) -> StoreResult<()> {
        self.push_or_run(PendingOp::SetProp(prop, value), false)
    }

    pub fn set_prop_async(&self, prop: PropId, value: PropValue) -> StoreResult<()> {
        self.push_or_run(PendingOp::SetProp(prop, value), true)
    }

    /// Sets or deletes a scalar property; `None` deletes.
    pub fn set_prop_opt(&self, prop: PropId, value: Option<PropValue>) -> StoreResult<()> {
        match value {
            Some(value) => self.set_prop(prop, value),
            None => self.delete_prop(prop),
        }
    }

    /// Deletes a scalar property.
    pub fn delete_prop(&self, prop: PropId) -> StoreResult<()> {
        self.push_or_run(PendingOp::DeleteProp(prop), false)
    }

    pub fn delete_prop_async(&self, prop: PropId) -> StoreResult<()> {
        self.push_or_run(PendingOp::DeleteProp(prop), true)
    }

    /// Sets the built-in display name.
    pub fn set_display_name(&self, name: &str) -> StoreResult<()> {
        self.push_or_run(PendingOp::SetDisplayName(name.to_string()), false)
    }

    pub fn set_display_name_async(&self, name: &str) -> StoreResult<()> {
        self.push_or_run(PendingOp::SetDisplayName(name.to_string()), true)
    }

    /// Adds a link to `target`. A self-link is rejected here, eagerly,
    /// before anything is queued or scheduled.
    pub fn add_link(&self, prop: PropId, target: EntityId) -> StoreResult<()> {
        self.push_or_run(PendingOp::AddLink(prop, target), false)
    }

    pub fn add_link_async(&self, prop: PropId, target: EntityId) -> StoreResult<()> {
        self.push_or_run(PendingOp::AddLink(prop, target), true)
    }

    /// Deletes the link to `target`.
    pub fn delete_link(&self, prop: PropId, target: EntityId) -> StoreResult<()> {
        self.push_or_run(PendingOp::DeleteLink(prop, target), false)
    }

    pub fn delete_link_async(&self, prop: PropId, target: EntityId) -> StoreResult<()> {
        self.push_or_run(PendingOp::DeleteLink(prop, target), true)
    }

    /// Deletes every link of the given type.
    pub fn delete_links(&self, prop: PropId) -> StoreResult<()> {
        self.push_or_run(PendingOp::DeleteLinks(prop), false)
    }

    pub fn delete_links_async(&self, prop: PropId) -> StoreResult<()> {
        self.push_or_run(PendingOp::DeleteLinks(prop), true)
    }

    // ── Deletion ─────────────────────────────────────────────────

    /// Deletes the target entity synchronously. One-shot: never part of a
    /// batch. Deleting an already-gone entity is a silent no-op.
    pub fn delete(&self) -> StoreResult<()> {
        self.ensure_no_batch()?;
        let store = self.store.clone();
        let target = Arc::clone(&self.target);
        if self.store.is_owner_thread() {
            return delete_unit(&store, &target);
        }
        let label = self.unit_label("delete");
        self.store
            .run_blocking(label, Box::new(move || delete_unit(&store, &target)))
    }

    /// Deletes the target entity at the proxy's priority.
    pub fn delete_async(&self) -> StoreResult<()> {
        self.ensure_no_batch()?;
        let store = self.store.clone();
        let target = Arc::clone(&self.target);
        let label = self.unit_label("delete");
        self.store
            .submit(self.priority, label, Box::new(move || delete_unit(&store, &target)));
        Ok(())
    }

    fn ensure_no_batch(&self) -> StoreResult<()> {
        if self.lock_pending().is_some() {
            return Err(StoreError::Protocol("delete inside an open batch"));
        }
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────

    fn push_or_run(&self, op: PendingOp, asynchronous: bool) -> StoreResult<()> {
        self.validate(&op)?;
        {
            let mut pending = self.lock_pending();
            if let Some(ops) = pending.as_mut() {
                ops.push(op);
                return Ok(());
            }
        }
        if asynchronous {
            self.commit_async(vec![op]);
            Ok(())
        } else {
            self.commit_sync(vec![op]).map(|_| ())
        }
    }

    /// Eager validation, on the calling thread, before queueing or
    /// scheduling anything.
    fn validate(&self, op: &PendingOp) -> StoreResult<()> {
        let registry = self.store.registry();
        match op {
            PendingOp::SetProp(prop, value) => {
                if prop.is_reverse() {
                    return Err(StoreError::Protocol("scalar writes use the canonical property id"));
                }
                registry.check_scalar(*prop, value.kind())
            }
            PendingOp::DeleteProp(prop) => {
                if prop.is_reverse() {
                    return Err(StoreError::Protocol("scalar writes use the canonical property id"));
                }
                match registry.prop_kind(*prop) {
                    None => Err(StoreError::UnknownProperty(prop.to_string())),
                    Some(ValueKind::Link) => Err(StoreError::LinkProperty(*prop)),
                    Some(_) => Ok(()),
                }
            }
            PendingOp::SetDisplayName(_) => Ok(()),
            PendingOp::AddLink(prop, target) | PendingOp::DeleteLink(prop, target) => {
                if prop.is_reverse() {
                    return Err(StoreError::Protocol("link mutations use the canonical property id"));
                }
                registry.check_link(*prop)?;
                if Some(*target) == self.lock_target().current_id() {
                    return Err(StoreError::SelfLink(*target));
                }
                Ok(())
            }
            PendingOp::DeleteLinks(prop) => {
                if prop.is_reverse() {
                    return Err(StoreError::Protocol("link mutations use the canonical property id"));
                }
                registry.check_link(*prop)
            }
        }
    }

    fn unit_label(&self, verb: &str) -> String {
        match *self.lock_target() {
            Target::Existing(id) | Target::New { created: Some(id), .. } => {
                format!("{verb} entity {id}")
            }
            Target::New { type_id, created: None } => {
                format!("{verb} new entity of type {type_id}")
            }
        }
    }

    fn commit_sync(&self, ops: Vec<PendingOp>) -> StoreResult<Option<EntityId>> {
        let store = self.store.clone();
        let target = Arc::clone(&self.target);
        // Fast path: already on the owner thread, apply without touching
        // the scheduler at all.
        if self.store.is_owner_thread() {
            return apply_unit(&store, &target, ops);
        }
        let label = self.unit_label("commit");
        let result: Arc<Mutex<Option<EntityId>>> = Arc::new(Mutex::new(None));
        let result_slot = Arc::clone(&result);
        self.store.run_blocking(
            label,
            Box::new(move || {
                let committed = apply_unit(&store, &target, ops)?;
                *result_slot.lock().unwrap_or_else(|e| e.into_inner()) = committed;
                Ok(())
            }),
        )?;
        let committed = *result.lock().unwrap_or_else(|e| e.into_inner());
        Ok(committed)
    }

    fn commit_async(&self, ops: Vec<PendingOp>) {
        let store = self.store.clone();
        let target = Arc::clone(&self.target);
        let label = self.unit_label("commit");
        self.store.submit(
            self.priority,
            label,
            Box::new(move || apply_unit(&store, &target, ops).map(|_| ())),
        );
    }
}

/// The unit-of-work body: resolve (or create) the target, replay the
/// pending operations in original order under one update bracket, commit.
fn apply_unit(
    store: &Store,
    target: &Arc<Mutex<Target>>,
    ops: Vec<PendingOp>,
) -> StoreResult<Option<EntityId>> {
    let (entity, fresh): (Arc<Entity>, bool) = {
        let mut target = target.lock().unwrap_or_else(|e| e.into_inner());
        match *target {
            Target::Existing(id)
            | Target::New {
                created: Some(id), ..
            } => match store.get(id) {
                Some(entity) if !entity.is_deleted() => (entity, false),
                _ => {
                    debug!(entity = %id, "unit of work abandoned; target deleted");
                    return Ok(None);
                }
            },
            Target::New {
                type_id,
                created: None,
            } => {
                let entity = store.create_entity(type_id)?;
                *target = Target::New {
                    type_id,
                    created: Some(entity.original_id()),
                };
                (entity, true)
            }
        }
    };

    // A freshly created entity already has its creating bracket open.
    if !fresh {
        entity.begin_update()?;
    }
    for op in ops {
        let result = match op {
            PendingOp::SetProp(prop, value) => entity.set(prop, value),
            PendingOp::DeleteProp(prop) => entity.delete_prop(prop),
            PendingOp::SetDisplayName(name) => entity.set_display_name(&name),
            PendingOp::AddLink(prop, link_target) => {
                if link_target_gone(store, link_target) {
                    warn!(target = %link_target, "dropping add_link; target deleted");
                    continue;
                }
                entity.add_link(prop, link_target)
            }
            PendingOp::DeleteLink(prop, link_target) => {
                if link_target_gone(store, link_target) {
                    warn!(target = %link_target, "dropping delete_link; target deleted");
                    continue;
                }
                entity.delete_link(prop, link_target)
            }
            PendingOp::DeleteLinks(prop) => entity.delete_links(prop),
        };
        if let Err(error) = result {
            // Close the bracket so already-applied operations commit
            // consistently, then surface the failure.
            entity.end_update()?;
            return Err(error);
        }
    }
    let id = entity.id();
    entity.end_update()?;
    Ok(Some(id))
}

/// One-shot deletion unit. Missing or already-deleted targets are silent
/// no-ops.
fn delete_unit(store: &Store, target: &Arc<Mutex<Target>>) -> StoreResult<()> {
    let current = target
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .current_id();
    let Some(id) = current else {
        return Ok(());
    };
    match store.get(id) {
        Some(entity) if !entity.is_deleted() => entity.delete(),
        _ => {
            debug!(entity = %id, "delete skipped; entity already gone");
            Ok(())
        }
    }
}

fn link_target_gone(store: &Store, target: EntityId) -> bool {
    match store.get(target) {
        Some(entity) => entity.is_deleted(),
        None => true,
    }
}
