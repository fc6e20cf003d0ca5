//! The entity: a typed graph node with scalar properties and links.
//!
//! Entities are identity-mapped — exactly one in-memory instance per live
//! id — and shared as `Arc<Entity>`. Reads are safe from any thread;
//! every mutating member runs on the owner thread (runtime-checked) and is
//! bracketed by an update frame so that one commit record fires per
//! bracket, no matter how many operations ran inside it.
//!
//! Links are stored on both ends: a directed link lives under its canonical
//! property id on the source and under the negated id on the target; an
//! undirected link lives under the canonical id on both. The two entries
//! are added and removed together.

use crate::error::{StoreError, StoreResult};
use crate::registry::DISPLAY_NAME;
use crate::store::StoreInner;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tracing::info;
use weave_types::{BlobHandle, Commit, EntityId, PropId, PropValue, TypeId};

#[derive(Debug, Default)]
struct UpdateFrame {
    /// True when this bracket is the one that creates the entity.
    created: bool,
    /// Canonical ids of properties touched inside the bracket.
    changed: BTreeSet<PropId>,
    /// Link counterparties whose reciprocal entries changed, with the
    /// touched property ids; they get their own Updated commit records.
    counterparts: HashMap<EntityId, (TypeId, BTreeSet<PropId>)>,
}

#[derive(Debug, Default)]
struct EntityState {
    props: HashMap<PropId, PropValue>,
    links: BTreeMap<PropId, Vec<EntityId>>,
    deleted: bool,
    frame: Option<UpdateFrame>,
}

impl EntityState {
    fn frame_mut(&mut self) -> &mut UpdateFrame {
        self.frame.get_or_insert_with(UpdateFrame::default)
    }
}

/// Removes one target from a link list, dropping the key when it empties.
/// Returns true if an entry was actually removed.
fn remove_link_entry(
    links: &mut BTreeMap<PropId, Vec<EntityId>>,
    prop: PropId,
    target: EntityId,
) -> bool {
    let Some(list) = links.get_mut(&prop) else {
        return false;
    };
    let before = list.len();
    list.retain(|id| *id != target);
    let removed = list.len() != before;
    if list.is_empty() {
        links.remove(&prop);
    }
    removed
}

/// A typed graph node with scalar properties and links to other entities.
#[derive(Debug)]
pub struct Entity {
    original_id: EntityId,
    type_id: TypeId,
    store: Weak<StoreInner>,
    state: RwLock<EntityState>,
}

impl Entity {
    pub(crate) fn new(original_id: EntityId, type_id: TypeId, store: Weak<StoreInner>) -> Self {
        Self {
            original_id,
            type_id,
            store,
            state: RwLock::new(EntityState::default()),
        }
    }

    /// Opens the creating update frame. Called by the store right after
    /// allocating the entity, before any property is applied.
    pub(crate) fn open_created_frame(&self) {
        let mut state = self.write_state();
        let frame = state.frame_mut();
        frame.created = true;
    }

    fn read_state(&self) -> RwLockReadGuard<'_, EntityState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, EntityState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn store(&self) -> StoreResult<Arc<StoreInner>> {
        self.store.upgrade().ok_or(StoreError::StoreClosed)
    }

    fn check_mutable(&self, store: &StoreInner) -> StoreResult<()> {
        if !store.is_owner_thread() {
            return Err(StoreError::NotOwnerThread);
        }
        if self.read_state().deleted {
            return Err(StoreError::DeletedEntity(self.original_id));
        }
        Ok(())
    }

    /// Opens an implicit single-operation frame when no bracket is open.
    /// Returns true when the caller must commit it.
    fn open_implicit_frame(&self) -> bool {
        let mut state = self.write_state();
        if state.frame.is_some() {
            return false;
        }
        state.frame = Some(UpdateFrame::default());
        true
    }

    fn commit_frame(&self, store: &Arc<StoreInner>) -> StoreResult<()> {
        let commits = {
            let mut state = self.write_state();
            let frame = state
                .frame
                .take()
                .ok_or(StoreError::Protocol("end_update without begin_update"))?;
            let mut commits = Vec::new();
            if frame.created {
                commits.push(Commit::created(self.original_id, self.type_id, frame.changed));
            } else if !frame.changed.is_empty() {
                commits.push(Commit::updated(self.original_id, self.type_id, frame.changed));
            }
            for (id, (type_id, props)) in frame.counterparts {
                commits.push(Commit::updated(id, type_id, props));
            }
            commits
        };
        if !commits.is_empty() {
            store.notify_commits(commits);
        }
        Ok(())
    }

    // ── Identity ─────────────────────────────────────────────────

    /// The entity's id; [`EntityId::DELETED`] once the entity is deleted.
    #[must_use]
    pub fn id(&self) -> EntityId {
        if self.read_state().deleted {
            EntityId::DELETED
        } else {
            self.original_id
        }
    }

    /// The id the entity was created with, surviving deletion.
    #[must_use]
    pub fn original_id(&self) -> EntityId {
        self.original_id
    }

    /// The entity's registered type.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns true once the entity has been deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.read_state().deleted
    }

    // ── Reads (any thread) ───────────────────────────────────────

    /// Returns the stored value of a scalar property.
    #[must_use]
    pub fn get(&self, prop: PropId) -> Option<PropValue> {
        if prop.is_reverse() {
            return None;
        }
        self.read_state().props.get(&prop).cloned()
    }

    #[must_use]
    pub fn get_int(&self, prop: PropId) -> Option<i64> {
        match self.get(prop) {
            Some(PropValue::Int(v)) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_str(&self, prop: PropId) -> Option<String> {
        match self.get(prop) {
            Some(PropValue::Str(v)) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_date(&self, prop: PropId) -> Option<DateTime<Utc>> {
        match self.get(prop) {
            Some(PropValue::Date(v)) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_double(&self, prop: PropId) -> Option<f64> {
        match self.get(prop) {
            Some(PropValue::Double(v)) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_bool(&self, prop: PropId) -> Option<bool> {
        match self.get(prop) {
            Some(PropValue::Bool(v)) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_blob(&self, prop: PropId) -> Option<BlobHandle> {
        match self.get(prop) {
            Some(PropValue::Blob(v)) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_str_list(&self, prop: PropId) -> Option<Vec<String>> {
        match self.get(prop) {
            Some(PropValue::StrList(v)) => Some(v),
            _ => None,
        }
    }

    /// The entity's display name, if one has been set.
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        self.get_str(DISPLAY_NAME)
    }

    /// Link targets under the given property id. Reversed ids observe the
    /// "to" end of a directed link.
    #[must_use]
    pub fn links(&self, prop: PropId) -> Vec<EntityId> {
        self.read_state().links.get(&prop).cloned().unwrap_or_default()
    }

    /// Returns true if a link to `target` exists under the given id.
    #[must_use]
    pub fn has_link(&self, prop: PropId, target: EntityId) -> bool {
        self.read_state()
            .links
            .get(&prop)
            .is_some_and(|l| l.contains(&target))
    }

    /// Returns true if the property is present, as a scalar value or as at
    /// least one link.
    #[must_use]
    pub fn has_prop(&self, prop: PropId) -> bool {
        let state = self.read_state();
        state.props.contains_key(&prop)
            || state.links.get(&prop).is_some_and(|l| !l.is_empty())
    }

    // ── Update bracket ───────────────────────────────────────────

    /// Opens an update bracket; notifications are suppressed until
    /// [`Entity::end_update`] closes it.
    pub fn begin_update(&self) -> StoreResult<()> {
        let store = self.store()?;
        self.check_mutable(&store)?;
        let mut state = self.write_state();
        if state.frame.is_some() {
            return Err(StoreError::Protocol("begin_update while a bracket is open"));
        }
        state.frame = Some(UpdateFrame::default());
        Ok(())
    }

    /// Closes the bracket, firing one commit record when anything changed.
    pub fn end_update(&self) -> StoreResult<()> {
        let store = self.store()?;
        if !store.is_owner_thread() {
            return Err(StoreError::NotOwnerThread);
        }
        self.commit_frame(&store)
    }

    /// True when the open bracket has accumulated an effective change.
    /// Setting a property to its current value does not count.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.read_state()
            .frame
            .as_ref()
            .is_some_and(|f| f.created || !f.changed.is_empty() || !f.counterparts.is_empty())
    }

    // ── Scalar mutations (owner thread) ──────────────────────────

    /// Sets a scalar property, validating the value kind against the
    /// registry declaration.
    pub fn set(&self, prop: PropId, value: PropValue) -> StoreResult<()> {
        let store = self.store()?;
        self.check_mutable(&store)?;
        if prop.is_reverse() {
            return Err(StoreError::Protocol("scalar writes use the canonical property id"));
        }
        store.registry.check_scalar(prop, value.kind())?;
        let implicit = self.open_implicit_frame();
        {
            let mut state = self.write_state();
            let unchanged = state.props.get(&prop) == Some(&value);
            if !unchanged {
                state.props.insert(prop, value);
                state.frame_mut().changed.insert(prop);
            }
        }
        if implicit {
            return self.commit_frame(&store);
        }
        Ok(())
    }

    /// Sets or deletes a scalar property; `None` is equivalent to deletion.
    pub fn set_opt(&self, prop: PropId, value: Option<PropValue>) -> StoreResult<()> {
        match value {
            Some(value) => self.set(prop, value),
            None => self.delete_prop(prop),
        }
    }

    /// Deletes a scalar property. Deleting an absent property is a no-op.
    pub fn delete_prop(&self, prop: PropId) -> StoreResult<()> {
        let store = self.store()?;
        self.check_mutable(&store)?;
        if prop.is_reverse() {
            return Err(StoreError::Protocol("scalar writes use the canonical property id"));
        }
        match store.registry.prop_kind(prop) {
            None => return Err(StoreError::UnknownProperty(prop.to_string())),
            Some(weave_types::ValueKind::Link) => return Err(StoreError::LinkProperty(prop)),
            Some(_) => {}
        }
        let implicit = self.open_implicit_frame();
        {
            let mut state = self.write_state();
            if state.props.remove(&prop).is_some() {
                state.frame_mut().changed.insert(prop);
            }
        }
        if implicit {
            return self.commit_frame(&store);
        }
        Ok(())
    }

    /// Sets the built-in display name.
    pub fn set_display_name(&self, name: &str) -> StoreResult<()> {
        self.set(DISPLAY_NAME, PropValue::Str(name.to_string()))
    }

    // ── Link mutations (owner thread) ────────────────────────────

    /// Adds a link to `target`. Duplicate (property, target) pairs are
    /// silent no-ops; a self-link is rejected before any effect.
    pub fn add_link(&self, prop: PropId, target: EntityId) -> StoreResult<()> {
        let store = self.store()?;
        self.check_mutable(&store)?;
        if prop.is_reverse() {
            return Err(StoreError::Protocol("link mutations use the canonical property id"));
        }
        store.registry.check_link(prop)?;
        if target == self.original_id {
            return Err(StoreError::SelfLink(target));
        }
        let target_entity = store
            .get_entity(target)
            .ok_or(StoreError::MissingEntity(target))?;
        if target_entity.is_deleted() {
            return Err(StoreError::DeletedEntity(target));
        }
        let reciprocal = if store.registry.is_directed(prop) {
            prop.reversed()
        } else {
            prop
        };
        let implicit = self.open_implicit_frame();
        {
            let mut state = self.write_state();
            let already = state.links.get(&prop).is_some_and(|l| l.contains(&target));
            if !already {
                state.links.entry(prop).or_default().push(target);
                target_entity
                    .write_state()
                    .links
                    .entry(reciprocal)
                    .or_default()
                    .push(self.original_id);
                let frame = state.frame_mut();
                frame.changed.insert(prop);
                frame
                    .counterparts
                    .entry(target)
                    .or_insert_with(|| (target_entity.type_id(), BTreeSet::new()))
                    .1
                    .insert(prop);
            }
        }
        if implicit {
            return self.commit_frame(&store);
        }
        Ok(())
    }

    /// Deletes the link to `target`, removing both ends. Deleting an
    /// absent link is a no-op.
    pub fn delete_link(&self, prop: PropId, target: EntityId) -> StoreResult<()> {
        let store = self.store()?;
        self.check_mutable(&store)?;
        if prop.is_reverse() {
            return Err(StoreError::Protocol("link mutations use the canonical property id"));
        }
        store.registry.check_link(prop)?;
        let reciprocal = if store.registry.is_directed(prop) {
            prop.reversed()
        } else {
            prop
        };
        let target_entity = store.get_entity(target);
        let implicit = self.open_implicit_frame();
        {
            let mut state = self.write_state();
            let removed = remove_link_entry(&mut state.links, prop, target);
            if removed {
                if let Some(te) = &target_entity {
                    remove_link_entry(
                        &mut te.write_state().links,
                        reciprocal,
                        self.original_id,
                    );
                    state
                        .frame_mut()
                        .counterparts
                        .entry(target)
                        .or_insert_with(|| (te.type_id(), BTreeSet::new()))
                        .1
                        .insert(prop);
                }
                state.frame_mut().changed.insert(prop);
            }
        }
        if implicit {
            return self.commit_frame(&store);
        }
        Ok(())
    }

    /// Deletes every link stored under the given canonical property id.
    pub fn delete_links(&self, prop: PropId) -> StoreResult<()> {
        let store = self.store()?;
        self.check_mutable(&store)?;
        if prop.is_reverse() {
            return Err(StoreError::Protocol("link mutations use the canonical property id"));
        }
        store.registry.check_link(prop)?;
        let reciprocal = if store.registry.is_directed(prop) {
            prop.reversed()
        } else {
            prop
        };
        let implicit = self.open_implicit_frame();
        {
            let mut state = self.write_state();
            let targets = state.links.remove(&prop).unwrap_or_default();
            if !targets.is_empty() {
                state.frame_mut().changed.insert(prop);
            }
            for target in targets {
                let Some(te) = store.get_entity(target) else {
                    continue;
                };
                remove_link_entry(&mut te.write_state().links, reciprocal, self.original_id);
                state
                    .frame_mut()
                    .counterparts
                    .entry(target)
                    .or_insert_with(|| (te.type_id(), BTreeSet::new()))
                    .1
                    .insert(prop);
            }
        }
        if implicit {
            return self.commit_frame(&store);
        }
        Ok(())
    }

    // ── Deletion ─────────────────────────────────────────────────

    /// Deletes the entity: removes every link (both ends), marks it
    /// deleted, and fires a deletion commit. The entity leaves the
    /// identity map; existing `Arc` holders observe the deleted state.
    pub fn delete(&self) -> StoreResult<()> {
        let store = self.store()?;
        self.check_mutable(&store)?;
        if self.read_state().frame.is_some() {
            return Err(StoreError::Protocol("delete inside an open update bracket"));
        }
        let mut counterparts: HashMap<EntityId, (TypeId, BTreeSet<PropId>)> = HashMap::new();
        {
            let mut state = self.write_state();
            let links = std::mem::take(&mut state.links);
            for (prop, targets) in links {
                let reciprocal = if store.registry.is_directed(prop) {
                    prop.reversed()
                } else {
                    prop
                };
                for target in targets {
                    let Some(te) = store.get_entity(target) else {
                        continue;
                    };
                    remove_link_entry(&mut te.write_state().links, reciprocal, self.original_id);
                    counterparts
                        .entry(target)
                        .or_insert_with(|| (te.type_id(), BTreeSet::new()))
                        .1
                        .insert(prop.canonical());
                }
            }
            state.deleted = true;
        }
        let mut commits = vec![Commit::deleted(self.original_id, self.type_id)];
        for (id, (type_id, props)) in counterparts {
            commits.push(Commit::updated(id, type_id, props));
        }
        store.notify_commits(commits);
        info!(entity = %self.original_id, "entity deleted");
        Ok(())
    }
}
