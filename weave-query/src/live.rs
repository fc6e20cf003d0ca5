//! Live membership maintenance.
//!
//! A live result set registers as a commit observer on its store. For
//! every commit record — delivered synchronously on the owner thread, in
//! commit order — the affected entity's membership is re-evaluated against
//! the set's combined predicate and the materialized list is patched
//! incrementally. The maintenance algorithm is re-evaluation per affected
//! entity, not per-branch reference counting: membership is a boolean, so
//! an entity matching several branches of a union enters exactly once and
//! leaves only when no branch matches anymore.
//!
//! A deinstantiated set has no membership baseline to diff against;
//! maintenance (and event emission) stays suspended until the next access
//! re-materializes it.

use crate::event::ListEvent;
use crate::result_set::{ListenerFn, SetInner};
use std::sync::Arc;
use tracing::debug;
use weave_store::{CommitObserver, Store};
use weave_types::{Commit, CommitKind, EntityId};

enum Transition {
    Enter,
    LeaveDeleted,
    LeaveChanged,
    Stay,
    None,
}

impl CommitObserver for SetInner {
    fn on_commit(&self, store: &Store, commit: &Commit) {
        let id = commit.entity;
        let transition = {
            let state = self.lock_state();
            let Some(materialized) = state.as_ref() else {
                return;
            };
            let was = materialized.index.contains(&id);
            let now =
                commit.kind != CommitKind::Deleted && self.predicate.matches(store, id);
            match (was, now) {
                (false, true) => Transition::Enter,
                (true, false) if commit.kind == CommitKind::Deleted => Transition::LeaveDeleted,
                (true, false) => Transition::LeaveChanged,
                (true, true) if commit.kind == CommitKind::Updated => Transition::Stay,
                _ => Transition::None,
            }
        };

        match transition {
            Transition::Enter => {
                self.insert_member(store, id);
                debug!(entity = %id, "live set: member added");
                self.fire(&ListEvent::Added(id));
            }
            Transition::LeaveDeleted => {
                // Deleting fires while the entity is still a member.
                self.fire(&ListEvent::Deleting(id));
                self.remove_member(id);
            }
            Transition::LeaveChanged => {
                self.fire(&ListEvent::Deleting(id));
                self.remove_member(id);
                self.fire(&ListEvent::ChangedDeleting(id));
            }
            Transition::Stay => {
                self.reposition_if_needed(store, commit);
                if self.watch_allows(commit) {
                    self.fire(&ListEvent::Changed {
                        entity: id,
                        props: commit.changed_props.clone(),
                    });
                }
            }
            Transition::None => {}
        }
    }
}

impl SetInner {
    fn insert_member(&self, store: &Store, id: EntityId) {
        let mut state = self.lock_state();
        let Some(materialized) = state.as_mut() else {
            return;
        };
        if !materialized.index.insert(id) {
            return;
        }
        let position = match &self.sort {
            Some(spec) => materialized
                .order
                .binary_search_by(|probe| spec.compare(store, *probe, id))
                .unwrap_or_else(|insert_at| insert_at),
            None => materialized.order.len(),
        };
        materialized.order.insert(position, id);
    }

    fn remove_member(&self, id: EntityId) {
        let mut state = self.lock_state();
        let Some(materialized) = state.as_mut() else {
            return;
        };
        if materialized.index.remove(&id) {
            materialized.order.retain(|member| *member != id);
        }
    }

    /// Re-places a member whose sort key changed. The list stays sorted
    /// under the spec by induction, so remove-and-reinsert restores the
    /// invariant.
    fn reposition_if_needed(&self, store: &Store, commit: &Commit) {
        let Some(spec) = &self.sort else {
            return;
        };
        if !spec.affected_by(commit.changed_props.iter()) {
            return;
        }
        self.remove_member(commit.entity);
        let mut state = self.lock_state();
        if let Some(materialized) = state.as_mut() {
            materialized.index.insert(commit.entity);
            let position = materialized
                .order
                .binary_search_by(|probe| spec.compare(store, *probe, commit.entity))
                .unwrap_or_else(|insert_at| insert_at);
            materialized.order.insert(position, commit.entity);
        }
    }

    fn watch_allows(&self, commit: &Commit) -> bool {
        let watch = self.watch.lock().unwrap_or_else(|e| e.into_inner());
        match &*watch {
            None => true,
            Some(props) => commit.changed_props.iter().any(|p| props.contains(p)),
        }
    }

    fn fire(&self, event: &ListEvent) {
        let listeners: Vec<Arc<ListenerFn>> = self
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}
