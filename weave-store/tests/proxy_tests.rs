use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use weave_store::{CommitObserver, MutationProxy, Store, StoreConfig, StoreError};
use weave_types::{Commit, CommitKind, EntityId, Priority, PropId, PropValue, TypeId, ValueKind};

struct Fixture {
    store: Store,
    note: TypeId,
    name: PropId,
    count: PropId,
    parent: PropId,
}

fn fixture() -> Fixture {
    let store = Store::new(StoreConfig::default());
    let reg = store.registry();
    let note = reg.register_type("Note");
    let name = reg.register_prop("Name", ValueKind::Str).unwrap();
    let count = reg.register_prop("Count", ValueKind::Int).unwrap();
    let parent = reg.register_link("Parent", true).unwrap();
    Fixture {
        store,
        note,
        name,
        count,
        parent,
    }
}

struct Recorder {
    commits: Mutex<Vec<Commit>>,
}

impl Recorder {
    fn install(store: &Store) -> Arc<Self> {
        let recorder = Arc::new(Self {
            commits: Mutex::new(Vec::new()),
        });
        let weak: Weak<Recorder> = Arc::downgrade(&recorder);
        store.add_observer(weak);
        recorder
    }

    fn commits(&self) -> Vec<Commit> {
        self.commits.lock().unwrap().clone()
    }
}

impl CommitObserver for Recorder {
    fn on_commit(&self, _store: &Store, commit: &Commit) {
        self.commits.lock().unwrap().push(commit.clone());
    }
}

fn create_entity(fx: &Fixture) -> EntityId {
    let proxy = MutationProxy::for_new(&fx.store, fx.note, Priority::Normal).unwrap();
    proxy.begin_update().unwrap();
    proxy.end_update().unwrap().unwrap()
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    panic!("condition not reached within timeout");
}

// ── Construction ─────────────────────────────────────────────────

#[test]
fn for_entity_requires_an_existing_target() {
    let fx = fixture();
    let err =
        MutationProxy::for_entity(&fx.store, EntityId::from_raw(999), Priority::Normal)
            .unwrap_err();
    assert!(matches!(err, StoreError::MissingEntity(_)));
}

#[test]
fn for_new_requires_a_registered_type() {
    let fx = fixture();
    let err =
        MutationProxy::for_new(&fx.store, TypeId::from_raw(99), Priority::Normal).unwrap_err();
    assert!(matches!(err, StoreError::UnknownType(_)));
}

#[test]
fn new_entity_proxy_learns_its_id_at_commit() {
    let fx = fixture();
    let proxy = MutationProxy::for_new(&fx.store, fx.note, Priority::Normal).unwrap();
    assert_eq!(proxy.entity_id(), None);
    proxy.begin_update().unwrap();
    proxy.set_prop(fx.name, PropValue::Str("A".into())).unwrap();
    let id = proxy.end_update().unwrap().unwrap();
    assert_eq!(proxy.entity_id(), Some(id));
    assert!(fx.store.contains(id));
}

// ── Batching ─────────────────────────────────────────────────────

#[test]
fn batched_ops_are_invisible_until_the_batch_closes() {
    let fx = fixture();
    let id = create_entity(&fx);
    let proxy = MutationProxy::for_entity(&fx.store, id, Priority::Normal).unwrap();

    proxy.begin_update().unwrap();
    proxy.set_prop(fx.name, PropValue::Str("A".into())).unwrap();
    proxy.set_prop(fx.count, PropValue::Int(1)).unwrap();

    let entity = fx.store.get(id).unwrap();
    assert_eq!(entity.get(fx.name), None);
    assert_eq!(entity.get(fx.count), None);

    proxy.end_update().unwrap();
    assert_eq!(entity.get_str(fx.name).as_deref(), Some("A"));
    assert_eq!(entity.get_int(fx.count), Some(1));
}

#[test]
fn closing_a_batch_fires_one_commit_regardless_of_op_count() {
    let fx = fixture();
    let id = create_entity(&fx);
    let recorder = Recorder::install(&fx.store);
    let proxy = MutationProxy::for_entity(&fx.store, id, Priority::Normal).unwrap();

    proxy.begin_update().unwrap();
    proxy.set_prop(fx.name, PropValue::Str("A".into())).unwrap();
    proxy.set_prop(fx.count, PropValue::Int(1)).unwrap();
    proxy.set_prop(fx.count, PropValue::Int(2)).unwrap();
    proxy.end_update().unwrap();

    let commits = recorder.commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].kind, CommitKind::Updated);
    assert_eq!(commits[0].entity, id);
    assert!(commits[0].touches(fx.name));
    assert!(commits[0].touches(fx.count));
}

#[test]
fn creating_batch_fires_exactly_one_add_notification() {
    // Setting the same property twice inside the creating bracket leaves
    // one property value and one Created commit.
    let fx = fixture();
    let recorder = Recorder::install(&fx.store);
    let proxy = MutationProxy::for_new(&fx.store, fx.note, Priority::Normal).unwrap();

    proxy.begin_update().unwrap();
    proxy.set_prop(fx.name, PropValue::Str("A".into())).unwrap();
    proxy.set_prop(fx.name, PropValue::Str("A".into())).unwrap();
    let id = proxy.end_update().unwrap().unwrap();

    let entity = fx.store.get(id).unwrap();
    assert_eq!(entity.get_str(fx.name).as_deref(), Some("A"));

    let commits = recorder.commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].kind, CommitKind::Created);
    assert_eq!(commits[0].entity, id);
}

#[test]
fn end_update_without_begin_is_a_protocol_error() {
    let fx = fixture();
    let id = create_entity(&fx);
    let proxy = MutationProxy::for_entity(&fx.store, id, Priority::Normal).unwrap();
    let err = proxy.end_update().unwrap_err();
    assert!(matches!(err, StoreError::Protocol(_)));
}

#[test]
fn double_begin_update_is_a_protocol_error() {
    let fx = fixture();
    let id = create_entity(&fx);
    let proxy = MutationProxy::for_entity(&fx.store, id, Priority::Normal).unwrap();
    proxy.begin_update().unwrap();
    let err = proxy.begin_update().unwrap_err();
    assert!(matches!(err, StoreError::Protocol(_)));
}

#[test]
fn ops_inside_a_batch_apply_in_call_order() {
    let fx = fixture();
    let id = create_entity(&fx);
    let proxy = MutationProxy::for_entity(&fx.store, id, Priority::Normal).unwrap();

    proxy.begin_update().unwrap();
    proxy.set_prop(fx.count, PropValue::Int(1)).unwrap();
    proxy.set_prop(fx.count, PropValue::Int(2)).unwrap();
    proxy.delete_prop(fx.count).unwrap();
    proxy.set_prop(fx.count, PropValue::Int(3)).unwrap();
    proxy.end_update().unwrap();
    assert_eq!(fx.store.get(id).unwrap().get_int(fx.count), Some(3));

    proxy.begin_update().unwrap();
    proxy.set_prop(fx.count, PropValue::Int(4)).unwrap();
    proxy.delete_prop(fx.count).unwrap();
    proxy.end_update().unwrap();
    assert_eq!(fx.store.get(id).unwrap().get_int(fx.count), None);
}

#[test]
fn set_prop_opt_none_deletes() {
    let fx = fixture();
    let id = create_entity(&fx);
    let proxy = MutationProxy::for_entity(&fx.store, id, Priority::Normal).unwrap();
    proxy.set_prop_opt(fx.count, Some(PropValue::Int(9))).unwrap();
    assert_eq!(fx.store.get(id).unwrap().get_int(fx.count), Some(9));
    proxy.set_prop_opt(fx.count, None).unwrap();
    assert_eq!(fx.store.get(id).unwrap().get_int(fx.count), None);
}

// ── Single-op paths ──────────────────────────────────────────────

#[test]
fn single_op_outside_a_batch_commits_immediately() {
    let fx = fixture();
    let id = create_entity(&fx);
    let proxy = MutationProxy::for_entity(&fx.store, id, Priority::Normal).unwrap();
    proxy.set_prop(fx.name, PropValue::Str("solo".into())).unwrap();
    assert_eq!(
        fx.store.get(id).unwrap().get_str(fx.name).as_deref(),
        Some("solo")
    );
}

#[test]
fn fast_path_applies_inline_on_the_owner_thread() {
    let fx = fixture();
    let id = create_entity(&fx);
    let store = fx.store.clone();
    let (name, count) = (fx.name, fx.count);
    let applied = Arc::new(Mutex::new(false));
    let slot = Arc::clone(&applied);
    fx.store
        .run_blocking(
            "fast path probe",
            Box::new(move || {
                let proxy = MutationProxy::for_entity(&store, id, Priority::Normal)?;
                proxy.set_prop(name, PropValue::Str("inline".into()))?;
                // Applied before the call returned, on this very thread.
                *slot.lock().unwrap() =
                    store.get(id).unwrap().get_str(name).as_deref() == Some("inline");
                proxy.set_prop(count, PropValue::Int(7))?;
                Ok(())
            }),
        )
        .unwrap();
    assert!(*applied.lock().unwrap());
    assert_eq!(fx.store.get(id).unwrap().get_int(fx.count), Some(7));
}

// ── Self-link rejection ──────────────────────────────────────────

#[test]
fn self_link_is_rejected_eagerly_even_inside_a_batch() {
    let fx = fixture();
    let id = create_entity(&fx);
    let recorder = Recorder::install(&fx.store);
    let proxy = MutationProxy::for_entity(&fx.store, id, Priority::Normal).unwrap();

    proxy.begin_update().unwrap();
    let err = proxy.add_link(fx.parent, id).unwrap_err();
    assert!(matches!(err, StoreError::SelfLink(_)));

    // The batch is still usable and the rejected op was never queued.
    proxy.set_prop(fx.name, PropValue::Str("ok".into())).unwrap();
    proxy.end_update().unwrap();
    assert!(fx.store.get(id).unwrap().links(fx.parent).is_empty());
    assert_eq!(recorder.commits().len(), 1);
}

// ── Best-effort batch policy ─────────────────────────────────────

#[test]
fn link_op_to_a_target_deleted_mid_batch_is_dropped_silently() {
    let fx = fixture();
    let id = create_entity(&fx);
    let target = create_entity(&fx);
    let proxy = MutationProxy::for_entity(&fx.store, id, Priority::Normal).unwrap();

    proxy.begin_update().unwrap();
    proxy.add_link(fx.parent, target).unwrap();
    proxy.set_prop(fx.name, PropValue::Str("kept".into())).unwrap();

    // Another actor deletes the link target before the batch closes.
    MutationProxy::for_entity(&fx.store, target, Priority::Normal)
        .unwrap()
        .delete()
        .unwrap();

    proxy.end_update().unwrap();
    let entity = fx.store.get(id).unwrap();
    assert!(entity.links(fx.parent).is_empty());
    assert_eq!(entity.get_str(fx.name).as_deref(), Some("kept"));
}

#[test]
fn unit_of_work_is_abandoned_when_its_own_target_died() {
    let fx = fixture();
    let id = create_entity(&fx);
    let recorder = Recorder::install(&fx.store);
    let proxy = MutationProxy::for_entity(&fx.store, id, Priority::Normal).unwrap();

    proxy.begin_update().unwrap();
    proxy.set_prop(fx.name, PropValue::Str("never".into())).unwrap();

    MutationProxy::for_entity(&fx.store, id, Priority::Normal)
        .unwrap()
        .delete()
        .unwrap();

    let committed = proxy.end_update().unwrap();
    assert_eq!(committed, None);
    // Only the deletion commit fired; the batch left no trace.
    let commits = recorder.commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].kind, CommitKind::Deleted);
}

// ── Asynchronous commits ─────────────────────────────────────────

#[test]
fn async_batches_from_two_proxies_both_commit() {
    let fx = fixture();
    let a = create_entity(&fx);
    let b = create_entity(&fx);

    let pa = MutationProxy::for_entity(&fx.store, a, Priority::Immediate).unwrap();
    pa.begin_update().unwrap();
    pa.set_prop(fx.name, PropValue::Str("a-1".into())).unwrap();
    pa.set_prop(fx.count, PropValue::Int(1)).unwrap();
    pa.end_update_async().unwrap();

    let pb = MutationProxy::for_entity(&fx.store, b, Priority::Background).unwrap();
    pb.begin_update().unwrap();
    pb.set_prop(fx.name, PropValue::Str("b-1".into())).unwrap();
    pb.set_prop(fx.count, PropValue::Int(2)).unwrap();
    pb.end_update_async().unwrap();

    wait_until(|| {
        let ea = fx.store.get(a).unwrap();
        let eb = fx.store.get(b).unwrap();
        ea.get_int(fx.count).is_some() && eb.get_int(fx.count).is_some()
    });
    assert_eq!(fx.store.get(a).unwrap().get_str(fx.name).as_deref(), Some("a-1"));
    assert_eq!(fx.store.get(b).unwrap().get_str(fx.name).as_deref(), Some("b-1"));
}

#[test]
fn sequential_async_batches_apply_in_submission_order() {
    let fx = fixture();
    let id = create_entity(&fx);
    let proxy = MutationProxy::for_entity(&fx.store, id, Priority::Normal).unwrap();

    proxy.begin_update().unwrap();
    proxy.set_prop(fx.count, PropValue::Int(1)).unwrap();
    proxy.end_update_async().unwrap();

    proxy.begin_update().unwrap();
    proxy.set_prop(fx.count, PropValue::Int(2)).unwrap();
    proxy.end_update_async().unwrap();

    wait_until(|| fx.store.get(id).unwrap().get_int(fx.count) == Some(2));
}

#[test]
fn async_new_entity_commit_sets_the_proxy_id() {
    let fx = fixture();
    let proxy = MutationProxy::for_new(&fx.store, fx.note, Priority::Normal).unwrap();
    proxy.begin_update().unwrap();
    proxy.set_prop(fx.name, PropValue::Str("async".into())).unwrap();
    proxy.end_update_async().unwrap();

    wait_until(|| proxy.entity_id().is_some());
    let id = proxy.entity_id().unwrap();
    assert_eq!(
        fx.store.get(id).unwrap().get_str(fx.name).as_deref(),
        Some("async")
    );
}

// ── Deletion ─────────────────────────────────────────────────────

#[test]
fn delete_is_one_shot_and_immediate() {
    let fx = fixture();
    let id = create_entity(&fx);
    let proxy = MutationProxy::for_entity(&fx.store, id, Priority::Normal).unwrap();
    proxy.delete().unwrap();
    assert!(fx.store.get(id).is_none());
}

#[test]
fn delete_async_eventually_removes_the_entity() {
    let fx = fixture();
    let id = create_entity(&fx);
    let proxy = MutationProxy::for_entity(&fx.store, id, Priority::Background).unwrap();
    proxy.delete_async().unwrap();
    wait_until(|| fx.store.get(id).is_none());
}

#[test]
fn delete_inside_an_open_batch_is_a_protocol_error() {
    let fx = fixture();
    let id = create_entity(&fx);
    let proxy = MutationProxy::for_entity(&fx.store, id, Priority::Normal).unwrap();
    proxy.begin_update().unwrap();
    let err = proxy.delete().unwrap_err();
    assert!(matches!(err, StoreError::Protocol(_)));
}

#[test]
fn deleting_an_already_gone_entity_is_a_silent_noop() {
    let fx = fixture();
    let id = create_entity(&fx);
    let proxy = MutationProxy::for_entity(&fx.store, id, Priority::Normal).unwrap();
    proxy.delete().unwrap();
    proxy.delete().unwrap();
}
