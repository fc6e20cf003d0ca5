use weave_query::ResultSet;
use weave_store::{MutationProxy, Store, StoreConfig};
use weave_types::{EntityId, Priority, PropId, PropValue, TypeId, ValueKind};

struct Fixture {
    store: Store,
    note: TypeId,
    task: TypeId,
    title: PropId,
    parent: PropId,
}

fn fixture() -> Fixture {
    let store = Store::new(StoreConfig::default());
    let reg = store.registry();
    let note = reg.register_type("Note");
    let task = reg.register_type("Task");
    let title = reg.register_prop("Title", ValueKind::Str).unwrap();
    let parent = reg.register_link("Parent", true).unwrap();
    Fixture {
        store,
        note,
        task,
        title,
        parent,
    }
}

fn create(fx: &Fixture, type_id: TypeId, title: Option<&str>) -> EntityId {
    let proxy = MutationProxy::for_new(&fx.store, type_id, Priority::Normal).unwrap();
    proxy.begin_update().unwrap();
    if let Some(title) = title {
        proxy
            .set_prop(fx.title, PropValue::Str(title.into()))
            .unwrap();
    }
    proxy.end_update().unwrap().unwrap()
}

// ── Lazy instantiation ───────────────────────────────────────────

#[test]
fn a_fresh_set_is_a_predicate_only() {
    let fx = fixture();
    create(&fx, fx.note, None);
    let set = ResultSet::of_type(&fx.store, fx.note, false);
    assert!(!set.is_instantiated());

    assert_eq!(set.len(), 1);
    assert!(set.is_instantiated());
}

#[test]
fn contains_and_get_force_instantiation() {
    let fx = fixture();
    let id = create(&fx, fx.note, None);

    let by_contains = ResultSet::of_type(&fx.store, fx.note, false);
    assert!(by_contains.contains(id));
    assert!(by_contains.is_instantiated());

    let by_get = ResultSet::of_type(&fx.store, fx.note, false);
    assert_eq!(by_get.get(0), Some(id));
    assert!(by_get.is_instantiated());
}

#[test]
fn deinstantiate_reverts_to_predicate_form() {
    let fx = fixture();
    let id = create(&fx, fx.note, None);
    let set = ResultSet::of_type(&fx.store, fx.note, false);
    assert_eq!(set.ids(), vec![id]);

    set.deinstantiate();
    assert!(!set.is_instantiated());

    // Re-materialization sees the current store state.
    let id2 = create(&fx, fx.note, None);
    assert_eq!(set.ids(), vec![id, id2]);
}

#[test]
fn instantiation_reflects_the_store_at_access_time_not_creation_time() {
    let fx = fixture();
    let set = ResultSet::of_type(&fx.store, fx.note, false);
    let id = create(&fx, fx.note, None);
    assert_eq!(set.ids(), vec![id]);
}

// ── Predicate constructors ───────────────────────────────────────

#[test]
fn of_type_partitions_by_type() {
    let fx = fixture();
    let n = create(&fx, fx.note, None);
    let t = create(&fx, fx.task, None);

    assert_eq!(ResultSet::of_type(&fx.store, fx.note, false).ids(), vec![n]);
    assert_eq!(ResultSet::of_type(&fx.store, fx.task, false).ids(), vec![t]);
}

#[test]
fn with_prop_matches_scalar_carriers() {
    let fx = fixture();
    let titled = create(&fx, fx.note, Some("a"));
    create(&fx, fx.note, None);

    let set = ResultSet::with_prop(&fx.store, fx.title, false);
    assert_eq!(set.ids(), vec![titled]);
}

#[test]
fn prop_equals_matches_exact_values() {
    let fx = fixture();
    let hit = create(&fx, fx.note, Some("wanted"));
    create(&fx, fx.note, Some("other"));

    let set = ResultSet::prop_equals(
        &fx.store,
        fx.title,
        PropValue::Str("wanted".into()),
        false,
    );
    assert_eq!(set.ids(), vec![hit]);
}

#[test]
fn links_to_observes_both_ends_of_a_directed_link() {
    let fx = fixture();
    let child = create(&fx, fx.note, None);
    let parent_entity = create(&fx, fx.note, None);
    MutationProxy::for_entity(&fx.store, child, Priority::Normal)
        .unwrap()
        .add_link(fx.parent, parent_entity)
        .unwrap();

    // Who links to the parent (forward end)?
    let forward = ResultSet::links_to(&fx.store, fx.parent, parent_entity, false);
    assert_eq!(forward.ids(), vec![child]);

    // Who is linked from the child (reverse end)?
    let reverse = ResultSet::links_to(&fx.store, fx.parent.reversed(), child, false);
    assert_eq!(reverse.ids(), vec![parent_entity]);
}

#[test]
fn from_ids_dedupes_and_drops_dead_ids() {
    let fx = fixture();
    let a = create(&fx, fx.note, None);
    let b = create(&fx, fx.note, None);
    let set = ResultSet::from_ids(
        &fx.store,
        vec![a, b, a, EntityId::from_raw(999)],
    );
    assert_eq!(set.ids(), vec![a, b]);
}

#[test]
fn empty_set_is_empty() {
    let fx = fixture();
    create(&fx, fx.note, None);
    let set = ResultSet::empty(&fx.store);
    assert!(set.is_empty());
    assert_eq!(set.get(0), None);
}

// ── Snapshots ────────────────────────────────────────────────────

#[test]
fn entities_resolves_members_in_order() {
    let fx = fixture();
    let a = create(&fx, fx.note, Some("a"));
    let b = create(&fx, fx.note, Some("b"));
    let set = ResultSet::of_type(&fx.store, fx.note, false);
    let entities = set.entities();
    assert_eq!(entities.len(), 2);
    assert_eq!(entities[0].id(), a);
    assert_eq!(entities[1].id(), b);
}

#[test]
fn materialized_sets_never_contain_duplicates() {
    let fx = fixture();
    let a = create(&fx, fx.note, Some("x"));
    // Same entity matches both the type and the property predicates.
    let by_type = ResultSet::of_type(&fx.store, fx.note, false);
    let by_prop = ResultSet::with_prop(&fx.store, fx.title, false);
    let union = by_type.union(Some(&by_prop), false);
    assert_eq!(union.ids(), vec![a]);
}
