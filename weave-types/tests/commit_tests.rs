use std::collections::BTreeSet;
use weave_types::{Commit, CommitKind, EntityId, Priority, PropId, TypeId};

fn props(ids: &[i32]) -> BTreeSet<PropId> {
    ids.iter().map(|&i| PropId::from_raw(i)).collect()
}

#[test]
fn created_commit_carries_initial_props() {
    let c = Commit::created(EntityId::from_raw(1), TypeId::from_raw(2), props(&[3, 4]));
    assert_eq!(c.kind, CommitKind::Created);
    assert!(c.touches(PropId::from_raw(3)));
    assert!(!c.touches(PropId::from_raw(5)));
}

#[test]
fn deleted_commit_has_no_changed_props() {
    let c = Commit::deleted(EntityId::from_raw(1), TypeId::from_raw(2));
    assert_eq!(c.kind, CommitKind::Deleted);
    assert!(c.changed_props.is_empty());
}

#[test]
fn touches_canonicalizes_reversed_link_ids() {
    let c = Commit::updated(EntityId::from_raw(1), TypeId::from_raw(2), props(&[7]));
    assert!(c.touches(PropId::from_raw(7).reversed()));
}

#[test]
fn priority_orders_immediate_first() {
    assert!(Priority::Immediate < Priority::Normal);
    assert!(Priority::Normal < Priority::Background);
    assert_eq!(Priority::default(), Priority::Normal);
}
