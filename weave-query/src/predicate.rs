//! Query predicates.
//!
//! A predicate is the unmaterialized form of a result set: a closed
//! description that can be evaluated against the whole store (initial
//! instantiation) or re-evaluated against a single entity (live
//! maintenance after a commit). Combination nodes hold child predicates,
//! so one combined set re-evaluates as a unit — an entity matching several
//! branches of a union is still exactly one member.

use weave_store::Store;
use weave_types::{EntityId, PropId, PropValue, TypeId};

/// Lazily evaluated description of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches nothing.
    Empty,
    /// All entities of one type.
    Type(TypeId),
    /// Entities carrying the property, as a scalar or as a link.
    HasProp(PropId),
    /// Entities whose scalar property equals the value.
    PropEquals(PropId, PropValue),
    /// Entities holding a link to `target` under the property id
    /// (reversed ids address the "to" end of a directed link).
    LinksTo(PropId, EntityId),
    /// A fixed id list.
    Ids(Vec<EntityId>),
    Union(Vec<Predicate>),
    Intersect(Vec<Predicate>),
    Minus(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    /// Re-evaluates the predicate against one entity.
    #[must_use]
    pub fn matches(&self, store: &Store, id: EntityId) -> bool {
        match self {
            Self::Empty => false,
            Self::Type(type_id) => store.get(id).is_some_and(|e| e.type_id() == *type_id),
            Self::HasProp(prop) => store.get(id).is_some_and(|e| e.has_prop(*prop)),
            Self::PropEquals(prop, value) => {
                store.get(id).and_then(|e| e.get(*prop)).as_ref() == Some(value)
            }
            Self::LinksTo(prop, target) => {
                store.get(id).is_some_and(|e| e.has_link(*prop, *target))
            }
            Self::Ids(ids) => ids.contains(&id) && store.contains(id),
            Self::Union(branches) => branches.iter().any(|b| b.matches(store, id)),
            Self::Intersect(branches) => {
                !branches.is_empty() && branches.iter().all(|b| b.matches(store, id))
            }
            Self::Minus(keep, drop) => keep.matches(store, id) && !drop.matches(store, id),
        }
    }

    /// Evaluates the predicate against the whole store. The returned list
    /// never contains a duplicate id.
    #[must_use]
    pub fn evaluate(&self, store: &Store) -> Vec<EntityId> {
        match self {
            Self::Empty => Vec::new(),
            Self::Type(type_id) => store.ids_of_type(*type_id),
            Self::HasProp(_) | Self::PropEquals(..) | Self::LinksTo(..) => store
                .all_ids()
                .into_iter()
                .filter(|id| self.matches(store, *id))
                .collect(),
            Self::Ids(ids) => {
                let mut seen = std::collections::HashSet::new();
                ids.iter()
                    .copied()
                    .filter(|id| store.contains(*id) && seen.insert(*id))
                    .collect()
            }
            Self::Union(branches) => {
                let mut seen = std::collections::HashSet::new();
                let mut out = Vec::new();
                for branch in branches {
                    for id in branch.evaluate(store) {
                        if seen.insert(id) {
                            out.push(id);
                        }
                    }
                }
                out
            }
            Self::Intersect(branches) => {
                let Some((first, rest)) = branches.split_first() else {
                    return Vec::new();
                };
                first
                    .evaluate(store)
                    .into_iter()
                    .filter(|id| rest.iter().all(|b| b.matches(store, *id)))
                    .collect()
            }
            Self::Minus(keep, drop) => keep
                .evaluate(store)
                .into_iter()
                .filter(|id| !drop.matches(store, *id))
                .collect(),
        }
    }
}
