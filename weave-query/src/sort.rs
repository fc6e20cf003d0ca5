//! Sort specifications for result sets.
//!
//! A spec is one or more `(property, direction)` keys compared
//! lexicographically, or — in equivalent mode — by the first non-absent
//! property per compared entity. A custom comparator form bypasses keys
//! entirely. Absent properties sort after present ones regardless of
//! direction; entity id breaks remaining ties so materialized order is
//! deterministic.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use weave_store::Store;
use weave_types::{EntityId, PropId, PropValue};

/// Per-key sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    fn apply(self, ord: Ordering) -> Ordering {
        match self {
            Self::Ascending => ord,
            Self::Descending => ord.reverse(),
        }
    }
}

/// One sort key: a property id and a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub prop: PropId,
    pub direction: Direction,
}

impl SortKey {
    #[must_use]
    pub const fn asc(prop: PropId) -> Self {
        Self {
            prop,
            direction: Direction::Ascending,
        }
    }

    #[must_use]
    pub const fn desc(prop: PropId) -> Self {
        Self {
            prop,
            direction: Direction::Descending,
        }
    }
}

/// Custom comparison function over two entities.
pub type Comparator = dyn Fn(&Store, EntityId, EntityId) -> Ordering + Send + Sync;

/// How a result set orders its members.
#[derive(Clone)]
pub struct SortSpec {
    keys: Vec<SortKey>,
    equivalent: bool,
    comparator: Option<Arc<Comparator>>,
}

impl SortSpec {
    /// Single-key ascending sort.
    #[must_use]
    pub fn by(prop: PropId) -> Self {
        Self::with_keys(vec![SortKey::asc(prop)])
    }

    /// Single-key descending sort.
    #[must_use]
    pub fn by_desc(prop: PropId) -> Self {
        Self::with_keys(vec![SortKey::desc(prop)])
    }

    /// Multi-key lexicographic sort.
    #[must_use]
    pub fn with_keys(keys: Vec<SortKey>) -> Self {
        Self {
            keys,
            equivalent: false,
            comparator: None,
        }
    }

    /// Switches to equivalent mode: per compared entity, the first
    /// non-absent property among the keys supplies the value, and the
    /// first key's direction applies.
    #[must_use]
    pub fn equivalent(mut self) -> Self {
        self.equivalent = true;
        self
    }

    /// A custom comparator spec.
    #[must_use]
    pub fn custom(comparator: Arc<Comparator>) -> Self {
        Self {
            keys: Vec::new(),
            equivalent: false,
            comparator: Some(comparator),
        }
    }

    #[must_use]
    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    #[must_use]
    pub fn is_equivalent(&self) -> bool {
        self.equivalent
    }

    #[must_use]
    pub fn is_custom(&self) -> bool {
        self.comparator.is_some()
    }

    /// Spec equality for the sort-propagation law. Key specs agree when
    /// their key lists and mode agree; custom specs only agree with
    /// themselves (same comparator instance).
    #[must_use]
    pub fn agrees_with(&self, other: &Self) -> bool {
        match (&self.comparator, &other.comparator) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => self.keys == other.keys && self.equivalent == other.equivalent,
            _ => false,
        }
    }

    /// Returns true when any of the given (canonical) property ids can
    /// affect this spec's ordering.
    #[must_use]
    pub fn affected_by<'a>(&self, props: impl IntoIterator<Item = &'a PropId>) -> bool {
        if self.comparator.is_some() {
            // A custom comparator can read anything.
            return true;
        }
        props
            .into_iter()
            .any(|p| self.keys.iter().any(|k| k.prop == *p))
    }

    /// Total comparison of two entities under this spec.
    #[must_use]
    pub fn compare(&self, store: &Store, a: EntityId, b: EntityId) -> Ordering {
        let ord = if let Some(comparator) = &self.comparator {
            comparator(store, a, b)
        } else if self.equivalent {
            self.compare_equivalent(store, a, b)
        } else {
            self.compare_lexicographic(store, a, b)
        };
        ord.then_with(|| a.cmp(&b))
    }

    fn compare_lexicographic(&self, store: &Store, a: EntityId, b: EntityId) -> Ordering {
        for key in &self.keys {
            let ord = match (value_of(store, a, key.prop), value_of(store, b, key.prop)) {
                (None, None) => Ordering::Equal,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(va), Some(vb)) => key.direction.apply(va.cmp_for_sort(&vb)),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    fn compare_equivalent(&self, store: &Store, a: EntityId, b: EntityId) -> Ordering {
        let direction = self
            .keys
            .first()
            .map_or(Direction::Ascending, |k| k.direction);
        let va = self.first_present(store, a);
        let vb = self.first_present(store, b);
        match (va, vb) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(va), Some(vb)) => direction.apply(va.cmp_for_sort(&vb)),
        }
    }

    fn first_present(&self, store: &Store, id: EntityId) -> Option<PropValue> {
        self.keys
            .iter()
            .find_map(|key| value_of(store, id, key.prop))
    }
}

fn value_of(store: &Store, id: EntityId, prop: PropId) -> Option<PropValue> {
    store.get(id).and_then(|e| e.get(prop))
}

impl fmt::Debug for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortSpec")
            .field("keys", &self.keys)
            .field("equivalent", &self.equivalent)
            .field("custom", &self.comparator.is_some())
            .finish()
    }
}
