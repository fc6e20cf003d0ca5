//! Schema registry: entity types and property declarations.
//!
//! Every property carries a declared [`ValueKind`]; link properties
//! additionally carry a directedness flag. Mutations are validated against
//! these declarations once, at the entity boundary. Registration is
//! idempotent for identical declarations and an error for conflicting ones.

use crate::error::{StoreError, StoreResult};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;
use weave_types::{PropId, TypeId, ValueKind};

/// Built-in property holding an entity's display name.
///
/// Registered first by every registry, so its id is stable.
pub const DISPLAY_NAME: PropId = PropId::from_raw(1);

#[derive(Debug, Clone)]
struct PropDef {
    name: String,
    kind: ValueKind,
    directed: bool,
}

#[derive(Debug, Default)]
struct RegistryInner {
    types: Vec<String>,
    type_by_name: HashMap<String, TypeId>,
    props: Vec<PropDef>,
    prop_by_name: HashMap<String, PropId>,
}

/// Registry of entity types and property declarations.
#[derive(Debug)]
pub struct SchemaRegistry {
    inner: RwLock<RegistryInner>,
}

impl SchemaRegistry {
    /// Creates a registry with the built-in properties pre-registered.
    #[must_use]
    pub fn new() -> Self {
        let registry = Self {
            inner: RwLock::new(RegistryInner::default()),
        };
        let id = registry
            .register_prop("DisplayName", ValueKind::Str)
            .expect("fresh registry cannot conflict");
        debug_assert_eq!(id, DISPLAY_NAME);
        registry
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    // ── Types ────────────────────────────────────────────────────

    /// Registers an entity type, returning its id. Idempotent.
    pub fn register_type(&self, name: &str) -> TypeId {
        let mut inner = self.write();
        if let Some(id) = inner.type_by_name.get(name) {
            return *id;
        }
        let id = TypeId::from_raw(inner.types.len() as u32);
        inner.types.push(name.to_string());
        inner.type_by_name.insert(name.to_string(), id);
        debug!(type_name = name, %id, "registered entity type");
        id
    }

    /// Resolves a type name to its id.
    #[must_use]
    pub fn resolve_type(&self, name: &str) -> Option<TypeId> {
        self.read().type_by_name.get(name).copied()
    }

    /// Returns the name of a registered type.
    #[must_use]
    pub fn type_name(&self, id: TypeId) -> Option<String> {
        self.read().types.get(id.raw() as usize).cloned()
    }

    /// Returns true if the type id is registered.
    #[must_use]
    pub fn has_type(&self, id: TypeId) -> bool {
        (id.raw() as usize) < self.read().types.len()
    }

    // ── Properties ───────────────────────────────────────────────

    /// Registers a scalar property with the given kind, returning its id.
    ///
    /// Re-registering the same name with the same kind returns the existing
    /// id; a different kind is a [`StoreError::PropertyConflict`].
    pub fn register_prop(&self, name: &str, kind: ValueKind) -> StoreResult<PropId> {
        self.register_prop_inner(name, kind, false)
    }

    /// Registers a link property. Directed links are addressable from the
    /// target side via [`PropId::reversed`].
    pub fn register_link(&self, name: &str, directed: bool) -> StoreResult<PropId> {
        self.register_prop_inner(name, ValueKind::Link, directed)
    }

    fn register_prop_inner(
        &self,
        name: &str,
        kind: ValueKind,
        directed: bool,
    ) -> StoreResult<PropId> {
        let mut inner = self.write();
        if let Some(id) = inner.prop_by_name.get(name) {
            let existing = &inner.props[(id.raw() - 1) as usize];
            if existing.kind == kind && existing.directed == directed {
                return Ok(*id);
            }
            return Err(StoreError::PropertyConflict {
                name: name.to_string(),
                existing: existing.kind,
            });
        }
        // Property ids are 1-based so that negation stays meaningful.
        let id = PropId::from_raw(inner.props.len() as i32 + 1);
        inner.props.push(PropDef {
            name: name.to_string(),
            kind,
            directed,
        });
        inner.prop_by_name.insert(name.to_string(), id);
        debug!(prop = name, %id, ?kind, directed, "registered property");
        Ok(id)
    }

    /// Resolves a property name to its id.
    #[must_use]
    pub fn resolve_prop(&self, name: &str) -> Option<PropId> {
        self.read().prop_by_name.get(name).copied()
    }

    /// Resolves a property name, erroring when unknown.
    pub fn resolve_prop_or_err(&self, name: &str) -> StoreResult<PropId> {
        self.resolve_prop(name)
            .ok_or_else(|| StoreError::UnknownProperty(name.to_string()))
    }

    /// Returns the declared kind of a property (reversed ids are
    /// canonicalized first).
    #[must_use]
    pub fn prop_kind(&self, id: PropId) -> Option<ValueKind> {
        self.def(id).map(|d| d.kind)
    }

    /// Returns the registered name of a property.
    #[must_use]
    pub fn prop_name(&self, id: PropId) -> Option<String> {
        self.def(id).map(|d| d.name.clone())
    }

    /// Returns true if the property is a directed link.
    #[must_use]
    pub fn is_directed(&self, id: PropId) -> bool {
        self.def(id).is_some_and(|d| d.directed)
    }

    fn def(&self, id: PropId) -> Option<PropDef> {
        let idx = id.canonical().raw() - 1;
        if idx < 0 {
            return None;
        }
        self.read().props.get(idx as usize).cloned()
    }

    /// Validates a scalar write against the declaration.
    pub(crate) fn check_scalar(&self, prop: PropId, kind: ValueKind) -> StoreResult<()> {
        let declared = self
            .prop_kind(prop)
            .ok_or_else(|| StoreError::UnknownProperty(prop.to_string()))?;
        if declared == ValueKind::Link {
            return Err(StoreError::LinkProperty(prop));
        }
        if declared != kind {
            return Err(StoreError::TypeMismatch {
                prop,
                expected: declared,
                actual: kind,
            });
        }
        Ok(())
    }

    /// Validates a link operation against the declaration.
    pub(crate) fn check_link(&self, prop: PropId) -> StoreResult<()> {
        let declared = self
            .prop_kind(prop)
            .ok_or_else(|| StoreError::UnknownProperty(prop.to_string()))?;
        if declared != ValueKind::Link {
            return Err(StoreError::NotALink(prop));
        }
        Ok(())
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
