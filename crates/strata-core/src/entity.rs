//! Entity descriptors and class-level attribute instrumentation.
//!
//! These are the pieces of the mapping collaborator the loading engine reads:
//! entity/table names, primary key columns, single-table inheritance, and
//! which attributes already carry an instrumented implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::path::EntityToken;

/// Static description of one mapped entity.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    name: Arc<str>,
    table: Arc<str>,
    primary_key: Vec<Arc<str>>,
    inherits: Option<Arc<EntityDescriptor>>,
}

impl EntityDescriptor {
    pub fn new<I, S>(name: impl Into<Arc<str>>, table: impl Into<Arc<str>>, primary_key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: primary_key.into_iter().map(Into::into).collect(),
            inherits: None,
        }
    }

    /// Describe a single-table subclass of `base`.
    ///
    /// The subclass shares the base table and primary key.
    pub fn subclass(name: impl Into<Arc<str>>, base: Arc<EntityDescriptor>) -> Self {
        Self {
            name: name.into(),
            table: Arc::clone(&base.table),
            primary_key: base.primary_key.clone(),
            inherits: Some(base),
        }
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn table(&self) -> &Arc<str> {
        &self.table
    }

    pub fn primary_key(&self) -> &[Arc<str>] {
        &self.primary_key
    }

    pub fn base(&self) -> Option<&Arc<EntityDescriptor>> {
        self.inherits.as_ref()
    }

    /// True when this entity is `name` or inherits from it.
    pub fn isa(&self, name: &str) -> bool {
        if &*self.name == name {
            return true;
        }
        self.inherits.as_ref().is_some_and(|base| base.isa(name))
    }

    /// Unaliased path token for this entity.
    pub fn token(&self) -> EntityToken {
        EntityToken::new(Arc::clone(&self.name))
    }
}

/// Shape of an instrumented attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Scalar,
    Object,
    Collection,
}

/// What happens when an unloaded attribute is first accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderCallable {
    /// Nothing is loaded; the attribute reads as its empty value
    NoLoad,
    /// Deferred column load
    Deferred,
    /// Lazy relationship load
    Lazy,
    /// Access raises; `sql_only` raises only when SQL would be emitted
    Raise { sql_only: bool },
}

/// The class-level implementation installed for one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeImpl {
    pub key: Arc<str>,
    pub kind: AttributeKind,
    pub callable: Option<LoaderCallable>,
    /// Strategy that installed the implementation
    pub installed_by: &'static str,
}

/// Instrumented attributes of one mapped class.
#[derive(Debug, Default)]
pub struct ClassManager {
    attributes: RwLock<HashMap<Arc<str>, AttributeImpl>>,
}

impl ClassManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Does `key` already carry an implementation?
    pub fn has_impl(&self, key: &str) -> bool {
        let attrs = self.attributes.read().unwrap_or_else(|e| e.into_inner());
        attrs.contains_key(key)
    }

    /// Install an implementation. Returns false when one was already present.
    pub fn install(&self, attr: AttributeImpl) -> bool {
        let mut attrs = self.attributes.write().unwrap_or_else(|e| e.into_inner());
        if attrs.contains_key(&attr.key) {
            return false;
        }
        tracing::trace!(key = %attr.key, strategy = attr.installed_by, "Installed attribute impl");
        attrs.insert(Arc::clone(&attr.key), attr);
        true
    }

    pub fn get(&self, key: &str) -> Option<AttributeImpl> {
        let attrs = self.attributes.read().unwrap_or_else(|e| e.into_inner());
        attrs.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        let attrs = self.attributes.read().unwrap_or_else(|e| e.into_inner());
        attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
