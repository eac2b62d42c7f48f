//! Process-wide loader strategy registry.
//!
//! Strategies are registered against a [`PropertyClass`] under a
//! [`StrategyKey`]. Lookup from a property searches its own class first, then
//! each ancestor class in order, so a strategy registered on a base class
//! serves every derived class that does not register the key itself.
//!
//! The built-in strategies are registered on first access. Further
//! registrations are expected during program start-up; after that the
//! registry is read-mostly.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use strata_core::{ConfigErrorKind, Error, LoaderStrategyError, Result, StrategyKey};

use crate::property::PropertyCore;
use crate::strategy::LoaderStrategy;

/// Static tag of a property type, with an explicit parent link.
#[derive(Debug)]
pub struct PropertyClass {
    name: &'static str,
    parent: Option<&'static PropertyClass>,
    wildcard_key: Option<&'static str>,
}

impl PropertyClass {
    pub const fn new(
        name: &'static str,
        parent: Option<&'static PropertyClass>,
        wildcard_key: Option<&'static str>,
    ) -> Self {
        Self {
            name,
            parent,
            wildcard_key,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent(&self) -> Option<&'static PropertyClass> {
        self.parent
    }

    /// Wildcard category (`column`, `relationship`), own or inherited.
    pub fn wildcard_key(&self) -> Option<&'static str> {
        self.wildcard_key
            .or_else(|| self.parent.and_then(PropertyClass::wildcard_key))
    }

    /// This class followed by its ancestors, nearest first.
    pub fn ancestors(&'static self) -> impl Iterator<Item = &'static PropertyClass> {
        std::iter::successors(Some(self), |class| class.parent)
    }

    pub fn is_subclass_of(&'static self, other: &PropertyClass) -> bool {
        self.ancestors().any(|class| class.name == other.name)
    }
}

impl PartialEq for PropertyClass {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for PropertyClass {}

impl fmt::Display for PropertyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Root of all strategized property classes.
pub static STRATEGIZED_PROPERTY: PropertyClass =
    PropertyClass::new("StrategizedProperty", None, None);

/// Column-backed attributes.
pub static COLUMN_PROPERTY: PropertyClass =
    PropertyClass::new("ColumnProperty", Some(&STRATEGIZED_PROPERTY), Some("column"));

/// Multi-column attributes. Loads with the column strategies.
pub static COMPOSITE_PROPERTY: PropertyClass =
    PropertyClass::new("CompositeProperty", Some(&COLUMN_PROPERTY), None);

/// Related-entity attributes.
pub static RELATIONSHIP_PROPERTY: PropertyClass = PropertyClass::new(
    "RelationshipProperty",
    Some(&STRATEGIZED_PROPERTY),
    Some("relationship"),
);

/// Builds a strategy for one property under one key.
pub type StrategyFactory = fn(Arc<PropertyCore>, StrategyKey) -> Result<Arc<dyn LoaderStrategy>>;

/// A registered strategy implementation.
#[derive(Clone, Copy)]
pub struct StrategyImpl {
    pub name: &'static str,
    pub factory: StrategyFactory,
}

impl StrategyImpl {
    pub const fn new(name: &'static str, factory: StrategyFactory) -> Self {
        Self { name, factory }
    }
}

impl fmt::Debug for StrategyImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyImpl").field("name", &self.name).finish()
    }
}

/// Owner class -> strategy key -> implementation.
#[derive(Debug, Default)]
pub struct StrategyRegistry {
    /// Owner classes in first-registration order
    classes: Vec<&'static PropertyClass>,
    by_class: HashMap<&'static str, HashMap<StrategyKey, StrategyImpl>>,
    keys_by_impl: HashMap<&'static str, Vec<StrategyKey>>,
}

impl StrategyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in strategies.
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        crate::strategies::register_builtins(&mut registry)?;
        Ok(registry)
    }

    /// Register `imp` for `owner` under `key`.
    ///
    /// Registering the same implementation twice is a no-op; registering a
    /// different implementation under an existing key is rejected.
    pub fn register(
        &mut self,
        owner: &'static PropertyClass,
        key: StrategyKey,
        imp: StrategyImpl,
    ) -> Result<()> {
        key.validate()?;

        let table = self.by_class.entry(owner.name).or_default();
        if let Some(existing) = table.get(&key) {
            if existing.name == imp.name {
                return Ok(());
            }
            return Err(Error::config(
                ConfigErrorKind::DuplicateRegistration,
                format!(
                    "strategy key {} on {} is already registered to {}",
                    key, owner.name, existing.name
                ),
            ));
        }
        table.insert(key.clone(), imp);

        if !self.classes.iter().any(|c| c.name == owner.name) {
            self.classes.push(owner);
        }
        let keys = self.keys_by_impl.entry(imp.name).or_default();
        if !keys.contains(&key) {
            keys.push(key.clone());
        }

        tracing::debug!(owner = owner.name, strategy = imp.name, key = %key, "Registered loader strategy");
        Ok(())
    }

    /// Keys an implementation answers to, in registration order.
    pub fn keys_for(&self, strategy: &str) -> &[StrategyKey] {
        self.keys_by_impl.get(strategy).map_or(&[], Vec::as_slice)
    }

    /// Whether `owner` itself (not an ancestor) registers `key`.
    pub fn contains(&self, owner: &PropertyClass, key: &StrategyKey) -> bool {
        self.by_class
            .get(owner.name)
            .is_some_and(|table| table.contains_key(key))
    }

    /// Resolve `key` for a property of class `requesting`.
    ///
    /// Searches the requesting class then its ancestors. When nothing is
    /// found, every registered class is scanned only to name the class the
    /// key belongs to in the error.
    pub fn lookup(
        &self,
        requesting: &'static PropertyClass,
        property: &str,
        key: &StrategyKey,
    ) -> Result<StrategyImpl> {
        for class in requesting.ancestors() {
            if let Some(imp) = self.by_class.get(class.name).and_then(|t| t.get(key)) {
                return Ok(*imp);
            }
        }

        let owner = self.classes.iter().find_map(|class| {
            self.by_class
                .get(class.name)
                .and_then(|t| t.get(key))
                .map(|imp| (class.name, imp.name))
        });

        tracing::debug!(
            requesting = requesting.name,
            property = property,
            key = %key,
            owner = ?owner.map(|(c, _)| c),
            "Loader strategy lookup failed"
        );

        Err(LoaderStrategyError {
            requesting_class: requesting.name,
            property: property.to_string(),
            intended_class: owner.map(|(class, _)| class),
            actual_strategy: owner.map(|(_, strategy)| strategy),
            key: key.clone(),
        }
        .into())
    }
}

type Installed = std::result::Result<RwLock<StrategyRegistry>, String>;

fn install(registry: Result<StrategyRegistry>) -> Installed {
    registry.map(RwLock::new).map_err(|e| {
        tracing::error!(error = %e, "Built-in loader strategies failed to register");
        e.to_string()
    })
}

fn installed(slot: &Installed) -> Result<&RwLock<StrategyRegistry>> {
    slot.as_ref().map_err(|message| {
        Error::config(
            ConfigErrorKind::RegistryUnavailable,
            format!("built-in loader strategies failed to register: {message}"),
        )
    })
}

fn global() -> Result<&'static RwLock<StrategyRegistry>> {
    static REGISTRY: OnceLock<Installed> = OnceLock::new();
    installed(REGISTRY.get_or_init(|| install(StrategyRegistry::with_builtins())))
}

/// Register a strategy in the process-wide registry.
pub fn register_strategy(
    owner: &'static PropertyClass,
    key: StrategyKey,
    imp: StrategyImpl,
) -> Result<()> {
    let mut registry = global()?.write().unwrap_or_else(|e| e.into_inner());
    registry.register(owner, key, imp)
}

/// Resolve a strategy from the process-wide registry.
pub fn lookup_strategy(
    requesting: &'static PropertyClass,
    property: &str,
    key: &StrategyKey,
) -> Result<StrategyImpl> {
    let registry = global()?.read().unwrap_or_else(|e| e.into_inner());
    registry.lookup(requesting, property, key)
}

/// Keys registered for an implementation in the process-wide registry.
///
/// Empty when the registry could not be built.
pub fn strategy_keys(strategy: &str) -> Vec<StrategyKey> {
    let Ok(registry) = global() else {
        return Vec::new();
    };
    let registry = registry.read().unwrap_or_else(|e| e.into_inner());
    registry.keys_for(strategy).to_vec()
}
