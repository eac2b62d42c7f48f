//! Statement options.
//!
//! Options attach to a [`Select`] and are consulted at compile time through
//! capability accessors rather than by concrete type:
//!
//! - loader options ([`Load`]) write [`LoadOption`]s into the compile state's
//!   ambient mapping, where properties find them by path;
//! - criteria options ([`LoaderCriteriaOption`]) add per-entity criteria;
//! - user-defined options ([`UserDefinedOption`]) carry an opaque payload and
//!   are never consulted by the loading machinery;
//! - legacy [`MapperOption`]s mutate the select when attached.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use strata_core::{
    EntityToken, Error, LoaderKey, OptionValue, Path, Result, StrategyKey, WildcardTokens,
    strategy_key,
};
use strata_query::{CompileState, GlobalCriteria, LoadOption, cache_key};

use crate::mapper::Mapper;
use crate::property::MapperProperty;
use crate::select::Select;

/// Capabilities shared by every statement option.
pub trait OrmOption: Send + Sync + fmt::Debug {
    /// Whether the option is carried into lazy and post-load statements.
    fn propagate_to_loaders(&self) -> bool {
        false
    }

    fn as_compile_state(&self) -> Option<&dyn CompileStateOption> {
        None
    }

    fn as_criteria(&self) -> Option<&dyn CriteriaOption> {
        None
    }

    fn as_legacy(&self) -> Option<&dyn MapperOption> {
        None
    }

    fn as_user_defined(&self) -> Option<&UserDefinedOption> {
        None
    }
}

/// An option that shapes statement compilation.
pub trait CompileStateOption: OrmOption {
    /// Equal configuration gives equal keys.
    fn cache_key(&self) -> u64;

    fn process_compile_state(&self, state: &mut CompileState) -> Result<()>;

    /// Called instead of [`process_compile_state`](Self::process_compile_state)
    /// when the select's entities were replaced after the option was attached.
    fn process_compile_state_replaced_entities(&self, state: &mut CompileState) -> Result<()> {
        self.process_compile_state(state)
    }
}

/// An option contributing global criteria.
pub trait CriteriaOption: CompileStateOption {
    fn get_global_criteria(&self, criteria: &mut GlobalCriteria);
}

/// Deprecated query-mutation option.
pub trait MapperOption: OrmOption {
    fn process_query(&self, query: &mut Select);

    fn process_query_conditionally(&self, query: &mut Select) {
        self.process_query(query);
    }
}

static LEGACY_WARNED: AtomicBool = AtomicBool::new(false);

/// Emit the legacy-option deprecation warning, once per process.
pub(crate) fn warn_legacy_option(option: &dyn MapperOption) {
    if !LEGACY_WARNED.swap(true, Ordering::Relaxed) {
        tracing::warn!(
            option = ?option,
            "MapperOption is deprecated; use loader or criteria options instead"
        );
    }
}

/// Loader options along a chain of relationships.
///
/// Relationship methods move the chain to the related entity; column methods
/// leave it where it is.
///
/// ```ignore
/// let opt = Load::new(&user)
///     .joinedload("addresses")?
///     .defer("street", false)?;
/// ```
#[derive(Debug, Clone)]
pub struct Load {
    root: Arc<str>,
    mapper: Arc<Mapper>,
    path: Path,
    entries: Vec<(LoaderKey, LoadOption)>,
    propagate_to_loaders: bool,
}

impl Load {
    /// Options rooted at `mapper`'s entity.
    pub fn new(mapper: &Arc<Mapper>) -> Self {
        Self {
            root: Arc::clone(mapper.name()),
            mapper: Arc::clone(mapper),
            path: mapper.entity_path(),
            entries: Vec::new(),
            propagate_to_loaders: true,
        }
    }

    /// Keep the options out of lazy and post-load statements.
    #[must_use]
    pub fn propagate(mut self, propagate: bool) -> Self {
        self.propagate_to_loaders = propagate;
        self
    }

    pub fn root(&self) -> &Arc<str> {
        &self.root
    }

    /// Entity path the chain currently points at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Options recorded so far, in order.
    pub fn entries(&self) -> &[(LoaderKey, LoadOption)] {
        &self.entries
    }

    fn property(&self, key: &str) -> Result<(Path, Arc<dyn MapperProperty>)> {
        let prop = self.mapper.get_property(key)?;
        let declaring = prop
            .parent()
            .map_or_else(|| Arc::clone(self.mapper.name()), |p| Arc::clone(p.name()));
        Ok((self.path.property(&declaring, prop.key()), Arc::clone(prop)))
    }

    fn push(&mut self, key: LoaderKey, option: LoadOption) {
        let option = option.propagate(self.propagate_to_loaders);
        self.entries.push((key, option));
    }

    /// Select `strategy` for the attribute `key` without moving the chain.
    ///
    /// No check is made that the strategy suits the attribute; a mismatch
    /// fails when the statement is compiled.
    pub fn set_strategy(mut self, key: &str, strategy: StrategyKey) -> Result<Self> {
        let (path, _) = self.property(key)?;
        let option = LoadOption::new(path.clone()).strategy(strategy);
        self.push(LoaderKey::new(path.natural_path()), option);
        Ok(self)
    }

    fn relationship(
        mut self,
        key: &str,
        strategy: Option<StrategyKey>,
        local: Option<(&'static str, OptionValue)>,
    ) -> Result<Self> {
        let (path, prop) = self.property(key)?;
        let spec = prop
            .as_strategized()
            .and_then(|p| p.core().relationship_spec())
            .ok_or_else(|| {
                Error::InvalidRequest(format!(
                    "Attribute '{}.{}' does not refer to a mapped entity",
                    self.mapper.name(),
                    key
                ))
            })?;
        let target = spec.target_mapper()?;

        let mut option = LoadOption::new(path.clone());
        if let Some(strategy) = strategy {
            option = option.strategy(strategy);
        }
        if let Some((name, value)) = local {
            option = option.local_opt(name, value);
        }
        self.push(LoaderKey::new(path.natural_path()), option);

        self.path = path.child_entity(EntityToken::new(Arc::clone(target.name())));
        self.mapper = target;
        Ok(self)
    }

    fn column(mut self, key: &str, strategy: StrategyKey, local: Option<(&'static str, OptionValue)>) -> Result<Self> {
        let (path, _) = self.property(key)?;
        let mut option = LoadOption::new(path.clone()).strategy(strategy);
        if let Some((name, value)) = local {
            option = option.local_opt(name, value);
        }
        self.push(LoaderKey::new(path.natural_path()), option);
        Ok(self)
    }

    pub fn joinedload(self, key: &str) -> Result<Self> {
        self.relationship(key, Some(strategy_key!(lazy = "joined")), None)
    }

    /// Joined load with an INNER join.
    pub fn joinedload_innerjoin(self, key: &str) -> Result<Self> {
        self.relationship(
            key,
            Some(strategy_key!(lazy = "joined")),
            Some(("innerjoin", OptionValue::Bool(true))),
        )
    }

    pub fn lazyload(self, key: &str) -> Result<Self> {
        self.relationship(key, Some(strategy_key!(lazy = "select")), None)
    }

    pub fn selectinload(self, key: &str) -> Result<Self> {
        self.relationship(key, Some(strategy_key!(lazy = "selectin")), None)
    }

    pub fn subqueryload(self, key: &str) -> Result<Self> {
        self.relationship(key, Some(strategy_key!(lazy = "subquery")), None)
    }

    pub fn immediateload(self, key: &str) -> Result<Self> {
        self.relationship(key, Some(strategy_key!(lazy = "immediate")), None)
    }

    pub fn noload(self, key: &str) -> Result<Self> {
        self.relationship(key, Some(strategy_key!(lazy = "noload")), None)
    }

    /// Raise on access. With `sql_only`, only when loading would emit SQL.
    pub fn raiseload(self, key: &str, sql_only: bool) -> Result<Self> {
        let lazy = if sql_only { "raise_on_sql" } else { "raise" };
        self.relationship(key, Some(strategy_key!(lazy = lazy)), None)
    }

    /// Move along `key` without changing how it loads.
    pub fn defaultload(self, key: &str) -> Result<Self> {
        self.relationship(key, None, None)
    }

    pub fn defer(self, key: &str, raiseload: bool) -> Result<Self> {
        let strategy = if raiseload {
            strategy_key!(deferred = true, instrument = true, raiseload = true)
        } else {
            strategy_key!(deferred = true, instrument = true)
        };
        self.column(key, strategy, None)
    }

    pub fn undefer(self, key: &str) -> Result<Self> {
        self.column(key, strategy_key!(deferred = false, instrument = true), None)
    }

    /// Load the deferred column group `group` with the entity.
    #[must_use]
    pub fn undefer_group(mut self, group: &str) -> Self {
        let tokens = WildcardTokens::new("column");
        let key = tokens.wildcard_key(&self.path);
        let option = LoadOption::new(key.path().clone())
            .local_opt(format!("undefer_group_{}", group), true);
        self.push(key, option);
        self
    }

    /// Populate a query-expression attribute with `expr`.
    pub fn with_expression(self, key: &str, expr: &str) -> Result<Self> {
        self.column(
            key,
            strategy_key!(query_expression = true),
            Some(("expression", OptionValue::from(expr.to_string()))),
        )
    }

    /// Apply `strategy` to every `category` attribute at the current path.
    #[must_use]
    pub fn wildcard(mut self, category: &str, strategy: StrategyKey) -> Self {
        let key = WildcardTokens::new(category).wildcard_key(&self.path);
        let option = LoadOption::new(key.path().clone()).strategy(strategy);
        self.push(key, option);
        self
    }

    /// Apply `strategy` to every `category` attribute at any path without a
    /// more specific option.
    #[must_use]
    pub fn global_default(mut self, category: &str, strategy: StrategyKey) -> Self {
        let key = WildcardTokens::new(category).default_key().clone();
        let option = LoadOption::new(key.path().clone()).strategy(strategy);
        self.push(key, option);
        self
    }

    fn apply(&self, state: &mut CompileState) {
        for (key, option) in &self.entries {
            state.attributes_mut().set(key.clone(), option.clone());
        }
    }
}

impl OrmOption for Load {
    fn propagate_to_loaders(&self) -> bool {
        self.propagate_to_loaders
    }

    fn as_compile_state(&self) -> Option<&dyn CompileStateOption> {
        Some(self)
    }
}

impl CompileStateOption for Load {
    fn cache_key(&self) -> u64 {
        cache_key(&("Load", &self.root, &self.entries))
    }

    fn process_compile_state(&self, state: &mut CompileState) -> Result<()> {
        let entity = state.entity().entity();
        if **entity != *self.root {
            return Err(Error::InvalidRequest(format!(
                "Load option rooted at '{}' does not link from query entity '{}'",
                self.root, entity
            )));
        }
        self.apply(state);
        Ok(())
    }

    fn process_compile_state_replaced_entities(&self, state: &mut CompileState) -> Result<()> {
        self.apply(state);
        Ok(())
    }
}

/// Extra criteria applied wherever an entity is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoaderCriteriaOption {
    entity: Arc<str>,
    criteria: String,
}

/// Add `criteria` (SQL against the entity's table) to every load of `entity`.
pub fn with_loader_criteria(entity: impl Into<Arc<str>>, criteria: impl Into<String>) -> LoaderCriteriaOption {
    LoaderCriteriaOption {
        entity: entity.into(),
        criteria: criteria.into(),
    }
}

impl LoaderCriteriaOption {
    pub fn entity(&self) -> &Arc<str> {
        &self.entity
    }

    pub fn criteria(&self) -> &str {
        &self.criteria
    }
}

impl OrmOption for LoaderCriteriaOption {
    fn propagate_to_loaders(&self) -> bool {
        true
    }

    fn as_compile_state(&self) -> Option<&dyn CompileStateOption> {
        Some(self)
    }

    fn as_criteria(&self) -> Option<&dyn CriteriaOption> {
        Some(self)
    }
}

impl CompileStateOption for LoaderCriteriaOption {
    fn cache_key(&self) -> u64 {
        cache_key(&("LoaderCriteriaOption", self))
    }

    fn process_compile_state(&self, state: &mut CompileState) -> Result<()> {
        self.get_global_criteria(state.global_criteria_mut());
        Ok(())
    }
}

impl CriteriaOption for LoaderCriteriaOption {
    fn get_global_criteria(&self, criteria: &mut GlobalCriteria) {
        criteria.add(Arc::clone(&self.entity), self.criteria.clone());
    }
}

/// Opaque payload for application hooks.
#[derive(Debug, Clone, PartialEq)]
pub struct UserDefinedOption {
    payload: serde_json::Value,
    propagate_to_loaders: bool,
}

impl UserDefinedOption {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            payload,
            propagate_to_loaders: false,
        }
    }

    #[must_use]
    pub fn propagate(mut self, propagate: bool) -> Self {
        self.propagate_to_loaders = propagate;
        self
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }
}

impl OrmOption for UserDefinedOption {
    fn propagate_to_loaders(&self) -> bool {
        self.propagate_to_loaders
    }

    fn as_user_defined(&self) -> Option<&UserDefinedOption> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{ConfigErrorKind, EntityDescriptor};
    use strata_query::QueryEntity;

    use crate::mapper::MapperRegistry;
    use crate::property::{ColumnSpec, RelationshipKind, RelationshipSpec, StrategizedProperty};

    fn mapping() -> MapperRegistry {
        let user = Mapper::builder(EntityDescriptor::new("User", "users", ["id"]))
            .column("id")
            .column("name")
            .relationship(
                "addresses",
                RelationshipSpec::new("Address", RelationshipKind::OneToMany).remote_key("user_id"),
            )
            .unwrap()
            .build()
            .unwrap();
        let address = Mapper::builder(EntityDescriptor::new("Address", "addresses", ["id"]))
            .column("id")
            .column("user_id")
            .property(StrategizedProperty::column("street", ColumnSpec::new("street").deferred()))
            .build()
            .unwrap();
        let mut registry = MapperRegistry::new();
        registry.add(user).unwrap();
        registry.add(address).unwrap();
        registry.configure().unwrap();
        registry
    }

    #[test]
    fn test_chain_moves_along_relationships() {
        let registry = mapping();
        let user = registry.get("User").unwrap();
        let load = Load::new(user)
            .joinedload("addresses")
            .unwrap()
            .undefer("street")
            .unwrap();
        assert_eq!(load.path().to_string(), "User/addresses/Address");
        let paths: Vec<String> = load
            .entries()
            .iter()
            .map(|(key, _)| key.path().to_string())
            .collect();
        assert_eq!(paths, vec!["User/addresses", "User/addresses/Address/street"]);
    }

    #[test]
    fn test_relationship_method_on_column_rejected() {
        let registry = mapping();
        let user = registry.get("User").unwrap();
        let err = Load::new(user).joinedload("name").unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        let err = Load::new(user).joinedload("nope").unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnknownProperty));
    }

    #[test]
    fn test_cache_keys_follow_configuration() {
        let registry = mapping();
        let user = registry.get("User").unwrap();
        let a = Load::new(user).joinedload("addresses").unwrap();
        let b = Load::new(user).joinedload("addresses").unwrap();
        let c = Load::new(user).selectinload("addresses").unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), c.cache_key());

        let f1 = with_loader_criteria("Address", "addresses.active = 1");
        let f2 = with_loader_criteria("Address", "addresses.active = 0");
        assert_ne!(
            CompileStateOption::cache_key(&f1),
            CompileStateOption::cache_key(&f2)
        );
    }

    #[test]
    fn test_process_compile_state_checks_root() {
        let registry = mapping();
        let user = registry.get("User").unwrap();
        let load = Load::new(user).lazyload("addresses").unwrap();

        let mut state = CompileState::new(QueryEntity::new("Address", "addresses"));
        let err = load.process_compile_state(&mut state).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        load.process_compile_state_replaced_entities(&mut state)
            .unwrap();
        assert_eq!(state.attributes().len(), 1);
    }

    #[test]
    fn test_criteria_option() {
        let option = with_loader_criteria("Address", "addresses.active = 1");
        assert!(option.propagate_to_loaders());
        assert!(option.as_criteria().is_some());
        let mut state = CompileState::new(QueryEntity::new("User", "users"));
        option.process_compile_state_replaced_entities(&mut state).unwrap();
        assert_eq!(
            state.global_criteria().render("Address").as_deref(),
            Some("addresses.active = 1")
        );
    }

    #[test]
    fn test_user_defined_option() {
        let option = UserDefinedOption::new(serde_json::json!({"cache": "users"})).propagate(true);
        assert!(option.propagate_to_loaders());
        assert!(option.as_compile_state().is_none());
        assert_eq!(option.payload()["cache"], "users");
    }

    #[test]
    fn test_undefer_group_is_non_actionable_wildcard() {
        let registry = mapping();
        let user = registry.get("User").unwrap();
        let load = Load::new(user).undefer_group("media");
        let (key, option) = &load.entries()[0];
        assert_eq!(key.path().to_string(), "User/column:*");
        assert!(!option.is_actionable());
        assert_eq!(option.get_local("undefer_group_media"), Some(&OptionValue::Bool(true)));
    }
}
