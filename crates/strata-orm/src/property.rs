//! Mapped properties and the per-property strategy dispatch.
//!
//! A [`StrategizedProperty`] owns a default strategy plus a cache of every
//! strategy it has been asked for. On each `setup` / `create_row_processor`
//! it probes the ambient load options with its exact, wildcard and default
//! keys and delegates to the strategy the first hit names, or to its default.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock, Weak};

use strata_core::{
    AttributeImpl, AttributeKind, ColumnInfo, ConfigErrorKind, EntityDescriptor, Error,
    OptionValue, Path, Result, StrategyKey, WildcardTokens, strategy_key,
};
use strata_query::{ColumnAdapter, CompileState, LoadOption, LoadOptions, QueryEntity};

use crate::cascade::CascadeOptions;
use crate::context::{Populators, QueryContext};
use crate::mapper::{Mapper, MapperRegistry};
use crate::registry::{
    self, COLUMN_PROPERTY, COMPOSITE_PROPERTY, PropertyClass, RELATIONSHIP_PROPERTY,
};
use crate::strategy::LoaderStrategy;

/// The type of relationship between two entities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    /// One-to-one: `User` has one `Profile`.
    OneToOne,
    /// Many-to-one: many `Address`es belong to one `User`.
    #[default]
    ManyToOne,
    /// One-to-many: one `User` has many `Address`es.
    OneToMany,
    /// Many-to-many via a link table.
    ManyToMany,
}

/// Link table of a many-to-many relationship.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkTable {
    /// The link table name (e.g. `"user_keywords"`).
    pub table_name: Arc<str>,
    /// Column pointing to the parent entity.
    pub local_column: Arc<str>,
    /// Column pointing to the target entity.
    pub remote_column: Arc<str>,
}

impl LinkTable {
    pub fn new(
        table_name: impl Into<Arc<str>>,
        local_column: impl Into<Arc<str>>,
        remote_column: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            local_column: local_column.into(),
            remote_column: remote_column.into(),
        }
    }
}

/// Column mapping of a column or composite property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    columns: Vec<Arc<str>>,
    deferred: bool,
    raiseload: bool,
    group: Option<Arc<str>>,
    query_expression: bool,
    instrument: bool,
}

impl ColumnSpec {
    pub fn new(column: impl Into<Arc<str>>) -> Self {
        Self::composite([column])
    }

    /// Several columns loaded together into one attribute.
    pub fn composite<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            deferred: false,
            raiseload: false,
            group: None,
            query_expression: false,
            instrument: true,
        }
    }

    /// An attribute with no column that is only populated by `with_expression`.
    pub fn query_expression() -> Self {
        Self {
            query_expression: true,
            ..Self::composite(Vec::<Arc<str>>::new())
        }
    }

    /// Load on first access instead of with the entity.
    #[must_use]
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    /// Deferred, and raise on access instead of loading.
    #[must_use]
    pub fn raiseload(mut self) -> Self {
        self.deferred = true;
        self.raiseload = true;
        self
    }

    /// Deferred group, undeferred together with `undefer_group`.
    #[must_use]
    pub fn group(mut self, group: impl Into<Arc<str>>) -> Self {
        self.deferred = true;
        self.group = Some(group.into());
        self
    }

    /// Select the column but never instrument or populate it.
    #[must_use]
    pub fn instrument(mut self, instrument: bool) -> Self {
        self.instrument = instrument;
        self
    }

    pub fn columns(&self) -> &[Arc<str>] {
        &self.columns
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    pub fn group_name(&self) -> Option<&Arc<str>> {
        self.group.as_ref()
    }

    pub fn is_query_expression(&self) -> bool {
        self.query_expression
    }

    /// The strategy key this mapping loads with by default.
    pub fn default_strategy_key(&self) -> StrategyKey {
        if self.query_expression {
            strategy_key!(query_expression = true)
        } else if !self.instrument {
            strategy_key!(instrument = false)
        } else if self.raiseload {
            strategy_key!(deferred = true, instrument = true, raiseload = true)
        } else if self.deferred {
            strategy_key!(deferred = true, instrument = true)
        } else {
            strategy_key!(deferred = false, instrument = true)
        }
    }
}

/// Relationship mapping.
#[derive(Debug)]
pub struct RelationshipSpec {
    target: Arc<str>,
    kind: RelationshipKind,
    local_key: Option<Arc<str>>,
    remote_key: Option<Arc<str>>,
    link_table: Option<LinkTable>,
    lazy: OptionValue,
    join_depth: Option<usize>,
    innerjoin: bool,
    order_by: Option<String>,
    uselist: Option<bool>,
    cascade: Option<String>,
    target_mapper: OnceLock<Weak<Mapper>>,
}

impl RelationshipSpec {
    pub fn new(target: impl Into<Arc<str>>, kind: RelationshipKind) -> Self {
        Self {
            target: target.into(),
            kind,
            local_key: None,
            remote_key: None,
            link_table: None,
            lazy: OptionValue::from("select"),
            join_depth: None,
            innerjoin: false,
            order_by: None,
            uselist: None,
            cascade: None,
            target_mapper: OnceLock::new(),
        }
    }

    /// Local join column (the foreign key of a many-to-one).
    #[must_use]
    pub fn local_key(mut self, column: impl Into<Arc<str>>) -> Self {
        self.local_key = Some(column.into());
        self
    }

    /// Remote join column (the foreign key of a one-to-many).
    #[must_use]
    pub fn remote_key(mut self, column: impl Into<Arc<str>>) -> Self {
        self.remote_key = Some(column.into());
        self
    }

    #[must_use]
    pub fn link_table(mut self, link: LinkTable) -> Self {
        self.link_table = Some(link);
        self
    }

    /// Default loader: `"select"`, `"joined"`, `"selectin"`, `"subquery"`,
    /// `"immediate"`, `"noload"`, `"raise"`, `"raise_on_sql"`, `true`,
    /// `false` or `OptionValue::None`.
    #[must_use]
    pub fn lazy(mut self, lazy: impl Into<OptionValue>) -> Self {
        self.lazy = lazy.into();
        self
    }

    /// How many levels a self-referential joined load recurses.
    #[must_use]
    pub fn join_depth(mut self, depth: usize) -> Self {
        self.join_depth = Some(depth);
        self
    }

    #[must_use]
    pub fn innerjoin(mut self, innerjoin: bool) -> Self {
        self.innerjoin = innerjoin;
        self
    }

    /// ORDER BY fragment for loaded collections, written against the target table.
    #[must_use]
    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    #[must_use]
    pub fn uselist(mut self, uselist: bool) -> Self {
        self.uselist = Some(uselist);
        self
    }

    /// Cascade string, e.g. `"all, delete-orphan"`.
    #[must_use]
    pub fn cascade(mut self, cascade: impl Into<String>) -> Self {
        self.cascade = Some(cascade.into());
        self
    }

    pub fn target(&self) -> &Arc<str> {
        &self.target
    }

    pub fn kind(&self) -> RelationshipKind {
        self.kind
    }

    pub fn local_key_column(&self) -> Option<&Arc<str>> {
        self.local_key.as_ref()
    }

    pub fn remote_key_column(&self) -> Option<&Arc<str>> {
        self.remote_key.as_ref()
    }

    pub fn link(&self) -> Option<&LinkTable> {
        self.link_table.as_ref()
    }

    pub fn depth_limit(&self) -> Option<usize> {
        self.join_depth
    }

    pub fn is_innerjoin(&self) -> bool {
        self.innerjoin
    }

    pub fn order_by_clause(&self) -> Option<&str> {
        self.order_by.as_deref()
    }

    /// Whether the attribute holds a collection.
    pub fn is_collection(&self) -> bool {
        self.uselist.unwrap_or(matches!(
            self.kind,
            RelationshipKind::OneToMany | RelationshipKind::ManyToMany
        ))
    }

    /// Strategy key of the `lazy` setting.
    pub fn default_strategy_key(&self) -> StrategyKey {
        StrategyKey::new([("lazy", self.lazy.clone())])
    }

    /// The resolved target mapper.
    pub fn target_mapper(&self) -> Result<Arc<Mapper>> {
        self.target_mapper
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| {
                Error::config(
                    ConfigErrorKind::NotConfigured,
                    format!("relationship target '{}' is not configured", self.target),
                )
            })
    }

    pub(crate) fn resolve_target(&self, mapper: &Arc<Mapper>) {
        let _ = self.target_mapper.set(Arc::downgrade(mapper));
    }
}

/// What a property maps.
#[derive(Debug)]
pub enum PropertyKind {
    Column(ColumnSpec),
    Composite(ColumnSpec),
    Relationship(RelationshipSpec),
}

/// The immutable part of a property that its strategies share.
#[derive(Debug)]
pub struct PropertyCore {
    key: Arc<str>,
    class: &'static PropertyClass,
    parent: OnceLock<Arc<EntityDescriptor>>,
    kind: PropertyKind,
}

impl PropertyCore {
    pub fn new(key: impl Into<Arc<str>>, class: &'static PropertyClass, kind: PropertyKind) -> Self {
        Self {
            key: key.into(),
            class,
            parent: OnceLock::new(),
            kind,
        }
    }

    pub fn key(&self) -> &Arc<str> {
        &self.key
    }

    pub fn class(&self) -> &'static PropertyClass {
        self.class
    }

    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    /// The declaring entity.
    pub fn parent(&self) -> Result<&Arc<EntityDescriptor>> {
        self.parent.get().ok_or_else(|| {
            Error::config(
                ConfigErrorKind::NotConfigured,
                format!("property '{}' is not attached to a mapper", self.key),
            )
        })
    }

    pub(crate) fn set_parent(&self, parent: Arc<EntityDescriptor>) -> Result<()> {
        if let Some(existing) = self.parent.get() {
            if existing.name() == parent.name() {
                return Ok(());
            }
            return Err(Error::config(
                ConfigErrorKind::AlreadyInitialized,
                format!(
                    "property '{}' already belongs to {}",
                    self.key,
                    existing.name()
                ),
            ));
        }
        let _ = self.parent.set(parent);
        Ok(())
    }

    /// `Entity.key`, for messages.
    pub fn qualified_name(&self) -> String {
        match self.parent.get() {
            Some(parent) => format!("{}.{}", parent.name(), self.key),
            None => self.key.to_string(),
        }
    }

    pub fn column_spec(&self) -> Option<&ColumnSpec> {
        match &self.kind {
            PropertyKind::Column(spec) | PropertyKind::Composite(spec) => Some(spec),
            PropertyKind::Relationship(_) => None,
        }
    }

    pub fn relationship_spec(&self) -> Option<&RelationshipSpec> {
        match &self.kind {
            PropertyKind::Relationship(spec) => Some(spec),
            _ => None,
        }
    }

    /// Path of this property below the entity path `entity_path`.
    pub fn property_path(&self, entity_path: &Path) -> Result<Path> {
        Ok(entity_path.property(self.parent()?.name(), &self.key))
    }
}

/// Monotonic configure-started / configure-finished flags.
#[derive(Debug, Default)]
pub struct ConfigureFlags {
    started: AtomicBool,
    finished: AtomicBool,
}

impl ConfigureFlags {
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn begin(&self, key: &str) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(Error::config(
                ConfigErrorKind::AlreadyInitialized,
                format!("property '{}' is already initialized", key),
            ));
        }
        Ok(())
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }
}

/// One mapped attribute of an entity.
pub trait MapperProperty: Send + Sync + fmt::Debug {
    fn key(&self) -> &Arc<str>;

    /// Strategy-dispatch class, for strategized properties.
    fn property_class(&self) -> Option<&'static PropertyClass> {
        None
    }

    /// The declaring entity, once attached to a mapper.
    fn parent(&self) -> Option<&Arc<EntityDescriptor>>;

    fn set_parent(&self, parent: Arc<EntityDescriptor>) -> Result<()>;

    /// User metadata.
    fn info(&self) -> &serde_json::Map<String, serde_json::Value>;

    fn cascade(&self) -> CascadeOptions {
        CascadeOptions::none()
    }

    /// Whether the property refers to another entity.
    fn links_to_entity(&self) -> bool {
        false
    }

    fn configure_flags(&self) -> &ConfigureFlags;

    /// Initialize after every mapper exists. Runs [`do_init`](Self::do_init)
    /// exactly once; later calls are rejected.
    fn init(&self, registry: &MapperRegistry) -> Result<()> {
        let flags = self.configure_flags();
        flags.begin(self.key())?;
        self.do_init(registry)?;
        flags.finish();
        Ok(())
    }

    fn do_init(&self, registry: &MapperRegistry) -> Result<()> {
        let _ = registry;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.configure_flags().is_finished()
    }

    /// Hook run after the mapped class is instrumented.
    fn post_instrument_class(&self, mapper: &Mapper) -> Result<()> {
        let _ = mapper;
        Ok(())
    }

    /// Phase one: shape the statement. `path` is the entity path.
    fn setup(
        &self,
        state: &mut CompileState,
        query_entity: &QueryEntity,
        path: &Path,
        adapter: Option<&ColumnAdapter>,
    ) -> Result<()> {
        let _ = (state, query_entity, path, adapter);
        Ok(())
    }

    /// Phase two: append populators. `path` is the entity path.
    #[allow(clippy::too_many_arguments)]
    fn create_row_processor(
        &self,
        context: &mut QueryContext,
        query_entity: &QueryEntity,
        path: &Path,
        mapper: &Mapper,
        result: &ColumnInfo,
        adapter: Option<&ColumnAdapter>,
        populators: &mut Populators,
    ) -> Result<()> {
        let _ = (context, query_entity, path, mapper, result, adapter, populators);
        Ok(())
    }

    /// The class-level attribute implementation for this key on `mapper`.
    fn class_attribute(&self, mapper: &Mapper) -> Option<AttributeImpl> {
        mapper.class_manager().get(self.key())
    }

    /// Columns selected by default when the target entity is loaded.
    fn loaded_columns(&self) -> Vec<Arc<str>> {
        Vec::new()
    }

    fn as_strategized(&self) -> Option<&StrategizedProperty> {
        None
    }
}

/// A property whose loading is delegated to a [`LoaderStrategy`].
pub struct StrategizedProperty {
    core: Arc<PropertyCore>,
    strategy_key: StrategyKey,
    info: serde_json::Map<String, serde_json::Value>,
    cascade: CascadeOptions,
    flags: ConfigureFlags,
    strategy: OnceLock<Arc<dyn LoaderStrategy>>,
    strategies: RwLock<HashMap<StrategyKey, Arc<dyn LoaderStrategy>>>,
    tokens: OnceLock<Option<WildcardTokens>>,
}

impl StrategizedProperty {
    fn with_core(core: PropertyCore, strategy_key: StrategyKey, cascade: CascadeOptions) -> Self {
        Self {
            core: Arc::new(core),
            strategy_key,
            info: serde_json::Map::new(),
            cascade,
            flags: ConfigureFlags::default(),
            strategy: OnceLock::new(),
            strategies: RwLock::new(HashMap::new()),
            tokens: OnceLock::new(),
        }
    }

    /// A column-backed property.
    pub fn column(key: impl Into<Arc<str>>, spec: ColumnSpec) -> Self {
        let strategy_key = spec.default_strategy_key();
        let core = PropertyCore::new(key, &COLUMN_PROPERTY, PropertyKind::Column(spec));
        Self::with_core(core, strategy_key, CascadeOptions::none())
    }

    /// A multi-column property loaded as an array value.
    pub fn composite(key: impl Into<Arc<str>>, spec: ColumnSpec) -> Self {
        let strategy_key = spec.default_strategy_key();
        let core = PropertyCore::new(key, &COMPOSITE_PROPERTY, PropertyKind::Composite(spec));
        Self::with_core(core, strategy_key, CascadeOptions::none())
    }

    /// A relationship property.
    pub fn relationship(key: impl Into<Arc<str>>, spec: RelationshipSpec) -> Result<Self> {
        let cascade = match &spec.cascade {
            Some(text) => CascadeOptions::parse(text)?,
            None => CascadeOptions::relationship_default(),
        };
        let strategy_key = spec.default_strategy_key();
        let core = PropertyCore::new(key, &RELATIONSHIP_PROPERTY, PropertyKind::Relationship(spec));
        Ok(Self::with_core(core, strategy_key, cascade))
    }

    /// Attach a user metadata entry.
    #[must_use]
    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.info.insert(key.into(), value.into());
        self
    }

    pub fn core(&self) -> &Arc<PropertyCore> {
        &self.core
    }

    /// The default strategy key.
    pub fn default_strategy_key(&self) -> &StrategyKey {
        &self.strategy_key
    }

    /// The default strategy, available once initialized.
    pub fn strategy(&self) -> Result<Arc<dyn LoaderStrategy>> {
        self.strategy.get().cloned().ok_or_else(|| {
            Error::config(
                ConfigErrorKind::NotConfigured,
                format!("property '{}' is not initialized", self.core.qualified_name()),
            )
        })
    }

    /// Strategy for `key`, built on first request and cached thereafter.
    pub fn get_strategy(&self, key: &StrategyKey) -> Result<Arc<dyn LoaderStrategy>> {
        {
            let cache = self.strategies.read().unwrap_or_else(|e| e.into_inner());
            if let Some(strategy) = cache.get(key) {
                return Ok(Arc::clone(strategy));
            }
        }

        let imp = registry::lookup_strategy(self.core.class(), &self.core.qualified_name(), key)?;
        let built = (imp.factory)(Arc::clone(&self.core), key.clone())?;

        let mut cache = self.strategies.write().unwrap_or_else(|e| e.into_inner());
        let strategy = cache.entry(key.clone()).or_insert_with(|| {
            tracing::debug!(
                property = %self.core.qualified_name(),
                strategy = imp.name,
                key = %key,
                "Constructed loader strategy"
            );
            built
        });
        Ok(Arc::clone(strategy))
    }

    /// Number of strategies constructed so far.
    pub fn cached_strategy_count(&self) -> usize {
        let cache = self.strategies.read().unwrap_or_else(|e| e.into_inner());
        cache.len()
    }

    /// Wildcard tokens of this property's category, computed once.
    pub fn wildcard_tokens(&self) -> Option<&WildcardTokens> {
        self.tokens
            .get_or_init(|| self.core.class().wildcard_key().map(WildcardTokens::new))
            .as_ref()
    }

    /// The ambient load option governing `path` (a property path), if any.
    pub fn context_loader(&self, options: &LoadOptions, path: &Path) -> Option<Arc<LoadOption>> {
        if options.is_empty() {
            return None;
        }
        let tokens = self.wildcard_tokens()?;
        let keys = path.loader_keys(tokens);
        options.find(&keys).cloned()
    }

    /// The strategy a load option selects, or the default.
    pub fn resolve_strategy(&self, load_option: Option<&LoadOption>) -> Result<Arc<dyn LoaderStrategy>> {
        match load_option.and_then(LoadOption::strategy_key) {
            Some(key) => self.get_strategy(key),
            None => self.strategy(),
        }
    }
}

impl fmt::Debug for StrategizedProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategizedProperty")
            .field("key", self.core.key())
            .field("class", &self.core.class().name())
            .field("strategy_key", &self.strategy_key.to_string())
            .field("initialized", &self.flags.is_finished())
            .finish()
    }
}

impl MapperProperty for StrategizedProperty {
    fn key(&self) -> &Arc<str> {
        self.core.key()
    }

    fn property_class(&self) -> Option<&'static PropertyClass> {
        Some(self.core.class())
    }

    fn parent(&self) -> Option<&Arc<EntityDescriptor>> {
        self.core.parent.get()
    }

    fn set_parent(&self, parent: Arc<EntityDescriptor>) -> Result<()> {
        self.core.set_parent(parent)
    }

    fn info(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.info
    }

    fn cascade(&self) -> CascadeOptions {
        self.cascade
    }

    fn links_to_entity(&self) -> bool {
        self.core.relationship_spec().is_some()
    }

    fn configure_flags(&self) -> &ConfigureFlags {
        &self.flags
    }

    fn do_init(&self, registry: &MapperRegistry) -> Result<()> {
        if let Some(spec) = self.core.relationship_spec() {
            let target = registry.get(spec.target()).ok_or_else(|| {
                Error::config(
                    ConfigErrorKind::MissingTarget,
                    format!(
                        "relationship '{}' refers to unmapped entity '{}'",
                        self.core.qualified_name(),
                        spec.target()
                    ),
                )
            })?;
            spec.resolve_target(target);
        }
        let strategy = self.get_strategy(&self.strategy_key)?;
        let _ = self.strategy.set(strategy);
        Ok(())
    }

    fn post_instrument_class(&self, mapper: &Mapper) -> Result<()> {
        if !mapper.non_primary() && !mapper.class_manager().has_impl(self.key()) {
            self.strategy()?.init_class_attribute(mapper)?;
        }
        Ok(())
    }

    fn setup(
        &self,
        state: &mut CompileState,
        query_entity: &QueryEntity,
        path: &Path,
        adapter: Option<&ColumnAdapter>,
    ) -> Result<()> {
        let path = self.core.property_path(path)?;
        let load_option = self.context_loader(state.attributes(), &path);
        let strategy = self.resolve_strategy(load_option.as_deref())?;
        tracing::trace!(path = %path, strategy = strategy.name(), "setup");
        strategy.setup_query(state, query_entity, &path, load_option.as_deref(), adapter)
    }

    fn create_row_processor(
        &self,
        context: &mut QueryContext,
        query_entity: &QueryEntity,
        path: &Path,
        mapper: &Mapper,
        result: &ColumnInfo,
        adapter: Option<&ColumnAdapter>,
        populators: &mut Populators,
    ) -> Result<()> {
        let path = self.core.property_path(path)?;
        let load_option = self.context_loader(context.attributes(), &path);
        let strategy = self.resolve_strategy(load_option.as_deref())?;
        tracing::trace!(path = %path, strategy = strategy.name(), "create_row_processor");
        strategy.create_row_processor(
            context,
            query_entity,
            &path,
            load_option.as_deref(),
            mapper,
            result,
            adapter,
            populators,
        )
    }

    fn loaded_columns(&self) -> Vec<Arc<str>> {
        match self.core.column_spec() {
            Some(spec) if !spec.is_deferred() && !spec.is_query_expression() => spec.columns().to_vec(),
            _ => Vec::new(),
        }
    }

    fn as_strategized(&self) -> Option<&StrategizedProperty> {
        Some(self)
    }
}

/// An alternate name for another attribute of the same entity.
#[derive(Debug)]
pub struct SynonymProperty {
    key: Arc<str>,
    name: Arc<str>,
    parent: OnceLock<Arc<EntityDescriptor>>,
    info: serde_json::Map<String, serde_json::Value>,
    flags: ConfigureFlags,
}

impl SynonymProperty {
    /// `key` proxies the attribute `name`.
    pub fn new(key: impl Into<Arc<str>>, name: impl Into<Arc<str>>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            parent: OnceLock::new(),
            info: serde_json::Map::new(),
            flags: ConfigureFlags::default(),
        }
    }

    /// The proxied attribute.
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }
}

impl MapperProperty for SynonymProperty {
    fn key(&self) -> &Arc<str> {
        &self.key
    }

    fn parent(&self) -> Option<&Arc<EntityDescriptor>> {
        self.parent.get()
    }

    fn set_parent(&self, parent: Arc<EntityDescriptor>) -> Result<()> {
        let _ = self.parent.set(parent);
        Ok(())
    }

    fn info(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.info
    }

    fn configure_flags(&self) -> &ConfigureFlags {
        &self.flags
    }

    fn do_init(&self, registry: &MapperRegistry) -> Result<()> {
        let parent = self.parent.get().ok_or_else(|| {
            Error::config(
                ConfigErrorKind::NotConfigured,
                format!("synonym '{}' is not attached to a mapper", self.key),
            )
        })?;
        let mapper = registry.get(parent.name()).ok_or_else(|| {
            Error::config(
                ConfigErrorKind::MissingTarget,
                format!("entity '{}' is not mapped", parent.name()),
            )
        })?;
        mapper.get_property(&self.name).map(|_| ())
    }

    fn post_instrument_class(&self, mapper: &Mapper) -> Result<()> {
        let kind = match mapper.get_property(&self.name)?.as_strategized() {
            Some(prop) => match prop.core().relationship_spec() {
                Some(spec) if spec.is_collection() => AttributeKind::Collection,
                Some(_) => AttributeKind::Object,
                None => AttributeKind::Scalar,
            },
            None => AttributeKind::Scalar,
        };
        mapper.class_manager().install(AttributeImpl {
            key: Arc::clone(&self.key),
            kind,
            callable: None,
            installed_by: "SynonymProperty",
        });
        Ok(())
    }

    fn class_attribute(&self, mapper: &Mapper) -> Option<AttributeImpl> {
        mapper.class_manager().get(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_default_keys() {
        assert_eq!(
            ColumnSpec::new("name").default_strategy_key(),
            strategy_key!(deferred = false, instrument = true)
        );
        assert_eq!(
            ColumnSpec::new("bio").deferred().default_strategy_key(),
            strategy_key!(deferred = true, instrument = true)
        );
        assert_eq!(
            ColumnSpec::new("bio").raiseload().default_strategy_key(),
            strategy_key!(deferred = true, instrument = true, raiseload = true)
        );
        assert_eq!(
            ColumnSpec::new("photo").group("media").default_strategy_key(),
            strategy_key!(deferred = true, instrument = true)
        );
        assert_eq!(
            ColumnSpec::query_expression().default_strategy_key(),
            strategy_key!(query_expression = true)
        );
        assert_eq!(
            ColumnSpec::new("x").instrument(false).default_strategy_key(),
            strategy_key!(instrument = false)
        );
    }

    #[test]
    fn test_relationship_defaults() {
        let spec = RelationshipSpec::new("Address", RelationshipKind::OneToMany).remote_key("user_id");
        assert!(spec.is_collection());
        assert_eq!(spec.default_strategy_key(), strategy_key!(lazy = "select"));

        let spec = RelationshipSpec::new("User", RelationshipKind::ManyToOne)
            .local_key("user_id")
            .lazy(false);
        assert!(!spec.is_collection());
        assert_eq!(spec.default_strategy_key(), strategy_key!(lazy = false));
        assert!(spec.target_mapper().is_err());
    }

    #[test]
    fn test_relationship_cascade() {
        let prop = StrategizedProperty::relationship(
            "addresses",
            RelationshipSpec::new("Address", RelationshipKind::OneToMany).cascade("all, delete-orphan"),
        )
        .unwrap();
        assert!(prop.cascade().delete_orphan);
        assert!(prop.links_to_entity());

        let err = StrategizedProperty::relationship(
            "addresses",
            RelationshipSpec::new("Address", RelationshipKind::OneToMany).cascade("bogus"),
        )
        .unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::InvalidCascade));

        let plain = StrategizedProperty::relationship(
            "user",
            RelationshipSpec::new("User", RelationshipKind::ManyToOne),
        )
        .unwrap();
        assert_eq!(plain.cascade(), CascadeOptions::relationship_default());
    }

    #[test]
    fn test_wildcard_tokens_follow_class() {
        let name = StrategizedProperty::column("name", ColumnSpec::new("name"));
        assert_eq!(
            name.wildcard_tokens().map(|t| t.wildcard_token().to_string()),
            Some("column:*".to_string())
        );
        let point = StrategizedProperty::composite("point", ColumnSpec::composite(["x", "y"]));
        assert_eq!(
            point.wildcard_tokens().map(|t| t.wildcard_token().to_string()),
            Some("column:*".to_string())
        );
    }

    #[test]
    fn test_get_strategy_is_memoized() {
        let prop = StrategizedProperty::column("name", ColumnSpec::new("name"))
            .with_info("doc", "display name");
        let key = strategy_key!(deferred = true, instrument = true);
        let a = prop.get_strategy(&key).unwrap();
        let b = prop
            .get_strategy(&strategy_key!(instrument = true, deferred = true))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(prop.cached_strategy_count(), 1);
        assert_eq!(a.name(), "DeferredColumnLoader");
        assert_eq!(prop.info().get("doc"), Some(&serde_json::json!("display name")));
    }

    #[test]
    fn test_strategy_before_init_is_an_error() {
        let prop = StrategizedProperty::column("name", ColumnSpec::new("name"));
        let err = prop.strategy().unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::NotConfigured));
    }

    #[test]
    fn test_relationship_key_on_column_fails() {
        let prop = StrategizedProperty::column("name", ColumnSpec::new("name"));
        let err = prop.get_strategy(&strategy_key!(lazy = "joined")).err();
        assert!(err.is_some_and(|e| e.is_loader_strategy()));
        assert_eq!(prop.cached_strategy_count(), 0);
    }
}
