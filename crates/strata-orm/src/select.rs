//! ORM SELECT construction and compilation.
//!
//! A [`Select`] names a root entity plus criteria and options. The
//! [`Compiler`] turns it into a [`CompiledSelect`] in one pass over the
//! mapper's properties (phase one), caching the result by the select's
//! structure. [`CompiledSelect::instances`] runs phase two against rows.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use strata_core::{ColumnInfo, Path, Result, Row};
use strata_query::{
    ColumnAdapter, CompileState, EagerJoin, GlobalCriteria, LoadOption, LoadOptions, QueryEntity,
    StatementCache, cache_key,
};

use crate::config::OrmConfig;
use crate::context::{Propagated, QueryContext};
use crate::loading::{LoadResult, instance_processor};
use crate::mapper::Mapper;
use crate::options::{OrmOption, UserDefinedOption, warn_legacy_option};

/// A SELECT of one mapped entity.
#[derive(Clone)]
pub struct Select {
    mapper: Arc<Mapper>,
    entity: QueryEntity,
    options: Vec<Arc<dyn OrmOption>>,
    where_clauses: Vec<String>,
    order_by: Vec<String>,
    entities_replaced: bool,
}

impl Select {
    /// Select every loaded column of `mapper`'s entity.
    pub fn new(mapper: &Arc<Mapper>) -> Self {
        Self {
            mapper: Arc::clone(mapper),
            entity: mapper.query_entity(),
            options: Vec::new(),
            where_clauses: Vec::new(),
            order_by: Vec::new(),
            entities_replaced: false,
        }
    }

    /// Select from the entity under `alias`.
    #[must_use]
    pub fn aliased(mut self, alias: impl Into<Arc<str>>) -> Self {
        self.entity = self.entity.aliased(alias);
        self
    }

    /// Attach an option. Legacy mapper options act on the select right away.
    #[must_use]
    pub fn option(mut self, option: impl OrmOption + 'static) -> Self {
        let option: Arc<dyn OrmOption> = Arc::new(option);
        if let Some(legacy) = option.as_legacy() {
            warn_legacy_option(legacy);
            legacy.process_query(&mut self);
        }
        self.options.push(option);
        self
    }

    /// Attach an option whose legacy hook runs conditionally.
    #[must_use]
    pub fn conditional_option(mut self, option: impl OrmOption + 'static) -> Self {
        let option: Arc<dyn OrmOption> = Arc::new(option);
        if let Some(legacy) = option.as_legacy() {
            warn_legacy_option(legacy);
            legacy.process_query_conditionally(&mut self);
        }
        self.options.push(option);
        self
    }

    /// Add a WHERE criterion written against the entity's table.
    #[must_use]
    pub fn filter(mut self, criteria: impl Into<String>) -> Self {
        self.where_clauses.push(criteria.into());
        self
    }

    #[must_use]
    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by.push(clause.into());
        self
    }

    /// Replace the selected entity, keeping options and criteria.
    ///
    /// Loader options attached earlier are then applied without checking that
    /// they are rooted at the new entity.
    #[must_use]
    pub fn with_entities(mut self, mapper: &Arc<Mapper>) -> Self {
        self.mapper = Arc::clone(mapper);
        self.entity = mapper.query_entity();
        self.entities_replaced = true;
        self
    }

    pub fn mapper(&self) -> &Arc<Mapper> {
        &self.mapper
    }

    pub fn entity(&self) -> &QueryEntity {
        &self.entity
    }

    pub fn options(&self) -> &[Arc<dyn OrmOption>] {
        &self.options
    }

    pub fn where_clauses(&self) -> &[String] {
        &self.where_clauses
    }

    pub fn entities_replaced(&self) -> bool {
        self.entities_replaced
    }

    /// User-defined options, for handing to load-time hooks.
    pub fn user_defined_options(&self) -> Vec<Arc<UserDefinedOption>> {
        self.options
            .iter()
            .filter_map(|o| o.as_user_defined())
            .map(|o| Arc::new(o.clone()))
            .collect()
    }

    /// Structural hash of everything that affects the compiled statement.
    ///
    /// Legacy and user-defined options do not take part.
    pub fn cache_key(&self) -> u64 {
        let option_keys: Vec<u64> = self
            .options
            .iter()
            .filter_map(|o| o.as_compile_state())
            .map(|o| o.cache_key())
            .collect();
        cache_key(&(
            &self.entity,
            &self.where_clauses,
            &self.order_by,
            self.entities_replaced,
            option_keys,
        ))
    }
}

impl fmt::Debug for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Select")
            .field("entity", &self.entity)
            .field("options", &self.options.len())
            .field("where_clauses", &self.where_clauses)
            .field("order_by", &self.order_by)
            .finish()
    }
}

/// A compiled SELECT and everything phase two needs to load its rows.
#[derive(Debug)]
pub struct CompiledSelect {
    sql: String,
    columns: Arc<ColumnInfo>,
    attributes: LoadOptions,
    criteria: GlobalCriteria,
    eager_joins: HashMap<Path, EagerJoin>,
    propagated_loads: Vec<Arc<LoadOption>>,
    mapper: Arc<Mapper>,
    entity: QueryEntity,
    path: Path,
    batch_size: usize,
    eagerloads: bool,
}

impl CompiledSelect {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Result columns in select-list order.
    pub fn columns(&self) -> &Arc<ColumnInfo> {
        &self.columns
    }

    /// Load options carried into follow-up statements.
    pub fn propagated_loads(&self) -> &[Arc<LoadOption>] {
        &self.propagated_loads
    }

    /// Materialize `rows` into instances.
    pub fn instances(&self, rows: &[Row]) -> Result<LoadResult> {
        self.instances_with_options(rows, Vec::new())
    }

    /// Materialize `rows`, carrying `user_options` into follow-up statements.
    pub fn instances_with_options(
        &self,
        rows: &[Row],
        user_options: Vec<Arc<UserDefinedOption>>,
    ) -> Result<LoadResult> {
        let propagated = Propagated {
            load_options: self.propagated_loads.clone(),
            user_options: user_options
                .into_iter()
                .filter(|o| o.propagate_to_loaders())
                .collect(),
        };
        let mut context = QueryContext::new(
            self.attributes.clone(),
            self.criteria.clone(),
            self.eager_joins.clone(),
            self.sql.clone(),
            Arc::new(propagated),
            self.batch_size,
        )
        .with_eagerloads(self.eagerloads);

        let processor = instance_processor(
            &mut context,
            &self.mapper,
            &self.entity,
            &self.path,
            &self.columns,
            None,
        )?;
        let instances = processor.load_all(rows)?;
        let post_loads = context.finish_post_loads();
        tracing::debug!(
            entity = %self.entity.entity(),
            rows = rows.len(),
            instances = instances.len(),
            post_loads = post_loads.len(),
            "Loaded instances"
        );
        Ok(LoadResult {
            instances,
            post_loads,
        })
    }
}

/// Compiles selects, caching compiled statements by structure.
#[derive(Debug)]
pub struct Compiler {
    config: OrmConfig,
    cache: Mutex<StatementCache<Arc<CompiledSelect>>>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(OrmConfig::default())
    }
}

impl Compiler {
    pub fn new(config: OrmConfig) -> Self {
        let cache = StatementCache::new(config.statement_cache_size);
        Self {
            config,
            cache: Mutex::new(cache),
        }
    }

    pub fn config(&self) -> &OrmConfig {
        &self.config
    }

    /// Compile `select`, reusing a cached statement of the same shape.
    #[tracing::instrument(level = "debug", skip(self, select), fields(entity = %select.entity().entity()))]
    pub fn compile(&self, select: &Select) -> Result<Arc<CompiledSelect>> {
        let key = select.cache_key();
        {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(compiled) = cache.get(key) {
                return Ok(Arc::clone(compiled));
            }
        }

        let compiled = Arc::new(self.compile_uncached(select)?);
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        // another thread may have cached the same shape meanwhile; keep its plan
        Ok(Arc::clone(cache.get_or_insert(key, || compiled)))
    }

    /// Compile `select` and load `rows` with its user-defined options.
    pub fn load(&self, select: &Select, rows: &[Row]) -> Result<LoadResult> {
        let compiled = self.compile(select)?;
        compiled.instances_with_options(rows, select.user_defined_options())
    }

    /// Number of statements currently cached.
    pub fn cache_len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of compilations that missed the cache.
    pub fn cache_misses(&self) -> u64 {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).misses()
    }

    fn compile_uncached(&self, select: &Select) -> Result<CompiledSelect> {
        let entity = select.entity().clone();
        let mut state = CompileState::new(entity.clone());
        state.set_entities_replaced(select.entities_replaced());
        state.set_enable_eagerloads(self.config.enable_eagerloads);

        for option in select.options() {
            let Some(option) = option.as_compile_state() else {
                continue;
            };
            if state.entities_replaced() {
                option.process_compile_state_replaced_entities(&mut state)?;
            } else {
                option.process_compile_state(&mut state)?;
            }
        }

        let root_adapter = entity
            .alias()
            .map(|alias| ColumnAdapter::new(Arc::clone(entity.table()), Arc::clone(alias)));
        let adapt = |sql: &str| match &root_adapter {
            Some(adapter) => adapter.adapt_sql(sql),
            None => sql.to_string(),
        };
        for criteria in select.where_clauses() {
            state.add_where(adapt(criteria));
        }
        if let Some(criteria) = state.global_criteria().render(entity.entity()) {
            state.add_where(adapt(&criteria));
        }
        for clause in &select.order_by {
            state.add_order_by(adapt(clause));
        }

        let path = entity.path();
        let mapper = select.mapper();
        for prop in mapper.iterate_properties() {
            prop.setup(&mut state, &entity, &path, None)?;
        }

        let sql = state.to_sql();
        tracing::debug!(sql = %sql, joins = state.joins().len(), "Compiled select");

        Ok(CompiledSelect {
            columns: Arc::new(ColumnInfo::new(state.column_labels())),
            propagated_loads: state.attributes().propagating(),
            attributes: state.attributes().clone(),
            criteria: state.global_criteria().clone(),
            eager_joins: state.eager_joins().clone(),
            mapper: Arc::clone(mapper),
            entity,
            path,
            batch_size: self.config.selectin_batch_size,
            eagerloads: self.config.enable_eagerloads,
            sql,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{EntityDescriptor, Error, Value};

    use crate::mapper::MapperRegistry;
    use crate::options::{Load, MapperOption, UserDefinedOption, with_loader_criteria};
    use crate::property::{RelationshipKind, RelationshipSpec};

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
            .build()
            .unwrap();
        let mut registry = MapperRegistry::new();
        registry.add(user).unwrap();
        registry.add(address).unwrap();
        registry.configure().unwrap();
        registry
    }

    #[derive(Debug)]
    struct OnlyActive;

    impl OrmOption for OnlyActive {
        fn as_legacy(&self) -> Option<&dyn MapperOption> {
            Some(self)
        }
    }

    impl MapperOption for OnlyActive {
        fn process_query(&self, query: &mut Select) {
            query.where_clauses.push("users.active = 1".to_string());
        }
    }

    #[test]
    fn test_compile_default_select() {
        let registry = mapping();
        let user = registry.get("User").unwrap();
        let compiler = Compiler::default();
        let compiled = compiler.compile(&Select::new(user)).unwrap();
        assert_eq!(
            compiled.sql(),
            "SELECT users.id AS users__id, users.name AS users__name FROM users"
        );
        assert_eq!(compiled.columns().names(), ["users__id", "users__name"]);
    }

    #[test]
    fn test_statement_cache_reused_by_shape() {
        let registry = mapping();
        let user = registry.get("User").unwrap();
        let compiler = Compiler::default();

        let a = compiler
            .compile(&Select::new(user).filter("users.id = 1"))
            .unwrap();
        let b = compiler
            .compile(&Select::new(user).filter("users.id = 1"))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(compiler.cache_misses(), 1);

        let joined = Load::new(user).joinedload("addresses").unwrap();
        let c = compiler
            .compile(&Select::new(user).filter("users.id = 1").option(joined))
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(compiler.cache_len(), 2);

        // user-defined options do not change the statement
        let d = compiler
            .compile(
                &Select::new(user)
                    .filter("users.id = 1")
                    .option(UserDefinedOption::new(serde_json::json!(1))),
            )
            .unwrap();
        assert!(Arc::ptr_eq(&a, &d));
    }

    #[test]
    fn test_concurrent_compiles_share_cached_plan() {
        let registry = mapping();
        let user = registry.get("User").unwrap();
        let compiler = Compiler::default();
        let select = Select::new(user).option(Load::new(user).joinedload("addresses").unwrap());

        let barrier = std::sync::Barrier::new(4);
        let plans: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        compiler.compile(&select).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(plans.iter().all(|p| Arc::ptr_eq(p, &plans[0])));
        assert!(plans[0].sql().contains("LEFT JOIN addresses AS addresses_1"));
        assert_eq!(compiler.cache_len(), 1);
        assert_eq!(compiler.cache_misses(), 1);
    }

    #[test]
    fn test_aliased_entity_adapts_criteria() {
        let registry = mapping();
        let user = registry.get("User").unwrap();
        let compiled = Compiler::default()
            .compile(
                &Select::new(user)
                    .aliased("u1")
                    .filter("users.name = 'ed'")
                    .order_by("users.id"),
            )
            .unwrap();
        assert_eq!(
            compiled.sql(),
            "SELECT u1.id AS u1__id, u1.name AS u1__name FROM users AS u1 \
             WHERE u1.name = 'ed' ORDER BY u1.id"
        );
    }

    #[test]
    fn test_loader_criteria_on_root_and_relationship() {
        let registry = mapping();
        let user = registry.get("User").unwrap();
        let joined = Load::new(user).joinedload("addresses").unwrap();
        let compiled = Compiler::default()
            .compile(
                &Select::new(user)
                    .option(joined)
                    .option(with_loader_criteria("User", "users.id > 0"))
                    .option(with_loader_criteria("Address", "addresses.id > 10")),
            )
            .unwrap();
        assert!(compiled.sql().contains(
            "LEFT JOIN addresses AS addresses_1 ON users.id = addresses_1.user_id AND addresses_1.id > 10"
        ));
        assert!(compiled.sql().ends_with("WHERE users.id > 0"));
    }

    #[test]
    fn test_legacy_option_mutates_select() {
        let registry = mapping();
        let user = registry.get("User").unwrap();
        let select = Select::new(user).option(OnlyActive);
        assert_eq!(select.where_clauses(), ["users.active = 1"]);
        let compiled = Compiler::default().compile(&select).unwrap();
        assert!(compiled.sql().ends_with("WHERE users.active = 1"));
    }

    #[test]
    fn test_load_option_rooted_elsewhere_rejected() {
        let registry = mapping();
        let user = registry.get("User").unwrap();
        let address = registry.get("Address").unwrap();
        let lazy = Load::new(user).lazyload("addresses").unwrap();

        let err = Compiler::default()
            .compile(&Select::new(address).option(lazy.clone()))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        // replacing the entity after the option was attached skips the check
        let select = Select::new(user).option(lazy).with_entities(address);
        assert!(Compiler::default().compile(&select).is_ok());
    }

    #[test]
    fn test_load_carries_user_options_to_post_loads() {
        let registry = mapping();
        let user = registry.get("User").unwrap();
        let select = Select::new(user)
            .option(Load::new(user).selectinload("addresses").unwrap())
            .option(UserDefinedOption::new(serde_json::json!("shard-a")).propagate(true))
            .option(UserDefinedOption::new(serde_json::json!("local")));
        let compiler = Compiler::default();
        let compiled = compiler.compile(&select).unwrap();

        let row = Row::with_columns(
            Arc::clone(compiled.columns()),
            vec![Value::BigInt(1), Value::Text("ed".into())],
        );
        let result = compiler.load(&select, &[row]).unwrap();
        assert_eq!(result.instances.len(), 1);
        assert_eq!(result.post_loads.len(), 1);
        let options = &result.post_loads[0].options;
        assert_eq!(options.user_options.len(), 1);
        assert_eq!(options.user_options[0].payload(), &serde_json::json!("shard-a"));
        assert_eq!(options.load_options.len(), 1);
    }

    #[test]
    fn test_eagerloads_disabled_falls_back_to_lazy() {
        let registry = mapping();
        let user = registry.get("User").unwrap();
        let compiler = Compiler::new(OrmConfig::new().enable_eagerloads(false));
        let select = Select::new(user).option(Load::new(user).joinedload("addresses").unwrap());
        let compiled = compiler.compile(&select).unwrap();
        assert!(!compiled.sql().contains("JOIN"));

        let row = Row::with_columns(
            Arc::clone(compiled.columns()),
            vec![Value::BigInt(1), Value::Text("ed".into())],
        );
        let result = compiled.instances(&[row]).unwrap();
        assert!(result.instances[0].deferred("addresses").is_some());
    }
}
