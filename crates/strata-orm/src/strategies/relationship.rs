//! Relationship loading strategies.
//!
//! Every strategy here derives the join between the parent and target
//! entity from the relationship's [`JoinShape`]. The lazy family schedules a
//! per-instance statement; `JoinedLoader` adds an aliased join to the parent
//! statement; the post-load family (`selectin`, `subquery`, `immediate`)
//! collects parent keys and emits follow-up statements once the result is
//! consumed.

use std::fmt::Write as _;
use std::sync::Arc;

use strata_core::{
    AttributeImpl, AttributeKind, ColumnInfo, EntityDescriptor, EntityToken, Error,
    LoaderCallable, LoaderKey, Path, Result, StrategyKey,
};
use strata_query::{
    ColumnAdapter, CompileState, EagerJoin, GlobalCriteria, Join, JoinType, LoadOption,
    QueryEntity, column_label, qualified_column, selectable_for,
};

use super::relationship_spec;
use crate::context::{
    PopulatorBucket, Populators, PostLoad, PostLoadKeys, Propagated, QueryContext,
    populator, post_load_finisher,
};
use crate::loading::{DeferredLoad, LoadTrigger, LoadedValue, instance_processor};
use crate::mapper::Mapper;
use crate::property::{LinkTable, PropertyCore, RelationshipKind, RelationshipSpec};
use crate::registry::StrategyImpl;
use crate::strategy::{LoaderStrategy, StrategyBase};

/// How parent rows relate to target rows.
#[derive(Debug, Clone, PartialEq, Eq)]
enum JoinShape {
    /// `parent.parent_col = target.target_col`
    Direct {
        parent_col: Arc<str>,
        target_col: Arc<str>,
    },
    /// `parent.parent_col = link.local`, `link.remote = target.target_col`
    Link {
        link: LinkTable,
        parent_col: Arc<str>,
        target_col: Arc<str>,
    },
}

impl JoinShape {
    fn resolve(
        core: &PropertyCore,
        spec: &RelationshipSpec,
        parent: &EntityDescriptor,
        target: &Mapper,
        path: &Path,
    ) -> Result<Self> {
        let parent_pk = parent.primary_key().first().cloned();
        let target_pk = target.entity().primary_key().first().cloned();
        let local = spec.local_key_column().cloned();
        let remote = spec.remote_key_column().cloned();

        let many_to_one = || match (local.clone(), remote.clone().or(target_pk.clone())) {
            (Some(parent_col), Some(target_col)) => Some(JoinShape::Direct {
                parent_col,
                target_col,
            }),
            _ => None,
        };
        let one_to_many = || match (local.clone().or(parent_pk.clone()), remote.clone()) {
            (Some(parent_col), Some(target_col)) => Some(JoinShape::Direct {
                parent_col,
                target_col,
            }),
            _ => None,
        };

        let shape = match spec.kind() {
            RelationshipKind::ManyToOne => many_to_one(),
            RelationshipKind::OneToMany => one_to_many(),
            RelationshipKind::OneToOne if local.is_some() => many_to_one(),
            RelationshipKind::OneToOne => one_to_many(),
            RelationshipKind::ManyToMany => match (
                spec.link(),
                local.clone().or(parent_pk.clone()),
                remote.clone().or(target_pk.clone()),
            ) {
                (Some(link), Some(parent_col), Some(target_col)) => Some(JoinShape::Link {
                    link: link.clone(),
                    parent_col,
                    target_col,
                }),
                _ => None,
            },
        };

        shape.ok_or_else(|| {
            Error::compile(
                format!(
                    "relationship '{}' has no join columns to {}",
                    core.qualified_name(),
                    spec.target()
                ),
                Some(path.to_string()),
            )
        })
    }

    fn parent_col(&self) -> &Arc<str> {
        match self {
            JoinShape::Direct { parent_col, .. } | JoinShape::Link { parent_col, .. } => parent_col,
        }
    }

    /// The expression parent key values are compared against.
    fn compare_column(&self, target_table: &str) -> String {
        match self {
            JoinShape::Direct { target_col, .. } => qualified_column(target_table, target_col),
            JoinShape::Link { link, .. } => qualified_column(&link.table_name, &link.local_column),
        }
    }

    /// `FROM` fragment of statements loading the target.
    fn target_from(&self, target_table: &str) -> String {
        match self {
            JoinShape::Direct { .. } => target_table.to_string(),
            JoinShape::Link {
                link, target_col, ..
            } => format!(
                "{} JOIN {} ON {} = {}",
                target_table,
                link.table_name,
                qualified_column(&link.table_name, &link.remote_column),
                qualified_column(target_table, target_col)
            ),
        }
    }
}

/// Everything needed to load a relationship in its own statement.
#[derive(Debug, Clone)]
struct RelatedLoad {
    key: Arc<str>,
    target: Arc<str>,
    collection: bool,
    /// Result label of the parent join column
    parent_label: String,
    select: String,
    compare: String,
    criteria: Option<String>,
    order_by: Option<String>,
}

impl RelatedLoad {
    fn new(
        core: &PropertyCore,
        spec: &RelationshipSpec,
        shape: &JoinShape,
        target: &Mapper,
        query_entity: &QueryEntity,
        adapter: Option<&ColumnAdapter>,
        criteria: &GlobalCriteria,
    ) -> Self {
        let table = target.table();
        let columns = target
            .loaded_columns()
            .iter()
            .map(|column| format!("{} AS {}", qualified_column(table, column), column_label(table, column)))
            .collect::<Vec<_>>();
        let select_list = if columns.is_empty() {
            "*".to_string()
        } else {
            columns.join(", ")
        };
        Self {
            key: Arc::clone(core.key()),
            target: Arc::clone(target.name()),
            collection: spec.is_collection(),
            parent_label: column_label(selectable_for(query_entity, adapter), shape.parent_col()),
            select: format!("SELECT {} FROM {}", select_list, shape.target_from(table)),
            compare: shape.compare_column(table),
            criteria: criteria.render(target.name()),
            order_by: spec.order_by_clause().map(str::to_string),
        }
    }

    fn finish(&self, condition: &str) -> String {
        let mut sql = format!("{} WHERE {}", self.select, condition);
        if let Some(criteria) = &self.criteria {
            let _ = write!(sql, " AND {}", criteria);
        }
        if let Some(order_by) = &self.order_by {
            let _ = write!(sql, " ORDER BY {}", order_by);
        }
        sql
    }

    /// Statement for one parent.
    fn equals_sql(&self) -> String {
        self.finish(&format!("{} = ?", self.compare))
    }

    /// Statement for a batch of parents.
    fn in_sql(&self, count: usize) -> String {
        let placeholders = vec!["?"; count].join(", ");
        self.finish(&format!("{} IN ({})", self.compare, placeholders))
    }

    fn empty_value(&self) -> LoadedValue {
        empty_value(self.collection)
    }
}

fn empty_value(collection: bool) -> LoadedValue {
    if collection {
        LoadedValue::Collection(Vec::new())
    } else {
        LoadedValue::Object(None)
    }
}

fn attribute_kind(spec: &RelationshipSpec) -> AttributeKind {
    if spec.is_collection() {
        AttributeKind::Collection
    } else {
        AttributeKind::Object
    }
}

/// Install the lazy-load class attribute. Every loading strategy except
/// `noload` and the raise variants shares it.
fn install_lazy_attribute(base: &StrategyBase, mapper: &Mapper, callable: LoaderCallable) -> Result<()> {
    base.mark_class_level();
    let core = base.parent_property();
    let spec = relationship_spec(core, "LazyLoader")?;
    let installed_by = match callable {
        LoaderCallable::NoLoad => "NoLoader",
        _ => "LazyLoader",
    };
    mapper.class_manager().install(AttributeImpl {
        key: Arc::clone(core.key()),
        kind: attribute_kind(spec),
        callable: Some(callable),
        installed_by,
    });
    Ok(())
}

/// Select the parent join column so row processors can read it.
fn select_parent_column(
    base: &StrategyBase,
    state: &mut CompileState,
    query_entity: &QueryEntity,
    path: &Path,
    adapter: Option<&ColumnAdapter>,
) -> Result<()> {
    let core = base.parent_property();
    let spec = relationship_spec(core, "relationship loader")?;
    let target = spec.target_mapper()?;
    let shape = JoinShape::resolve(core, spec, core.parent()?, &target, path)?;
    let selectable = selectable_for(query_entity, adapter);
    state.add_column(
        qualified_column(selectable, shape.parent_col()),
        column_label(selectable, shape.parent_col()),
    );
    Ok(())
}

fn related_load(
    base: &StrategyBase,
    context: &QueryContext,
    query_entity: &QueryEntity,
    path: &Path,
    adapter: Option<&ColumnAdapter>,
) -> Result<RelatedLoad> {
    let core = base.parent_property();
    let spec = relationship_spec(core, "relationship loader")?;
    let target = spec.target_mapper()?;
    let shape = JoinShape::resolve(core, spec, core.parent()?, &target, path)?;
    Ok(RelatedLoad::new(
        core,
        spec,
        &shape,
        &target,
        query_entity,
        adapter,
        context.global_criteria(),
    ))
}

/// Populators that schedule a per-instance load on first access.
fn lazy_row_processor(
    base: &StrategyBase,
    context: &QueryContext,
    query_entity: &QueryEntity,
    path: &Path,
    adapter: Option<&ColumnAdapter>,
    raise: Option<bool>,
    populators: &mut Populators,
) -> Result<()> {
    let key = base.parent_property().key();
    let options = Arc::clone(context.propagated());

    if let Some(sql_only) = raise {
        let attr = Arc::clone(key);
        populators.push(
            PopulatorBucket::New,
            key,
            populator(move |_, state| {
                state.set_deferred(DeferredLoad {
                    key: Arc::clone(&attr),
                    strategy: "LazyLoader",
                    trigger: LoadTrigger::Raise { sql_only },
                    options: Arc::clone(&options),
                });
                Ok(())
            }),
        );
        return Ok(());
    }

    let load = related_load(base, context, query_entity, path, adapter)?;
    let sql = load.equals_sql();
    populators.push(
        PopulatorBucket::New,
        key,
        populator(move |row, state| {
            match row.get_by_name(&load.parent_label) {
                None => {}
                Some(value) if value.is_null() => state.set(&load.key, load.empty_value()),
                Some(value) => state.set_deferred(DeferredLoad {
                    key: Arc::clone(&load.key),
                    strategy: "LazyLoader",
                    trigger: LoadTrigger::Sql {
                        sql: sql.clone(),
                        params: vec![value.clone()],
                    },
                    options: Arc::clone(&options),
                }),
            }
            Ok(())
        }),
    );
    Ok(())
}

/// Register a post-load for `path` and collect parent keys into it.
///
/// Parents with a NULL join value get the empty value immediately.
fn collect_parent_keys(
    load: &RelatedLoad,
    keys: PostLoadKeys,
    bucket: PopulatorBucket,
    populators: &mut Populators,
) {
    let label = load.parent_label.clone();
    let attr = Arc::clone(&load.key);
    let empty_collection = load.collection;
    populators.push(
        bucket,
        &load.key,
        populator(move |row, state| {
            match row.get_by_name(&label) {
                None => {}
                Some(value) if value.is_null() => state.set(&attr, empty_value(empty_collection)),
                Some(value) => keys.push(vec![value.clone()]),
            }
            Ok(())
        }),
    );
}

/// Loads the relationship in its own statement on first access.
///
/// Registered for `lazy="select"` / `lazy=True`, and for the raise variants,
/// which refuse to load instead.
#[derive(Debug)]
pub struct LazyLoader {
    base: StrategyBase,
    raise: Option<bool>,
}

impl LazyLoader {
    pub const IMPL: StrategyImpl = StrategyImpl::new("LazyLoader", Self::create);

    fn create(core: Arc<PropertyCore>, key: StrategyKey) -> Result<Arc<dyn LoaderStrategy>> {
        relationship_spec(&core, "LazyLoader")?;
        let raise = match key.get_str("lazy") {
            Some("raise") => Some(false),
            Some("raise_on_sql") => Some(true),
            _ => None,
        };
        Ok(Arc::new(Self {
            base: StrategyBase::new(core, key),
            raise,
        }))
    }
}

impl LoaderStrategy for LazyLoader {
    fn name(&self) -> &'static str {
        "LazyLoader"
    }

    fn base(&self) -> &StrategyBase {
        &self.base
    }

    fn init_class_attribute(&self, mapper: &Mapper) -> Result<()> {
        let callable = match self.raise {
            Some(sql_only) => LoaderCallable::Raise { sql_only },
            None => LoaderCallable::Lazy,
        };
        install_lazy_attribute(&self.base, mapper, callable)
    }

    fn setup_query(
        &self,
        state: &mut CompileState,
        query_entity: &QueryEntity,
        path: &Path,
        _load_option: Option<&LoadOption>,
        adapter: Option<&ColumnAdapter>,
    ) -> Result<()> {
        if self.raise.is_some() {
            return Ok(());
        }
        select_parent_column(&self.base, state, query_entity, path, adapter)
    }

    fn create_row_processor(
        &self,
        context: &mut QueryContext,
        query_entity: &QueryEntity,
        path: &Path,
        _load_option: Option<&LoadOption>,
        _mapper: &Mapper,
        _result: &ColumnInfo,
        adapter: Option<&ColumnAdapter>,
        populators: &mut Populators,
    ) -> Result<()> {
        lazy_row_processor(&self.base, context, query_entity, path, adapter, self.raise, populators)
    }
}

/// Never loads; the attribute is populated with its empty value.
#[derive(Debug)]
pub struct NoLoader {
    base: StrategyBase,
    collection: bool,
}

impl NoLoader {
    pub const IMPL: StrategyImpl = StrategyImpl::new("NoLoader", Self::create);

    fn create(core: Arc<PropertyCore>, key: StrategyKey) -> Result<Arc<dyn LoaderStrategy>> {
        let collection = relationship_spec(&core, "NoLoader")?.is_collection();
        Ok(Arc::new(Self {
            base: StrategyBase::new(core, key),
            collection,
        }))
    }
}

impl LoaderStrategy for NoLoader {
    fn name(&self) -> &'static str {
        "NoLoader"
    }

    fn base(&self) -> &StrategyBase {
        &self.base
    }

    fn init_class_attribute(&self, mapper: &Mapper) -> Result<()> {
        install_lazy_attribute(&self.base, mapper, LoaderCallable::NoLoad)
    }

    fn create_row_processor(
        &self,
        _context: &mut QueryContext,
        _query_entity: &QueryEntity,
        _path: &Path,
        _load_option: Option<&LoadOption>,
        _mapper: &Mapper,
        _result: &ColumnInfo,
        _adapter: Option<&ColumnAdapter>,
        populators: &mut Populators,
    ) -> Result<()> {
        let key = self.base.parent_property().key();
        let attr = Arc::clone(key);
        let collection = self.collection;
        populators.push(
            PopulatorBucket::New,
            key,
            populator(move |_, state| {
                state.set(&attr, empty_value(collection));
                Ok(())
            }),
        );
        Ok(())
    }
}

/// Loads the relationship through an aliased join in the parent statement.
#[derive(Debug)]
pub struct JoinedLoader {
    base: StrategyBase,
}

impl JoinedLoader {
    pub const IMPL: StrategyImpl = StrategyImpl::new("JoinedLoader", Self::create);

    fn create(core: Arc<PropertyCore>, key: StrategyKey) -> Result<Arc<dyn LoaderStrategy>> {
        relationship_spec(&core, "JoinedLoader")?;
        Ok(Arc::new(Self {
            base: StrategyBase::new(core, key),
        }))
    }

    /// Whether a joined load at `path` would recurse without bound.
    ///
    /// Only applies when no load option names this exact path.
    fn stops_at(&self, state: &CompileState, path: &Path, spec: &RelationshipSpec, target: &Mapper) -> bool {
        if state.attributes().get(&LoaderKey::new(path.natural_path())).is_some() {
            return false;
        }
        match spec.depth_limit() {
            Some(depth) => path.len() / 2 > depth,
            None => path.parent().contains_entity(target.name()),
        }
    }

    fn join_type(&self, state: &CompileState, path: &Path, spec: &RelationshipSpec, load_option: Option<&LoadOption>) -> JoinType {
        let innerjoin = load_option
            .and_then(|option| option.get_local("innerjoin"))
            .map_or(spec.is_innerjoin(), |value| value.is_truthy());
        if !innerjoin {
            return JoinType::Left;
        }
        // an inner join chained to an outer join would drop parent rows
        match state.eager_join(&path.parent().parent()) {
            Some(parent) if parent.join_type == JoinType::Left => JoinType::Left,
            _ => JoinType::Inner,
        }
    }

    fn target_path(path: &Path, target: &Mapper) -> Path {
        path.child_entity(EntityToken::new(Arc::clone(target.name())))
    }
}

impl LoaderStrategy for JoinedLoader {
    fn name(&self) -> &'static str {
        "JoinedLoader"
    }

    fn base(&self) -> &StrategyBase {
        &self.base
    }

    fn init_class_attribute(&self, mapper: &Mapper) -> Result<()> {
        install_lazy_attribute(&self.base, mapper, LoaderCallable::Lazy)
    }

    fn setup_query(
        &self,
        state: &mut CompileState,
        query_entity: &QueryEntity,
        path: &Path,
        load_option: Option<&LoadOption>,
        adapter: Option<&ColumnAdapter>,
    ) -> Result<()> {
        let core = self.base.parent_property();
        let spec = relationship_spec(core, self.name())?;
        let target = spec.target_mapper()?;

        if state.eager_join(path).is_some() {
            return Ok(());
        }
        // rows must carry the join value for the lazy fallback
        if !state.enable_eagerloads() {
            return select_parent_column(&self.base, state, query_entity, path, adapter);
        }
        if self.stops_at(state, path, spec, &target) {
            tracing::trace!(path = %path, "Joined eager load stops at recursion limit");
            return select_parent_column(&self.base, state, query_entity, path, adapter);
        }

        let shape = JoinShape::resolve(core, spec, core.parent()?, &target, path)?;
        let join_type = self.join_type(state, path, spec, load_option);
        let parent = selectable_for(query_entity, adapter).to_string();
        let alias = state.anon_alias(target.table());
        let target_adapter = ColumnAdapter::new(Arc::clone(target.table()), Arc::clone(&alias));

        let criteria = state
            .global_criteria()
            .render(target.name())
            .map(|c| target_adapter.adapt_sql(&c));

        let mut target_join = match &shape {
            JoinShape::Direct {
                parent_col,
                target_col,
            } => Join::new(
                join_type,
                target.table().to_string(),
                format!(
                    "{} = {}",
                    qualified_column(&parent, parent_col),
                    target_adapter.column(target_col)
                ),
            ),
            JoinShape::Link {
                link,
                parent_col,
                target_col,
            } => {
                let link_alias = state.anon_alias(&link.table_name);
                state.add_join(
                    Join::new(
                        join_type,
                        link.table_name.to_string(),
                        format!(
                            "{} = {}",
                            qualified_column(&parent, parent_col),
                            qualified_column(&link_alias, &link.local_column)
                        ),
                    )
                    .alias(link_alias.to_string()),
                );
                Join::new(
                    join_type,
                    target.table().to_string(),
                    format!(
                        "{} = {}",
                        qualified_column(&link_alias, &link.remote_column),
                        target_adapter.column(target_col)
                    ),
                )
            }
        }
        .alias(alias.to_string());
        if let Some(criteria) = criteria {
            target_join = target_join.and_on(&criteria);
        }
        state.add_join(target_join);

        if let Some(order_by) = spec.order_by_clause() {
            state.add_order_by(target_adapter.adapt_sql(order_by));
        }

        state.register_eager_join(
            path.clone(),
            EagerJoin {
                target_entity: Arc::clone(target.name()),
                adapter: target_adapter.clone(),
                join_type,
            },
        );
        tracing::debug!(path = %path, alias = %alias, "Added joined eager load");

        let target_entity = target.query_entity();
        let target_path = Self::target_path(path, &target);
        for prop in target.iterate_properties() {
            prop.setup(state, &target_entity, &target_path, Some(&target_adapter))?;
        }
        Ok(())
    }

    fn create_row_processor(
        &self,
        context: &mut QueryContext,
        query_entity: &QueryEntity,
        path: &Path,
        _load_option: Option<&LoadOption>,
        _mapper: &Mapper,
        result: &ColumnInfo,
        adapter: Option<&ColumnAdapter>,
        populators: &mut Populators,
    ) -> Result<()> {
        let Some(eager) = context.eager_join(path).cloned() else {
            // joined load was not set up for this path; load lazily instead
            return lazy_row_processor(&self.base, context, query_entity, path, adapter, None, populators);
        };

        let core = self.base.parent_property();
        let spec = relationship_spec(core, self.name())?;
        let target = spec.target_mapper()?;
        let target_path = Self::target_path(path, &target);
        let nested = Arc::new(instance_processor(
            context,
            &target,
            &target.query_entity(),
            &target_path,
            result,
            Some(&eager.adapter),
        )?);

        let key = core.key();
        if spec.is_collection() {
            let (attr, processor) = (Arc::clone(key), Arc::clone(&nested));
            populators.push(
                PopulatorBucket::New,
                key,
                populator(move |row, state| {
                    let mut items = Vec::new();
                    processor.merge_into(row, &mut items)?;
                    state.set(&attr, LoadedValue::Collection(items));
                    Ok(())
                }),
            );
            let attr = Arc::clone(key);
            populators.push(
                PopulatorBucket::Existing,
                key,
                populator(move |row, state| {
                    if let Some(LoadedValue::Collection(items)) = state.get_mut(&attr) {
                        nested.merge_into(row, items)?;
                    }
                    Ok(())
                }),
            );
        } else {
            let (attr, processor) = (Arc::clone(key), Arc::clone(&nested));
            populators.push(
                PopulatorBucket::New,
                key,
                populator(move |row, state| {
                    let related = match processor.identity(row) {
                        Some(_) => Some(Box::new(processor.populate_new(row)?)),
                        None => None,
                    };
                    state.set(&attr, LoadedValue::Object(related));
                    Ok(())
                }),
            );
            let attr = Arc::clone(key);
            populators.push(
                PopulatorBucket::Existing,
                key,
                populator(move |row, state| {
                    if let Some(LoadedValue::Object(Some(related))) = state.get_mut(&attr) {
                        nested.populate_existing(row, related)?;
                    }
                    Ok(())
                }),
            );
        }
        Ok(())
    }
}

/// Loads the relationship for every parent with batched `IN` statements.
#[derive(Debug)]
pub struct SelectInLoader {
    base: StrategyBase,
}

impl SelectInLoader {
    pub const IMPL: StrategyImpl = StrategyImpl::new("SelectInLoader", Self::create);

    fn create(core: Arc<PropertyCore>, key: StrategyKey) -> Result<Arc<dyn LoaderStrategy>> {
        relationship_spec(&core, "SelectInLoader")?;
        Ok(Arc::new(Self {
            base: StrategyBase::new(core, key),
        }))
    }
}

impl LoaderStrategy for SelectInLoader {
    fn name(&self) -> &'static str {
        "SelectInLoader"
    }

    fn base(&self) -> &StrategyBase {
        &self.base
    }

    fn init_class_attribute(&self, mapper: &Mapper) -> Result<()> {
        install_lazy_attribute(&self.base, mapper, LoaderCallable::Lazy)
    }

    fn setup_query(
        &self,
        state: &mut CompileState,
        query_entity: &QueryEntity,
        path: &Path,
        _load_option: Option<&LoadOption>,
        adapter: Option<&ColumnAdapter>,
    ) -> Result<()> {
        select_parent_column(&self.base, state, query_entity, path, adapter)
    }

    fn create_row_processor(
        &self,
        context: &mut QueryContext,
        query_entity: &QueryEntity,
        path: &Path,
        _load_option: Option<&LoadOption>,
        _mapper: &Mapper,
        _result: &ColumnInfo,
        adapter: Option<&ColumnAdapter>,
        populators: &mut Populators,
    ) -> Result<()> {
        if !context.enable_eagerloads() {
            return lazy_row_processor(&self.base, context, query_entity, path, adapter, None, populators);
        }
        let load = related_load(&self.base, context, query_entity, path, adapter)?;
        let batch_size = context.batch_size();
        let options = Arc::clone(context.propagated());
        let (finish_load, finish_path) = (load.clone(), path.clone());
        let keys = context.register_post_load(
            path,
            post_load_finisher(move |keys| {
                keys.chunks(batch_size)
                    .map(|batch| PostLoad {
                        path: finish_path.clone(),
                        strategy: "SelectInLoader",
                        target_entity: Arc::clone(&finish_load.target),
                        sql: finish_load.in_sql(batch.len()),
                        params: batch.iter().flatten().cloned().collect(),
                        options: Arc::clone(&options),
                    })
                    .collect()
            }),
        );
        collect_parent_keys(&load, keys, PopulatorBucket::New, populators);
        Ok(())
    }
}

/// Loads the relationship for every parent in one statement joined against
/// the parent statement.
#[derive(Debug)]
pub struct SubqueryLoader {
    base: StrategyBase,
}

impl SubqueryLoader {
    pub const IMPL: StrategyImpl = StrategyImpl::new("SubqueryLoader", Self::create);

    fn create(core: Arc<PropertyCore>, key: StrategyKey) -> Result<Arc<dyn LoaderStrategy>> {
        relationship_spec(&core, "SubqueryLoader")?;
        Ok(Arc::new(Self {
            base: StrategyBase::new(core, key),
        }))
    }
}

impl LoaderStrategy for SubqueryLoader {
    fn name(&self) -> &'static str {
        "SubqueryLoader"
    }

    fn base(&self) -> &StrategyBase {
        &self.base
    }

    fn init_class_attribute(&self, mapper: &Mapper) -> Result<()> {
        install_lazy_attribute(&self.base, mapper, LoaderCallable::Lazy)
    }

    fn setup_query(
        &self,
        state: &mut CompileState,
        query_entity: &QueryEntity,
        path: &Path,
        _load_option: Option<&LoadOption>,
        adapter: Option<&ColumnAdapter>,
    ) -> Result<()> {
        select_parent_column(&self.base, state, query_entity, path, adapter)
    }

    fn create_row_processor(
        &self,
        context: &mut QueryContext,
        query_entity: &QueryEntity,
        path: &Path,
        _load_option: Option<&LoadOption>,
        _mapper: &Mapper,
        _result: &ColumnInfo,
        adapter: Option<&ColumnAdapter>,
        populators: &mut Populators,
    ) -> Result<()> {
        if !context.enable_eagerloads() {
            return lazy_row_processor(&self.base, context, query_entity, path, adapter, None, populators);
        }
        let load = related_load(&self.base, context, query_entity, path, adapter)?;
        let condition = format!(
            "{} IN (SELECT anon_1.{} FROM ({}) AS anon_1)",
            load.compare,
            load.parent_label,
            context.statement()
        );
        let sql = load.finish(&condition);
        let options = Arc::clone(context.propagated());
        let (target, finish_path) = (Arc::clone(&load.target), path.clone());
        let keys = context.register_post_load(
            path,
            post_load_finisher(move |keys| {
                if keys.is_empty() {
                    return Vec::new();
                }
                vec![PostLoad {
                    path: finish_path.clone(),
                    strategy: "SubqueryLoader",
                    target_entity: Arc::clone(&target),
                    sql: sql.clone(),
                    params: Vec::new(),
                    options: Arc::clone(&options),
                }]
            }),
        );
        collect_parent_keys(&load, keys, PopulatorBucket::New, populators);
        Ok(())
    }
}

/// Loads the relationship for each parent right after the parent loads.
#[derive(Debug)]
pub struct ImmediateLoader {
    base: StrategyBase,
}

impl ImmediateLoader {
    pub const IMPL: StrategyImpl = StrategyImpl::new("ImmediateLoader", Self::create);

    fn create(core: Arc<PropertyCore>, key: StrategyKey) -> Result<Arc<dyn LoaderStrategy>> {
        relationship_spec(&core, "ImmediateLoader")?;
        Ok(Arc::new(Self {
            base: StrategyBase::new(core, key),
        }))
    }
}

impl LoaderStrategy for ImmediateLoader {
    fn name(&self) -> &'static str {
        "ImmediateLoader"
    }

    fn base(&self) -> &StrategyBase {
        &self.base
    }

    fn init_class_attribute(&self, mapper: &Mapper) -> Result<()> {
        install_lazy_attribute(&self.base, mapper, LoaderCallable::Lazy)
    }

    fn setup_query(
        &self,
        state: &mut CompileState,
        query_entity: &QueryEntity,
        path: &Path,
        _load_option: Option<&LoadOption>,
        adapter: Option<&ColumnAdapter>,
    ) -> Result<()> {
        select_parent_column(&self.base, state, query_entity, path, adapter)
    }

    fn create_row_processor(
        &self,
        context: &mut QueryContext,
        query_entity: &QueryEntity,
        path: &Path,
        _load_option: Option<&LoadOption>,
        _mapper: &Mapper,
        _result: &ColumnInfo,
        adapter: Option<&ColumnAdapter>,
        populators: &mut Populators,
    ) -> Result<()> {
        if !context.enable_eagerloads() {
            return lazy_row_processor(&self.base, context, query_entity, path, adapter, None, populators);
        }
        let load = related_load(&self.base, context, query_entity, path, adapter)?;
        let sql = load.equals_sql();
        let options: Arc<Propagated> = Arc::clone(context.propagated());
        let (target, finish_path) = (Arc::clone(&load.target), path.clone());
        let keys = context.register_post_load(
            path,
            post_load_finisher(move |keys| {
                keys.iter()
                    .map(|key| PostLoad {
                        path: finish_path.clone(),
                        strategy: "ImmediateLoader",
                        target_entity: Arc::clone(&target),
                        sql: sql.clone(),
                        params: key.clone(),
                        options: Arc::clone(&options),
                    })
                    .collect()
            }),
        );
        collect_parent_keys(&load, keys, PopulatorBucket::Delayed, populators);
        Ok(())
    }
}
