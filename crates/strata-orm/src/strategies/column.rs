//! Column loading strategies.

use std::sync::Arc;

use strata_core::{
    AttributeImpl, AttributeKind, ColumnInfo, LoaderCallable, Path, Result, Row, StrategyKey,
    Value,
};
use strata_query::{
    ColumnAdapter, CompileState, LoadOption, QueryEntity, column_label, qualified_column,
    selectable_for,
};

use super::column_spec;
use crate::context::{PopulatorBucket, Populators, QueryContext, populator};
use crate::loading::{DeferredLoad, LoadTrigger, LoadedValue};
use crate::mapper::Mapper;
use crate::property::PropertyCore;
use crate::registry::StrategyImpl;
use crate::strategy::{LoaderStrategy, StrategyBase};

/// Columns of one property, selected under the labels of one selectable.
#[derive(Debug, Clone)]
struct ColumnSet {
    columns: Vec<Arc<str>>,
    composite: bool,
}

impl ColumnSet {
    fn of(core: &PropertyCore, strategy: &str) -> Result<Self> {
        let spec = column_spec(core, strategy)?;
        Ok(Self {
            columns: spec.columns().to_vec(),
            composite: core.class().name() == "CompositeProperty",
        })
    }

    fn select(&self, state: &mut CompileState, query_entity: &QueryEntity, adapter: Option<&ColumnAdapter>) {
        let selectable = selectable_for(query_entity, adapter);
        for column in &self.columns {
            state.add_column(
                qualified_column(selectable, column),
                column_label(selectable, column),
            );
        }
    }

    fn labels(&self, query_entity: &QueryEntity, adapter: Option<&ColumnAdapter>) -> Vec<String> {
        let selectable = selectable_for(query_entity, adapter);
        self.columns
            .iter()
            .map(|column| column_label(selectable, column))
            .collect()
    }

    /// Copy values into the instance, or expire the attribute when the result
    /// lacks a column.
    fn populate(
        &self,
        key: &Arc<str>,
        query_entity: &QueryEntity,
        adapter: Option<&ColumnAdapter>,
        result: &ColumnInfo,
        populators: &mut Populators,
    ) {
        let labels = self.labels(query_entity, adapter);
        if labels.is_empty() || !labels.iter().all(|label| result.contains(label)) {
            let attr = Arc::clone(key);
            populators.push(
                PopulatorBucket::Expire,
                key,
                populator(move |_, state| {
                    state.expire(&attr);
                    Ok(())
                }),
            );
            return;
        }

        let attr = Arc::clone(key);
        let composite = self.composite;
        populators.push(
            PopulatorBucket::Quick,
            key,
            populator(move |row, state| {
                let value = read_columns(row, &labels, composite)?;
                state.set(&attr, LoadedValue::Scalar(value));
                Ok(())
            }),
        );
    }
}

fn read_columns(row: &Row, labels: &[String], composite: bool) -> Result<Value> {
    if composite {
        let values = labels
            .iter()
            .map(|label| row.try_get(label).cloned())
            .collect::<Result<Vec<_>>>()?;
        return Ok(Value::Array(values));
    }
    match labels.first() {
        Some(label) => row.try_get(label).cloned(),
        None => Ok(Value::Null),
    }
}

fn install_scalar(mapper: &Mapper, key: &Arc<str>, callable: Option<LoaderCallable>, installed_by: &'static str) {
    mapper.class_manager().install(AttributeImpl {
        key: Arc::clone(key),
        kind: AttributeKind::Scalar,
        callable,
        installed_by,
    });
}

/// Loads a column attribute with the entity.
#[derive(Debug)]
pub struct ColumnLoader {
    base: StrategyBase,
    columns: ColumnSet,
}

impl ColumnLoader {
    pub const IMPL: StrategyImpl = StrategyImpl::new("ColumnLoader", Self::create);

    fn create(core: Arc<PropertyCore>, key: StrategyKey) -> Result<Arc<dyn LoaderStrategy>> {
        let columns = ColumnSet::of(&core, "ColumnLoader")?;
        Ok(Arc::new(Self {
            base: StrategyBase::new(core, key),
            columns,
        }))
    }
}

impl LoaderStrategy for ColumnLoader {
    fn name(&self) -> &'static str {
        "ColumnLoader"
    }

    fn base(&self) -> &StrategyBase {
        &self.base
    }

    fn init_class_attribute(&self, mapper: &Mapper) -> Result<()> {
        self.base.mark_class_level();
        install_scalar(mapper, self.base.parent_property().key(), None, self.name());
        Ok(())
    }

    fn setup_query(
        &self,
        state: &mut CompileState,
        query_entity: &QueryEntity,
        _path: &Path,
        _load_option: Option<&LoadOption>,
        adapter: Option<&ColumnAdapter>,
    ) -> Result<()> {
        self.columns.select(state, query_entity, adapter);
        Ok(())
    }

    fn create_row_processor(
        &self,
        _context: &mut QueryContext,
        query_entity: &QueryEntity,
        _path: &Path,
        _load_option: Option<&LoadOption>,
        _mapper: &Mapper,
        result: &ColumnInfo,
        adapter: Option<&ColumnAdapter>,
        populators: &mut Populators,
    ) -> Result<()> {
        let key = self.base.parent_property().key();
        self.columns
            .populate(key, query_entity, adapter, result, populators);
        Ok(())
    }
}

/// Loads a column attribute on first access.
///
/// An active `undefer_group_<group>` local option on the governing load
/// option turns the strategy into a plain column load.
#[derive(Debug)]
pub struct DeferredColumnLoader {
    base: StrategyBase,
    columns: ColumnSet,
    group: Option<Arc<str>>,
    raiseload: bool,
}

impl DeferredColumnLoader {
    pub const IMPL: StrategyImpl = StrategyImpl::new("DeferredColumnLoader", Self::create);

    fn create(core: Arc<PropertyCore>, key: StrategyKey) -> Result<Arc<dyn LoaderStrategy>> {
        let columns = ColumnSet::of(&core, "DeferredColumnLoader")?;
        let group = column_spec(&core, "DeferredColumnLoader")?
            .group_name()
            .cloned();
        let raiseload = key.get("raiseload").is_some_and(|v| v.is_truthy());
        Ok(Arc::new(Self {
            base: StrategyBase::new(core, key),
            columns,
            group,
            raiseload,
        }))
    }

    fn undeferred(&self, load_option: Option<&LoadOption>) -> bool {
        match (&self.group, load_option) {
            (Some(group), Some(option)) => option
                .get_local(&format!("undefer_group_{}", group))
                .is_some_and(|v| v.is_truthy()),
            _ => false,
        }
    }
}

impl LoaderStrategy for DeferredColumnLoader {
    fn name(&self) -> &'static str {
        "DeferredColumnLoader"
    }

    fn base(&self) -> &StrategyBase {
        &self.base
    }

    fn init_class_attribute(&self, mapper: &Mapper) -> Result<()> {
        self.base.mark_class_level();
        let callable = if self.raiseload {
            LoaderCallable::Raise { sql_only: false }
        } else {
            LoaderCallable::Deferred
        };
        install_scalar(mapper, self.base.parent_property().key(), Some(callable), self.name());
        Ok(())
    }

    fn setup_query(
        &self,
        state: &mut CompileState,
        query_entity: &QueryEntity,
        _path: &Path,
        load_option: Option<&LoadOption>,
        adapter: Option<&ColumnAdapter>,
    ) -> Result<()> {
        if self.undeferred(load_option) {
            self.columns.select(state, query_entity, adapter);
        }
        Ok(())
    }

    fn create_row_processor(
        &self,
        context: &mut QueryContext,
        query_entity: &QueryEntity,
        _path: &Path,
        load_option: Option<&LoadOption>,
        mapper: &Mapper,
        result: &ColumnInfo,
        adapter: Option<&ColumnAdapter>,
        populators: &mut Populators,
    ) -> Result<()> {
        let key = self.base.parent_property().key();
        if self.undeferred(load_option) {
            self.columns
                .populate(key, query_entity, adapter, result, populators);
            return Ok(());
        }

        let attr = Arc::clone(key);
        let options = Arc::clone(context.propagated());
        if self.raiseload {
            populators.push(
                PopulatorBucket::New,
                key,
                populator(move |_, state| {
                    state.set_deferred(DeferredLoad {
                        key: Arc::clone(&attr),
                        strategy: "DeferredColumnLoader",
                        trigger: LoadTrigger::Raise { sql_only: false },
                        options: Arc::clone(&options),
                    });
                    Ok(())
                }),
            );
            return Ok(());
        }

        let table = mapper.table();
        let selectable = selectable_for(query_entity, adapter);
        let select_list = self
            .columns
            .columns
            .iter()
            .map(|column| qualified_column(table, column))
            .collect::<Vec<_>>()
            .join(", ");
        let condition = mapper
            .entity()
            .primary_key()
            .iter()
            .map(|pk| format!("{} = ?", qualified_column(table, pk)))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!("SELECT {} FROM {} WHERE {}", select_list, table, condition);
        let pk_labels: Vec<String> = mapper
            .entity()
            .primary_key()
            .iter()
            .map(|pk| column_label(selectable, pk))
            .collect();

        // class-level attributes load through the installed callable
        let bucket = if self.base.is_class_level() {
            PopulatorBucket::Expire
        } else {
            PopulatorBucket::New
        };
        populators.push(
            bucket,
            key,
            populator(move |row, state| {
                let params = pk_labels
                    .iter()
                    .map(|label| row.try_get(label).cloned())
                    .collect::<Result<Vec<_>>>()?;
                state.set_deferred(DeferredLoad {
                    key: Arc::clone(&attr),
                    strategy: "DeferredColumnLoader",
                    trigger: LoadTrigger::Sql {
                        sql: sql.clone(),
                        params,
                    },
                    options: Arc::clone(&options),
                });
                Ok(())
            }),
        );
        Ok(())
    }
}

/// Populates an attribute from an expression supplied per query.
#[derive(Debug)]
pub struct ExpressionColumnLoader {
    base: StrategyBase,
}

impl ExpressionColumnLoader {
    pub const IMPL: StrategyImpl = StrategyImpl::new("ExpressionColumnLoader", Self::create);

    fn create(core: Arc<PropertyCore>, key: StrategyKey) -> Result<Arc<dyn LoaderStrategy>> {
        column_spec(&core, "ExpressionColumnLoader")?;
        Ok(Arc::new(Self {
            base: StrategyBase::new(core, key),
        }))
    }

    fn expression<'a>(&self, load_option: Option<&'a LoadOption>) -> Option<&'a str> {
        load_option
            .and_then(|option| option.get_local("expression"))
            .and_then(|value| value.as_str())
    }

    fn label(&self, query_entity: &QueryEntity, adapter: Option<&ColumnAdapter>) -> String {
        column_label(
            selectable_for(query_entity, adapter),
            self.base.parent_property().key(),
        )
    }
}

impl LoaderStrategy for ExpressionColumnLoader {
    fn name(&self) -> &'static str {
        "ExpressionColumnLoader"
    }

    fn base(&self) -> &StrategyBase {
        &self.base
    }

    fn init_class_attribute(&self, mapper: &Mapper) -> Result<()> {
        self.base.mark_class_level();
        install_scalar(mapper, self.base.parent_property().key(), None, self.name());
        Ok(())
    }

    fn setup_query(
        &self,
        state: &mut CompileState,
        query_entity: &QueryEntity,
        _path: &Path,
        load_option: Option<&LoadOption>,
        adapter: Option<&ColumnAdapter>,
    ) -> Result<()> {
        if let Some(expr) = self.expression(load_option) {
            let expr = match adapter {
                Some(adapter) => adapter.adapt_sql(expr),
                None => expr.to_string(),
            };
            state.add_column(format!("({})", expr), self.label(query_entity, adapter));
        }
        Ok(())
    }

    fn create_row_processor(
        &self,
        _context: &mut QueryContext,
        query_entity: &QueryEntity,
        _path: &Path,
        load_option: Option<&LoadOption>,
        _mapper: &Mapper,
        result: &ColumnInfo,
        adapter: Option<&ColumnAdapter>,
        populators: &mut Populators,
    ) -> Result<()> {
        let label = self.label(query_entity, adapter);
        if self.expression(load_option).is_none() || !result.contains(&label) {
            return Ok(());
        }
        let key = self.base.parent_property().key();
        let attr = Arc::clone(key);
        populators.push(
            PopulatorBucket::Quick,
            key,
            populator(move |row, state| {
                let value = row.try_get(&label)?.clone();
                state.set(&attr, LoadedValue::Scalar(value));
                Ok(())
            }),
        );
        Ok(())
    }
}

/// Loads nothing and installs nothing.
#[derive(Debug)]
pub struct DoNothingLoader {
    base: StrategyBase,
}

impl DoNothingLoader {
    pub const IMPL: StrategyImpl = StrategyImpl::new("DoNothingLoader", Self::create);

    fn create(core: Arc<PropertyCore>, key: StrategyKey) -> Result<Arc<dyn LoaderStrategy>> {
        Ok(Arc::new(Self {
            base: StrategyBase::new(core, key),
        }))
    }
}

impl LoaderStrategy for DoNothingLoader {
    fn name(&self) -> &'static str {
        "DoNothingLoader"
    }

    fn base(&self) -> &StrategyBase {
        &self.base
    }
}

/// Selects the column without instrumenting or populating the attribute.
#[derive(Debug)]
pub struct UninstrumentedColumnLoader {
    base: StrategyBase,
    columns: ColumnSet,
}

impl UninstrumentedColumnLoader {
    pub const IMPL: StrategyImpl = StrategyImpl::new("UninstrumentedColumnLoader", Self::create);

    fn create(core: Arc<PropertyCore>, key: StrategyKey) -> Result<Arc<dyn LoaderStrategy>> {
        let columns = ColumnSet::of(&core, "UninstrumentedColumnLoader")?;
        Ok(Arc::new(Self {
            base: StrategyBase::new(core, key),
            columns,
        }))
    }
}

impl LoaderStrategy for UninstrumentedColumnLoader {
    fn name(&self) -> &'static str {
        "UninstrumentedColumnLoader"
    }

    fn base(&self) -> &StrategyBase {
        &self.base
    }

    fn init_class_attribute(&self, _mapper: &Mapper) -> Result<()> {
        Ok(())
    }

    fn setup_query(
        &self,
        state: &mut CompileState,
        query_entity: &QueryEntity,
        _path: &Path,
        _load_option: Option<&LoadOption>,
        adapter: Option<&ColumnAdapter>,
    ) -> Result<()> {
        self.columns.select(state, query_entity, adapter);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use strata_core::{EntityDescriptor, OptionValue};
    use strata_query::{GlobalCriteria, LoadOptions};

    use crate::context::Propagated;
    use crate::loading::instance_processor;
    use crate::mapper::MapperRegistry;
    use crate::property::{ColumnSpec, MapperProperty, StrategizedProperty};

    fn documents() -> (MapperRegistry, Arc<Mapper>) {
        let mapper = Mapper::builder(EntityDescriptor::new("Document", "documents", ["id"]))
            .column("id")
            .column("title")
            .property(StrategizedProperty::column("body", ColumnSpec::new("body").deferred()))
            .property(StrategizedProperty::column("secret", ColumnSpec::new("secret").raiseload()))
            .property(StrategizedProperty::column("photo", ColumnSpec::new("photo").group("media")))
            .property(StrategizedProperty::composite("point", ColumnSpec::composite(["x", "y"])))
            .property(StrategizedProperty::column("word_count", ColumnSpec::query_expression()))
            .property(StrategizedProperty::column("version", ColumnSpec::new("version").instrument(false)))
            .build()
            .unwrap();
        let mut registry = MapperRegistry::new();
        registry.add(Arc::clone(&mapper)).unwrap();
        registry.configure().unwrap();
        (registry, mapper)
    }

    fn setup(mapper: &Mapper, options: LoadOptions) -> CompileState {
        let entity = mapper.query_entity();
        let mut state = CompileState::new(entity.clone());
        *state.attributes_mut() = options;
        for prop in mapper.iterate_properties() {
            prop.setup(&mut state, &entity, &mapper.entity_path(), None)
                .unwrap();
        }
        state
    }

    fn context(state: &CompileState) -> QueryContext {
        QueryContext::new(
            state.attributes().clone(),
            GlobalCriteria::new(),
            HashMap::new(),
            state.to_sql(),
            Arc::new(Propagated::default()),
            10,
        )
    }

    #[test]
    fn test_default_select_list() {
        let (_registry, mapper) = documents();
        let state = setup(&mapper, LoadOptions::new());
        assert_eq!(
            state.column_labels(),
            vec![
                "documents__id",
                "documents__title",
                "documents__x",
                "documents__y",
                "documents__version",
            ]
        );
    }

    #[test]
    fn test_class_attributes() {
        let (_registry, mapper) = documents();
        let manager = mapper.class_manager();
        assert_eq!(manager.get("body").unwrap().callable, Some(LoaderCallable::Deferred));
        assert_eq!(
            manager.get("secret").unwrap().callable,
            Some(LoaderCallable::Raise { sql_only: false })
        );
        assert_eq!(manager.get("word_count").unwrap().installed_by, "ExpressionColumnLoader");
        assert!(!manager.has_impl("version"));
    }

    #[test]
    fn test_row_processing() {
        let (_registry, mapper) = documents();
        let state = setup(&mapper, LoadOptions::new());
        let mut ctx = context(&state);
        let columns = ColumnInfo::new(state.column_labels());
        let processor = instance_processor(
            &mut ctx,
            &mapper,
            &mapper.query_entity(),
            &mapper.entity_path(),
            &columns,
            None,
        )
        .unwrap();

        let row = Row::new(
            state.column_labels(),
            vec![
                Value::BigInt(4),
                Value::from("Notes"),
                Value::BigInt(1),
                Value::BigInt(2),
                Value::BigInt(9),
            ],
        );
        let doc = processor.populate_new(&row).unwrap();
        assert_eq!(doc.scalar("title"), Some(&Value::from("Notes")));
        assert_eq!(
            doc.scalar("point"),
            Some(&Value::Array(vec![Value::BigInt(1), Value::BigInt(2)]))
        );
        assert!(!doc.is_loaded("version"));

        let body = doc.pending_load("body").unwrap().unwrap();
        assert_eq!(
            body.trigger,
            LoadTrigger::Sql {
                sql: "SELECT documents.body FROM documents WHERE documents.id = ?".to_string(),
                params: vec![Value::BigInt(4)],
            }
        );
        let err = doc.pending_load("secret").unwrap_err();
        assert!(err.to_string().contains("raiseload=True"));
    }

    #[test]
    fn test_missing_column_expires() {
        let (_registry, mapper) = documents();
        let state = setup(&mapper, LoadOptions::new());
        let mut ctx = context(&state);
        let columns = ColumnInfo::new(vec!["documents__id".to_string()]);
        let processor = instance_processor(
            &mut ctx,
            &mapper,
            &mapper.query_entity(),
            &mapper.entity_path(),
            &columns,
            None,
        )
        .unwrap();
        let row = Row::new(vec!["documents__id".to_string()], vec![Value::BigInt(1)]);
        let doc = processor.populate_new(&row).unwrap();
        assert!(doc.is_expired("title"));
        assert_eq!(doc.scalar("id"), Some(&Value::BigInt(1)));
    }

    #[test]
    fn test_undefer_group_and_expression() {
        let (_registry, mapper) = documents();
        let root = mapper.entity_path();
        let tokens = strata_core::WildcardTokens::new("column");
        let mut options = LoadOptions::new();
        options.set(
            tokens.wildcard_key(&root),
            LoadOption::new(root.token("column:*")).local_opt("undefer_group_media", true),
        );
        let word_count = root.property(mapper.name(), &Arc::from("word_count"));
        options.set(
            strata_core::LoaderKey::new(word_count.clone()),
            LoadOption::new(word_count)
                .strategy(strata_core::strategy_key!(query_expression = true))
                .local_opt("expression", OptionValue::from("length(documents.body)")),
        );

        let state = setup(&mapper, options);
        assert!(state.has_column("documents__photo"));
        assert!(!state.has_column("documents__body"));
        assert!(
            state
                .columns()
                .iter()
                .any(|c| c.expr == "(length(documents.body))" && c.label == "documents__word_count")
        );
    }

    #[test]
    fn test_do_nothing_loader() {
        let prop = StrategizedProperty::column("title", ColumnSpec::new("title"));
        let strategy = prop
            .get_strategy(&strata_core::strategy_key!(do_nothing = true))
            .unwrap();
        assert_eq!(strategy.name(), "DoNothingLoader");
        assert!(!strategy.base().is_class_level());
    }
}
