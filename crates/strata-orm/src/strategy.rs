//! The loader strategy interface.
//!
//! A strategy implements how one property loads, in two phases:
//!
//! 1. `setup_query`: shape the SELECT being compiled (add columns, joins).
//! 2. `create_row_processor`: produce per-row populators for the result.
//!
//! One strategy instance exists per (property, strategy key) for the life of
//! the mapping. Instances hold no per-query state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use strata_core::{ColumnInfo, Path, Result, StrategyKey};
use strata_query::{ColumnAdapter, CompileState, LoadOption, QueryEntity};

use crate::context::{Populators, QueryContext};
use crate::mapper::Mapper;
use crate::property::PropertyCore;

/// State shared by every strategy implementation.
#[derive(Debug)]
pub struct StrategyBase {
    parent_property: Arc<PropertyCore>,
    strategy_key: StrategyKey,
    is_class_level: AtomicBool,
}

impl StrategyBase {
    pub fn new(parent_property: Arc<PropertyCore>, strategy_key: StrategyKey) -> Self {
        Self {
            parent_property,
            strategy_key,
            is_class_level: AtomicBool::new(false),
        }
    }

    /// The property this strategy loads.
    pub fn parent_property(&self) -> &Arc<PropertyCore> {
        &self.parent_property
    }

    pub fn strategy_key(&self) -> &StrategyKey {
        &self.strategy_key
    }

    /// Whether this strategy installed the class-level attribute.
    pub fn is_class_level(&self) -> bool {
        self.is_class_level.load(Ordering::Acquire)
    }

    pub(crate) fn mark_class_level(&self) {
        self.is_class_level.store(true, Ordering::Release);
    }
}

/// A pluggable way of loading one property.
pub trait LoaderStrategy: Send + Sync + fmt::Debug {
    /// Implementation name, as registered.
    fn name(&self) -> &'static str;

    fn base(&self) -> &StrategyBase;

    /// Install class-level attribute behavior. Called at most once per class,
    /// and only for the property's default strategy.
    fn init_class_attribute(&self, mapper: &Mapper) -> Result<()> {
        let _ = mapper;
        self.base().mark_class_level();
        Ok(())
    }

    /// Shape the statement being compiled. `path` is the property path.
    fn setup_query(
        &self,
        state: &mut CompileState,
        query_entity: &QueryEntity,
        path: &Path,
        load_option: Option<&LoadOption>,
        adapter: Option<&ColumnAdapter>,
    ) -> Result<()> {
        let _ = (state, query_entity, path, load_option, adapter);
        Ok(())
    }

    /// Append populators for this property. Must not read rows itself.
    #[allow(clippy::too_many_arguments)]
    fn create_row_processor(
        &self,
        context: &mut QueryContext,
        query_entity: &QueryEntity,
        path: &Path,
        load_option: Option<&LoadOption>,
        mapper: &Mapper,
        result: &ColumnInfo,
        adapter: Option<&ColumnAdapter>,
        populators: &mut Populators,
    ) -> Result<()> {
        let _ = (context, query_entity, path, load_option, mapper, result, adapter, populators);
        Ok(())
    }
}
