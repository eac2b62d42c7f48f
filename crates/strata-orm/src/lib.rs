//! Mapped properties and loader strategies for Strata.
//!
//! A [`Mapper`] holds the properties of one entity. Each
//! [`StrategizedProperty`] delegates loading to a [`LoaderStrategy`] picked
//! from the process-wide [`StrategyRegistry`] by [`StrategyKey`](strata_core::StrategyKey).
//! Loader options attached to a [`Select`] override that choice per path.
//!
//! Loading runs in two phases:
//!
//! 1. [`Compiler::compile`] asks every property to shape the statement
//!    (columns, eager joins)
//! 2. [`CompiledSelect::instances`] asks every property for populators and
//!    runs them against the fetched rows

pub mod cascade;
pub mod config;
pub mod context;
pub mod loading;
pub mod mapper;
pub mod options;
pub mod property;
pub mod registry;
pub mod select;
pub mod strategies;
pub mod strategy;

pub use cascade::CascadeOptions;
pub use config::OrmConfig;
pub use context::{
    Populator, PopulatorBucket, PopulatorFn, Populators, PostLoad, PostLoadKeys, Propagated,
    QueryContext, populator, post_load_finisher,
};
pub use loading::{
    DeferredLoad, IdentityKey, InstanceState, LoadResult, LoadTrigger, LoadedValue, RowProcessor,
    instance_processor,
};
pub use mapper::{Mapper, MapperBuilder, MapperRegistry};
pub use options::{
    CompileStateOption, CriteriaOption, Load, LoaderCriteriaOption, MapperOption, OrmOption,
    UserDefinedOption, with_loader_criteria,
};
pub use property::{
    ColumnSpec, LinkTable, MapperProperty, PropertyCore, PropertyKind, RelationshipKind,
    RelationshipSpec, StrategizedProperty, SynonymProperty,
};
pub use registry::{
    COLUMN_PROPERTY, COMPOSITE_PROPERTY, PropertyClass, RELATIONSHIP_PROPERTY,
    STRATEGIZED_PROPERTY, StrategyFactory, StrategyImpl, StrategyRegistry, lookup_strategy,
    register_strategy, strategy_keys,
};
pub use select::{CompiledSelect, Compiler, Select};
pub use strategy::{LoaderStrategy, StrategyBase};
