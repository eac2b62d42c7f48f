//! Strata - loader-strategy dispatch and attribute loading for an ORM.
//!
//! Every mapped attribute decides per query how it is loaded: selected with
//! its row, joined eagerly, loaded by a follow-up statement, deferred until
//! accessed, or not loaded at all. The decision is made by looking up a
//! loader strategy keyed by a [`StrategyKey`], either the attribute's default
//! or one chosen by a loader option for the attribute's path.
//!
//! # Quick Start
//!
//! ```ignore
//! use strata::prelude::*;
//!
//! let user = Mapper::builder(EntityDescriptor::new("User", "users", ["id"]))
//!     .column("id")
//!     .column("name")
//!     .relationship(
//!         "addresses",
//!         RelationshipSpec::new("Address", RelationshipKind::OneToMany).remote_key("user_id"),
//!     )?
//!     .build()?;
//! let address = Mapper::builder(EntityDescriptor::new("Address", "addresses", ["id"]))
//!     .column("id")
//!     .column("user_id")
//!     .build()?;
//!
//! let mut registry = MapperRegistry::new();
//! registry.add(Arc::clone(&user))?;
//! registry.add(address)?;
//! registry.configure()?;
//!
//! let compiler = Compiler::default();
//! let select = Select::new(&user).option(Load::new(&user).joinedload("addresses")?);
//! let compiled = compiler.compile(&select)?;
//! // SELECT users.id AS users__id, ... LEFT JOIN addresses AS addresses_1 ON ...
//! let result = compiled.instances(&rows)?;
//! ```
//!
//! # Crates
//!
//! - `strata-core`: errors, values, strategy keys and load paths
//! - `strata-query`: compile state, joins, column adaptation, statement cache
//! - `strata-orm`: properties, strategy registry, built-in strategies,
//!   options, compilation and row loading

pub use strata_core::{
    AttributeImpl, AttributeKind, ClassManager, ColumnInfo, CompileError, ConfigError,
    ConfigErrorKind, EntityDescriptor, EntityToken, Error, LoaderCallable, LoaderKey,
    LoaderStrategyError, OptionValue, Path, PathElement, Result, Row, StrategyKey, Value,
    WildcardTokens, strategy_key,
};
pub use strata_orm::{
    COLUMN_PROPERTY, COMPOSITE_PROPERTY, CascadeOptions, ColumnSpec, CompileStateOption,
    CompiledSelect, Compiler, CriteriaOption, DeferredLoad, IdentityKey, InstanceState, LinkTable,
    Load, LoadResult, LoadTrigger, LoadedValue, LoaderCriteriaOption, LoaderStrategy, Mapper,
    MapperOption, MapperProperty, MapperRegistry, OrmConfig, OrmOption, PopulatorBucket,
    PostLoad, PropertyClass, RELATIONSHIP_PROPERTY, RelationshipKind, RelationshipSpec,
    STRATEGIZED_PROPERTY, Select, StrategizedProperty, StrategyImpl, StrategyRegistry,
    SynonymProperty, UserDefinedOption, lookup_strategy, register_strategy, strategy_keys,
    with_loader_criteria,
};
pub use strata_orm::strategies;
pub use strata_query::{
    CompileState, GlobalCriteria, JoinType, LoadOption, LoadOptions, QueryEntity, StatementCache,
};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use strata::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ColumnSpec, CompiledSelect, Compiler, EntityDescriptor, Error, InstanceState, Load,
        LoadedValue, Mapper, MapperProperty, MapperRegistry, OrmConfig, RelationshipKind,
        RelationshipSpec, Result, Row, Select, StrategizedProperty, StrategyKey, Value,
        strategy_key, with_loader_criteria,
    };
    pub use std::sync::Arc;
}
