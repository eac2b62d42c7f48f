//! Built-in loader strategies.
//!
//! Column strategies are owned by `ColumnProperty` (and so serve
//! `CompositeProperty` through the ancestor walk); relationship strategies
//! are owned by `RelationshipProperty`.

mod column;
mod relationship;

pub use column::{
    ColumnLoader, DeferredColumnLoader, DoNothingLoader, ExpressionColumnLoader,
    UninstrumentedColumnLoader,
};
pub use relationship::{
    ImmediateLoader, JoinedLoader, LazyLoader, NoLoader, SelectInLoader, SubqueryLoader,
};

use strata_core::{Error, OptionValue, Result, strategy_key};

use crate::property::{ColumnSpec, PropertyCore, RelationshipSpec};
use crate::registry::{COLUMN_PROPERTY, RELATIONSHIP_PROPERTY, StrategyRegistry};

/// Register every built-in strategy under each key it answers to.
pub fn register_builtins(registry: &mut StrategyRegistry) -> Result<()> {
    let column = [
        (strategy_key!(deferred = false, instrument = true), ColumnLoader::IMPL),
        (strategy_key!(deferred = true, instrument = true), DeferredColumnLoader::IMPL),
        (
            strategy_key!(deferred = true, instrument = true, raiseload = true),
            DeferredColumnLoader::IMPL,
        ),
        (strategy_key!(query_expression = true), ExpressionColumnLoader::IMPL),
        (strategy_key!(do_nothing = true), DoNothingLoader::IMPL),
        (strategy_key!(instrument = false), UninstrumentedColumnLoader::IMPL),
    ];
    for (key, imp) in column {
        registry.register(&COLUMN_PROPERTY, key, imp)?;
    }

    let relationship = [
        (strategy_key!(lazy = "select"), LazyLoader::IMPL),
        (strategy_key!(lazy = true), LazyLoader::IMPL),
        (strategy_key!(lazy = "raise"), LazyLoader::IMPL),
        (strategy_key!(lazy = "raise_on_sql"), LazyLoader::IMPL),
        (strategy_key!(lazy = "noload"), NoLoader::IMPL),
        (strategy_key!(lazy = OptionValue::None), NoLoader::IMPL),
        (strategy_key!(lazy = "joined"), JoinedLoader::IMPL),
        (strategy_key!(lazy = false), JoinedLoader::IMPL),
        (strategy_key!(lazy = "selectin"), SelectInLoader::IMPL),
        (strategy_key!(lazy = "subquery"), SubqueryLoader::IMPL),
        (strategy_key!(lazy = "immediate"), ImmediateLoader::IMPL),
    ];
    for (key, imp) in relationship {
        registry.register(&RELATIONSHIP_PROPERTY, key, imp)?;
    }
    Ok(())
}

fn column_spec<'a>(core: &'a PropertyCore, strategy: &str) -> Result<&'a ColumnSpec> {
    core.column_spec().ok_or_else(|| {
        Error::compile(
            format!("{} cannot load non-column property '{}'", strategy, core.qualified_name()),
            None,
        )
    })
}

fn relationship_spec<'a>(core: &'a PropertyCore, strategy: &str) -> Result<&'a RelationshipSpec> {
    core.relationship_spec().ok_or_else(|| {
        Error::compile(
            format!("{} cannot load non-relationship property '{}'", strategy, core.qualified_name()),
            None,
        )
    })
}
