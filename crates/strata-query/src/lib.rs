//! Statement-construction collaborator for Strata.
//!
//! `strata-query` holds the pieces loader strategies mutate while a SELECT
//! is being compiled:
//!
//! - [`CompileState`]: select list, joins, criteria and the ambient
//!   [`LoadOptions`] mapping
//! - [`QueryEntity`] / [`ColumnAdapter`]: where columns come from
//! - [`GlobalCriteria`]: per-entity criteria contributed by criteria options
//! - [`StatementCache`]: LRU cache of compiled statements keyed by [`cache_key`]

pub mod adapter;
pub mod cache;
pub mod criteria;
pub mod join;
pub mod load;
pub mod state;

pub use adapter::{ColumnAdapter, QueryEntity, column_label, qualified_column, selectable_for};
pub use cache::{StatementCache, cache_key};
pub use criteria::GlobalCriteria;
pub use join::{Join, JoinType};
pub use load::{LoadOption, LoadOptions};
pub use state::{CompileState, EagerJoin, SelectColumn};
