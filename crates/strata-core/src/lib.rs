//! Core types for Strata.
//!
//! This crate provides the foundational pieces of the loader-strategy engine:
//!
//! - `Error` / `Result` for configuration, strategy lookup and compile failures
//! - `StrategyKey` for identifying strategy variants
//! - `Path` and `LoaderKey` for addressing properties in the load graph
//! - `Value` / `Row` for fetched data
//! - `EntityDescriptor` / `ClassManager` describing mapped classes

pub mod entity;
pub mod error;
pub mod key;
pub mod path;
pub mod row;
pub mod value;

pub use entity::{AttributeImpl, AttributeKind, ClassManager, EntityDescriptor, LoaderCallable};
pub use error::{
    CompileError, ConfigError, ConfigErrorKind, Error, LoaderStrategyError, Result, TypeError,
};
pub use key::{OptionValue, StrategyKey};
pub use path::{
    DEFAULT_TOKEN, EntityToken, LOADER_MARKER, LoaderKey, LoaderKeys, Path, PathElement,
    WILDCARD_TOKEN, WildcardTokens,
};
pub use row::{ColumnInfo, Row};
pub use value::{Value, hash_value};
