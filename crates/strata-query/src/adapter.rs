//! Query entities and column adaptation.
//!
//! Every selected column is rendered as `<selectable>.<column> AS
//! <selectable>__<column>`; the label is what row processors read back from
//! the result. A [`ColumnAdapter`] retargets columns of an entity at an alias
//! (the anonymous alias of an eager join, for instance).

use std::sync::Arc;

use regex::Regex;
use strata_core::{EntityToken, Path};

/// The entity a statement selects from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryEntity {
    entity: Arc<str>,
    table: Arc<str>,
    alias: Option<Arc<str>>,
}

impl QueryEntity {
    pub fn new(entity: impl Into<Arc<str>>, table: impl Into<Arc<str>>) -> Self {
        Self {
            entity: entity.into(),
            table: table.into(),
            alias: None,
        }
    }

    /// Select from the entity under an alias.
    #[must_use]
    pub fn aliased(mut self, alias: impl Into<Arc<str>>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn entity(&self) -> &Arc<str> {
        &self.entity
    }

    pub fn table(&self) -> &Arc<str> {
        &self.table
    }

    pub fn alias(&self) -> Option<&Arc<str>> {
        self.alias.as_ref()
    }

    /// Name columns are qualified with: the alias, or the table.
    pub fn selectable(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    /// Root load path of this entity.
    pub fn path(&self) -> Path {
        let token = match &self.alias {
            Some(alias) => EntityToken::aliased(Arc::clone(&self.entity), Arc::clone(alias)),
            None => EntityToken::new(Arc::clone(&self.entity)),
        };
        Path::for_entity(token)
    }

    /// FROM clause fragment.
    pub fn from_sql(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} AS {}", self.table, alias),
            None => self.table.to_string(),
        }
    }
}

/// Qualified column expression.
pub fn qualified_column(selectable: &str, column: &str) -> String {
    format!("{}.{}", selectable, column)
}

/// Result label of a selected column.
pub fn column_label(selectable: &str, column: &str) -> String {
    format!("{}__{}", selectable, column)
}

/// Retargets an entity's columns at an alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnAdapter {
    table: Arc<str>,
    alias: Arc<str>,
}

impl ColumnAdapter {
    pub fn new(table: impl Into<Arc<str>>, alias: impl Into<Arc<str>>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
        }
    }

    pub fn table(&self) -> &Arc<str> {
        &self.table
    }

    pub fn alias(&self) -> &Arc<str> {
        &self.alias
    }

    /// `<alias>.<column>`
    pub fn column(&self, column: &str) -> String {
        qualified_column(&self.alias, column)
    }

    /// `<alias>__<column>`
    pub fn label(&self, column: &str) -> String {
        column_label(&self.alias, column)
    }

    /// Rewrite `<table>.` references in a SQL fragment to `<alias>.`.
    pub fn adapt_sql(&self, sql: &str) -> String {
        let pattern = format!(r"\b{}\.", regex::escape(&self.table));
        match Regex::new(&pattern) {
            Ok(re) => re
                .replace_all(sql, format!("{}.", self.alias).as_str())
                .into_owned(),
            Err(e) => {
                tracing::warn!(table = %self.table, error = %e, "Could not adapt SQL fragment");
                sql.to_string()
            }
        }
    }
}

/// Selectable name for columns of `entity`, honouring an adapter.
pub fn selectable_for<'a>(entity: &'a QueryEntity, adapter: Option<&'a ColumnAdapter>) -> &'a str {
    match adapter {
        Some(adapter) => adapter.alias(),
        None => entity.selectable(),
    }
}
