//! The in-progress SELECT statement strategies mutate during phase one.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use strata_core::Path;

use crate::adapter::{ColumnAdapter, QueryEntity};
use crate::criteria::GlobalCriteria;
use crate::join::{Join, JoinType};
use crate::load::LoadOptions;

/// One entry of the select list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectColumn {
    pub expr: String,
    pub label: String,
}

/// An eager join already added for a relationship path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EagerJoin {
    pub target_entity: Arc<str>,
    pub adapter: ColumnAdapter,
    pub join_type: JoinType,
}

/// Mutable compile state of one SELECT.
#[derive(Debug, Clone)]
pub struct CompileState {
    entity: QueryEntity,
    columns: Vec<SelectColumn>,
    joins: Vec<Join>,
    where_clauses: Vec<String>,
    order_by: Vec<String>,
    attributes: LoadOptions,
    global_criteria: GlobalCriteria,
    eager_joins: HashMap<Path, EagerJoin>,
    alias_counters: HashMap<Arc<str>, usize>,
    entities_replaced: bool,
    eagerloads: bool,
}

impl CompileState {
    pub fn new(entity: QueryEntity) -> Self {
        Self {
            entity,
            columns: Vec::new(),
            joins: Vec::new(),
            where_clauses: Vec::new(),
            order_by: Vec::new(),
            attributes: LoadOptions::new(),
            global_criteria: GlobalCriteria::new(),
            eager_joins: HashMap::new(),
            alias_counters: HashMap::new(),
            entities_replaced: false,
            eagerloads: true,
        }
    }

    pub fn entity(&self) -> &QueryEntity {
        &self.entity
    }

    /// Add a column to the select list. Returns false when the label is
    /// already selected.
    pub fn add_column(&mut self, expr: impl Into<String>, label: impl Into<String>) -> bool {
        let label = label.into();
        if self.has_column(&label) {
            return false;
        }
        self.columns.push(SelectColumn {
            expr: expr.into(),
            label,
        });
        true
    }

    pub fn has_column(&self, label: &str) -> bool {
        self.columns.iter().any(|c| c.label == label)
    }

    pub fn columns(&self) -> &[SelectColumn] {
        &self.columns
    }

    /// Result labels in select-list order.
    pub fn column_labels(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.label.clone()).collect()
    }

    pub fn add_join(&mut self, join: Join) {
        self.joins.push(join);
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn add_where(&mut self, criteria: impl Into<String>) {
        self.where_clauses.push(criteria.into());
    }

    pub fn where_clauses(&self) -> &[String] {
        &self.where_clauses
    }

    pub fn add_order_by(&mut self, clause: impl Into<String>) {
        self.order_by.push(clause.into());
    }

    /// Ambient load-option mapping.
    pub fn attributes(&self) -> &LoadOptions {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut LoadOptions {
        &mut self.attributes
    }

    pub fn global_criteria(&self) -> &GlobalCriteria {
        &self.global_criteria
    }

    pub fn global_criteria_mut(&mut self) -> &mut GlobalCriteria {
        &mut self.global_criteria
    }

    /// Record an eager join for `path`. Returns false if one already exists.
    pub fn register_eager_join(&mut self, path: Path, join: EagerJoin) -> bool {
        if self.eager_joins.contains_key(&path) {
            return false;
        }
        self.eager_joins.insert(path, join);
        true
    }

    pub fn eager_join(&self, path: &Path) -> Option<&EagerJoin> {
        self.eager_joins.get(path)
    }

    /// Every eager join, keyed by relationship path.
    pub fn eager_joins(&self) -> &HashMap<Path, EagerJoin> {
        &self.eager_joins
    }

    /// Next anonymous alias for `table`: `addresses_1`, `addresses_2`, ...
    pub fn anon_alias(&mut self, table: &Arc<str>) -> Arc<str> {
        let counter = self.alias_counters.entry(Arc::clone(table)).or_insert(0);
        *counter += 1;
        Arc::from(format!("{}_{}", table, counter))
    }

    /// Mark that the selected entities were replaced after options were attached.
    pub fn set_entities_replaced(&mut self, replaced: bool) {
        self.entities_replaced = replaced;
    }

    pub fn entities_replaced(&self) -> bool {
        self.entities_replaced
    }

    /// Joined eager loading can be switched off for a whole statement.
    pub fn set_enable_eagerloads(&mut self, enable: bool) {
        self.eagerloads = enable;
    }

    pub fn enable_eagerloads(&self) -> bool {
        self.eagerloads
    }

    /// Render the statement.
    pub fn to_sql(&self) -> String {
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| format!("{} AS {}", c.expr, c.label))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut sql = format!("SELECT {} FROM {}", columns, self.entity.from_sql());
        for join in &self.joins {
            sql.push_str(&join.to_sql());
        }
        if !self.where_clauses.is_empty() {
            let _ = write!(sql, " WHERE {}", self.where_clauses.join(" AND "));
        }
        if !self.order_by.is_empty() {
            let _ = write!(sql, " ORDER BY {}", self.order_by.join(", "));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::EntityToken;

    #[test]
    fn test_add_column_is_idempotent() {
        let mut state = CompileState::new(QueryEntity::new("User", "users"));
        assert!(state.add_column("users.id", "users__id"));
        assert!(!state.add_column("users.id", "users__id"));
        assert_eq!(state.columns().len(), 1);
        assert_eq!(state.column_labels(), vec!["users__id".to_string()]);
    }

    #[test]
    fn test_anon_alias_counts_per_table() {
        let mut state = CompileState::new(QueryEntity::new("User", "users"));
        let addresses: Arc<str> = Arc::from("addresses");
        assert_eq!(&*state.anon_alias(&addresses), "addresses_1");
        assert_eq!(&*state.anon_alias(&addresses), "addresses_2");
        assert_eq!(&*state.anon_alias(&Arc::from("orders")), "orders_1");
    }

    #[test]
    fn test_eager_join_registered_once() {
        let mut state = CompileState::new(QueryEntity::new("User", "users"));
        let path = Path::for_entity(EntityToken::new("User"));
        let join = EagerJoin {
            target_entity: Arc::from("Address"),
            adapter: ColumnAdapter::new("addresses", "addresses_1"),
            join_type: JoinType::Left,
        };
        assert!(state.register_eager_join(path.clone(), join.clone()));
        assert!(!state.register_eager_join(path.clone(), join));
        assert!(state.eager_join(&path).is_some());
        assert_eq!(state.eager_joins().len(), 1);
        assert!(state.enable_eagerloads());
    }

    #[test]
    fn test_to_sql() {
        let mut state = CompileState::new(QueryEntity::new("User", "users"));
        state.add_column("users.id", "users__id");
        state.add_column("users.name", "users__name");
        state.add_join(
            Join::left("addresses", "users.id = addresses_1.user_id").alias("addresses_1"),
        );
        state.add_where("users.id > 5");
        state.add_order_by("users.id");
        assert_eq!(
            state.to_sql(),
            "SELECT users.id AS users__id, users.name AS users__name FROM users \
             LEFT JOIN addresses AS addresses_1 ON users.id = addresses_1.user_id \
             WHERE users.id > 5 ORDER BY users.id"
        );
    }
}
