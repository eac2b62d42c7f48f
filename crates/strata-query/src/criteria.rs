//! Global loader criteria.
//!
//! Criteria options contribute extra WHERE/ON fragments for every load of a
//! given entity: the top-level statement, eager joins, and lazy or post-load
//! statements.

use std::collections::BTreeMap;
use std::sync::Arc;

/// Criteria fragments per target entity, in insertion order per entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GlobalCriteria {
    by_entity: BTreeMap<Arc<str>, Vec<String>>,
}

impl GlobalCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment for `entity`. Repeated fragments are kept once.
    pub fn add(&mut self, entity: impl Into<Arc<str>>, criteria: impl Into<String>) {
        let criteria = criteria.into();
        let list = self.by_entity.entry(entity.into()).or_default();
        if !list.contains(&criteria) {
            list.push(criteria);
        }
    }

    /// Merge every fragment of `other` into this mapping.
    pub fn extend(&mut self, other: &GlobalCriteria) {
        for (entity, list) in &other.by_entity {
            for criteria in list {
                self.add(Arc::clone(entity), criteria.clone());
            }
        }
    }

    pub fn for_entity(&self, entity: &str) -> &[String] {
        self.by_entity.get(entity).map_or(&[], Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.by_entity.is_empty()
    }

    /// Fragments for `entity` joined with AND, if any.
    pub fn render(&self, entity: &str) -> Option<String> {
        let list = self.for_entity(entity);
        if list.is_empty() {
            None
        } else {
            Some(list.join(" AND "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_dedups_and_renders() {
        let mut criteria = GlobalCriteria::new();
        criteria.add("Address", "addresses.active = 1");
        criteria.add("Address", "addresses.active = 1");
        criteria.add("Address", "addresses.deleted_at IS NULL");
        assert_eq!(criteria.for_entity("Address").len(), 2);
        assert_eq!(
            criteria.render("Address").as_deref(),
            Some("addresses.active = 1 AND addresses.deleted_at IS NULL")
        );
        assert_eq!(criteria.render("User"), None);
    }

    #[test]
    fn test_extend() {
        let mut a = GlobalCriteria::new();
        a.add("User", "users.tenant_id = 7");
        let mut b = GlobalCriteria::new();
        b.add("User", "users.tenant_id = 7");
        b.add("Address", "addresses.active = 1");
        a.extend(&b);
        assert_eq!(a.for_entity("User").len(), 1);
        assert_eq!(a.for_entity("Address").len(), 1);
    }
}
