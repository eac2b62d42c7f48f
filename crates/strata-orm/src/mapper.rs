//! Entity mappers and the mapper registry.
//!
//! A [`Mapper`] lists the properties of one entity in declared order, with
//! properties inherited from a single-table base mapper first. The
//! [`MapperRegistry`] configures every mapper once all of them exist.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use strata_core::{ClassManager, ConfigErrorKind, EntityDescriptor, Error, Path, Result};
use strata_query::QueryEntity;

use crate::property::{ColumnSpec, MapperProperty, RelationshipSpec, StrategizedProperty};

/// The mapping of one entity.
#[derive(Debug)]
pub struct Mapper {
    entity: Arc<EntityDescriptor>,
    properties: Vec<Arc<dyn MapperProperty>>,
    non_primary: bool,
    class_manager: ClassManager,
    configured: AtomicBool,
}

impl Mapper {
    /// Start mapping `entity`.
    pub fn builder(entity: EntityDescriptor) -> MapperBuilder {
        MapperBuilder {
            entity: Arc::new(entity),
            base: None,
            properties: Vec::new(),
            non_primary: false,
        }
    }

    /// Start mapping a single-table subclass of `base`.
    pub fn inherits(base: &Arc<Mapper>, name: impl Into<Arc<str>>) -> MapperBuilder {
        let entity = EntityDescriptor::subclass(name, Arc::clone(&base.entity));
        MapperBuilder {
            entity: Arc::new(entity),
            base: Some(Arc::clone(base)),
            properties: Vec::new(),
            non_primary: false,
        }
    }

    pub fn entity(&self) -> &Arc<EntityDescriptor> {
        &self.entity
    }

    pub fn name(&self) -> &Arc<str> {
        self.entity.name()
    }

    pub fn table(&self) -> &Arc<str> {
        self.entity.table()
    }

    /// Secondary mappers never instrument the class.
    pub fn non_primary(&self) -> bool {
        self.non_primary
    }

    pub fn class_manager(&self) -> &ClassManager {
        &self.class_manager
    }

    /// Properties in declared order.
    pub fn iterate_properties(&self) -> impl Iterator<Item = &Arc<dyn MapperProperty>> {
        self.properties.iter()
    }

    pub fn get_property(&self, key: &str) -> Result<&Arc<dyn MapperProperty>> {
        self.properties
            .iter()
            .find(|p| &**p.key() == key)
            .ok_or_else(|| {
                Error::config(
                    ConfigErrorKind::UnknownProperty,
                    format!("Mapper '{}' has no property '{}'", self.name(), key),
                )
            })
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.get_property(key).is_ok()
    }

    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::Acquire)
    }

    /// Columns loaded by default, in declared order.
    pub fn loaded_columns(&self) -> Vec<Arc<str>> {
        let mut columns: Vec<Arc<str>> = Vec::new();
        for prop in &self.properties {
            for column in prop.loaded_columns() {
                if !columns.contains(&column) {
                    columns.push(column);
                }
            }
        }
        columns
    }

    /// Query entity selecting from this mapper's table.
    pub fn query_entity(&self) -> QueryEntity {
        QueryEntity::new(Arc::clone(self.name()), Arc::clone(self.table()))
    }

    /// Root load path of this entity.
    pub fn entity_path(&self) -> Path {
        Path::for_entity(self.entity.token())
    }
}

/// Builder for a [`Mapper`].
#[derive(Debug)]
pub struct MapperBuilder {
    entity: Arc<EntityDescriptor>,
    base: Option<Arc<Mapper>>,
    properties: Vec<Arc<dyn MapperProperty>>,
    non_primary: bool,
}

impl MapperBuilder {
    /// Add a property.
    #[must_use]
    pub fn property(mut self, property: impl MapperProperty + 'static) -> Self {
        self.properties.push(Arc::new(property));
        self
    }

    /// Add a plain column property named after its column.
    #[must_use]
    pub fn column(self, name: &str) -> Self {
        self.property(StrategizedProperty::column(name, ColumnSpec::new(name)))
    }

    /// Add a relationship property.
    pub fn relationship(self, key: &str, spec: RelationshipSpec) -> Result<Self> {
        Ok(self.property(StrategizedProperty::relationship(key, spec)?))
    }

    #[must_use]
    pub fn non_primary(mut self, non_primary: bool) -> Self {
        self.non_primary = non_primary;
        self
    }

    pub fn build(self) -> Result<Arc<Mapper>> {
        let mut properties: Vec<Arc<dyn MapperProperty>> = match &self.base {
            Some(base) => base.properties.clone(),
            None => Vec::new(),
        };

        for prop in self.properties {
            if properties.iter().any(|p| p.key() == prop.key()) {
                return Err(Error::config(
                    ConfigErrorKind::DuplicateRegistration,
                    format!(
                        "Mapper '{}' already has a property '{}'",
                        self.entity.name(),
                        prop.key()
                    ),
                ));
            }
            prop.set_parent(Arc::clone(&self.entity))?;
            properties.push(prop);
        }

        tracing::debug!(
            entity = %self.entity.name(),
            properties = properties.len(),
            non_primary = self.non_primary,
            "Built mapper"
        );

        Ok(Arc::new(Mapper {
            entity: self.entity,
            properties,
            non_primary: self.non_primary,
            class_manager: ClassManager::new(),
            configured: AtomicBool::new(false),
        }))
    }
}

/// All mappers of one mapping configuration.
#[derive(Debug, Default)]
pub struct MapperRegistry {
    mappers: Vec<Arc<Mapper>>,
    primary: HashMap<Arc<str>, usize>,
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mapper. Only one primary mapper per entity.
    pub fn add(&mut self, mapper: Arc<Mapper>) -> Result<()> {
        if !mapper.non_primary() {
            if self.primary.contains_key(mapper.name()) {
                return Err(Error::config(
                    ConfigErrorKind::DuplicateRegistration,
                    format!("entity '{}' already has a primary mapper", mapper.name()),
                ));
            }
            self.primary
                .insert(Arc::clone(mapper.name()), self.mappers.len());
        }
        self.mappers.push(mapper);
        Ok(())
    }

    /// The primary mapper of `entity`.
    pub fn get(&self, entity: &str) -> Option<&Arc<Mapper>> {
        self.primary.get(entity).map(|&i| &self.mappers[i])
    }

    pub fn mappers(&self) -> &[Arc<Mapper>] {
        &self.mappers
    }

    /// Initialize every property, then instrument every mapper.
    ///
    /// Properties are initialized by the mapper that declares them; mappers
    /// already configured are skipped.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn configure(&self) -> Result<()> {
        let pending: Vec<&Arc<Mapper>> = self
            .mappers
            .iter()
            .filter(|m| !m.is_configured())
            .collect();

        let mut initialized = 0usize;
        for mapper in &pending {
            for prop in mapper.iterate_properties() {
                let declared_here = prop
                    .parent()
                    .is_some_and(|parent| parent.name() == mapper.name());
                if declared_here && !prop.configure_flags().is_started() {
                    prop.init(self)?;
                    initialized += 1;
                }
            }
        }

        for mapper in &pending {
            for prop in mapper.iterate_properties() {
                if prop.is_initialized() {
                    prop.post_instrument_class(mapper)?;
                }
            }
            mapper.configured.store(true, Ordering::Release);
            tracing::debug!(
                entity = %mapper.name(),
                attributes = mapper.class_manager().len(),
                "Configured mapper"
            );
        }

        tracing::info!(
            mappers = pending.len(),
            properties = initialized,
            "Mapper configuration complete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::RelationshipKind;
    use strata_core::{AttributeKind, LoaderCallable};

    fn users() -> Arc<Mapper> {
        Mapper::builder(EntityDescriptor::new("User", "users", ["id"]))
            .column("id")
            .column("name")
            .relationship(
                "addresses",
                RelationshipSpec::new("Address", RelationshipKind::OneToMany).remote_key("user_id"),
            )
            .unwrap()
            .build()
            .unwrap()
    }

    fn addresses() -> Arc<Mapper> {
        Mapper::builder(EntityDescriptor::new("Address", "addresses", ["id"]))
            .column("id")
            .column("user_id")
            .column("email")
            .build()
            .unwrap()
    }

    #[test]
    fn test_declared_order_and_lookup() {
        let user = users();
        let keys: Vec<&str> = user.iterate_properties().map(|p| &**p.key()).collect();
        assert_eq!(keys, vec!["id", "name", "addresses"]);
        assert!(user.has_property("name"));
        let err = user.get_property("nope").unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnknownProperty));
        assert_eq!(user.loaded_columns().len(), 2);
    }

    #[test]
    fn test_duplicate_property_rejected() {
        let err = Mapper::builder(EntityDescriptor::new("User", "users", ["id"]))
            .column("id")
            .column("id")
            .build()
            .unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::DuplicateRegistration));
    }

    #[test]
    fn test_configure_instruments_attributes() {
        let mut registry = MapperRegistry::new();
        registry.add(users()).unwrap();
        registry.add(addresses()).unwrap();
        registry.configure().unwrap();

        let user = registry.get("User").unwrap();
        assert!(user.is_configured());
        let attr = user.class_manager().get("addresses").unwrap();
        assert_eq!(attr.kind, AttributeKind::Collection);
        assert_eq!(attr.callable, Some(LoaderCallable::Lazy));
        assert_eq!(attr.installed_by, "LazyLoader");

        let name = user.class_manager().get("name").unwrap();
        assert_eq!(name.installed_by, "ColumnLoader");

        // second configure is a no-op
        registry.configure().unwrap();
    }

    #[test]
    fn test_missing_target() {
        let mut registry = MapperRegistry::new();
        registry.add(users()).unwrap();
        let err = registry.configure().unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::MissingTarget));
    }

    #[test]
    fn test_second_init_rejected() {
        let mut registry = MapperRegistry::new();
        registry.add(users()).unwrap();
        registry.add(addresses()).unwrap();
        registry.configure().unwrap();

        let prop = registry.get("User").unwrap().get_property("name").unwrap();
        assert!(prop.configure_flags().is_started());
        let err = prop.init(&registry).unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::AlreadyInitialized));
        assert!(prop.configure_flags().is_finished());
    }

    #[test]
    fn test_single_table_inheritance() {
        let employee = Mapper::builder(EntityDescriptor::new("Employee", "employees", ["id"]))
            .column("id")
            .column("name")
            .build()
            .unwrap();
        let engineer = Mapper::inherits(&employee, "Engineer")
            .column("language")
            .build()
            .unwrap();

        let keys: Vec<&str> = engineer.iterate_properties().map(|p| &**p.key()).collect();
        assert_eq!(keys, vec!["id", "name", "language"]);
        let name = engineer.get_property("name").unwrap();
        assert_eq!(name.parent().map(|p| &**p.name()), Some("Employee"));

        let mut registry = MapperRegistry::new();
        registry.add(Arc::clone(&employee)).unwrap();
        registry.add(Arc::clone(&engineer)).unwrap();
        registry.configure().unwrap();
        assert!(engineer.class_manager().has_impl("name"));
        assert!(employee.class_manager().has_impl("name"));
        assert!(!employee.class_manager().has_impl("language"));
    }

    #[test]
    fn test_non_primary_mapper_does_not_instrument() {
        let mut registry = MapperRegistry::new();
        registry.add(addresses()).unwrap();
        let secondary = Mapper::builder(EntityDescriptor::new("Address", "addresses", ["id"]))
            .column("id")
            .non_primary(true)
            .build()
            .unwrap();
        registry.add(Arc::clone(&secondary)).unwrap();
        registry.configure().unwrap();
        assert!(secondary.class_manager().is_empty());
        assert!(registry.get("Address").is_some_and(|m| !m.non_primary()));
    }
}
