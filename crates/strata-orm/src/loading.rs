//! Row materialization.
//!
//! [`instance_processor`] asks every property of a mapper for populators and
//! packages them into a [`RowProcessor`]. The processor turns rows into
//! [`InstanceState`]s, reusing an instance when a row repeats its identity.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use strata_core::{ColumnInfo, Error, Path, Result, Row, Value, hash_value};
use strata_query::{ColumnAdapter, QueryEntity, column_label, selectable_for};

use crate::context::{PopulatorBucket, Populators, PostLoad, Propagated, QueryContext};
use crate::mapper::Mapper;

/// Buckets run for a newly seen instance, in order.
const NEW_INSTANCE_BUCKETS: [PopulatorBucket; 4] = [
    PopulatorBucket::Quick,
    PopulatorBucket::Expire,
    PopulatorBucket::New,
    PopulatorBucket::Delayed,
];

/// Entity name plus primary key values.
#[derive(Debug, Clone)]
pub struct IdentityKey {
    entity: Arc<str>,
    values: Vec<Value>,
}

impl IdentityKey {
    pub fn new(entity: Arc<str>, values: Vec<Value>) -> Self {
        Self { entity, values }
    }

    pub fn entity(&self) -> &Arc<str> {
        &self.entity
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl PartialEq for IdentityKey {
    fn eq(&self, other: &Self) -> bool {
        self.entity == other.entity && self.values == other.values
    }
}

impl Eq for IdentityKey {}

impl Hash for IdentityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entity.hash(state);
        for value in &self.values {
            hash_value(value, state);
        }
    }
}

/// A loaded attribute value.
#[derive(Debug, Clone)]
pub enum LoadedValue {
    Scalar(Value),
    Object(Option<Box<InstanceState>>),
    Collection(Vec<InstanceState>),
}

/// What accessing an unloaded attribute does.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadTrigger {
    /// Emit this statement
    Sql { sql: String, params: Vec<Value> },
    /// Refuse to load
    Raise { sql_only: bool },
}

/// A load scheduled for first access of an attribute.
#[derive(Debug, Clone)]
pub struct DeferredLoad {
    pub key: Arc<str>,
    pub strategy: &'static str,
    pub trigger: LoadTrigger,
    pub options: Arc<Propagated>,
}

/// One materialized entity instance.
#[derive(Debug, Clone)]
pub struct InstanceState {
    entity: Arc<str>,
    identity: Option<IdentityKey>,
    values: BTreeMap<Arc<str>, LoadedValue>,
    deferred: BTreeMap<Arc<str>, DeferredLoad>,
    expired: BTreeSet<Arc<str>>,
}

impl InstanceState {
    pub fn new(entity: Arc<str>) -> Self {
        Self {
            entity,
            identity: None,
            values: BTreeMap::new(),
            deferred: BTreeMap::new(),
            expired: BTreeSet::new(),
        }
    }

    pub fn entity(&self) -> &Arc<str> {
        &self.entity
    }

    pub fn identity(&self) -> Option<&IdentityKey> {
        self.identity.as_ref()
    }

    /// Set a loaded value, clearing any deferred load or expiry for the key.
    pub fn set(&mut self, key: &Arc<str>, value: LoadedValue) {
        self.deferred.remove(key);
        self.expired.remove(key);
        self.values.insert(Arc::clone(key), value);
    }

    pub fn get(&self, key: &str) -> Option<&LoadedValue> {
        self.values.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut LoadedValue> {
        self.values.get_mut(key)
    }

    pub fn scalar(&self, key: &str) -> Option<&Value> {
        match self.values.get(key) {
            Some(LoadedValue::Scalar(value)) => Some(value),
            _ => None,
        }
    }

    /// The related instance of a scalar relationship.
    pub fn related(&self, key: &str) -> Option<&InstanceState> {
        match self.values.get(key) {
            Some(LoadedValue::Object(Some(obj))) => Some(obj),
            _ => None,
        }
    }

    pub fn collection(&self, key: &str) -> Option<&[InstanceState]> {
        match self.values.get(key) {
            Some(LoadedValue::Collection(items)) => Some(items),
            _ => None,
        }
    }

    pub fn is_loaded(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Keys with a loaded value, sorted.
    pub fn loaded_keys(&self) -> Vec<&str> {
        self.values.keys().map(|k| &**k).collect()
    }

    /// Schedule a load for first access, replacing any loaded value.
    pub fn set_deferred(&mut self, load: DeferredLoad) {
        self.values.remove(&load.key);
        self.deferred.insert(Arc::clone(&load.key), load);
    }

    pub fn deferred(&self, key: &str) -> Option<&DeferredLoad> {
        self.deferred.get(key)
    }

    /// The load that first access of `key` would run.
    ///
    /// Raise-on-access attributes return [`Error::InvalidRequest`].
    pub fn pending_load(&self, key: &str) -> Result<Option<&DeferredLoad>> {
        match self.deferred.get(key) {
            Some(DeferredLoad {
                trigger: LoadTrigger::Raise { sql_only },
                strategy,
                ..
            }) => {
                let reason = if *strategy == "DeferredColumnLoader" {
                    "raiseload=True"
                } else if *sql_only {
                    "lazy='raise_on_sql'"
                } else {
                    "lazy='raise'"
                };
                Err(Error::InvalidRequest(format!(
                    "'{}.{}' is not available due to {}",
                    self.entity, key, reason
                )))
            }
            other => Ok(other),
        }
    }

    /// Mark `key` expired: loaded again on next access.
    pub fn expire(&mut self, key: &Arc<str>) {
        self.values.remove(key);
        self.expired.insert(Arc::clone(key));
    }

    pub fn is_expired(&self, key: &str) -> bool {
        self.expired.contains(key)
    }
}

/// Populators of one entity, applied row by row.
#[derive(Debug)]
pub struct RowProcessor {
    entity: Arc<str>,
    identity_labels: Vec<String>,
    populators: Populators,
}

impl RowProcessor {
    pub fn new(entity: Arc<str>, identity_labels: Vec<String>, populators: Populators) -> Self {
        Self {
            entity,
            identity_labels,
            populators,
        }
    }

    pub fn populators(&self) -> &Populators {
        &self.populators
    }

    /// Identity of the instance a row carries. `None` when any key column is
    /// NULL or absent (no instance on this row, e.g. an empty outer join).
    pub fn identity(&self, row: &Row) -> Option<IdentityKey> {
        if self.identity_labels.is_empty() {
            return None;
        }
        let mut values = Vec::with_capacity(self.identity_labels.len());
        for label in &self.identity_labels {
            match row.get_by_name(label) {
                Some(value) if !value.is_null() => values.push(value.clone()),
                _ => return None,
            }
        }
        Some(IdentityKey::new(Arc::clone(&self.entity), values))
    }

    /// Build a fresh instance from a row.
    pub fn populate_new(&self, row: &Row) -> Result<InstanceState> {
        let mut state = InstanceState::new(Arc::clone(&self.entity));
        state.identity = self.identity(row);
        for bucket in NEW_INSTANCE_BUCKETS {
            for populator in self.populators.bucket(bucket) {
                (populator.func)(row, &mut state)?;
            }
        }
        Ok(state)
    }

    /// Apply a repeated row to an instance already produced.
    pub fn populate_existing(&self, row: &Row, state: &mut InstanceState) -> Result<()> {
        for populator in self.populators.bucket(PopulatorBucket::Existing) {
            (populator.func)(row, state)?;
        }
        Ok(())
    }

    /// Merge the instance a row carries into `list`, de-duplicated by identity.
    pub fn merge_into(&self, row: &Row, list: &mut Vec<InstanceState>) -> Result<()> {
        let Some(identity) = self.identity(row) else {
            return Ok(());
        };
        match list.iter_mut().find(|s| s.identity.as_ref() == Some(&identity)) {
            Some(existing) => self.populate_existing(row, existing),
            None => {
                list.push(self.populate_new(row)?);
                Ok(())
            }
        }
    }

    /// Load every row of a top-level result.
    pub fn load_all(&self, rows: &[Row]) -> Result<Vec<InstanceState>> {
        let mut instances: Vec<InstanceState> = Vec::new();
        let mut seen: HashMap<IdentityKey, usize> = HashMap::new();
        for row in rows {
            match self.identity(row) {
                Some(identity) => match seen.get(&identity) {
                    Some(&index) => self.populate_existing(row, &mut instances[index])?,
                    None => {
                        seen.insert(identity, instances.len());
                        instances.push(self.populate_new(row)?);
                    }
                },
                None => instances.push(self.populate_new(row)?),
            }
        }
        Ok(instances)
    }
}

/// Collect populators from every property of `mapper`.
pub fn instance_processor(
    context: &mut QueryContext,
    mapper: &Mapper,
    query_entity: &QueryEntity,
    path: &Path,
    result: &ColumnInfo,
    adapter: Option<&ColumnAdapter>,
) -> Result<RowProcessor> {
    let mut populators = Populators::new();
    for prop in mapper.iterate_properties() {
        prop.create_row_processor(
            context,
            query_entity,
            path,
            mapper,
            result,
            adapter,
            &mut populators,
        )?;
    }

    let selectable = selectable_for(query_entity, adapter);
    let identity_labels = mapper
        .entity()
        .primary_key()
        .iter()
        .map(|col| column_label(selectable, col))
        .collect();

    Ok(RowProcessor::new(
        Arc::clone(mapper.name()),
        identity_labels,
        populators,
    ))
}

/// Instances and follow-up statements produced from one result.
#[derive(Debug)]
pub struct LoadResult {
    pub instances: Vec<InstanceState>,
    pub post_loads: Vec<PostLoad>,
}
