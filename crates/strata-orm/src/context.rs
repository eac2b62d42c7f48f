//! Phase-two state: populator buckets and the per-result query context.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use strata_core::{Path, Result, Row, Value};
use strata_query::{EagerJoin, GlobalCriteria, LoadOption, LoadOptions};

use crate::loading::InstanceState;
use crate::options::UserDefinedOption;

/// A per-row callable writing into an instance.
pub type PopulatorFn = Arc<dyn Fn(&Row, &mut InstanceState) -> Result<()> + Send + Sync>;

/// Wrap a closure as a [`PopulatorFn`].
pub fn populator<F>(func: F) -> PopulatorFn
where
    F: Fn(&Row, &mut InstanceState) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(func)
}

/// Named populator buckets, in the order they run for a new instance.
///
/// `Existing` runs instead of the others when a row repeats an instance
/// already produced by the same result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PopulatorBucket {
    Quick,
    Expire,
    New,
    Delayed,
    Existing,
}

/// One populator entry.
#[derive(Clone)]
pub struct Populator {
    pub key: Arc<str>,
    pub func: PopulatorFn,
}

impl fmt::Debug for Populator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Populator").field("key", &self.key).finish()
    }
}

/// Populators collected from every property of one entity.
#[derive(Debug, Clone, Default)]
pub struct Populators {
    quick: Vec<Populator>,
    expire: Vec<Populator>,
    new: Vec<Populator>,
    delayed: Vec<Populator>,
    existing: Vec<Populator>,
}

impl Populators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bucket: PopulatorBucket, key: &Arc<str>, func: PopulatorFn) {
        let entry = Populator {
            key: Arc::clone(key),
            func,
        };
        self.bucket_mut(bucket).push(entry);
    }

    pub fn bucket(&self, bucket: PopulatorBucket) -> &[Populator] {
        match bucket {
            PopulatorBucket::Quick => &self.quick,
            PopulatorBucket::Expire => &self.expire,
            PopulatorBucket::New => &self.new,
            PopulatorBucket::Delayed => &self.delayed,
            PopulatorBucket::Existing => &self.existing,
        }
    }

    fn bucket_mut(&mut self, bucket: PopulatorBucket) -> &mut Vec<Populator> {
        match bucket {
            PopulatorBucket::Quick => &mut self.quick,
            PopulatorBucket::Expire => &mut self.expire,
            PopulatorBucket::New => &mut self.new,
            PopulatorBucket::Delayed => &mut self.delayed,
            PopulatorBucket::Existing => &mut self.existing,
        }
    }

    /// Keys registered in a bucket, in order.
    pub fn keys(&self, bucket: PopulatorBucket) -> Vec<&str> {
        self.bucket(bucket).iter().map(|p| &*p.key).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.quick.is_empty()
            && self.expire.is_empty()
            && self.new.is_empty()
            && self.delayed.is_empty()
            && self.existing.is_empty()
    }
}

/// Options carried into statements emitted after the main load.
#[derive(Debug, Clone, Default)]
pub struct Propagated {
    pub load_options: Vec<Arc<LoadOption>>,
    pub user_options: Vec<Arc<UserDefinedOption>>,
}

/// A follow-up statement produced by an eager post-load strategy.
#[derive(Debug, Clone)]
pub struct PostLoad {
    /// Property path being loaded
    pub path: Path,
    pub strategy: &'static str,
    pub target_entity: Arc<str>,
    pub sql: String,
    pub params: Vec<Value>,
    pub options: Arc<Propagated>,
}

/// Parent keys collected while rows are processed.
#[derive(Debug, Clone, Default)]
pub struct PostLoadKeys {
    keys: Arc<Mutex<Vec<Vec<Value>>>>,
}

impl PostLoadKeys {
    /// Record a parent key. NULL-containing and repeated keys are ignored.
    pub fn push(&self, key: Vec<Value>) {
        if key.iter().any(Value::is_null) {
            return;
        }
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    pub fn snapshot(&self) -> Vec<Vec<Value>> {
        let keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        keys.clone()
    }
}

/// Turns collected parent keys into follow-up statements.
pub type PostLoadFinisher = Box<dyn Fn(&[Vec<Value>]) -> Vec<PostLoad> + Send + Sync>;

/// Wrap a closure as a [`PostLoadFinisher`].
pub fn post_load_finisher<F>(func: F) -> PostLoadFinisher
where
    F: Fn(&[Vec<Value>]) -> Vec<PostLoad> + Send + Sync + 'static,
{
    Box::new(func)
}

struct PendingPostLoad {
    path: Path,
    keys: PostLoadKeys,
    finish: PostLoadFinisher,
}

/// Context of one result being materialized.
pub struct QueryContext {
    attributes: LoadOptions,
    global_criteria: GlobalCriteria,
    eager_joins: HashMap<Path, EagerJoin>,
    statement: String,
    propagated: Arc<Propagated>,
    batch_size: usize,
    eagerloads: bool,
    post_loads: Vec<PendingPostLoad>,
}

impl QueryContext {
    pub fn new(
        attributes: LoadOptions,
        global_criteria: GlobalCriteria,
        eager_joins: HashMap<Path, EagerJoin>,
        statement: String,
        propagated: Arc<Propagated>,
        batch_size: usize,
    ) -> Self {
        Self {
            attributes,
            global_criteria,
            eager_joins,
            statement,
            propagated,
            batch_size: batch_size.max(1),
            eagerloads: true,
            post_loads: Vec::new(),
        }
    }

    /// With eager loading off, post-load strategies load lazily instead.
    #[must_use]
    pub fn with_eagerloads(mut self, enabled: bool) -> Self {
        self.eagerloads = enabled;
        self
    }

    pub fn enable_eagerloads(&self) -> bool {
        self.eagerloads
    }

    /// The ambient load options the statement was compiled with.
    pub fn attributes(&self) -> &LoadOptions {
        &self.attributes
    }

    pub fn global_criteria(&self) -> &GlobalCriteria {
        &self.global_criteria
    }

    /// The eager join set up for a relationship path, if any.
    pub fn eager_join(&self, path: &Path) -> Option<&EagerJoin> {
        self.eager_joins.get(path)
    }

    /// SQL of the statement being loaded.
    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn propagated(&self) -> &Arc<Propagated> {
        &self.propagated
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Register a post-load for `path`. Registering the same path again
    /// returns the existing collector.
    pub fn register_post_load(&mut self, path: &Path, finish: PostLoadFinisher) -> PostLoadKeys {
        if let Some(pending) = self.post_loads.iter().find(|p| &p.path == path) {
            return pending.keys.clone();
        }
        let keys = PostLoadKeys::default();
        self.post_loads.push(PendingPostLoad {
            path: path.clone(),
            keys: keys.clone(),
            finish,
        });
        keys
    }

    /// Build every registered post-load from the keys collected.
    pub fn finish_post_loads(&mut self) -> Vec<PostLoad> {
        let mut loads = Vec::new();
        for pending in self.post_loads.drain(..) {
            let keys = pending.keys.snapshot();
            let built = (pending.finish)(&keys);
            tracing::debug!(
                path = %pending.path,
                parents = keys.len(),
                statements = built.len(),
                "Post-load ready"
            );
            loads.extend(built);
        }
        loads
    }
}

impl fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryContext")
            .field("attributes", &self.attributes.len())
            .field("statement", &self.statement)
            .field("post_loads", &self.post_loads.len())
            .finish()
    }
}
