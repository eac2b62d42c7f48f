//! Ambient load options of one statement compilation.
//!
//! Loader options are flattened into a [`LoadOptions`] map keyed by
//! [`LoaderKey`]. Properties probe it with their exact, wildcard and default
//! keys; the first hit wins.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use strata_core::{LoaderKey, LoaderKeys, OptionValue, Path, StrategyKey};

/// One ambient per-path loader override.
///
/// An entry without a strategy key is non-actionable: the property keeps its
/// default strategy, but still sees the entry's local options.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadOption {
    path: Path,
    strategy: Option<StrategyKey>,
    local_opts: BTreeMap<Cow<'static, str>, OptionValue>,
    propagate_to_loaders: bool,
}

impl LoadOption {
    pub fn new(path: Path) -> Self {
        Self {
            path,
            strategy: None,
            local_opts: BTreeMap::new(),
            propagate_to_loaders: true,
        }
    }

    /// Select a strategy for the path.
    #[must_use]
    pub fn strategy(mut self, key: StrategyKey) -> Self {
        self.strategy = Some(key);
        self
    }

    /// Attach a local option consumed by the resolved strategy.
    #[must_use]
    pub fn local_opt(mut self, name: impl Into<Cow<'static, str>>, value: impl Into<OptionValue>) -> Self {
        self.local_opts.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn propagate(mut self, propagate: bool) -> Self {
        self.propagate_to_loaders = propagate;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn strategy_key(&self) -> Option<&StrategyKey> {
        self.strategy.as_ref()
    }

    pub fn is_actionable(&self) -> bool {
        self.strategy.is_some()
    }

    pub fn get_local(&self, name: &str) -> Option<&OptionValue> {
        self.local_opts.get(name)
    }

    pub fn local_opts(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.local_opts.iter().map(|(k, v)| (k.as_ref(), v))
    }

    pub fn propagate_to_loaders(&self) -> bool {
        self.propagate_to_loaders
    }

    /// Merge local options of `other` into a copy of this option.
    ///
    /// Used when two options land on the same key: the later strategy wins and
    /// local options accumulate.
    pub fn merged(&self, other: &LoadOption) -> LoadOption {
        let mut merged = other.clone();
        for (name, value) in &self.local_opts {
            merged
                .local_opts
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        if merged.strategy.is_none() {
            merged.strategy.clone_from(&self.strategy);
        }
        merged
    }
}

/// The loader-keyed attribute mapping of one compilation.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    entries: HashMap<LoaderKey, Arc<LoadOption>>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the option for `key`, merging with an existing entry.
    pub fn set(&mut self, key: LoaderKey, option: LoadOption) {
        let option = match self.entries.get(&key) {
            Some(existing) => existing.merged(&option),
            None => option,
        };
        tracing::trace!(path = %key.path(), strategy = ?option.strategy_key(), "Load option set");
        self.entries.insert(key, Arc::new(option));
    }

    pub fn get(&self, key: &LoaderKey) -> Option<&Arc<LoadOption>> {
        self.entries.get(key)
    }

    /// Probe exact, wildcard, then default key. First hit wins.
    pub fn find(&self, keys: &LoaderKeys) -> Option<&Arc<LoadOption>> {
        keys.iter().find_map(|key| self.entries.get(key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Options to carry into deferred and post-load statements, ordered by path.
    pub fn propagating(&self) -> Vec<Arc<LoadOption>> {
        let mut options: Vec<Arc<LoadOption>> = self
            .entries
            .values()
            .filter(|o| o.propagate_to_loaders())
            .cloned()
            .collect();
        options.sort_by_key(|o| o.path().to_string());
        options
    }
}
