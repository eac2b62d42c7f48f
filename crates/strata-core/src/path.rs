//! Load paths: where in the load graph a property sits.
//!
//! A [`Path`] is an immutable sequence of hops from the query's root entity:
//! `User -> addresses -> Address -> email`. Paths are cheap to clone (shared
//! slice) and are used as hash keys for the ambient load-option mapping of a
//! statement compilation.
//!
//! Each property path derives three [`LoaderKey`]s that are probed in order
//! when a property resolves its strategy for one query:
//!
//! 1. exact: `("loader", User/addresses)`
//! 2. wildcard: `("loader", User/relationship:*)`
//! 3. default: `("loader", relationship:_sa_default)`

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Token standing for "every attribute of this category".
pub const WILDCARD_TOKEN: &str = "*";

/// Token standing for "every attribute of this category, at any depth".
pub const DEFAULT_TOKEN: &str = "_sa_default";

/// Marker of load-option entries in the compile-state attribute mapping.
pub const LOADER_MARKER: &str = "loader";

/// An entity hop, optionally under an alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityToken {
    entity: Arc<str>,
    alias: Option<Arc<str>>,
}

impl EntityToken {
    pub fn new(entity: impl Into<Arc<str>>) -> Self {
        Self {
            entity: entity.into(),
            alias: None,
        }
    }

    pub fn aliased(entity: impl Into<Arc<str>>, alias: impl Into<Arc<str>>) -> Self {
        Self {
            entity: entity.into(),
            alias: Some(alias.into()),
        }
    }

    pub fn entity(&self) -> &Arc<str> {
        &self.entity
    }

    pub fn alias(&self) -> Option<&Arc<str>> {
        self.alias.as_ref()
    }

    pub fn is_aliased(&self) -> bool {
        self.alias.is_some()
    }

    /// Same entity without the alias.
    pub fn natural(&self) -> EntityToken {
        EntityToken::new(Arc::clone(&self.entity))
    }
}

/// One hop of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PathElement {
    Entity(EntityToken),
    Property(Arc<str>),
    /// Wildcard / default tokens such as `relationship:*`
    Token(Arc<str>),
}

/// Immutable ordered hop sequence.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path {
    elements: Arc<[PathElement]>,
}

impl Path {
    /// The empty root path.
    pub fn root() -> Self {
        Self {
            elements: Arc::from(Vec::new()),
        }
    }

    /// A path consisting of a single entity hop.
    pub fn for_entity(token: EntityToken) -> Self {
        Self::root().child_entity(token)
    }

    fn extended(&self, element: PathElement) -> Self {
        let mut elements = Vec::with_capacity(self.elements.len() + 1);
        elements.extend(self.elements.iter().cloned());
        elements.push(element);
        Self {
            elements: elements.into(),
        }
    }

    /// Append an entity hop.
    pub fn child_entity(&self, token: EntityToken) -> Self {
        self.extended(PathElement::Entity(token))
    }

    /// Append a property hop for a property declared on `declaring_entity`.
    ///
    /// When the trailing entity hop is not aliased it is replaced by the
    /// declaring entity, so an attribute inherited by a subclass is addressed
    /// the same way as on its base entity.
    pub fn property(&self, declaring_entity: &Arc<str>, key: &Arc<str>) -> Self {
        let mut elements: Vec<PathElement> = self.elements.to_vec();
        if let Some(PathElement::Entity(token)) = elements.last_mut() {
            if !token.is_aliased() && token.entity != *declaring_entity {
                *token = EntityToken::new(Arc::clone(declaring_entity));
            }
        }
        elements.push(PathElement::Property(Arc::clone(key)));
        Self {
            elements: elements.into(),
        }
    }

    /// Append a wildcard/default token.
    pub fn token(&self, token: impl Into<Arc<str>>) -> Self {
        self.extended(PathElement::Token(token.into()))
    }

    /// The path without aliases.
    pub fn natural_path(&self) -> Self {
        let aliased = self
            .elements
            .iter()
            .any(|e| matches!(e, PathElement::Entity(t) if t.is_aliased()));
        if !aliased {
            return self.clone();
        }
        let elements: Vec<PathElement> = self
            .elements
            .iter()
            .map(|e| match e {
                PathElement::Entity(t) => PathElement::Entity(t.natural()),
                other => other.clone(),
            })
            .collect();
        Self {
            elements: elements.into(),
        }
    }

    /// The path minus its last hop.
    pub fn parent(&self) -> Self {
        let len = self.elements.len().saturating_sub(1);
        Self {
            elements: self.elements[..len].to_vec().into(),
        }
    }

    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    pub fn last(&self) -> Option<&PathElement> {
        self.elements.last()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The last entity hop, if any.
    pub fn last_entity(&self) -> Option<&EntityToken> {
        self.elements.iter().rev().find_map(|e| match e {
            PathElement::Entity(t) => Some(t),
            _ => None,
        })
    }

    /// How many entity hops name `entity`.
    pub fn entity_depth(&self, entity: &str) -> usize {
        self.elements
            .iter()
            .filter(|e| matches!(e, PathElement::Entity(t) if &*t.entity == entity))
            .count()
    }

    pub fn contains_entity(&self, entity: &str) -> bool {
        self.entity_depth(entity) > 0
    }

    /// The three ambient-option lookup keys of this property path, in probe order.
    pub fn loader_keys(&self, tokens: &WildcardTokens) -> LoaderKeys {
        LoaderKeys {
            exact: LoaderKey::new(self.natural_path()),
            wildcard: tokens.wildcard_key(&self.parent()),
            default: tokens.default_key().clone(),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.elements.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            match element {
                PathElement::Entity(t) => match &t.alias {
                    Some(alias) => write!(f, "{}({})", alias, t.entity)?,
                    None => write!(f, "{}", t.entity)?,
                },
                PathElement::Property(key) => write!(f, "{}", key)?,
                PathElement::Token(token) => write!(f, "{}", token)?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({})", self)
    }
}

/// Key of one load-option entry in the compile-state mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoaderKey {
    marker: &'static str,
    path: Path,
}

impl LoaderKey {
    pub fn new(path: Path) -> Self {
        Self {
            marker: LOADER_MARKER,
            path,
        }
    }

    pub fn marker(&self) -> &'static str {
        self.marker
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Exact, wildcard and default keys for one property path.
#[derive(Debug, Clone)]
pub struct LoaderKeys {
    pub exact: LoaderKey,
    pub wildcard: LoaderKey,
    pub default: LoaderKey,
}

impl LoaderKeys {
    /// Keys in probe order: exact beats wildcard beats default.
    pub fn iter(&self) -> impl Iterator<Item = &LoaderKey> {
        [&self.exact, &self.wildcard, &self.default].into_iter()
    }
}

/// Wildcard tokens of one property category (`column`, `relationship`).
///
/// Computed once per property and cached on it.
#[derive(Debug, Clone)]
pub struct WildcardTokens {
    wildcard: Arc<str>,
    default_key: LoaderKey,
}

impl WildcardTokens {
    pub fn new(category: &str) -> Self {
        let default_token: Arc<str> = Arc::from(format!("{category}:{DEFAULT_TOKEN}"));
        Self {
            wildcard: Arc::from(format!("{category}:{WILDCARD_TOKEN}")),
            default_key: LoaderKey::new(Path::root().token(default_token)),
        }
    }

    /// `<category>:*`
    pub fn wildcard_token(&self) -> &Arc<str> {
        &self.wildcard
    }

    /// Wildcard key for attributes of the entity at `entity_path`.
    pub fn wildcard_key(&self, entity_path: &Path) -> LoaderKey {
        LoaderKey::new(entity_path.natural_path().token(Arc::clone(&self.wildcard)))
    }

    /// `("loader", ("<category>:_sa_default",))`
    pub fn default_key(&self) -> &LoaderKey {
        &self.default_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn key(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    #[test]
    fn equal_hops_are_equal_paths() {
        let a = Path::for_entity(EntityToken::new("User")).property(&key("User"), &key("addresses"));
        let b = Path::for_entity(EntityToken::new("User")).property(&key("User"), &key("addresses"));
        assert_eq!(a, b);

        let mut map = HashMap::new();
        map.insert(LoaderKey::new(a), 1);
        assert_eq!(map.get(&LoaderKey::new(b)), Some(&1));
    }

    #[test]
    fn child_paths_extend_without_mutating() {
        let root = Path::for_entity(EntityToken::new("User"));
        let child = root
            .property(&key("User"), &key("addresses"))
            .child_entity(EntityToken::new("Address"));
        assert_eq!(root.len(), 1);
        assert_eq!(child.len(), 3);
        assert_eq!(child.to_string(), "User/addresses/Address");
        assert_eq!(child.parent().to_string(), "User/addresses");
        assert!(child.contains_entity("Address"));
        assert_eq!(child.last_entity().map(|t| &**t.entity()), Some("Address"));
    }

    #[test]
    fn inherited_property_uses_declaring_entity() {
        let path = Path::for_entity(EntityToken::new("Engineer")).property(&key("Employee"), &key("name"));
        assert_eq!(path.to_string(), "Employee/name");

        let aliased =
            Path::for_entity(EntityToken::aliased("Engineer", "e1")).property(&key("Employee"), &key("name"));
        assert_eq!(aliased.to_string(), "e1(Engineer)/name");
        assert_eq!(aliased.natural_path().to_string(), "Engineer/name");
    }

    #[test]
    fn loader_keys_in_probe_order() {
        let tokens = WildcardTokens::new("relationship");
        let path = Path::for_entity(EntityToken::aliased("User", "u1"))
            .property(&key("User"), &key("addresses"));
        let keys = path.loader_keys(&tokens);

        assert_eq!(keys.exact.path().to_string(), "User/addresses");
        assert_eq!(keys.wildcard.path().to_string(), "User/relationship:*");
        assert_eq!(keys.default.path().to_string(), "relationship:_sa_default");
        assert_eq!(keys.exact.marker(), LOADER_MARKER);

        let order: Vec<&LoaderKey> = keys.iter().collect();
        assert_eq!(order[0], &keys.exact);
        assert_eq!(order[2], &keys.default);
    }

    #[test]
    fn serde_round_trip() {
        let path = Path::for_entity(EntityToken::new("User"))
            .property(&key("User"), &key("addresses"))
            .child_entity(EntityToken::aliased("Address", "a1"));
        let text = serde_json::to_string(&path).unwrap();
        let back: Path = serde_json::from_str(&text).unwrap();
        assert_eq!(back, path);
    }
}
