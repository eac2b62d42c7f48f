//! Strategy keys: order-independent sets of loader option pairs.
//!
//! A `StrategyKey` such as `lazy="joined"` identifies one loader strategy
//! variant. Pairs are sorted by option name on construction, so two keys
//! built from the same pairs in different order are equal and hash equally.

use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ConfigErrorKind, Error, Result};

/// Option names must look like identifiers.
const OPTION_NAME_PATTERN: &str = r"^[a-z_][a-z0-9_]*$";

/// The value half of a strategy key pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionValue {
    None,
    Bool(bool),
    Int(i64),
    Str(Cow<'static, str>),
}

impl OptionValue {
    /// Borrow the string payload, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get the boolean payload, if this is a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Truthiness in the loader-option sense: `None`, `false`, `0` and `""` are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            OptionValue::None => false,
            OptionValue::Bool(b) => *b,
            OptionValue::Int(i) => *i != 0,
            OptionValue::Str(s) => !s.is_empty(),
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::None => write!(f, "None"),
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Int(i) => write!(f, "{}", i),
            OptionValue::Str(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        OptionValue::Int(i64::from(v))
    }
}

impl From<&'static str> for OptionValue {
    fn from(v: &'static str) -> Self {
        OptionValue::Str(Cow::Borrowed(v))
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Str(Cow::Owned(v))
    }
}

type Pair = (Cow<'static, str>, OptionValue);

/// An immutable, sorted set of `(option name, option value)` pairs.
///
/// Cloning is cheap (shared slice). Used as the lookup key in the strategy
/// registry and in each property's strategy cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrategyKey {
    pairs: Arc<[Pair]>,
}

impl StrategyKey {
    /// Build a key from pairs in any order.
    ///
    /// Later pairs with a repeated option name replace earlier ones.
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Cow<'static, str>>,
        V: Into<OptionValue>,
    {
        let mut collected: Vec<Pair> = Vec::new();
        for (name, value) in pairs {
            let name = name.into();
            let value = value.into();
            match collected.iter_mut().find(|(existing, _)| *existing == name) {
                Some(slot) => slot.1 = value,
                None => collected.push((name, value)),
            }
        }
        collected.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            pairs: collected.into(),
        }
    }

    /// The empty key.
    pub fn empty() -> Self {
        Self {
            pairs: Arc::from(Vec::new()),
        }
    }

    /// Sorted pairs.
    pub fn pairs(&self) -> &[Pair] {
        &self.pairs
    }

    /// Look up one option value by name.
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.pairs
            .binary_search_by(|(n, _)| Ord::cmp(&**n, name))
            .ok()
            .map(|i| &self.pairs[i].1)
    }

    /// Look up a string option by name.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(OptionValue::as_str)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Check the key is usable for registration: non-empty, identifier-like names.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::config(
                ConfigErrorKind::InvalidStrategyKey,
                "strategy key must contain at least one option",
            ));
        }
        let re = option_name_regex()?;
        for (name, _) in self.pairs.iter() {
            if !re.is_match(name) {
                return Err(Error::config(
                    ConfigErrorKind::InvalidStrategyKey,
                    format!("invalid strategy option name '{}' in key {}", name, self),
                ));
            }
        }
        Ok(())
    }
}

fn option_name_regex() -> Result<&'static Regex> {
    static RE: OnceLock<std::result::Result<Regex, String>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(OPTION_NAME_PATTERN).map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|e| Error::Custom(format!("option name pattern failed to compile: {e}")))
}

impl fmt::Display for StrategyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}

impl Serialize for StrategyKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.pairs.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StrategyKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let pairs: Vec<(String, OptionValue)> = Vec::deserialize(deserializer)?;
        Ok(StrategyKey::new(pairs))
    }
}

/// Build a [`StrategyKey`] from `name = value` pairs.
///
/// ```
/// use strata_core::strategy_key;
///
/// let a = strategy_key!(lazy = "joined", innerjoin = true);
/// let b = strategy_key!(innerjoin = true, lazy = "joined");
/// assert_eq!(a, b);
/// ```
#[macro_export]
macro_rules! strategy_key {
    () => {
        $crate::key::StrategyKey::empty()
    };
    ($($name:ident = $value:expr),+ $(,)?) => {
        $crate::key::StrategyKey::new([
            $((stringify!($name), $crate::key::OptionValue::from($value))),+
        ])
    };
}
