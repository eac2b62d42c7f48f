//! Error types for strategy dispatch and attribute loading.

use std::fmt;

use crate::key::StrategyKey;

/// The primary error type for all Strata operations.
#[derive(Debug)]
pub enum Error {
    /// Mapping configuration errors (fatal, raised while configuring mappers)
    Config(ConfigError),
    /// A strategy key is not registered for the requesting property's class
    LoaderStrategy(LoaderStrategyError),
    /// Statement compilation errors reported by strategies
    Compile(CompileError),
    /// Invalid use of a loaded attribute (e.g. `lazy="raise"`)
    InvalidRequest(String),
    /// Type conversion errors
    Type(TypeError),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// `init()` was called on a property that already started configuring
    AlreadyInitialized,
    /// A mapper or property was used before `configure()` ran
    NotConfigured,
    /// A relationship names an entity that has no mapper
    MissingTarget,
    /// Strategy key with malformed option names
    InvalidStrategyKey,
    /// The same key registered twice for one property class
    DuplicateRegistration,
    /// Option path names an attribute the entity does not map
    UnknownProperty,
    /// Unknown cascade name
    InvalidCascade,
    /// The process-wide strategy registry could not be built
    RegistryUnavailable,
}

/// Raised when a requested strategy key is not available for a property.
///
/// Carries a cross-reference to the property class that *does* register the
/// key, so misapplied loader options (a relationship option used against a
/// column) produce a precise message.
#[derive(Debug, Clone)]
pub struct LoaderStrategyError {
    /// Class of the property that requested the strategy
    pub requesting_class: &'static str,
    /// `Entity.attribute` of the requesting property
    pub property: String,
    /// Property class that registers the key, if any
    pub intended_class: Option<&'static str>,
    /// Strategy implementation registered under the key elsewhere, if any
    pub actual_strategy: Option<&'static str>,
    /// The key that was requested
    pub key: StrategyKey,
}

#[derive(Debug)]
pub struct CompileError {
    pub message: String,
    /// Load path being compiled when the error occurred
    pub path: Option<String>,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

impl Error {
    /// Build a configuration error of the given kind.
    pub fn config(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            kind,
            message: message.into(),
            source: None,
        })
    }

    /// Build a compile error, optionally tagged with the path being compiled.
    pub fn compile(message: impl Into<String>, path: Option<String>) -> Self {
        Error::Compile(CompileError {
            message: message.into(),
            path,
        })
    }

    /// Configuration error kind, if this is a configuration error.
    pub fn config_kind(&self) -> Option<ConfigErrorKind> {
        match self {
            Error::Config(c) => Some(c.kind),
            _ => None,
        }
    }

    /// Is this a strategy lookup failure?
    pub fn is_loader_strategy(&self) -> bool {
        matches!(self, Error::LoaderStrategy(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::LoaderStrategy(e) => write!(f, "{}", e),
            Error::Compile(e) => write!(f, "Compile error: {}", e),
            Error::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::LoaderStrategy(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for LoaderStrategyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.intended_class, self.actual_strategy) {
            (Some(intended), Some(actual)) => write!(
                f,
                "Can't apply \"{}\" strategy to property \"{}\", which is a \"{}\"; \
                 this loader strategy ({}) is intended to be used with a \"{}\".",
                self.key, self.property, self.requesting_class, actual, intended
            ),
            _ => write!(
                f,
                "Can't find strategy {} for {}",
                self.key, self.property
            ),
        }
    }
}

impl std::error::Error for LoaderStrategyError {}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} (at path {})", self.message, path),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<LoaderStrategyError> for Error {
    fn from(err: LoaderStrategyError) -> Self {
        Error::LoaderStrategy(err)
    }
}

impl From<CompileError> for Error {
    fn from(err: CompileError) -> Self {
        Error::Compile(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

/// Result type alias for Strata operations.
pub type Result<T> = std::result::Result<T, Error>;
