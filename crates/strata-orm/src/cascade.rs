//! Relationship cascade settings.
//!
//! Cascade traversal itself belongs to the unit of work; properties only
//! carry the parsed settings.

use std::fmt;

use strata_core::{ConfigErrorKind, Error, Result};

const ALL_CASCADES: [&str; 6] = [
    "save-update",
    "merge",
    "refresh-expire",
    "expunge",
    "delete",
    "delete-orphan",
];

/// Parsed cascade settings of a property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CascadeOptions {
    pub save_update: bool,
    pub merge: bool,
    pub refresh_expire: bool,
    pub expunge: bool,
    pub delete: bool,
    pub delete_orphan: bool,
}

impl CascadeOptions {
    /// No cascades. Used by column properties.
    pub fn none() -> Self {
        Self::default()
    }

    /// Relationship default: `save-update, merge`.
    pub fn relationship_default() -> Self {
        Self {
            save_update: true,
            merge: true,
            ..Self::default()
        }
    }

    /// Parse a comma separated cascade string.
    ///
    /// `all` expands to every cascade except `delete-orphan`; `none` clears.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut options = Self::default();
        for name in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match name {
                "all" => {
                    let orphan = options.delete_orphan;
                    options = Self {
                        save_update: true,
                        merge: true,
                        refresh_expire: true,
                        expunge: true,
                        delete: true,
                        delete_orphan: orphan,
                    };
                }
                "none" => options = Self::default(),
                "save-update" => options.save_update = true,
                "merge" => options.merge = true,
                "refresh-expire" => options.refresh_expire = true,
                "expunge" => options.expunge = true,
                "delete" => options.delete = true,
                "delete-orphan" => options.delete_orphan = true,
                other => {
                    return Err(Error::config(
                        ConfigErrorKind::InvalidCascade,
                        format!("Invalid cascade option '{}'", other),
                    ));
                }
            }
        }
        if options.delete_orphan && !options.delete {
            tracing::debug!(cascade = spec, "delete-orphan cascade without delete");
        }
        Ok(options)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Names of the enabled cascades, in canonical order.
    pub fn names(&self) -> Vec<&'static str> {
        let flags = [
            self.save_update,
            self.merge,
            self.refresh_expire,
            self.expunge,
            self.delete,
            self.delete_orphan,
        ];
        ALL_CASCADES
            .iter()
            .zip(flags)
            .filter_map(|(name, on)| on.then_some(*name))
            .collect()
    }
}

impl fmt::Display for CascadeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_excludes_orphan() {
        let all = CascadeOptions::parse("all").unwrap();
        assert!(all.delete && all.merge && all.save_update && all.expunge && all.refresh_expire);
        assert!(!all.delete_orphan);

        let with_orphan = CascadeOptions::parse("all, delete-orphan").unwrap();
        assert!(with_orphan.delete_orphan);
    }

    #[test]
    fn test_default_and_display() {
        let default = CascadeOptions::relationship_default();
        assert_eq!(default.to_string(), "save-update, merge");
        assert_eq!(CascadeOptions::parse("save-update, merge").unwrap(), default);
        assert!(CascadeOptions::parse("none").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_name() {
        let err = CascadeOptions::parse("save-update, explode").unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::InvalidCascade));
    }
}
