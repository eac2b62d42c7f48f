//! Compiler configuration.

/// Configuration for a [`Compiler`](crate::select::Compiler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrmConfig {
    /// Maximum number of compiled statements kept in the statement cache
    pub statement_cache_size: usize,
    /// Maximum number of parent keys per `IN` batch of a selectin load
    pub selectin_batch_size: usize,
    /// Whether relationship eager loads run at all
    pub enable_eagerloads: bool,
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self {
            statement_cache_size: 500,
            selectin_batch_size: 500,
            enable_eagerloads: true,
        }
    }
}

impl OrmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the statement cache size.
    pub fn statement_cache_size(mut self, size: usize) -> Self {
        self.statement_cache_size = size;
        self
    }

    /// Set the selectin batch size. Zero is treated as one.
    pub fn selectin_batch_size(mut self, size: usize) -> Self {
        self.selectin_batch_size = size.max(1);
        self
    }

    /// Enable/disable eager loading. When disabled, joined, selectin,
    /// subquery and immediate loads fall back to lazy loading.
    pub fn enable_eagerloads(mut self, enabled: bool) -> Self {
        self.enable_eagerloads = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrmConfig::default();
        assert_eq!(config.statement_cache_size, 500);
        assert_eq!(config.selectin_batch_size, 500);
        assert!(config.enable_eagerloads);
    }

    #[test]
    fn test_builder() {
        let config = OrmConfig::new()
            .statement_cache_size(10)
            .selectin_batch_size(0)
            .enable_eagerloads(false);
        assert_eq!(config.statement_cache_size, 10);
        assert_eq!(config.selectin_batch_size, 1);
        assert!(!config.enable_eagerloads);
    }
}
