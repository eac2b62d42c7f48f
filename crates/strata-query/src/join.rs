//! JOIN clause types.

/// A JOIN clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// Type of join
    pub join_type: JoinType,
    /// Table to join
    pub table: String,
    /// Optional table alias
    pub alias: Option<String>,
    /// ON condition (rendered SQL)
    pub on: String,
}

/// Types of SQL joins emitted by eager loaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl JoinType {
    /// Get the SQL keyword for this join type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        }
    }
}

impl Join {
    /// Create an INNER JOIN.
    pub fn inner(table: impl Into<String>, on: impl Into<String>) -> Self {
        Self::new(JoinType::Inner, table, on)
    }

    /// Create a LEFT JOIN.
    pub fn left(table: impl Into<String>, on: impl Into<String>) -> Self {
        Self::new(JoinType::Left, table, on)
    }

    pub fn new(join_type: JoinType, table: impl Into<String>, on: impl Into<String>) -> Self {
        Self {
            join_type,
            table: table.into(),
            alias: None,
            on: on.into(),
        }
    }

    /// Set an alias for the joined table.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Append criteria to the ON condition.
    #[must_use]
    pub fn and_on(mut self, criteria: &str) -> Self {
        self.on = format!("{} AND {}", self.on, criteria);
        self
    }

    /// Generate SQL for this JOIN clause (with a leading space).
    pub fn to_sql(&self) -> String {
        match &self.alias {
            Some(alias) => format!(
                " {} {} AS {} ON {}",
                self.join_type.as_str(),
                self.table,
                alias,
                self.on
            ),
            None => format!(" {} {} ON {}", self.join_type.as_str(), self.table, self.on),
        }
    }
}
