//! Explicit registry of mapped entities

use super::user::User;
use crate::{Error, Result};

/// A type persisted in its own table
pub trait Entity {
    /// Table the entity maps to
    const TABLE: &'static str;
}

/// Tables the model probe checks
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    tables: Vec<String>,
}

impl ModelRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry of every entity the host defines
    #[must_use]
    pub fn core() -> Self {
        let mut registry = Self::new();
        registry.register::<User>();
        registry
    }

    /// Register an entity type
    pub fn register<E: Entity>(&mut self) {
        self.register_table(E::TABLE);
    }

    /// Register a table by name
    pub fn register_table(&mut self, table: &str) {
        if !self.tables.iter().any(|t| t == table) {
            self.tables.push(table.to_string());
        }
    }

    /// Registered table names, in registration order
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(String::as_str)
    }

    /// Whether no entities are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Check every table name is a plain SQL identifier
    ///
    /// # Errors
    ///
    /// Returns error naming the first invalid table
    pub fn validate(&self) -> Result<()> {
        for table in &self.tables {
            let mut chars = table.chars();
            let valid_start = chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
            if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(Error::Probe(format!("invalid table name '{table}'")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_registry_has_users() {
        let registry = ModelRegistry::core();
        assert_eq!(registry.tables().collect::<Vec<_>>(), vec!["users"]);
        registry.validate().unwrap();
    }

    #[test]
    fn duplicates_are_ignored() {
        let mut registry = ModelRegistry::core();
        registry.register::<User>();
        registry.register_table("users");
        assert_eq!(registry.tables().count(), 1);
    }

    #[test]
    fn invalid_names_fail_validation() {
        for bad in ["", "1users", "users; --", "user name"] {
            let mut registry = ModelRegistry::new();
            registry.register_table(bad);
            assert!(registry.validate().is_err(), "{bad:?} should be invalid");
        }
    }
}
