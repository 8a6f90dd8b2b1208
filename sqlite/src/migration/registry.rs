//! Name-keyed lookup of migrations written in Rust.
//!
//! Files without a `.sql` body resolve only through a [`MigrationRegistry`];
//! the runner counts them invalid otherwise.

use std::collections::HashMap;
use std::fmt;

use super::Migration;

/// Migrations implemented in Rust, keyed by class name.
///
/// A file `20240101000000_seed_roles.<ext>` resolves to the migration
/// registered as `SeedRoles`, whatever its extension.
#[derive(Default)]
pub struct MigrationRegistry {
    migrations: HashMap<String, Box<dyn Migration>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `migration` under `class_name`, replacing any earlier entry.
    pub fn register(&mut self, class_name: impl Into<String>, migration: impl Migration + 'static) -> &mut Self {
        self.migrations.insert(class_name.into(), Box::new(migration));
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, class_name: impl Into<String>, migration: impl Migration + 'static) -> Self {
        self.register(class_name, migration);
        self
    }

    pub fn get(&self, class_name: &str) -> Option<&dyn Migration> {
        self.migrations.get(class_name).map(|m| m.as_ref())
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.migrations.contains_key(class_name)
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.migrations.keys().collect();
        names.sort();
        f.debug_struct("MigrationRegistry").field("migrations", &names).finish()
    }
}
