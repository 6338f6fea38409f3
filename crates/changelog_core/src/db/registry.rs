//! Default and named SQLite connections.
//!
//! # Responsibility
//! - Own the connections an application hands to its change managers.
//! - Resolve a connection selector (`None` = default) to a connection.
//!
//! # Invariants
//! - The default connection always exists and stores the `changes` table.
//! - Connection names are unique plain identifiers.

use super::schema::checked_identifier;
use super::{DbError, DbResult};
use rusqlite::Connection;
use std::collections::BTreeMap;

/// Application-owned set of connections.
///
/// Change managers borrow the registry, so its lifetime is bound to the
/// application's startup/shutdown sequence.
pub struct ConnectionRegistry {
    default: Connection,
    named: BTreeMap<String, Connection>,
}

impl ConnectionRegistry {
    /// Creates a registry around an already migrated default connection.
    pub fn new(default: Connection) -> Self {
        Self {
            default,
            named: BTreeMap::new(),
        }
    }

    /// Registers an additional connection under `name`.
    ///
    /// # Errors
    /// - `InvalidIdentifier` when `name` is not a plain identifier.
    /// - `DuplicateConnection` when `name` is already registered.
    pub fn register(&mut self, name: &str, conn: Connection) -> DbResult<()> {
        let name = checked_identifier(name.trim())?;
        if self.named.contains_key(name) {
            return Err(DbError::DuplicateConnection(name.to_string()));
        }
        self.named.insert(name.to_string(), conn);
        Ok(())
    }

    /// Returns the default connection.
    pub fn default_connection(&self) -> &Connection {
        &self.default
    }

    /// Resolves a selector; `None` selects the default connection.
    pub fn connection(&self, name: Option<&str>) -> Option<&Connection> {
        match name {
            None => Some(&self.default),
            Some(name) => self.named.get(name),
        }
    }

    /// Registered connection names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.named.keys().map(String::as_str)
    }
}
