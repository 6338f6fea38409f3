//! SQLite storage bootstrap, schema migration and connection registry.
//!
//! # Responsibility
//! - Open and configure SQLite connections for changelog core.
//! - Apply schema migrations in deterministic order.
//! - Hold the default and named connections a change manager targets.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Change rows are only read/written after migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;
mod registry;
pub mod schema;

pub use open::{open_db, open_db_in_memory};
pub use registry::ConnectionRegistry;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// A named connection was registered twice.
    DuplicateConnection(String),
    /// Connection/table/column name is empty or not a plain SQL identifier.
    InvalidIdentifier(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::DuplicateConnection(name) => {
                write!(f, "connection `{name}` is already registered")
            }
            Self::InvalidIdentifier(name) => write!(f, "invalid identifier `{name}`"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
            Self::DuplicateConnection(_) => None,
            Self::InvalidIdentifier(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
