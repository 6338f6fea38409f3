//! Contract for entity types that opt into change tracking.
//!
//! # Responsibility
//! - Describe the per-type knobs (enforcement, change reference column).
//! - Describe what the write pipeline needs from a tracked record.
//!
//! # Invariants
//! - `change_id_column` is a plain SQL identifier.
//! - A record with `row_id() == None` has never been persisted.
//!
//! Enrolling a type is explicit: see `RecordStore::enroll`.

use crate::db::schema::is_valid_identifier;
use crate::model::change::ChangeId;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Default name of the change reference column on enrolled tables.
pub const DEFAULT_CHANGE_ID_COLUMN: &str = "change_id";

/// Per-type change tracking knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Enrollment {
    /// Reject writes issued while no change is open.
    pub force_changelogging: bool,
    /// Column that receives the open change id.
    pub change_id_column: String,
}

impl Default for Enrollment {
    fn default() -> Self {
        Self {
            force_changelogging: true,
            change_id_column: DEFAULT_CHANGE_ID_COLUMN.to_string(),
        }
    }
}

impl Enrollment {
    /// Enrollment that stamps when a change is open but never rejects.
    pub fn optional() -> Self {
        Self {
            force_changelogging: false,
            ..Self::default()
        }
    }

    /// Returns a copy using `column` as the change reference column.
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.change_id_column = column.into();
        self
    }

    /// Validates declaration-level invariants.
    pub fn validate(&self) -> Result<(), EnrollmentError> {
        if self.change_id_column.trim().is_empty() {
            return Err(EnrollmentError::EmptyColumn);
        }
        if !is_valid_identifier(&self.change_id_column) {
            return Err(EnrollmentError::InvalidColumn(
                self.change_id_column.clone(),
            ));
        }
        Ok(())
    }
}

/// Enrollment declaration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentError {
    EmptyColumn,
    InvalidColumn(String),
}

impl Display for EnrollmentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyColumn => write!(f, "change id column cannot be empty"),
            Self::InvalidColumn(column) => {
                write!(f, "change id column `{column}` is not a plain identifier")
            }
        }
    }
}

impl Error for EnrollmentError {}

/// Entity type whose writes are routed through the change interceptor.
///
/// Implementors track their own dirty state; the write pipeline never issues
/// SQL for a clean record.
pub trait TrackedRecord {
    /// Backing table; must have an `id INTEGER PRIMARY KEY` column.
    const TABLE: &'static str;

    /// Per-type knob override. `None` uses the store's defaults.
    fn enrollment() -> Option<Enrollment> {
        None
    }

    /// Row id once persisted.
    fn row_id(&self) -> Option<i64>;
    fn set_row_id(&mut self, row_id: i64);

    /// Column/value pairs to write, excluding `id` and the change column.
    fn column_values(&self) -> Vec<(&'static str, Value)>;

    /// Whether there are pending field changes.
    fn is_dirty(&self) -> bool;
    fn mark_clean(&mut self);

    fn change_id(&self) -> Option<ChangeId>;
    fn set_change_id(&mut self, change_id: Option<ChangeId>);
}
