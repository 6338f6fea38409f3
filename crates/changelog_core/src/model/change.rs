//! Change record model.
//!
//! # Responsibility
//! - Define the row stored for every change and its status lifecycle.
//! - Carry caller-supplied interface/notes labels into new changes.
//!
//! # Invariants
//! - New changes start as `ChangeStatus::Pending`.
//! - `Complete` and `Failed` are terminal and never revert.

use serde::{Deserialize, Serialize};

/// Primary key of a row in the `changes` table.
pub type ChangeId = i64;

/// Identifier of the acting principal (usually a user id).
pub type PrincipalId = i64;

/// Lifecycle state of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    /// Change is open; writes are being stamped with its id.
    Pending,
    /// Change was committed.
    Complete,
    /// Change was rolled back or its unit of work failed.
    Failed,
}

impl ChangeStatus {
    /// Stable string stored in `changes.status`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    /// Parses a stored status value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "complete" => Some(Self::Complete),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Persisted change row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: ChangeId,
    /// Principal that opened the change, when one was resolved.
    pub user_id: Option<PrincipalId>,
    /// Entry point that initiated the change, e.g. `api` or `backend`.
    pub interface: Option<String>,
    /// Free-form description, e.g. "Placing an order".
    pub notes: Option<String>,
    pub status: ChangeStatus,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms update timestamp.
    pub updated_at: i64,
}

/// Caller-supplied description of a change about to begin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeRequest {
    pub interface: Option<String>,
    pub notes: Option<String>,
}

impl ChangeRequest {
    /// Creates an empty request (no interface, no notes).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the interface label.
    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    /// Sets the notes text.
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Insert model for a new `pending` change row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChange {
    pub user_id: Option<PrincipalId>,
    pub interface: Option<String>,
    pub notes: Option<String>,
}

impl NewChange {
    /// Combines a request with the principal resolved at begin time.
    pub fn from_request(request: &ChangeRequest, user_id: Option<PrincipalId>) -> Self {
        Self {
            user_id,
            interface: request.interface.clone(),
            notes: request.notes.clone(),
        }
    }
}
